//! Callback registry for event subscriptions.
//!
//! Handles and transport adapters both expose an `on`/`off` listener pair.
//! This registry backs them: listeners are keyed by a [`SubscriptionId`] and
//! receive a shared reference to each emitted event.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback function type for events of type `E`.
///
/// Callbacks receive a reference to the event and should not block for extended periods.
pub type EventCallback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Thread-safe registry for managing event subscriptions.
///
/// Listeners are invoked in subscription order. Emission snapshots the
/// listener list first, so a listener may subscribe or unsubscribe others
/// without deadlocking.
pub struct CallbackRegistry<E> {
    callbacks: RwLock<BTreeMap<SubscriptionId, EventCallback<E>>>,
    next_id: AtomicU64,
}

impl<E> CallbackRegistry<E> {
    /// Create a new empty callback registry.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to events.
    ///
    /// Returns a subscription ID that can be used to unsubscribe later.
    pub fn subscribe(&self, callback: EventCallback<E>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut callbacks = self.callbacks.write().unwrap();
        callbacks.insert(id, callback);
        id
    }

    /// Unsubscribe from events.
    ///
    /// Returns `true` if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write().unwrap();
        callbacks.remove(&id).is_some()
    }

    /// Emit an event to all registered callbacks.
    ///
    /// If a callback panics, it does not affect other callbacks.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<EventCallback<E>> =
            self.callbacks.read().unwrap().values().cloned().collect();
        for callback in callbacks {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event))).is_err()
            {
                log::error!("Event listener panicked; continuing with remaining listeners");
            }
        }
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().unwrap().len()
    }

    /// Check if there are any active subscriptions.
    pub fn has_subscribers(&self) -> bool {
        !self.callbacks.read().unwrap().is_empty()
    }

    /// Clear all subscriptions.
    pub fn clear(&self) {
        self.callbacks.write().unwrap().clear();
    }
}

impl<E> Default for CallbackRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for CallbackRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("subscriber_count", &self.subscriber_count())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}
