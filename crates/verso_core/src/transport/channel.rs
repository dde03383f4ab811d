//! Inter-process channels.
//!
//! An [`IpcChannel`] is one side of an ordered, reliable link between the
//! host and a single renderer window. Desktop shells implement it over their
//! own IPC; [`MemoryChannel`] is an in-process pair for tests and tools.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{TransportError, WireMessage};
use crate::callback_registry::{CallbackRegistry, EventCallback, SubscriptionId};

/// Listener for inbound messages on a channel.
pub type MessageListener = EventCallback<WireMessage>;

/// One side of a bidirectional channel.
pub trait IpcChannel: Send + Sync {
    /// Queue a message for the other side.
    fn post(&self, message: &WireMessage) -> Result<(), TransportError>;

    /// Register a listener for messages arriving on this side.
    fn on_message(&self, listener: MessageListener) -> SubscriptionId;

    /// Remove a listener. Returns `false` if it was not registered.
    fn off_message(&self, id: SubscriptionId) -> bool;
}

#[derive(Default)]
struct Endpoint {
    inbox: Mutex<VecDeque<String>>,
    listeners: CallbackRegistry<WireMessage>,
    posted: AtomicUsize,
}

/// In-process channel end.
///
/// Posted messages are JSON-encoded into the other end's inbox and delivered
/// only when that end calls [`MemoryChannel::deliver_pending`], the way an
/// event loop turn would deliver them.
pub struct MemoryChannel {
    local: Arc<Endpoint>,
    remote: Arc<Endpoint>,
    closed: Arc<AtomicBool>,
}

impl MemoryChannel {
    /// Create two connected ends.
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let a = Arc::new(Endpoint::default());
        let b = Arc::new(Endpoint::default());
        let closed = Arc::new(AtomicBool::new(false));
        (
            MemoryChannel {
                local: Arc::clone(&a),
                remote: Arc::clone(&b),
                closed: Arc::clone(&closed),
            },
            MemoryChannel {
                local: b,
                remote: a,
                closed,
            },
        )
    }

    /// Deliver every message queued for this end. Returns how many ran.
    ///
    /// Messages posted by listeners during delivery are delivered in the same
    /// call if they land in this end's inbox.
    pub fn deliver_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            // Lock released before listeners run, so they can post again.
            let next = self.local.inbox.lock().unwrap().pop_front();
            let Some(json) = next else {
                break;
            };
            match WireMessage::from_json(&json) {
                Ok(message) => self.local.listeners.emit(&message),
                Err(e) => log::warn!("[MemoryChannel] Dropping undecodable message: {}", e),
            }
            delivered += 1;
        }
        delivered
    }

    /// Number of messages waiting for this end.
    pub fn pending(&self) -> usize {
        self.local.inbox.lock().unwrap().len()
    }

    /// Number of messages this end has successfully posted.
    pub fn posted_count(&self) -> usize {
        self.local.posted.load(Ordering::SeqCst)
    }

    /// Close both ends. Later posts fail with [`TransportError::ChannelClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether [`MemoryChannel::close`] was called on either end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pump every channel until no messages remain. Returns the total delivered.
    pub fn run_until_idle(channels: &[&MemoryChannel]) -> usize {
        const MAX_ROUNDS: usize = 10_000;

        let mut total = 0;
        for _ in 0..MAX_ROUNDS {
            let delivered: usize = channels.iter().map(|c| c.deliver_pending()).sum();
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
        log::warn!(
            "[MemoryChannel] Still busy after {} rounds; giving up",
            MAX_ROUNDS
        );
        total
    }
}

impl IpcChannel for MemoryChannel {
    fn post(&self, message: &WireMessage) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed);
        }
        let json = message.to_json()?;
        self.remote.inbox.lock().unwrap().push_back(json);
        self.local.posted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_message(&self, listener: MessageListener) -> SubscriptionId {
        self.local.listeners.subscribe(listener)
    }

    fn off_message(&self, id: SubscriptionId) -> bool {
        self.local.listeners.unsubscribe(id)
    }
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("pending", &self.pending())
            .field("posted", &self.posted_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
