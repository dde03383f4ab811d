//! Live, mutable handles onto one document cell.
//!
//! A [`DocHandle`] is cheap to clone; every clone points at the same shared
//! core. The handle itself performs no I/O. The [`Repo`](crate::repo::Repo)
//! that hands it out listens to its changes for persistence and replication.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use automerge::transaction::Transaction;
use automerge::{Automerge, AutomergeError, ChangeHash, Patch};
use tokio::sync::{mpsc, watch};

use super::{ChangeOrigin, DocumentId, VersionedArtifact};
use crate::callback_registry::{CallbackRegistry, SubscriptionId};
use crate::change_id::ChangeId;
use crate::error::{Result, VersoError};

/// Untyped change notification shared by every typed view of a handle.
#[derive(Debug, Clone)]
pub(crate) struct RawChange {
    pub doc: Arc<Automerge>,
    pub patches: Arc<Vec<Patch>>,
    pub origin: ChangeOrigin,
}

/// State shared by all clones of a handle, and by the repo.
pub(crate) struct HandleCore {
    id: DocumentId,
    doc: Mutex<Automerge>,
    ready: watch::Sender<bool>,
    unavailable: AtomicBool,
    listeners: CallbackRegistry<RawChange>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RawChange>>>,
    pending: Mutex<VecDeque<RawChange>>,
    draining: AtomicBool,
}

impl HandleCore {
    pub fn new(id: DocumentId, doc: Automerge) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            id,
            doc: Mutex::new(doc),
            ready,
            unavailable: AtomicBool::new(false),
            listeners: CallbackRegistry::new(),
            subscribers: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Run `f` with shared access to the document.
    pub fn with_doc<R>(&self, f: impl FnOnce(&Automerge) -> R) -> R {
        let doc = self.doc.lock().unwrap();
        f(&doc)
    }

    pub fn snapshot(&self) -> Arc<Automerge> {
        Arc::new(self.with_doc(|doc| doc.clone()))
    }

    pub fn heads(&self) -> Vec<ChangeHash> {
        self.with_doc(|doc| doc.get_heads())
    }

    /// Mutate the document and notify observers if its heads moved.
    ///
    /// The document lock is released before any listener runs, so listeners
    /// may read or change the handle again. A change made from inside a
    /// listener is queued and delivered after the one being delivered.
    pub fn apply<R>(&self, origin: ChangeOrigin, f: impl FnOnce(&mut Automerge) -> R) -> R {
        let (result, change) = {
            let mut doc = self.doc.lock().unwrap();
            let before = doc.get_heads();
            let result = f(&mut doc);
            let after = doc.get_heads();
            if before == after {
                (result, None)
            } else {
                let patches = doc.diff(&before, &after, automerge::patches::TextRepresentation::default());
                let change = RawChange {
                    doc: Arc::new(doc.clone()),
                    patches: Arc::new(patches),
                    origin,
                };
                (result, Some(change))
            }
        };

        if let Some(change) = change {
            self.pending.lock().unwrap().push_back(change);
            self.drain();
        }
        result
    }

    /// Deliver queued changes in order. Only the outermost caller drains.
    fn drain(&self) {
        loop {
            if self.draining.swap(true, Ordering::SeqCst) {
                return;
            }
            loop {
                let next = self.pending.lock().unwrap().pop_front();
                let Some(change) = next else { break };
                self.emit(&change);
            }
            self.draining.store(false, Ordering::SeqCst);
            // Another thread may have queued after the last pop.
            if self.pending.lock().unwrap().is_empty() {
                return;
            }
        }
    }

    fn emit(&self, change: &RawChange) {
        log::debug!(
            "[DocHandle] {} changed ({}, {} patches)",
            self.id,
            change.origin,
            change.patches.len()
        );
        self.listeners.emit(change);
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(change.clone()).is_ok());
    }

    /// Resolve the readiness gate. Later calls are no-ops.
    pub fn mark_ready(&self) {
        if !self.ready.send_replace(true) {
            log::debug!("[DocHandle] {} is ready", self.id);
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub async fn when_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub fn mark_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn is_unavailable(&self) -> bool {
        !self.is_ready() && self.unavailable.load(Ordering::SeqCst)
    }

    pub fn listen(&self, listener: Arc<dyn Fn(&RawChange) + Send + Sync>) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    pub fn unlisten(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn open_subscription(&self) -> mpsc::UnboundedReceiver<RawChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}

impl std::fmt::Debug for HandleCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleCore")
            .field("id", &self.id)
            .field("ready", &self.is_ready())
            .field("listeners", &self.listeners.subscriber_count())
            .finish()
    }
}

/// A committed change, as seen by a typed listener.
pub struct ChangeEvent<T> {
    /// Snapshot after the change.
    pub doc: VersionedArtifact<T>,
    /// What changed, relative to the previous snapshot.
    pub patches: Arc<Vec<Patch>>,
    /// Whether the change was made here or arrived from a peer.
    pub origin: ChangeOrigin,
}

impl<T> ChangeEvent<T> {
    fn from_raw(raw: &RawChange) -> Self {
        Self {
            doc: VersionedArtifact::from_shared(Arc::clone(&raw.doc)),
            patches: Arc::clone(&raw.patches),
            origin: raw.origin,
        }
    }
}

impl<T> Clone for ChangeEvent<T> {
    fn clone(&self) -> Self {
        Self {
            doc: self.doc.clone(),
            patches: Arc::clone(&self.patches),
            origin: self.origin,
        }
    }
}

impl<T> std::fmt::Debug for ChangeEvent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("heads", &self.doc.heads())
            .field("patches", &self.patches.len())
            .field("origin", &self.origin)
            .finish()
    }
}

/// A stream of change events. Dropping it unsubscribes.
pub struct ChangeSubscription<T> {
    rx: mpsc::UnboundedReceiver<RawChange>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> ChangeSubscription<T> {
    /// Wait for the next change. `None` once the handle is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent<T>> {
        self.rx.recv().await.map(|raw| ChangeEvent::from_raw(&raw))
    }

    /// Take the next already-delivered change, if any.
    pub fn try_recv(&mut self) -> Option<ChangeEvent<T>> {
        self.rx.try_recv().ok().map(|raw| ChangeEvent::from_raw(&raw))
    }
}

/// Live reference to one document, typed by its payload.
pub struct DocHandle<T> {
    core: Arc<HandleCore>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> DocHandle<T> {
    pub(crate) fn from_core(core: Arc<HandleCore>) -> Self {
        Self {
            core,
            _payload: PhantomData,
        }
    }

    /// The document's id.
    pub fn id(&self) -> &DocumentId {
        self.core.id()
    }

    /// The `doc:<id>` address other processes use to find this document.
    pub fn address(&self) -> String {
        self.core.id().address()
    }

    /// True once the document has content, locally or from a peer.
    pub fn is_ready(&self) -> bool {
        self.core.is_ready()
    }

    /// True when every peer asked reported that it does not have the document.
    pub fn is_unavailable(&self) -> bool {
        self.core.is_unavailable()
    }

    /// Wait until the document is first available.
    ///
    /// Resolves once; awaiting again after that returns immediately. There is
    /// no timeout.
    pub async fn when_ready(&self) {
        self.core.when_ready().await
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.core.is_ready() {
            Ok(())
        } else {
            Err(VersoError::NotReady(self.core.id().address()))
        }
    }

    /// Current snapshot.
    pub fn doc(&self) -> Result<VersionedArtifact<T>> {
        self.ensure_ready()?;
        Ok(VersionedArtifact::from_shared(self.core.snapshot()))
    }

    /// Current heads. Empty while nothing has been loaded.
    pub fn heads(&self) -> Vec<ChangeHash> {
        self.core.heads()
    }

    /// Current head-set as a [`ChangeId`].
    pub fn change_id(&self) -> ChangeId {
        ChangeId::Commit(crate::change_id::CommitId::from_heads(&self.heads()))
    }

    /// Snapshot at a point in history.
    pub fn view(&self, at: &ChangeId) -> Result<VersionedArtifact<T>> {
        self.doc()?.at(at)
    }

    /// Apply one atomic local change.
    ///
    /// The mutator runs inside a single transaction. If it fails the
    /// transaction is rolled back and no event fires. Returns the snapshot
    /// after the change.
    pub fn change<F>(&self, mutator: F) -> Result<VersionedArtifact<T>>
    where
        F: FnOnce(&mut Transaction<'_>) -> std::result::Result<(), AutomergeError>,
    {
        self.ensure_ready()?;
        self.core.apply(ChangeOrigin::Local, |doc| {
            let mut tx = doc.transaction();
            match mutator(&mut tx) {
                Ok(()) => {
                    tx.commit();
                    Ok(())
                }
                Err(e) => {
                    tx.rollback();
                    Err(VersoError::from(e))
                }
            }
        })?;
        Ok(VersionedArtifact::from_shared(self.core.snapshot()))
    }

    /// Stop a listener registered with [`DocHandle::on_change`].
    pub fn off_change(&self, id: SubscriptionId) -> bool {
        self.core.unlisten(id)
    }

    /// Subscribe through a channel instead of a callback.
    pub fn subscribe(&self) -> ChangeSubscription<T> {
        ChangeSubscription {
            rx: self.core.open_subscription(),
            _payload: PhantomData,
        }
    }

    pub(crate) fn core(&self) -> &Arc<HandleCore> {
        &self.core
    }
}

impl<T: 'static> DocHandle<T> {
    /// Register a change listener. Listeners run in registration order,
    /// once per committed change, in the order changes were applied.
    pub fn on_change<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent<T>) + Send + Sync + 'static,
    {
        self.core
            .listen(Arc::new(move |raw| listener(&ChangeEvent::from_raw(raw))))
    }
}

impl<T> Clone for DocHandle<T> {
    fn clone(&self) -> Self {
        Self::from_core(Arc::clone(&self.core))
    }
}

impl<T> std::fmt::Debug for DocHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocHandle").field("core", &self.core).finish()
    }
}
