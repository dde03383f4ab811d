//! Synchronizing repository.
//!
//! The [`Repo`] owns every live document in a process. It hands out
//! [`DocHandle`]s, persists them through an [`ArtifactStorage`], and keeps
//! them converged with other processes through a [`NetworkAdapter`].
//!
//! # Responsibilities
//!
//! - Resolve `doc:<id>` addresses to handles, loading from storage when possible
//! - Persist every change, local or remote
//! - Push local changes to every known peer
//! - Answer automerge sync traffic with per-peer, per-document sync state
//!
//! # Usage
//!
//! ```ignore
//! let repo = Repo::new(Arc::new(MemoryStorage::new()), RepoConfig::default())
//!     .with_network(RendererAdapter::new(channel))?;
//!
//! let handle = repo.find::<Note>("doc:3f2a9c")?;
//! handle.when_ready().await;
//! ```

#[cfg(not(target_arch = "wasm32"))]
mod file_storage;
mod memory_storage;
mod storage;

#[cfg(not(target_arch = "wasm32"))]
pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
pub use storage::{ArtifactStorage, StorageResult};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use automerge::Automerge;
use automerge::sync::{self, SyncDoc};
use serde::Serialize;

use crate::artifact::{
    ChangeOrigin, DocHandle, DocumentId, HandleCore, RawChange, document_from_value,
};
use crate::callback_registry::{CallbackRegistry, EventCallback, SubscriptionId};
use crate::error::{Result, VersoError};
use crate::transport::{AdapterState, NetworkAdapter, NetworkEvent, PeerId, PeerMetadata, WireMessage};

/// Identity the repo announces when it connects an adapter.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// Local peer id.
    pub peer_id: PeerId,
    /// Metadata sent with `join`/`peer`.
    pub metadata: PeerMetadata,
}

impl RepoConfig {
    /// Config with a fixed peer id and default metadata.
    pub fn new(peer_id: impl Into<PeerId>) -> Self {
        Self {
            peer_id: peer_id.into(),
            metadata: PeerMetadata::default(),
        }
    }
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            peer_id: PeerId::generate("peer"),
            metadata: PeerMetadata::default(),
        }
    }
}

/// Transient data relayed for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralMessage {
    /// Peer that broadcast the data.
    pub sender_id: PeerId,
    /// Document the data is about.
    pub document_id: DocumentId,
    /// Opaque application bytes.
    pub data: Vec<u8>,
}

struct NetworkLink {
    adapter: Arc<dyn NetworkAdapter>,
    subscription: SubscriptionId,
}

struct RepoInner {
    config: RepoConfig,
    storage: Arc<dyn ArtifactStorage>,
    handles: Mutex<HashMap<DocumentId, Arc<HandleCore>>>,
    network: Mutex<Option<NetworkLink>>,
    peers: Mutex<HashMap<PeerId, PeerMetadata>>,
    sync_states: Mutex<HashMap<(PeerId, DocumentId), sync::State>>,
    ephemeral: CallbackRegistry<EphemeralMessage>,
    this: Weak<RepoInner>,
}

/// Owner of every live document in one process.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Repo {
    inner: Arc<RepoInner>,
}

impl Repo {
    /// Create a repo over `storage`. No network is attached yet.
    pub fn new(storage: Arc<dyn ArtifactStorage>, config: RepoConfig) -> Self {
        let inner = Arc::new_cyclic(|this| RepoInner {
            config,
            storage,
            handles: Mutex::new(HashMap::new()),
            network: Mutex::new(None),
            peers: Mutex::new(HashMap::new()),
            sync_states: Mutex::new(HashMap::new()),
            ephemeral: CallbackRegistry::new(),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Attach `adapter` and connect it with this repo's identity.
    pub fn with_network(self, adapter: Arc<dyn NetworkAdapter>) -> Result<Self> {
        self.connect_network(adapter)?;
        Ok(self)
    }

    /// Attach `adapter`, replacing any previous one.
    ///
    /// An adapter that is still unconnected is connected with this repo's
    /// peer id and metadata.
    pub fn connect_network(&self, adapter: Arc<dyn NetworkAdapter>) -> Result<()> {
        self.disconnect_network();

        let weak = Weak::clone(&self.inner.this);
        let subscription = adapter.on_event(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_network_event(event);
            }
        }));
        *self.inner.network.lock().unwrap() = Some(NetworkLink {
            adapter: Arc::clone(&adapter),
            subscription,
        });

        if adapter.state() == AdapterState::Unconnected {
            let config = &self.inner.config;
            if let Err(e) = adapter.connect(config.peer_id.clone(), config.metadata.clone()) {
                self.inner.network.lock().unwrap().take();
                adapter.off_event(subscription);
                return Err(e.into());
            }
        }
        log::info!("[Repo] {} attached to network", self.inner.config.peer_id);
        Ok(())
    }

    /// Detach and disconnect the current adapter, if any.
    pub fn disconnect_network(&self) {
        let link = self.inner.network.lock().unwrap().take();
        if let Some(link) = link {
            link.adapter.off_event(link.subscription);
            link.adapter.disconnect();
            self.inner.peers.lock().unwrap().clear();
            self.inner.sync_states.lock().unwrap().clear();
            log::info!("[Repo] Detached from network");
        }
    }

    /// This repo's own peer id.
    pub fn peer_id(&self) -> &PeerId {
        &self.inner.config.peer_id
    }

    /// Peers currently known through the adapter, sorted by id.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.inner.peers.lock().unwrap().keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Create a new document holding `initial`. The handle is ready at once.
    pub fn create<T: Serialize>(&self, initial: &T) -> Result<DocHandle<T>> {
        let doc = document_from_value(initial)?;
        let id = DocumentId::generate();
        let core = self.inner.register(id.clone(), doc);
        core.mark_ready();
        self.inner.persist_core(&core);
        self.inner.sync_to_all_peers(&core);
        log::info!("[Repo] Created {}", id.address());
        Ok(DocHandle::from_core(core))
    }

    /// Resolve an address to a handle without blocking.
    ///
    /// A document found in storage is ready immediately. Otherwise the handle
    /// starts not-ready and every known peer is asked for it; it becomes
    /// ready when one of them delivers content.
    ///
    /// A stored copy that cannot be read fails with
    /// [`VersoError::CorruptDocument`] and is left in storage untouched.
    pub fn find<T>(&self, address: &str) -> Result<DocHandle<T>> {
        let id = DocumentId::parse(address)?;
        Ok(DocHandle::from_core(self.inner.handle_core(&id, true)?))
    }

    /// Ids of every document with a live handle, sorted.
    pub fn handles(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self.inner.handles.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of every document in storage.
    pub fn stored(&self) -> Result<Vec<DocumentId>> {
        self.inner.storage.list()
    }

    /// Drop the live handle and remove the document from storage.
    ///
    /// Existing handle clones keep their last state but are no longer
    /// persisted or synced.
    pub fn delete(&self, address: &str) -> Result<()> {
        let id = DocumentId::parse(address)?;
        self.inner.handles.lock().unwrap().remove(&id);
        self.inner
            .sync_states
            .lock()
            .unwrap()
            .retain(|(_, doc), _| doc != &id);
        self.inner.storage.delete(&id)?;
        log::info!("[Repo] Deleted {}", id.address());
        Ok(())
    }

    /// Send transient data for `document_id` to every peer.
    pub fn broadcast_ephemeral(&self, document_id: &DocumentId, data: Vec<u8>) -> Result<()> {
        let Some(adapter) = self.inner.adapter() else {
            return Ok(());
        };
        let sender_id = adapter.peer_id().ok_or(crate::transport::TransportError::NoLocalPeerId)?;
        for peer in self.peers() {
            adapter.send(WireMessage::Ephemeral {
                sender_id: sender_id.clone(),
                target_id: peer,
                document_id: document_id.clone(),
                data: data.clone(),
            })?;
        }
        Ok(())
    }

    /// Listen for transient data from peers.
    pub fn on_ephemeral(&self, listener: EventCallback<EphemeralMessage>) -> SubscriptionId {
        self.inner.ephemeral.subscribe(listener)
    }

    /// Stop a listener registered with [`Repo::on_ephemeral`].
    pub fn off_ephemeral(&self, id: SubscriptionId) -> bool {
        self.inner.ephemeral.unsubscribe(id)
    }
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("peer_id", &self.inner.config.peer_id)
            .field("handles", &self.handles().len())
            .field("peers", &self.peers())
            .finish()
    }
}

impl RepoInner {
    fn adapter(&self) -> Option<Arc<dyn NetworkAdapter>> {
        self.network
            .lock()
            .unwrap()
            .as_ref()
            .map(|link| Arc::clone(&link.adapter))
    }

    /// Insert a handle core and wire its changes back into the repo.
    fn register(&self, id: DocumentId, doc: Automerge) -> Arc<HandleCore> {
        let core = Arc::new(HandleCore::new(id.clone(), doc));
        let weak = Weak::clone(&self.this);
        core.listen(Arc::new(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.on_handle_change(&id, change);
            }
        }));
        self.handles
            .lock()
            .unwrap()
            .insert(core.id().clone(), Arc::clone(&core));
        core
    }

    /// Existing handle, or a new one loaded from storage.
    ///
    /// With `request` set, a document missing from storage is asked for
    /// from every known peer.
    fn handle_core(&self, id: &DocumentId, request: bool) -> Result<Arc<HandleCore>> {
        if let Some(core) = self.handles.lock().unwrap().get(id) {
            return Ok(Arc::clone(core));
        }

        let stored = match self.storage.load(id)? {
            Some(bytes) => Some(Automerge::load(&bytes).map_err(|e| {
                log::error!("[Repo] Stored copy of {} is unreadable: {}", id, e);
                VersoError::CorruptDocument {
                    address: id.address(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let core = match stored {
            Some(doc) => {
                let core = self.register(id.clone(), doc);
                core.mark_ready();
                log::debug!("[Repo] Loaded {} from storage", id);
                core
            }
            None => {
                let core = self.register(id.clone(), Automerge::new());
                if request {
                    log::debug!("[Repo] {} not in storage; asking peers", id);
                    self.sync_to_all_peers(&core);
                }
                core
            }
        };
        Ok(core)
    }

    fn on_handle_change(&self, id: &DocumentId, change: &RawChange) {
        // Deleted documents are no longer persisted or synced.
        let core = self.handles.lock().unwrap().get(id).cloned();
        let Some(core) = core else {
            return;
        };
        self.persist(id, &change.doc);
        if change.origin == ChangeOrigin::Local {
            self.sync_to_all_peers(&core);
        }
    }

    fn persist(&self, id: &DocumentId, doc: &Automerge) {
        if let Err(e) = self.storage.save(id, &doc.save()) {
            log::error!("[Repo] Failed to persist {}: {}", id, e);
        }
    }

    fn persist_core(&self, core: &HandleCore) {
        let bytes = core.with_doc(|doc| doc.save());
        if let Err(e) = self.storage.save(core.id(), &bytes) {
            log::error!("[Repo] Failed to persist {}: {}", core.id(), e);
        }
    }

    fn sync_to_all_peers(&self, core: &HandleCore) {
        let peers: Vec<PeerId> = self.peers.lock().unwrap().keys().cloned().collect();
        for peer in peers {
            self.sync_to_peer(core, &peer);
        }
    }

    /// Send whatever automerge thinks `peer` is missing for this document.
    fn sync_to_peer(&self, core: &HandleCore, peer: &PeerId) {
        let Some(adapter) = self.adapter() else {
            return;
        };
        let Some(sender_id) = adapter.peer_id() else {
            return;
        };

        let message = {
            let mut states = self.sync_states.lock().unwrap();
            let state = states
                .entry((peer.clone(), core.id().clone()))
                .or_insert_with(sync::State::new);
            core.with_doc(|doc| doc.generate_sync_message(state))
        };
        let Some(message) = message else {
            return;
        };

        let data = message.encode();
        log::debug!(
            "[Repo] Sync {} -> {} ({} bytes)",
            core.id(),
            peer,
            data.len()
        );
        let wire = WireMessage::Sync {
            sender_id,
            target_id: peer.clone(),
            document_id: core.id().clone(),
            data,
        };
        if let Err(e) = adapter.send(wire) {
            log::warn!("[Repo] Failed to sync {} to {}: {}", core.id(), peer, e);
        }
    }

    fn on_network_event(&self, event: &NetworkEvent) {
        match event {
            NetworkEvent::Ready => log::debug!("[Repo] Network ready"),
            NetworkEvent::PeerCandidate { peer_id, metadata } => {
                self.on_peer_candidate(peer_id, metadata)
            }
            NetworkEvent::PeerDisconnected { peer_id } => self.on_peer_disconnected(peer_id),
            NetworkEvent::Message(message) => self.on_message(message),
        }
    }

    fn on_peer_candidate(&self, peer_id: &PeerId, metadata: &PeerMetadata) {
        log::info!(
            "[Repo] Peer {} available{}",
            peer_id,
            if metadata.is_ephemeral { " (ephemeral)" } else { "" }
        );
        self.peers
            .lock()
            .unwrap()
            .insert(peer_id.clone(), metadata.clone());
        self.sync_states
            .lock()
            .unwrap()
            .retain(|(peer, _), _| peer != peer_id);

        let cores: Vec<Arc<HandleCore>> = self.handles.lock().unwrap().values().cloned().collect();
        for core in cores {
            self.sync_to_peer(&core, peer_id);
        }
    }

    fn on_peer_disconnected(&self, peer_id: &PeerId) {
        log::info!("[Repo] Peer {} disconnected", peer_id);
        self.peers.lock().unwrap().remove(peer_id);
        self.sync_states
            .lock()
            .unwrap()
            .retain(|(peer, _), _| peer != peer_id);
    }

    fn on_message(&self, message: &WireMessage) {
        let local = self.adapter().and_then(|adapter| adapter.peer_id());
        if message.target_id().is_some() && message.target_id() != local.as_ref() {
            log::debug!(
                "[Repo] Ignoring {} addressed to {:?}",
                message.kind(),
                message.target_id()
            );
            return;
        }

        match message {
            WireMessage::Sync {
                sender_id,
                document_id,
                data,
                ..
            } => self.on_sync(sender_id, document_id, data),
            WireMessage::Ephemeral {
                sender_id,
                document_id,
                data,
                ..
            } => self.ephemeral.emit(&EphemeralMessage {
                sender_id: sender_id.clone(),
                document_id: document_id.clone(),
                data: data.clone(),
            }),
            WireMessage::DocUnavailable {
                sender_id,
                document_id,
                ..
            } => {
                let core = self.handles.lock().unwrap().get(document_id).cloned();
                if let Some(core) = core {
                    if !core.is_ready() {
                        log::info!("[Repo] {} reports {} unavailable", sender_id, document_id);
                        core.mark_unavailable();
                    }
                }
            }
            WireMessage::Join { .. } | WireMessage::Peer { .. } => {
                log::debug!("[Repo] Ignoring handshake message {}", message.kind())
            }
        }
    }

    fn on_sync(&self, sender: &PeerId, document_id: &DocumentId, data: &[u8]) {
        let message = match decode_sync(data) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[Repo] Dropping sync for {} from {}: {}", document_id, sender, e);
                return;
            }
        };
        let sender_has_nothing = message.heads.is_empty();

        let core = match self.handle_core(document_id, false) {
            Ok(core) => core,
            Err(e) => {
                log::error!("[Repo] Cannot sync {} from {}: {}", document_id, sender, e);
                return;
            }
        };
        let key = (sender.clone(), document_id.clone());
        let mut state = self
            .sync_states
            .lock()
            .unwrap()
            .remove(&key)
            .unwrap_or_else(sync::State::new);
        let result = core.apply(ChangeOrigin::Remote, |doc| {
            doc.receive_sync_message(&mut state, message)
        });
        self.sync_states.lock().unwrap().insert(key, state);

        if let Err(e) = result {
            log::warn!(
                "[Repo] Rejected sync for {} from {}: {}",
                document_id,
                sender,
                VersoError::from(e)
            );
            return;
        }

        let have_content = !core.heads().is_empty();
        if have_content {
            core.mark_ready();
        } else if sender_has_nothing && !self.has_other_peers(sender) {
            self.send_unavailable(sender, document_id);
            return;
        }

        self.sync_to_all_peers(&core);
    }

    fn has_other_peers(&self, peer: &PeerId) -> bool {
        self.peers.lock().unwrap().keys().any(|p| p != peer)
    }

    fn send_unavailable(&self, peer: &PeerId, document_id: &DocumentId) {
        let Some(adapter) = self.adapter() else {
            return;
        };
        let Some(sender_id) = adapter.peer_id() else {
            return;
        };
        log::debug!("[Repo] Telling {} that {} is unavailable", peer, document_id);
        let wire = WireMessage::DocUnavailable {
            sender_id,
            target_id: peer.clone(),
            document_id: document_id.clone(),
        };
        if let Err(e) = adapter.send(wire) {
            log::warn!("[Repo] Failed to send doc-unavailable to {}: {}", peer, e);
        }
    }
}

fn decode_sync(data: &[u8]) -> Result<sync::Message> {
    sync::Message::decode(data).map_err(|e| VersoError::SyncMessage(e.to_string()))
}
