//! Host side of the adapter pair.
//!
//! The host process owns one channel per renderer window. Renderers announce
//! themselves with `join`; the host answers with `peer` and from then on
//! routes outbound messages to the channel the renderer joined on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use super::adapter::{AdapterCore, EventListener, NetworkAdapter, NetworkEvent};
use super::{AdapterState, IpcChannel, PeerId, PeerMetadata, TransportError, WireMessage};
use crate::callback_registry::SubscriptionId;

struct RendererSlot {
    channel: Arc<dyn IpcChannel>,
    listener: Option<SubscriptionId>,
}

/// Network adapter for the host process.
pub struct HostAdapter {
    core: AdapterCore,
    slots: Mutex<Vec<RendererSlot>>,
    /// Joined renderers, by peer id, to their slot index.
    renderers: Mutex<HashMap<PeerId, usize>>,
    this: Weak<HostAdapter>,
}

impl HostAdapter {
    /// Create an adapter over the given renderer channels.
    pub fn new(channels: Vec<Arc<dyn IpcChannel>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            core: AdapterCore::new("HostAdapter"),
            slots: Mutex::new(
                channels
                    .into_iter()
                    .map(|channel| RendererSlot {
                        channel,
                        listener: None,
                    })
                    .collect(),
            ),
            renderers: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    /// Add a channel for a window opened after construction.
    ///
    /// If the adapter is already connected the channel is listened to
    /// immediately.
    pub fn attach_renderer(&self, channel: Arc<dyn IpcChannel>) {
        let mut slots = self.slots.lock().unwrap();
        let index = slots.len();
        let listener = match self.core.state() {
            AdapterState::Connecting | AdapterState::Ready => {
                Some(self.listen(index, channel.as_ref()))
            }
            _ => None,
        };
        slots.push(RendererSlot { channel, listener });
        log::debug!("[HostAdapter] Attached renderer channel #{}", index);
    }

    /// Forget a renderer whose window has closed.
    pub fn renderer_gone(&self, peer_id: &PeerId) {
        let removed = self.renderers.lock().unwrap().remove(peer_id).is_some();
        if removed {
            log::info!("[HostAdapter] Renderer {} left", peer_id);
            self.core.emit(&NetworkEvent::PeerDisconnected {
                peer_id: peer_id.clone(),
            });
        }
    }

    /// Renderers that have joined, sorted by id.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.renderers.lock().unwrap().keys().cloned().collect();
        peers.sort();
        peers
    }

    fn listen(&self, index: usize, channel: &dyn IpcChannel) -> SubscriptionId {
        let this = self.this.clone();
        channel.on_message(Arc::new(move |message| {
            if let Some(host) = this.upgrade() {
                host.handle_inbound(index, message);
            }
        }))
    }

    fn channel_at(&self, index: usize) -> Option<Arc<dyn IpcChannel>> {
        self.slots
            .lock()
            .unwrap()
            .get(index)
            .map(|slot| Arc::clone(&slot.channel))
    }

    fn handle_inbound(&self, index: usize, message: &WireMessage) {
        match message {
            WireMessage::Join {
                sender_id,
                peer_metadata,
            } => self.handle_join(index, sender_id, peer_metadata),
            other => {
                if let Err(e) = self.receive_message(other.clone()) {
                    log::warn!(
                        "[HostAdapter] Dropping {} from {}: {}",
                        other.kind(),
                        other.sender_id(),
                        e
                    );
                }
            }
        }
    }

    fn handle_join(&self, index: usize, renderer: &PeerId, metadata: &PeerMetadata) {
        let (Some(local), Some(local_metadata)) = (self.core.peer_id(), self.core.peer_metadata())
        else {
            log::warn!("[HostAdapter] Ignoring join from {} before connect", renderer);
            return;
        };
        let Some(channel) = self.channel_at(index) else {
            return;
        };

        self.renderers
            .lock()
            .unwrap()
            .insert(renderer.clone(), index);
        log::info!("[HostAdapter] Renderer {} joined on channel #{}", renderer, index);

        let reply = WireMessage::Peer {
            sender_id: local,
            target_id: renderer.clone(),
            peer_metadata: local_metadata,
        };
        if let Err(e) = channel.post(&reply) {
            log::error!("[HostAdapter] Failed to answer join from {}: {}", renderer, e);
            return;
        }
        self.core.emit(&NetworkEvent::PeerCandidate {
            peer_id: renderer.clone(),
            metadata: metadata.clone(),
        });
    }
}

impl NetworkAdapter for HostAdapter {
    fn connect(&self, peer_id: PeerId, metadata: PeerMetadata) -> Result<(), TransportError> {
        self.core.begin_connect(peer_id.clone(), metadata)?;
        {
            let mut slots = self.slots.lock().unwrap();
            for (index, slot) in slots.iter_mut().enumerate() {
                slot.listener = Some(self.listen(index, slot.channel.as_ref()));
            }
            log::info!(
                "[HostAdapter] Connected as {} with {} renderer channel(s)",
                peer_id,
                slots.len()
            );
        }
        self.core.finish_connect();
        Ok(())
    }

    fn send(&self, message: WireMessage) -> Result<(), TransportError> {
        let target = self.core.check_outbound(&message)?;
        let index = self.renderers.lock().unwrap().get(&target).copied();
        let Some(channel) = index.and_then(|i| self.channel_at(i)) else {
            // Expected when a window closed while traffic was in flight.
            log::warn!(
                "[HostAdapter] No renderer {}; dropping {}",
                target,
                message.kind()
            );
            return Ok(());
        };
        channel.post(&message)
    }

    fn receive_message(&self, message: WireMessage) -> Result<(), TransportError> {
        self.core.receive(message)
    }

    fn disconnect(&self) {
        for slot in self.slots.lock().unwrap().iter_mut() {
            if let Some(id) = slot.listener.take() {
                slot.channel.off_message(id);
            }
        }
        self.renderers.lock().unwrap().clear();
        self.core.reset();
        log::info!("[HostAdapter] Disconnected");
    }

    fn state(&self) -> AdapterState {
        self.core.state()
    }

    fn peer_id(&self) -> Option<PeerId> {
        self.core.peer_id()
    }

    fn peer_metadata(&self) -> Option<PeerMetadata> {
        self.core.peer_metadata()
    }

    fn on_event(&self, listener: EventListener) -> SubscriptionId {
        self.core.on_event(listener)
    }

    fn off_event(&self, id: SubscriptionId) -> bool {
        self.core.off_event(id)
    }
}

impl std::fmt::Debug for HostAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostAdapter")
            .field("core", &self.core)
            .field("channels", &self.slots.lock().unwrap().len())
            .field("renderers", &self.peers())
            .finish()
    }
}
