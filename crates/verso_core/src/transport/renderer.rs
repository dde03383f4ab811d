//! Renderer side of the adapter pair.

use std::sync::{Arc, Mutex, Weak};

use super::adapter::{AdapterCore, EventListener, NetworkAdapter, NetworkEvent};
use super::{AdapterState, IpcChannel, PeerId, PeerMetadata, TransportError, WireMessage};
use crate::callback_registry::SubscriptionId;

/// Network adapter for a renderer window, talking to the host over one
/// channel.
///
/// `connect` posts `join` and reports ready at once, without waiting for the
/// host's `peer` answer. The host becomes a sync candidate when that answer
/// arrives.
pub struct RendererAdapter {
    core: AdapterCore,
    channel: Arc<dyn IpcChannel>,
    listener: Mutex<Option<SubscriptionId>>,
    host: Mutex<Option<PeerId>>,
    this: Weak<RendererAdapter>,
}

impl RendererAdapter {
    /// A renderer adapter posting to the host over `channel`.
    pub fn new(channel: Arc<dyn IpcChannel>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            core: AdapterCore::new("RendererAdapter"),
            channel,
            listener: Mutex::new(None),
            host: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// The host's peer id, once it has answered our join.
    pub fn host_peer(&self) -> Option<PeerId> {
        self.host.lock().unwrap().clone()
    }

    fn release_listener(&self) {
        if let Some(id) = self.listener.lock().unwrap().take() {
            self.channel.off_message(id);
        }
    }

    fn handle_inbound(&self, message: &WireMessage) {
        match message {
            WireMessage::Peer {
                sender_id,
                target_id,
                peer_metadata,
            } => {
                if self.core.peer_id().as_ref() != Some(target_id) {
                    log::debug!(
                        "[RendererAdapter] Ignoring peer message addressed to {}",
                        target_id
                    );
                    return;
                }
                *self.host.lock().unwrap() = Some(sender_id.clone());
                log::info!("[RendererAdapter] Host {} accepted join", sender_id);
                self.core.emit(&NetworkEvent::PeerCandidate {
                    peer_id: sender_id.clone(),
                    metadata: peer_metadata.clone(),
                });
            }
            other => {
                if let Err(e) = self.receive_message(other.clone()) {
                    log::warn!(
                        "[RendererAdapter] Dropping {} from {}: {}",
                        other.kind(),
                        other.sender_id(),
                        e
                    );
                }
            }
        }
    }
}

impl NetworkAdapter for RendererAdapter {
    fn connect(&self, peer_id: PeerId, metadata: PeerMetadata) -> Result<(), TransportError> {
        self.core.begin_connect(peer_id.clone(), metadata.clone())?;

        let this = self.this.clone();
        let id = self.channel.on_message(Arc::new(move |message| {
            if let Some(renderer) = this.upgrade() {
                renderer.handle_inbound(message);
            }
        }));
        *self.listener.lock().unwrap() = Some(id);

        let join = WireMessage::Join {
            sender_id: peer_id.clone(),
            peer_metadata: metadata,
        };
        if let Err(e) = self.channel.post(&join) {
            log::error!("[RendererAdapter] Failed to post join: {}", e);
            self.release_listener();
            self.core.abort_connect();
            return Err(e);
        }

        log::info!("[RendererAdapter] Connected as {}", peer_id);
        self.core.finish_connect();
        Ok(())
    }

    fn send(&self, message: WireMessage) -> Result<(), TransportError> {
        self.core.check_outbound(&message)?;
        self.channel.post(&message)
    }

    fn receive_message(&self, message: WireMessage) -> Result<(), TransportError> {
        self.core.receive(message)
    }

    fn disconnect(&self) {
        self.release_listener();
        let host = self.host.lock().unwrap().take();
        self.core.reset();
        log::info!("[RendererAdapter] Disconnected");
        if let Some(peer_id) = host {
            self.core.emit(&NetworkEvent::PeerDisconnected { peer_id });
        }
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

impl std::fmt::Debug for RendererAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererAdapter")
            .field("core", &self.core)
            .field("host", &self.host_peer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::DocumentId;
    use crate::transport::{HostAdapter, MemoryChannel};

    fn recorder(adapter: &dyn NetworkAdapter) -> Arc<Mutex<Vec<NetworkEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        adapter.on_event(Arc::new(move |e| events_clone.lock().unwrap().push(e.clone())));
        events
    }

    #[test]
    fn test_connect_posts_join_and_is_ready_immediately() {
        let (host_end, renderer_end) = MemoryChannel::pair();
        let renderer = RendererAdapter::new(Arc::new(renderer_end));
        let events = recorder(renderer.as_ref());

        renderer
            .connect("r1".into(), PeerMetadata::default())
            .unwrap();
        assert_eq!(renderer.state(), AdapterState::Ready);
        assert_eq!(host_end.pending(), 1);
        assert_eq!(*events.lock().unwrap(), vec![NetworkEvent::Ready]);
        assert_eq!(renderer.host_peer(), None);
    }

    #[test]
    fn test_failed_join_reverts_to_unconnected() {
        let (host_end, renderer_end) = MemoryChannel::pair();
        host_end.close();
        let renderer = RendererAdapter::new(Arc::new(renderer_end));

        assert!(matches!(
            renderer.connect("r1".into(), PeerMetadata::default()),
            Err(TransportError::ChannelClosed)
        ));
        assert_eq!(renderer.state(), AdapterState::Unconnected);
        assert_eq!(renderer.peer_id(), None);
    }

    #[test]
    fn test_handshake_with_host() {
        let (host_end, renderer_end) = MemoryChannel::pair();
        let host_end = Arc::new(host_end);
        let renderer_end = Arc::new(renderer_end);
        let host = HostAdapter::new(vec![host_end.clone() as Arc<dyn IpcChannel>]);
        let renderer = RendererAdapter::new(renderer_end.clone());
        let host_events = recorder(host.as_ref());
        let renderer_events = recorder(renderer.as_ref());

        host.connect("host".into(), PeerMetadata::default()).unwrap();
        renderer
            .connect(
                "r1".into(),
                PeerMetadata {
                    storage_id: None,
                    is_ephemeral: true,
                },
            )
            .unwrap();
        MemoryChannel::run_until_idle(&[host_end.as_ref(), renderer_end.as_ref()]);

        assert_eq!(renderer.host_peer(), Some(PeerId::from("host")));
        assert!(renderer_events.lock().unwrap().contains(&NetworkEvent::PeerCandidate {
            peer_id: "host".into(),
            metadata: PeerMetadata::default(),
        }));
        assert!(host_events.lock().unwrap().contains(&NetworkEvent::PeerCandidate {
            peer_id: "r1".into(),
            metadata: PeerMetadata {
                storage_id: None,
                is_ephemeral: true,
            },
        }));
    }

    #[test]
    fn test_send_checks_preconditions() {
        let (host_end, renderer_end) = MemoryChannel::pair();
        let renderer = RendererAdapter::new(Arc::new(renderer_end));
        let msg = |data: Vec<u8>| WireMessage::Sync {
            sender_id: "r1".into(),
            target_id: "host".into(),
            document_id: DocumentId::generate(),
            data,
        };

        assert!(matches!(
            renderer.send(msg(vec![1])),
            Err(TransportError::NoLocalPeerId)
        ));
        renderer
            .connect("r1".into(), PeerMetadata::default())
            .unwrap();
        assert!(matches!(
            renderer.send(msg(vec![])),
            Err(TransportError::EmptyPayload)
        ));
        assert_eq!(host_end.pending(), 1);
        renderer.send(msg(vec![4])).unwrap();
        assert_eq!(host_end.pending(), 2);
    }

    #[test]
    fn test_disconnect_announces_host_once_known() {
        let (host_end, renderer_end) = MemoryChannel::pair();
        let renderer_end = Arc::new(renderer_end);
        let renderer = RendererAdapter::new(renderer_end.clone());
        let events = recorder(renderer.as_ref());
        renderer
            .connect("r1".into(), PeerMetadata::default())
            .unwrap();

        host_end
            .post(&WireMessage::Peer {
                sender_id: "host".into(),
                target_id: "r1".into(),
                peer_metadata: PeerMetadata::default(),
            })
            .unwrap();
        renderer_end.deliver_pending();
        assert_eq!(renderer.host_peer(), Some(PeerId::from("host")));

        renderer.disconnect();
        assert_eq!(renderer.state(), AdapterState::Disconnected);
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&NetworkEvent::PeerDisconnected {
                peer_id: "host".into()
            })
        );
    }

    #[test]
    fn test_disconnect_without_host_emits_nothing() {
        let (_host_end, renderer_end) = MemoryChannel::pair();
        let renderer = RendererAdapter::new(Arc::new(renderer_end));
        let events = recorder(renderer.as_ref());
        renderer
            .connect("r1".into(), PeerMetadata::default())
            .unwrap();
        renderer.disconnect();
        assert_eq!(*events.lock().unwrap(), vec![NetworkEvent::Ready]);
    }
}
