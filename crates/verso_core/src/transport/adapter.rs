//! The adapter contract shared by the host and renderer sides.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{PeerId, PeerMetadata, TransportError, WireMessage};
use crate::callback_registry::{CallbackRegistry, EventCallback, SubscriptionId};

/// Adapter lifecycle. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum AdapterState {
    /// Created, `connect` not yet called.
    Unconnected,
    /// Identity recorded, listeners being registered.
    Connecting,
    /// Able to send and receive.
    Ready,
    /// Reset by `disconnect`.
    Disconnected,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterState::Unconnected => "unconnected",
            AdapterState::Connecting => "connecting",
            AdapterState::Ready => "ready",
            AdapterState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Something an adapter reports to the layer above it.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// The adapter finished connecting.
    Ready,
    /// A peer announced itself and can be synced with.
    PeerCandidate {
        /// The announcing peer.
        peer_id: PeerId,
        /// What it announced about itself.
        metadata: PeerMetadata,
    },
    /// A peer went away.
    PeerDisconnected {
        /// The peer that left.
        peer_id: PeerId,
    },
    /// A message for the local peer arrived.
    Message(WireMessage),
}

/// Listener for adapter events.
pub type EventListener = EventCallback<NetworkEvent>;

/// A transport endpoint the repo can sync through.
///
/// Methods take `&self`; implementations use interior mutability so one
/// adapter can be shared between the repo and the channel listeners that
/// feed it.
pub trait NetworkAdapter: Send + Sync {
    /// Record the local identity and start listening.
    ///
    /// Fails with [`TransportError::InvalidState`] unless the adapter is
    /// [`AdapterState::Unconnected`].
    fn connect(&self, peer_id: PeerId, metadata: PeerMetadata) -> Result<(), TransportError>;

    /// Send a message to `message.target_id()`.
    fn send(&self, message: WireMessage) -> Result<(), TransportError>;

    /// Feed an inbound message to the layer above.
    fn receive_message(&self, message: WireMessage) -> Result<(), TransportError>;

    /// Forget the local identity and release channel listeners.
    fn disconnect(&self);

    /// Where the adapter is in its lifecycle.
    fn state(&self) -> AdapterState;

    /// The local peer id, once connected.
    fn peer_id(&self) -> Option<PeerId>;

    /// The metadata announced by the local peer, once connected.
    fn peer_metadata(&self) -> Option<PeerMetadata>;

    /// Listen for peer and message events.
    fn on_event(&self, listener: EventListener) -> SubscriptionId;

    /// Stop a listener registered with [`NetworkAdapter::on_event`].
    fn off_event(&self, id: SubscriptionId) -> bool;

    /// Whether the adapter can send.
    fn is_ready(&self) -> bool {
        self.state() == AdapterState::Ready
    }
}

/// State and checks common to both adapter sides.
pub(crate) struct AdapterCore {
    name: &'static str,
    state: Mutex<AdapterState>,
    identity: Mutex<Option<(PeerId, PeerMetadata)>>,
    events: CallbackRegistry<NetworkEvent>,
}

impl AdapterCore {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(AdapterState::Unconnected),
            identity: Mutex::new(None),
            events: CallbackRegistry::new(),
        }
    }

    pub fn state(&self) -> AdapterState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, next: AdapterState) {
        let mut state = self.state.lock().unwrap();
        log::debug!("[{}] {} -> {}", self.name, *state, next);
        *state = next;
    }

    /// Move `Unconnected -> Connecting` and record the identity.
    pub fn begin_connect(&self, peer_id: PeerId, metadata: PeerMetadata) -> Result<(), TransportError> {
        let current = self.state();
        if current != AdapterState::Unconnected {
            return Err(TransportError::InvalidState {
                operation: "connect",
                state: current,
            });
        }
        *self.identity.lock().unwrap() = Some((peer_id, metadata));
        self.set_state(AdapterState::Connecting);
        Ok(())
    }

    /// Undo a failed `begin_connect`.
    pub fn abort_connect(&self) {
        *self.identity.lock().unwrap() = None;
        self.set_state(AdapterState::Unconnected);
    }

    /// Move `Connecting -> Ready` and announce it.
    pub fn finish_connect(&self) {
        self.set_state(AdapterState::Ready);
        self.emit(&NetworkEvent::Ready);
    }

    /// Forget the identity and enter the terminal state.
    pub fn reset(&self) {
        *self.identity.lock().unwrap() = None;
        self.set_state(AdapterState::Disconnected);
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.identity.lock().unwrap().as_ref().map(|(id, _)| id.clone())
    }

    pub fn peer_metadata(&self) -> Option<PeerMetadata> {
        self.identity
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, metadata)| metadata.clone())
    }

    pub fn require_peer_id(&self) -> Result<PeerId, TransportError> {
        self.peer_id().ok_or(TransportError::NoLocalPeerId)
    }

    /// Precondition checks for an outbound message, in order: payload,
    /// local identity, then addressee. Returns the target.
    pub fn check_outbound(&self, message: &WireMessage) -> Result<PeerId, TransportError> {
        if message.payload().is_some_and(|data| data.is_empty()) {
            return Err(TransportError::EmptyPayload);
        }
        self.require_peer_id()?;
        message
            .target_id()
            .cloned()
            .ok_or(TransportError::MissingTarget)
    }

    /// Default inbound path: re-emit as [`NetworkEvent::Message`].
    pub fn receive(&self, message: WireMessage) -> Result<(), TransportError> {
        self.require_peer_id()?;
        self.emit(&NetworkEvent::Message(message));
        Ok(())
    }

    pub fn emit(&self, event: &NetworkEvent) {
        self.events.emit(event);
    }

    pub fn on_event(&self, listener: EventListener) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn off_event(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl fmt::Debug for AdapterCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.name)
            .field("state", &self.state())
            .field("peer_id", &self.peer_id())
            .finish()
    }
}
