use thiserror::Error;

use super::AdapterState;

/// Errors raised by transport adapters and channels.
///
/// Precondition failures (`EmptyPayload`, `NoLocalPeerId`, `InvalidState`)
/// are fatal to the single call and never retried here. Sending to a peer
/// that has gone away is not an error at all; adapters log and drop it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Refusing to send an empty payload")]
    EmptyPayload,

    #[error("No local peer id; the adapter is not connected")]
    NoLocalPeerId,

    #[error("Cannot {operation} while adapter is {state}")]
    InvalidState {
        operation: &'static str,
        state: AdapterState,
    },

    #[error("Message has no target peer")]
    MissingTarget,

    #[error("Channel is closed")]
    ChannelClosed,

    #[error("Wire codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
