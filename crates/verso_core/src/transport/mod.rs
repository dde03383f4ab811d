//! Peer transport between the host process and renderer windows.
//!
//! The desktop app runs one host process and one or more renderer windows,
//! each with its own event loop and no shared memory. They talk over an
//! [`IpcChannel`]. On top of each channel sits a [`NetworkAdapter`]:
//!
//! - [`HostAdapter`] listens on every renderer channel, answers `join` with
//!   `peer`, and routes outbound messages by target peer id.
//! - [`RendererAdapter`] owns one channel to the host, posts `join` on
//!   connect and treats the host as a peer once `peer` comes back.
//!
//! Adapters carry opaque sync payloads; the [`Repo`](crate::repo::Repo)
//! decides what to send.
//!
//! Sending to a renderer that is not (or no longer) registered is logged and
//! dropped. Sending without a local peer id is a [`TransportError`]. The first
//! is a normal race when a window closes; the second is a caller bug.

mod adapter;
mod channel;
mod error;
mod host;
mod message;
mod renderer;

pub use adapter::{AdapterState, EventListener, NetworkAdapter, NetworkEvent};
pub use channel::{IpcChannel, MemoryChannel, MessageListener};
pub use error::TransportError;
pub use host::HostAdapter;
pub use message::{PeerId, PeerMetadata, WireMessage};
pub use renderer::RendererAdapter;
