//! Versioned artifacts and their live handles.
//!
//! A [`VersionedArtifact`] is an immutable snapshot of one CRDT document. A
//! [`DocHandle`] is the live, mutable cell a process holds for that document;
//! it emits a [`ChangeEvent`] for every local or remote change that lands.
//!
//! Handles never perform I/O. Persistence and replication belong to the
//! [`Repo`](crate::repo::Repo) that resolved them.

mod address;
mod handle;
mod json;
mod versioned;

pub use address::{ADDRESS_SCHEME, DocumentId};
pub use handle::{ChangeEvent, ChangeSubscription, DocHandle};
pub(crate) use handle::{HandleCore, RawChange};
pub use json::{put_json, write_json_root};
pub use versioned::VersionedArtifact;
pub(crate) use versioned::document_from_value;

use serde::{Deserialize, Serialize};

/// Origin of a change, used to distinguish local edits from replicated ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    /// Change made through this process's handle.
    Local,

    /// Change received from a remote peer.
    Remote,
}

impl std::fmt::Display for ChangeOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeOrigin::Local => write!(f, "local"),
            ChangeOrigin::Remote => write!(f, "remote"),
        }
    }
}
