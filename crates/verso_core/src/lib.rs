#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Versioned artifacts and live document handles
pub mod artifact;

/// Listener registry shared by handles, adapters and the repo
pub mod callback_registry;

/// Change identity (head-sets, commit hashes, the working state)
pub mod change_id;

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Merge conflict model
pub mod merge;

/// Schema migrations for artifact payloads
pub mod migration;

/// Synchronizing repository and storage backends
pub mod repo;

/// Host/renderer peer transport
pub mod transport;

pub use artifact::{ChangeEvent, ChangeOrigin, DocHandle, DocumentId, VersionedArtifact};
pub use change_id::{ChangeId, CommitId};
pub use error::{Result, VersoError};
pub use merge::MergeConflictInfo;
pub use migration::Migration;
pub use repo::{Repo, RepoConfig};
