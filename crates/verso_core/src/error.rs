use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::transport::TransportError;

/// Unified error type for verso operations
#[derive(Debug, Error)]
pub enum VersoError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Identity errors
    #[error("Invalid commit hash '{0}': expected 7-40 lowercase hex characters")]
    InvalidCommitHash(String),

    #[error("Invalid change id '{0}'")]
    InvalidChangeId(String),

    #[error("Change id '{0}' does not address CRDT history")]
    UnsupportedChangeId(String),

    #[error("Invalid document address '{0}'")]
    InvalidAddress(String),

    // Migration errors
    #[error("Cannot migrate backwards from schema version {current} to {target}")]
    VersionInversion { current: u32, target: u32 },

    #[error("Missing migration for version {0}")]
    MissingMigration(u32),

    #[error("Migration for version {0} is registered more than once")]
    DuplicateMigration(u32),

    #[error("Migration for version {version} failed: {message}")]
    MigrationFailed { version: u32, message: String },

    // CRDT errors
    #[error("CRDT error: {0}")]
    Crdt(#[from] automerge::AutomergeError),

    #[error("Sync message error: {0}")]
    SyncMessage(String),

    #[error("Stored copy of '{address}' is unreadable: {message}")]
    CorruptDocument { address: String, message: String },

    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Document '{0}' is not ready")]
    NotReady(String),

    // Transport errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias for verso operations
pub type Result<T> = std::result::Result<T, VersoError>;

/// A serializable representation of VersoError for IPC with the UI process
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&VersoError> for SerializableError {
    fn from(err: &VersoError) -> Self {
        let kind = match err {
            VersoError::Io(_) => "Io",
            VersoError::FileRead { .. } => "FileRead",
            VersoError::FileWrite { .. } => "FileWrite",
            VersoError::InvalidCommitHash(_) => "InvalidCommitHash",
            VersoError::InvalidChangeId(_) => "InvalidChangeId",
            VersoError::UnsupportedChangeId(_) => "UnsupportedChangeId",
            VersoError::InvalidAddress(_) => "InvalidAddress",
            VersoError::VersionInversion { .. } => "VersionInversion",
            VersoError::MissingMigration(_) => "MissingMigration",
            VersoError::DuplicateMigration(_) => "DuplicateMigration",
            VersoError::MigrationFailed { .. } => "MigrationFailed",
            VersoError::Crdt(_) => "Crdt",
            VersoError::SyncMessage(_) => "SyncMessage",
            VersoError::CorruptDocument { .. } => "CorruptDocument",
            VersoError::Payload(_) => "Payload",
            VersoError::InvalidPayload(_) => "InvalidPayload",
            VersoError::NotReady(_) => "NotReady",
            VersoError::Transport(_) => "Transport",
            VersoError::ConfigParse(_) => "ConfigParse",
            VersoError::ConfigSerialize(_) => "ConfigSerialize",
            VersoError::NoConfigDir => "NoConfigDir",
        }
        .to_string();

        let path = match err {
            VersoError::FileRead { path, .. } => Some(path.clone()),
            VersoError::FileWrite { path, .. } => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<VersoError> for SerializableError {
    fn from(err: VersoError) -> Self {
        SerializableError::from(&err)
    }
}

impl VersoError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }

    /// Whether this error indicates a build-time inconsistency rather than bad input.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            VersoError::VersionInversion { .. }
                | VersoError::MissingMigration(_)
                | VersoError::DuplicateMigration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializable_kind() {
        let err = VersoError::MissingMigration(2);
        let ser = err.to_serializable();
        assert_eq!(ser.kind, "MissingMigration");
        assert_eq!(ser.message, "Missing migration for version 2");
        assert!(ser.path.is_none());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(VersoError::MissingMigration(3).is_configuration_error());
        assert!(
            VersoError::VersionInversion {
                current: 4,
                target: 2
            }
            .is_configuration_error()
        );
        assert!(!VersoError::InvalidCommitHash("zz".into()).is_configuration_error());
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let err: VersoError = TransportError::NoLocalPeerId.into();
        assert_eq!(err.to_string(), TransportError::NoLocalPeerId.to_string());
    }
}
