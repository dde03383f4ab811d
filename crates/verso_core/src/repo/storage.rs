//! Storage abstraction for artifact persistence.
//!
//! This module defines the [`ArtifactStorage`] trait which abstracts over
//! storage backends (files on native, memory for tests) for persisting saved
//! CRDT documents. The repo treats storage as await-and-log: failures are
//! reported, never retried.

use crate::artifact::DocumentId;
use crate::error::VersoError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, VersoError>;

/// Trait for artifact storage backends.
///
/// Each document is stored as one compacted binary blob, overwritten on every
/// save.
pub trait ArtifactStorage: Send + Sync {
    /// Load the saved document.
    ///
    /// Returns `None` if the document doesn't exist.
    fn load(&self, id: &DocumentId) -> StorageResult<Option<Vec<u8>>>;

    /// Save the full document, replacing any previous state.
    fn save(&self, id: &DocumentId, bytes: &[u8]) -> StorageResult<()>;

    /// Delete a document. Deleting a missing document is not an error.
    fn delete(&self, id: &DocumentId) -> StorageResult<()>;

    /// List all stored document ids.
    fn list(&self) -> StorageResult<Vec<DocumentId>>;

    /// Check if a document exists in storage.
    fn exists(&self, id: &DocumentId) -> StorageResult<bool> {
        Ok(self.load(id)?.is_some())
    }
}
