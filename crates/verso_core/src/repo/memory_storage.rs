//! In-memory storage implementation for testing.
//!
//! This provides a simple in-memory implementation of [`ArtifactStorage`]
//! for use in unit tests and short-lived tools.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::storage::{ArtifactStorage, StorageResult};
use crate::artifact::DocumentId;

/// In-memory artifact storage for testing.
///
/// Clones share the same underlying map, so a test can keep one clone to
/// inspect what the repo wrote through the other.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    docs: Arc<RwLock<HashMap<DocumentId, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.docs.read().unwrap().is_empty()
    }
}

impl ArtifactStorage for MemoryStorage {
    fn load(&self, id: &DocumentId) -> StorageResult<Option<Vec<u8>>> {
        let docs = self.docs.read().unwrap();
        Ok(docs.get(id).cloned())
    }

    fn save(&self, id: &DocumentId, bytes: &[u8]) -> StorageResult<()> {
        let mut docs = self.docs.write().unwrap();
        docs.insert(id.clone(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, id: &DocumentId) -> StorageResult<()> {
        let mut docs = self.docs.write().unwrap();
        docs.remove(id);
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<DocumentId>> {
        let docs = self.docs.read().unwrap();
        let mut ids: Vec<DocumentId> = docs.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
