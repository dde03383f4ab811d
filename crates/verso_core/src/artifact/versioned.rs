//! Immutable, typed snapshots of a CRDT document.

use std::marker::PhantomData;
use std::sync::Arc;

use automerge::transaction::Transactable;
use automerge::{AutoSerde, Automerge, ChangeHash, ROOT};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::json::write_json_root;
use crate::change_id::{ChangeId, CommitId};
use crate::error::{Result, VersoError};
use crate::migration::{self, DEFAULT_SCHEMA_VERSION, SCHEMA_VERSION_KEY};

/// An immutable snapshot of payload type `T`.
///
/// Snapshots are produced by the CRDT substrate whenever a change commits.
/// They are cheap to clone and never mutated; edits go through a
/// [`DocHandle`](super::DocHandle) or produce a new snapshot.
pub struct VersionedArtifact<T> {
    doc: Arc<Automerge>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> VersionedArtifact<T> {
    pub(crate) fn from_doc(doc: Automerge) -> Self {
        Self::from_shared(Arc::new(doc))
    }

    pub(crate) fn from_shared(doc: Arc<Automerge>) -> Self {
        Self {
            doc,
            _payload: PhantomData,
        }
    }

    /// An empty document with no history.
    pub fn empty() -> Self {
        Self::from_doc(Automerge::new())
    }

    /// Load a snapshot from its saved binary form.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_doc(Automerge::load(bytes)?))
    }

    /// Encode the full document, including history.
    pub fn save(&self) -> Vec<u8> {
        self.doc.save()
    }

    /// The underlying CRDT document, for read-only collaborators.
    pub fn doc(&self) -> &Automerge {
        &self.doc
    }

    /// The document's current heads, in the order the substrate reports them.
    pub fn heads(&self) -> Vec<ChangeHash> {
        self.doc.get_heads()
    }

    /// The head-set identity of this snapshot.
    pub fn change_id(&self) -> ChangeId {
        ChangeId::Commit(CommitId::from_heads(&self.heads()))
    }

    /// Whether the document has no history at all.
    pub fn is_empty(&self) -> bool {
        self.doc.get_heads().is_empty()
    }

    /// Schema version stored in the payload, `1` when absent.
    pub fn schema_version(&self) -> u32 {
        migration::schema_version_of(&*self.doc)
    }

    /// The payload as untyped JSON.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(AutoSerde::from(self.doc.as_ref()))?)
    }

    /// The snapshot as it was at `id`.
    ///
    /// Head-sets fork the history at those heads; the uncommitted sentinel
    /// returns this snapshot. Hash-chain commits do not address CRDT history.
    pub fn at(&self, id: &ChangeId) -> Result<Self> {
        match id {
            ChangeId::Uncommitted => Ok(self.clone()),
            ChangeId::Commit(commit @ CommitId::Heads(_)) => {
                let heads = commit.to_change_hashes()?;
                Ok(Self::from_doc(self.doc.fork_at(&heads)?))
            }
            ChangeId::Commit(CommitId::Hash(hash)) => {
                Err(VersoError::UnsupportedChangeId(hash.to_string()))
            }
        }
    }
}

impl<T: DeserializeOwned> VersionedArtifact<T> {
    /// Deserialize the payload.
    pub fn value(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json()?)?)
    }
}

impl<T: Serialize> VersionedArtifact<T> {
    /// Build a new single-change document holding `value`.
    pub fn from_value(value: &T) -> Result<Self> {
        Ok(Self::from_doc(document_from_value(value)?))
    }
}

/// A fresh document whose first change writes `value` at the root.
///
/// An empty object still gets one change, recording the default schema
/// version, so the document has a history peers can sync.
pub(crate) fn document_from_value<T: Serialize>(value: &T) -> Result<Automerge> {
    let json = serde_json::to_value(value)?;
    let mut doc = Automerge::new();
    let mut tx = doc.transaction();
    let written = write_json_root(&mut tx, &json).and_then(|()| {
        if json.as_object().is_some_and(|map| map.is_empty()) {
            tx.put(ROOT, SCHEMA_VERSION_KEY, DEFAULT_SCHEMA_VERSION as i64)?;
        }
        Ok(())
    });
    if let Err(e) = written {
        tx.rollback();
        return Err(e);
    }
    tx.commit();
    Ok(doc)
}

impl<T> Clone for VersionedArtifact<T> {
    fn clone(&self) -> Self {
        Self::from_shared(Arc::clone(&self.doc))
    }
}

impl<T> std::fmt::Debug for VersionedArtifact<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedArtifact")
            .field("heads", &self.heads())
            .field("schema_version", &self.schema_version())
            .finish()
    }
}
