//! Canonical identity for a point in an artifact's history.
//!
//! Two version-control substrates coexist: the CRDT document, whose history
//! points are ordered sets of head hashes, and an immutable hash chain, whose
//! points are single commit hashes. [`ChangeId`] unifies both, plus a
//! sentinel for the current, not-yet-committed working state.
//!
//! # URL form
//!
//! Change ids travel inside application addresses:
//!
//! - head-sets: `encodeURIComponent(JSON.stringify(heads))`
//! - commit hashes: the hash itself
//! - the working state: `uncommitted`
//!
//! ```ignore
//! use verso_core::change_id::{ChangeId, CommitId};
//!
//! let id = ChangeId::Commit(CommitId::Heads(vec!["ab12".into(), "cd34".into()]));
//! let encoded = id.url_encode();
//! assert_eq!(encoded, "%5B%22ab12%22%2C%22cd34%22%5D");
//! ```

use std::fmt;
use std::str::FromStr;

use automerge::ChangeHash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, VersoError};

/// String form of [`ChangeId::Uncommitted`].
pub const UNCOMMITTED: &str = "uncommitted";

const MIN_HASH_LEN: usize = 7;
const MAX_HASH_LEN: usize = 40;

/// A validated hash-chain commit id (`[0-9a-f]{7,40}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    /// Parse a commit hash, rejecting anything outside `[0-9a-f]{7,40}`.
    pub fn parse(input: &str) -> Result<Self> {
        let valid = (MIN_HASH_LEN..=MAX_HASH_LEN).contains(&input.len())
            && input.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if valid {
            Ok(Self(input.to_string()))
        } else {
            Err(VersoError::InvalidCommitHash(input.to_string()))
        }
    }

    /// The hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommitHash {
    type Err = VersoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommitHash {
    type Error = VersoError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CommitHash> for String {
    fn from(hash: CommitHash) -> Self {
        hash.0
    }
}

/// A committed point in history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommitId {
    /// Ordered CRDT head set. Order is part of the identity: it records one
    /// replica's view of its concurrent heads.
    Heads(Vec<String>),
    /// Single hash-chain commit.
    Hash(CommitHash),
}

impl CommitId {
    /// Build a head-set id from automerge heads, keeping their order.
    pub fn from_heads(heads: &[ChangeHash]) -> Self {
        CommitId::Heads(heads.iter().map(|h| h.to_string()).collect())
    }

    /// Convert a head-set back into automerge change hashes.
    ///
    /// Hash-chain commits have no CRDT counterpart and are rejected.
    pub fn to_change_hashes(&self) -> Result<Vec<ChangeHash>> {
        match self {
            CommitId::Heads(heads) => heads
                .iter()
                .map(|h| {
                    h.parse::<ChangeHash>()
                        .map_err(|_| VersoError::InvalidChangeId(h.clone()))
                })
                .collect(),
            CommitId::Hash(hash) => Err(VersoError::UnsupportedChangeId(hash.to_string())),
        }
    }
}

/// Any point in history, including the uncommitted working state.
///
/// Equality holds only within one variant family: a head-set never equals a
/// hash, and the sentinel equals only itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeId {
    /// A committed point.
    Commit(CommitId),
    /// The current working state.
    Uncommitted,
}

impl ChangeId {
    /// Shorthand for a head-set id.
    pub fn heads<I, S>(heads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ChangeId::Commit(CommitId::Heads(heads.into_iter().map(Into::into).collect()))
    }

    /// Shorthand for a validated hash-chain id.
    pub fn hash(input: &str) -> Result<Self> {
        Ok(ChangeId::Commit(CommitId::Hash(CommitHash::parse(input)?)))
    }

    /// True for the working-state sentinel.
    pub fn is_uncommitted(&self) -> bool {
        matches!(self, ChangeId::Uncommitted)
    }

    /// True for a single hash-chain commit.
    pub fn is_hash_commit(&self) -> bool {
        matches!(self, ChangeId::Commit(CommitId::Hash(_)))
    }

    /// True for a CRDT head-set.
    pub fn is_head_set(&self) -> bool {
        matches!(self, ChangeId::Commit(CommitId::Heads(_)))
    }

    /// The committed id, if this is not the working state.
    pub fn as_commit(&self) -> Option<&CommitId> {
        match self {
            ChangeId::Commit(commit) => Some(commit),
            ChangeId::Uncommitted => None,
        }
    }

    /// Encode for use inside a URL path segment or query value.
    pub fn url_encode(&self) -> String {
        urlencoding::encode(&self.to_string()).into_owned()
    }

    /// Parse any of the URL forms produced by [`ChangeId::url_encode`].
    pub fn from_url_param(param: &str) -> Result<Self> {
        let decoded = urlencoding::decode(param)
            .map_err(|_| VersoError::InvalidChangeId(param.to_string()))?;
        decoded.parse()
    }
}

impl From<CommitId> for ChangeId {
    fn from(commit: CommitId) -> Self {
        ChangeId::Commit(commit)
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeId::Commit(CommitId::Heads(heads)) => {
                write!(f, "{}", serde_json::Value::from(heads.clone()))
            }
            ChangeId::Commit(CommitId::Hash(hash)) => f.write_str(hash.as_str()),
            ChangeId::Uncommitted => f.write_str(UNCOMMITTED),
        }
    }
}

impl FromStr for ChangeId {
    type Err = VersoError;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with('[') {
            let heads: Vec<String> =
                serde_json::from_str(s).map_err(|_| VersoError::InvalidChangeId(s.to_string()))?;
            Ok(ChangeId::Commit(CommitId::Heads(heads)))
        } else if s == UNCOMMITTED {
            Ok(ChangeId::Uncommitted)
        } else {
            ChangeId::hash(s)
        }
    }
}

impl Serialize for ChangeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ChangeId::Commit(commit) => commit.serialize(serializer),
            ChangeId::Uncommitted => serializer.serialize_str(UNCOMMITTED),
        }
    }
}

impl<'de> Deserialize<'de> for ChangeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Heads(Vec<String>),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Heads(heads) => Ok(ChangeId::Commit(CommitId::Heads(heads))),
            Raw::Text(text) if text == UNCOMMITTED => Ok(ChangeId::Uncommitted),
            Raw::Text(text) => CommitHash::parse(&text)
                .map(|hash| ChangeId::Commit(CommitId::Hash(hash)))
                .map_err(D::Error::custom),
        }
    }
}

/// Decode a URL-encoded head-set.
///
/// Values arriving from URLs may be stale or hand-edited, so malformed input
/// is logged and yields `None` instead of an error.
pub fn decode_url_encoded_head_set(encoded: &str) -> Option<CommitId> {
    let decoded = match urlencoding::decode(encoded) {
        Ok(decoded) => decoded,
        Err(e) => {
            log::warn!("Failed to percent-decode head set '{}': {}", encoded, e);
            return None;
        }
    };

    match serde_json::from_str::<Vec<String>>(&decoded) {
        Ok(heads) => Some(CommitId::Heads(heads)),
        Err(e) => {
            log::warn!("Failed to parse head set '{}': {}", decoded, e);
            None
        }
    }
}
