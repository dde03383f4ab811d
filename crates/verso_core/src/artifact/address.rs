//! Document addresses.
//!
//! Every artifact is addressed as `doc:<id>`, where `<id>` is a URL- and
//! filename-safe token. The bare id is accepted wherever an address is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VersoError};

/// URL scheme prefix for document addresses.
pub const ADDRESS_SCHEME: &str = "doc:";

/// Stable identifier of one CRDT document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Parse either a full `doc:<id>` address or a bare id.
    pub fn parse(address: &str) -> Result<Self> {
        let id = address.strip_prefix(ADDRESS_SCHEME).unwrap_or(address);
        let valid = !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(id.to_string()))
        } else {
            Err(VersoError::InvalidAddress(address.to_string()))
        }
    }

    /// The bare id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The full `doc:<id>` address.
    pub fn address(&self) -> String {
        format!("{}{}", ADDRESS_SCHEME, self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = VersoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = VersoError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique_and_parseable() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();
        assert_ne!(a, b);
        assert_eq!(DocumentId::parse(&a.address()).unwrap(), a);
        assert_eq!(DocumentId::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in ["", "doc:", "doc:../etc/passwd", "doc:a b", "other:x/y"] {
            assert!(
                matches!(DocumentId::parse(bad), Err(VersoError::InvalidAddress(_))),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_serde_uses_bare_id() {
        let id = DocumentId::parse("doc:abc_123").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc_123""#);
        assert!(serde_json::from_str::<DocumentId>(r#""bad id""#).is_err());
    }
}
