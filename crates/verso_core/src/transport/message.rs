//! Wire messages exchanged between the host process and renderer windows.
//!
//! Messages travel as JSON objects tagged by `type`:
//!
//! ```json
//! { "type": "join", "senderId": "renderer-1", "peerMetadata": { "isEphemeral": true } }
//! { "type": "sync", "senderId": "host", "targetId": "renderer-1",
//!   "documentId": "3f2a...", "data": "<base64>" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::TransportError;
use crate::artifact::DocumentId;

/// Identity of one endpoint in the sync network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh id of the form `<prefix>-<uuid>`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}-{}", prefix, uuid::Uuid::new_v4().simple()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What a peer announces about itself when it joins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct PeerMetadata {
    /// Stable id of the peer's storage, if it persists documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_id: Option<String>,

    /// Whether the peer keeps nothing once it goes away.
    #[serde(default)]
    pub is_ephemeral: bool,
}

/// One message on an inter-process channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WireMessage {
    /// Renderer to host: announce a new renderer.
    Join {
        sender_id: PeerId,
        peer_metadata: PeerMetadata,
    },

    /// Host to renderer: acknowledge a join.
    Peer {
        sender_id: PeerId,
        target_id: PeerId,
        peer_metadata: PeerMetadata,
    },

    /// CRDT sync traffic for one document.
    Sync {
        sender_id: PeerId,
        target_id: PeerId,
        document_id: DocumentId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    /// Transient presence data for one document. Never persisted.
    Ephemeral {
        sender_id: PeerId,
        target_id: PeerId,
        document_id: DocumentId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    /// The sender does not have the requested document.
    DocUnavailable {
        sender_id: PeerId,
        target_id: PeerId,
        document_id: DocumentId,
    },
}

impl WireMessage {
    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Join { .. } => "join",
            WireMessage::Peer { .. } => "peer",
            WireMessage::Sync { .. } => "sync",
            WireMessage::Ephemeral { .. } => "ephemeral",
            WireMessage::DocUnavailable { .. } => "doc-unavailable",
        }
    }

    /// The peer that sent the message.
    pub fn sender_id(&self) -> &PeerId {
        match self {
            WireMessage::Join { sender_id, .. }
            | WireMessage::Peer { sender_id, .. }
            | WireMessage::Sync { sender_id, .. }
            | WireMessage::Ephemeral { sender_id, .. }
            | WireMessage::DocUnavailable { sender_id, .. } => sender_id,
        }
    }

    /// The addressee. `join` is a broadcast and has none.
    pub fn target_id(&self) -> Option<&PeerId> {
        match self {
            WireMessage::Join { .. } => None,
            WireMessage::Peer { target_id, .. }
            | WireMessage::Sync { target_id, .. }
            | WireMessage::Ephemeral { target_id, .. }
            | WireMessage::DocUnavailable { target_id, .. } => Some(target_id),
        }
    }

    /// The document a `sync`, `ephemeral` or `doc-unavailable` refers to.
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            WireMessage::Sync { document_id, .. }
            | WireMessage::Ephemeral { document_id, .. }
            | WireMessage::DocUnavailable { document_id, .. } => Some(document_id),
            _ => None,
        }
    }

    /// Opaque payload bytes, for the kinds that carry one.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            WireMessage::Sync { data, .. } | WireMessage::Ephemeral { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Encode for a channel.
    pub fn to_json(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a message read from a channel.
    pub fn from_json(json: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(json)?)
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_id() -> DocumentId {
        DocumentId::parse("doc:abc123").unwrap()
    }

    #[test]
    fn test_join_wire_shape() {
        let msg = WireMessage::Join {
            sender_id: "renderer-1".into(),
            peer_metadata: PeerMetadata {
                storage_id: None,
                is_ephemeral: true,
            },
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "join",
                "senderId": "renderer-1",
                "peerMetadata": { "isEphemeral": true }
            })
        );
        assert_eq!(msg.target_id(), None);
        assert_eq!(msg.payload(), None);
    }

    #[test]
    fn test_sync_payload_is_base64() {
        let msg = WireMessage::Sync {
            sender_id: "host".into(),
            target_id: "renderer-1".into(),
            document_id: doc_id(),
            data: vec![0, 1, 2, 255],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "sync");
        assert_eq!(value["targetId"], "renderer-1");
        assert_eq!(value["documentId"], "abc123");
        assert_eq!(value["data"], "AAEC/w==");

        let back = WireMessage::from_json(&value.to_string()).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.payload(), Some(&[0u8, 1, 2, 255][..]));
    }

    #[test]
    fn test_doc_unavailable_tag() {
        let msg = WireMessage::DocUnavailable {
            sender_id: "host".into(),
            target_id: "r".into(),
            document_id: doc_id(),
        };
        assert_eq!(serde_json::to_value(&msg).unwrap()["type"], "doc-unavailable");
        assert_eq!(msg.kind(), "doc-unavailable");
        assert_eq!(msg.document_id(), Some(&doc_id()));
    }

    #[test]
    fn test_rejects_malformed_messages() {
        assert!(WireMessage::from_json(r#"{"type":"bye","senderId":"x"}"#).is_err());
        assert!(
            WireMessage::from_json(
                r#"{"type":"sync","senderId":"a","targetId":"b","documentId":"d","data":"!!"}"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_generated_peer_ids_are_distinct() {
        let a = PeerId::generate("renderer");
        let b = PeerId::generate("renderer");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("renderer-"));
    }
}
