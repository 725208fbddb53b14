//! Frame codec
//!
//! Inbound frames are text documents routed by their top-level `type`
//! discriminator. Outbound heartbeats are `{"id": <n>, "type": "ping"}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A decoded inbound frame
pub type Document = Value;

/// Discriminator literal carried by heartbeat frames
pub const HEARTBEAT_TYPE: &str = "ping";

/// Converts between raw frame text and [`Document`]s
///
/// The default is [`JsonCodec`]; a custom codec can be supplied through
/// [`ClientConfig::with_codec`](crate::ClientConfig::with_codec).
pub trait DocumentCodec: Send + Sync + fmt::Debug {
    /// Parse one inbound text frame
    fn decode(&self, raw: &str) -> Result<Document>;

    /// Render an outbound document as frame text
    fn encode(&self, document: &Document) -> Result<String>;
}

/// serde_json backed codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DocumentCodec for JsonCodec {
    fn decode(&self, raw: &str) -> Result<Document> {
        serde_json::from_str(raw).map_err(|e| Error::decode(e.to_string()))
    }

    fn encode(&self, document: &Document) -> Result<String> {
        serde_json::to_string(document)
            .map_err(|e| Error::Internal(format!("Failed to encode document: {}", e)))
    }
}

/// Heartbeat frame body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Session-scoped sequence id, starting at 1
    pub id: u64,

    /// Always [`HEARTBEAT_TYPE`]
    #[serde(rename = "type")]
    pub kind: String,
}

impl Heartbeat {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            kind: HEARTBEAT_TYPE.to_string(),
        }
    }
}

/// Get the string `type` discriminator of a document, if any
pub fn extract_type(document: &Document) -> Option<&str> {
    document.get("type").and_then(Value::as_str)
}

/// Encode the heartbeat frame for `id` through `codec`
pub fn encode_heartbeat(codec: &dyn DocumentCodec, id: u64) -> Result<String> {
    let document = serde_json::to_value(Heartbeat::new(id))
        .map_err(|e| Error::Internal(format!("Failed to build heartbeat: {}", e)))?;
    codec.encode(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_valid_document() {
        let doc = JsonCodec.decode(r#"{"type":"message","text":"hi"}"#).unwrap();
        assert_eq!(doc["text"], "hi");
        assert_eq!(extract_type(&doc), Some("message"));
    }

    #[test]
    fn test_decode_malformed_text() {
        let err = JsonCodec.decode("{not json").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_extract_type_absent() {
        assert_eq!(extract_type(&json!({"ok": true})), None);
        assert_eq!(extract_type(&json!([1, 2, 3])), None);
        assert_eq!(extract_type(&json!("message")), None);
    }

    #[test]
    fn test_extract_type_requires_string() {
        assert_eq!(extract_type(&json!({"type": 7})), None);
        assert_eq!(extract_type(&json!({"type": null})), None);
    }

    #[test]
    fn test_extract_type_is_top_level_only() {
        let doc = json!({"message": {"type": "message"}});
        assert_eq!(extract_type(&doc), None);
    }

    #[test]
    fn test_encode_heartbeat_shape() {
        let frame = encode_heartbeat(&JsonCodec, 1).unwrap();
        assert_eq!(frame, r#"{"id":1,"type":"ping"}"#);

        let parsed: Heartbeat = serde_json::from_str(&encode_heartbeat(&JsonCodec, 42).unwrap()).unwrap();
        assert_eq!(parsed, Heartbeat::new(42));
    }

    #[test]
    fn test_custom_codec_is_used_for_heartbeats() {
        #[derive(Debug)]
        struct Pretty;

        impl DocumentCodec for Pretty {
            fn decode(&self, raw: &str) -> Result<Document> {
                JsonCodec.decode(raw)
            }

            fn encode(&self, document: &Document) -> Result<String> {
                serde_json::to_string_pretty(document).map_err(|e| Error::Internal(e.to_string()))
            }
        }

        let frame = encode_heartbeat(&Pretty, 3).unwrap();
        assert!(frame.contains('\n'));
        assert_eq!(JsonCodec.decode(&frame).unwrap(), json!({"id": 3, "type": "ping"}));
    }
}
