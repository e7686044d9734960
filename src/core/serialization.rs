//! # Payload Serialization
//!
//! The optional codec layer applied to entry payloads after unframing and before
//! framing. A server is configured with at most one format; without one, handlers see
//! raw payload bytes.
//!
//! ## Formats
//! - **Bincode**: compact binary, fastest
//! - **JSON**: human-readable, easiest for interop with other languages
//! - **MessagePack**: compact binary with a self-describing layout
//!
//! ## Usage
//! ```
//! use tcp_router::core::serialization::SerializationFormat;
//!
//! let json = SerializationFormat::Json;
//! let bytes = json.encode(&vec![1u32, 2, 3]).unwrap();
//! let back: Vec<u32> = json.decode(&bytes).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolError, Result};

/// Supported payload serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializationFormat {
    /// Binary compact format (default, fastest)
    #[default]
    Bincode,
    /// Human-readable JSON format (debugging, interop)
    Json,
    /// Compact binary format (MessagePack, efficient)
    MessagePack,
}

impl SerializationFormat {
    /// Serialize `value` into payload bytes
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializationFormat::Bincode => bincode::serialize(value)
                .map_err(|e| ProtocolError::SerializeError(e.to_string())),
            SerializationFormat::Json => {
                serde_json::to_vec(value).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            SerializationFormat::MessagePack => {
                rmp_serde::to_vec(value).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
        }
    }

    /// Deserialize payload bytes into `T`
    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            SerializationFormat::Bincode => bincode::deserialize(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            SerializationFormat::Json => serde_json::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            SerializationFormat::MessagePack => rmp_serde::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
        }
    }

    /// Configuration key for this format
    pub fn key(self) -> &'static str {
        match self {
            SerializationFormat::Bincode => "bincode",
            SerializationFormat::Json => "json",
            SerializationFormat::MessagePack => "msgpack",
        }
    }

    /// Parse a configuration key (case-insensitive)
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "bincode" => Some(SerializationFormat::Bincode),
            "json" => Some(SerializationFormat::Json),
            "msgpack" | "messagepack" => Some(SerializationFormat::MessagePack),
            _ => None,
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Bincode => "Bincode",
            SerializationFormat::Json => "JSON",
            SerializationFormat::MessagePack => "MessagePack",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Greeting {
        name: String,
        times: u8,
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_key_roundtrip() {
        for format in [
            SerializationFormat::Bincode,
            SerializationFormat::Json,
            SerializationFormat::MessagePack,
        ] {
            let recovered = SerializationFormat::from_key(format.key()).expect("valid key");
            assert_eq!(format, recovered);
        }
        assert_eq!(SerializationFormat::from_key("yaml"), None);
    }

    #[test]
    fn test_format_names() {
        assert_eq!(SerializationFormat::Bincode.name(), "Bincode");
        assert_eq!(SerializationFormat::Json.name(), "JSON");
        assert_eq!(SerializationFormat::MessagePack.name(), "MessagePack");
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_every_format_decodes_its_own_output() {
        let value = Greeting {
            name: "alice".into(),
            times: 3,
        };
        for format in [
            SerializationFormat::Bincode,
            SerializationFormat::Json,
            SerializationFormat::MessagePack,
        ] {
            let bytes = format.encode(&value).expect("encode");
            let back: Greeting = format.decode(&bytes).expect("decode");
            assert_eq!(back, value, "{}", format.name());
        }
    }

    #[test]
    fn test_json_rejects_garbage() {
        let result: Result<Greeting> = SerializationFormat::Json.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::DeserializeError(_))));
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_format_sizes() {
        let value = Greeting {
            name: "bob".into(),
            times: 1,
        };
        let json_size = SerializationFormat::Json.encode(&value).expect("json").len();
        let msgpack_size = SerializationFormat::MessagePack
            .encode(&value)
            .expect("msgpack")
            .len();

        // MessagePack should be more compact than JSON
        assert!(msgpack_size < json_size);
    }
}
