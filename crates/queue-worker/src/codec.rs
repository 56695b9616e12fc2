//! Payload serializers and compression options used on the wire.
//!
//! Encoded messages carry their own `content-type` (and, when compressed,
//! `compression`) attribute so a receiver can decode them regardless of the
//! options its own handle was opened with.

use crate::error::SerializationError;
use crate::message::{Message, Payload};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Message attribute carrying the serializer's content type
pub const CONTENT_TYPE_ATTRIBUTE: &str = "content-type";

/// Message attribute carrying the compression content type
pub const COMPRESSION_ATTRIBUTE: &str = "compression";

const ZSTD_LEVEL: i32 = 3;

/// Wire serialization for payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    #[default]
    Json,
    Yaml,
}

impl Serializer {
    /// MIME type recorded on encoded messages
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Yaml => "application/x-yaml",
        }
    }

    /// Resolve a serializer from a recorded content type
    pub fn from_content_type(content_type: &str) -> Result<Self, SerializationError> {
        match content_type {
            "application/json" => Ok(Self::Json),
            "application/x-yaml" => Ok(Self::Yaml),
            other => Err(SerializationError::UnsupportedContentType {
                content_type: other.to_string(),
            }),
        }
    }

    fn serialize(&self, payload: &Payload) -> Result<Vec<u8>, SerializationError> {
        match self {
            Self::Json => Ok(serde_json::to_vec(payload)?),
            Self::Yaml => Ok(serde_yaml::to_string(payload)?.into_bytes()),
        }
    }

    fn deserialize(&self, body: &[u8]) -> Result<Payload, SerializationError> {
        match self {
            Self::Json => Ok(serde_json::from_slice(body)?),
            Self::Yaml => {
                let text = std::str::from_utf8(body).map_err(|_| SerializationError::InvalidUtf8)?;
                Ok(serde_yaml::from_str(text)?)
            }
        }
    }
}

/// Body compression applied after serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Zstd,
}

impl Compression {
    /// MIME type recorded on compressed messages
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Zstd => "application/zstd",
        }
    }

    /// Resolve a compression from a recorded content type
    pub fn from_content_type(content_type: &str) -> Result<Self, SerializationError> {
        match content_type {
            "application/zstd" => Ok(Self::Zstd),
            other => Err(SerializationError::UnsupportedContentType {
                content_type: other.to_string(),
            }),
        }
    }

    fn compress(&self, body: &[u8]) -> Result<Vec<u8>, SerializationError> {
        match self {
            Self::Zstd => zstd::encode_all(body, ZSTD_LEVEL).map_err(|e| {
                SerializationError::Compression {
                    message: e.to_string(),
                }
            }),
        }
    }

    fn decompress(&self, body: &[u8]) -> Result<Vec<u8>, SerializationError> {
        match self {
            Self::Zstd => zstd::decode_all(body).map_err(|e| SerializationError::Compression {
                message: e.to_string(),
            }),
        }
    }
}

/// Encode a payload into a wire message
pub fn encode(
    payload: &Payload,
    serializer: Serializer,
    compression: Option<Compression>,
) -> Result<Message, SerializationError> {
    let mut body = serializer.serialize(payload)?;
    let mut message = Message::new(Bytes::new())
        .with_attribute(CONTENT_TYPE_ATTRIBUTE, serializer.content_type());

    if let Some(compression) = compression {
        body = compression.compress(&body)?;
        message = message.with_attribute(COMPRESSION_ATTRIBUTE, compression.content_type());
    }

    message.body = Bytes::from(body);
    Ok(message)
}

/// Decode a wire body, preferring the attributes recorded on the message
pub fn decode(
    body: &[u8],
    attributes: &std::collections::HashMap<String, String>,
    fallback_serializer: Serializer,
) -> Result<Payload, SerializationError> {
    let serializer = match attributes.get(CONTENT_TYPE_ATTRIBUTE) {
        Some(content_type) => Serializer::from_content_type(content_type)?,
        None => fallback_serializer,
    };

    match attributes.get(COMPRESSION_ATTRIBUTE) {
        Some(content_type) => {
            let compression = Compression::from_content_type(content_type)?;
            serializer.deserialize(&compression.decompress(body)?)
        }
        None => serializer.deserialize(body),
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
