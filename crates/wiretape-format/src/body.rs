// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Text-safe representation of arbitrary byte payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FormatError, Result};

/// Flavor of a binary payload.
///
/// HTTP bodies are always `Bytes`. Stream frames keep the frame kind they were
/// observed as so that replay hands back the same representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryKind {
    Bytes,
    Ping,
    Pong,
}

impl BinaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryKind::Bytes => "bytes",
            BinaryKind::Ping => "ping",
            BinaryKind::Pong => "pong",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "bytes" => Some(BinaryKind::Bytes),
            "ping" => Some(BinaryKind::Ping),
            "pong" => Some(BinaryKind::Pong),
            _ => None,
        }
    }
}

/// Tagged base64 payload: `{"kind": "bytes", "data": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortableBinary {
    pub kind: BinaryKind,
    pub data: String,
}

/// Encode raw bytes as a `bytes` payload.
pub fn encode(bytes: &[u8]) -> PortableBinary {
    encode_as(BinaryKind::Bytes, bytes)
}

/// Encode raw bytes under an explicit kind.
pub fn encode_as(kind: BinaryKind, bytes: &[u8]) -> PortableBinary {
    PortableBinary {
        kind,
        data: STANDARD.encode(bytes),
    }
}

/// Decode a payload of any kind back into bytes.
pub fn decode(binary: &PortableBinary) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(binary.data.as_bytes())?)
}

/// Decode an HTTP body payload; only the `bytes` kind is accepted.
pub fn decode_body(binary: &PortableBinary) -> Result<Vec<u8>> {
    if binary.kind != BinaryKind::Bytes {
        return Err(FormatError::MalformedBinary {
            reason: format!("expected kind \"bytes\", found \"{}\"", binary.kind.as_str()),
        });
    }
    decode(binary)
}

/// Validate an untyped JSON value as a tagged payload.
pub fn from_value(value: &Value) -> Result<PortableBinary> {
    let object = value.as_object().ok_or_else(|| FormatError::MalformedBinary {
        reason: format!("expected an object, found {}", json_kind(value)),
    })?;

    let kind = match object.get("kind") {
        Some(Value::String(tag)) => {
            BinaryKind::parse(tag).ok_or_else(|| FormatError::MalformedBinary {
                reason: format!("unknown kind \"{tag}\""),
            })?
        }
        Some(other) => {
            return Err(FormatError::MalformedBinary {
                reason: format!("kind must be a string, found {}", json_kind(other)),
            });
        }
        None => {
            return Err(FormatError::MalformedBinary {
                reason: "missing kind".to_string(),
            });
        }
    };

    let data = match object.get("data") {
        Some(Value::String(data)) => data.clone(),
        Some(other) => {
            return Err(FormatError::MalformedBinary {
                reason: format!("data must be a string, found {}", json_kind(other)),
            });
        }
        None => {
            return Err(FormatError::MalformedBinary {
                reason: "missing data".to_string(),
            });
        }
    };

    Ok(PortableBinary { kind, data })
}

/// Decode an untyped JSON value holding an HTTP body payload.
pub fn decode_value(value: &Value) -> Result<Vec<u8>> {
    decode_body(&from_value(value)?)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
