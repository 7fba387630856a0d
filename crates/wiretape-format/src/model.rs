// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fixture data model shared by the recorders and replayers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::body::{self, BinaryKind, PortableBinary};
use crate::canonical;
use crate::error::{FormatError, Result};

/// Ordered header list, serialized as `[[name, value], ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Case-insensitive lookup; repeated headers are joined with `", "`.
    pub fn get(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .0
            .iter()
            .filter(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sort by name, keeping the original relative order of equal names.
    pub fn stable_sort_by_name(&mut self) {
        self.0.sort_by(|a, b| a.0.cmp(&b.0));
    }

    pub fn into_inner(self) -> Vec<(String, String)> {
        self.0
    }
}

impl From<Vec<(String, String)>> for Headers {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect())
    }
}

/// Serialized request, the input of the replay fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub resource: String,
    #[serde(default)]
    pub options: RecordedOptions,
}

impl RecordedRequest {
    /// Canonical text used as the equality key during replay.
    pub fn fingerprint(&self) -> Result<String> {
        canonical::to_canonical_string(self)
    }
}

/// Request options after filtering: scalar fields plus normalized body and headers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordedOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<PortableBinary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// Response kind as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Basic,
    Cors,
    Default,
    Error,
    Opaque,
    #[serde(rename = "opaqueredirect")]
    OpaqueRedirect,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Basic => "basic",
            ResponseType::Cors => "cors",
            ResponseType::Default => "default",
            ResponseType::Error => "error",
            ResponseType::Opaque => "opaque",
            ResponseType::OpaqueRedirect => "opaqueredirect",
        }
    }

    /// Kinds whose body can be inspected and therefore recorded.
    pub fn is_observable(&self) -> bool {
        matches!(self, ResponseType::Basic | ResponseType::Default)
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared representation of a recorded response body.
///
/// Unknown tags are kept verbatim so the replayer can report them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BodyType {
    Json,
    Text,
    Binary,
    Unrecognized(String),
}

impl BodyType {
    pub fn as_str(&self) -> &str {
        match self {
            BodyType::Json => "json",
            BodyType::Text => "text",
            BodyType::Binary => "binary",
            BodyType::Unrecognized(tag) => tag,
        }
    }
}

impl From<String> for BodyType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "json" => BodyType::Json,
            "text" => BodyType::Text,
            "binary" => BodyType::Binary,
            _ => BodyType::Unrecognized(tag),
        }
    }
}

impl From<BodyType> for String {
    fn from(body_type: BodyType) -> Self {
        body_type.as_str().to_string()
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view of the `bodyType`/`body` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedBody {
    Json(Value),
    Text(String),
    Binary(PortableBinary),
}

impl SerializedBody {
    pub fn body_type(&self) -> BodyType {
        match self {
            SerializedBody::Json(_) => BodyType::Json,
            SerializedBody::Text(_) => BodyType::Text,
            SerializedBody::Binary(_) => BodyType::Binary,
        }
    }

    pub fn into_parts(self) -> (BodyType, Value) {
        match self {
            SerializedBody::Json(value) => (BodyType::Json, value),
            SerializedBody::Text(text) => (BodyType::Text, Value::String(text)),
            SerializedBody::Binary(binary) => (
                BodyType::Binary,
                serde_json::json!({ "kind": binary.kind, "data": binary.data }),
            ),
        }
    }
}

/// One recorded request/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub request: RecordedRequest,
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    pub ok: bool,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub redirected: bool,
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub body_type: BodyType,
    #[serde(default)]
    pub body: Value,
}

impl LogEntry {
    /// Validate the recorded body against its declared type.
    pub fn serialized_body(&self) -> Result<SerializedBody> {
        match &self.body_type {
            BodyType::Json => Ok(SerializedBody::Json(self.body.clone())),
            BodyType::Text => match &self.body {
                Value::String(text) => Ok(SerializedBody::Text(text.clone())),
                other => Err(FormatError::UnexpectedBody {
                    body_type: "text".to_string(),
                    reason: format!("expected a string, found {}", body::json_kind(other)),
                }),
            },
            BodyType::Binary => {
                let binary = body::from_value(&self.body)?;
                if binary.kind != BinaryKind::Bytes {
                    return Err(FormatError::UnexpectedBody {
                        body_type: "binary".to_string(),
                        reason: format!("unsupported payload kind \"{}\"", binary.kind.as_str()),
                    });
                }
                Ok(SerializedBody::Binary(binary))
            }
            BodyType::Unrecognized(tag) => Err(FormatError::UnexpectedBody {
                body_type: tag.clone(),
                reason: "unrecognized bodyType".to_string(),
            }),
        }
    }
}

/// Lifecycle event kinds of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Open,
    Message,
    Error,
    Close,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Message => "message",
            EventKind::Error => "error",
            EventKind::Close => "close",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an event was received from the peer or produced by the local side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Message payload as stored in a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireData {
    Text(String),
    Binary(PortableBinary),
}

/// One entry of a session timeline. `at` is milliseconds since the previous
/// entry, or since the connection was constructed for the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub at: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub dir: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<WireData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TimedEvent {
    pub fn new(at: u64, kind: EventKind, dir: Direction) -> Self {
        Self {
            at,
            kind,
            dir,
            data: None,
            code: None,
            reason: None,
        }
    }

    pub fn with_data(mut self, data: WireData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_close(mut self, code: Option<u16>, reason: Option<String>) -> Self {
        self.code = code;
        self.reason = reason;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Complete timeline of one stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    pub url: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    /// Subprotocol negotiated at open, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extensions: String,
    #[serde(default)]
    pub log: Vec<TimedEvent>,
}

impl SessionLog {
    pub fn new(url: impl Into<String>, protocols: Vec<String>) -> Self {
        Self {
            url: url.into(),
            protocols,
            protocol: String::new(),
            extensions: String::new(),
            log: Vec::new(),
        }
    }
}
