// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Response serialization and reconstruction.

use async_trait::async_trait;
use http::{HeaderValue, StatusCode};
use tracing::debug;
use wiretape_format::{
    body, canonicalize_pretty, BodyType, Headers, LogEntry, RecordedRequest, ResponseType,
    SerializedBody,
};

use super::ResponseLike;
use crate::config::ResponseFlavor;
use crate::error::{Error, Result};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Statuses a native response refuses to carry a body with.
const NULL_BODY_STATUSES: [u16; 5] = [101, 103, 204, 205, 304];

/// Fully buffered response, the plain-data form used by adapters and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedResponse {
    pub status: u16,
    pub status_text: String,
    pub url: String,
    pub redirected: bool,
    pub response_type: ResponseType,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl BufferedResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: StatusCode::from_u16(status)
                .ok()
                .and_then(|code| code.canonical_reason())
                .unwrap_or_default()
                .to_string(),
            url: String::new(),
            redirected: false,
            response_type: ResponseType::Basic,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    pub fn with_redirected(mut self, redirected: bool) -> Self {
        self.redirected = redirected;
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }
}

#[async_trait]
impl ResponseLike for BufferedResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn status_text(&self) -> &str {
        &self.status_text
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn redirected(&self) -> bool {
        self.redirected
    }

    fn response_type(&self) -> ResponseType {
        self.response_type
    }

    fn headers(&self) -> Headers {
        self.headers.clone()
    }

    async fn bytes(&self) -> Result<Vec<u8>> {
        Ok(self.body.clone())
    }
}

/// Media type of a `content-type` value: everything before the first `;` of
/// the trimmed header, not otherwise normalized.
fn media_type(headers: &Headers) -> Option<String> {
    let value = headers.get("content-type")?;
    value.trim().split(';').next().map(str::to_string)
}

/// Whether a body of this media type is worth decoding as text.
fn may_be_text(media_type: Option<&str>) -> bool {
    let Some(media_type) = media_type else {
        return true;
    };
    if media_type.starts_with("image/") && !media_type.ends_with("+xml") {
        return false;
    }
    !(media_type.starts_with("audio/") || media_type.starts_with("video/"))
}

/// Pick the stored representation of a response body.
///
/// JSON is tried first when declared. Text is accepted only if decoding
/// produced no U+FFFD replacement character; everything else is binary.
pub async fn serialize_response_body<R>(response: &R) -> Result<SerializedBody>
where
    R: ResponseLike + ?Sized,
{
    let media_type = media_type(&response.headers());

    if media_type.as_deref() == Some(JSON_CONTENT_TYPE) {
        if let Ok(value) = response.json().await {
            return Ok(SerializedBody::Json(value));
        }
    }

    if may_be_text(media_type.as_deref()) {
        let text = response.text().await?;
        if !text.contains('\u{FFFD}') {
            return Ok(SerializedBody::Text(text));
        }
    }

    let bytes = response.bytes().await?;
    Ok(SerializedBody::Binary(body::encode(&bytes)))
}

/// Build the log entry for a completed exchange.
pub async fn serialize_response<R>(request: RecordedRequest, response: &R) -> Result<LogEntry>
where
    R: ResponseLike + ?Sized,
{
    let response_type = response.response_type();
    if !response_type.is_observable() {
        return Err(Error::UnsupportedResponseType {
            kind: response_type.to_string(),
        });
    }

    let (body_type, body) = serialize_response_body(response).await?.into_parts();
    Ok(LogEntry {
        request,
        status: response.status(),
        status_text: response.status_text().to_string(),
        ok: response.ok(),
        headers: response.headers(),
        url: response.url().to_string(),
        redirected: response.redirected(),
        response_type,
        body_type,
        body,
    })
}

/// Replayed response backed by an `http::Response`.
///
/// `url`, `redirected` and `type` cannot be expressed by `http::Response`
/// and live beside it.
#[derive(Debug)]
pub struct NativeResponse {
    response: http::Response<Vec<u8>>,
    status_text: String,
    url: String,
    redirected: bool,
    response_type: ResponseType,
}

impl NativeResponse {
    fn build(
        entry: &LogEntry,
        body: &SerializedBody,
        data: Vec<u8>,
    ) -> std::result::Result<Self, String> {
        if !(200..=599).contains(&entry.status) {
            return Err(format!("status {} is outside 200-599", entry.status));
        }
        if NULL_BODY_STATUSES.contains(&entry.status) {
            return Err(format!("status {} cannot carry a body", entry.status));
        }
        if !is_reason_phrase(&entry.status_text) {
            return Err(format!(
                "status text {:?} is not a valid reason phrase",
                entry.status_text
            ));
        }

        let mut builder = http::Response::builder().status(entry.status);
        for (name, value) in entry.headers.iter() {
            builder = builder.header(name, value);
        }
        let mut response = builder.body(data).map_err(|err| err.to_string())?;

        if matches!(body, SerializedBody::Json(_))
            && !response.headers().contains_key(http::header::CONTENT_TYPE)
        {
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static(JSON_CONTENT_TYPE),
            );
        }

        Ok(Self {
            response,
            status_text: entry.status_text.clone(),
            url: entry.url.clone(),
            redirected: entry.redirected,
            response_type: entry.response_type,
        })
    }

    pub fn as_http(&self) -> &http::Response<Vec<u8>> {
        &self.response
    }

    pub fn into_http(self) -> http::Response<Vec<u8>> {
        self.response
    }
}

impl Clone for NativeResponse {
    fn clone(&self) -> Self {
        let mut response = http::Response::new(self.response.body().clone());
        *response.status_mut() = self.response.status();
        *response.version_mut() = self.response.version();
        *response.headers_mut() = self.response.headers().clone();
        Self {
            response,
            status_text: self.status_text.clone(),
            url: self.url.clone(),
            redirected: self.redirected,
            response_type: self.response_type,
        }
    }
}

#[async_trait]
impl ResponseLike for NativeResponse {
    fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn status_text(&self) -> &str {
        &self.status_text
    }

    fn ok(&self) -> bool {
        self.response.status().is_success()
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn redirected(&self) -> bool {
        self.redirected
    }

    fn response_type(&self) -> ResponseType {
        self.response_type
    }

    fn headers(&self) -> Headers {
        self.response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }

    async fn bytes(&self) -> Result<Vec<u8>> {
        Ok(self.response.body().clone())
    }
}

/// Plain-data replayed response exposing the recorded values as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralResponse {
    status: u16,
    status_text: String,
    ok: bool,
    url: String,
    redirected: bool,
    response_type: ResponseType,
    headers: Headers,
    data: Vec<u8>,
}

#[async_trait]
impl ResponseLike for StructuralResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn status_text(&self) -> &str {
        &self.status_text
    }

    fn ok(&self) -> bool {
        self.ok
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn redirected(&self) -> bool {
        self.redirected
    }

    fn response_type(&self) -> ResponseType {
        self.response_type
    }

    fn headers(&self) -> Headers {
        self.headers.clone()
    }

    async fn bytes(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}

/// Response produced by the replayer.
#[derive(Debug, Clone)]
pub enum ReplayedResponse {
    Native(NativeResponse),
    Structural(StructuralResponse),
}

impl ReplayedResponse {
    /// Rebuild a response from a log entry.
    pub(crate) fn from_entry(entry: &LogEntry, flavor: ResponseFlavor) -> Result<Self> {
        if let BodyType::Unrecognized(tag) = &entry.body_type {
            return Err(Error::UnrecognizedBodyType {
                body_type: tag.clone(),
            });
        }

        let body = entry.serialized_body()?;
        let data = match &body {
            SerializedBody::Json(value) => canonicalize_pretty(value).into_bytes(),
            SerializedBody::Text(text) => text.clone().into_bytes(),
            SerializedBody::Binary(binary) => body::decode_body(binary)?,
        };

        if flavor == ResponseFlavor::Auto {
            match NativeResponse::build(entry, &body, data.clone()) {
                Ok(native) => {
                    if native.ok() != entry.ok {
                        return Err(Error::OkMismatch {
                            status: entry.status,
                            recorded: entry.ok,
                            reconstructed: native.ok(),
                        });
                    }
                    return Ok(ReplayedResponse::Native(native));
                }
                Err(reason) => {
                    debug!(status = entry.status, %reason, "Falling back to structural response");
                }
            }
        }

        Ok(ReplayedResponse::Structural(StructuralResponse {
            status: entry.status,
            status_text: entry.status_text.clone(),
            ok: entry.ok,
            url: entry.url.clone(),
            redirected: entry.redirected,
            response_type: entry.response_type,
            headers: entry.headers.clone(),
            data,
        }))
    }

    pub fn is_native(&self) -> bool {
        matches!(self, ReplayedResponse::Native(_))
    }

    pub fn as_http(&self) -> Option<&http::Response<Vec<u8>>> {
        match self {
            ReplayedResponse::Native(native) => Some(native.as_http()),
            ReplayedResponse::Structural(_) => None,
        }
    }

    fn inner(&self) -> &dyn ResponseLike {
        match self {
            ReplayedResponse::Native(native) => native,
            ReplayedResponse::Structural(structural) => structural,
        }
    }
}

#[async_trait]
impl ResponseLike for ReplayedResponse {
    fn status(&self) -> u16 {
        self.inner().status()
    }

    fn status_text(&self) -> &str {
        self.inner().status_text()
    }

    fn ok(&self) -> bool {
        self.inner().ok()
    }

    fn url(&self) -> &str {
        self.inner().url()
    }

    fn redirected(&self) -> bool {
        self.inner().redirected()
    }

    fn response_type(&self) -> ResponseType {
        self.inner().response_type()
    }

    fn headers(&self) -> Headers {
        self.inner().headers()
    }

    async fn bytes(&self) -> Result<Vec<u8>> {
        self.inner().bytes().await
    }
}

fn is_reason_phrase(text: &str) -> bool {
    text.chars()
        .all(|c| c == '\t' || c == ' ' || (('\u{21}'..='\u{ff}').contains(&c) && c != '\u{7f}'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiretape_format::RecordedOptions;

    fn request() -> RecordedRequest {
        RecordedRequest {
            resource: "https://api.test/item".to_string(),
            options: RecordedOptions::default(),
        }
    }

    async fn body_of(response: BufferedResponse) -> SerializedBody {
        serialize_response_body(&response).await.unwrap()
    }

    #[tokio::test]
    async fn test_json_is_detected_from_media_type() {
        let response = BufferedResponse::new(200, br#"{"id":1}"#.to_vec())
            .with_header("Content-Type", " application/json; charset=utf-8");
        assert_eq!(body_of(response).await, SerializedBody::Json(json!({"id": 1})));
    }

    #[tokio::test]
    async fn test_invalid_json_falls_back_to_text() {
        let response = BufferedResponse::new(200, b"{oops".to_vec())
            .with_header("content-type", "application/json");
        assert_eq!(body_of(response).await, SerializedBody::Text("{oops".to_string()));
    }

    #[tokio::test]
    async fn test_json_without_declared_type_is_text() {
        let response = BufferedResponse::new(200, br#"{"id":1}"#.to_vec());
        assert_eq!(body_of(response).await, SerializedBody::Text(r#"{"id":1}"#.to_string()));
    }

    #[tokio::test]
    async fn test_media_types_that_skip_text() {
        let gif = BufferedResponse::new(200, b"GIF89a".to_vec())
            .with_header("content-type", "image/gif");
        assert_eq!(body_of(gif).await, SerializedBody::Binary(body::encode(b"GIF89a")));

        let svg = BufferedResponse::new(200, b"<svg/>".to_vec())
            .with_header("content-type", "image/svg+xml");
        assert_eq!(body_of(svg).await, SerializedBody::Text("<svg/>".to_string()));

        let audio = BufferedResponse::new(200, b"ID3".to_vec())
            .with_header("content-type", "audio/mpeg");
        assert!(matches!(body_of(audio).await, SerializedBody::Binary(_)));
    }

    #[tokio::test]
    async fn test_replacement_character_forces_binary() {
        let invalid = BufferedResponse::new(200, vec![b'a', 0xff, b'b']);
        assert_eq!(
            body_of(invalid).await,
            SerializedBody::Binary(body::encode(&[b'a', 0xff, b'b']))
        );

        // Literal U+FFFD in valid UTF-8 is indistinguishable and stored as binary too.
        let literal = BufferedResponse::new(200, "x\u{FFFD}".as_bytes().to_vec());
        assert!(matches!(body_of(literal).await, SerializedBody::Binary(_)));
    }

    #[tokio::test]
    async fn test_opaque_responses_are_rejected() {
        let response = BufferedResponse::new(0, Vec::new()).with_type(ResponseType::Opaque);
        let err = serialize_response(request(), &response).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedResponseType { ref kind } if kind == "opaque"));
    }

    #[tokio::test]
    async fn test_serialized_entry_copies_response_fields() {
        let response = BufferedResponse::new(404, b"missing".to_vec())
            .with_url("https://api.test/item?x=1")
            .with_redirected(true)
            .with_type(ResponseType::Default)
            .with_header("x-b", "2")
            .with_header("x-a", "1");
        let entry = serialize_response(request(), &response).await.unwrap();
        assert_eq!(entry.status, 404);
        assert_eq!(entry.status_text, "Not Found");
        assert!(!entry.ok);
        assert!(entry.redirected);
        assert_eq!(entry.url, "https://api.test/item?x=1");
        // response headers are stored in their received order
        let names: Vec<&str> = entry.headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["x-b", "x-a"]);
        assert_eq!(entry.body_type, BodyType::Text);
    }

    async fn entry_for(response: BufferedResponse) -> LogEntry {
        serialize_response(request(), &response).await.unwrap()
    }

    #[tokio::test]
    async fn test_json_is_replayed_pretty_with_content_type() {
        let entry = entry_for(
            BufferedResponse::new(200, br#"{"b":2,"a":1}"#.to_vec())
                .with_header("content-type", "application/json"),
        )
        .await;
        assert_eq!(entry.body_type, BodyType::Json);

        let replayed = ReplayedResponse::from_entry(&entry, ResponseFlavor::Auto).unwrap();
        assert!(replayed.is_native());
        assert_eq!(replayed.text().await.unwrap(), "{\n  \"a\": 1,\n  \"b\": 2\n}");
        assert_eq!(replayed.json().await.unwrap(), json!({"a": 1, "b": 2}));
        assert_eq!(
            replayed.headers().get("content-type").as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_structural_flavor_is_honored() {
        let entry = entry_for(BufferedResponse::new(200, b"hello".to_vec())).await;
        let replayed = ReplayedResponse::from_entry(&entry, ResponseFlavor::Structural).unwrap();
        assert!(!replayed.is_native());
        assert!(replayed.as_http().is_none());
        assert_eq!(replayed.text().await.unwrap(), "hello");
        let copy = replayed.clone();
        assert_eq!(copy.bytes().await.unwrap(), b"hello");
        assert_eq!(replayed.bytes().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_unbuildable_status_falls_back() {
        let mut entry = entry_for(BufferedResponse::new(204, Vec::new())).await;
        assert_eq!(entry.body_type, BodyType::Text);
        let replayed = ReplayedResponse::from_entry(&entry, ResponseFlavor::Auto).unwrap();
        assert!(!replayed.is_native());
        assert_eq!(replayed.status(), 204);

        entry.status = 200;
        entry.status_text = "Bad\r\nText".to_string();
        let replayed = ReplayedResponse::from_entry(&entry, ResponseFlavor::Auto).unwrap();
        assert!(!replayed.is_native());
        assert_eq!(replayed.status_text(), "Bad\r\nText");
    }

    #[tokio::test]
    async fn test_ok_mismatch_is_an_error() {
        let mut entry = entry_for(BufferedResponse::new(200, b"x".to_vec())).await;
        entry.ok = false;
        let err = ReplayedResponse::from_entry(&entry, ResponseFlavor::Auto).unwrap_err();
        assert!(matches!(
            err,
            Error::OkMismatch {
                status: 200,
                recorded: false,
                reconstructed: true
            }
        ));

        // the structural form reports what was recorded
        let replayed = ReplayedResponse::from_entry(&entry, ResponseFlavor::Structural).unwrap();
        assert!(!replayed.ok());
    }

    #[tokio::test]
    async fn test_binary_and_unknown_body_types() {
        let mut entry = entry_for(BufferedResponse::new(200, vec![0, 159, 146, 150])).await;
        assert_eq!(entry.body_type, BodyType::Binary);
        let replayed = ReplayedResponse::from_entry(&entry, ResponseFlavor::Auto).unwrap();
        assert_eq!(replayed.bytes().await.unwrap(), vec![0, 159, 146, 150]);

        entry.body_type = BodyType::Unrecognized("stream".to_string());
        let err = ReplayedResponse::from_entry(&entry, ResponseFlavor::Auto).unwrap_err();
        assert!(matches!(
            err,
            Error::UnrecognizedBodyType { ref body_type } if body_type == "stream"
        ));
    }
}
