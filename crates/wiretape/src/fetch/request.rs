// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request options and their serialized form.
//!
//! Recording and replay both go through [`serialize_request`]; a request
//! matches a log entry exactly when the two fingerprints are equal.

use std::collections::BTreeMap;

use http::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use wiretape_format::{body, Headers, RecordedOptions, RecordedRequest};

use crate::error::{Error, Result};

/// Header collection in any of the shapes a caller may hand to a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderInput {
    Map(BTreeMap<String, String>),
    List(Vec<(String, String)>),
    HeaderMap(HeaderMap),
}

impl HeaderInput {
    /// Flatten into name/value pairs in enumeration order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        match self {
            HeaderInput::Map(map) => map.iter().map(|(n, v)| (n.clone(), v.clone())).collect(),
            HeaderInput::List(list) => list.clone(),
            HeaderInput::HeaderMap(map) => map
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        }
    }

    fn from_option(key: &str, value: &Value) -> Result<Self> {
        let unsupported = || Error::UnsupportedOption {
            key: key.to_string(),
            kind: value_kind(value),
        };
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(name, value)| match value {
                    Value::String(value) => Ok((name.clone(), value.clone())),
                    _ => Err(unsupported()),
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(HeaderInput::Map),
            Value::Array(items) => items
                .iter()
                .map(|item| match item.as_array().map(Vec::as_slice) {
                    Some([Value::String(name), Value::String(value)]) => {
                        Ok((name.clone(), value.clone()))
                    }
                    _ => Err(unsupported()),
                })
                .collect::<Result<Vec<_>>>()
                .map(HeaderInput::List),
            _ => Err(unsupported()),
        }
    }
}

impl From<BTreeMap<String, String>> for HeaderInput {
    fn from(map: BTreeMap<String, String>) -> Self {
        HeaderInput::Map(map)
    }
}

impl From<Vec<(String, String)>> for HeaderInput {
    fn from(list: Vec<(String, String)>) -> Self {
        HeaderInput::List(list)
    }
}

impl From<Vec<(&str, &str)>> for HeaderInput {
    fn from(list: Vec<(&str, &str)>) -> Self {
        HeaderInput::List(
            list.into_iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl From<HeaderMap> for HeaderInput {
    fn from(map: HeaderMap) -> Self {
        HeaderInput::HeaderMap(map)
    }
}

/// Options accompanying a request.
///
/// `options` holds plain fields such as `method`, `mode` or `cache`; only
/// null, boolean, number and string values can be recorded.
#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    pub options: BTreeMap<String, Value>,
    pub body: Option<Vec<u8>>,
    pub headers: Option<HeaderInput>,
    /// Cancellation for live transports. Never recorded.
    pub signal: Option<CancellationToken>,
    /// Always rejected.
    pub trailers: Option<HeaderInput>,
}

impl RequestInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(self, method: impl Into<String>) -> Self {
        self.option("method", method.into())
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn headers(mut self, headers: impl Into<HeaderInput>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn trailers(mut self, trailers: impl Into<HeaderInput>) -> Self {
        self.trailers = Some(trailers.into());
        self
    }

    /// The `method` option, `GET` when absent.
    pub fn method_str(&self) -> &str {
        self.options
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
    }

    /// Body bytes, taken from the typed field or a string `body` option.
    pub fn effective_body(&self) -> Result<Option<Vec<u8>>> {
        if let Some(body) = &self.body {
            return Ok(Some(body.clone()));
        }
        match self.options.get("body") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone().into_bytes())),
            Some(other) => Err(Error::UnsupportedOption {
                key: "body".to_string(),
                kind: value_kind(other),
            }),
        }
    }

    /// Header pairs, taken from the typed field or a `headers` option.
    pub fn effective_headers(&self) -> Result<Option<Vec<(String, String)>>> {
        if let Some(headers) = &self.headers {
            return Ok(Some(headers.to_pairs()));
        }
        match self.options.get("headers") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(HeaderInput::from_option("headers", value)?.to_pairs())),
        }
    }
}

/// Serialize a request into the form stored in the log and used for matching.
///
/// `signal` is dropped, `trailers` is rejected, any other option must be a
/// scalar. Headers are stably sorted by name so that equivalent header sets
/// serialize identically whatever their source shape or insertion order.
pub fn serialize_request(resource: &str, init: &RequestInit) -> Result<RecordedRequest> {
    if init.trailers.is_some() {
        return Err(Error::TrailersUnsupported);
    }

    let mut fields = BTreeMap::new();
    for (key, value) in &init.options {
        match key.as_str() {
            "body" | "headers" | "signal" => continue,
            "trailers" => return Err(Error::TrailersUnsupported),
            _ => {}
        }
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                fields.insert(key.clone(), value.clone());
            }
            Value::Array(_) | Value::Object(_) => {
                return Err(Error::UnsupportedOption {
                    key: key.clone(),
                    kind: value_kind(value),
                });
            }
        }
    }

    let body = init.effective_body()?.map(|bytes| body::encode(&bytes));
    let headers = init.effective_headers()?.map(|pairs| {
        let mut headers = Headers::from(pairs);
        headers.stable_sort_by_name();
        headers
    });

    Ok(RecordedRequest {
        resource: resource.to_string(),
        options: RecordedOptions {
            body,
            headers,
            fields,
        },
    })
}

/// Canonical matching key of a request.
pub fn fingerprint(resource: &str, init: &RequestInit) -> Result<String> {
    Ok(serialize_request(resource, init)?.fingerprint()?)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::ACCEPT;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_scalar_options_are_kept_and_signal_dropped() {
        let init = RequestInit::new()
            .method("POST")
            .option("keepalive", true)
            .option("priority", 0)
            .option("referrer", "")
            .option("integrity", Value::Null)
            .signal(CancellationToken::new())
            .option("signal", "ignored");
        let request = serialize_request("https://api.test/posts", &init).unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "resource": "https://api.test/posts",
                "options": {
                    "method": "POST",
                    "keepalive": true,
                    "priority": 0,
                    "referrer": "",
                    "integrity": null
                }
            })
        );
    }

    #[test]
    fn test_structured_option_is_rejected() {
        let init = RequestInit::new().option("window", json!({"id": 1}));
        let err = serialize_request("r", &init).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedOption { ref key, kind: "object" } if key == "window"
        ));
    }

    #[test]
    fn test_trailers_are_rejected_in_both_positions() {
        let typed = RequestInit::new().trailers(vec![("x-checksum", "abc")]);
        assert!(matches!(
            serialize_request("r", &typed),
            Err(Error::TrailersUnsupported)
        ));

        let keyed = RequestInit::new().option("trailers", Value::Null);
        assert!(matches!(
            serialize_request("r", &keyed),
            Err(Error::TrailersUnsupported)
        ));
    }

    #[test]
    fn test_header_shapes_fingerprint_identically() {
        let list =
            RequestInit::new().headers(vec![("x-b", "2"), ("accept", "*/*"), ("x-a", "1")]);

        let mut map = BTreeMap::new();
        map.insert("x-a".to_string(), "1".to_string());
        map.insert("x-b".to_string(), "2".to_string());
        map.insert("accept".to_string(), "*/*".to_string());
        let map = RequestInit::new().headers(map);

        let mut header_map = HeaderMap::new();
        header_map.insert("x-b", "2".parse().unwrap());
        header_map.insert("x-a", "1".parse().unwrap());
        header_map.insert(ACCEPT, "*/*".parse().unwrap());
        let header_map = RequestInit::new().headers(header_map);

        let keyed = RequestInit::new()
            .option("headers", json!({"x-b": "2", "x-a": "1", "accept": "*/*"}));

        let expected = fingerprint("r", &list).unwrap();
        assert_eq!(fingerprint("r", &map).unwrap(), expected);
        assert_eq!(fingerprint("r", &header_map).unwrap(), expected);
        assert_eq!(fingerprint("r", &keyed).unwrap(), expected);
    }

    #[test]
    fn test_header_sort_keeps_duplicate_order() {
        let init = RequestInit::new().headers(vec![
            ("x-dup", "second"),
            ("accept", "a"),
            ("x-dup", "first"),
        ]);
        let request = serialize_request("r", &init).unwrap();
        let pairs: Vec<(String, String)> = request.options.headers.unwrap().into_inner();
        assert_eq!(
            pairs,
            vec![
                ("accept".to_string(), "a".to_string()),
                ("x-dup".to_string(), "second".to_string()),
                ("x-dup".to_string(), "first".to_string()),
            ]
        );
    }

    #[test]
    fn test_body_is_encoded_and_string_option_matches_bytes() {
        let typed = RequestInit::new().body(b"{\"title\":\"x\"}".to_vec());
        let keyed = RequestInit::new().option("body", "{\"title\":\"x\"}");
        let request = serialize_request("r", &typed).unwrap();
        assert_eq!(request.options.body, Some(body::encode(b"{\"title\":\"x\"}")));
        assert_eq!(fingerprint("r", &typed).unwrap(), fingerprint("r", &keyed).unwrap());

        let binary = RequestInit::new().option("body", json!([1, 2]));
        assert!(serialize_request("r", &binary).is_err());
    }

    #[test]
    fn test_malformed_headers_option_is_rejected() {
        let init = RequestInit::new().option("headers", json!([["only-name"]]));
        assert!(matches!(
            serialize_request("r", &init),
            Err(Error::UnsupportedOption { kind: "array", .. })
        ));
    }

    #[test]
    fn test_option_map_order_is_irrelevant() {
        let a = RequestInit::new()
            .method("PUT")
            .option("mode", "cors")
            .headers(vec![("content-type", "text/plain")]);
        let b = RequestInit::new()
            .headers(vec![("content-type", "text/plain")])
            .option("mode", "cors")
            .method("PUT");
        assert_eq!(fingerprint("r", &a).unwrap(), fingerprint("r", &b).unwrap());
    }
}
