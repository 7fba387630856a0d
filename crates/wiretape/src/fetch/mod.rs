// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request/response recording and replay.
//!
//! A [`FetchRecorder`] wraps any [`Transport`] and appends one
//! [`LogEntry`](wiretape_format::LogEntry) per completed call. A
//! [`FetchReplayer`] is itself a [`Transport`] that answers calls from such a
//! log, consuming each entry at most once.

mod recorder;
mod replayer;
mod request;
mod response;

#[cfg(feature = "live")]
mod live;

use async_trait::async_trait;
use serde_json::Value;
use wiretape_format::{Headers, ResponseType};

use crate::error::Result;

#[cfg(feature = "live")]
pub use live::ReqwestTransport;
pub use recorder::{FetchRecorder, FetchRecorderBuilder};
pub use replayer::{FetchReplayer, FetchReplayerBuilder};
pub use request::{fingerprint, serialize_request, HeaderInput, RequestInit};
pub use response::{
    serialize_response, serialize_response_body, BufferedResponse, NativeResponse,
    ReplayedResponse, StructuralResponse,
};

/// A function-like collaborator performing one request/response exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    type Response: ResponseLike;

    async fn fetch(&self, resource: &str, init: &RequestInit) -> Result<Self::Response>;
}

/// Observable surface of a response. Body accessors can be called repeatedly.
#[async_trait]
pub trait ResponseLike: Send + Sync {
    fn status(&self) -> u16;

    fn status_text(&self) -> &str;

    fn ok(&self) -> bool {
        (200..300).contains(&self.status())
    }

    /// Final URL after redirects.
    fn url(&self) -> &str;

    fn redirected(&self) -> bool;

    fn response_type(&self) -> ResponseType;

    fn headers(&self) -> Headers;

    async fn bytes(&self) -> Result<Vec<u8>>;

    /// Body decoded as UTF-8, invalid sequences replaced with U+FFFD.
    async fn text(&self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn json(&self) -> Result<Value> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
