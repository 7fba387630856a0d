// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Network-backed transport for recording sessions.

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use tracing::debug;
use wiretape_format::Headers;

use super::request::RequestInit;
use super::response::BufferedResponse;
use super::Transport;
use crate::error::{Error, Result};

/// Transport performing real HTTP requests with reqwest.
///
/// The body is buffered completely before the response is returned.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(Client::builder().build()?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Response = BufferedResponse;

    async fn fetch(&self, resource: &str, init: &RequestInit) -> Result<Self::Response> {
        let method = Method::from_bytes(init.method_str().to_ascii_uppercase().as_bytes())
            .map_err(|err| Error::transport(format!("Invalid method: {err}")))?;

        let mut request = self.client.request(method, resource);
        if let Some(headers) = init.effective_headers()? {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }
        if let Some(body) = init.effective_body()? {
            request = request.body(body);
        }

        let send = request.send();
        let response = match &init.signal {
            Some(signal) => tokio::select! {
                _ = signal.cancelled() => {
                    return Err(Error::transport(format!("Request to {resource} was aborted")));
                }
                result = send => result?,
            },
            None => send.await?,
        };

        let status = response.status();
        let url = response.url().clone();
        let redirected = Url::parse(resource)
            .map(|requested| requested != url)
            .unwrap_or(false);
        let headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        debug!(
            resource,
            status = status.as_u16(),
            bytes = body.len(),
            "Live exchange completed"
        );

        let mut buffered = BufferedResponse::new(status.as_u16(), body)
            .with_url(url.to_string())
            .with_redirected(redirected);
        buffered.headers = headers;
        Ok(buffered)
    }
}
