// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use async_trait::async_trait;
use tracing::debug;
use wiretape_format::LogEntry;

use super::request::{serialize_request, RequestInit};
use super::response::serialize_response;
use super::{ResponseLike, Transport};
use crate::error::{Error, Result};
use crate::log::SharedLog;

/// Transparent wrapper around a transport that logs every completed exchange.
///
/// The request is serialized before the wrapped transport is called, so a
/// request that cannot be recorded never reaches the network. Entries are
/// appended in completion order.
pub struct FetchRecorder<T> {
    transport: T,
    log: SharedLog<LogEntry>,
}

impl<T: Transport> FetchRecorder<T> {
    pub fn new(transport: T, log: SharedLog<LogEntry>) -> Self {
        Self { transport, log }
    }

    pub fn builder() -> FetchRecorderBuilder<T> {
        FetchRecorderBuilder {
            transport: None,
            log: None,
        }
    }

    pub fn log(&self) -> &SharedLog<LogEntry> {
        &self.log
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Perform the call through the wrapped transport and log it.
    pub async fn record(&self, resource: &str, init: &RequestInit) -> Result<T::Response> {
        let request = serialize_request(resource, init)?;
        let response = self.transport.fetch(resource, init).await?;
        let entry = serialize_response(request, &response).await?;
        debug!(
            resource,
            status = response.status(),
            body_type = %entry.body_type,
            "Recorded exchange"
        );
        self.log.push(entry);
        Ok(response)
    }
}

#[async_trait]
impl<T: Transport> Transport for FetchRecorder<T> {
    type Response = T::Response;

    async fn fetch(&self, resource: &str, init: &RequestInit) -> Result<Self::Response> {
        self.record(resource, init).await
    }
}

/// Builder reporting missing collaborators as configuration errors.
pub struct FetchRecorderBuilder<T> {
    transport: Option<T>,
    log: Option<SharedLog<LogEntry>>,
}

impl<T: Transport> FetchRecorderBuilder<T> {
    pub fn transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn log(mut self, log: SharedLog<LogEntry>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn build(self) -> Result<FetchRecorder<T>> {
        let transport = self
            .transport
            .ok_or_else(|| Error::config("No transport passed to the fetch recorder"))?;
        let log = self
            .log
            .ok_or_else(|| Error::config("No log passed to the fetch recorder"))?;
        Ok(FetchRecorder::new(transport, log))
    }
}
