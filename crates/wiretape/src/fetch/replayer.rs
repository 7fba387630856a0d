// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, warn};
use wiretape_format::LogEntry;

use super::request::{serialize_request, RequestInit};
use super::response::ReplayedResponse;
use super::Transport;
use crate::config::FetchReplayConfig;
use crate::error::{Error, Result};

struct PendingEntry {
    fingerprint: String,
    entry: LogEntry,
}

/// Transport answering requests from a recorded log.
///
/// The replayer works on its own copy of the log. Each entry satisfies at
/// most one call; the first unconsumed entry with an equal fingerprint wins.
pub struct FetchReplayer {
    pending: Mutex<Vec<PendingEntry>>,
    config: FetchReplayConfig,
}

impl FetchReplayer {
    pub fn new(log: &[LogEntry]) -> Result<Self> {
        Self::with_config(log, FetchReplayConfig::default())
    }

    pub fn with_config(log: &[LogEntry], config: FetchReplayConfig) -> Result<Self> {
        let pending = log
            .iter()
            .map(|entry| {
                Ok(PendingEntry {
                    fingerprint: entry.request.fingerprint()?,
                    entry: entry.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            pending: Mutex::new(pending),
            config,
        })
    }

    pub fn builder() -> FetchReplayerBuilder {
        FetchReplayerBuilder::default()
    }

    /// Answer a call from the log, consuming the matched entry.
    pub async fn replay(&self, resource: &str, init: &RequestInit) -> Result<ReplayedResponse> {
        let fingerprint = serialize_request(resource, init)?.fingerprint()?;

        // Suspend once like a live transport would.
        tokio::task::yield_now().await;

        let entry = {
            let mut pending = self.lock();
            match pending.iter().position(|p| p.fingerprint == fingerprint) {
                Some(index) => pending.remove(index).entry,
                None => {
                    let remaining = pending.len();
                    warn!(resource, remaining, "No recorded exchange matches request");
                    return Err(Error::NoMatchingInteraction {
                        resource: resource.to_string(),
                        remaining,
                    });
                }
            }
        };

        debug!(
            resource,
            status = entry.status,
            remaining = self.remaining(),
            "Replaying exchange"
        );
        ReplayedResponse::from_entry(&entry, self.config.response_flavor)
    }

    /// Number of entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    /// Entries not yet consumed, in log order.
    pub fn remaining_entries(&self) -> Vec<LogEntry> {
        self.lock().iter().map(|p| p.entry.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingEntry>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for FetchReplayer {
    type Response = ReplayedResponse;

    async fn fetch(&self, resource: &str, init: &RequestInit) -> Result<Self::Response> {
        self.replay(resource, init).await
    }
}

/// Builder reporting a missing log as a configuration error.
#[derive(Default)]
pub struct FetchReplayerBuilder {
    log: Option<Vec<LogEntry>>,
    config: FetchReplayConfig,
}

impl FetchReplayerBuilder {
    pub fn log(mut self, log: Vec<LogEntry>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn config(mut self, config: FetchReplayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<FetchReplayer> {
        let log = self
            .log
            .ok_or_else(|| Error::config("No log passed to the fetch replayer"))?;
        FetchReplayer::with_config(&log, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ResponseLike;
    use serde_json::json;

    fn entry(resource: &str, body: &str) -> LogEntry {
        serde_json::from_value(json!({
            "request": {"resource": resource, "options": {"method": "GET"}},
            "status": 200,
            "statusText": "OK",
            "ok": true,
            "headers": [["content-type", "text/plain"]],
            "url": resource,
            "redirected": false,
            "type": "basic",
            "bodyType": "text",
            "body": body
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_fingerprints_replay_in_log_order() {
        let log = vec![entry("https://a.test/", "first"), entry("https://a.test/", "second")];
        let replayer = FetchReplayer::new(&log).unwrap();
        let init = RequestInit::new().method("GET");

        let first = replayer.replay("https://a.test/", &init).await.unwrap();
        let second = replayer.replay("https://a.test/", &init).await.unwrap();
        assert_eq!(first.text().await.unwrap(), "first");
        assert_eq!(second.text().await.unwrap(), "second");

        let err = replayer.replay("https://a.test/", &init).await.unwrap_err();
        assert!(matches!(err, Error::NoMatchingInteraction { remaining: 0, .. }));
    }

    #[tokio::test]
    async fn test_miss_reports_remaining_and_keeps_log() {
        let log = vec![entry("https://a.test/", "a"), entry("https://b.test/", "b")];
        let replayer = FetchReplayer::new(&log).unwrap();

        let err = replayer
            .replay("https://a.test/", &RequestInit::new().method("POST"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request to https://a.test/ not found, 2 more entries left"
        );
        assert_eq!(replayer.remaining(), 2);

        replayer
            .replay("https://b.test/", &RequestInit::new().method("GET"))
            .await
            .unwrap();
        assert_eq!(replayer.remaining_entries(), vec![log[0].clone()]);
    }

    #[tokio::test]
    async fn test_caller_log_is_not_mutated() {
        let log = vec![entry("https://a.test/", "a")];
        let replayer = FetchReplayer::new(&log).unwrap();
        replayer
            .replay("https://a.test/", &RequestInit::new().method("GET"))
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(replayer.remaining(), 0);
    }

    #[test]
    fn test_builder_requires_log() {
        let err = FetchReplayer::builder().build().err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }
}
