// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Replay configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound for every wait when replaying in fast mode.
pub const FAST_SPACING: Duration = Duration::from_millis(1);

/// Harness-wide configuration, usually loaded from a `wiretape.toml` next to the fixtures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Request/response replay settings
    pub fetch: FetchReplayConfig,

    /// Stream session replay settings
    pub socket: SocketReplayConfig,
}

impl HarnessConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(text).map_err(|err| Error::Config {
            message: format!("Invalid harness configuration: {err}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| Error::Config {
            message: format!("Cannot render harness configuration: {err}"),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.socket.validate()
    }
}

/// How replayed responses are constructed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFlavor {
    /// Build an `http::Response` when possible, fall back to the structural form otherwise
    #[default]
    Auto,

    /// Always build the structural form
    Structural,
}

/// Request/response replay configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchReplayConfig {
    pub response_flavor: ResponseFlavor,
}

/// Delay applied between replayed stream events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Wait exactly as long as the recording did
    Recorded,

    /// Wait at most `FAST_SPACING` per event
    #[default]
    Fast,

    /// Wait a fixed interval per event regardless of the recording
    Fixed { interval_ms: u64 },
}

impl Pacing {
    /// Delay to apply for an event recorded `recorded` after its predecessor
    pub fn delay(&self, recorded: Duration) -> Duration {
        match self {
            Pacing::Recorded => recorded,
            Pacing::Fast => recorded.min(FAST_SPACING),
            Pacing::Fixed { interval_ms } => Duration::from_millis(*interval_ms),
        }
    }
}

/// Stream session replay configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketReplayConfig {
    pub pacing: Pacing,
}

impl SocketReplayConfig {
    pub fn validate(&self) -> Result<()> {
        if let Pacing::Fixed { interval_ms: 0 } = self.pacing {
            return Err(Error::Config {
                message: "Fixed pacing interval must be greater than 0 ms; use `fast` instead"
                    .to_string(),
            });
        }
        Ok(())
    }
}
