// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Deterministic record/replay of HTTP exchanges and WebSocket sessions.
//!
//! Recorders wrap a caller-supplied transport or connector and append to a
//! caller-owned log; replayers answer from such a log without touching the
//! network. Loading and saving fixtures stays with the caller, see
//! [`wiretape_format::fixture`].

pub mod config;
pub mod error;
pub mod fetch;
pub mod log;
pub mod socket;

pub use config::{FetchReplayConfig, HarnessConfig, Pacing, ResponseFlavor, SocketReplayConfig};
pub use error::{Error, Result};
pub use log::SharedLog;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub use fetch::{FetchRecorder, FetchReplayer, RequestInit, ResponseLike, Transport};
pub use socket::{Connector, MessageData, ReadyState, Socket, SocketEvent, SocketRecorder, SocketReplayer};
pub use wiretape_format::{LogEntry, SessionLog};
