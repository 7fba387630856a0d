// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the recorders and replayers

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for wiretape
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Trailers not supported")]
    TrailersUnsupported,

    #[error("Unsupported request option `{key}`: {kind} values cannot be recorded")]
    UnsupportedOption { key: String, kind: &'static str },

    #[error("Unsupported response type: {kind}")]
    UnsupportedResponseType { kind: String },

    #[error("Unrecognized body type: {body_type}")]
    UnrecognizedBodyType { body_type: String },

    #[error("Request to {resource} not found, {remaining} more entries left")]
    NoMatchingInteraction { resource: String, remaining: usize },

    #[error("Session for {url} not found, {remaining} more sessions left")]
    NoMatchingSession { url: String, remaining: usize },

    #[error("Reconstructed response for status {status} has ok={reconstructed}, recorded ok={recorded}")]
    OkMismatch {
        status: u16,
        recorded: bool,
        reconstructed: bool,
    },

    #[error("Cannot {operation} while the socket is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Invalid close code {code}: expected 1000 or 3000-4999")]
    InvalidCloseCode { code: u16 },

    #[error("Close reason is {len} bytes, at most 123 are allowed")]
    CloseReasonTooLong { len: usize },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Fixture format error: {source}")]
    Format {
        #[from]
        source: wiretape_format::FormatError,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: http::Error,
    },

    #[cfg(feature = "live")]
    #[error("HTTP client error: {source}")]
    HttpClient {
        #[from]
        source: reqwest::Error,
    },

    #[cfg(feature = "live")]
    #[error("WebSocket error: {source}")]
    WebSocket {
        #[from]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }
}
