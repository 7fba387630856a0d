// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use thiserror::Error;

/// Convenient result alias for format operations.
pub type Result<T> = std::result::Result<T, FormatError>;

/// Errors raised while encoding or decoding fixture data.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A value could not be turned into JSON before canonicalization.
    #[error("Canonical encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Fixture text could not be parsed.
    #[error("Fixture parse error: {0}")]
    Parse(#[source] serde_json::Error),

    /// A tagged binary value did not have the expected shape.
    #[error("Malformed binary payload: {reason}")]
    MalformedBinary { reason: String },

    /// The `data` field of a binary payload was not valid base64.
    #[error("Binary payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A recorded body does not fit its declared `bodyType`.
    #[error("Recorded {body_type} body is invalid: {reason}")]
    UnexpectedBody { body_type: String, reason: String },

    /// An entry of a recorded session timeline cannot be replayed.
    #[error("Timeline entry {index} is malformed: {reason}")]
    MalformedTimeline { index: usize, reason: String },
}
