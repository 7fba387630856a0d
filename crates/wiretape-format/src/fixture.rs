// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Text form of recorded fixtures.
//!
//! Writing is canonical (sorted keys, two-space indent, trailing newline) so a
//! re-recorded fixture only diffs where the traffic changed. Reading accepts
//! any field order.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::canonical;
use crate::error::{FormatError, Result};

/// Render a sequence of log entries or sessions as fixture text.
pub fn to_fixture_string<T: Serialize>(entries: &[T]) -> Result<String> {
    let mut text = canonical::to_canonical_pretty(entries)?;
    text.push('\n');
    Ok(text)
}

/// Parse fixture text back into a sequence of log entries or sessions.
pub fn from_fixture_str<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    serde_json::from_str(text).map_err(FormatError::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, EventKind, SessionLog, TimedEvent};

    #[test]
    fn test_written_fixture_is_sorted_and_terminated() {
        let mut session = SessionLog::new("wss://echo.test/", vec!["chat".to_string()]);
        session.log.push(TimedEvent::new(3, EventKind::Open, Direction::Inbound));
        let text = to_fixture_string(&[session]).unwrap();
        assert!(text.ends_with("]\n"));
        let dir = text.find("\"dir\"").unwrap();
        let kind = text.find("\"type\"").unwrap();
        let at = text.find("\"at\"").unwrap();
        assert!(at < dir && dir < kind);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = from_fixture_str::<SessionLog>("[{\"url\": 1}]").unwrap_err();
        assert!(matches!(err, FormatError::Parse(_)));
    }
}
