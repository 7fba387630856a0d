// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Deterministic JSON rendering.
//!
//! Object keys are sorted at every nesting level while array order is kept, so
//! two values that compare equal render to the same text no matter how their
//! maps were populated. The compact form is used as the replay fingerprint, the
//! indented form is the on-disk fixture layout.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FormatError, Result};

const INDENT: &str = "  ";

/// Render a JSON value compactly with sorted keys.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, None, 0);
    out
}

/// Serialize any value and render it compactly with sorted keys.
pub fn to_canonical_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).map_err(FormatError::Encode)?;
    Ok(canonicalize(&value))
}

/// Serialize any value and render it with sorted keys and two-space indentation.
pub fn to_canonical_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).map_err(FormatError::Encode)?;
    Ok(canonicalize_pretty(&value))
}

/// Render a JSON value with sorted keys and two-space indentation.
pub fn canonicalize_pretty(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, Some(INDENT), 0);
    out
}

fn write_value(out: &mut String, value: &Value, indent: Option<&str>, depth: usize) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => out.push_str(&value.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                newline(out, indent, depth + 1);
                write_value(out, item, indent, depth + 1);
            }
            newline(out, indent, depth);
            out.push(']');
        }
        Value::Object(map) => write_object(out, map, indent, depth),
    }
}

fn write_object(out: &mut String, map: &Map<String, Value>, indent: Option<&str>, depth: usize) {
    if map.is_empty() {
        out.push_str("{}");
        return;
    }

    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (idx, (key, value)) in entries.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        newline(out, indent, depth + 1);
        write_string(out, key);
        out.push(':');
        if indent.is_some() {
            out.push(' ');
        }
        write_value(out, value, indent, depth + 1);
    }
    newline(out, indent, depth);
    out.push('}');
}

fn write_string(out: &mut String, s: &str) {
    // serde_json's escaping matches what a JSON reader expects back
    out.push_str(&Value::String(s.to_owned()).to_string());
}

fn newline(out: &mut String, indent: Option<&str>, depth: usize) {
    if let Some(unit) = indent {
        out.push('\n');
        for _ in 0..depth {
            out.push_str(unit);
        }
    }
}
