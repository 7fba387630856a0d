// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Subscriber setup for programs and test suites using wiretape.
//!
//! The harness crates only emit `tracing` events. Binaries and tests call one
//! of the `init*` functions here once to decide where those events go.

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing::Level;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// Structured JSON format, one object per line
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Plaintext => write!(f, "plaintext"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plaintext" | "text" => Ok(LogFormat::Plaintext),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {s}")),
        }
    }
}

/// Filter used when `RUST_LOG` is unset: `default_level` everywhere, and
/// explicitly for `component`.
fn filter_for(component: &str, default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{default_level},{component}={default_level}"))
    })
}

/// Initialize logging to stdout.
///
/// # Example
/// ```rust,no_run
/// use wiretape_logging::{init, Level, LogFormat};
///
/// fn main() -> anyhow::Result<()> {
///     init("wiretape", Level::INFO, LogFormat::Plaintext)?;
///     tracing::info!("Recording started");
///     Ok(())
/// }
/// ```
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stdout)
}

/// Initialize logging appended to `log_path`, creating parent directories.
pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    use std::fs;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = fs::OpenOptions::new().create(true).append(true).open(log_path)?;

    init_with_writer(component, default_level, format, Mutex::new(log_file))
}

/// Initialize logging with a custom writer
///
/// Fails if a global subscriber is already installed.
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = filter_for(component, default_level);

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).json();
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }

    Ok(())
}

/// In-memory log sink shared between a subscriber and the test reading it.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct LogBufferGuard<'a>(MutexGuard<'a, Vec<u8>>);

impl io::Write for LogBufferGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferGuard(self.lock())
    }
}

/// Install a global plaintext subscriber writing into a fresh buffer.
///
/// Only the first call in a process succeeds; prefer [`test_subscriber`]
/// when several tests in one binary need to capture logs.
pub fn init_for_test(component: &str, default_level: Level) -> anyhow::Result<LogBuffer> {
    let buffer = LogBuffer::new();
    init_with_writer(component, default_level, LogFormat::Plaintext, buffer.clone())?;
    Ok(buffer)
}

/// Build a plaintext subscriber writing into a fresh buffer without
/// installing it. Use with `tracing::subscriber::with_default` or
/// `set_default` to scope capture to one test.
pub fn test_subscriber(
    component: &str,
    default_level: Level,
) -> (impl tracing::Subscriber + Send + Sync + 'static, LogBuffer) {
    let buffer = LogBuffer::new();
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(buffer.clone())
        .with_ansi(false);
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(format!("{default_level},{component}={default_level}")))
        .with(layer);
    (subscriber, buffer)
}
