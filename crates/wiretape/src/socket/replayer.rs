// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};
use wiretape_format::{Direction, EventKind, FormatError, SessionLog, TimedEvent};

use super::event::{EventTarget, MessageData, ReadyState, SocketCore, SocketEvent};
use super::{Connector, Socket};
use crate::config::{Pacing, SocketReplayConfig};
use crate::error::{Error, Result};

/// Close code reported when a recorded close carries none.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Close code signalling an abnormal closure.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Connector whose sockets play back recorded sessions.
///
/// Each session is consumed by the first `connect` with the same url and
/// protocols. Sockets need a tokio runtime: the timeline is driven by a task
/// spawned on the current one.
pub struct SocketReplayer {
    sessions: Mutex<Vec<SessionLog>>,
    config: SocketReplayConfig,
}

impl SocketReplayer {
    pub fn new(sessions: Vec<SessionLog>) -> Result<Self> {
        Self::with_config(sessions, SocketReplayConfig::default())
    }

    pub fn with_config(sessions: Vec<SessionLog>, config: SocketReplayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sessions: Mutex::new(sessions),
            config,
        })
    }

    pub fn builder() -> SocketReplayerBuilder {
        SocketReplayerBuilder::default()
    }

    /// Number of sessions not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    /// Decode the first session matching `url` and `protocols` and consume it.
    /// A session whose timeline fails to decode stays in the replayer.
    fn take_session(
        &self,
        url: &str,
        protocols: &[String],
    ) -> Result<(SessionLog, Timeline)> {
        let mut sessions = self.lock();
        let Some(index) = sessions
            .iter()
            .position(|session| session.url == url && session.protocols == protocols)
        else {
            let remaining = sessions.len();
            warn!(url, remaining, "No recorded session matches connection");
            return Err(Error::NoMatchingSession {
                url: url.to_string(),
                remaining,
            });
        };
        let timeline = Timeline::decode(&sessions[index].log, self.config.pacing)?;
        Ok((sessions.remove(index), timeline))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionLog>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Connector for SocketReplayer {
    type Socket = ReplaySocket;

    fn connect(&self, url: &str, protocols: &[String]) -> Result<ReplaySocket> {
        let runtime = Handle::try_current().map_err(|_| {
            Error::config("Replaying a socket session requires a running tokio runtime")
        })?;

        let (session, timeline) = self.take_session(url, protocols)?;

        let core = Arc::new(SocketCore::new(url));
        core.set_negotiated(&session.protocol, &session.extensions);
        info!(url, steps = timeline.steps.len(), "Replaying socket session");

        runtime.spawn(timeline.run(Arc::downgrade(&core)));
        Ok(ReplaySocket { core })
    }
}

struct Step {
    delay: Duration,
    event: SocketEvent,
}

/// Inbound events with their paced delays. Outbound entries are not
/// replayed, their time is carried into the next inbound wait.
struct Timeline {
    steps: Vec<Step>,
}

impl Timeline {
    fn decode(log: &[TimedEvent], pacing: Pacing) -> Result<Self> {
        let mut steps = Vec::new();
        let mut carried_ms = 0u64;
        for (index, entry) in log.iter().enumerate() {
            carried_ms = carried_ms.saturating_add(entry.at);
            if entry.dir == Direction::Outbound {
                continue;
            }
            let event = match entry.kind {
                EventKind::Open => SocketEvent::Open,
                EventKind::Message => {
                    let data = entry.data.as_ref().ok_or_else(|| {
                        FormatError::MalformedTimeline {
                            index,
                            reason: format!("message at +{}ms has no data", entry.at),
                        }
                    })?;
                    SocketEvent::Message(MessageData::from_wire(data)?)
                }
                EventKind::Error => SocketEvent::Error {
                    message: entry
                        .reason
                        .clone()
                        .unwrap_or_else(|| "WebSocket error".to_string()),
                },
                EventKind::Close => {
                    let code = entry.code.unwrap_or(NO_STATUS_RECEIVED);
                    SocketEvent::Close {
                        code,
                        reason: entry.reason.clone().unwrap_or_default(),
                        was_clean: code != ABNORMAL_CLOSURE,
                    }
                }
            };
            steps.push(Step {
                delay: pacing.delay(Duration::from_millis(carried_ms)),
                event,
            });
            carried_ms = 0;
        }
        Ok(Self { steps })
    }

    async fn run(self, socket: Weak<SocketCore>) {
        let mut deadline = Instant::now();
        for step in self.steps {
            deadline += step.delay;
            sleep_until(deadline).await;

            let Some(core) = socket.upgrade() else {
                debug!("Socket dropped, stopping replay");
                return;
            };
            trace!(url = %core.url, kind = %step.event.kind(), "Replaying socket event");

            match &step.event {
                SocketEvent::Open => {
                    if !core.transition(ReadyState::Connecting, ReadyState::Open) {
                        continue;
                    }
                }
                SocketEvent::Message(_) => {
                    if core.ready_state() != ReadyState::Open {
                        trace!(url = %core.url, state = %core.ready_state(), "Dropping message");
                        continue;
                    }
                }
                SocketEvent::Error { .. } => core.set_ready_state(ReadyState::Closed),
                SocketEvent::Close { .. } => {
                    core.set_ready_state(ReadyState::Closed);
                    core.events.dispatch(&step.event);
                    core.events.clear();
                    info!(url = %core.url, "Replayed socket session closed");
                    return;
                }
            }
            core.events.dispatch(&step.event);
        }
    }
}

/// Socket produced by [`SocketReplayer`]. Clones are handles to the same socket.
///
/// `send` only checks the state and counts bytes; nothing is matched or
/// transmitted, so `buffered_amount` never drains.
#[derive(Debug, Clone)]
pub struct ReplaySocket {
    core: Arc<SocketCore>,
}

impl Socket for ReplaySocket {
    fn url(&self) -> String {
        self.core.url.clone()
    }

    fn protocol(&self) -> String {
        // only visible once the connection is established
        match self.core.ready_state() {
            ReadyState::Connecting => String::new(),
            _ => self.core.protocol(),
        }
    }

    fn extensions(&self) -> String {
        match self.core.ready_state() {
            ReadyState::Connecting => String::new(),
            _ => self.core.extensions(),
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.core.ready_state()
    }

    fn buffered_amount(&self) -> u64 {
        self.core.buffered_amount()
    }

    fn events(&self) -> &EventTarget {
        &self.core.events
    }

    fn send(&self, data: MessageData) -> Result<()> {
        self.core.begin_send(&data)
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        if self.core.begin_close(code, reason)? {
            debug!(url = %self.core.url, ?code, "Socket closing, waiting for recorded close");
        }
        Ok(())
    }
}

/// Builder reporting a missing log as a configuration error.
#[derive(Default)]
pub struct SocketReplayerBuilder {
    sessions: Option<Vec<SessionLog>>,
    config: SocketReplayConfig,
}

impl SocketReplayerBuilder {
    pub fn log(mut self, sessions: Vec<SessionLog>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn config(mut self, config: SocketReplayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.config.pacing = pacing;
        self
    }

    pub fn build(self) -> Result<SocketReplayer> {
        let sessions = self
            .sessions
            .ok_or_else(|| Error::config("No log passed to the socket replayer"))?;
        SocketReplayer::with_config(sessions, self.config)
    }
}
