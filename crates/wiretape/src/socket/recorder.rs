// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;
use tracing::{info, trace};
use wiretape_format::{Direction, EventKind, SessionLog, TimedEvent, WireData};

use super::event::{EventTarget, MessageData, ReadyState, SocketEvent};
use super::{Connector, Socket};
use crate::error::{Error, Result};
use crate::log::SharedLog;

/// Connector wrapper that records the timeline of every socket it opens.
///
/// A session is appended to the log once it terminates (inbound close or
/// error) or once its socket is dropped, whichever comes first.
pub struct SocketRecorder<C> {
    connector: C,
    log: SharedLog<SessionLog>,
}

impl<C: Connector> SocketRecorder<C> {
    pub fn new(connector: C, log: SharedLog<SessionLog>) -> Self {
        Self { connector, log }
    }

    pub fn builder() -> SocketRecorderBuilder<C> {
        SocketRecorderBuilder {
            connector: None,
            log: None,
        }
    }

    pub fn log(&self) -> &SharedLog<SessionLog> {
        &self.log
    }
}

impl<C: Connector> Connector for SocketRecorder<C> {
    type Socket = RecordingSocket<C::Socket>;

    fn connect(&self, url: &str, protocols: &[String]) -> Result<Self::Socket> {
        let started = Instant::now();
        let inner = Arc::new(self.connector.connect(url, protocols)?);
        let session = Arc::new(SessionRecording {
            state: Mutex::new(RecordingState {
                session: Some(SessionLog::new(url, protocols.to_vec())),
                started,
                elapsed_ms: 0,
            }),
            log: self.log.clone(),
        });

        // Registered before the caller can add callbacks, so the recording
        // always observes an event first.
        for kind in [
            EventKind::Open,
            EventKind::Message,
            EventKind::Error,
            EventKind::Close,
        ] {
            let session = Arc::clone(&session);
            let socket = Arc::downgrade(&inner);
            inner.events().add_listener(kind, move |event| {
                let negotiated = match event {
                    SocketEvent::Open => socket
                        .upgrade()
                        .map(|socket| (socket.protocol(), socket.extensions())),
                    _ => None,
                };
                session.record_inbound(event, negotiated);
            });
        }

        info!(url, ?protocols, "Recording socket session");
        Ok(RecordingSocket { inner, session })
    }
}

struct RecordingState {
    /// `None` once the session has been handed to the log.
    session: Option<SessionLog>,
    started: Instant,
    elapsed_ms: u64,
}

struct SessionRecording {
    state: Mutex<RecordingState>,
    log: SharedLog<SessionLog>,
}

impl SessionRecording {
    fn append(&self, kind: EventKind, dir: Direction, build: impl FnOnce(TimedEvent) -> TimedEvent) {
        let mut state = self.lock();
        let total_ms = state.started.elapsed().as_millis() as u64;
        let at = total_ms.saturating_sub(state.elapsed_ms);
        state.elapsed_ms = total_ms;
        if let Some(session) = state.session.as_mut() {
            trace!(url = %session.url, %kind, ?dir, at, "Recorded socket event");
            session.log.push(build(TimedEvent::new(at, kind, dir)));
        }
    }

    fn record_inbound(&self, event: &SocketEvent, negotiated: Option<(String, String)>) {
        match event {
            SocketEvent::Open => {
                if let Some((protocol, extensions)) = negotiated {
                    if let Some(session) = self.lock().session.as_mut() {
                        session.protocol = protocol;
                        session.extensions = extensions;
                    }
                }
                self.append(EventKind::Open, Direction::Inbound, |event| event);
            }
            SocketEvent::Message(data) => {
                let data = data.to_wire();
                self.append(EventKind::Message, Direction::Inbound, |event| {
                    event.with_data(data)
                });
            }
            SocketEvent::Error { message } => {
                self.append(EventKind::Error, Direction::Inbound, |event| {
                    event.with_reason(message.clone())
                });
                self.finish();
            }
            SocketEvent::Close { code, reason, .. } => {
                self.append(EventKind::Close, Direction::Inbound, |event| {
                    event.with_close(Some(*code), Some(reason.clone()))
                });
                self.finish();
            }
        }
    }

    fn record_send(&self, data: WireData) {
        self.append(EventKind::Message, Direction::Outbound, |event| {
            event.with_data(data)
        });
    }

    fn record_close(&self, code: Option<u16>, reason: Option<&str>) {
        self.append(EventKind::Close, Direction::Outbound, |event| {
            event.with_close(code, reason.map(str::to_string))
        });
    }

    fn finish(&self) {
        let session = self.lock().session.take();
        if let Some(session) = session {
            info!(url = %session.url, events = session.log.len(), "Socket session recorded");
            self.log.push(session);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Socket handed out by [`SocketRecorder`]; behaves exactly like the wrapped one.
pub struct RecordingSocket<S> {
    inner: Arc<S>,
    session: Arc<SessionRecording>,
}

impl<S: Socket> RecordingSocket<S> {
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Socket> Socket for RecordingSocket<S> {
    fn url(&self) -> String {
        self.inner.url()
    }

    fn protocol(&self) -> String {
        self.inner.protocol()
    }

    fn extensions(&self) -> String {
        self.inner.extensions()
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.ready_state()
    }

    fn buffered_amount(&self) -> u64 {
        self.inner.buffered_amount()
    }

    fn events(&self) -> &EventTarget {
        self.inner.events()
    }

    fn send(&self, data: MessageData) -> Result<()> {
        let wire = data.to_wire();
        self.inner.send(data)?;
        self.session.record_send(wire);
        Ok(())
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        let active = matches!(
            self.inner.ready_state(),
            ReadyState::Connecting | ReadyState::Open
        );
        self.inner.close(code, reason)?;
        if active {
            self.session.record_close(code, reason);
        }
        Ok(())
    }
}

impl<S> Drop for RecordingSocket<S> {
    fn drop(&mut self) {
        self.session.finish();
    }
}

/// Builder reporting missing collaborators as configuration errors.
pub struct SocketRecorderBuilder<C> {
    connector: Option<C>,
    log: Option<SharedLog<SessionLog>>,
}

impl<C: Connector> SocketRecorderBuilder<C> {
    pub fn connector(mut self, connector: C) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn log(mut self, log: SharedLog<SessionLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn build(self) -> Result<SocketRecorder<C>> {
        let connector = self
            .connector
            .ok_or_else(|| Error::config("No connector passed to the socket recorder"))?;
        let log = self
            .log
            .ok_or_else(|| Error::config("No log passed to the socket recorder"))?;
        Ok(SocketRecorder::new(connector, log))
    }
}
