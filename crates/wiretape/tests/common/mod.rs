// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only
#![allow(dead_code)]

//! Scripted collaborators standing in for the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use wiretape::fetch::BufferedResponse;
use wiretape::socket::EventTarget;
use wiretape::{Connector, MessageData, ReadyState, RequestInit, Socket, SocketEvent, Transport};

/// Transport answering from a fixed resource → response table and counting calls.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: HashMap<String, BufferedResponse>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, resource: &str, response: BufferedResponse) -> Self {
        let response = response.with_url(resource);
        self.responses.insert(resource.to_string(), response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Response = BufferedResponse;

    async fn fetch(&self, resource: &str, _init: &RequestInit) -> wiretape::Result<BufferedResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self
            .responses
            .get(resource)
            .cloned()
            .unwrap_or_else(|| BufferedResponse::new(404, "").with_url(resource)))
    }
}

/// One scripted server-side event, `after` the previous one.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub after: Duration,
    pub event: SocketEvent,
}

pub fn step(after_ms: u64, event: SocketEvent) -> ScriptStep {
    ScriptStep {
        after: Duration::from_millis(after_ms),
        event,
    }
}

pub fn text(value: &str) -> SocketEvent {
    SocketEvent::Message(MessageData::Text(value.to_string()))
}

pub fn close(code: u16, reason: &str) -> SocketEvent {
    SocketEvent::Close {
        code,
        reason: reason.to_string(),
        was_clean: code != 1006,
    }
}

/// Connector whose sockets play a fixed script on a tokio task, the way a
/// server would drive a real connection.
#[derive(Clone)]
pub struct ScriptedConnector {
    script: Vec<ScriptStep>,
    protocol: String,
}

impl ScriptedConnector {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            protocol: String::new(),
        }
    }

    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.protocol = protocol.to_string();
        self
    }
}

struct ScriptedState {
    url: String,
    protocol: String,
    ready_state: Mutex<ReadyState>,
    buffered: AtomicU64,
    sent: Mutex<Vec<MessageData>>,
    events: EventTarget,
}

impl ScriptedState {
    fn state(&self) -> ReadyState {
        *self.ready_state.lock().unwrap()
    }

    fn set_state(&self, state: ReadyState) {
        *self.ready_state.lock().unwrap() = state;
    }
}

#[derive(Clone)]
pub struct ScriptedSocket {
    state: Arc<ScriptedState>,
}

impl ScriptedSocket {
    pub fn sent(&self) -> Vec<MessageData> {
        self.state.sent.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    type Socket = ScriptedSocket;

    fn connect(&self, url: &str, _protocols: &[String]) -> wiretape::Result<ScriptedSocket> {
        let state = Arc::new(ScriptedState {
            url: url.to_string(),
            protocol: self.protocol.clone(),
            ready_state: Mutex::new(ReadyState::Connecting),
            buffered: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            events: EventTarget::new(),
        });

        let driver = Arc::clone(&state);
        let script = self.script.clone();
        tokio::spawn(async move {
            let mut deadline = Instant::now();
            for step in script {
                deadline += step.after;
                tokio::time::sleep_until(deadline).await;
                match &step.event {
                    SocketEvent::Open => driver.set_state(ReadyState::Open),
                    SocketEvent::Message(_) => {}
                    SocketEvent::Error { .. } | SocketEvent::Close { .. } => {
                        driver.set_state(ReadyState::Closed)
                    }
                }
                driver.events.dispatch(&step.event);
                if driver.state() == ReadyState::Closed {
                    driver.events.clear();
                    return;
                }
            }
        });

        Ok(ScriptedSocket { state })
    }
}

impl Socket for ScriptedSocket {
    fn url(&self) -> String {
        self.state.url.clone()
    }

    fn protocol(&self) -> String {
        match self.state.state() {
            ReadyState::Connecting => String::new(),
            _ => self.state.protocol.clone(),
        }
    }

    fn extensions(&self) -> String {
        String::new()
    }

    fn ready_state(&self) -> ReadyState {
        self.state.state()
    }

    fn buffered_amount(&self) -> u64 {
        self.state.buffered.load(Ordering::SeqCst)
    }

    fn events(&self) -> &EventTarget {
        &self.state.events
    }

    fn send(&self, data: MessageData) -> wiretape::Result<()> {
        let state = self.state.state();
        if state != ReadyState::Open {
            return Err(wiretape::Error::InvalidState {
                operation: "send",
                state: state.as_str(),
            });
        }
        self.state.buffered.fetch_add(data.len() as u64, Ordering::SeqCst);
        self.state.sent.lock().unwrap().push(data);
        Ok(())
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) -> wiretape::Result<()> {
        wiretape::socket::validate_close(code, reason)?;
        if matches!(self.state.state(), ReadyState::Connecting | ReadyState::Open) {
            self.state.set_state(ReadyState::Closing);
        }
        Ok(())
    }
}

/// Collects `(kind, millis since start)` of dispatched events.
#[derive(Clone)]
pub struct EventClock {
    started: Instant,
    seen: Arc<Mutex<Vec<(String, u64)>>>,
}

impl EventClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn listener(&self, label: &'static str) -> impl Fn(&SocketEvent) + Send + Sync + 'static {
        let clock = self.clone();
        move |event| {
            let at = clock.started.elapsed().as_millis() as u64;
            let name = match event {
                SocketEvent::Message(data) => {
                    format!("{label}{}:{}", event.kind(), data.as_text().unwrap_or("<binary>"))
                }
                _ => format!("{label}{}", event.kind()),
            };
            clock.seen.lock().unwrap().push((name, at));
        }
    }

    pub fn seen(&self) -> Vec<(String, u64)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.seen().into_iter().map(|(name, _)| name).collect()
    }
}
