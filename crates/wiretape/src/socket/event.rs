// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Socket events, handler registration and the state shared by socket handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use wiretape_format::{body, BinaryKind, EventKind, PortableBinary, WireData};

use crate::error::{Error, Result};

/// Readiness of a socket, numbered like the WebSocket `readyState` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub const CONNECTING: u8 = ReadyState::Connecting as u8;
    pub const OPEN: u8 = ReadyState::Open as u8;
    pub const CLOSING: u8 = ReadyState::Closing as u8;
    pub const CLOSED: u8 = ReadyState::Closed as u8;

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyState::Connecting => "CONNECTING",
            ReadyState::Open => "OPEN",
            ReadyState::Closing => "CLOSING",
            ReadyState::Closed => "CLOSED",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a message in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

impl MessageData {
    /// Size in bytes as counted by `buffered_amount`.
    pub fn len(&self) -> usize {
        match self {
            MessageData::Text(text) => text.len(),
            MessageData::Binary(bytes) | MessageData::Ping(bytes) | MessageData::Pong(bytes) => {
                bytes.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageData::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Timeline form; binary payloads keep their frame kind.
    pub fn to_wire(&self) -> WireData {
        match self {
            MessageData::Text(text) => WireData::Text(text.clone()),
            MessageData::Binary(bytes) => WireData::Binary(body::encode_as(BinaryKind::Bytes, bytes)),
            MessageData::Ping(bytes) => WireData::Binary(body::encode_as(BinaryKind::Ping, bytes)),
            MessageData::Pong(bytes) => WireData::Binary(body::encode_as(BinaryKind::Pong, bytes)),
        }
    }

    pub fn from_wire(data: &WireData) -> Result<Self> {
        match data {
            WireData::Text(text) => Ok(MessageData::Text(text.clone())),
            WireData::Binary(binary) => Self::from_binary(binary),
        }
    }

    fn from_binary(binary: &PortableBinary) -> Result<Self> {
        let bytes = body::decode(binary)?;
        Ok(match binary.kind {
            BinaryKind::Bytes => MessageData::Binary(bytes),
            BinaryKind::Ping => MessageData::Ping(bytes),
            BinaryKind::Pong => MessageData::Pong(bytes),
        })
    }
}

impl From<&str> for MessageData {
    fn from(text: &str) -> Self {
        MessageData::Text(text.to_string())
    }
}

impl From<String> for MessageData {
    fn from(text: String) -> Self {
        MessageData::Text(text)
    }
}

impl From<Vec<u8>> for MessageData {
    fn from(bytes: Vec<u8>) -> Self {
        MessageData::Binary(bytes)
    }
}

/// Lifecycle notification delivered to handlers and listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(MessageData),
    Error {
        message: String,
    },
    Close {
        code: u16,
        reason: String,
        was_clean: bool,
    },
}

impl SocketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SocketEvent::Open => EventKind::Open,
            SocketEvent::Message(_) => EventKind::Message,
            SocketEvent::Error { .. } => EventKind::Error,
            SocketEvent::Close { .. } => EventKind::Close,
        }
    }
}

pub type Handler = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

/// Token returned by [`EventTarget::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: u64,
    kind: EventKind,
    /// `true` for the `on<kind>` handler slot.
    slot: bool,
    handler: Handler,
}

#[derive(Default)]
struct Registrations {
    next_id: u64,
    entries: Vec<Registration>,
}

/// Handler slots and listeners of one socket.
///
/// Callbacks run in registration order. A slot keeps the position of its
/// first assignment until it is cleared. Dispatch works on a snapshot, so a
/// callback may register listeners or call back into the socket; those
/// registrations take effect from the next event.
#[derive(Default)]
pub struct EventTarget {
    registrations: Mutex<Registrations>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        let mut registrations = self.lock();
        let id = registrations.next_id;
        registrations.next_id += 1;
        registrations.entries.push(Registration {
            id,
            kind,
            slot: false,
            handler: Arc::new(listener),
        });
        ListenerId(id)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registrations = self.lock();
        let before = registrations.entries.len();
        registrations
            .entries
            .retain(|entry| entry.slot || entry.id != id.0);
        registrations.entries.len() != before
    }

    /// Assign or clear the handler slot for `kind`.
    pub fn set_handler(&self, kind: EventKind, handler: Option<Handler>) {
        let mut registrations = self.lock();
        let existing = registrations
            .entries
            .iter()
            .position(|entry| entry.slot && entry.kind == kind);
        match (existing, handler) {
            (Some(index), Some(handler)) => registrations.entries[index].handler = handler,
            (Some(index), None) => {
                registrations.entries.remove(index);
            }
            (None, Some(handler)) => {
                let id = registrations.next_id;
                registrations.next_id += 1;
                registrations.entries.push(Registration {
                    id,
                    kind,
                    slot: true,
                    handler,
                });
            }
            (None, None) => {}
        }
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.lock()
            .entries
            .iter()
            .any(|entry| entry.slot && entry.kind == kind)
    }

    /// Number of callbacks, slot included, that would receive `kind`.
    pub fn callback_count(&self, kind: EventKind) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    pub fn dispatch(&self, event: &SocketEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| Arc::clone(&entry.handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Drop every slot and listener.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Registrations> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("callbacks", &self.lock().entries.len())
            .finish()
    }
}

/// Validate arguments of a consumer-initiated close.
pub fn validate_close(code: Option<u16>, reason: Option<&str>) -> Result<()> {
    if let Some(code) = code {
        if code != 1000 && !(3000..=4999).contains(&code) {
            return Err(Error::InvalidCloseCode { code });
        }
    }
    if let Some(reason) = reason {
        if reason.len() > 123 {
            return Err(Error::CloseReasonTooLong { len: reason.len() });
        }
    }
    Ok(())
}

/// State shared between a socket's handles and the task driving it.
#[derive(Debug)]
pub(crate) struct SocketCore {
    pub(crate) url: String,
    protocol: Mutex<String>,
    extensions: Mutex<String>,
    ready_state: AtomicU8,
    buffered_amount: AtomicU64,
    pub(crate) events: EventTarget,
}

impl SocketCore {
    pub(crate) fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol: Mutex::new(String::new()),
            extensions: Mutex::new(String::new()),
            ready_state: AtomicU8::new(ReadyState::CONNECTING),
            buffered_amount: AtomicU64::new(0),
            events: EventTarget::new(),
        }
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready_state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_ready_state(&self, state: ReadyState) {
        self.ready_state.store(state as u8, Ordering::SeqCst);
    }

    /// Move to `next` only if the socket is currently in `current`.
    pub(crate) fn transition(&self, current: ReadyState, next: ReadyState) -> bool {
        self.ready_state
            .compare_exchange(current as u8, next as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn protocol(&self) -> String {
        lock_string(&self.protocol).clone()
    }

    pub(crate) fn extensions(&self) -> String {
        lock_string(&self.extensions).clone()
    }

    pub(crate) fn set_negotiated(&self, protocol: &str, extensions: &str) {
        *lock_string(&self.protocol) = protocol.to_string();
        *lock_string(&self.extensions) = extensions.to_string();
    }

    pub(crate) fn buffered_amount(&self) -> u64 {
        self.buffered_amount.load(Ordering::SeqCst)
    }

    /// Account for an outgoing message; fails unless the socket is open.
    pub(crate) fn begin_send(&self, data: &MessageData) -> Result<()> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(Error::InvalidState {
                operation: "send",
                state: state.as_str(),
            });
        }
        self.buffered_amount
            .fetch_add(data.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn finish_send(&self, len: usize) {
        let _ = self
            .buffered_amount
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |amount| {
                Some(amount.saturating_sub(len as u64))
            });
    }

    /// Validate a consumer close and move to CLOSING. Returns `false` when the
    /// socket was already closing or closed.
    pub(crate) fn begin_close(&self, code: Option<u16>, reason: Option<&str>) -> Result<bool> {
        validate_close(code, reason)?;
        Ok(self.transition(ReadyState::Connecting, ReadyState::Closing)
            || self.transition(ReadyState::Open, ReadyState::Closing))
    }
}

fn lock_string(value: &Mutex<String>) -> MutexGuard<'_, String> {
    value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
