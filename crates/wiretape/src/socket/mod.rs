// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Stream session recording and replay.
//!
//! A [`SocketRecorder`] wraps a [`Connector`] and logs the timed event
//! timeline of every connection it opens. A [`SocketReplayer`] is a
//! [`Connector`] whose sockets play such a timeline back on a tokio task.

mod event;
mod recorder;
mod replayer;

#[cfg(feature = "live")]
mod live;

use std::sync::Arc;

use wiretape_format::EventKind;

use crate::error::Result;

pub use event::{
    validate_close, EventTarget, Handler, ListenerId, MessageData, ReadyState, SocketEvent,
};
#[cfg(feature = "live")]
pub use live::{LiveSocket, TungsteniteConnector};
pub use recorder::{RecordingSocket, SocketRecorder, SocketRecorderBuilder};
pub use replayer::{ReplaySocket, SocketReplayer, SocketReplayerBuilder};

/// A connection-like object.
pub trait Socket: Send + Sync {
    fn url(&self) -> String;

    /// Subprotocol selected by the server, empty until open.
    fn protocol(&self) -> String;

    fn extensions(&self) -> String;

    fn ready_state(&self) -> ReadyState;

    /// Bytes queued by `send` and not yet transmitted.
    fn buffered_amount(&self) -> u64;

    fn events(&self) -> &EventTarget;

    fn send(&self, data: MessageData) -> Result<()>;

    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<()>;

    fn send_text(&self, text: impl Into<String>) -> Result<()>
    where
        Self: Sized,
    {
        self.send(MessageData::Text(text.into()))
    }

    fn on_open<F>(&self, handler: F)
    where
        Self: Sized,
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.events().set_handler(EventKind::Open, Some(Arc::new(handler)));
    }

    fn on_message<F>(&self, handler: F)
    where
        Self: Sized,
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.events().set_handler(EventKind::Message, Some(Arc::new(handler)));
    }

    fn on_error<F>(&self, handler: F)
    where
        Self: Sized,
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.events().set_handler(EventKind::Error, Some(Arc::new(handler)));
    }

    fn on_close<F>(&self, handler: F)
    where
        Self: Sized,
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.events().set_handler(EventKind::Close, Some(Arc::new(handler)));
    }

    fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        Self: Sized,
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.events().add_listener(kind, listener)
    }
}

/// Opens sockets. The returned socket starts in CONNECTING.
pub trait Connector: Send + Sync {
    type Socket: Socket + 'static;

    fn connect(&self, url: &str, protocols: &[String]) -> Result<Self::Socket>;
}
