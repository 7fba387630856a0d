// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Network-backed connector for recording sessions.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::event::{EventTarget, MessageData, ReadyState, SocketCore, SocketEvent};
use super::{Connector, Socket};
use crate::error::{Error, Result};

const ABNORMAL_CLOSURE: u16 = 1006;

enum Command {
    Send(MessageData),
    Close { code: Option<u16>, reason: String },
}

/// Connector opening real WebSocket connections with tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TungsteniteConnector {
    type Socket = LiveSocket;

    fn connect(&self, url: &str, protocols: &[String]) -> Result<LiveSocket> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Opening a socket requires a running tokio runtime"))?;

        let mut request = url.into_client_request()?;
        if !protocols.is_empty() {
            let value = HeaderValue::from_str(&protocols.join(", ")).map_err(http::Error::from)?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let core = Arc::new(SocketCore::new(url));
        let (commands, receiver) = mpsc::unbounded_channel();
        runtime.spawn(pump(Arc::clone(&core), request, receiver));
        Ok(LiveSocket { core, commands })
    }
}

fn fail(core: &SocketCore, message: String) {
    warn!(url = %core.url, %message, "Socket failed");
    core.set_ready_state(ReadyState::Closed);
    core.events.dispatch(&SocketEvent::Error { message });
    core.events.dispatch(&SocketEvent::Close {
        code: ABNORMAL_CLOSURE,
        reason: String::new(),
        was_clean: false,
    });
    core.events.clear();
}

fn header_string(response: &http::Response<Option<Vec<u8>>>, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn pump(
    core: Arc<SocketCore>,
    request: http::Request<()>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let (stream, response) = match connect_async(request).await {
        Ok(connected) => connected,
        Err(err) => return fail(&core, err.to_string()),
    };

    core.set_negotiated(
        &header_string(&response, "sec-websocket-protocol"),
        &header_string(&response, "sec-websocket-extensions"),
    );
    if !core.transition(ReadyState::Connecting, ReadyState::Open) {
        drop(stream);
        let message = "Socket was closed before the connection was established";
        return fail(&core, message.to_string());
    }
    core.events.dispatch(&SocketEvent::Open);

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(data)) => {
                    let len = data.len();
                    let message = match data {
                        MessageData::Text(text) => Message::Text(text),
                        MessageData::Binary(bytes) => Message::Binary(bytes),
                        MessageData::Ping(bytes) => Message::Ping(bytes),
                        MessageData::Pong(bytes) => Message::Pong(bytes),
                    };
                    let sent = sink.send(message).await;
                    core.finish_send(len);
                    if let Err(err) = sent {
                        return fail(&core, err.to_string());
                    }
                }
                Some(Command::Close { code, reason }) => {
                    let frame = code.map(|code| CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    });
                    if let Err(err) = sink.send(Message::Close(frame)).await {
                        return fail(&core, err.to_string());
                    }
                }
                None => {
                    debug!(url = %core.url, "All socket handles dropped");
                    let _ = sink.close().await;
                    return;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch_message(&core, MessageData::Text(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    dispatch_message(&core, MessageData::Binary(bytes))
                }
                Some(Ok(Message::Ping(bytes))) => dispatch_message(&core, MessageData::Ping(bytes)),
                Some(Ok(Message::Pong(bytes))) => dispatch_message(&core, MessageData::Pong(bytes)),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|frame| (u16::from(frame.code), frame.reason.into_owned()))
                        .unwrap_or((1005, String::new()));
                    core.set_ready_state(ReadyState::Closed);
                    core.events.dispatch(&SocketEvent::Close {
                        code,
                        reason,
                        was_clean: true,
                    });
                    core.events.clear();
                    return;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(err)) => return fail(&core, err.to_string()),
                None => {
                    return fail(&core, "Connection closed without a close frame".to_string());
                }
            },
        }
    }
}

fn dispatch_message(core: &SocketCore, data: MessageData) {
    if core.ready_state() == ReadyState::Open {
        core.events.dispatch(&SocketEvent::Message(data));
    }
}

/// Socket backed by a live connection. Clones are handles to the same socket.
#[derive(Debug, Clone)]
pub struct LiveSocket {
    core: Arc<SocketCore>,
    commands: mpsc::UnboundedSender<Command>,
}

impl LiveSocket {
    fn submit(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::transport(format!("Connection to {} is gone", self.core.url)))
    }
}

impl Socket for LiveSocket {
    fn url(&self) -> String {
        self.core.url.clone()
    }

    fn protocol(&self) -> String {
        self.core.protocol()
    }

    fn extensions(&self) -> String {
        self.core.extensions()
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
        self.core.begin_send(&data)?;
        self.submit(Command::Send(data))
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        if self.core.begin_close(code, reason)? {
            self.submit(Command::Close {
                code,
                reason: reason.unwrap_or_default().to_string(),
            })?;
        }
        Ok(())
    }
}
