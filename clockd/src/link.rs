//! WebSocket relay link to the pin controller.
//!
//! [`RelayLink`] owns one supervisor loop ([`RelayLink::run`]) that connects,
//! serves the connection until it fails, and reconnects after a fixed delay.
//! Producers never wait on the socket: [`RelayOutput::send`] drops the command
//! while the link is down and otherwise parks it in a bounded outbound queue
//! that the supervisor drains. Commands still queued when a connection ends
//! are discarded with it.

use std::time::Duration;

use clock_core::link::{
    LinkState, PinEvent, RECONNECT_DELAY_MS, RelayOutput, SessionTracker, StatusVocabulary,
    parse_status,
};
use clock_core::pins::{PinCommand, PinId};
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::{Channel, Receiver};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

/// Depth of the outbound command queue.
pub const OUTBOUND_QUEUE_DEPTH: usize = 32;

/// Depth of the inbound pin event queue.
pub const EVENT_QUEUE_DEPTH: usize = 8;

type LinkMutex = NoopRawMutex;

/// Queue of commands waiting for the socket.
pub type OutboundChannel = Channel<LinkMutex, PinCommand, OUTBOUND_QUEUE_DEPTH>;

/// Bus carrying parsed input transitions to the button dispatcher.
pub type EventChannel = Channel<LinkMutex, PinEvent, EVENT_QUEUE_DEPTH>;

/// Receiver for pin events.
pub type EventReceiver<'a> = Receiver<'a, LinkMutex, PinEvent, EVENT_QUEUE_DEPTH>;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a served connection ended.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("connection closed by peer")]
    Closed,
    #[error("websocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound wire frame.
#[derive(Debug, Serialize)]
struct CommandFrame {
    action: &'static str,
    pin: PinId,
}

impl From<PinCommand> for CommandFrame {
    fn from(command: PinCommand) -> Self {
        Self {
            action: command.level.as_str(),
            pin: command.pin,
        }
    }
}

/// Inbound wire frame. The pin controller sends either a status report or an
/// error string.
#[derive(Debug, Default, Deserialize)]
struct InboundFrame {
    status: Option<String>,
    error: Option<String>,
}

/// Self-reconnecting link to the pin controller.
pub struct RelayLink {
    url: String,
    vocabulary: StatusVocabulary,
    reconnect_delay: Duration,
    sessions: SessionTracker,
    outbound: OutboundChannel,
    events: EventChannel,
}

impl RelayLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            vocabulary: StatusVocabulary::default(),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            sessions: SessionTracker::new(),
            outbound: Channel::new(),
            events: Channel::new(),
        }
    }

    #[must_use]
    pub fn with_vocabulary(mut self, vocabulary: StatusVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Receiver half of the pin event bus.
    pub fn events(&self) -> EventReceiver<'_> {
        self.events.receiver()
    }

    /// Connect / serve / reconnect forever.
    pub async fn run(&self) -> ! {
        loop {
            match connect_async(self.url.as_str()).await {
                Ok((socket, _response)) => {
                    let session = self.sessions.attach();
                    info!(url = %self.url, session = session.0, "relay link connected");
                    let reason = self.serve(socket).await;
                    self.disconnect();
                    warn!(session = session.0, %reason, "relay link lost");
                }
                Err(error) => {
                    warn!(url = %self.url, %error, "relay link connect failed");
                }
            }
            debug!(delay_ms = self.reconnect_delay.as_millis(), "reconnect scheduled");
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    fn disconnect(&self) {
        self.sessions.detach();
        let discarded = self.outbound.len();
        self.outbound.clear();
        if discarded > 0 {
            debug!(discarded, "dropped queued relay commands");
        }
    }

    async fn serve(&self, socket: Socket) -> LinkError {
        let (mut write, mut read) = socket.split();
        loop {
            match select(self.outbound.receive(), read.next()).await {
                Either::First(command) => {
                    let frame = match serde_json::to_string(&CommandFrame::from(command)) {
                        Ok(frame) => frame,
                        Err(error) => return LinkError::Encode(error),
                    };
                    if let Err(error) = write.send(Message::text(frame)).await {
                        return LinkError::Transport(error);
                    }
                }
                Either::Second(Some(Ok(message))) => {
                    if matches!(message, Message::Close(_)) {
                        return LinkError::Closed;
                    }
                    self.handle_message(&message);
                }
                Either::Second(Some(Err(error))) => return LinkError::Transport(error),
                Either::Second(None) => return LinkError::Closed,
            }
        }
    }

    fn handle_message(&self, message: &Message) {
        let Message::Text(text) = message else {
            return;
        };
        let frame: InboundFrame = match serde_json::from_str(text.as_str()) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(%error, "ignoring malformed frame");
                return;
            }
        };
        if let Some(error) = frame.error {
            warn!(%error, "pin controller reported an error");
        }
        let Some(status) = frame.status else {
            return;
        };
        match parse_status(&status, &self.vocabulary) {
            Ok(event) => {
                debug!(pin = event.pin, edge = ?event.edge, "pin event");
                if self.events.try_send(event).is_err() {
                    warn!(pin = event.pin, "event queue full, dropping pin event");
                }
            }
            Err(error) => debug!(%status, %error, "ignoring status"),
        }
    }
}

impl RelayOutput for RelayLink {
    fn state(&self) -> LinkState {
        self.sessions.state()
    }

    fn send(&self, command: PinCommand) {
        if !self.sessions.state().is_connected() {
            debug!(pin = command.pin, level = %command.level, "link down, dropping command");
            return;
        }
        if self.outbound.try_send(command).is_err() {
            warn!(pin = command.pin, level = %command.level, "outbound queue full, dropping command");
        }
    }
}

impl std::fmt::Debug for RelayLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayLink")
            .field("url", &self.url)
            .field("state", &self.sessions.state())
            .field("queued", &self.outbound.len())
            .finish_non_exhaustive()
    }
}
