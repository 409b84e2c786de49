//! WebSocket side of the emulator.
//!
//! Every client gets its own task. Commands are applied to the shared
//! [`Board`]; status frames and connection drops fan out to all clients over a
//! broadcast channel.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use clock_core::pins::{PinEdge, PinId};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::board::{Board, FrameOutcome};

const BROADCAST_DEPTH: usize = 32;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Broadcast {
    Status(String),
    Drop,
}

/// Board plus the client fan-out, shared by the server and the REPL.
#[derive(Clone, Debug)]
pub struct Hub {
    board: Arc<Mutex<Board>>,
    broadcast: broadcast::Sender<Broadcast>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_DEPTH);
        Self {
            board: Arc::new(Mutex::new(Board::new())),
            broadcast,
        }
    }

    /// Runs `f` against the board.
    pub fn with_board<T>(&self, f: impl FnOnce(&mut Board) -> T) -> T {
        let mut board = self.board.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut board)
    }

    pub fn clients(&self) -> usize {
        self.broadcast.receiver_count()
    }

    /// Reports an input transition to every client. Returns `false` for an
    /// unknown pin.
    pub fn input(&self, pin: PinId, edge: PinEdge) -> bool {
        let Some(frame) = self.with_board(|board| board.set_input(pin, edge)) else {
            return false;
        };
        info!(pin, ?edge, clients = self.clients(), "input transition");
        // No receivers just means nobody is connected.
        let _ = self.broadcast.send(Broadcast::Status(frame));
        true
    }

    /// Closes every client connection.
    pub fn drop_clients(&self) -> usize {
        let clients = self.clients();
        let _ = self.broadcast.send(Broadcast::Drop);
        clients
    }

    /// Accepts clients on `listener` forever.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "pin emulator listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            let hub = self.clone();
            tokio::spawn(async move {
                hub.client(stream, peer).await;
            });
        }
    }

    async fn client(&self, stream: TcpStream, peer: SocketAddr) {
        let socket = match tokio_tungstenite::accept_async(stream).await {
            Ok(socket) => socket,
            Err(error) => {
                warn!(%peer, %error, "websocket handshake failed");
                return;
            }
        };
        info!(%peer, "client connected");
        let mut fanout = self.broadcast.subscribe();
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                inbound = read.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = self.command(peer, text.as_str()) {
                            if let Err(error) = write.send(Message::text(reply)).await {
                                warn!(%peer, %error, "reply failed");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!(%peer, %error, "client read failed");
                        break;
                    }
                },
                outbound = fanout.recv() => match outbound {
                    Ok(Broadcast::Status(frame)) => {
                        if let Err(error) = write.send(Message::text(frame)).await {
                            warn!(%peer, %error, "status broadcast failed");
                            break;
                        }
                    }
                    Ok(Broadcast::Drop) => {
                        let _ = write.close().await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(%peer, missed, "client fell behind on status frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!(%peer, "client disconnected");
    }

    fn command(&self, peer: SocketAddr, text: &str) -> Option<String> {
        match self.with_board(|board| board.apply_frame(text)) {
            FrameOutcome::Applied(change) => {
                if change.changed {
                    info!(pin = change.pin, level = %change.level, "output switched");
                } else {
                    debug!(pin = change.pin, level = %change.level, "output unchanged");
                }
                None
            }
            FrameOutcome::Rejected(reply) => {
                warn!(%peer, frame = text, "rejected command");
                Some(reply)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn clients_receive_inputs_and_get_error_replies() {
        let hub = Hub::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = hub.clone();
        tokio::spawn(async move { server.serve(listener).await });

        let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        socket
            .send(Message::text(r#"{"action": "on", "pin": 1}"#))
            .await
            .unwrap();
        socket
            .send(Message::text(r#"{"action": "on", "pin": 9}"#))
            .await
            .unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reply.to_text().unwrap(), r#"{"error":"Ungültige Aktion oder Pin"}"#);
        assert_eq!(hub.with_board(|board| board.output(1)), Some(true));

        assert!(hub.input(2, PinEdge::Off));
        let status = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(status.to_text().unwrap(), r#"{"status":"Eingang 2 ausgeschaltet"}"#);

        assert_eq!(hub.drop_clients(), 1);
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match socket.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }
}
