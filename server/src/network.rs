//! WebSocket transport and the single-threaded game event loop.
//!
//! Each accepted socket gets two small tasks: a reader that decodes frames
//! into [`ServerEvent`]s and a writer that drains that connection's
//! outbound queue. All events funnel into one channel consumed by
//! [`GameServer::run`], which owns every piece of mutable state. State is
//! therefore mutated from exactly one task and needs no locks; command
//! application and snapshotting can never interleave.

use crate::auth::CredentialStore;
use crate::commands::CommandProcessor;
use crate::config::ServerConfig;
use crate::registry::EntityRegistry;
use crate::session::{ConnId, Outbound, SessionManager};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Frames a slow client may have queued before the server starts dropping.
const OUTBOUND_BUFFER: usize = 64;

/// Ticks between connection statistics lines in the debug log.
const STATS_EVERY_TICKS: u64 = 200;

/// Everything the connection tasks report to the event loop.
#[derive(Debug)]
pub enum ServerEvent {
    /// A WebSocket handshake completed; here is the queue to write to it.
    Connected {
        conn_id: ConnId,
        addr: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
    },
    /// One decoded message from an open connection.
    Message {
        conn_id: ConnId,
        message: ClientMessage,
    },
    /// The connection is gone. Always the last event for a `conn_id`, and
    /// always after every `Message` it produced.
    Closed { conn_id: ConnId },
}

/// The server: listener, session table, world state, and the loop that
/// ties them together.
pub struct GameServer {
    listener: TcpListener,
    sessions: SessionManager,
    registry: EntityRegistry,
    processor: CommandProcessor,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    next_conn_id: ConnId,
    tick_count: u64,
}

impl GameServer {
    pub async fn new(
        addr: &str,
        config: ServerConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let sessions = SessionManager::new(config.max_clients);

        Ok(GameServer {
            listener,
            sessions,
            registry: EntityRegistry::new(),
            processor: CommandProcessor::new(config, credentials),
            event_tx,
            event_rx,
            next_conn_id: 1,
            tick_count: 0,
        })
    }

    /// The address actually bound, for callers that asked for port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts sockets, applies events, and broadcasts snapshots until the
    /// surrounding task is dropped.
    pub async fn run(&mut self) {
        let mut tick = interval(self.processor.config().tick_duration());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr),
                    Err(err) => warn!("accept failed: {}", err),
                },
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    // Unreachable while we hold a sender; kept so the loop
                    // winds down cleanly if that ever changes.
                    None => break,
                },
                _ = tick.tick() => self.broadcast_tick(),
            }
        }
    }

    /// Hands a raw socket to its own reader and writer tasks.
    fn spawn_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        let events = self.event_tx.clone();

        tokio::spawn(async move {
            let ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(err) => {
                    debug!("handshake with {} failed: {}", addr, err);
                    return;
                }
            };
            debug!("connection {} from {} established", conn_id, addr);

            let (sink, stream) = ws.split();
            let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
            if events
                .send(ServerEvent::Connected {
                    conn_id,
                    addr,
                    outbound: outbound_tx,
                })
                .is_err()
            {
                return;
            }

            let mut writer = tokio::spawn(write_loop(sink, outbound_rx));
            let mut reader = tokio::spawn(read_loop(stream, conn_id, events.clone()));
            tokio::select! {
                _ = &mut writer => reader.abort(),
                _ = &mut reader => writer.abort(),
            }
            let _ = events.send(ServerEvent::Closed { conn_id });
        });
    }

    /// Applies one event to the session table and the world.
    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected {
                conn_id,
                addr,
                outbound,
            } => {
                self.sessions.open(conn_id, addr, outbound);
            }
            ServerEvent::Message { conn_id, message } => {
                self.processor.handle(
                    &mut self.sessions,
                    &mut self.registry,
                    conn_id,
                    message,
                    Instant::now(),
                );
            }
            ServerEvent::Closed { conn_id } => {
                if let Some(entity_id) = self.sessions.remove(conn_id) {
                    self.registry.remove(&entity_id);
                }
            }
        }
    }

    /// Serializes the world once and fans it out to every authenticated
    /// connection. Runs on the tick cadence whether or not anything moved.
    fn broadcast_tick(&mut self) {
        self.tick_count += 1;
        if self.sessions.is_empty() {
            return;
        }

        let update = ServerMessage::Update {
            players: self.registry.snapshot(),
        };
        let delivered = self.sessions.broadcast(&update);

        if self.tick_count % STATS_EVERY_TICKS == 0 {
            debug!(
                "tick {}: {} connections ({} authenticated), {} entities, {} snapshots queued",
                self.tick_count,
                self.sessions.len(),
                self.sessions.authenticated_count(),
                self.registry.len(),
                delivered
            );
        }
    }
}

/// Reads frames until the peer closes or errors, forwarding every decoded
/// message. Undecodable payloads are logged and skipped; the connection
/// lives on.
async fn read_loop(
    mut stream: SplitStream<WebSocketStream<TcpStream>>,
    conn_id: ConnId,
    events: mpsc::UnboundedSender<ServerEvent>,
) {
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                debug!("connection {} read error: {}", conn_id, err);
                break;
            }
        };
        let text = match &frame {
            Message::Text(text) => text.as_str(),
            Message::Close(_) => break,
            // Binary, ping, and pong frames carry nothing we accept.
            _ => continue,
        };
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => {
                if events
                    .send(ServerEvent::Message { conn_id, message })
                    .is_err()
                {
                    break;
                }
            }
            Err(err) => debug!("connection {} sent undecodable frame: {}", conn_id, err),
        }
    }
}

/// Drains one connection's outbound queue into its socket. A close order
/// sends a proper close frame and ends the task; so does a dead socket.
async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            Outbound::Close { reason } => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        }
    }
}
