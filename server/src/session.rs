//! Connection bookkeeping: one [`Session`] per open socket.
//!
//! A session starts unauthenticated. Authentication binds it to exactly one
//! entity id; that binding is surrendered exactly once, either when an
//! operator kicks the player or when the connection's close event arrives.
//! Delivery is best effort throughout: a full or gone outbound queue drops
//! the frame and never stalls the event loop.

use log::{debug, error, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use shared::{PlayerId, ServerMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Monotonic handle for one accepted socket. Never reused within a process.
pub type ConnId = u64;

/// Characters in a freshly issued player id.
const PLAYER_ID_LEN: usize = 9;

/// What the event loop hands to a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// A frame to forward as-is.
    Frame(Message),
    /// Send a close frame carrying `reason`, then stop writing.
    Close { reason: String },
}

/// Server-side state for one open connection.
#[derive(Debug)]
pub struct Session {
    pub addr: SocketAddr,
    /// Id announced in the `init` frame; becomes the entity id on auth.
    issued_id: PlayerId,
    /// Entity binding. `Some` only while authenticated and not yet
    /// surrendered.
    entity: Option<PlayerId>,
    /// Set once a close has been ordered; inbound traffic is ignored from
    /// then on.
    closing: bool,
    outbound: mpsc::Sender<Outbound>,
}

impl Session {
    pub fn issued_id(&self) -> &PlayerId {
        &self.issued_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.entity.is_some() && !self.closing
    }
}

/// Owns every open session. Lives inside the event loop task, so all
/// methods take plain `&self`/`&mut self` and nothing here locks.
#[derive(Debug)]
pub struct SessionManager {
    sessions: HashMap<ConnId, Session>,
    max_clients: usize,
}

impl SessionManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_clients,
        }
    }

    /// Admits a connection, issues its player id, and sends the `init`
    /// frame. Over capacity the connection is refused with a close notice
    /// and `None` comes back.
    pub fn open(
        &mut self,
        conn_id: ConnId,
        addr: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
    ) -> Option<PlayerId> {
        if self.sessions.len() >= self.max_clients {
            warn!("refusing connection from {}: server full", addr);
            let _ = outbound.try_send(Outbound::Close {
                reason: "server full".to_string(),
            });
            return None;
        }

        let issued_id = self.issue_id();
        info!("connection {} from {} assigned id {}", conn_id, addr, issued_id);
        self.sessions.insert(
            conn_id,
            Session {
                addr,
                issued_id: issued_id.clone(),
                entity: None,
                closing: false,
                outbound,
            },
        );
        self.send(
            conn_id,
            &ServerMessage::Init {
                id: issued_id.clone(),
            },
        );
        Some(issued_id)
    }

    /// A short random id no other open session holds.
    fn issue_id(&self) -> PlayerId {
        let mut rng = rand::thread_rng();
        loop {
            let candidate: String = (0..PLAYER_ID_LEN)
                .map(|_| rng.sample(Alphanumeric) as char)
                .collect();
            let id = PlayerId(candidate.to_lowercase());
            if !self.sessions.values().any(|s| s.issued_id == id) {
                return id;
            }
        }
    }

    /// True while the connection exists and no close has been ordered.
    pub fn is_open(&self, conn_id: ConnId) -> bool {
        self.sessions.get(&conn_id).is_some_and(|s| !s.closing)
    }

    /// Marks the session authenticated and hands out its entity id.
    pub fn bind_entity(&mut self, conn_id: ConnId) -> Option<PlayerId> {
        let session = self.sessions.get_mut(&conn_id)?;
        session.entity = Some(session.issued_id.clone());
        Some(session.issued_id.clone())
    }

    /// The entity this connection drives, if authenticated and not closing.
    pub fn entity_of(&self, conn_id: ConnId) -> Option<&PlayerId> {
        let session = self.sessions.get(&conn_id)?;
        if session.closing {
            return None;
        }
        session.entity.as_ref()
    }

    /// Takes the entity binding, leaving the session unauthenticated. At
    /// most one caller ever gets `Some` for a given binding.
    pub fn unbind_entity(&mut self, conn_id: ConnId) -> Option<PlayerId> {
        self.sessions.get_mut(&conn_id)?.entity.take()
    }

    /// The connection currently bound to `entity`, if any.
    pub fn conn_of(&self, entity: &PlayerId) -> Option<ConnId> {
        self.sessions
            .iter()
            .find(|(_, s)| s.entity.as_ref() == Some(entity))
            .map(|(conn_id, _)| *conn_id)
    }

    /// Orders the connection closed. Inbound traffic is ignored from here
    /// on; the session itself lingers until the close event arrives.
    pub fn close(&mut self, conn_id: ConnId, reason: &str) {
        if let Some(session) = self.sessions.get_mut(&conn_id) {
            debug!("closing connection {}: {}", conn_id, reason);
            session.closing = true;
            let _ = session.outbound.try_send(Outbound::Close {
                reason: reason.to_string(),
            });
        }
    }

    /// Discards the session and surrenders whatever entity binding it
    /// still held.
    pub fn remove(&mut self, conn_id: ConnId) -> Option<PlayerId> {
        let mut session = self.sessions.remove(&conn_id)?;
        info!("connection {} from {} removed", conn_id, session.addr);
        session.entity.take()
    }

    /// Serializes one message for one connection. Best effort.
    pub fn send(&self, conn_id: ConnId, message: &ServerMessage) {
        let Some(session) = self.sessions.get(&conn_id) else {
            return;
        };
        if let Some(frame) = encode(message) {
            let _ = session.outbound.try_send(Outbound::Frame(frame));
        }
    }

    /// Serializes once and fans the frame out to every authenticated
    /// connection. Returns how many queues accepted it.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        match encode(message) {
            Some(frame) => self.broadcast_frame(frame),
            None => 0,
        }
    }

    fn broadcast_frame(&self, frame: Message) -> usize {
        let mut delivered = 0;
        for session in self.sessions.values() {
            if !session.is_authenticated() {
                continue;
            }
            if session.outbound.try_send(Outbound::Frame(frame.clone())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn authenticated_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_authenticated()).count()
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::text(text)),
        Err(err) => {
            error!("failed to encode outbound message: {}", err);
            None
        }
    }
}
