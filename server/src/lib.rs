//! # Game Server Library
//!
//! Authoritative server for a small multiplayer world. Clients hold one
//! persistent WebSocket each and send JSON commands; the server validates
//! every command against the canonical state it owns and broadcasts the
//! resulting world picture on a fixed cadence. Nothing a client sends is
//! ever trusted directly.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The server keeps the only real copy of the world. Clients express
//! intent (move here, say this, attack that); the server decides what
//! actually happens and everyone learns the outcome from the next
//! snapshot.
//!
//! ### Session Lifecycle
//! Every connection is greeted with its future player id, stays
//! unauthenticated until it presents credentials, and is bound to exactly
//! one world entity afterwards. Kicks, leave requests, and dropped sockets
//! all converge on the same single cleanup path.
//!
//! ### State Broadcasting
//! A fixed-rate tick serializes one consistent snapshot of the world and
//! fans the identical payload out to every authenticated connection.
//! Delivery is best effort; a slow client loses frames, never the server.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! Connection tasks only shuttle bytes. Everything stateful happens on one
//! event-loop task that owns the session table and the entity registry
//! outright, so commands apply one at a time, in arrival order per
//! connection, with no locks and no races.
//!
//! ### WebSocket Communication
//! Each socket gets a reader task (frames in, decoded to events) and a
//! writer task (bounded queue out). A full queue drops frames rather than
//! ever stalling the loop.
//!
//! ## Module Organization
//!
//! - [`config`]: world bounds, combat numbers, tick rate, capacity.
//! - [`auth`]: the credential-store seam and the in-memory store behind it.
//! - [`registry`]: entities and the world snapshot.
//! - [`session`]: per-connection state, id issue, targeted and broadcast
//!   delivery.
//! - [`commands`]: validation and application of every client intent.
//! - [`combat`]: cooldown and range gates, damage, respawn.
//! - [`network`]: the listener, the connection tasks, and the event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::auth::InMemoryCredentialStore;
//! use server::config::ServerConfig;
//! use server::network::GameServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let credentials = Arc::new(InMemoryCredentialStore::with_operators(["admin"]));
//!
//!     let mut server = GameServer::new("127.0.0.1:8080", config, credentials).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod combat;
pub mod commands;
pub mod config;
pub mod network;
pub mod registry;
pub mod session;
