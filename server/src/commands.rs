//! Validation and application of client intents.
//!
//! Every inbound message lands in [`CommandProcessor::handle`], which is
//! called from the event loop only. One message is validated and applied
//! in full before the next is looked at; clients never mutate anything
//! directly. Malformed or unauthorized intents are dropped without a
//! reply unless the protocol owes one (auth results, attack verdicts).

use crate::auth::{AuthError, CredentialStore};
use crate::combat::{self, AttackOutcome};
use crate::config::ServerConfig;
use crate::registry::{random_spawn, Entity, EntityRegistry};
use crate::session::{ConnId, SessionManager};
use log::{debug, info, warn};
use shared::{
    truncate_chars, AdminCommand, ClientMessage, KeySet, PlayerId, PositionUpdate, ServerMessage,
    DEFAULT_FACTION, DEFAULT_NAME, MAX_NAME_LEN,
};
use std::sync::Arc;
use std::time::Instant;

/// Whether an auth attempt is creating an account or using one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthIntent {
    Signup,
    Login,
}

/// Applies client messages to the session table and the entity registry.
/// Holds only immutable collaborators so the event loop can keep exclusive
/// ownership of the mutable state.
pub struct CommandProcessor {
    config: ServerConfig,
    credentials: Arc<dyn CredentialStore>,
}

impl CommandProcessor {
    pub fn new(config: ServerConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            config,
            credentials,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Routes one decoded message from `conn_id`. Messages from closing or
    /// unknown connections are dropped wholesale.
    pub fn handle(
        &self,
        sessions: &mut SessionManager,
        registry: &mut EntityRegistry,
        conn_id: ConnId,
        message: ClientMessage,
        now: Instant,
    ) {
        if !sessions.is_open(conn_id) {
            debug!("dropping message from closed connection {}", conn_id);
            return;
        }
        match message {
            ClientMessage::Signup { username, password } => {
                self.authenticate(sessions, registry, conn_id, AuthIntent::Signup, username, password)
            }
            ClientMessage::Login { username, password } => {
                self.authenticate(sessions, registry, conn_id, AuthIntent::Login, username, password)
            }
            ClientMessage::Join {
                name,
                faction,
                inventory,
            } => self.join(sessions, registry, conn_id, name, faction, inventory),
            ClientMessage::Move {
                position,
                keys,
                inventory,
            } => self.apply_move(sessions, registry, conn_id, position, keys, inventory),
            ClientMessage::Chat { message } => self.chat(sessions, registry, conn_id, message),
            ClientMessage::Attack { target_id } => {
                self.attack(sessions, registry, conn_id, target_id, now)
            }
            ClientMessage::DevCommand { command } => {
                self.dev_command(sessions, registry, conn_id, command)
            }
            ClientMessage::LeaveGame => {
                if sessions.entity_of(conn_id).is_some() {
                    sessions.close(conn_id, "left game");
                }
            }
        }
    }

    /// Runs a credential check and, on success, binds the session to its
    /// entity and spawns that entity. A second auth attempt on an already
    /// authenticated session is ignored outright.
    fn authenticate(
        &self,
        sessions: &mut SessionManager,
        registry: &mut EntityRegistry,
        conn_id: ConnId,
        intent: AuthIntent,
        username: String,
        password: String,
    ) {
        if sessions.entity_of(conn_id).is_some() {
            debug!("connection {} re-authenticated; ignoring", conn_id);
            return;
        }

        let result = match intent {
            AuthIntent::Signup => self.credentials.create_account(&username, &password),
            AuthIntent::Login => self.credentials.authenticate(&username, &password),
        };
        match result {
            Ok(grant) => {
                let Some(player_id) = sessions.bind_entity(conn_id) else {
                    return;
                };
                let spawn = random_spawn(&self.config.bounds);
                registry.insert(Entity::new(
                    player_id.clone(),
                    grant.privileged,
                    spawn,
                    self.config.max_health,
                ));
                info!(
                    "{} authenticated as {} on connection {}{}",
                    grant.user_id,
                    player_id,
                    conn_id,
                    if grant.privileged { " (operator)" } else { "" }
                );
                sessions.send(conn_id, &auth_reply(intent, Ok((player_id, username))));
            }
            Err(error) => {
                debug!("auth failure on connection {}: {}", conn_id, error);
                sessions.send(conn_id, &auth_reply(intent, Err(error)));
            }
        }
    }

    /// Registers identity fields and assigns a fresh spawn position.
    fn join(
        &self,
        sessions: &mut SessionManager,
        registry: &mut EntityRegistry,
        conn_id: ConnId,
        name: Option<String>,
        faction: Option<String>,
        inventory: Option<Vec<serde_json::Value>>,
    ) {
        let Some(id) = sessions.entity_of(conn_id).cloned() else {
            return;
        };
        let Some(entity) = registry.get_mut(&id) else {
            return;
        };

        entity.display_name = sanitize_label(name, DEFAULT_NAME);
        entity.faction = sanitize_label(faction, DEFAULT_FACTION);
        if let Some(items) = inventory {
            entity.inventory = items;
        }
        entity.position = random_spawn(&self.config.bounds);
        info!(
            "{} joined as {:?} ({})",
            entity.id, entity.display_name, entity.faction
        );
    }

    /// Applies absolute axes, then key deltas, then clamps to bounds. Each
    /// piece is optional; a malformed piece was already dropped in decode.
    fn apply_move(
        &self,
        sessions: &mut SessionManager,
        registry: &mut EntityRegistry,
        conn_id: ConnId,
        position: Option<PositionUpdate>,
        keys: Option<KeySet>,
        inventory: Option<Vec<serde_json::Value>>,
    ) {
        let Some(id) = sessions.entity_of(conn_id).cloned() else {
            return;
        };
        let Some(entity) = registry.get_mut(&id) else {
            return;
        };

        if let Some(update) = position {
            if let Some(x) = update.x.filter(|v| v.is_finite()) {
                entity.position.x = x;
            }
            if let Some(y) = update.y.filter(|v| v.is_finite()) {
                entity.position.y = y;
            }
            if let Some(z) = update.z.filter(|v| v.is_finite()) {
                entity.position.z = z;
            }
            if let Some(rot_y) = update.rot_y.filter(|v| v.is_finite()) {
                entity.position.rot_y = rot_y;
            }
        }
        if let Some(keys) = keys {
            let step = self.config.move_step;
            if keys.up {
                entity.position.y += step;
            }
            if keys.down {
                entity.position.y -= step;
            }
            if keys.left {
                entity.position.x -= step;
            }
            if keys.right {
                entity.position.x += step;
            }
        }
        self.config.bounds.clamp(&mut entity.position);

        if let Some(items) = inventory {
            entity.inventory = items;
        }
    }

    /// Relays a chat line to everyone, truncated to the configured cap.
    fn chat(
        &self,
        sessions: &mut SessionManager,
        registry: &mut EntityRegistry,
        conn_id: ConnId,
        message: Option<String>,
    ) {
        let Some(id) = sessions.entity_of(conn_id).cloned() else {
            return;
        };
        let Some(entity) = registry.get(&id) else {
            return;
        };

        let message = truncate_chars(message.as_deref().unwrap_or(""), self.config.chat_max_len);
        sessions.broadcast(&ServerMessage::Chat {
            name: entity.display_name.clone(),
            message,
            is_broadcast: false,
        });
    }

    /// Resolves an attack and answers the attacker. Attacks on entities
    /// that no longer exist are dropped without a reply.
    fn attack(
        &self,
        sessions: &mut SessionManager,
        registry: &mut EntityRegistry,
        conn_id: ConnId,
        target_id: String,
        now: Instant,
    ) {
        let Some(attacker_id) = sessions.entity_of(conn_id).cloned() else {
            return;
        };
        let target_id = PlayerId(target_id);

        match combat::resolve_attack(registry, &attacker_id, &target_id, now, &self.config) {
            AttackOutcome::Missing => {}
            AttackOutcome::Rejected(reason) => {
                sessions.send(
                    conn_id,
                    &ServerMessage::AttackResult {
                        success: false,
                        reason: Some(reason.as_str().to_string()),
                    },
                );
            }
            AttackOutcome::Hit { .. } => {
                sessions.send(
                    conn_id,
                    &ServerMessage::AttackResult {
                        success: true,
                        reason: None,
                    },
                );
            }
        }
    }

    /// Gate and dispatch for privileged commands. Unprivileged senders are
    /// dropped with no reply so the command surface stays unprobeable.
    fn dev_command(
        &self,
        sessions: &mut SessionManager,
        registry: &mut EntityRegistry,
        conn_id: ConnId,
        command: AdminCommand,
    ) {
        let Some(id) = sessions.entity_of(conn_id).cloned() else {
            return;
        };
        let Some(sender) = registry.get(&id) else {
            return;
        };
        if !sender.is_privileged {
            warn!("{} attempted privileged command without authority", id);
            return;
        }
        let sender_name = sender.display_name.clone();

        match command {
            AdminCommand::Broadcast { message } => {
                info!("{} broadcast an announcement", id);
                sessions.broadcast(&ServerMessage::Chat {
                    name: sender_name,
                    message: message.unwrap_or_default(),
                    is_broadcast: true,
                });
            }
            AdminCommand::Kick { target_id } => {
                self.kick(sessions, registry, &id, PlayerId(target_id));
            }
            AdminCommand::Teleport { target_id, x, y, z } => {
                self.teleport(registry, PlayerId(target_id), x, y, z);
            }
        }
    }

    /// Removes the target from the world and orders its connection closed.
    /// The entity binding is taken here, so the eventual close event finds
    /// nothing left to remove.
    fn kick(
        &self,
        sessions: &mut SessionManager,
        registry: &mut EntityRegistry,
        operator: &PlayerId,
        target: PlayerId,
    ) {
        let Some(target_conn) = sessions.conn_of(&target) else {
            debug!("kick target {} not connected", target);
            return;
        };
        info!("{} kicked {}", operator, target);
        sessions.send(
            target_conn,
            &ServerMessage::Kicked {
                reason: Some("removed by operator".to_string()),
            },
        );
        if let Some(entity_id) = sessions.unbind_entity(target_conn) {
            registry.remove(&entity_id);
        }
        sessions.close(target_conn, "kicked");
    }

    /// Moves the target to the given coordinates, still subject to world
    /// bounds. Any non-finite coordinate voids the whole command.
    fn teleport(
        &self,
        registry: &mut EntityRegistry,
        target: PlayerId,
        x: f32,
        y: f32,
        z: Option<f32>,
    ) {
        if !x.is_finite() || !y.is_finite() || z.is_some_and(|v| !v.is_finite()) {
            debug!("teleport of {} rejected: non-finite coordinates", target);
            return;
        }
        let Some(entity) = registry.get_mut(&target) else {
            debug!("teleport target {} not in world", target);
            return;
        };
        entity.position.x = x;
        entity.position.y = y;
        if let Some(z) = z {
            entity.position.z = z;
        }
        self.config.bounds.clamp(&mut entity.position);
        info!("{} teleported to ({}, {}, {})", target, entity.position.x, entity.position.y, entity.position.z);
    }
}

fn auth_reply(
    intent: AuthIntent,
    outcome: Result<(PlayerId, String), AuthError>,
) -> ServerMessage {
    let (success, id, username, error) = match outcome {
        Ok((id, username)) => (true, Some(id), Some(username), None),
        Err(error) => (false, None, None, Some(error.to_string())),
    };
    match intent {
        AuthIntent::Signup => ServerMessage::Signup {
            success,
            id,
            username,
            error,
        },
        AuthIntent::Login => ServerMessage::Login {
            success,
            id,
            username,
            error,
        },
    }
}

/// Trims, truncates, and defaults a client-supplied label.
fn sanitize_label(value: Option<String>, fallback: &str) -> String {
    match value {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                fallback.to_string()
            } else {
                truncate_chars(trimmed, MAX_NAME_LEN)
            }
        }
        None => fallback.to_string(),
    }
}
