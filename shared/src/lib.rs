//! Wire protocol shared between the authoritative server and its clients.
//!
//! Every frame on the wire is a JSON object carrying a `type` tag. Inbound
//! messages decode into [`ClientMessage`]; outbound messages encode from
//! [`ServerMessage`]. Gameplay fields are decoded leniently: a field of the
//! wrong shape becomes `None` instead of failing the whole message, so one
//! bad value never blocks the rest of the payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Longest accepted display name or faction tag, in characters.
pub const MAX_NAME_LEN: usize = 32;
/// Display name assigned until a client registers one.
pub const DEFAULT_NAME: &str = "Anonymous";
/// Faction tag assigned until a client registers one.
pub const DEFAULT_FACTION: &str = "red";

/// Identifier issued to a connection at handshake time and reused as the
/// entity id once the connection authenticates. Serializes as a plain JSON
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        PlayerId(value.to_string())
    }
}

/// A point in the world plus the entity's heading around the vertical axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rot_y: f32,
}

/// Euclidean distance between two positions over the three spatial axes.
/// Heading does not participate.
pub fn distance(a: &Position, b: &Position) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Returns at most `max` characters of `input`, cutting on a character
/// boundary.
pub fn truncate_chars(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

/// The starter inventory every entity spawns with. Inventory contents are
/// opaque to the server; this seed item exists so clients always have
/// something to render.
pub fn default_inventory() -> Vec<Value> {
    vec![serde_json::json!({ "name": "Basic", "icon": "⚪" })]
}

/// Decodes a field that may be absent or malformed into `Option<T>` without
/// failing the surrounding message.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Decodes a boolean flag, treating absent or malformed values as unset.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(bool::deserialize(value).unwrap_or(false))
}

/// Absolute position fields of a movement message. Each axis is applied
/// independently; a malformed axis leaves the others intact.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    #[serde(default, deserialize_with = "lenient")]
    pub x: Option<f32>,
    #[serde(default, deserialize_with = "lenient")]
    pub y: Option<f32>,
    #[serde(default, deserialize_with = "lenient")]
    pub z: Option<f32>,
    #[serde(default, deserialize_with = "lenient")]
    pub rot_y: Option<f32>,
}

/// Directional key state of a movement message. Each pressed key applies one
/// configured movement step.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct KeySet {
    #[serde(default, deserialize_with = "lenient_flag")]
    pub up: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub down: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub left: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub right: bool,
}

/// Privileged sub-commands carried by a `devCommand` message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum AdminCommand {
    /// Server-wide announcement, fanned out as a chat event tagged as a
    /// broadcast.
    Broadcast {
        #[serde(default, deserialize_with = "lenient")]
        message: Option<String>,
    },
    /// Forcibly disconnect the target and drop its entity.
    Kick {
        #[serde(rename = "targetId")]
        target_id: String,
    },
    /// Overwrite the target's position. Coordinates must be finite; the
    /// result is still clamped to world bounds.
    Teleport {
        #[serde(rename = "targetId")]
        target_id: String,
        x: f32,
        y: f32,
        #[serde(default, deserialize_with = "lenient")]
        z: Option<f32>,
    },
}

/// Every message a client may send. Unknown `type` tags fail to decode and
/// are dropped by the reader; unknown fields inside a known type are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Create an account and authenticate in one step.
    Signup { username: String, password: String },
    /// Authenticate against an existing account.
    Login { username: String, password: String },
    /// Register display name and faction, and take a fresh spawn position.
    #[serde(alias = "register")]
    Join {
        #[serde(default, deserialize_with = "lenient")]
        name: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        faction: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        inventory: Option<Vec<Value>>,
    },
    /// Absolute and/or key-relative movement. The inventory rides along on
    /// this message as well; its contents are opaque to the server.
    #[serde(alias = "movementState")]
    Move {
        #[serde(default, deserialize_with = "lenient")]
        position: Option<PositionUpdate>,
        #[serde(default, deserialize_with = "lenient")]
        keys: Option<KeySet>,
        #[serde(default, deserialize_with = "lenient")]
        inventory: Option<Vec<Value>>,
    },
    /// Say something to everyone.
    Chat {
        #[serde(default, deserialize_with = "lenient")]
        message: Option<String>,
    },
    /// Attack another entity by id.
    Attack {
        #[serde(rename = "targetId")]
        target_id: String,
    },
    /// Privileged operation; silently dropped for ordinary players.
    DevCommand {
        #[serde(flatten)]
        command: AdminCommand,
    },
    /// Ask the server to close this connection.
    LeaveGame,
}

/// The world-visible slice of an entity, shipped in every snapshot.
/// Connection internals and combat timers never appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicView {
    pub id: PlayerId,
    pub display_name: String,
    pub faction: String,
    pub position: Position,
    pub health: u32,
    pub inventory: Vec<Value>,
    pub is_privileged: bool,
}

/// Every message the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// First frame on every connection: the id this client will appear
    /// under once authenticated and visible in snapshots.
    Init { id: PlayerId },
    /// Reply to a signup attempt.
    Signup {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<PlayerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Reply to a login attempt.
    Login {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<PlayerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Chat event fanned out to every authenticated connection. Operator
    /// announcements arrive with `isBroadcast` set.
    Chat {
        name: String,
        message: String,
        #[serde(rename = "isBroadcast")]
        is_broadcast: bool,
    },
    /// Private verdict on an attack, delivered to the attacker only.
    AttackResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Terminal notice sent just before an operator-forced disconnect.
    Kicked {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Periodic world snapshot: every entity's public view keyed by id.
    Update {
        players: HashMap<PlayerId, PublicView>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn decode(raw: &str) -> serde_json::Result<ClientMessage> {
        serde_json::from_str(raw)
    }

    #[test]
    fn decodes_signup_and_login() {
        let msg = decode(r#"{"type":"signup","username":"ada","password":"pw"}"#).unwrap();
        match msg {
            ClientMessage::Signup { username, password } => {
                assert_eq!(username, "ada");
                assert_eq!(password, "pw");
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let msg = decode(r#"{"type":"login","username":"ada","password":"pw"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Login { .. }));
    }

    #[test]
    fn signup_without_credentials_is_rejected() {
        assert!(decode(r#"{"type":"signup","username":"ada"}"#).is_err());
        assert!(decode(r#"{"type":"signup","username":7,"password":"pw"}"#).is_err());
    }

    #[test]
    fn join_accepts_register_alias() {
        let msg = decode(r#"{"type":"register","name":"Ada","faction":"blue"}"#).unwrap();
        match msg {
            ClientMessage::Join { name, faction, .. } => {
                assert_eq!(name.as_deref(), Some("Ada"));
                assert_eq!(faction.as_deref(), Some("blue"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn move_accepts_movement_state_alias() {
        let msg = decode(r#"{"type":"movementState","keys":{"up":true}}"#).unwrap();
        match msg {
            ClientMessage::Move { keys, .. } => {
                let keys = keys.expect("key state");
                assert!(keys.up);
                assert!(!keys.down);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn malformed_fields_are_dropped_individually() {
        let msg = decode(
            r#"{"type":"move","position":{"x":"junk","y":42.5,"rotY":1.5},"keys":{"up":"yes","left":true}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Move { position, keys, .. } => {
                let position = position.expect("position update");
                assert_eq!(position.x, None);
                assert_eq!(position.y, Some(42.5));
                assert_eq!(position.rot_y, Some(1.5));
                let keys = keys.expect("key state");
                assert!(!keys.up);
                assert!(keys.left);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn wholly_malformed_subobjects_become_none() {
        let msg = decode(r#"{"type":"move","position":"nowhere","keys":3}"#).unwrap();
        match msg {
            ClientMessage::Move { position, keys, .. } => {
                assert!(position.is_none());
                assert!(keys.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        assert!(decode(r#"{"type":"fly","altitude":10}"#).is_err());
        assert!(decode(r#"{"altitude":10}"#).is_err());
        assert!(decode("not json").is_err());
    }

    #[test]
    fn extra_fields_are_ignored() {
        let msg = decode(r#"{"type":"leaveGame","because":"bored","count":3}"#).unwrap();
        assert!(matches!(msg, ClientMessage::LeaveGame));
    }

    #[test]
    fn chat_message_field_is_optional() {
        let msg = decode(r#"{"type":"chat"}"#).unwrap();
        match msg {
            ClientMessage::Chat { message } => assert!(message.is_none()),
            other => panic!("unexpected message: {:?}", other),
        }

        let msg = decode(r#"{"type":"chat","message":17}"#).unwrap();
        match msg {
            ClientMessage::Chat { message } => assert!(message.is_none()),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn attack_requires_target_id() {
        assert!(decode(r#"{"type":"attack"}"#).is_err());
        let msg = decode(r#"{"type":"attack","targetId":"abc123"}"#).unwrap();
        match msg {
            ClientMessage::Attack { target_id } => assert_eq!(target_id, "abc123"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn dev_command_variants_decode() {
        let msg = decode(r#"{"type":"devCommand","command":"broadcast","message":"maintenance"}"#)
            .unwrap();
        match msg {
            ClientMessage::DevCommand {
                command: AdminCommand::Broadcast { message },
            } => assert_eq!(message.as_deref(), Some("maintenance")),
            other => panic!("unexpected message: {:?}", other),
        }

        let msg = decode(r#"{"type":"devCommand","command":"kick","targetId":"p1"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::DevCommand {
                command: AdminCommand::Kick { .. }
            }
        ));

        let msg =
            decode(r#"{"type":"devCommand","command":"teleport","targetId":"p1","x":1.0,"y":2.0}"#)
                .unwrap();
        match msg {
            ClientMessage::DevCommand {
                command: AdminCommand::Teleport { target_id, x, y, z },
            } => {
                assert_eq!(target_id, "p1");
                assert_eq!(x, 1.0);
                assert_eq!(y, 2.0);
                assert_eq!(z, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn dev_command_missing_pieces_fails_whole_message() {
        assert!(
            decode(r#"{"type":"devCommand","command":"teleport","targetId":"p1","x":1.0}"#)
                .is_err()
        );
        assert!(decode(r#"{"type":"devCommand","command":"reboot"}"#).is_err());
        assert!(decode(r#"{"type":"devCommand"}"#).is_err());
    }

    #[test]
    fn server_messages_render_expected_shapes() {
        let init = serde_json::to_value(&ServerMessage::Init {
            id: PlayerId::from("abc"),
        })
        .unwrap();
        assert_eq!(init["type"], "init");
        assert_eq!(init["id"], "abc");

        let chat = serde_json::to_value(&ServerMessage::Chat {
            name: "Ada".to_string(),
            message: "hi".to_string(),
            is_broadcast: true,
        })
        .unwrap();
        assert_eq!(chat["type"], "chat");
        assert_eq!(chat["isBroadcast"], true);

        let reply = serde_json::to_value(&ServerMessage::AttackResult {
            success: true,
            reason: None,
        })
        .unwrap();
        assert_eq!(reply["type"], "attackResult");
        assert!(reply.get("reason").is_none());

        let reply = serde_json::to_value(&ServerMessage::AttackResult {
            success: false,
            reason: Some("cooldown".to_string()),
        })
        .unwrap();
        assert_eq!(reply["reason"], "cooldown");
    }

    #[test]
    fn snapshot_serializes_views_under_string_ids() {
        let view = PublicView {
            id: PlayerId::from("p7"),
            display_name: "Ada".to_string(),
            faction: "blue".to_string(),
            position: Position {
                x: 1.0,
                y: 2.0,
                z: 3.0,
                rot_y: 0.5,
            },
            health: 90,
            inventory: vec![serde_json::json!({"name":"Basic","icon":"⚪"})],
            is_privileged: false,
        };
        let mut players = HashMap::new();
        players.insert(view.id.clone(), view);

        let update = serde_json::to_value(&ServerMessage::Update { players }).unwrap();
        assert_eq!(update["type"], "update");
        let entry = &update["players"]["p7"];
        assert_eq!(entry["displayName"], "Ada");
        assert_eq!(entry["isPrivileged"], false);
        assert_eq!(entry["position"]["rotY"], 0.5);
        assert_eq!(entry["health"], 90);
    }

    #[test]
    fn auth_reply_roundtrips() {
        let reply = ServerMessage::Signup {
            success: false,
            id: None,
            username: None,
            error: Some("username already taken".to_string()),
        };
        let text = serde_json::to_string(&reply).unwrap();
        assert!(!text.contains("\"id\""));
        let back: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, reply);
    }

    #[test]
    fn distance_matches_euclidean_geometry() {
        let origin = Position::default();
        let p = Position {
            x: 3.0,
            y: 4.0,
            z: 0.0,
            rot_y: 9.0,
        };
        assert_approx_eq!(distance(&origin, &p), 5.0, 1e-6);
        assert_approx_eq!(distance(&p, &p), 0.0, 1e-6);

        let q = Position {
            x: 1.0,
            y: 2.0,
            z: 2.0,
            rot_y: 0.0,
        };
        assert_approx_eq!(distance(&origin, &q), 3.0, 1e-6);
    }

    #[test]
    fn truncate_respects_character_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("", 5), "");
        let long: String = "⚪".repeat(300);
        assert_eq!(truncate_chars(&long, 200).chars().count(), 200);
    }
}
