//! Attack resolution: cooldown gate, range gate, damage, respawn.
//!
//! Resolution takes the clock instant as an argument so the rules can be
//! tested without waiting out real cooldowns. A rejected attack mutates
//! nothing; a landed attack applies damage, stamps the attacker's cooldown,
//! and handles any respawn in the same step, so no snapshot can observe a
//! defeated entity at zero health.

use crate::config::ServerConfig;
use crate::registry::{random_spawn, EntityRegistry};
use log::{debug, info};
use shared::{distance, PlayerId};
use std::time::Instant;

/// Why a well-formed attack was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The attacker's previous attack was too recent.
    Cooldown,
    /// The target is farther away than the attack range.
    Range,
}

impl RejectReason {
    /// Wire spelling used in the attacker's private reply.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Cooldown => "cooldown",
            RejectReason::Range => "range",
        }
    }
}

/// Outcome of one attack attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    /// Attacker or target is no longer in the world. No reply is owed.
    Missing,
    /// Validation failed; the world is untouched.
    Rejected(RejectReason),
    /// Damage applied.
    Hit {
        target: PlayerId,
        health_after: u32,
        respawned: bool,
    },
}

/// Resolves one attack from `attacker_id` against `target_id` at instant
/// `now`.
pub fn resolve_attack(
    registry: &mut EntityRegistry,
    attacker_id: &PlayerId,
    target_id: &PlayerId,
    now: Instant,
    config: &ServerConfig,
) -> AttackOutcome {
    let (attacker_pos, last_attack) = match registry.get(attacker_id) {
        Some(attacker) => (attacker.position, attacker.last_attack),
        None => return AttackOutcome::Missing,
    };
    let target_pos = match registry.get(target_id) {
        Some(target) => target.position,
        None => {
            debug!("{} attacked missing entity {}", attacker_id, target_id);
            return AttackOutcome::Missing;
        }
    };

    if let Some(last) = last_attack {
        if now.duration_since(last) < config.attack_cooldown {
            return AttackOutcome::Rejected(RejectReason::Cooldown);
        }
    }
    if distance(&attacker_pos, &target_pos) > config.attack_range {
        return AttackOutcome::Rejected(RejectReason::Range);
    }

    let Some(target) = registry.get_mut(target_id) else {
        return AttackOutcome::Missing;
    };
    target.health = target.health.saturating_sub(config.attack_damage);
    let respawned = target.health == 0;
    if respawned {
        target.position = random_spawn(&config.bounds);
        target.health = config.max_health;
        info!("{} defeated {}, respawning", attacker_id, target_id);
    }
    let health_after = target.health;

    if let Some(attacker) = registry.get_mut(attacker_id) {
        attacker.last_attack = Some(now);
    }
    debug!(
        "{} hit {} for {} (health now {})",
        attacker_id, target_id, config.attack_damage, health_after
    );

    AttackOutcome::Hit {
        target: target_id.clone(),
        health_after,
        respawned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Entity;
    use shared::Position;
    use std::time::Duration;

    fn config() -> ServerConfig {
        ServerConfig::default()
    }

    fn world_with(entries: &[(&str, Position)]) -> EntityRegistry {
        let mut registry = EntityRegistry::new();
        for (id, position) in entries {
            registry.insert(Entity::new(PlayerId::from(*id), false, *position, 100));
        }
        registry
    }

    fn at(x: f32) -> Position {
        Position {
            x,
            y: 0.0,
            z: 0.0,
            rot_y: 0.0,
        }
    }

    #[test]
    fn first_attack_needs_no_cooldown() {
        let config = config();
        let mut registry = world_with(&[("a", at(0.0)), ("b", at(3.0))]);
        let now = Instant::now();

        let outcome = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("b"),
            now,
            &config,
        );
        assert_eq!(
            outcome,
            AttackOutcome::Hit {
                target: PlayerId::from("b"),
                health_after: 90,
                respawned: false,
            }
        );
        assert_eq!(registry.get(&PlayerId::from("b")).unwrap().health, 90);
        assert_eq!(
            registry.get(&PlayerId::from("a")).unwrap().last_attack,
            Some(now)
        );
    }

    #[test]
    fn cooldown_rejects_until_elapsed() {
        let config = config();
        let mut registry = world_with(&[("a", at(0.0)), ("b", at(3.0))]);
        let start = Instant::now();

        let first = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("b"),
            start,
            &config,
        );
        assert!(matches!(first, AttackOutcome::Hit { .. }));

        // 100ms later: inside the window.
        let retry = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("b"),
            start + Duration::from_millis(100),
            &config,
        );
        assert_eq!(retry, AttackOutcome::Rejected(RejectReason::Cooldown));
        // Rejection left the previous stamp in place.
        assert_eq!(
            registry.get(&PlayerId::from("a")).unwrap().last_attack,
            Some(start)
        );
        assert_eq!(registry.get(&PlayerId::from("b")).unwrap().health, 90);

        // Exactly at the boundary: allowed again.
        let after = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("b"),
            start + config.attack_cooldown,
            &config,
        );
        assert!(matches!(after, AttackOutcome::Hit { .. }));
        assert_eq!(registry.get(&PlayerId::from("b")).unwrap().health, 80);
    }

    #[test]
    fn range_boundary_is_inclusive() {
        let config = config();
        let mut registry = world_with(&[("a", at(0.0)), ("b", at(4.0)), ("c", at(4.001))]);
        let now = Instant::now();

        let in_range = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("b"),
            now,
            &config,
        );
        assert!(matches!(in_range, AttackOutcome::Hit { .. }));

        let mut registry = world_with(&[("a", at(0.0)), ("c", at(4.001))]);
        let out_of_range = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("c"),
            now,
            &config,
        );
        assert_eq!(out_of_range, AttackOutcome::Rejected(RejectReason::Range));
        // A range rejection does not start a cooldown.
        assert!(registry.get(&PlayerId::from("a")).unwrap().last_attack.is_none());
        assert_eq!(registry.get(&PlayerId::from("c")).unwrap().health, 100);
    }

    #[test]
    fn lethal_damage_respawns_atomically() {
        let config = config();
        let mut registry = world_with(&[("a", at(0.0)), ("b", at(1.0))]);
        registry.get_mut(&PlayerId::from("b")).unwrap().health = 10;

        let outcome = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("b"),
            Instant::now(),
            &config,
        );
        match outcome {
            AttackOutcome::Hit {
                health_after,
                respawned,
                ..
            } => {
                assert!(respawned);
                assert_eq!(health_after, config.max_health);
            }
            other => panic!("expected hit, got {:?}", other),
        }
        let revived = registry.get(&PlayerId::from("b")).unwrap();
        assert_eq!(revived.health, config.max_health);
        assert!(config.bounds.contains(&revived.position));
    }

    #[test]
    fn damage_below_zero_saturates_into_respawn() {
        let config = config();
        let mut registry = world_with(&[("a", at(0.0)), ("b", at(1.0))]);
        registry.get_mut(&PlayerId::from("b")).unwrap().health = 3;

        let outcome = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("b"),
            Instant::now(),
            &config,
        );
        assert!(matches!(
            outcome,
            AttackOutcome::Hit {
                respawned: true,
                ..
            }
        ));
    }

    #[test]
    fn missing_target_is_a_silent_no_op() {
        let config = config();
        let mut registry = world_with(&[("a", at(0.0))]);

        let outcome = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("ghost"),
            Instant::now(),
            &config,
        );
        assert_eq!(outcome, AttackOutcome::Missing);
        assert!(registry.get(&PlayerId::from("a")).unwrap().last_attack.is_none());
    }

    #[test]
    fn self_attack_follows_the_same_rules() {
        let config = config();
        let mut registry = world_with(&[("a", at(0.0))]);
        let now = Instant::now();

        let outcome = resolve_attack(
            &mut registry,
            &PlayerId::from("a"),
            &PlayerId::from("a"),
            now,
            &config,
        );
        assert_eq!(
            outcome,
            AttackOutcome::Hit {
                target: PlayerId::from("a"),
                health_after: 90,
                respawned: false,
            }
        );
        let attacker = registry.get(&PlayerId::from("a")).unwrap();
        assert_eq!(attacker.health, 90);
        assert_eq!(attacker.last_attack, Some(now));
    }

    #[test]
    fn reject_reasons_spell_as_wire_words() {
        assert_eq!(RejectReason::Cooldown.as_str(), "cooldown");
        assert_eq!(RejectReason::Range.as_str(), "range");
    }
}
