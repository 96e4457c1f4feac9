//! Runtime tunables for the game server.

use shared::Position;
use std::time::Duration;

/// Axis-aligned box every entity position is kept inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl WorldBounds {
    /// Clamps the spatial axes of `position` into the box. Heading is an
    /// angle and passes through untouched.
    pub fn clamp(&self, position: &mut Position) {
        position.x = position.x.clamp(self.min_x, self.max_x);
        position.y = position.y.clamp(self.min_y, self.max_y);
        position.z = position.z.clamp(self.min_z, self.max_z);
    }

    pub fn contains(&self, position: &Position) -> bool {
        position.x >= self.min_x
            && position.x <= self.max_x
            && position.y >= self.min_y
            && position.y <= self.max_y
            && position.z >= self.min_z
            && position.z <= self.max_z
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            max_x: 800.0,
            min_y: 0.0,
            max_y: 600.0,
            min_z: 0.0,
            max_z: 100.0,
        }
    }
}

/// Everything the server reads at startup. Command-line flags override the
/// fields they cover; the rest keep these defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Snapshot broadcasts per second.
    pub tick_rate: u32,
    /// Connections accepted before new arrivals are refused.
    pub max_clients: usize,
    pub bounds: WorldBounds,
    /// Farthest distance at which an attack can land.
    pub attack_range: f32,
    /// Minimum delay between two successful attacks by one entity.
    pub attack_cooldown: Duration,
    /// Health removed by one landed attack.
    pub attack_damage: u32,
    /// Health every entity spawns and respawns with.
    pub max_health: u32,
    /// Longest chat message relayed, in characters.
    pub chat_max_len: usize,
    /// World units moved per pressed directional key per movement message.
    pub move_step: f32,
}

impl ServerConfig {
    /// Interval between two snapshot broadcasts.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.tick_rate.max(1)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            max_clients: 64,
            bounds: WorldBounds::default(),
            attack_range: 4.0,
            attack_cooldown: Duration::from_millis(1000),
            attack_damage: 10,
            max_health: 100,
            chat_max_len: 200,
            move_step: 5.0,
        }
    }
}
