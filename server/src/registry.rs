//! The authoritative world state: every live entity, keyed by id.
//!
//! The registry is plain owned data. It lives inside the event loop task
//! and is only ever touched from there, so mutations never race and a
//! snapshot is a consistent picture of one instant.

use crate::config::WorldBounds;
use log::info;
use rand::Rng;
use shared::{
    default_inventory, PlayerId, Position, PublicView, DEFAULT_FACTION, DEFAULT_NAME,
};
use std::collections::HashMap;
use std::time::Instant;

/// One live, attackable presence in the world.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: PlayerId,
    pub display_name: String,
    pub faction: String,
    pub position: Position,
    pub health: u32,
    /// Opaque client payload; relayed in snapshots, never interpreted.
    pub inventory: Vec<serde_json::Value>,
    pub is_privileged: bool,
    /// When this entity last landed an attack. `None` until the first one,
    /// which therefore always passes the cooldown check.
    pub last_attack: Option<Instant>,
}

impl Entity {
    /// A freshly spawned entity with protocol defaults and full health.
    pub fn new(id: PlayerId, is_privileged: bool, position: Position, max_health: u32) -> Self {
        Self {
            id,
            display_name: DEFAULT_NAME.to_string(),
            faction: DEFAULT_FACTION.to_string(),
            position,
            health: max_health,
            inventory: default_inventory(),
            is_privileged,
            last_attack: None,
        }
    }

    /// The slice of this entity that snapshots expose.
    pub fn public_view(&self) -> PublicView {
        PublicView {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            faction: self.faction.clone(),
            position: self.position,
            health: self.health,
            inventory: self.inventory.clone(),
            is_privileged: self.is_privileged,
        }
    }
}

/// All live entities. Exactly one entity per authenticated connection.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<PlayerId, Entity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity) {
        info!("entity {} entered the world", entity.id);
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<Entity> {
        let removed = self.entities.remove(id);
        if removed.is_some() {
            info!("entity {} left the world", id);
        }
        removed
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// A consistent public picture of the whole world, ready to serialize.
    pub fn snapshot(&self) -> HashMap<PlayerId, PublicView> {
        self.entities
            .iter()
            .map(|(id, entity)| (id.clone(), entity.public_view()))
            .collect()
    }
}

/// A uniformly random position inside the world box, facing straight ahead.
pub fn random_spawn(bounds: &WorldBounds) -> Position {
    let mut rng = rand::thread_rng();
    Position {
        x: rng.gen_range(bounds.min_x..=bounds.max_x),
        y: rng.gen_range(bounds.min_y..=bounds.max_y),
        z: rng.gen_range(bounds.min_z..=bounds.max_z),
        rot_y: 0.0,
    }
}
