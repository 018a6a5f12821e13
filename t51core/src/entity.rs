//! Fixed-capacity dense entity manager. In-use slots are a contiguous subset under
//! iteration; freeing a slot zeroes it and returns it to the free list for reuse.

use crate::physics::{self, Aabb, BodyId, PairContact, PhysicsBody, Sap, SapHandle, Vec2};
use std::fmt;

pub type EntityId = usize;

/// Capability tag dispatched by `match` rather than a per-instance function-pointer table:
/// every entity kind that needs per-tick logic beyond physics integration gets a branch in
/// `EntityManager::think_one`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Projectile,
    StaticBody,
}

impl EntityKind {
    /// Whether rendering (out of scope) would draw this entity. Recorded here rather than
    /// threaded through a renderer interface this crate doesn't have.
    pub fn drawable(self) -> bool {
        !matches!(self, EntityKind::StaticBody)
    }
}

#[derive(Debug)]
pub enum EntityError {
    Full,
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::Full => write!(f, "entity manager at capacity"),
        }
    }
}

impl std::error::Error for EntityError {}

struct Entity {
    kind: EntityKind,
    position: Vec2,
    velocity: Vec2,
    force: Vec2,
    inv_mass: f32,
    local_aabb: Aabb,
    layer: u32,
    /// Remaining ticks to live, for `Projectile` entities only.
    ttl: Option<u32>,
    sap_handle: Option<SapHandle>,
    in_use: bool,
}

impl Entity {
    fn world_aabb(&self) -> Aabb {
        self.local_aabb.to_world(self.position)
    }
}

/// Owns every entity's storage and the broad-phase structure their world AABBs are registered
/// in. External code only ever holds an `EntityId`; it never outlives the manager.
pub struct EntityManager {
    entities: Vec<Entity>,
    free_list: Vec<EntityId>,
    capacity: usize,
    sap: Sap,
}

impl EntityManager {
    pub fn new(capacity: usize) -> EntityManager {
        EntityManager {
            entities: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            capacity,
            sap: Sap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn create(
        &mut self,
        kind: EntityKind,
        position: Vec2,
        local_aabb: Aabb,
        inv_mass: f32,
        layer: u32,
    ) -> Result<EntityId, EntityError> {
        let id = if let Some(id) = self.free_list.pop() {
            id
        } else {
            if self.entities.len() >= self.capacity {
                return Err(EntityError::Full);
            }
            self.entities.push(Entity {
                kind,
                position: Vec2::ZERO,
                velocity: Vec2::ZERO,
                force: Vec2::ZERO,
                inv_mass: 0.0,
                local_aabb,
                layer: 0,
                ttl: None,
                sap_handle: None,
                in_use: false,
            });
            self.entities.len() - 1
        };

        let world_aabb = local_aabb.to_world(position);
        let handle = self.sap.insert(id as BodyId, world_aabb, layer);

        let entity = &mut self.entities[id];
        entity.kind = kind;
        entity.position = position;
        entity.velocity = Vec2::ZERO;
        entity.force = Vec2::ZERO;
        entity.inv_mass = inv_mass;
        entity.local_aabb = local_aabb;
        entity.layer = layer;
        entity.ttl = if kind == EntityKind::Projectile {
            Some(180)
        } else {
            None
        };
        entity.sap_handle = Some(handle);
        entity.in_use = true;

        Ok(id)
    }

    /// Zeroes the slot and returns it to the free list.
    pub fn free(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(id) {
            if !entity.in_use {
                return;
            }
            if let Some(handle) = entity.sap_handle.take() {
                self.sap.remove(handle, id as BodyId);
            }
            *entity = Entity {
                kind: EntityKind::StaticBody,
                position: Vec2::ZERO,
                velocity: Vec2::ZERO,
                force: Vec2::ZERO,
                inv_mass: 0.0,
                local_aabb: Aabb::new(Vec2::ZERO, Vec2::ZERO),
                layer: 0,
                ttl: None,
                sap_handle: None,
                in_use: false,
            };
            self.free_list.push(id);
        }
    }

    pub fn position(&self, id: EntityId) -> Option<Vec2> {
        self.entities.get(id).filter(|e| e.in_use).map(|e| e.position)
    }

    pub fn set_position(&mut self, id: EntityId, position: Vec2) {
        if let Some(entity) = self.entities.get_mut(id) {
            if entity.in_use {
                entity.position = position;
            }
        }
    }

    pub fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.entities.get(id).filter(|e| e.in_use).map(|e| e.kind)
    }

    pub fn add_force(&mut self, id: EntityId, force: Vec2) {
        if let Some(entity) = self.entities.get_mut(id) {
            if entity.in_use {
                entity.force = entity.force.add(force);
            }
        }
    }

    fn think_one(entity: &mut Entity, id: EntityId, expired: &mut Vec<EntityId>) {
        match entity.kind {
            EntityKind::Player | EntityKind::StaticBody => {}
            EntityKind::Projectile => {
                if let Some(ttl) = entity.ttl.as_mut() {
                    *ttl = ttl.saturating_sub(1);
                    if *ttl == 0 {
                        expired.push(id);
                    }
                }
            }
        }
    }

    /// One physics tick: think, integrate, refresh broad-phase, narrow-phase, resolve.
    /// Returns entities (`Projectile`s whose TTL elapsed) the caller should `free`.
    pub fn physics_step(&mut self, dt: f32, config: &crate::config::PhysicsConfig) -> Vec<EntityId> {
        let mut expired = Vec::new();

        for (id, entity) in self.entities.iter_mut().enumerate() {
            if !entity.in_use {
                continue;
            }
            Self::think_one(entity, id, &mut expired);

            entity.velocity = entity.velocity.add(entity.force.scale(entity.inv_mass).scale(dt));
            entity.position = entity.position.add(entity.velocity.scale(dt));
            entity.force = Vec2::ZERO;

            if let Some(handle) = entity.sap_handle {
                self.sap.update(handle, entity.world_aabb());
            }
        }

        let candidate_pairs = self.sap.sweep();
        let mut contacts = Vec::new();
        for (a, b) in candidate_pairs {
            let world_a = self.entities[a].world_aabb();
            let world_b = self.entities[b].world_aabb();
            if let Some(contact) = physics::collide(world_a, world_b) {
                contacts.push(PairContact { a, b, contact });
            }
        }

        if !contacts.is_empty() {
            let mut bodies: Vec<PhysicsBody> = self
                .entities
                .iter()
                .map(|e| PhysicsBody {
                    position: e.position,
                    velocity: e.velocity,
                    inv_mass: e.inv_mass,
                })
                .collect();

            physics::resolve(
                &mut bodies,
                &contacts,
                config.solver_iterations,
                config.friction,
                config.restitution,
                config.positional_correction_slop,
                config.positional_correction_percent,
            );

            for (id, entity) in self.entities.iter_mut().enumerate() {
                if entity.in_use {
                    entity.position = bodies[id].position;
                    entity.velocity = bodies[id].velocity;
                    if let Some(handle) = entity.sap_handle {
                        self.sap.update(handle, entity.world_aabb());
                    }
                }
            }
        }

        for id in &expired {
            self.free(*id);
        }

        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;

    fn unit_aabb() -> Aabb {
        Aabb::new(Vec2::new(-0.5, -0.5), Vec2::new(0.5, 0.5))
    }

    #[test]
    fn create_and_free_reuses_slots() {
        let mut mgr = EntityManager::new(2);
        let a = mgr.create(EntityKind::Player, Vec2::ZERO, unit_aabb(), 1.0, 1).unwrap();
        assert_eq!(mgr.len(), 1);
        mgr.free(a);
        assert_eq!(mgr.len(), 0);

        let b = mgr.create(EntityKind::Player, Vec2::ZERO, unit_aabb(), 1.0, 1).unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn create_beyond_capacity_fails() {
        let mut mgr = EntityManager::new(1);
        mgr.create(EntityKind::Player, Vec2::ZERO, unit_aabb(), 1.0, 1).unwrap();
        assert!(matches!(
            mgr.create(EntityKind::Player, Vec2::ZERO, unit_aabb(), 1.0, 1),
            Err(EntityError::Full)
        ));
    }

    #[test]
    fn colliding_dynamic_bodies_separate_after_a_step() {
        let mut mgr = EntityManager::new(4);
        let a = mgr
            .create(EntityKind::Player, Vec2::new(-0.4, 0.0), unit_aabb(), 1.0, 1)
            .unwrap();
        let b = mgr
            .create(EntityKind::Player, Vec2::new(0.4, 0.0), unit_aabb(), 1.0, 1)
            .unwrap();

        mgr.add_force(a, Vec2::new(-50.0, 0.0));
        mgr.add_force(b, Vec2::new(50.0, 0.0));

        let config = PhysicsConfig::default();
        for _ in 0..5 {
            mgr.physics_step(1.0 / 30.0, &config);
        }

        let pos_a = mgr.position(a).unwrap();
        let pos_b = mgr.position(b).unwrap();
        assert!(pos_a.x < pos_b.x);
    }

    #[test]
    fn projectile_is_freed_after_its_ttl_expires() {
        let mut mgr = EntityManager::new(2);
        let id = mgr
            .create(EntityKind::Projectile, Vec2::ZERO, unit_aabb(), 1.0, 1)
            .unwrap();

        let config = PhysicsConfig::default();
        let mut freed = false;
        for _ in 0..200 {
            let expired = mgr.physics_step(1.0 / 30.0, &config);
            if expired.contains(&id) {
                freed = true;
                break;
            }
        }
        assert!(freed);
        assert_eq!(mgr.len(), 0);
    }
}
