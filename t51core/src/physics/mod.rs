//! Sweep-and-Prune broad-phase, AABB narrow-phase, and impulse-based contact resolution.
//! These are assembled into a per-tick physics step by `entity::EntityManager::physics_step`.

pub mod aabb;
pub mod resolve;
pub mod sap;

pub use aabb::{collide, Aabb, Contact, Vec2};
pub use resolve::{resolve, PairContact, PhysicsBody};
pub use sap::{BodyId, Sap, SapHandle};
