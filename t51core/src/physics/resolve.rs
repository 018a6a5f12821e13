//! Impulse-based contact resolution: velocity-level impulses over `SOLVER_ITERATIONS` passes,
//! followed by one positional-correction pass to fight residual penetration.

use crate::physics::aabb::{Contact, Vec2};
use crate::physics::sap::BodyId;

/// The subset of a body's physical state the resolver needs. `inv_mass == 0.0` marks a static
/// body (infinite mass); it never receives an impulse or a positional correction.
#[derive(Clone, Copy, Debug)]
pub struct PhysicsBody {
    pub position: Vec2,
    pub velocity: Vec2,
    pub inv_mass: f32,
}

/// A broad-phase pair that survived narrow-phase, paired with its contact geometry.
pub struct PairContact {
    pub a: BodyId,
    pub b: BodyId,
    pub contact: Contact,
}

const VELOCITY_SLOP: f32 = -0.001;

/// Runs `iterations` velocity-impulse passes over `contacts`, then one positional-correction
/// pass. `bodies` is indexed by `BodyId`.
pub fn resolve(
    bodies: &mut [PhysicsBody],
    contacts: &[PairContact],
    iterations: u32,
    friction: f32,
    restitution: f32,
    slop: f32,
    percent: f32,
) {
    for _ in 0..iterations {
        for pc in contacts {
            resolve_velocity(bodies, pc, friction, restitution);
        }
    }

    for pc in contacts {
        correct_position(bodies, pc, slop, percent);
    }
}

fn resolve_velocity(bodies: &mut [PhysicsBody], pc: &PairContact, friction: f32, restitution: f32) {
    let inv_mass_sum = bodies[pc.a].inv_mass + bodies[pc.b].inv_mass;
    if inv_mass_sum <= 0.0 {
        return;
    }

    let n = pc.contact.normal;
    let rv = bodies[pc.a].velocity.sub(bodies[pc.b].velocity);
    let vel_along_normal = rv.dot(n);
    if vel_along_normal > VELOCITY_SLOP {
        return;
    }

    let j = -(1.0 + restitution) * vel_along_normal / inv_mass_sum;
    let impulse = n.scale(j);
    apply_impulse(bodies, pc, impulse);

    let rv = bodies[pc.a].velocity.sub(bodies[pc.b].velocity);
    let tangent = rv.sub(n.scale(rv.dot(n))).normalized();
    let jt = (-rv.dot(tangent) / inv_mass_sum).clamp(-friction * j, friction * j);
    let friction_impulse = tangent.scale(jt);
    apply_impulse(bodies, pc, friction_impulse);
}

fn apply_impulse(bodies: &mut [PhysicsBody], pc: &PairContact, impulse: Vec2) {
    bodies[pc.a].velocity = bodies[pc.a].velocity.sub(impulse.scale(bodies[pc.a].inv_mass));
    bodies[pc.b].velocity = bodies[pc.b].velocity.add(impulse.scale(bodies[pc.b].inv_mass));
}

fn correct_position(bodies: &mut [PhysicsBody], pc: &PairContact, slop: f32, percent: f32) {
    let inv_mass_sum = bodies[pc.a].inv_mass + bodies[pc.b].inv_mass;
    if inv_mass_sum <= 0.0 {
        return;
    }

    let magnitude = (pc.contact.penetration - slop).max(0.0) * percent;
    let correction = pc.contact.normal.scale(magnitude);

    bodies[pc.a].position = bodies[pc.a]
        .position
        .sub(correction.scale(bodies[pc.a].inv_mass / inv_mass_sum));
    bodies[pc.b].position = bodies[pc.b]
        .position
        .add(correction.scale(bodies[pc.b].inv_mass / inv_mass_sum));
}
