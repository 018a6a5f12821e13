#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use rand::prelude::*;
use t51core::config::PhysicsConfig;
use t51core::entity::{EntityKind, EntityManager};
use t51core::physics::{Aabb, Vec2};

fn physics_step_many_bodies(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let config = PhysicsConfig::default();

    c.bench_function("physics_step 256 bodies", |b| {
        let mut mgr = EntityManager::new(256);
        let local_aabb = Aabb::new(Vec2::new(-0.5, -0.5), Vec2::new(0.5, 0.5));
        for _ in 0..256 {
            let x: f32 = rng.gen_range(-100.0..100.0);
            let y: f32 = rng.gen_range(-100.0..100.0);
            mgr.create(EntityKind::Player, Vec2::new(x, y), local_aabb, 1.0, 1)
                .unwrap();
        }

        b.iter(|| {
            black_box(mgr.physics_step(1.0 / 30.0, &config));
        });
    });
}

criterion_group!(benches, physics_step_many_bodies);
criterion_main!(benches);
