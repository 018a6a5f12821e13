#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use t51core::ring;

fn push_pop(c: &mut Criterion) {
    c.bench_function("ring push/pop 1k", |b| {
        let (p, cons) = ring::ring::<u64>(1024);
        b.iter(|| {
            for i in 0..1000u64 {
                let _ = p.push(black_box(i));
            }
            while cons.pop().is_some() {}
        });
    });
}

criterion_group!(benches, push_pop);
criterion_main!(benches);
