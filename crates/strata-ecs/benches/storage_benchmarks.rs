//! Storage benchmarks.
//!
//! Compares the two iteration modes over the same data, and measures the
//! structural operations that move rows between archetypes.
//!
//! Run with: `cargo bench --bench storage_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use strata_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Position {
    p: [f32; 3],
}

impl Component for Position {
    type Storage = Packed;
}

impl PackedComponent for Position {
    const FIELDS: &'static [FieldDesc] = &[FieldDesc::vector("p", Primitive::F32, 3)];
}

#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Velocity {
    v: [f32; 3],
}

impl Component for Velocity {
    type Storage = Packed;
}

impl PackedComponent for Velocity {
    const FIELDS: &'static [FieldDesc] = &[FieldDesc::vector("v", Primitive::F32, 3)];
}

#[derive(Debug, Clone, PartialEq)]
struct Name(String);

impl Component for Name {
    type Storage = Boxed;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A world with `count` moving entities, every tenth one also named.
fn setup_world(count: usize) -> (World, Vec<EntityId>) {
    let mut world = World::new();
    let entities = (0..count)
        .map(|i| {
            let position = Position {
                p: [i as f32, 0.0, 0.0],
            };
            let velocity = Velocity { v: [1.0, 0.5, 0.0] };
            let created = if i % 10 == 0 {
                world.create_entity((position, velocity, Name(format!("e{i}"))))
            } else {
                world.create_entity((position, velocity))
            };
            created.unwrap()
        })
        .collect();
    (world, entities)
}

// ---------------------------------------------------------------------------
// Benchmark 1: integrate positions, batch vs join
// ---------------------------------------------------------------------------

fn bench_integrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrate");

    for &count in &[1_000usize, 10_000, 100_000] {
        let (mut world, _) = setup_world(count);

        group.bench_with_input(BenchmarkId::new("get_batch_mut", count), &count, |b, _| {
            b.iter(|| {
                for batch in world.get_batch_mut::<(Position, Velocity)>() {
                    let (positions, velocities) = batch.columns;
                    for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                        p.p[0] += v.v[0];
                        p.p[1] += v.v[1];
                        p.p[2] += v.v[2];
                    }
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("join", count), &count, |b, _| {
            b.iter(|| {
                let mut sum = 0.0f32;
                for (_, (p, v)) in world.join::<(Position, Velocity)>() {
                    sum += p.p[0] + v.v[0];
                }
                black_box(sum);
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark 2: structural churn
// ---------------------------------------------------------------------------

fn bench_create_delete(c: &mut Criterion) {
    c.bench_function("create_delete_1k", |b| {
        b.iter(|| {
            let (mut world, entities) = setup_world(1_000);
            for e in entities {
                world.delete_entity(e).unwrap();
            }
            black_box(world.entity_count());
        });
    });
}

fn bench_migrate(c: &mut Criterion) {
    let (mut world, entities) = setup_world(1_000);

    c.bench_function("add_remove_component_1k", |b| {
        b.iter(|| {
            for &e in &entities {
                world.add_component(e, Name(String::new())).unwrap();
            }
            for &e in &entities {
                world.remove_component::<Name>(e).unwrap();
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_integrate, bench_create_delete, bench_migrate);
criterion_main!(benches);
