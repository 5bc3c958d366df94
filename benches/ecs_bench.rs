//! Core ECS benchmarks
//!
//! Run with: cargo bench --bench ecs_bench

use std::time::Duration;

use archetype_runtime::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone)]
struct Health(u32);

fn populated(count: usize) -> World {
    let mut world = World::new();
    for i in 0..count {
        let _ = world.spawn((
            Position {
                x: i as f32,
                y: 0.0,
                z: 0.0,
            },
            Velocity {
                x: 1.0,
                y: 0.0,
                z: 0.0,
            },
        ));
    }
    world
}

fn bench_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_1k_single_component", |b| {
        b.iter(|| {
            let mut world = World::new();
            for i in 0..1_000 {
                let _ = world.spawn((Position {
                    x: i as f32,
                    y: 0.0,
                    z: 0.0,
                },));
            }
        });
    });

    group.bench_function("spawn_1k_two_components", |b| {
        b.iter(|| black_box(populated(1_000)));
    });

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for count in [1_000usize, 10_000] {
        let mut world = populated(count);
        let handle = world.query::<(&mut Position, &Velocity)>();

        group.bench_with_input(BenchmarkId::new("integrate", count), &count, |b, _| {
            b.iter(|| {
                for (_, (pos, vel)) in world.iter(&handle) {
                    pos.x += vel.x;
                    pos.y += vel.y;
                    pos.z += vel.z;
                }
            });
        });
    }

    #[cfg(feature = "parallel")]
    {
        let world = populated(10_000);
        let handle = world.query::<(&Position, &Velocity)>();
        group.bench_function("par_for_each_10k", |b| {
            b.iter(|| {
                world.par_for_each(&handle, |_, (pos, vel)| {
                    black_box(pos.x + vel.x);
                });
            });
        });
    }

    group.finish();
}

fn bench_structural(c: &mut Criterion) {
    c.bench_function("add_remove_component_1k", |b| {
        let mut world = populated(1_000);
        let ids = world.entities();
        b.iter(|| {
            for &e in &ids {
                let _ = world.add_component(e, Health(1));
            }
            for &e in &ids {
                black_box(world.remove_component::<Health>(e));
            }
        });
    });
}

fn bench_scheduler(c: &mut Criterion) {
    c.bench_function("tick_movement_10k", |b| {
        let mut world = populated(10_000);
        let mut scheduler = Scheduler::new();
        let handle = world.query::<(&mut Position, &Velocity)>();
        let _ = scheduler.register(
            &mut world,
            FunctionSystem::new(
                "movement",
                move |world: &mut World, _: &mut CommandBuffer, dt: Duration| {
                    let dt = dt.as_secs_f32();
                    for (_, (pos, vel)) in world.iter(&handle) {
                        pos.x += vel.x * dt;
                    }
                    Ok(())
                },
            ),
            0,
        );
        b.iter(|| scheduler.tick(&mut world, Duration::from_millis(16)));
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let mut serializer = Serializer::new();
    let _ = serializer.register::<Position>("position");
    let _ = serializer.register::<Velocity>("velocity");
    let world = populated(1_000);

    c.bench_function("serialize_world_1k", |b| {
        b.iter(|| black_box(serializer.serialize_world(&world)));
    });

    let snapshot = match serializer.serialize_world(&world) {
        Ok(snapshot) => snapshot,
        Err(e) => panic!("snapshot failed: {e}"),
    };
    c.bench_function("deserialize_world_1k", |b| {
        let mut target = World::new();
        b.iter(|| black_box(serializer.deserialize_world(snapshot.clone(), &mut target)));
    });
}

criterion_group!(
    benches,
    bench_spawn,
    bench_query,
    bench_structural,
    bench_scheduler,
    bench_snapshot
);
criterion_main!(benches);
