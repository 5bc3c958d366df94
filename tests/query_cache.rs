use archetype_runtime::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Dead;

#[test]
fn test_query_cache_basic() {
    let mut world = World::new();
    for i in 0..100 {
        world
            .spawn((
                Position {
                    x: i as f32,
                    y: 0.0,
                },
                Velocity { x: 1.0, y: 1.0 },
            ))
            .unwrap();
    }

    let handle = world.query::<(&Position, &Velocity)>();
    assert_eq!(world.iter(&handle).count(), 100);
    assert_eq!(world.iter(&handle).count(), 100);

    let stats = world.query_cache_stats();
    assert!(stats.num_cached_queries >= 1);
    assert!(stats.hits >= 1);
}

#[test]
fn test_query_sees_structural_changes() {
    let mut world = World::new();
    let handle = world.query::<&Position>();

    let a = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
    assert_eq!(world.count(&handle), 1);

    // A new archetype created after the first iteration still matches
    let b = world
        .spawn((Position { x: 1.0, y: 0.0 }, Velocity { x: 0.0, y: 0.0 }))
        .unwrap();
    assert_eq!(world.count(&handle), 2);

    world.destroy_entity(a);
    let ids: Vec<EntityId> = world.iter(&handle).map(|(id, _)| id).collect();
    assert_eq!(ids, vec![b]);
}

#[test]
fn test_filters() {
    let mut world = World::new();
    let alive = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
    let dead = world.spawn((Position { x: 1.0, y: 0.0 }, Dead)).unwrap();

    let living = world.query::<(&Position, Without<Dead>)>();
    let ids: Vec<EntityId> = world.iter(&living).map(|(id, _)| id).collect();
    assert_eq!(ids, vec![alive]);

    let corpses = world.query::<(&Position, With<Dead>)>();
    assert_eq!(world.query_entities(&corpses), &[dead]);
}

#[test]
fn test_mutation_through_query() {
    let mut world = World::new();
    let e = world
        .spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 2.0, y: -1.0 }))
        .unwrap();

    let movement = world.query::<(&mut Position, &Velocity)>();
    for (_, (pos, vel)) in world.iter(&movement) {
        pos.x += vel.x;
        pos.y += vel.y;
    }

    assert_eq!(
        world.get_component::<Position>(e),
        Some(&Position { x: 2.0, y: -1.0 })
    );
}

#[test]
fn test_shared_iteration() {
    let mut world = World::new();
    for i in 0..5 {
        world
            .spawn((Position {
                x: i as f32,
                y: 0.0,
            },))
            .unwrap();
    }
    let handle = world.query::<&Position>();
    let total: f32 = world.iter_shared(&handle).map(|(_, p)| p.x).sum();
    assert_eq!(total, 10.0);
}

#[cfg(feature = "parallel")]
#[test]
fn test_par_for_each() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let mut world = World::new();
    for i in 0..1_000 {
        world
            .spawn((Position {
                x: i as f32,
                y: 0.0,
            },))
            .unwrap();
    }
    let handle = world.query::<&Position>();
    let seen = AtomicUsize::new(0);
    world.par_for_each(&handle, |_, _| {
        seen.fetch_add(1, Ordering::Relaxed);
    });
    assert_eq!(seen.load(Ordering::Relaxed), 1_000);
}

#[test]
fn test_iterate_callback() {
    let mut world = World::new();
    let e = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
    let handle = world.query::<&mut Position>();
    world.iterate(&handle, |_, pos| pos.x += 1.0);
    world.iterate(&handle, |_, pos| pos.x += 1.0);
    assert_eq!(world.get_component::<Position>(e).unwrap().x, 2.0);
}
