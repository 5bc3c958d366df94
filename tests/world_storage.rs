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

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frozen;

#[test]
fn test_add_component_moves_entity_between_archetypes() {
    let mut world = World::new();
    let e = world.spawn((Position { x: 1.0, y: 2.0 },)).unwrap();
    let before = world.archetype_of(e).unwrap();

    let positions = world.query::<&Position>();
    assert_eq!(world.query_entities(&positions), &[e]);

    world.add_component(e, Velocity { x: 3.0, y: 4.0 }).unwrap();
    let after = world.archetype_of(e).unwrap();
    assert_ne!(before, after);

    // Old archetype is left without the entity, data moved intact
    assert!(world.archetype(before).unwrap().is_empty());
    assert_eq!(
        world.get_component::<Position>(e),
        Some(&Position { x: 1.0, y: 2.0 })
    );
    assert_eq!(
        world.get_component::<Velocity>(e),
        Some(&Velocity { x: 3.0, y: 4.0 })
    );

    // The handle taken before the move still finds the entity
    assert_eq!(world.query_entities(&positions), &[e]);
    let seen: Vec<(EntityId, Position)> = world.iter(&positions).map(|(id, p)| (id, *p)).collect();
    assert_eq!(seen, vec![(e, Position { x: 1.0, y: 2.0 })]);
}

#[test]
fn test_add_then_remove_restores_archetype() {
    let mut world = World::new();
    let e = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
    let original = world.archetype_of(e).unwrap();

    world.add_component(e, Frozen).unwrap();
    assert_eq!(world.remove_component::<Frozen>(e), Some(Frozen));
    assert_eq!(world.archetype_of(e), Some(original));
    assert!(!world.has_component::<Frozen>(e));

    // Removing again is a no-op
    assert_eq!(world.remove_component::<Frozen>(e), None);
}

#[test]
fn test_swap_remove_keeps_locations_valid() {
    let mut world = World::new();
    let entities: Vec<EntityId> = (0..10)
        .map(|i| {
            world
                .spawn((Position {
                    x: i as f32,
                    y: 0.0,
                },))
                .unwrap()
        })
        .collect();

    world.destroy_entity(entities[0]);
    world.destroy_entity(entities[4]);

    for (i, &e) in entities.iter().enumerate() {
        if i == 0 || i == 4 {
            assert!(world.get_component::<Position>(e).is_none());
        } else {
            assert_eq!(world.get_component::<Position>(e).unwrap().x, i as f32);
        }
    }
}

#[test]
fn test_destroy_is_idempotent() {
    let mut world = World::new();
    let e = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
    let count = world.entity_count();

    assert!(world.destroy_entity(e));
    assert!(!world.destroy_entity(e));
    assert_eq!(world.entity_count(), count - 1);

    // Ids are never reused
    let next = world.create_entity();
    assert_ne!(next, e);
}

#[test]
fn test_dead_entity_operations() {
    let mut world = World::new();
    let e = world.create_entity();
    world.destroy_entity(e);

    assert!(matches!(
        world.add_component(e, Frozen),
        Err(EcsError::EntityNotFound(_))
    ));
    assert_eq!(world.remove_component::<Frozen>(e), None);
    assert!(world.get_component::<Frozen>(e).is_none());
}

#[test]
fn test_singleton_survives_clear() {
    let mut world = World::new();
    world.set_singleton(42u32).unwrap();
    world.spawn((Frozen,)).unwrap();

    let singleton = world.singleton();
    assert!(!world.destroy_entity(singleton));

    world.clear();
    assert!(world.is_alive(singleton));
    assert_eq!(world.entity_count(), 1);
    assert!(world.singleton_component::<u32>().is_none());
}
