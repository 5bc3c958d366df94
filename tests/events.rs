use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use archetype_runtime::prelude::*;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
struct DamageDealt {
    target: u32,
    amount: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct Healed(u32);

#[test]
fn test_events_arrive_one_tick_later() {
    let mut world = World::new();
    let inbox: Inbox<DamageDealt> = Inbox::new();
    let _sub = inbox.subscribe(world.events_mut(), 0);

    world.emit(DamageDealt {
        target: 1,
        amount: 5,
    });
    assert!(inbox.is_empty());

    world.begin_tick();
    assert_eq!(
        inbox.drain(),
        vec![DamageDealt {
            target: 1,
            amount: 5
        }]
    );

    // Delivered events are not redelivered
    world.begin_tick();
    assert!(inbox.is_empty());
}

#[test]
fn test_cancellation_stops_lower_priorities() {
    let mut bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    let _low = bus.subscribe_with_priority::<DamageDealt, _>(-10, move |_| {
        l.lock().push("low");
    });
    let l = log.clone();
    let _shield = bus.subscribe_with_priority::<DamageDealt, _>(10, move |env| {
        l.lock().push("shield");
        if env.payload().amount > 100 {
            env.cancel();
        }
    });

    bus.emit(DamageDealt {
        target: 1,
        amount: 500,
    });
    bus.emit(DamageDealt {
        target: 1,
        amount: 1,
    });
    bus.process();

    assert_eq!(*log.lock(), vec!["shield", "shield", "low"]);
    assert_eq!(bus.stats().cancelled, 1);
}

#[test]
fn test_global_emission_order_across_types() {
    let mut bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    let _a = bus.subscribe::<DamageDealt, _>(move |env| {
        l.lock().push(format!("damage {}", env.payload().amount));
    });
    let l = log.clone();
    let _b = bus.subscribe::<Healed, _>(move |env| {
        l.lock().push(format!("heal {}", env.payload().0));
    });

    bus.emit(DamageDealt {
        target: 0,
        amount: 1,
    });
    bus.emit(Healed(2));
    bus.emit(DamageDealt {
        target: 0,
        amount: 3,
    });
    assert_eq!(bus.process(), 3);

    assert_eq!(*log.lock(), vec!["damage 1", "heal 2", "damage 3"]);
}

#[test]
fn test_unsubscribe() {
    let mut bus = EventBus::new();
    let hits = Arc::new(AtomicU32::new(0));
    let h = hits.clone();
    let sub = bus.subscribe::<Healed, _>(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    bus.emit(Healed(1));
    bus.process();
    assert!(bus.unsubscribe(sub));
    assert!(!bus.unsubscribe(sub));

    bus.emit(Healed(1));
    bus.process();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_system_emitted_events_reach_next_tick() {
    let mut world = World::new();
    let mut scheduler = Scheduler::new();
    let received = Arc::new(AtomicU32::new(0));

    scheduler
        .register(
            &mut world,
            FunctionSystem::new(
                "emitter",
                |_: &mut World, commands: &mut CommandBuffer, _: Duration| {
                    commands.emit(Healed(3));
                    Ok(())
                },
            ),
            0,
        )
        .unwrap();

    let r = received.clone();
    scheduler
        .register(
            &mut world,
            Reactive::new(
                "healer",
                move |_: &mut World, _: &mut CommandBuffer, events: Vec<Healed>| {
                    r.fetch_add(events.iter().map(|e| e.0).sum(), Ordering::SeqCst);
                    Ok(())
                },
            ),
            1,
        )
        .unwrap();

    let report = scheduler.tick(&mut world, Duration::ZERO).unwrap();
    assert_eq!(report.events_delivered, 0);
    assert_eq!(received.load(Ordering::SeqCst), 0);

    let report = scheduler.tick(&mut world, Duration::ZERO).unwrap();
    assert_eq!(report.events_delivered, 1);
    assert_eq!(received.load(Ordering::SeqCst), 3);
}

#[test]
fn test_handler_panic_fails_tick_without_wedging_bus() {
    let mut world = World::new();
    let mut scheduler = Scheduler::new();
    let delivered = Arc::new(AtomicU32::new(0));

    let d = delivered.clone();
    let _sub = world.events_mut().subscribe::<Healed, _>(move |env| {
        if env.payload().0 == 0 {
            panic!("cannot heal by zero");
        }
        d.fetch_add(env.payload().0, Ordering::SeqCst);
    });

    world.emit(Healed(0));
    let err = scheduler.tick(&mut world, Duration::ZERO).unwrap_err();
    match err {
        EcsError::HandlerPanicked { message } => assert!(message.contains("heal by zero")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(scheduler.last_report().is_some());

    world.emit(Healed(4));
    let report = scheduler.tick(&mut world, Duration::ZERO).unwrap();
    assert_eq!(report.events_delivered, 1);
    assert_eq!(delivered.load(Ordering::SeqCst), 4);
}
