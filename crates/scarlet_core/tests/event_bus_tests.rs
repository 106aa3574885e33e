//! Event bus ordering and per-tick limits.

use parking_lot::Mutex;
use scarlet_core::*;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone)]
struct PlayerMoved {
    player: u32,
}

#[derive(Debug)]
struct ScoreChanged;

fn bus_with(config: EventBusConfig) -> EventBus {
    EventBus::new(SandboxId::new(), config)
}

#[test]
fn test_lower_priority_value_runs_first() {
    let bus = bus_with(EventBusConfig::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    let record = |label: &'static str| {
        let order = Arc::clone(&order);
        Handler::new(move |_: &PlayerMoved| {
            order.lock().push(label);
            Ok(())
        })
    };

    let normal = record("normal");
    let urgent = record("urgent");
    let late = record("late");
    let normal_second = record("normal-second");

    bus.subscribe(&normal, 0).unwrap();
    bus.subscribe(&late, EventPriority::LOW).unwrap();
    bus.subscribe(&urgent, -10).unwrap();
    bus.subscribe(&normal_second, 0).unwrap();

    bus.publish(PlayerMoved { player: 1 }).unwrap();
    bus.update();

    assert_eq!(
        *order.lock(),
        vec!["urgent", "normal", "normal-second", "late"]
    );
}

#[test]
fn test_events_are_dispatched_in_fifo_order() {
    let bus = bus_with(EventBusConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        &Handler::new(move |event: &PlayerMoved| {
            sink.lock().push(event.player);
            Ok(())
        }),
        EventPriority::NORMAL,
    )
    .unwrap();

    for player in 0..10 {
        bus.publish(PlayerMoved { player }).unwrap();
    }
    bus.update();
    assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_per_tick_cap_leaves_remainder_queued() {
    let bus = bus_with(EventBusConfig {
        max_events_per_update: 128,
        ..EventBusConfig::default()
    });
    let count = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&count);
    bus.subscribe(
        &Handler::new(move |_: &ScoreChanged| {
            *counter.lock() += 1;
            Ok(())
        }),
        0,
    )
    .unwrap();

    for _ in 0..200 {
        assert!(bus.publish(ScoreChanged).unwrap());
    }

    assert_eq!(bus.update(), 128);
    assert_eq!(*count.lock(), 128);
    assert_eq!(bus.pending_events(), 72);

    assert_eq!(bus.update(), 72);
    assert_eq!(*count.lock(), 200);
    assert_eq!(bus.pending_events(), 0);
}

#[test]
fn test_publish_from_many_threads() {
    let bus = Arc::new(bus_with(EventBusConfig::default()));
    let publishers: Vec<_> = (0..4u32)
        .map(|thread_index| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for offset in 0..250 {
                    bus.publish(PlayerMoved {
                        player: thread_index * 1000 + offset,
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.join().unwrap();
    }

    assert_eq!(bus.pending_events(), 1000);
    assert_eq!(bus.stats().published, 1000);
}

#[test]
fn test_handler_can_unsubscribe_itself_during_dispatch() {
    let bus = Arc::new(bus_with(EventBusConfig::default()));
    let calls = Arc::new(Mutex::new(0));
    let slot: Arc<Mutex<Option<Handler<ScoreChanged>>>> = Arc::new(Mutex::new(None));

    let handler = {
        let bus = Arc::clone(&bus);
        let calls = Arc::clone(&calls);
        let slot = Arc::clone(&slot);
        Handler::new(move |_: &ScoreChanged| {
            *calls.lock() += 1;
            if let Some(me) = slot.lock().as_ref() {
                bus.unsubscribe(me);
            }
            Ok(())
        })
    };
    *slot.lock() = Some(handler.clone());
    bus.subscribe(&handler, 0).unwrap();

    bus.publish(ScoreChanged).unwrap();
    bus.publish(ScoreChanged).unwrap();
    bus.update();

    assert_eq!(*calls.lock(), 1);
    assert!(!bus.has_subscribers::<ScoreChanged>());

    // Break the handler -> slot -> handler cycle.
    slot.lock().take();
}

#[test]
fn test_clear_drops_subscribers_and_queue() {
    let bus = bus_with(EventBusConfig::default());
    bus.subscribe(&Handler::new(|_: &ScoreChanged| Ok(())), 0)
        .unwrap();
    bus.publish(ScoreChanged).unwrap();

    bus.clear();
    assert_eq!(bus.pending_events(), 0);
    assert_eq!(bus.handler_count::<ScoreChanged>(), 0);
    assert_eq!(bus.update(), 0);
}
