use std::sync::{Arc, Mutex};

use markpane_events::{Delivery, EventBus, PanelEvent, Subscription};
use serde_json::json;

fn recorder(bus: &EventBus, kind: &str) -> (Subscription, Arc<Mutex<Vec<PanelEvent>>>) {
    let calls: Arc<Mutex<Vec<PanelEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let sub = bus.on(kind, move |ev| {
        sink.lock().unwrap().push(ev.clone());
        Ok(())
    });
    (sub, calls)
}

#[test]
fn single_subscriber_records_exact_event() {
    let bus = EventBus::new();
    let (_sub, calls) = recorder(&bus, "file:opened");
    let event = PanelEvent::at("file:opened", "host", 1000, json!({"path": "a.md"}));

    bus.emit(&event);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], event);
}

#[test]
fn handler_invoked_once_per_emit_and_never_cross_type() {
    let bus = EventBus::new();
    let (_a, opened) = recorder(&bus, "file:opened");
    let (_b, closed) = recorder(&bus, "file:closed");

    for _ in 0..3 {
        bus.emit(&PanelEvent::new("file:opened", "host", json!({})));
    }

    assert_eq!(opened.lock().unwrap().len(), 3);
    assert!(closed.lock().unwrap().is_empty());
}

#[test]
fn handlers_run_in_registration_order() {
    let bus = EventBus::new();
    let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    for n in 0..5u32 {
        let order = order.clone();
        bus.on("order:test", move |_| {
            order.lock().unwrap().push(n);
            Ok(())
        });
    }
    bus.emit(&PanelEvent::new("order:test", "test", json!(null)));
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn failing_and_panicking_handlers_do_not_stop_fan_out() {
    let bus = EventBus::new();
    bus.on("x:y", |_| Err(anyhow::anyhow!("handler error")));
    bus.on("x:y", |_| panic!("handler panic"));
    let (_sub, calls) = recorder(&bus, "x:y");

    let delivery = bus.emit(&PanelEvent::new("x:y", "test", json!(1)));

    assert_eq!(
        delivery,
        Delivery {
            delivered: 1,
            failed: 2
        }
    );
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn unsubscribe_is_idempotent_and_exact() {
    let bus = EventBus::new();
    let (first, first_calls) = recorder(&bus, "a:b");
    let (_second, second_calls) = recorder(&bus, "a:b");

    assert!(first.unsubscribe());
    assert!(!first.unsubscribe());
    bus.emit(&PanelEvent::new("a:b", "test", json!(null)));

    assert!(first_calls.lock().unwrap().is_empty());
    assert_eq!(second_calls.lock().unwrap().len(), 1);
}

#[test]
fn unsubscribe_after_bus_dropped_is_noop() {
    let bus = EventBus::new();
    let (sub, _calls) = recorder(&bus, "a:b");
    drop(bus);
    assert!(!sub.unsubscribe());
}

#[test]
fn self_unsubscribe_during_dispatch_keeps_others_exactly_once() {
    let bus = EventBus::new();
    let (_before, before_calls) = recorder(&bus, "re:entrant");

    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let hits = Arc::new(Mutex::new(0u32));
    let (slot_in, hits_in) = (slot.clone(), hits.clone());
    let sub = bus.on("re:entrant", move |_| {
        *hits_in.lock().unwrap() += 1;
        if let Some(me) = slot_in.lock().unwrap().as_ref() {
            me.unsubscribe();
        }
        Ok(())
    });
    *slot.lock().unwrap() = Some(sub);

    let (_after, after_calls) = recorder(&bus, "re:entrant");

    bus.emit(&PanelEvent::new("re:entrant", "test", json!(null)));
    bus.emit(&PanelEvent::new("re:entrant", "test", json!(null)));

    assert_eq!(*hits.lock().unwrap(), 1);
    assert_eq!(before_calls.lock().unwrap().len(), 2);
    assert_eq!(after_calls.lock().unwrap().len(), 2);
}

#[test]
fn removing_a_later_handler_mid_pass_skips_only_that_handler() {
    let bus = EventBus::new();
    let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let victim_in = victim.clone();
    bus.on("mid:pass", move |_| {
        if let Some(v) = victim_in.lock().unwrap().take() {
            v.unsubscribe();
        }
        Ok(())
    });
    let (victim_sub, victim_calls) = recorder(&bus, "mid:pass");
    *victim.lock().unwrap() = Some(victim_sub);
    let (_tail, tail_calls) = recorder(&bus, "mid:pass");

    bus.emit(&PanelEvent::new("mid:pass", "test", json!(null)));

    assert!(victim_calls.lock().unwrap().is_empty());
    assert_eq!(tail_calls.lock().unwrap().len(), 1);
}

#[test]
fn handler_added_during_dispatch_waits_for_next_emit() {
    let bus = EventBus::new();
    let late_calls: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
    let (bus_in, late_in) = (bus.clone(), late_calls.clone());
    let added = Arc::new(Mutex::new(false));
    bus.on("grow:list", move |_| {
        let mut added = added.lock().unwrap();
        if !*added {
            *added = true;
            let late = late_in.clone();
            bus_in.on("grow:list", move |_| {
                *late.lock().unwrap() += 1;
                Ok(())
            });
        }
        Ok(())
    });

    bus.emit(&PanelEvent::new("grow:list", "test", json!(null)));
    assert_eq!(*late_calls.lock().unwrap(), 0);
    bus.emit(&PanelEvent::new("grow:list", "test", json!(null)));
    assert_eq!(*late_calls.lock().unwrap(), 1);
}

#[test]
fn handler_may_emit_other_types_reentrantly() {
    let bus = EventBus::new();
    let (_sub, echoes) = recorder(&bus, "echo:out");
    let bus_in = bus.clone();
    bus.on("echo:in", move |ev| {
        bus_in.emit(&PanelEvent::new("echo:out", "echo", ev.payload.clone()));
        Ok(())
    });

    bus.publish("echo:in", "test", &json!({"n": 7}));

    let echoes = echoes.lock().unwrap();
    assert_eq!(echoes.len(), 1);
    assert_eq!(echoes[0].payload["n"], 7);
}
