//! Property-based invariant tests for the notification engine.
//!
//! Validates:
//! 1. Exactly-once change detection: a write sequence raises one
//!    notification per adjacent distinct transition, never more.
//! 2. Command re-query count equals the number of tracked-name matches.
//! 3. Broker delivery counts are exact per registered value type.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use uibind::{BrokerHandler, ChangeNotifier, CommandController, EventBroker};

proptest! {
    #[test]
    fn one_notification_per_distinct_transition(values in prop::collection::vec(0i32..4, 0..40)) {
        let notifier = ChangeNotifier::new();
        let names = Arc::new(Mutex::new(Vec::new()));
        let n = Arc::clone(&names);
        notifier.on_changed(move |event| {
            n.lock().expect("lock").push(event.name().to_owned());
        });

        let mut storage = 0i32;
        let mut expected = 0usize;
        let mut prev = storage;
        for value in &values {
            if *value != prev {
                expected += 1;
            }
            prev = *value;
            notifier.set_value(&mut storage, *value, "x").expect("set");
        }

        let raised = names.lock().expect("lock").clone();
        prop_assert_eq!(raised.len(), expected);
        prop_assert!(raised.iter().all(|name| name == "x"));
        prop_assert_eq!(storage, prev);
    }

    #[test]
    fn requery_count_equals_tracked_name_matches(
        names in prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d"]), 0..40),
    ) {
        let source = ChangeNotifier::new();
        let command = CommandController::new(|_: &()| {});
        let requeries = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&requeries);
        command.on_state_changed(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        command.track(&source, Some(&["a", "b"]));

        let expected = names.iter().filter(|name| **name == "a" || **name == "b").count();
        for name in &names {
            source.notify(name).expect("notify");
        }
        prop_assert_eq!(requeries.load(Ordering::SeqCst), expected);
    }

    #[test]
    fn broker_delivery_counts_are_exact_per_type(
        events in prop::collection::vec(prop::bool::ANY, 0..40),
    ) {
        let broker = EventBroker::new();

        let ints = Arc::new(AtomicUsize::new(0));
        let i = Arc::clone(&ints);
        let int_handler: BrokerHandler<i32> = Arc::new(move |_| {
            i.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let strings = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&strings);
        let string_handler: BrokerHandler<String> = Arc::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        broker.subscribe("c", int_handler).expect("subscribe");
        broker.subscribe("c", string_handler).expect("subscribe");

        let mut expected_ints = 0usize;
        for is_int in &events {
            if *is_int {
                expected_ints += 1;
                broker.publish("c", &1i32).expect("publish");
            } else {
                broker.publish("c", &"s".to_owned()).expect("publish");
            }
        }
        prop_assert_eq!(ints.load(Ordering::SeqCst), expected_ints);
        prop_assert_eq!(strings.load(Ordering::SeqCst), events.len() - expected_ints);
    }
}
