//! Snapshot cache integration tests
//!
//! Reference stability, structural sharing, serialization and snapshot
//! subscriptions.

use std::{cell::RefCell, rc::Rc};

use canopy::{Forest, Snapshot, SnapshotTarget, Value};
use serde_json::json;

#[test]
fn test_snapshot_is_cached_until_mutation() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "a": 1, "b": { "c": 2 } })).unwrap();

    let first = root.snapshot().unwrap();
    let second = root.snapshot().unwrap();
    assert!(first.ptr_eq(&second));

    root.set("a", 5).unwrap();
    let third = root.snapshot().unwrap();
    assert!(!third.ptr_eq(&first));
    assert_eq!(third, json!({ "a": 5, "b": { "c": 2 } }));
}

#[test]
fn test_unchanged_siblings_are_shared() {
    let forest = Forest::new();
    let root = forest
        .wrap(json!({ "left": { "x": 1 }, "right": { "items": [1, 2] } }))
        .unwrap();
    let before = root.snapshot().unwrap();

    root.child("right").unwrap().child("items").unwrap().push(3).unwrap();
    let after = root.snapshot().unwrap();

    assert!(!after.ptr_eq(&before));
    assert!(after.get("left").unwrap().ptr_eq(before.get("left").unwrap()));
    assert!(!after.get("right").unwrap().ptr_eq(before.get("right").unwrap()));
    assert_eq!(after.get("right").unwrap().get("items").unwrap(), &json!([1, 2, 3]));
}

#[test]
fn test_end_to_end_snapshot_scenario() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "a": 1, "b": { "c": 2 } })).unwrap();
    let untouched = forest.wrap(json!({ "z": true })).unwrap();

    assert!(forest.is_node(&Value::Node(root.clone())));
    assert!(forest.is_node(&root.get("b").unwrap()));

    let before = root.snapshot().unwrap();
    let other_before = untouched.snapshot().unwrap();
    assert_eq!(before, json!({ "a": 1, "b": { "c": 2 } }));

    root.child("b").unwrap().set("c", 3).unwrap();

    let after = root.snapshot().unwrap();
    assert_eq!(after, json!({ "a": 1, "b": { "c": 3 } }));
    assert!(!after.ptr_eq(&before));
    assert!(untouched.snapshot().unwrap().ptr_eq(&other_before));
}

#[test]
fn test_snapshot_accessors_and_serialization() {
    let forest = Forest::new();
    let root = forest
        .wrap(json!({ "name": "n", "count": 3, "flag": true, "list": [null, 1.5] }))
        .unwrap();
    let snapshot = root.snapshot().unwrap();

    assert!(snapshot.is_object());
    assert_eq!(snapshot.get("name").unwrap().as_text(), Some("n"));
    assert_eq!(snapshot.get("count").unwrap().as_int(), Some(3));
    assert_eq!(snapshot.get("flag").unwrap().as_bool(), Some(true));
    assert_eq!(snapshot.get("list").unwrap().as_list().unwrap().len(), 2);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json, json!({ "name": "n", "count": 3, "flag": true, "list": [null, 1.5] }));
    assert_eq!(snapshot.to_json(), json);
}

#[test]
fn test_snapshot_round_trips_into_a_new_tree() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "a": [{ "b": 1 }] })).unwrap();
    let copy = forest.wrap(root.snapshot().unwrap()).unwrap();

    assert_ne!(copy, root);
    assert_eq!(copy.snapshot().unwrap(), root.snapshot().unwrap());
}

// ===== SUBSCRIPTIONS =====

#[test]
fn test_on_snapshot_reports_new_and_previous() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "count": 0 })).unwrap();
    let calls: Rc<RefCell<Vec<(Snapshot, Snapshot)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();
    let listener = forest
        .on_snapshot(&root, move |new, prev| {
            sink.borrow_mut().push((new.clone(), prev.clone()))
        })
        .unwrap();
    assert!(calls.borrow().is_empty());

    forest
        .action(|| {
            root.set("count", 1)?;
            root.set("count", 2)
        })
        .unwrap();
    {
        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, json!({ "count": 2 }));
        assert_eq!(calls[0].1, json!({ "count": 0 }));
    }

    listener.dispose();
    root.set("count", 3).unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn test_on_snapshot_with_producer_follows_target() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "current": { "v": 1 } })).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let source = root.clone();
    let _listener = forest
        .on_snapshot(
            SnapshotTarget::producer(move || source.child("current")),
            move |new, _| sink.borrow_mut().push(new.to_json()),
        )
        .unwrap();

    root.set("current", json!({ "v": 2 })).unwrap();
    root.child("current").unwrap().set("v", 3).unwrap();
    root.set("other", 1).unwrap();

    assert_eq!(*seen.borrow(), vec![json!({ "v": 2 }), json!({ "v": 3 })]);
}

#[test]
fn test_snapshot_reads_are_reactive() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "a": { "b": 1 } })).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let inner = root.child("a").unwrap();
    let _reaction = forest
        .autorun(move || {
            if let Ok(snapshot) = inner.snapshot() {
                sink.borrow_mut().push(snapshot.get("b").and_then(Snapshot::as_int));
            }
        })
        .unwrap();

    root.set("unrelated", true).unwrap();
    root.child("a").unwrap().set("b", 2).unwrap();

    assert_eq!(*seen.borrow(), vec![Some(1), Some(2)]);
}
