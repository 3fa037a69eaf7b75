//! Actions, getters, computeds and volatile state.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use canopy::{ComputedOptions, ConfigOverride, Forest, NodeTypeBuilder, Value};
use serde_json::json;

use crate::helpers::{register_todo, test_forest};

#[test]
fn test_actions_and_generated_setters() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    let node = todo.create(json!({ "title": "a" })).unwrap();

    assert_eq!(todo.call("toggle", &node, &[]).unwrap(), true);
    assert_eq!(node.get("done").unwrap(), true);

    todo.call("set_title", &node, &[Value::from("b")]).unwrap();
    assert_eq!(node.get("title").unwrap(), "b");

    let err = todo.call("missing", &node, &[]).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_actions_satisfy_strict_mode() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    let node = todo.create(Value::object()).unwrap();
    forest.configure(ConfigOverride::default().enforce_actions(true));

    assert!(node.set("done", true).is_err());
    todo.call("toggle", &node, &[]).unwrap();
    assert_eq!(node.get("done").unwrap(), true);
}

#[test]
fn test_bound_actions_are_stable() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    let node = todo.create(Value::object()).unwrap();

    let first = todo.bound_action(&node, "toggle").unwrap();
    let second = todo.bound_action(&node, "toggle").unwrap();
    assert!(Rc::ptr_eq(&first, &second));

    first(&[]).unwrap();
    assert_eq!(node.get("done").unwrap(), true);
}

#[test]
fn test_members_require_an_instance() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    let plain = forest.wrap(json!({ "title": "x" })).unwrap();
    let err = todo.call("toggle", &plain, &[]).unwrap_err();
    assert!(err.is_shape_violation());
}

#[test]
fn test_getters_take_arguments() {
    let forest = Forest::new();
    let point = forest
        .register_type(NodeTypeBuilder::new("point").getter("scaled", |node, args| {
            let x = node.get("x").and_then(|v| v.as_int()).unwrap_or(0);
            let factor = args.first().and_then(Value::as_int).unwrap_or(1);
            Value::Int(x * factor)
        }))
        .unwrap();
    let node = point.create(json!({ "x": 3 })).unwrap();
    assert_eq!(point.get("scaled", &node, &[Value::Int(4)]).unwrap(), 12);
}

#[test]
fn test_computed_is_memoized() {
    let forest = Forest::new();
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let list_type = forest
        .register_type(NodeTypeBuilder::new("list").computed("total", move |node| {
            counter.set(counter.get() + 1);
            let items = node.child("items").map(|items| items.items()).unwrap_or_default();
            Value::Int(items.iter().filter_map(Value::as_int).sum())
        }))
        .unwrap();
    let node = list_type.create(json!({ "items": [1, 2] })).unwrap();

    assert_eq!(list_type.computed("total", &node).unwrap(), 3);
    assert_eq!(list_type.computed("total", &node).unwrap(), 3);
    assert_eq!(runs.get(), 1);

    node.child("items").unwrap().push(4).unwrap();
    assert_eq!(list_type.computed("total", &node).unwrap(), 7);
    assert_eq!(runs.get(), 2);

    let other = list_type.create(json!({ "items": [] })).unwrap();
    other.child("items").unwrap().push(1).unwrap();
    assert_eq!(list_type.computed("total", &node).unwrap(), 7);
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_computed_custom_equality_keeps_cached_value() {
    let forest = Forest::new();
    let shape = forest
        .register_type(NodeTypeBuilder::new("shape").computed_with(
            "bounds",
            |node| {
                json!({
                    "w": node.get("w").and_then(|v| v.as_int()),
                    "rev": node.get("rev").and_then(|v| v.as_int()),
                })
                .into()
            },
            ComputedOptions::new().equals(|a, b| a.get("w") == b.get("w")),
        ))
        .unwrap();
    let node = shape.create(json!({ "w": 1, "rev": 0 })).unwrap();

    let first = shape.computed("bounds", &node).unwrap();
    node.set("rev", 1).unwrap();
    assert_eq!(shape.computed("bounds", &node).unwrap(), first);

    node.set("w", 2).unwrap();
    let updated = shape.computed("bounds", &node).unwrap();
    assert_eq!(updated.get("w").unwrap(), &Value::Int(2));
    assert_eq!(updated.get("rev").unwrap(), &Value::Int(1));
}

#[test]
fn test_volatile_state() {
    let forest = Forest::new();
    let defaults = Rc::new(Cell::new(0));
    let counter = defaults.clone();
    let editor = forest
        .register_type(NodeTypeBuilder::new("editor").volatile("selected", move || {
            counter.set(counter.get() + 1);
            Value::Null
        }))
        .unwrap();
    let node = editor.create(json!({ "text": "x" })).unwrap();

    assert_eq!(defaults.get(), 0);
    assert!(editor.volatile("selected", &node).unwrap().is_null());
    assert_eq!(defaults.get(), 1);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let watched = node.clone();
    let watcher = editor.clone();
    let _reaction = forest
        .autorun(move || {
            sink.borrow_mut()
                .push(watcher.volatile("selected", &watched).unwrap_or_default())
        })
        .unwrap();

    editor.set_volatile("selected", &node, 3).unwrap();
    assert_eq!(editor.volatile("selected", &node).unwrap(), 3);
    assert_eq!(node.snapshot().unwrap(), json!({ "$$type": "editor", "text": "x" }));

    editor.reset_volatile("selected", &node).unwrap();
    assert!(editor.volatile("selected", &node).unwrap().is_null());
    assert_eq!(defaults.get(), 2);
    assert_eq!(*seen.borrow(), vec![Value::Null, Value::Int(3), Value::Null]);

    assert!(editor.volatile("missing", &node).unwrap_err().is_not_found());
}
