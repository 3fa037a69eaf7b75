//! Registration, creation and the one-instance-per-key rule.

use canopy::{ConfigOverride, Forest, InstanceKey, NodeTypeBuilder, Value};
use serde_json::json;

use crate::helpers::{register_todo, test_forest};

#[test]
fn test_duplicate_registration_fails() {
    let forest = Forest::new();
    forest.register_type(NodeTypeBuilder::new("todo")).unwrap();
    let err = forest.register_type(NodeTypeBuilder::new("todo")).unwrap_err();
    assert!(err.is_identity_violation());
    assert!(!err.is_configuration_error());
    assert!(err.is_type_error());
    assert!(err.to_string().contains("'todo'"));
}

#[test]
fn test_builder_errors_surface_at_registration() {
    let forest = Forest::new();
    let err = forest
        .register_type(
            NodeTypeBuilder::new("item")
                .action("go", |_, _| Ok(Value::Null))
                .getter("go", |_, _| Value::Null),
        )
        .unwrap_err();
    assert!(err.is_configuration_error());
    assert!(!err.is_identity_violation());
    assert!(forest.node_type("item").is_none());
}

#[test]
fn test_create_stamps_tag_defaults_and_key() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    let node = todo.create(json!({ "title": "write" })).unwrap();

    assert_eq!(
        node.snapshot().unwrap(),
        json!({ "$$type": "todo", "id": "0-t", "title": "write", "done": false })
    );
    assert!(todo.is(&node));
    assert_eq!(todo.key_of(&node), Some(InstanceKey::from("0-t")));

    let info = forest.type_and_key(&Value::Node(node.clone())).unwrap();
    assert_eq!(info.tag, "todo");
    assert_eq!(info.key, Some(InstanceKey::from("0-t")));
    assert_eq!(info.node_type.unwrap().tag(), "todo");
}

#[test]
fn test_generated_key_is_stable() {
    let forest = Forest::new();
    forest.configure(ConfigOverride::default().enforce_actions(false));
    let todo = register_todo(&forest);
    let node = todo.create(Value::object()).unwrap();

    let key = todo.key_of(&node).unwrap();
    let text = key.as_text().unwrap();
    assert!(!text.is_empty());
    let first = node.snapshot().unwrap();
    let second = node.snapshot().unwrap();
    assert_eq!(first.get("id").unwrap().as_text(), Some(text));
    assert!(first.ptr_eq(&second));
}

#[test]
fn test_create_rejects_foreign_data() {
    let forest = Forest::new();
    let todo = register_todo(&forest);

    let err = todo.create(json!([1, 2])).unwrap_err();
    assert!(err.is_shape_violation());

    let err = todo.create(json!({ "$$type": "note" })).unwrap_err();
    assert!(err.is_shape_violation());
    assert_eq!(err.module(), "types");
}

#[test]
fn test_same_key_resolves_to_live_instance() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    let first = todo.create(json!({ "id": "k", "title": "a" })).unwrap();
    let second = todo.create(json!({ "id": "k", "title": "b" })).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.get("title").unwrap(), "b");
    assert_eq!(forest.keyed_instance_count(), 1);
    assert_eq!(todo.find_by_key("k").unwrap(), first);
}

#[test]
fn test_keyed_data_reuses_instance_in_same_slot() {
    let forest = test_forest();
    register_todo(&forest);
    let root = forest
        .wrap(json!({ "todo": { "$$type": "todo", "id": "k", "title": "a" } }))
        .unwrap();
    let before = root.child("todo").unwrap();

    root.set("todo", json!({ "$$type": "todo", "id": "k", "title": "b" }))
        .unwrap();

    let after = root.child("todo").unwrap();
    assert_eq!(before, after);
    assert_eq!(after.get("title").unwrap(), "b");
}

#[test]
fn test_untyped_tags_are_plain_data() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "$$type": "unknown", "id": "k" })).unwrap();
    let info = forest.type_and_key(&Value::Node(root)).unwrap();
    assert_eq!(info.tag, "unknown");
    assert!(info.key.is_none());
    assert!(info.node_type.is_none());
    assert_eq!(forest.keyed_instance_count(), 0);
}

#[test]
fn test_text_and_integer_keys_name_different_instances() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    let text = todo.create(json!({ "id": "1", "title": "text" })).unwrap();
    let int = todo.create(json!({ "id": 1, "title": "int" })).unwrap();

    assert_ne!(text, int);
    assert_eq!(forest.keyed_instance_count(), 2);
    assert_eq!(todo.find_by_key("1").unwrap(), text);
    assert_eq!(todo.find_by_key(1).unwrap(), int);
    assert_eq!(todo.key_of(&int), Some(InstanceKey::Int(1)));
    assert_eq!(text.get("title").unwrap(), "text");
}

// ===== IDENTITY PROPERTIES =====

#[test]
fn test_key_property_cannot_be_rewritten() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    let node = todo.create(json!({ "id": "k", "title": "a" })).unwrap();
    let before = node.snapshot().unwrap();

    let err = forest.action(|| node.set("id", "other")).unwrap_err();
    assert!(err.is_identity_violation());
    assert!(err.to_string().contains("'id'"));

    let err = forest.action(|| node.set("id", 5)).unwrap_err();
    assert!(err.is_identity_violation());

    let err = forest.action(|| node.remove("id")).unwrap_err();
    assert!(err.is_identity_violation());

    assert_eq!(todo.key_of(&node), Some(InstanceKey::from("k")));
    assert_eq!(todo.find_by_key("k").unwrap(), node);
    assert!(todo.find_by_key("other").is_none());
    assert!(node.snapshot().unwrap().ptr_eq(&before));

    // Writing the same key again is a no-op.
    forest.action(|| node.set("id", "k")).unwrap();
}

#[test]
fn test_type_tag_cannot_be_rewritten() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    forest.register_type(NodeTypeBuilder::new("note")).unwrap();
    let node = todo.create(json!({ "id": "k" })).unwrap();

    let err = forest.action(|| node.set("$$type", "note")).unwrap_err();
    assert!(err.is_identity_violation());
    let err = forest.action(|| node.remove("$$type")).unwrap_err();
    assert!(err.is_identity_violation());
    assert!(todo.is(&node));
    assert_eq!(todo.find_by_key("k").unwrap(), node);

    // Plain objects cannot take on a registered tag either.
    let plain = forest.wrap(json!({ "id": "p" })).unwrap();
    let err = forest.action(|| plain.set("$$type", "todo")).unwrap_err();
    assert!(err.is_identity_violation());
    assert!(!todo.is(&plain));
}

#[test]
fn test_unregistered_tags_stay_writable() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "$$type": "draft" })).unwrap();
    root.set("$$type", "final").unwrap();
    assert_eq!(root.get("$$type").unwrap(), "final");
    root.remove("$$type").unwrap();
    assert!(root.get("$$type").is_none());
}
