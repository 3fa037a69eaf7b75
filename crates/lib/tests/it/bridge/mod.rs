//! Y-CRDT binding: node → document, document → node, and echo suppression.

use std::{cell::Cell, rc::Rc, sync::Arc};

use canopy::{
    Forest, InstanceKey, NodeTypeBuilder, Value, bind_yjs,
    y_crdt::{
        Any, Array, ArrayRef, DeepObservable, Doc, In, Map, MapPrelim, MapRef, Origin, Out,
        TextPrelim, Transact,
    },
};
use serde_json::json;

use crate::helpers::{register_todo, test_forest};

fn read_number(doc: &Doc, map: &MapRef, key: &str) -> Option<f64> {
    let txn = doc.transact();
    match map.get(&txn, key) {
        Some(Out::Any(Any::Number(n))) => Some(n),
        _ => None,
    }
}

fn text(value: &str) -> In {
    In::Any(Any::String(Arc::from(value)))
}

fn todo_prelim(id: &str, title: &str) -> MapPrelim {
    [
        ("$$type".to_string(), text("todo")),
        ("id".to_string(), text(id)),
        ("title".to_string(), text(title)),
        ("done".to_string(), In::Any(Any::Bool(false))),
    ]
    .into_iter()
    .collect()
}

/// Counts document transactions that carry `origin`.
fn count_writes_from(map: &MapRef, origin: Origin) -> (Rc<Cell<usize>>, canopy::y_crdt::Subscription) {
    let count = Rc::new(Cell::new(0));
    let sink = count.clone();
    let subscription = map.observe_deep(move |txn, _| {
        if txn.origin() == Some(&origin) {
            sink.set(sink.get() + 1);
        }
    });
    (count, subscription)
}

// ===== INITIAL CONTENT =====

#[test]
fn test_bind_wraps_existing_content() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    {
        let mut txn = doc.transact_mut();
        state.insert(&mut txn, "count", Any::Number(3.0));
        state.insert(&mut txn, "label", Any::String(Arc::from("hello")));
    }

    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state).unwrap();

    assert_eq!(
        binding.node().snapshot().unwrap(),
        json!({ "count": 3, "label": "hello" })
    );
}

#[test]
fn test_init_hooks_run_at_bind_and_reach_the_document() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    {
        let mut txn = doc.transact_mut();
        state.insert(&mut txn, "$$type", Any::String(Arc::from("counter")));
    }

    let forest = Forest::new();
    forest
        .register_type(NodeTypeBuilder::new("counter").on_init(|node| node.set("ready", true)))
        .unwrap();
    let binding = forest.bind_yjs(&doc, state.clone()).unwrap();

    assert_eq!(binding.node().get("ready").unwrap(), true);
    let txn = doc.transact();
    assert!(matches!(
        state.get(&txn, "ready"),
        Some(Out::Any(Any::Bool(true)))
    ));
}

// ===== NODE TO DOCUMENT =====

#[test]
fn test_node_writes_flush_when_the_action_settles() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    {
        let mut txn = doc.transact_mut();
        state.insert(&mut txn, "numberProp", Any::Number(0.0));
    }
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();
    let (echoes, _echo_sub) = count_writes_from(&state, binding.origin().clone());

    forest
        .action(|| {
            binding.node().set("numberProp", 10)?;
            assert_eq!(read_number(&doc, &state, "numberProp"), Some(0.0));
            Ok(())
        })
        .unwrap();
    assert_eq!(read_number(&doc, &state, "numberProp"), Some(10.0));
    assert_eq!(echoes.get(), 1);

    {
        let mut txn = doc.transact_mut();
        state.insert(&mut txn, "numberProp", Any::Number(20.0));
    }
    assert_eq!(binding.node().get("numberProp").unwrap(), 20);
    assert_eq!(read_number(&doc, &state, "numberProp"), Some(20.0));
    assert_eq!(echoes.get(), 1);
}

#[test]
fn test_batched_node_writes_share_one_transaction() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();
    let (writes, _sub) = count_writes_from(&state, binding.origin().clone());

    forest
        .batch(|| {
            binding.node().set("a", 1)?;
            binding.node().set("b", 2)?;
            binding.node().remove("a")?;
            Ok(())
        })
        .unwrap();

    assert_eq!(writes.get(), 1);
    assert_eq!(read_number(&doc, &state, "a"), None);
    assert_eq!(read_number(&doc, &state, "b"), Some(2.0));
}

#[test]
fn test_nested_node_writes_create_shared_types() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();

    binding
        .node()
        .set("settings", json!({ "theme": "dark", "tags": ["a"] }))
        .unwrap();
    binding
        .node()
        .child("settings")
        .unwrap()
        .child("tags")
        .unwrap()
        .push("b")
        .unwrap();

    let txn = doc.transact();
    let Some(Out::YMap(settings)) = state.get(&txn, "settings") else {
        panic!("settings should be a shared map");
    };
    let Some(Out::YArray(tags)) = settings.get(&txn, "tags") else {
        panic!("tags should be a shared array");
    };
    assert_eq!(tags.len(&txn), 2);
    assert!(matches!(tags.get(&txn, 1), Some(Out::Any(Any::String(s))) if &*s == "b"));
    drop(txn);

    // A second binding over the same document sees the same tree.
    let mirror = Forest::new();
    let other = bind_yjs(&mirror, &doc, state).unwrap();
    assert_eq!(
        other.node().snapshot().unwrap(),
        json!({ "settings": { "theme": "dark", "tags": ["a", "b"] } })
    );
}

// ===== DOCUMENT TO NODE =====

#[test]
fn test_document_changes_replay_onto_nested_nodes() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();
    binding
        .node()
        .set("inner", json!({ "a": 1, "list": [1] }))
        .unwrap();
    let inner = binding.node().child("inner").unwrap();
    let list = inner.child("list").unwrap();

    {
        let mut txn = doc.transact_mut();
        let Some(Out::YMap(shared_inner)) = state.get(&txn, "inner") else {
            panic!("inner should be a shared map");
        };
        shared_inner.insert(&mut txn, "a", Any::Number(5.0));
        let Some(Out::YArray(shared_list)) = shared_inner.get(&txn, "list") else {
            panic!("list should be a shared array");
        };
        let len = shared_list.len(&txn);
        shared_list.insert(&mut txn, len, Any::Number(2.5));
    }

    assert_eq!(inner.get("a").unwrap(), 5);
    assert_eq!(list.snapshot().unwrap(), json!([1, 2.5]));
    assert!(binding.node().child("inner").unwrap() == inner);
    assert!(!binding.is_halted());
}

#[test]
fn test_document_removals_replay_onto_nodes() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();
    binding.node().set("a", 1).unwrap();
    binding.node().set("b", 2).unwrap();

    {
        let mut txn = doc.transact_mut();
        state.remove(&mut txn, "a");
    }

    assert_eq!(binding.node().keys(), vec!["b".to_string()]);
}

#[test]
fn test_keyed_reorder_from_document_keeps_identity() {
    let doc = Doc::new();
    let todos: ArrayRef = doc.get_or_insert_array("todos");
    let forest = test_forest();
    register_todo(&forest);
    let binding = bind_yjs(&forest, &doc, todos.clone()).unwrap();
    let list = binding.node().clone();
    list.push(json!({ "$$type": "todo", "id": "a", "title": "A", "done": false }))
        .unwrap();
    list.push(json!({ "$$type": "todo", "id": "b", "title": "B", "done": false }))
        .unwrap();
    let a = list.child_at(0).unwrap();
    let b = list.child_at(1).unwrap();
    assert_eq!(todos.len(&doc.transact()), 2);
    let original = list.snapshot().unwrap();
    let a_before = a.snapshot().unwrap();
    let b_before = b.snapshot().unwrap();

    {
        let mut txn = doc.transact_mut();
        todos.remove_range(&mut txn, 0, 2);
        todos.insert(&mut txn, 0, todo_prelim("b", "B"));
        todos.insert(&mut txn, 1, todo_prelim("a", "A"));
    }

    assert_eq!(list.len(), 2);
    assert_eq!(list.child_at(0).unwrap(), b);
    assert_eq!(list.child_at(1).unwrap(), a);
    assert!(a.snapshot().unwrap().ptr_eq(&a_before));
    assert!(b.snapshot().unwrap().ptr_eq(&b_before));
    assert!(!binding.is_halted());

    {
        let mut txn = doc.transact_mut();
        todos.remove_range(&mut txn, 0, 2);
        todos.insert(&mut txn, 0, todo_prelim("a", "A"));
        todos.insert(&mut txn, 1, todo_prelim("b", "B"));
    }

    assert_eq!(list.child_at(0).unwrap(), a);
    assert_eq!(list.child_at(1).unwrap(), b);
    assert!(a.snapshot().unwrap().ptr_eq(&a_before));
    assert!(b.snapshot().unwrap().ptr_eq(&b_before));
    assert_eq!(list.snapshot().unwrap(), original);
    assert_eq!(forest.keyed_instance_count(), 2);
    assert!(!binding.is_halted());
}

#[test]
fn test_keyed_update_from_document_merges_into_instance() {
    let doc = Doc::new();
    let todos: ArrayRef = doc.get_or_insert_array("todos");
    let forest = test_forest();
    register_todo(&forest);
    let binding = bind_yjs(&forest, &doc, todos.clone()).unwrap();
    let list = binding.node().clone();
    list.push(json!({ "$$type": "todo", "id": "a", "title": "A" }))
        .unwrap();
    let a = list.child_at(0).unwrap();

    {
        let mut txn = doc.transact_mut();
        todos.remove(&mut txn, 0);
        todos.insert(&mut txn, 0, todo_prelim("a", "A changed"));
    }

    assert_eq!(list.child_at(0).unwrap(), a);
    assert_eq!(a.get("title").unwrap(), "A changed");
    assert!(!binding.is_halted());
}

#[test]
fn test_document_cannot_rewrite_a_node_key() {
    let doc = Doc::new();
    let todos: ArrayRef = doc.get_or_insert_array("todos");
    let forest = test_forest();
    let todo = register_todo(&forest);
    let binding = bind_yjs(&forest, &doc, todos.clone()).unwrap();
    let list = binding.node().clone();
    list.push(json!({ "$$type": "todo", "id": "a", "title": "A" }))
        .unwrap();
    let a = list.child_at(0).unwrap();

    {
        let mut txn = doc.transact_mut();
        let Some(Out::YMap(shared)) = todos.get(&txn, 0) else {
            panic!("todo should be a shared map");
        };
        shared.insert(&mut txn, "id", Any::String(Arc::from("b")));
    }

    assert!(binding.is_halted());
    let err = binding.take_error().unwrap();
    assert!(err.is_identity_violation());
    assert_eq!(todo.key_of(&a), Some(InstanceKey::from("a")));
    assert_eq!(todo.find_by_key("a").unwrap(), a);
    assert!(todo.find_by_key("b").is_none());
    assert_eq!(a.get("id").unwrap(), "a");
}

#[test]
fn test_large_integers_keep_full_precision() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();
    let big = 9_007_199_254_740_993_i64;

    binding.node().set("big", big).unwrap();
    binding.node().set("small", 42).unwrap();
    {
        let txn = doc.transact();
        assert!(matches!(state.get(&txn, "big"), Some(Out::Any(Any::BigInt(n))) if n == big));
        assert!(matches!(state.get(&txn, "small"), Some(Out::Any(Any::Number(n))) if n == 42.0));
    }

    let mirror = Forest::new();
    let other = bind_yjs(&mirror, &doc, state).unwrap();
    assert_eq!(other.node().get("big").unwrap(), Value::Int(big));
    assert_eq!(other.node().get("small").unwrap(), Value::Int(42));
}

#[test]
fn test_busy_document_retries_at_next_settle() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();

    let reader = doc.transact();
    let err = binding.node().set("n", 1).unwrap_err();
    assert!(err.is_bridge_error());
    assert_eq!(binding.node().get("n").unwrap(), 1);
    drop(reader);
    assert_eq!(read_number(&doc, &state, "n"), None);

    forest.action(|| Ok(())).unwrap();
    assert_eq!(read_number(&doc, &state, "n"), Some(1.0));
}

#[test]
fn test_own_origin_is_not_replayed() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();

    {
        let mut txn = doc.transact_mut_with(binding.origin().clone());
        state.insert(&mut txn, "ghost", Any::Bool(true));
    }
    assert!(binding.node().get("ghost").is_none());

    {
        let mut txn = doc.transact_mut_with(Origin::from("someone-else"));
        state.insert(&mut txn, "visible", Any::Bool(true));
    }
    assert_eq!(binding.node().get("visible").unwrap(), true);
}

// ===== LIFECYCLE =====

#[test]
fn test_dispose_stops_both_directions() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();

    binding.dispose();
    binding.dispose();
    assert!(binding.is_disposed());

    binding.node().set("local", 1).unwrap();
    assert_eq!(read_number(&doc, &state, "local"), None);

    {
        let mut txn = doc.transact_mut();
        state.insert(&mut txn, "remote", Any::Number(1.0));
    }
    assert!(binding.node().get("remote").is_none());
}

#[test]
fn test_unsupported_document_data_halts_the_binding() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    let forest = Forest::new();
    let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();

    {
        let mut txn = doc.transact_mut();
        state.insert(&mut txn, "notes", TextPrelim::new("hi"));
    }
    assert!(binding.is_halted());
    let err = binding.take_error().unwrap();
    assert!(err.is_bridge_error());
    assert_eq!(err.module(), "bridge");
    assert!(binding.take_error().is_none());

    {
        let mut txn = doc.transact_mut();
        state.insert(&mut txn, "after", Any::Number(1.0));
    }
    assert!(binding.node().get("after").is_none());
}

#[test]
fn test_bind_rejects_unsupported_initial_content() {
    let doc = Doc::new();
    let state = doc.get_or_insert_map("state");
    {
        let mut txn = doc.transact_mut();
        state.insert(&mut txn, "notes", TextPrelim::new("hi"));
    }

    let err = bind_yjs(&Forest::new(), &doc, state).unwrap_err();
    assert!(err.is_bridge_error());
}
