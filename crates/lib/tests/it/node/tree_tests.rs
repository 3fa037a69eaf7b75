//! Parent, root and path queries, traversal and cloning.

use std::{cell::RefCell, rc::Rc};

use canopy::{CloneOptions, Forest, PathSegment, Value, WalkMode, path};
use serde_json::json;

use crate::helpers::{register_todo, test_forest};

fn sample(forest: &Forest) -> canopy::Node {
    forest
        .wrap(json!({
            "name": "inbox",
            "lists": [
                { "title": "home", "items": [{ "text": "dishes" }] },
                { "title": "work", "items": [] }
            ]
        }))
        .unwrap()
}

#[test]
fn test_parent_and_root_paths() {
    let forest = Forest::new();
    let root = sample(&forest);
    let lists = root.child("lists").unwrap();
    let home = lists.child_at(0).unwrap();
    let item = home.child("items").unwrap().child_at(0).unwrap();

    let location = item.parent_path().unwrap();
    assert_eq!(location.segment, PathSegment::Index(0));

    let root_path = item.root_path();
    assert_eq!(root_path.root, root);
    assert_eq!(root_path.path, path!["lists", 0usize, "items", 0usize]);
    assert_eq!(root_path.nodes.len(), 5);
    assert_eq!(root_path.path_string(), "/lists/0/items/0");

    assert!(forest.is_child_of_parent(&home, &lists));
    assert!(forest.is_parent_of_child(&lists, &home));
    assert!(!forest.is_child_of_parent(&item, &lists));
    assert!(root.is_root());
    assert!(root.parent_path().is_none());
}

#[test]
fn test_parent_to_child_path_and_resolve() {
    let forest = Forest::new();
    let root = sample(&forest);
    let home = root.child("lists").unwrap().child_at(0).unwrap();
    let item = home.child("items").unwrap().child_at(0).unwrap();

    let path = forest.parent_to_child_path(&home, &item).unwrap();
    assert_eq!(path, path!["items", 0usize]);
    assert_eq!(forest.parent_to_child_path(&item, &item).unwrap(), path![]);
    assert!(forest.parent_to_child_path(&item, &home).is_none());

    assert_eq!(home.resolve_path(&path).unwrap(), Value::Node(item.clone()));
    assert_eq!(
        root.resolve_path(&path!["lists", 1usize, "title"]).unwrap(),
        "work"
    );
    assert!(root.resolve_path(&path!["lists", 7usize]).is_none());
    assert_eq!(root.resolve_path(&[]).unwrap(), Value::Node(root.clone()));
}

#[test]
fn test_find_parent_with_depth_limit() {
    let forest = Forest::new();
    let root = sample(&forest);
    let home = root.child("lists").unwrap().child_at(0).unwrap();
    let item = home.child("items").unwrap().child_at(0).unwrap();

    let has_title = |node: &canopy::Node| node.get("title").is_some();
    assert_eq!(forest.find_parent(&item, has_title, None).unwrap(), home);

    let found = forest.find_parent_path(&item, has_title, None).unwrap();
    assert_eq!(found.path, path!["items", 0usize]);

    assert!(forest.find_parent(&item, has_title, Some(1)).is_none());
    assert!(forest.find_parent(&item, has_title, Some(2)).is_some());
    assert!(forest.find_parent(&root, has_title, None).is_none());
}

#[test]
fn test_children_and_find_children() {
    let forest = Forest::new();
    let root = sample(&forest);

    let direct = forest.children(&root);
    assert_eq!(direct.len(), 1);

    let with_title = forest.find_children(&root, |node| node.get("title").is_some(), false);
    assert!(with_title.is_empty());

    let deep = forest.find_children(&root, |node| node.get("title").is_some(), true);
    let titles: Vec<Value> = deep.iter().filter_map(|node| node.get("title")).collect();
    assert_eq!(titles, vec![Value::from("home"), Value::from("work")]);
}

#[test]
fn test_walk_tree_orders() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "a": { "b": {} } })).unwrap();
    let a = root.child("a").unwrap();
    let b = a.child("b").unwrap();

    let visited = Rc::new(RefCell::new(Vec::new()));
    let sink = visited.clone();
    let none: Option<()> = forest.walk_tree(&root, WalkMode::PreOrder, |node| {
        sink.borrow_mut().push(node.clone());
        None
    });
    assert!(none.is_none());
    assert_eq!(*visited.borrow(), vec![root.clone(), a.clone(), b.clone()]);

    visited.borrow_mut().clear();
    let sink = visited.clone();
    let _: Option<()> = forest.walk_tree(&root, WalkMode::PostOrder, |node| {
        sink.borrow_mut().push(node.clone());
        None
    });
    assert_eq!(*visited.borrow(), vec![b.clone(), a.clone(), root.clone()]);

    let found = forest.walk_tree(&root, WalkMode::PreOrder, |node| {
        node.get("b").map(|_| node.path_string())
    });
    assert_eq!(found.as_deref(), Some("/a"));
}

#[test]
fn test_parent_queries_are_reactive() {
    let forest = Forest::new();
    let root = forest.wrap(json!({ "a": { "x": 1 }, "b": {} })).unwrap();
    let a = root.child("a").unwrap();
    let b = root.child("b").unwrap();

    let paths = Rc::new(RefCell::new(Vec::new()));
    let sink = paths.clone();
    let watched = a.clone();
    let _reaction = forest
        .autorun(move || sink.borrow_mut().push(watched.path_string()))
        .unwrap();

    forest
        .action(|| {
            root.remove("a")?;
            b.set("a", a.clone())
        })
        .unwrap();

    assert_eq!(*paths.borrow(), vec!["/a".to_string(), "/b/a".to_string()]);
}

#[test]
fn test_clone_regenerates_keys() {
    let forest = test_forest();
    let todo = register_todo(&forest);
    let original = todo.create(json!({ "title": "a" })).unwrap();
    assert_eq!(todo.key_of(&original).unwrap(), "0-t");

    let copy = forest.clone_node(&original, CloneOptions::default()).unwrap();
    assert_ne!(copy, original);
    assert_eq!(todo.key_of(&copy).unwrap(), "1-t");
    assert_eq!(copy.get("title").unwrap(), "a");

    let same = forest
        .clone_node(&original, CloneOptions { regenerate_keys: false })
        .unwrap();
    assert_eq!(same, original);
}
