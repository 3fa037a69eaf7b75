//! Immutable, structurally shared snapshots of node trees.
//!
//! A [`Snapshot`] is a plain-data image of a node at one point in time.
//! Lists and objects are reference counted, and each node caches its last
//! snapshot until something inside it changes. Consequently:
//!
//! - two snapshots of an unchanged node are the *same* allocation
//!   ([`Snapshot::ptr_eq`]),
//! - after a change, untouched sibling subtrees keep their previous
//!   snapshot allocations.
//!
//! ```
//! use canopy::Forest;
//! use serde_json::json;
//!
//! let forest = Forest::new();
//! let root = forest.wrap(json!({ "a": { "x": 1 }, "b": { "y": 2 } })).unwrap();
//! let before = root.snapshot().unwrap();
//!
//! root.child("a").unwrap().set("x", 5).unwrap();
//! let after = root.snapshot().unwrap();
//!
//! assert!(!before.ptr_eq(&after));
//! assert!(before.get("b").unwrap().ptr_eq(after.get("b").unwrap()));
//! ```

mod cache;

use std::{collections::BTreeMap, rc::Rc};

use serde::{Serialize, Serializer, ser::SerializeMap, ser::SerializeSeq};

pub use cache::SnapshotTarget;

use crate::value::{Primitive, Value};

/// Plain-data image of a node.
#[derive(Debug, Clone)]
pub enum Snapshot {
    Primitive(Primitive),
    List(Rc<Vec<Snapshot>>),
    Object(Rc<BTreeMap<String, Snapshot>>),
}

impl Snapshot {
    /// Reference identity: true when both snapshots share their allocation.
    /// Primitives compare by value.
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        match (self, other) {
            (Snapshot::List(a), Snapshot::List(b)) => Rc::ptr_eq(a, b),
            (Snapshot::Object(a), Snapshot::Object(b)) => Rc::ptr_eq(a, b),
            (Snapshot::Primitive(a), Snapshot::Primitive(b)) => a == b,
            _ => false,
        }
    }

    /// Object property lookup
    pub fn get(&self, key: &str) -> Option<&Snapshot> {
        match self {
            Snapshot::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// List element lookup
    pub fn at(&self, index: usize) -> Option<&Snapshot> {
        match self {
            Snapshot::List(items) => items.get(index),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Snapshot::Primitive(primitive) => Some(primitive),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_primitive()?.as_int()
    }

    pub fn as_text(&self) -> Option<&str> {
        self.as_primitive()?.as_text()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_primitive()?.as_bool()
    }

    pub fn as_list(&self) -> Option<&[Snapshot]> {
        match self {
            Snapshot::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Snapshot>> {
        match self {
            Snapshot::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Snapshot::List(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Snapshot::Object(_))
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Snapshot::Primitive(primitive) => primitive.to_json(),
            Snapshot::List(items) => {
                serde_json::Value::Array(items.iter().map(Snapshot::to_json).collect())
            }
            Snapshot::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Converts back into plain data, e.g. for re-wrapping.
    pub fn to_value(&self) -> Value {
        match self {
            Snapshot::Primitive(primitive) => Value::from(primitive.clone()),
            Snapshot::List(items) => Value::List(items.iter().map(Snapshot::to_value).collect()),
            Snapshot::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self, other) {
            (Snapshot::List(a), Snapshot::List(b)) => a == b,
            (Snapshot::Object(a), Snapshot::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq<serde_json::Value> for Snapshot {
    fn eq(&self, other: &serde_json::Value) -> bool {
        self.to_json() == *other
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Snapshot::Primitive(Primitive::Null) => serializer.serialize_unit(),
            Snapshot::Primitive(Primitive::Bool(b)) => serializer.serialize_bool(*b),
            Snapshot::Primitive(Primitive::Int(i)) => serializer.serialize_i64(*i),
            Snapshot::Primitive(Primitive::Float(f)) => serializer.serialize_f64(*f),
            Snapshot::Primitive(Primitive::Text(s)) => serializer.serialize_str(s),
            Snapshot::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Snapshot::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl From<&Snapshot> for Value {
    fn from(snapshot: &Snapshot) -> Self {
        snapshot.to_value()
    }
}

impl From<Snapshot> for Value {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.to_value()
    }
}
