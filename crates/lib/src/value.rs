//! Plain data values and the primitive/structure classifier.
//!
//! [`Value`] is the input side of every operation that accepts data: wrapping,
//! typed construction, snapshot application and CRDT replay. It is a plain
//! tree of primitives, lists and objects, plus [`Value::Node`] for placing an
//! already-live node (which moves it rather than copying it).
//!
//! The classifier methods ([`Value::is_primitive`], [`Value::is_plain_list`],
//! [`Value::is_plain_object`]) decide whether the engine descends into a value
//! or stores it as a leaf.
//!
//! ```
//! use canopy::Value;
//! use serde_json::json;
//!
//! let value = Value::from(json!({ "a": 1, "b": [true, "x"] }));
//! assert!(value.is_plain_object());
//! assert_eq!(value.get("a"), Some(&Value::Int(1)));
//! assert!(Value::from(3.5).is_primitive());
//! ```

use std::{collections::BTreeMap, fmt};

use crate::node::Node;

/// Leaf values that can be stored directly in a node slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Null, also used for an empty ("undefined") slot
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 text
    Text(String),
}

impl Primitive {
    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Primitive::Null => "null",
            Primitive::Bool(_) => "bool",
            Primitive::Int(_) => "int",
            Primitive::Float(_) => "float",
            Primitive::Text(_) => "text",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Primitive::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Primitive::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Primitive::Int(i) => Some(*i as f64),
            Primitive::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Primitive::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Converts to a JSON value. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Primitive::Null => serde_json::Value::Null,
            Primitive::Bool(b) => serde_json::Value::Bool(*b),
            Primitive::Int(i) => serde_json::Value::from(*i),
            Primitive::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Primitive::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// The uniqueness key this primitive stands for. Only text and
    /// integers are usable as keys.
    pub fn instance_key(&self) -> Option<InstanceKey> {
        match self {
            Primitive::Text(s) => Some(InstanceKey::Text(s.clone())),
            Primitive::Int(i) => Some(InstanceKey::Int(*i)),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Null => write!(f, "null"),
            Primitive::Bool(b) => write!(f, "{b}"),
            Primitive::Int(i) => write!(f, "{i}"),
            Primitive::Float(x) => write!(f, "{x}"),
            Primitive::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// The key of a keyed node instance.
///
/// Text and integer keys never collide: `"1"` and `1` name different
/// instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceKey {
    Text(String),
    Int(i64),
}

impl InstanceKey {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InstanceKey::Text(s) => Some(s),
            InstanceKey::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            InstanceKey::Int(i) => Some(*i),
            InstanceKey::Text(_) => None,
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Text(s) => write!(f, "{s:?}"),
            InstanceKey::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for InstanceKey {
    fn from(value: &str) -> Self {
        InstanceKey::Text(value.to_string())
    }
}

impl From<String> for InstanceKey {
    fn from(value: String) -> Self {
        InstanceKey::Text(value)
    }
}

impl From<&String> for InstanceKey {
    fn from(value: &String) -> Self {
        InstanceKey::Text(value.clone())
    }
}

impl From<i64> for InstanceKey {
    fn from(value: i64) -> Self {
        InstanceKey::Int(value)
    }
}

impl From<i32> for InstanceKey {
    fn from(value: i32) -> Self {
        InstanceKey::Int(value.into())
    }
}

impl From<&InstanceKey> for InstanceKey {
    fn from(value: &InstanceKey) -> Self {
        value.clone()
    }
}

impl From<InstanceKey> for Value {
    fn from(value: InstanceKey) -> Self {
        match value {
            InstanceKey::Text(s) => Value::Text(s),
            InstanceKey::Int(i) => Value::Int(i),
        }
    }
}

impl PartialEq<&str> for InstanceKey {
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

impl PartialEq<i64> for InstanceKey {
    fn eq(&self, other: &i64) -> bool {
        self.as_int() == Some(*other)
    }
}

/// Coarse classification of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Primitive,
    List,
    Object,
    Node,
}

/// Plain nested data, optionally referencing live nodes.
///
/// # Value Types
///
/// - Leaf values: [`Value::Null`], [`Value::Bool`], [`Value::Int`],
///   [`Value::Float`], [`Value::Text`]
/// - Plain structures: [`Value::List`], [`Value::Object`]
/// - [`Value::Node`]: an existing node, attached by move when written
///
/// Objects use a `BTreeMap`, so iteration order (and therefore snapshot
/// order and change order during reconciliation) is the key order.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Node(Node),
}

impl Value {
    /// Creates an empty plain object
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// Creates an empty plain list
    pub fn list() -> Self {
        Value::List(Vec::new())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::List(_) => ValueKind::List,
            Value::Object(_) => ValueKind::Object,
            Value::Node(_) => ValueKind::Node,
            _ => ValueKind::Primitive,
        }
    }

    /// Returns true for values the engine stores as leaves.
    pub fn is_primitive(&self) -> bool {
        self.kind() == ValueKind::Primitive
    }

    /// Returns true for a plain (not yet wrapped) list.
    pub fn is_plain_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Returns true for a plain (not yet wrapped) object.
    pub fn is_plain_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Node(_) => "node",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Consumes the value, returning the node if it is one.
    pub fn into_node(self) -> Option<Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Looks up a property of a plain object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    /// The uniqueness key this value stands for (text or integer only).
    pub fn instance_key(&self) -> Option<InstanceKey> {
        match self {
            Value::Text(s) => Some(InstanceKey::Text(s.clone())),
            Value::Int(i) => Some(InstanceKey::Int(*i)),
            _ => None,
        }
    }

    /// Splits a leaf off as a [`Primitive`], handing structures back unchanged.
    pub(crate) fn into_primitive(self) -> std::result::Result<Primitive, Value> {
        match self {
            Value::Null => Ok(Primitive::Null),
            Value::Bool(b) => Ok(Primitive::Bool(b)),
            Value::Int(i) => Ok(Primitive::Int(i)),
            Value::Float(f) => Ok(Primitive::Float(f)),
            Value::Text(s) => Ok(Primitive::Text(s)),
            other => Err(other),
        }
    }

    /// Converts to JSON. Nodes are rendered through their current snapshot.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => Primitive::Float(*f).to_json(),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Node(node) => node
                .snapshot()
                .map(|snapshot| snapshot.to_json())
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Node(node) => write!(f, "node {}", node.id()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<Primitive> for Value {
    fn from(value: Primitive) -> Self {
        match value {
            Primitive::Null => Value::Null,
            Primitive::Bool(b) => Value::Bool(b),
            Primitive::Int(i) => Value::Int(i),
            Primitive::Float(f) => Value::Float(f),
            Primitive::Text(s) => Value::Text(s),
        }
    }
}

// Convenient From implementations for common types
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

/// Counts beyond `i64::MAX` fall back to a float.
impl From<usize> for Value {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(value as f64),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Node> for Value {
    fn from(value: Node) -> Self {
        Value::Node(value)
    }
}

impl From<&Node> for Value {
    fn from(value: &Node) -> Self {
        Value::Node(value.clone())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Object(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

// Direct comparisons with primitive types
impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        self.as_int() == Some(*other)
    }
}

impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        self.as_int() == Some(*other as i64)
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

impl PartialEq<f64> for Value {
    fn eq(&self, other: &f64) -> bool {
        matches!(self, Value::Float(f) if f == other)
    }
}
