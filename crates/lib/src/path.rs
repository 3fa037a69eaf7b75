//! Path segments and the location records returned by tree queries.
//!
//! A node's location is the `(parent, segment)` pair it is attached under; a
//! path is the sequence of segments from some ancestor down to a node. Paths
//! render as `/a/0/b`, with `/` denoting the root itself.

use std::fmt;

use crate::node::Node;

/// One step in a path: an object property or a list position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(key) => Some(key),
            PathSegment::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Key(_) => None,
            PathSegment::Index(index) => Some(*index),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{key}"),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Builds a `Vec<PathSegment>` from keys and indices.
///
/// ```
/// use canopy::{path, PathSegment};
///
/// let p = path!["todos", 1usize, "title"];
/// assert_eq!(p[1], PathSegment::Index(1));
/// ```
#[macro_export]
macro_rules! path {
    () => { Vec::<$crate::PathSegment>::new() };
    ($($segment:expr),+ $(,)?) => {
        vec![$($crate::PathSegment::from($segment)),+]
    };
}

/// Renders segments as a slash-separated string; the empty path is `/`.
pub fn format_path(segments: &[PathSegment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    segments.iter().fold(String::new(), |mut out, segment| {
        out.push('/');
        out.push_str(&segment.to_string());
        out
    })
}

/// A node's immediate location.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentPath {
    pub parent: Node,
    pub segment: PathSegment,
}

/// A node's location relative to the root of its tree.
///
/// `nodes` lists every node from the root down to (and including) the node
/// itself, so `nodes.len() == path.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RootPath {
    pub root: Node,
    pub path: Vec<PathSegment>,
    pub nodes: Vec<Node>,
}

impl RootPath {
    pub fn path_string(&self) -> String {
        format_path(&self.path)
    }
}
