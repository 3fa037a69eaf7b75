//!
//! Canopy: a reactive tree state container.
//! This library turns plain nested data into a tree of observable nodes with cached immutable snapshots.
//!
//! ## Core Concepts
//!
//! Canopy is built around several key concepts:
//!
//! * **Forests (`forest::Forest`)**: The owner of every node, the reactive runtime and the type registry. All operations go through a forest.
//! * **Nodes (`node::Node`)**: Handles to objects and lists in the tree. Every node has at most one parent; attaching it a second time is an error.
//! * **Snapshots (`snapshot::Snapshot`)**: Immutable, structurally shared views of a node. A snapshot is only rebuilt along the path that changed.
//! * **Node types (`types::NodeType`)**: Registered tags with defaults, actions, getters, memoized computeds, volatile state, init hooks and an optional key property. Keyed instances are unique per (tag, key).
//! * **Reconciliation (`Forest::apply_snapshot`)**: Minimal-change merging of plain data into an existing tree, reusing keyed nodes.
//! * **Y-CRDT bridge (`bridge::bind_yjs`)**: Two-way sync between a node tree and a `yrs` document (requires the "y-crdt" feature).
//!
//! ```
//! use canopy::Forest;
//! use serde_json::json;
//!
//! let forest = Forest::new();
//! let todos = forest.wrap(json!({ "items": [{ "title": "write docs", "done": false }] })).unwrap();
//!
//! let before = todos.snapshot().unwrap();
//! todos.child("items").unwrap().child_at(0).unwrap().set("done", true).unwrap();
//! let after = todos.snapshot().unwrap();
//!
//! assert_eq!(before, json!({ "items": [{ "title": "write docs", "done": false }] }));
//! assert_eq!(after, json!({ "items": [{ "title": "write docs", "done": true }] }));
//! ```

#[cfg(feature = "y-crdt")]
pub mod bridge;
pub mod config;
pub mod constants;
pub mod disposer;
pub mod forest;
pub mod node;
pub mod path;
pub(crate) mod reactive;
pub mod reconcile;
pub mod snapshot;
pub mod types;
pub mod value;

pub use config::{ConfigOverride, ForestConfig, KeyGenerator};
pub use disposer::Disposer;
pub use forest::{Forest, WeakForest};
pub use node::{Change, ChangeEvent, ChangeKind, CloneOptions, FoundParent, Node, NodeError, NodeId, WalkMode};
pub use path::{ParentPath, PathSegment, RootPath, format_path};
pub use reconcile::ReconcileError;
pub use snapshot::{Snapshot, SnapshotTarget};
pub use types::{ComputedOptions, NodeType, NodeTypeBuilder, TypeAndKey, TypeError};
pub use value::{InstanceKey, Primitive, Value, ValueKind};

#[cfg(feature = "y-crdt")]
pub use bridge::{Binding, BridgeError, YRoot, bind_yjs};

/// Y-CRDT types re-exported for convenience when the "y-crdt" feature is enabled.
///
/// This module re-exports the `yrs` crate so that client code binding a
/// document doesn't need to add `yrs` as a separate dependency.
#[cfg(feature = "y-crdt")]
pub mod y_crdt {
    pub use yrs::*;
}

/// Result type used throughout the Canopy library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Canopy library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured node errors from the node module
    #[error(transparent)]
    Node(node::NodeError),

    /// Structured type registry errors from the types module
    #[error(transparent)]
    Type(types::TypeError),

    /// Structured reconciliation errors from the reconcile module
    #[error(transparent)]
    Reconcile(reconcile::ReconcileError),

    /// Structured synchronization errors from the bridge module
    #[cfg(feature = "y-crdt")]
    #[error(transparent)]
    Bridge(bridge::BridgeError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Serialize(_) => "serialize",
            Error::Node(_) => "node",
            Error::Type(_) => "types",
            Error::Reconcile(_) => "reconcile",
            #[cfg(feature = "y-crdt")]
            Error::Bridge(_) => "bridge",
        }
    }

    /// Check if this error breaks node identity (single parent, no cycles,
    /// fixed type tag and key) or type identity (one definition per tag).
    pub fn is_identity_violation(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_identity_violation(),
            Error::Type(type_err) => type_err.is_identity_violation(),
            Error::Reconcile(reconcile_err) => reconcile_err.is_identity_violation(),
            _ => false,
        }
    }

    /// Check if this error indicates data of the wrong kind for the operation.
    pub fn is_shape_violation(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_shape_violation(),
            Error::Type(type_err) => type_err.is_shape_violation(),
            Error::Reconcile(reconcile_err) => reconcile_err.is_shape_violation(),
            _ => false,
        }
    }

    /// Check if this error came from applying a snapshot.
    pub fn is_reconciliation_error(&self) -> bool {
        matches!(self, Error::Reconcile(_))
    }

    /// Check if this error indicates invalid configuration or member declarations.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Error::Serialize(_) => true,
            Error::Node(node_err) => node_err.is_configuration_error(),
            Error::Type(type_err) => type_err.is_configuration_error(),
            _ => false,
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_not_found(),
            Error::Type(type_err) => type_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is type registry-related.
    pub fn is_type_error(&self) -> bool {
        matches!(self, Error::Type(_))
    }

    /// Check if this error is bridge-related.
    pub fn is_bridge_error(&self) -> bool {
        #[cfg(feature = "y-crdt")]
        if matches!(self, Error::Bridge(_)) {
            return true;
        }
        false
    }
}
