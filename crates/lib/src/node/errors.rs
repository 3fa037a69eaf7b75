//! Error types for node graph operations.

use thiserror::Error;

/// Structured error types for the node engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodeError {
    /// Only lists and objects become nodes
    #[error("Cannot wrap a {kind} value: only lists and objects can become nodes")]
    NotAContainer { kind: &'static str },

    /// The handle does not belong to this forest or its node is gone
    #[error("Value is not a live node of this forest")]
    NotANode,

    /// The owning forest has been dropped
    #[error("The forest owning this node no longer exists")]
    ForestDropped,

    /// A node may only have one parent
    #[error(
        "Cannot attach node at '{attempted}': it already exists in the tree at '{existing}'"
    )]
    AlreadyAttached { attempted: String, existing: String },

    /// Attaching would make a node its own ancestor
    #[error("Cannot attach node at '{path}': the node is an ancestor of that location")]
    Cycle { path: String },

    /// A write would change the type tag or key of a live typed node
    #[error("Cannot change '{field}' of a live typed node from {from} to {to}")]
    IdentityChange {
        field: String,
        from: String,
        to: String,
    },

    /// Object operation on a list, or list operation on an object
    #[error("Expected {expected} node, found {actual}")]
    WrongKind {
        expected: &'static str,
        actual: &'static str,
    },

    /// List index beyond the end of the list
    #[error("Index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Strict mode forbids mutations outside actions
    #[error("Nodes cannot be modified outside of an action while actions are enforced")]
    OutsideAction,
}

impl NodeError {
    /// Check if this error reports a single-parent, cycle or identity violation
    pub fn is_identity_violation(&self) -> bool {
        matches!(
            self,
            NodeError::AlreadyAttached { .. }
                | NodeError::Cycle { .. }
                | NodeError::IdentityChange { .. }
        )
    }

    /// Check if this error reports a value of the wrong shape, including a
    /// value that is not a live node of this forest
    pub fn is_shape_violation(&self) -> bool {
        matches!(
            self,
            NodeError::NotAContainer { .. } | NodeError::WrongKind { .. } | NodeError::NotANode
        )
    }

    /// Check if this error indicates a missing forest or element
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NodeError::ForestDropped | NodeError::IndexOutOfBounds { .. }
        )
    }

    /// Check if this error comes from forest configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, NodeError::OutsideAction)
    }
}

// Conversion from NodeError to the main Error type
impl From<NodeError> for crate::Error {
    fn from(err: NodeError) -> Self {
        crate::Error::Node(err)
    }
}
