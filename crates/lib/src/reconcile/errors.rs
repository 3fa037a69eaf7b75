//! Error types for snapshot application and reconciliation.

use thiserror::Error;

/// Structured error types for reconciliation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Applying the data would change the node's type tag or key
    #[error("Cannot change '{field}' of an existing node from {from} to {to}")]
    IdentityChange {
        field: String,
        from: String,
        to: String,
    },

    /// The data's shape does not match the node (object vs list)
    #[error("Cannot apply {actual} data to a {expected} node")]
    ShapeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

impl ReconcileError {
    /// Check if this error reports an attempted identity change
    pub fn is_identity_violation(&self) -> bool {
        matches!(self, ReconcileError::IdentityChange { .. })
    }

    /// Check if this error reports mismatched shapes
    pub fn is_shape_violation(&self) -> bool {
        matches!(self, ReconcileError::ShapeMismatch { .. })
    }
}

// Conversion from ReconcileError to the main Error type
impl From<ReconcileError> for crate::Error {
    fn from(err: ReconcileError) -> Self {
        crate::Error::Reconcile(err)
    }
}
