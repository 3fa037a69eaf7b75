//! Error types for the Y-CRDT bridge.

use thiserror::Error;

/// Structured error types for node/CRDT synchronization.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A path from a change could not be followed on the other side
    #[error("Cannot resolve path '{path}' in the {side}")]
    PathUnresolved { side: &'static str, path: String },

    /// A path resolved to the wrong kind of container
    #[error("Expected a {expected} at '{path}'")]
    ShapeMismatch { path: String, expected: &'static str },

    /// The CRDT holds a value with no node representation
    #[error("Unsupported CRDT value: {kind}")]
    UnsupportedValue { kind: String },

    /// The CRDT emitted an event kind the bridge does not replay
    #[error("Unsupported CRDT event: {kind}")]
    UnsupportedEvent { kind: &'static str },

    /// The document is locked by another transaction
    #[error("Could not acquire a write transaction on the CRDT document")]
    TransactionUnavailable,
}

impl BridgeError {
    /// Check if this error means node and CRDT may have diverged
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            BridgeError::PathUnresolved { .. } | BridgeError::ShapeMismatch { .. }
        )
    }

    /// Check if this error reports data the bridge cannot represent
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            BridgeError::UnsupportedValue { .. } | BridgeError::UnsupportedEvent { .. }
        )
    }
}

// Conversion from BridgeError to the main Error type
impl From<BridgeError> for crate::Error {
    fn from(err: BridgeError) -> Self {
        crate::Error::Bridge(err)
    }
}
