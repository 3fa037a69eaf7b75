//! Error types for typed node definitions and typed operations.

use thiserror::Error;

/// Structured error types for the type registry and node factory.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TypeError {
    /// A type with this tag is already registered
    #[error("Node type '{tag}' is already registered")]
    DuplicateType { tag: String },

    /// The builder declared a key property twice
    #[error("Node type '{tag}' already has key property '{existing}', cannot also use '{attempted}'")]
    DuplicateKey {
        tag: String,
        existing: String,
        attempted: String,
    },

    /// Two members share a name
    #[error("Node type '{tag}' already has a member named '{name}'")]
    DuplicateMember { tag: String, name: String },

    /// Typed construction needs object data
    #[error("Node type '{tag}' must be created from an object, got {kind}")]
    NotAnObject { tag: String, kind: &'static str },

    /// The data carries a different type tag
    #[error("Data tagged '{actual}' cannot create node type '{expected}'")]
    TagMismatch { expected: String, actual: String },

    /// The node is not an instance of this type
    #[error("Node is not an instance of type '{tag}'")]
    NotAnInstance { tag: String },

    /// No action, getter, computed or volatile with this name
    #[error("Node type '{tag}' has no {kind} named '{name}'")]
    UnknownMember {
        tag: String,
        kind: &'static str,
        name: String,
    },
}

impl TypeError {
    /// Check if this error reports a second type tag or a second key
    /// property, either of which would make instance identity ambiguous
    pub fn is_identity_violation(&self) -> bool {
        matches!(
            self,
            TypeError::DuplicateType { .. } | TypeError::DuplicateKey { .. }
        )
    }

    /// Check if this error comes from an invalid member declaration
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, TypeError::DuplicateMember { .. })
    }

    /// Check if this error reports data or a node of the wrong shape or type
    pub fn is_shape_violation(&self) -> bool {
        matches!(
            self,
            TypeError::NotAnObject { .. }
                | TypeError::TagMismatch { .. }
                | TypeError::NotAnInstance { .. }
        )
    }

    /// Check if this error indicates a missing member
    pub fn is_not_found(&self) -> bool {
        matches!(self, TypeError::UnknownMember { .. })
    }

    /// Get the type tag this error concerns
    pub fn tag(&self) -> &str {
        match self {
            TypeError::DuplicateType { tag }
            | TypeError::DuplicateKey { tag, .. }
            | TypeError::DuplicateMember { tag, .. }
            | TypeError::NotAnObject { tag, .. }
            | TypeError::NotAnInstance { tag }
            | TypeError::UnknownMember { tag, .. } => tag,
            TypeError::TagMismatch { expected, .. } => expected,
        }
    }
}

// Conversion from TypeError to the main Error type
impl From<TypeError> for crate::Error {
    fn from(err: TypeError) -> Self {
        crate::Error::Type(err)
    }
}
