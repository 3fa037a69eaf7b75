//! Constants used throughout the canopy library.
//!
//! Reserved property names and defaults shared by the node engine, the type
//! registry and the CRDT bridge.

/// Reserved property holding a typed node's type tag.
pub const TYPE_PROP: &str = "$$type";

/// Number of uuid hex characters used for the per-forest key prefix.
pub const KEY_PREFIX_LEN: usize = 8;

/// Upper bound on reaction runs within a single settle cycle.
///
/// A reaction that keeps invalidating its own dependencies would otherwise
/// never settle.
pub const MAX_REACTION_RUNS: usize = 10_000;
