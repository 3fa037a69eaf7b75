//! Node engine integration tests
//!
//! Wrapping, mutation primitives, change events, parentage and tree queries.

mod tree_tests;
