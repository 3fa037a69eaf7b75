//! Typed node integration tests
//!
//! Registration, keyed instances, members and init hooks.

mod members_tests;
mod registry_tests;
