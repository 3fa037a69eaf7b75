/*! Integration tests for Canopy.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - node: Tests for wrapping, mutation, parentage and tree queries
 * - snapshot: Tests for snapshot caching, structural sharing and listeners
 * - types: Tests for typed nodes, keyed instances and their members
 * - reconcile: Tests for applying snapshots onto existing trees
 * - bridge: Tests for the Y-CRDT binding in both directions
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("canopy=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(feature = "y-crdt")]
mod bridge;
mod helpers;
mod node;
mod snapshot;
mod types;
