//! Shardline Tests - Deterministic Simulation Testing for Shardline.
//!
//! This crate contains the DST (Deterministic Simulation Testing) and
//! integration tests for checkpoint coordination. Tests are organized by
//! type:
//!
//! ## Test Organization
//!
//! **DST Tests** (`*_dst.rs`): Deterministic simulation with fault injection
//! - `checkpoint_dst`: Multi-worker lease handoffs against a flaky ledger
//!
//! **Integration Tests** (`*_tests.rs`): Multi-component integration
//! - `checkpoint_tests`: End-to-end checkpointing through the public API
//!
//! **Support Modules**:
//! - `properties`: Fencing properties (`AcceptedFromNonOwner`, etc.)
//! - `scenarios`: Reusable test scenarios and ledger wrappers
//!
//! ## Naming Conventions
//!
//! - DST tests: `test_dst_<component>_<scenario>`
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;

// DST test modules (deterministic simulation with fault injection).
#[cfg(test)]
mod checkpoint_dst;


/// Installs a stderr-captured subscriber for test debugging.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
