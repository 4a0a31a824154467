//! Oracle boundary.
//!
//! This module handles:
//! - The adapter contract for the external truth-assertion service
//! - Callback messages delivered back to the market engine
//! - An in-process optimistic oracle for local runs and tests

pub mod local;
pub mod types;

pub use local::{LocalOracle, LocalOracleConfig};
pub use types::{AssertionId, AssertionRequest, OracleAdapter, OracleCallback};
