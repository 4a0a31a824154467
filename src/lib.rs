//! Binary prediction market engine.
//!
//! Participants lock collateral to mint complementary claim pairs, an
//! optimistic oracle decides which claim is correct after a contestation
//! window, and holders redeem claims for a pro-rata share of the pool.
//!
//! # Lifecycle
//!
//! ```text
//! initialize ──► Open ──assert──► Asserted ──truthful──► Resolved ──► settle
//!                 ▲                   │
//!                 └────untruthful─────┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`ledger`]: Per-outcome claim ledgers
//! - [`auth`]: Caller authorization boundary
//! - [`treasury`]: Collateral custody boundary
//! - [`oracle`]: Oracle adapter contract and an in-process oracle
//! - [`amm`]: Constant-product pricing
//! - [`market`]: Market engine (lifecycle, settlement, venue)
//! - [`api`]: HTTP API for market state and metrics
//! - [`metrics`]: Prometheus metrics

pub mod amm;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod market;
pub mod metrics;
pub mod oracle;
pub mod treasury;

pub use config::Config;
pub use error::{MarketError, Result, ServiceError};
pub use market::{MarketEngine, MarketId, Outcome, Side};
