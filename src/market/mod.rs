//! Market engine for binary-outcome markets.
//!
//! This module handles:
//! - Market records, outcome types and id derivation
//! - The lifecycle state machine (create, mint, assert, resolve)
//! - Settlement payouts
//! - The embedded constant-product venue

pub mod engine;
pub mod resolution;
pub mod settlement;
pub mod trading;
pub mod types;

pub use engine::{EngineConfig, MarketEngine};
pub use settlement::Settlement;
pub use trading::Trade;
pub use types::{
    derive_market_id, outcome_hash, Market, MarketId, MarketSnapshot, MarketState, Outcome, Side,
    UNRESOLVABLE,
};
