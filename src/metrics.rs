//! Prometheus metrics for market activity and engine latency.
//!
//! This module provides metrics for:
//! - Market creation and collateral flows
//! - Assertion lifecycle (submitted, disputed, overturned, resolved)
//! - Settlements and venue trades
//! - Engine operation latency

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Engine operation latency metric name.
pub const METRIC_OPERATION_LATENCY: &str = "engine_operation_latency_ms";
/// Markets created counter metric name.
pub const METRIC_MARKETS_CREATED: &str = "markets_created_total";
/// Collateral minted counter metric name.
pub const METRIC_COLLATERAL_MINTED: &str = "collateral_minted_total";
/// Assertions submitted counter metric name.
pub const METRIC_ASSERTIONS_SUBMITTED: &str = "assertions_submitted_total";
/// Assertions disputed counter metric name.
pub const METRIC_ASSERTIONS_DISPUTED: &str = "assertions_disputed_total";
/// Assertions overturned counter metric name.
pub const METRIC_ASSERTIONS_OVERTURNED: &str = "assertions_overturned_total";
/// Markets resolved counter metric name.
pub const METRIC_MARKETS_RESOLVED: &str = "markets_resolved_total";
/// Settlements counter metric name.
pub const METRIC_SETTLEMENTS: &str = "settlements_total";
/// Collateral paid out counter metric name.
pub const METRIC_COLLATERAL_PAID_OUT: &str = "collateral_paid_out_total";
/// Venue trades counter metric name.
pub const METRIC_AMM_TRADES: &str = "amm_trades_total";
/// Rejected oracle callbacks counter metric name.
pub const METRIC_CALLBACKS_REJECTED: &str = "oracle_callbacks_rejected_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_OPERATION_LATENCY,
        "Market engine operation latency in milliseconds"
    );

    describe_counter!(METRIC_MARKETS_CREATED, "Total number of markets created");
    describe_counter!(
        METRIC_COLLATERAL_MINTED,
        "Total collateral locked through minting and venue buys"
    );
    describe_counter!(
        METRIC_ASSERTIONS_SUBMITTED,
        "Total number of assertions submitted to the oracle"
    );
    describe_counter!(
        METRIC_ASSERTIONS_DISPUTED,
        "Total number of dispute notifications received"
    );
    describe_counter!(
        METRIC_ASSERTIONS_OVERTURNED,
        "Total number of assertions resolved as untruthful"
    );
    describe_counter!(METRIC_MARKETS_RESOLVED, "Total number of markets resolved");
    describe_counter!(METRIC_SETTLEMENTS, "Total number of settlements");
    describe_counter!(
        METRIC_COLLATERAL_PAID_OUT,
        "Total collateral paid out by settlement"
    );
    describe_counter!(METRIC_AMM_TRADES, "Total number of venue trades");
    describe_counter!(
        METRIC_CALLBACKS_REJECTED,
        "Total number of oracle callbacks rejected"
    );

    debug!("Metrics initialized");
}

/// Increment markets created counter.
pub fn inc_markets_created() {
    counter!(METRIC_MARKETS_CREATED).increment(1);
}

/// Add to the collateral minted counter.
pub fn add_collateral_minted(amount: u128) {
    counter!(METRIC_COLLATERAL_MINTED).increment(saturate(amount));
}

/// Increment assertions submitted counter.
pub fn inc_assertions_submitted() {
    counter!(METRIC_ASSERTIONS_SUBMITTED).increment(1);
}

/// Increment assertions disputed counter.
pub fn inc_assertions_disputed() {
    counter!(METRIC_ASSERTIONS_DISPUTED).increment(1);
}

/// Increment assertions overturned counter.
pub fn inc_assertions_overturned() {
    counter!(METRIC_ASSERTIONS_OVERTURNED).increment(1);
}

/// Increment markets resolved counter.
pub fn inc_markets_resolved() {
    counter!(METRIC_MARKETS_RESOLVED).increment(1);
}

/// Record one settlement and its payout.
pub fn record_settlement(payout: u128) {
    counter!(METRIC_SETTLEMENTS).increment(1);
    counter!(METRIC_COLLATERAL_PAID_OUT).increment(saturate(payout));
}

/// Increment venue trades counter.
pub fn inc_amm_trades() {
    counter!(METRIC_AMM_TRADES).increment(1);
}

/// Increment rejected callbacks counter.
pub fn inc_callbacks_rejected(reason: &'static str) {
    counter!(METRIC_CALLBACKS_REJECTED, "reason" => reason).increment(1);
}

fn saturate(amount: u128) -> u64 {
    u64::try_from(amount).unwrap_or(u64::MAX)
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    operation: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given engine operation.
    pub fn new(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_OPERATION_LATENCY, "operation" => self.operation).record(latency_ms);
    }
}

/// Create a latency timer for an engine operation.
pub fn timer_operation(operation: &'static str) -> LatencyTimer {
    LatencyTimer::new(operation)
}
