//! Oracle adapter contract and message types.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256};

use crate::error::OracleError;

/// Oracle-issued handle for a submitted assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssertionId(pub B256);

impl fmt::Display for AssertionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssertionId {
    type Err = <B256 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s).map(AssertionId)
    }
}

/// Everything the oracle needs to open an assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionRequest {
    /// Human-readable claim being asserted.
    pub claim: String,
    /// Receives the bond back if the assertion stands.
    pub asserter: Address,
    /// Where resolution callbacks are delivered.
    pub callback_target: Address,
    /// Contestation window in seconds.
    pub liveness_seconds: u64,
    /// Bond currency symbol.
    pub currency: String,
    /// Bond posted by the asserter.
    pub bond: u128,
    /// Reward the market pays the asserter on a truthful resolution.
    pub reward: u128,
    /// Price identifier understood by the oracle.
    pub identifier: String,
}

/// Inbound notification from the oracle to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleCallback {
    /// The assertion finalized.
    Resolved {
        /// Finalized assertion.
        assertion: AssertionId,
        /// Whether the asserted claim was upheld.
        truthful: bool,
    },
    /// The assertion was disputed and awaits arbitration.
    Disputed {
        /// Disputed assertion.
        assertion: AssertionId,
    },
}

impl OracleCallback {
    /// Assertion this message refers to.
    pub fn assertion(&self) -> AssertionId {
        match self {
            OracleCallback::Resolved { assertion, .. } => *assertion,
            OracleCallback::Disputed { assertion } => *assertion,
        }
    }
}

/// Client side of the external truth-assertion service.
///
/// Submission is fire-and-forget: the outcome arrives later as an
/// [`OracleCallback`] delivered to the engine by whoever drives the oracle.
pub trait OracleAdapter: Send + Sync {
    /// Address callbacks originate from.
    fn address(&self) -> Address;

    /// Minimum bond the oracle accepts in `currency`.
    fn quote_minimum_bond(&self, currency: &str) -> Result<u128, OracleError>;

    /// Open an assertion and return its handle.
    fn submit_assertion(&self, request: AssertionRequest) -> Result<AssertionId, OracleError>;
}
