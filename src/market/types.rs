//! Market records and outcome types.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ledger::ClaimId;
use crate::oracle::AssertionId;

/// Reserved label asserting that neither outcome can be determined.
pub const UNRESOLVABLE: &str = "Unresolvable";

/// Market identifier derived from creation inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketId(pub B256);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MarketId {
    type Err = <B256 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s).map(MarketId)
    }
}

/// One of the two claim ledgers of a market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    /// Claims on the first outcome label.
    First,
    /// Claims on the second outcome label.
    Second,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }
}

/// Outcome fixed by an assertion and, once upheld, by resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Outcome {
    /// The first label is true.
    First,
    /// The second label is true.
    Second,
    /// Neither label can be determined.
    Unresolvable,
}

impl Outcome {
    /// Ledger that pays out alone, if any.
    pub fn winning_side(&self) -> Option<Side> {
        match self {
            Outcome::First => Some(Side::First),
            Outcome::Second => Some(Side::Second),
            Outcome::Unresolvable => None,
        }
    }
}

/// Lifecycle state of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MarketState {
    /// No assertion in flight.
    Open,
    /// One assertion awaiting the oracle.
    Asserted,
    /// Outcome final; holders may settle.
    Resolved,
}

/// Engine-owned record of one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    /// Unique market identifier.
    pub id: MarketId,
    /// Account that created and funded the market.
    pub creator: Address,
    /// Question text.
    pub description: String,
    /// First outcome label.
    pub outcome1: String,
    /// Second outcome label.
    pub outcome2: String,
    /// Ledger of first-outcome claims.
    pub claim1: ClaimId,
    /// Ledger of second-outcome claims.
    pub claim2: ClaimId,
    /// Reward paid to the asserter of the upheld outcome.
    pub reward: u128,
    /// Creator-specified minimum bond.
    pub required_bond: u128,
    /// Set exactly once; never cleared.
    pub resolved: bool,
    /// Hash of the asserted label, zero when no assertion is active.
    pub asserted_outcome_hash: B256,
    /// Tagged form of the asserted label.
    pub asserted_outcome: Option<Outcome>,
    /// Set at resolution when no winning claims exist; settlement then pays
    /// every outstanding claim pro rata so the pool cannot be stranded.
    pub pays_all_claims: bool,
    /// Assertion currently in flight.
    pub active_assertion: Option<AssertionId>,
    /// Collateral deposited minus collateral paid out.
    pub total_collateral: u128,
    /// Venue reserve of the first outcome.
    pub reserve1: u128,
    /// Venue reserve of the second outcome.
    pub reserve2: u128,
    /// Venue fees retained by the engine.
    pub fees_accrued: u128,
    /// Unix timestamp of creation.
    pub created_at: i64,
}

impl Market {
    /// Current lifecycle state.
    pub fn state(&self) -> MarketState {
        if self.resolved {
            MarketState::Resolved
        } else if self.active_assertion.is_some() {
            MarketState::Asserted
        } else {
            MarketState::Open
        }
    }

    /// Ledger handle for `side`.
    pub fn claim(&self, side: Side) -> ClaimId {
        match side {
            Side::First => self.claim1,
            Side::Second => self.claim2,
        }
    }

    /// Label of `outcome`.
    pub fn label(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::First => &self.outcome1,
            Outcome::Second => &self.outcome2,
            Outcome::Unresolvable => UNRESOLVABLE,
        }
    }

    /// Map an asserted label to an outcome by byte-exact comparison.
    pub fn parse_outcome(&self, label: &str) -> Option<Outcome> {
        if label == self.outcome1 {
            Some(Outcome::First)
        } else if label == self.outcome2 {
            Some(Outcome::Second)
        } else if label == UNRESOLVABLE {
            Some(Outcome::Unresolvable)
        } else {
            None
        }
    }

    /// Venue reserve of `side`.
    pub fn reserve(&self, side: Side) -> u128 {
        match side {
            Side::First => self.reserve1,
            Side::Second => self.reserve2,
        }
    }
}

/// Read-only view of a market for UIs and indexers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSnapshot {
    /// The market record.
    pub market: Market,
    /// Lifecycle state.
    pub state: MarketState,
    /// Outstanding first-outcome claims.
    pub claim1_supply: u128,
    /// Outstanding second-outcome claims.
    pub claim2_supply: u128,
}

/// Hash used to compare asserted labels.
pub fn outcome_hash(label: &str) -> B256 {
    keccak256(label.as_bytes())
}

/// Derive a market id from its creation inputs.
pub fn derive_market_id(description: &str, creator: &Address, nonce: u64, timestamp: i64) -> MarketId {
    let mut preimage = Vec::with_capacity(description.len() + 36);
    preimage.extend_from_slice(description.as_bytes());
    preimage.extend_from_slice(creator.as_slice());
    preimage.extend_from_slice(&nonce.to_be_bytes());
    preimage.extend_from_slice(&timestamp.to_be_bytes());
    MarketId(keccak256(&preimage))
}
