//! Claim ledgers.
//!
//! Each market owns two fungible ledgers, one per outcome. Only the market
//! engine mints and burns; holders move balances through transfers.

pub mod claim;

pub use claim::{ClaimId, ClaimLedger};
