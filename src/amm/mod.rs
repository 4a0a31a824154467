//! Embedded constant-product venue for outcome claims.
//!
//! Reserves are virtual: they price trades but are independent of claim
//! supply. Every claim the venue hands out is minted against collateral
//! deposited in the same call.

pub mod pricing;

pub use pricing::{bps_to_decimal, fee_for, probability_bps, swap, SwapQuote, BPS_DENOMINATOR};
