//! Constant-product swap math.

use rust_decimal::Decimal;
use tracing::instrument;

use crate::error::MarketError;

/// 100% in basis points.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Result of pricing a swap against a reserve pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    /// Amount paid in, fee included.
    pub amount_in: u128,
    /// Fee carved out of the paid-in amount.
    pub fee: u128,
    /// Amount released from the output reserve.
    pub amount_out: u128,
    /// Input-side reserve after the swap.
    pub reserve_in: u128,
    /// Output-side reserve after the swap.
    pub reserve_out: u128,
}

/// Price a swap of `amount_in` into `reserve_in` for output drawn from
/// `reserve_out`.
///
/// The fee is deducted before pricing but the full `amount_in` lands in the
/// input reserve, so `reserve_in * reserve_out` never decreases. The output
/// reserve is rounded up, which rounds the output down.
#[instrument(level = "trace")]
pub fn swap(
    reserve_in: u128,
    reserve_out: u128,
    amount_in: u128,
    fee_bps: u32,
) -> Result<SwapQuote, MarketError> {
    if amount_in == 0 {
        return Err(MarketError::ZeroAmount);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(MarketError::InsufficientLiquidity {
            required: 1,
            available: 0,
        });
    }

    let fee = fee_for(amount_in, fee_bps)?;
    let net_in = amount_in - fee;

    let k = reserve_in
        .checked_mul(reserve_out)
        .ok_or(MarketError::ArithmeticOverflow)?;
    let priced_in = reserve_in
        .checked_add(net_in)
        .ok_or(MarketError::ArithmeticOverflow)?;
    let new_out = k.div_ceil(priced_in);
    let amount_out = reserve_out - new_out;

    let new_in = reserve_in
        .checked_add(amount_in)
        .ok_or(MarketError::ArithmeticOverflow)?;

    Ok(SwapQuote {
        amount_in,
        fee,
        amount_out,
        reserve_in: new_in,
        reserve_out: new_out,
    })
}

/// Fee on `amount` at `fee_bps`, rounded down.
pub fn fee_for(amount: u128, fee_bps: u32) -> Result<u128, MarketError> {
    let fee_bps = u128::from(fee_bps).min(BPS_DENOMINATOR);
    amount
        .checked_mul(fee_bps)
        .map(|scaled| scaled / BPS_DENOMINATOR)
        .ok_or(MarketError::ArithmeticOverflow)
}

/// Implied probabilities of (first, second) in basis points.
///
/// The first outcome's price is proportional to the second reserve. The
/// first value is rounded half-up and the second is its complement, so the
/// pair always sums to 10000.
pub fn probability_bps(reserve1: u128, reserve2: u128) -> Result<(u32, u32), MarketError> {
    let total = reserve1
        .checked_add(reserve2)
        .ok_or(MarketError::ArithmeticOverflow)?;
    if total == 0 {
        return Ok((5_000, 5_000));
    }

    let doubled = reserve2
        .checked_mul(2 * BPS_DENOMINATOR)
        .and_then(|n| n.checked_add(total))
        .ok_or(MarketError::ArithmeticOverflow)?;
    let denominator = total
        .checked_mul(2)
        .ok_or(MarketError::ArithmeticOverflow)?;
    // bounded by BPS_DENOMINATOR
    let p1 = (doubled / denominator) as u32;
    Ok((p1, BPS_DENOMINATOR as u32 - p1))
}

/// Convert basis points to a decimal fraction (6250 -> 0.6250).
pub fn bps_to_decimal(bps: u32) -> Decimal {
    Decimal::new(i64::from(bps), 4)
}
