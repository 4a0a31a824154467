//! Embedded constant-product venue.
//!
//! Reserves are virtual: they start at the configured liquidity on both
//! sides and only set prices. Every claim the venue hands out is backed by
//! collateral paid in by the buyer, so settlement never sees an unbacked
//! claim.

use alloy::primitives::Address;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::engine::MarketEngine;
use super::types::{MarketId, Side};
use crate::amm::{bps_to_decimal, probability_bps, swap};
use crate::error::MarketError;
use crate::metrics;

/// Record of one venue purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trade {
    /// Market traded.
    pub market: MarketId,
    /// Buyer.
    pub trader: Address,
    /// Outcome bought.
    pub side: Side,
    /// Collateral paid, fee included.
    pub amount_in: u128,
    /// Fee retained by the engine.
    pub fee: u128,
    /// Claims received.
    pub amount_out: u128,
    /// First reserve after the trade.
    pub reserve1: u128,
    /// Second reserve after the trade.
    pub reserve2: u128,
}

impl MarketEngine {
    /// Buy claims on `side` for `input` collateral.
    ///
    /// The input goes into the opposite reserve and the output comes out of
    /// `side`'s reserve, raising the bought outcome's price. The fee share of
    /// the input is accrued separately; the rest joins the collateral pool.
    #[instrument(skip(self), fields(caller = %caller, market = %market_id))]
    pub fn buy(
        &mut self,
        caller: Address,
        market_id: MarketId,
        side: Side,
        input: u128,
        min_output: u128,
    ) -> Result<Trade, MarketError> {
        let _timer = metrics::timer_operation("buy");
        self.ensure_authorized(&caller)?;
        let market = self.market(&market_id)?;
        if market.resolved {
            return Err(MarketError::MarketResolved(market_id));
        }

        let quote = swap(
            market.reserve(side.opposite()),
            market.reserve(side),
            input,
            self.config.amm_fee_bps,
        )?;
        if quote.amount_out == 0 || quote.amount_out < min_output {
            return Err(MarketError::InsufficientOutput {
                output: quote.amount_out,
                minimum: min_output,
            });
        }

        let collateral = market
            .total_collateral
            .checked_add(input - quote.fee)
            .ok_or(MarketError::ArithmeticOverflow)?;
        let fees = market
            .fees_accrued
            .checked_add(quote.fee)
            .ok_or(MarketError::ArithmeticOverflow)?;
        let claim = market.claim(side);
        self.ledger(claim)
            .total_supply()
            .checked_add(quote.amount_out)
            .ok_or(MarketError::ArithmeticOverflow)?;

        self.treasury.pull(caller, input)?;
        self.ledger_mut(claim).mint(caller, quote.amount_out)?;

        let market = self.market_mut(&market_id)?;
        match side {
            Side::First => {
                market.reserve1 = quote.reserve_out;
                market.reserve2 = quote.reserve_in;
            }
            Side::Second => {
                market.reserve1 = quote.reserve_in;
                market.reserve2 = quote.reserve_out;
            }
        }
        market.total_collateral = collateral;
        market.fees_accrued = fees;
        let (reserve1, reserve2) = (market.reserve1, market.reserve2);

        metrics::inc_amm_trades();
        metrics::add_collateral_minted(input - quote.fee);
        debug!(%side, input, fee = quote.fee, output = quote.amount_out, reserve1, reserve2, "venue buy");
        Ok(Trade {
            market: market_id,
            trader: caller,
            side,
            amount_in: input,
            fee: quote.fee,
            amount_out: quote.amount_out,
            reserve1,
            reserve2,
        })
    }

    /// Implied probabilities of (first, second) in basis points.
    pub fn get_probability(&self, market_id: &MarketId) -> Result<(u32, u32), MarketError> {
        let market = self.market(market_id)?;
        probability_bps(market.reserve1, market.reserve2)
    }

    /// Implied probabilities as decimal fractions.
    pub fn implied_prices(&self, market_id: &MarketId) -> Result<(Decimal, Decimal), MarketError> {
        let (p1, p2) = self.get_probability(market_id)?;
        Ok((bps_to_decimal(p1), bps_to_decimal(p2)))
    }

    /// Raw venue reserves.
    pub fn get_reserves(&self, market_id: &MarketId) -> Result<(u128, u128), MarketError> {
        let market = self.market(market_id)?;
        Ok((market.reserve1, market.reserve2))
    }
}
