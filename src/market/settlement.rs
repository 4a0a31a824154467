//! Settlement payouts after resolution.

use alloy::primitives::{Address, U256};
use tracing::{error, info, instrument};

use super::engine::MarketEngine;
use super::types::{MarketId, Outcome, Side};
use crate::error::MarketError;
use crate::ledger::ClaimId;
use crate::metrics;

/// Record of one completed settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// Settled market.
    pub market: MarketId,
    /// Holder that was paid.
    pub holder: Address,
    /// Outcome the payout was computed for.
    pub outcome: Outcome,
    /// First-outcome claims burned.
    pub burned1: u128,
    /// Second-outcome claims burned.
    pub burned2: u128,
    /// Collateral paid to the holder.
    pub payout: u128,
}

impl MarketEngine {
    /// Redeem the caller's eligible claims for their share of collateral.
    ///
    /// Open to any holder. When one outcome won, only its ledger pays, pro
    /// rata over that ledger's supply. An unresolvable market, or one whose
    /// winning ledger was empty at resolution, pays both ledgers pro rata
    /// over their combined supply. Division rounds down, so at most the
    /// remainder stays behind in the pool per call.
    #[instrument(skip(self), fields(caller = %caller, market = %market_id))]
    pub fn settle(&mut self, caller: Address, market_id: MarketId) -> Result<Settlement, MarketError> {
        let _timer = metrics::timer_operation("settle");
        let market = self.market(&market_id)?;
        if !market.resolved {
            return Err(MarketError::MarketNotResolved(market_id));
        }
        let outcome = market.asserted_outcome.unwrap_or(Outcome::Unresolvable);
        let collateral = market.total_collateral;

        let paying_side = if market.pays_all_claims {
            None
        } else {
            outcome.winning_side()
        };

        let (burned1, burned2, payout) = match paying_side {
            Some(side) => {
                let ledger = self.ledger(market.claim(side));
                let balance = ledger.balance_of(&caller);
                if balance == 0 {
                    return Err(MarketError::NothingToSettle {
                        market: market_id,
                        holder: caller,
                    });
                }
                let payout = mul_div(balance, collateral, ledger.total_supply())?;
                match side {
                    Side::First => (balance, 0, payout),
                    Side::Second => (0, balance, payout),
                }
            }
            None => {
                let (first, second) = (self.ledger(market.claim1), self.ledger(market.claim2));
                let (b1, b2) = (first.balance_of(&caller), second.balance_of(&caller));
                let combined = b1.checked_add(b2).ok_or(MarketError::ArithmeticOverflow)?;
                if combined == 0 {
                    return Err(MarketError::NothingToSettle {
                        market: market_id,
                        holder: caller,
                    });
                }
                let supply = first
                    .total_supply()
                    .checked_add(second.total_supply())
                    .ok_or(MarketError::ArithmeticOverflow)?;
                (b1, b2, mul_div(combined, collateral, supply)?)
            }
        };

        let remaining = match collateral.checked_sub(payout) {
            Some(remaining) => remaining,
            None => {
                error!(payout, collateral, "settlement would overdraw collateral");
                return Err(MarketError::CollateralUnderflow {
                    market: market_id,
                    payout,
                    available: collateral,
                });
            }
        };
        let (claim1, claim2) = (market.claim1, market.claim2);

        // burn and decrement before any value leaves custody
        self.burn_if_any(claim1, caller, burned1)?;
        self.burn_if_any(claim2, caller, burned2)?;
        self.market_mut(&market_id)?.total_collateral = remaining;

        if payout > 0 {
            if let Err(e) = self.treasury.push(caller, payout) {
                error!(error = %e, payout, "payout failed, settlement rolled back");
                self.restore(claim1, caller, burned1)?;
                self.restore(claim2, caller, burned2)?;
                self.market_mut(&market_id)?.total_collateral = collateral;
                return Err(e.into());
            }
        }

        metrics::record_settlement(payout);
        info!(%outcome, burned1, burned2, payout, remaining, "claims settled");
        Ok(Settlement {
            market: market_id,
            holder: caller,
            outcome,
            burned1,
            burned2,
            payout,
        })
    }

    fn burn_if_any(&mut self, claim: ClaimId, holder: Address, amount: u128) -> Result<(), MarketError> {
        if amount > 0 {
            self.ledger_mut(claim).burn(holder, amount)?;
        }
        Ok(())
    }

    fn restore(&mut self, claim: ClaimId, holder: Address, amount: u128) -> Result<(), MarketError> {
        if amount > 0 {
            self.ledger_mut(claim).mint(holder, amount)?;
        }
        Ok(())
    }
}

/// `floor(a * b / c)` without intermediate overflow.
fn mul_div(a: u128, b: u128, c: u128) -> Result<u128, MarketError> {
    if c == 0 {
        return Err(MarketError::ArithmeticOverflow);
    }
    let quotient = U256::from(a) * U256::from(b) / U256::from(c);
    u128::try_from(quotient).map_err(|_| MarketError::ArithmeticOverflow)
}
