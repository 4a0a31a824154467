//! Assertion submission and oracle callbacks.
//!
//! A market moves `Open -> Asserted` on [`MarketEngine::assert_outcome`].
//! The oracle answers later through [`MarketEngine::on_resolved`]: a truthful
//! answer makes the market `Resolved` for good, an untruthful one returns it
//! to `Open`. Each assertion handle is consumed by its resolution callback.

use alloy::primitives::{Address, B256};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::engine::{MarketEngine, PendingAssertion};
use super::types::{outcome_hash, MarketId};
use crate::error::MarketError;
use crate::metrics;
use crate::oracle::{AssertionId, AssertionRequest, OracleCallback};

impl MarketEngine {
    /// Assert that `label` is the market's outcome.
    ///
    /// Pulls the effective bond (the larger of the market's required bond and
    /// the oracle's quoted minimum) from the caller and forwards it to the
    /// oracle, which returns it to the caller if the assertion stands.
    /// Oracle failures propagate, the bond comes back, and the market is
    /// left untouched.
    #[instrument(skip(self), fields(caller = %caller, market = %market_id))]
    pub fn assert_outcome(
        &mut self,
        caller: Address,
        market_id: MarketId,
        label: &str,
    ) -> Result<AssertionId, MarketError> {
        let _timer = metrics::timer_operation("assert");
        self.ensure_authorized(&caller)?;
        let market = self.market(&market_id)?;
        if market.resolved {
            return Err(MarketError::MarketResolved(market_id));
        }
        if let Some(assertion) = market.active_assertion {
            return Err(MarketError::ActiveAssertionExists {
                market: market_id,
                assertion,
            });
        }
        let outcome = market
            .parse_outcome(label)
            .ok_or_else(|| MarketError::InvalidOutcome(label.to_string()))?;

        let minimum = self.oracle.quote_minimum_bond(&self.config.bond_currency)?;
        let bond = market.required_bond.max(minimum);
        let request = AssertionRequest {
            claim: claim_text(label, &market.description),
            asserter: caller,
            callback_target: self.config.address,
            liveness_seconds: self.config.liveness_seconds,
            currency: self.config.bond_currency.clone(),
            bond,
            reward: market.reward,
            identifier: self.config.identifier.clone(),
        };

        // the bond reaches the oracle before the assertion exists there
        if bond > 0 {
            self.treasury.pull(caller, bond)?;
            if let Err(e) = self.treasury.push(self.oracle.address(), bond) {
                error!(error = %e, bond, "failed to forward bond to oracle");
                self.refund(caller, bond)?;
                return Err(e.into());
            }
        }
        let assertion = match self.oracle.submit_assertion(request) {
            Ok(assertion) => assertion,
            Err(e) => {
                self.recall_bond(caller, bond)?;
                return Err(e.into());
            }
        };

        let market = self.market_mut(&market_id)?;
        market.active_assertion = Some(assertion);
        market.asserted_outcome = Some(outcome);
        market.asserted_outcome_hash = outcome_hash(label);
        self.assertions.insert(
            assertion,
            PendingAssertion {
                market: market_id,
                asserter: caller,
            },
        );

        metrics::inc_assertions_submitted();
        info!(%assertion, %outcome, bond, "assertion submitted");
        Ok(assertion)
    }

    /// Oracle callback: the assertion finalized.
    ///
    /// Truthful resolutions are terminal and pay the market reward to the
    /// asserter. Untruthful ones clear the assertion so a fresh one can be
    /// submitted by anyone authorized.
    #[instrument(skip(self), fields(caller = %caller, assertion = %assertion))]
    pub fn on_resolved(
        &mut self,
        caller: Address,
        assertion: AssertionId,
        truthful: bool,
    ) -> Result<(), MarketError> {
        let _timer = metrics::timer_operation("on_resolved");
        self.ensure_oracle(&caller)?;
        let pending = self.pending(&assertion)?.clone();
        let market = self.market(&pending.market)?;
        if market.resolved || market.active_assertion != Some(assertion) {
            // stale handle; never double-apply
            metrics::inc_callbacks_rejected("stale");
            return Err(MarketError::UnknownAssertion(assertion));
        }
        let reward = market.reward;
        let unclaimed = market
            .asserted_outcome
            .and_then(|outcome| outcome.winning_side())
            .is_some_and(|side| self.ledger(market.claim(side)).total_supply() == 0);

        self.assertions.remove(&assertion);
        let market = self.market_mut(&pending.market)?;
        market.active_assertion = None;

        if !truthful {
            market.asserted_outcome = None;
            market.asserted_outcome_hash = B256::ZERO;
            metrics::inc_assertions_overturned();
            warn!(market = %pending.market, "assertion overturned, market reopened");
            return Ok(());
        }

        market.resolved = true;
        market.pays_all_claims = unclaimed;
        let outcome = market.asserted_outcome;
        if reward > 0 {
            if let Err(e) = self.treasury.push(pending.asserter, reward) {
                error!(error = %e, "reward payout failed, resolution rolled back");
                let market = self.market_mut(&pending.market)?;
                market.resolved = false;
                market.pays_all_claims = false;
                market.active_assertion = Some(assertion);
                self.assertions.insert(assertion, pending);
                return Err(e.into());
            }
        }

        if unclaimed {
            warn!(market = %pending.market, ?outcome, "no winning claims outstanding, every claim shares the pool");
        }
        metrics::inc_markets_resolved();
        info!(market = %pending.market, ?outcome, reward, asserter = %pending.asserter, "market resolved");
        Ok(())
    }

    /// Oracle callback: the assertion was disputed. Informational only.
    #[instrument(skip(self), fields(caller = %caller, assertion = %assertion))]
    pub fn on_disputed(&mut self, caller: Address, assertion: AssertionId) -> Result<(), MarketError> {
        self.ensure_oracle(&caller)?;
        let pending = self.pending(&assertion)?;
        metrics::inc_assertions_disputed();
        warn!(market = %pending.market, asserter = %pending.asserter, "assertion disputed");
        Ok(())
    }

    /// Dispatch an oracle callback message.
    pub fn handle_callback(&mut self, caller: Address, callback: OracleCallback) -> Result<(), MarketError> {
        match callback {
            OracleCallback::Resolved {
                assertion,
                truthful,
            } => self.on_resolved(caller, assertion, truthful),
            OracleCallback::Disputed { assertion } => self.on_disputed(caller, assertion),
        }
    }

    /// Market an in-flight assertion belongs to.
    pub fn assertion_market(&self, assertion: &AssertionId) -> Option<MarketId> {
        self.assertions.get(assertion).map(|p| p.market)
    }

    fn ensure_oracle(&self, caller: &Address) -> Result<(), MarketError> {
        if *caller == self.oracle.address() {
            Ok(())
        } else {
            metrics::inc_callbacks_rejected("only_oracle");
            warn!(%caller, "callback from non-oracle rejected");
            Err(MarketError::OnlyOracle { caller: *caller })
        }
    }

    fn pending(&self, assertion: &AssertionId) -> Result<&PendingAssertion, MarketError> {
        self.assertions.get(assertion).ok_or_else(|| {
            metrics::inc_callbacks_rejected("unknown");
            MarketError::UnknownAssertion(*assertion)
        })
    }

    fn refund(&self, to: Address, amount: u128) -> Result<(), MarketError> {
        if amount == 0 {
            return Ok(());
        }
        self.treasury.push(to, amount).map_err(|e| {
            error!(error = %e, %to, amount, "bond refund failed, custody holds untracked funds");
            MarketError::from(e)
        })
    }

    /// Take back a bond the oracle never accepted and return it to `to`.
    fn recall_bond(&self, to: Address, amount: u128) -> Result<(), MarketError> {
        if amount == 0 {
            return Ok(());
        }
        let oracle = self.oracle.address();
        self.treasury.pull(oracle, amount).map_err(|e| {
            error!(error = %e, %oracle, amount, "failed to recall bond from oracle");
            MarketError::from(e)
        })?;
        self.refund(to, amount)
    }
}

fn claim_text(label: &str, description: &str) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    format!(
        "As of assertion timestamp {}, the described prediction market outcome is: {}. The market description is: {}",
        now, label, description
    )
}
