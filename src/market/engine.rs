//! Market engine: record ownership, creation and minting.
//!
//! The engine is the only writer of market records and claim ledgers. Every
//! mutating method takes `&mut self` and either completes or leaves state
//! untouched, so wrapping the engine in a single lock is enough to give each
//! call the atomic, serialized execution the protocol depends on.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::types::{derive_market_id, Market, MarketId, MarketSnapshot, Side, UNRESOLVABLE};
use crate::auth::Authorizer;
use crate::error::MarketError;
use crate::ledger::{ClaimId, ClaimLedger};
use crate::metrics;
use crate::oracle::{AssertionId, OracleAdapter};
use crate::treasury::Treasury;

/// Static engine parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Engine identity; oracle callbacks are addressed here.
    pub address: Address,
    /// Currency bonds are posted in.
    pub bond_currency: String,
    /// Contestation window requested for every assertion.
    pub liveness_seconds: u64,
    /// Oracle identifier attached to every assertion.
    pub identifier: String,
    /// Venue fee in basis points.
    pub amm_fee_bps: u32,
    /// Initial virtual reserve on each side of a new market.
    pub amm_virtual_liquidity: u128,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: Address::ZERO,
            bond_currency: "USDC".to_string(),
            liveness_seconds: 7_200,
            identifier: "ASSERT_TRUTH".to_string(),
            amm_fee_bps: 0,
            amm_virtual_liquidity: 1_000_000,
        }
    }
}

/// Assertion awaiting an oracle callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingAssertion {
    pub(crate) market: MarketId,
    pub(crate) asserter: Address,
}

/// Owner of all markets and claim ledgers.
pub struct MarketEngine {
    pub(crate) config: EngineConfig,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) oracle: Arc<dyn OracleAdapter>,
    pub(crate) treasury: Arc<dyn Treasury>,
    pub(crate) markets: HashMap<MarketId, Market>,
    market_ids: Vec<MarketId>,
    pub(crate) ledgers: Vec<ClaimLedger>,
    pub(crate) assertions: HashMap<AssertionId, PendingAssertion>,
    nonce: u64,
}

impl fmt::Debug for MarketEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketEngine")
            .field("config", &self.config)
            .field("markets", &self.markets.len())
            .field("pending_assertions", &self.assertions.len())
            .finish_non_exhaustive()
    }
}

impl MarketEngine {
    /// Create an engine wired to its external collaborators.
    pub fn new(
        config: EngineConfig,
        authorizer: Arc<dyn Authorizer>,
        oracle: Arc<dyn OracleAdapter>,
        treasury: Arc<dyn Treasury>,
    ) -> Self {
        Self {
            config,
            authorizer,
            oracle,
            treasury,
            markets: HashMap::new(),
            market_ids: Vec::new(),
            ledgers: Vec::new(),
            assertions: HashMap::new(),
            nonce: 0,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a market and its two empty claim ledgers.
    ///
    /// The reward is pulled from the caller into custody. Every call creates
    /// a new market, even with an identical description.
    #[instrument(skip(self, description), fields(caller = %caller))]
    pub fn initialize(
        &mut self,
        caller: Address,
        outcome1: &str,
        outcome2: &str,
        description: &str,
        reward: u128,
        required_bond: u128,
    ) -> Result<MarketId, MarketError> {
        let _timer = metrics::timer_operation("initialize");
        self.ensure_authorized(&caller)?;
        validate_labels(outcome1, outcome2)?;

        if reward > 0 {
            self.treasury.pull(caller, reward)?;
        }

        self.nonce += 1;
        let created_at = OffsetDateTime::now_utc().unix_timestamp();
        let id = derive_market_id(description, &caller, self.nonce, created_at);

        let claim1 = self.push_ledger(id, Side::First, outcome1);
        let claim2 = self.push_ledger(id, Side::Second, outcome2);
        let liquidity = self.config.amm_virtual_liquidity;

        self.markets.insert(
            id,
            Market {
                id,
                creator: caller,
                description: description.to_string(),
                outcome1: outcome1.to_string(),
                outcome2: outcome2.to_string(),
                claim1,
                claim2,
                reward,
                required_bond,
                resolved: false,
                asserted_outcome_hash: B256::ZERO,
                asserted_outcome: None,
                pays_all_claims: false,
                active_assertion: None,
                total_collateral: 0,
                reserve1: liquidity,
                reserve2: liquidity,
                fees_accrued: 0,
                created_at,
            },
        );
        self.market_ids.push(id);

        metrics::inc_markets_created();
        info!(market = %id, outcome1, outcome2, reward, required_bond, "market created");
        Ok(id)
    }

    /// Lock `amount` collateral and mint `amount` claims of each outcome to
    /// the caller.
    #[instrument(skip(self), fields(caller = %caller, market = %market_id))]
    pub fn mint(&mut self, caller: Address, market_id: MarketId, amount: u128) -> Result<(), MarketError> {
        let _timer = metrics::timer_operation("mint");
        self.ensure_authorized(&caller)?;
        let market = self.market(&market_id)?;
        if market.resolved {
            return Err(MarketError::MarketResolved(market_id));
        }
        if amount == 0 {
            return Err(MarketError::ZeroAmount);
        }

        let (claim1, claim2) = (market.claim1, market.claim2);
        let collateral = market
            .total_collateral
            .checked_add(amount)
            .ok_or(MarketError::ArithmeticOverflow)?;
        for claim in [claim1, claim2] {
            self.ledger(claim)
                .total_supply()
                .checked_add(amount)
                .ok_or(MarketError::ArithmeticOverflow)?;
        }

        self.treasury.pull(caller, amount)?;

        self.ledger_mut(claim1).mint(caller, amount)?;
        self.ledger_mut(claim2).mint(caller, amount)?;
        self.market_mut(&market_id)?.total_collateral = collateral;

        metrics::add_collateral_minted(amount);
        debug!(amount, total_collateral = collateral, "claims minted");
        Ok(())
    }

    /// Move claims between holders.
    pub fn transfer_claims(
        &mut self,
        caller: Address,
        market_id: MarketId,
        side: Side,
        to: Address,
        amount: u128,
    ) -> Result<(), MarketError> {
        let claim = self.market(&market_id)?.claim(side);
        self.ledger_mut(claim).transfer(caller, to, amount)?;
        debug!(market = %market_id, %side, from = %caller, %to, amount, "claims transferred");
        Ok(())
    }

    /// Allow `spender` to move up to `amount` of the caller's claims.
    pub fn approve_claims(
        &mut self,
        caller: Address,
        market_id: MarketId,
        side: Side,
        spender: Address,
        amount: u128,
    ) -> Result<(), MarketError> {
        let claim = self.market(&market_id)?.claim(side);
        self.ledger_mut(claim).approve(caller, spender, amount);
        Ok(())
    }

    /// Move `owner`'s claims using the caller's allowance.
    pub fn transfer_claims_from(
        &mut self,
        caller: Address,
        market_id: MarketId,
        side: Side,
        owner: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), MarketError> {
        let claim = self.market(&market_id)?.claim(side);
        self.ledger_mut(claim).transfer_from(caller, owner, to, amount)?;
        Ok(())
    }

    /// Full record of a market plus ledger supplies.
    pub fn get_market(&self, market_id: &MarketId) -> Result<MarketSnapshot, MarketError> {
        let market = self.market(market_id)?;
        Ok(MarketSnapshot {
            state: market.state(),
            claim1_supply: self.ledger(market.claim1).total_supply(),
            claim2_supply: self.ledger(market.claim2).total_supply(),
            market: market.clone(),
        })
    }

    /// Market ids in creation order.
    pub fn list_market_ids(&self) -> Vec<MarketId> {
        self.market_ids.clone()
    }

    /// Claim balance of `holder` on one side of a market.
    pub fn balance_of(&self, market_id: &MarketId, side: Side, holder: &Address) -> Result<u128, MarketError> {
        let claim = self.market(market_id)?.claim(side);
        Ok(self.ledger(claim).balance_of(holder))
    }

    /// Read-only access to a claim ledger.
    pub fn claim_ledger(&self, market_id: &MarketId, side: Side) -> Result<&ClaimLedger, MarketError> {
        let claim = self.market(market_id)?.claim(side);
        Ok(self.ledger(claim))
    }

    pub(crate) fn ensure_authorized(&self, caller: &Address) -> Result<(), MarketError> {
        if self.authorizer.is_authorized(caller) {
            Ok(())
        } else {
            Err(MarketError::Unauthorized { caller: *caller })
        }
    }

    pub(crate) fn market(&self, market_id: &MarketId) -> Result<&Market, MarketError> {
        self.markets
            .get(market_id)
            .ok_or(MarketError::MarketNotFound(*market_id))
    }

    pub(crate) fn market_mut(&mut self, market_id: &MarketId) -> Result<&mut Market, MarketError> {
        self.markets
            .get_mut(market_id)
            .ok_or(MarketError::MarketNotFound(*market_id))
    }

    // ClaimIds are only minted by push_ledger, so indexing cannot miss.
    pub(crate) fn ledger(&self, claim: ClaimId) -> &ClaimLedger {
        &self.ledgers[claim.index()]
    }

    pub(crate) fn ledger_mut(&mut self, claim: ClaimId) -> &mut ClaimLedger {
        &mut self.ledgers[claim.index()]
    }

    fn push_ledger(&mut self, market: MarketId, side: Side, label: &str) -> ClaimId {
        let id = ClaimId(self.ledgers.len());
        self.ledgers.push(ClaimLedger::new(id, market, side, label));
        id
    }
}

fn validate_labels(outcome1: &str, outcome2: &str) -> Result<(), MarketError> {
    for label in [outcome1, outcome2] {
        if label.is_empty() || label == UNRESOLVABLE {
            return Err(MarketError::InvalidOutcome(label.to_string()));
        }
    }
    if outcome1 == outcome2 {
        return Err(MarketError::InvalidOutcome(outcome2.to_string()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::AllowList;
    use crate::error::{LedgerError, TreasuryError};
    use crate::oracle::LocalOracle;
    use crate::treasury::InMemoryTreasury;
    use pretty_assertions::assert_eq;

    pub(crate) const ENGINE: Address = Address::repeat_byte(0xee);
    pub(crate) const ORACLE: Address = Address::repeat_byte(0xaa);
    pub(crate) const ALICE: Address = Address::repeat_byte(0x01);
    pub(crate) const BOB: Address = Address::repeat_byte(0x02);
    pub(crate) const MALLORY: Address = Address::repeat_byte(0x0f);

    pub(crate) struct Harness {
        pub(crate) engine: MarketEngine,
        pub(crate) oracle: Arc<LocalOracle>,
        pub(crate) treasury: Arc<InMemoryTreasury>,
    }

    pub(crate) fn harness(fee_bps: u32) -> Harness {
        let treasury = Arc::new(InMemoryTreasury::new(ENGINE));
        let oracle = Arc::new(LocalOracle::new(ORACLE, Arc::new(treasury.account(ORACLE))));
        oracle.freeze_time(1_000);
        let allow: AllowList = [ALICE, BOB].into_iter().collect();
        for who in [ALICE, BOB, MALLORY] {
            treasury.deposit(who, 1_000_000).unwrap();
        }
        let config = EngineConfig {
            address: ENGINE,
            amm_fee_bps: fee_bps,
            amm_virtual_liquidity: 1_000,
            ..Default::default()
        };
        let engine = MarketEngine::new(config, Arc::new(allow), oracle.clone(), treasury.clone());
        Harness {
            engine,
            oracle,
            treasury,
        }
    }

    pub(crate) fn yes_no(h: &mut Harness) -> MarketId {
        h.engine
            .initialize(ALICE, "yes", "no", "Will it rain tomorrow?", 0, 0)
            .unwrap()
    }

    #[test]
    fn initialize_creates_empty_ledgers_and_pulls_reward() {
        let mut h = harness(0);
        let id = h
            .engine
            .initialize(ALICE, "yes", "no", "Will it rain?", 250, 10)
            .unwrap();

        let snap = h.engine.get_market(&id).unwrap();
        assert_eq!(snap.state, crate::market::MarketState::Open);
        assert_eq!(snap.claim1_supply, 0);
        assert_eq!(snap.claim2_supply, 0);
        assert_eq!(snap.market.reward, 250);
        assert_eq!(snap.market.required_bond, 10);
        assert_eq!(snap.market.asserted_outcome_hash, B256::ZERO);
        assert_eq!((snap.market.reserve1, snap.market.reserve2), (1_000, 1_000));
        assert_eq!(h.treasury.custody_balance(), 250);
        assert_eq!(h.treasury.balance_of(&ALICE), 1_000_000 - 250);
    }

    #[test]
    fn identical_descriptions_create_distinct_markets() {
        let mut h = harness(0);
        let a = yes_no(&mut h);
        let b = yes_no(&mut h);
        assert_ne!(a, b);
        assert_eq!(h.engine.list_market_ids(), vec![a, b]);
    }

    #[test]
    fn initialize_requires_authorization() {
        let mut h = harness(0);
        let err = h
            .engine
            .initialize(MALLORY, "yes", "no", "q", 0, 0)
            .unwrap_err();
        assert_eq!(err, MarketError::Unauthorized { caller: MALLORY });
        assert!(h.engine.list_market_ids().is_empty());
    }

    #[test]
    fn initialize_rejects_ambiguous_labels() {
        let mut h = harness(0);
        for (a, b) in [("yes", "yes"), ("", "no"), ("yes", UNRESOLVABLE)] {
            assert!(matches!(
                h.engine.initialize(ALICE, a, b, "q", 0, 0),
                Err(MarketError::InvalidOutcome(_))
            ));
        }
    }

    #[test]
    fn initialize_without_reward_funds_fails_cleanly() {
        let mut h = harness(0);
        let err = h
            .engine
            .initialize(ALICE, "yes", "no", "q", 2_000_000, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::Treasury(TreasuryError::InsufficientFunds { .. })
        ));
        assert!(h.engine.list_market_ids().is_empty());
    }

    #[test]
    fn mint_locks_collateral_one_to_one() {
        let mut h = harness(0);
        let id = yes_no(&mut h);
        h.engine.mint(ALICE, id, 10).unwrap();
        h.engine.mint(BOB, id, 5).unwrap();

        let snap = h.engine.get_market(&id).unwrap();
        assert_eq!(snap.market.total_collateral, 15);
        assert_eq!(snap.claim1_supply, 15);
        assert_eq!(snap.claim2_supply, 15);
        assert_eq!(h.engine.balance_of(&id, Side::First, &ALICE).unwrap(), 10);
        assert_eq!(h.engine.balance_of(&id, Side::Second, &BOB).unwrap(), 5);
        assert_eq!(h.treasury.custody_balance(), 15);
    }

    #[test]
    fn mint_rejections() {
        let mut h = harness(0);
        let id = yes_no(&mut h);
        let missing = MarketId(B256::repeat_byte(9));

        assert_eq!(h.engine.mint(ALICE, id, 0), Err(MarketError::ZeroAmount));
        assert_eq!(
            h.engine.mint(ALICE, missing, 1),
            Err(MarketError::MarketNotFound(missing))
        );
        assert_eq!(
            h.engine.mint(MALLORY, id, 1),
            Err(MarketError::Unauthorized { caller: MALLORY })
        );
        assert!(matches!(
            h.engine.mint(ALICE, id, 5_000_000),
            Err(MarketError::Treasury(_))
        ));
        assert_eq!(h.engine.get_market(&id).unwrap().market.total_collateral, 0);
        assert_eq!(h.engine.get_market(&id).unwrap().claim1_supply, 0);
    }

    #[test]
    fn claims_move_peer_to_peer() {
        let mut h = harness(0);
        let id = yes_no(&mut h);
        h.engine.mint(ALICE, id, 10).unwrap();

        h.engine
            .transfer_claims(ALICE, id, Side::First, MALLORY, 4)
            .unwrap();
        h.engine
            .approve_claims(ALICE, id, Side::Second, BOB, 3)
            .unwrap();
        h.engine
            .transfer_claims_from(BOB, id, Side::Second, ALICE, BOB, 3)
            .unwrap();

        assert_eq!(h.engine.balance_of(&id, Side::First, &MALLORY).unwrap(), 4);
        assert_eq!(h.engine.balance_of(&id, Side::Second, &BOB).unwrap(), 3);
        let err = h
            .engine
            .transfer_claims(MALLORY, id, Side::First, BOB, 5)
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::Ledger(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(h.engine.get_market(&id).unwrap().claim1_supply, 10);
        assert_eq!(
            h.engine.claim_ledger(&id, Side::First).unwrap().label(),
            "yes"
        );
    }
}
