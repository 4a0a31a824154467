//! Integration tests for the claim market engine.
//!
//! Every test wires the engine to the in-process oracle and treasury and
//! drives it only through its public API.

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use claim_market::auth::AllowList;
use claim_market::error::{MarketError, OracleError};
use claim_market::market::{outcome_hash, EngineConfig, MarketEngine, MarketId, MarketState, Side};
use claim_market::oracle::{LocalOracle, LocalOracleConfig, OracleAdapter, OracleCallback};
use claim_market::treasury::{InMemoryTreasury, Treasury};
use pretty_assertions::assert_eq;
use tokio::sync::RwLock;
use tokio_test::{assert_err, assert_ok};

const ENGINE: Address = Address::repeat_byte(0xee);
const ORACLE: Address = Address::repeat_byte(0xaa);
const A: Address = Address::repeat_byte(0x0a);
const B: Address = Address::repeat_byte(0x0b);
const C: Address = Address::repeat_byte(0x0c);
const OUTSIDER: Address = Address::repeat_byte(0x99);
const FUNDING: u128 = 1_000_000;

struct World {
    engine: MarketEngine,
    oracle: Arc<LocalOracle>,
    treasury: Arc<InMemoryTreasury>,
}

/// Engine with A, B and C authorized and funded; oracle clock frozen at 1000.
fn world(fee_bps: u32) -> World {
        let treasury = Arc::new(InMemoryTreasury::new(ENGINE));
        let oracle = Arc::new(LocalOracle::new(ORACLE, Arc::new(treasury.account(ORACLE))));
        oracle.freeze_time(1_000);
    for who in [A, B, C, OUTSIDER] {
        treasury.deposit(who, FUNDING).unwrap();
    }
    let allow: AllowList = [A, B, C].into_iter().collect();
    let config = EngineConfig {
        address: ENGINE,
        liveness_seconds: 600,
        amm_fee_bps: fee_bps,
        amm_virtual_liquidity: 10_000,
        ..Default::default()
    };
    let engine = MarketEngine::new(config, Arc::new(allow), oracle.clone(), treasury.clone());
    World {
        engine,
        oracle,
        treasury,
    }
}

fn yes_no(w: &mut World) -> MarketId {
    w.engine
        .initialize(A, "yes", "no", "Will the bridge open before June?", 0, 0)
        .unwrap()
}

/// Let the liveness window pass and deliver every expiry callback.
fn finalize_expired(w: &mut World) {
    w.oracle.freeze_time(w.oracle.now() + 600);
    for callback in w.oracle.expired() {
        w.engine.handle_callback(ORACLE, callback).unwrap();
    }
}

/// Yes/no market: A mints 10, B mints 5, "yes" wins, A receives 10 and B
/// has nothing to settle.
#[test]
fn test_yes_no_scenario() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    w.engine.mint(A, id, 10).unwrap();
    w.engine.mint(B, id, 5).unwrap();
    // B keeps only "no" claims
    w.engine.transfer_claims(B, id, Side::First, C, 5).unwrap();
    assert_eq!(w.engine.get_market(&id).unwrap().market.total_collateral, 15);

    let assertion = w.engine.assert_outcome(A, id, "yes").unwrap();
    w.engine.on_resolved(ORACLE, assertion, true).unwrap();

    let snap = w.engine.get_market(&id).unwrap();
    assert!(snap.market.resolved);
    assert_eq!(snap.market.asserted_outcome_hash, outcome_hash("yes"));

    let settlement = w.engine.settle(A, id).unwrap();
    // floor(10 * 15 / 15)
    assert_eq!(settlement.payout, 10);
    assert_eq!(
        w.engine.settle(B, id),
        Err(MarketError::NothingToSettle { market: id, holder: B })
    );
}

/// An unknown label is rejected and nothing changes.
#[test]
fn test_invalid_outcome_leaves_state_unchanged() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    w.engine.mint(A, id, 10).unwrap();
    let before = w.engine.get_market(&id).unwrap();
    let custody = w.treasury.custody_balance();

    assert_eq!(
        w.engine.assert_outcome(A, id, "maybe"),
        Err(MarketError::InvalidOutcome("maybe".to_string()))
    );
    assert_eq!(w.engine.get_market(&id).unwrap(), before);
    assert_eq!(w.treasury.custody_balance(), custody);
}

/// An overturned assertion reopens the market for a different label.
#[test]
fn test_overturned_assertion_reopens_market() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    let first = w.engine.assert_outcome(A, id, "yes").unwrap();

    w.engine.on_resolved(ORACLE, first, false).unwrap();
    let snap = w.engine.get_market(&id).unwrap();
    assert_eq!(snap.state, MarketState::Open);
    assert_eq!(snap.market.asserted_outcome_hash, B256::ZERO);

    assert_ok!(w.engine.assert_outcome(B, id, "no"));
    assert_eq!(
        w.engine.get_market(&id).unwrap().market.asserted_outcome_hash,
        outcome_hash("no")
    );
}

/// "Unresolvable": A holds 10/10, B holds 0/10, A's 20 of 30 claims pay
/// floor(20 * collateral / 30).
#[test]
fn test_unresolvable_pays_combined_share() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    w.engine.mint(A, id, 10).unwrap();
    w.engine.mint(B, id, 10).unwrap();
    w.engine.transfer_claims(B, id, Side::First, C, 10).unwrap();

    let assertion = w.engine.assert_outcome(C, id, "Unresolvable").unwrap();
    w.engine.on_resolved(ORACLE, assertion, true).unwrap();

    let collateral = w.engine.get_market(&id).unwrap().market.total_collateral;
    // C settles first: floor(10 * 20 / 40) = 5
    assert_eq!(w.engine.settle(C, id).unwrap().payout, 5);

    let snap = w.engine.get_market(&id).unwrap();
    assert_eq!(snap.claim1_supply + snap.claim2_supply, 30);
    let settlement = w.engine.settle(A, id).unwrap();
    assert_eq!(settlement.payout, 20 * (collateral - 5) / 30);
    assert_eq!((settlement.burned1, settlement.burned2), (10, 10));
}

/// Collateral after N mints and M settlements equals mints minus payouts.
#[test]
fn test_collateral_conservation() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    let mints = [(A, 7u128), (B, 13), (C, 29), (A, 3)];
    for (who, amount) in mints {
        w.engine.mint(who, id, amount).unwrap();
    }
    let deposited: u128 = mints.iter().map(|(_, a)| a).sum();

    let assertion = w.engine.assert_outcome(B, id, "no").unwrap();
    w.engine.on_resolved(ORACLE, assertion, true).unwrap();

    let mut paid = 0;
    for who in [C, A] {
        paid += w.engine.settle(who, id).unwrap().payout;
        let collateral = w.engine.get_market(&id).unwrap().market.total_collateral;
        assert_eq!(collateral, deposited - paid);
    }
    assert_eq!(w.treasury.custody_balance(), deposited - paid);
}

/// Once every winning holder settles, the ledger is empty and at most the
/// floor-division remainders are left in the pool.
#[test]
fn test_settlement_exhaustiveness_and_rounding_bound() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    w.engine.mint(A, id, 1).unwrap();
    w.engine.mint(B, id, 1).unwrap();
    w.engine.mint(C, id, 1).unwrap();
    // venue buyers hold winning claims without matching losing ones
    w.engine.buy(B, id, Side::First, 50, 0).unwrap();
    w.engine.buy(C, id, Side::Second, 77, 0).unwrap();

    let assertion = w.engine.assert_outcome(A, id, "yes").unwrap();
    w.engine.on_resolved(ORACLE, assertion, true).unwrap();

    let holders = [A, B, C];
    for who in holders {
        w.engine.settle(who, id).unwrap();
    }

    let snap = w.engine.get_market(&id).unwrap();
    assert_eq!(snap.claim1_supply, 0);
    // one rounding remainder per settlement at most, each below one unit
    assert!(snap.market.total_collateral < holders.len() as u128);
    assert_eq!(w.treasury.custody_balance(), snap.market.total_collateral);
}

/// Rounding toward zero never overpays, even when every share is fractional.
#[test]
fn test_rounding_never_overpays() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    for who in [A, B, C] {
        w.engine.mint(who, id, 1).unwrap();
    }
    w.engine.transfer_claims(C, id, Side::First, A, 1).unwrap();
    let assertion = w.engine.assert_outcome(A, id, "Unresolvable").unwrap();
    w.engine.on_resolved(ORACLE, assertion, true).unwrap();

    // B: floor(2 * 3 / 6) = 1; A: floor(3 * 2 / 4) = 1; C: floor(1 * 1 / 1) = 1
    let payouts: Vec<u128> = [B, A, C]
        .into_iter()
        .map(|who| w.engine.settle(who, id).unwrap().payout)
        .collect();
    assert_eq!(payouts, vec![1, 1, 1]);
    assert_eq!(w.engine.get_market(&id).unwrap().market.total_collateral, 0);
}

/// A second assertion while one is in flight fails.
#[test]
fn test_mutual_exclusion() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    let first = w.engine.assert_outcome(A, id, "yes").unwrap();
    assert_eq!(
        w.engine.assert_outcome(B, id, "Unresolvable"),
        Err(MarketError::ActiveAssertionExists {
            market: id,
            assertion: first
        })
    );
}

/// Nothing undoes a resolution.
#[test]
fn test_monotonic_resolution() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    w.engine.mint(A, id, 10).unwrap();
    let assertion = w.engine.assert_outcome(A, id, "no").unwrap();
    w.engine.on_resolved(ORACLE, assertion, true).unwrap();
    let resolved = w.engine.get_market(&id).unwrap();

    assert_err!(w.engine.on_resolved(ORACLE, assertion, false));
    assert_err!(w.engine.on_resolved(ORACLE, assertion, true));
    assert_eq!(
        w.engine.assert_outcome(B, id, "yes"),
        Err(MarketError::MarketResolved(id))
    );
    assert_eq!(w.engine.mint(B, id, 1), Err(MarketError::MarketResolved(id)));
    assert_eq!(
        w.engine.buy(B, id, Side::First, 100, 0),
        Err(MarketError::MarketResolved(id))
    );
    assert_eq!(w.engine.get_market(&id).unwrap(), resolved);
}

/// Callbacks from anyone but the oracle are rejected.
#[test]
fn test_callbacks_only_from_oracle() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    let assertion = w.engine.assert_outcome(A, id, "yes").unwrap();

    for caller in [A, ENGINE, OUTSIDER] {
        assert_eq!(
            w.engine.handle_callback(
                caller,
                OracleCallback::Resolved {
                    assertion,
                    truthful: true
                }
            ),
            Err(MarketError::OnlyOracle { caller })
        );
    }
    assert_eq!(w.engine.get_market(&id).unwrap().state, MarketState::Asserted);
}

/// Every constant-product trade leaves the reserve product no smaller.
#[test]
fn test_amm_product_non_decreasing() {
    for fee_bps in [0, 100] {
        let mut w = world(fee_bps);
        let id = yes_no(&mut w);
        let mut previous = {
            let (r1, r2) = w.engine.get_reserves(&id).unwrap();
            r1 * r2
        };
        for (i, input) in [500u128, 1, 2_500, 33, 12_000, 7].into_iter().enumerate() {
            let side = if i % 2 == 0 { Side::First } else { Side::Second };
            match w.engine.buy(B, id, side, input, 0) {
                Ok(_) => {}
                // dust trades may round to zero output
                Err(MarketError::InsufficientOutput { output: 0, .. }) => continue,
                Err(e) => panic!("unexpected error: {e}"),
            }
            let (r1, r2) = w.engine.get_reserves(&id).unwrap();
            assert!(r1 * r2 >= previous);
            previous = r1 * r2;

            let (p1, p2) = w.engine.get_probability(&id).unwrap();
            assert_eq!(p1 + p2, 10_000);
        }
    }
}

/// Assert, dispute, arbitrate against the asserter, then assert again and
/// let liveness expire.
#[test]
fn test_dispute_round_trip() {
    let mut w = world(0);
    let id = w
        .engine
        .initialize(A, "yes", "no", "Will the bridge open before June?", 250, 40)
        .unwrap();
    w.engine.mint(B, id, 100).unwrap();

    let first = w.engine.assert_outcome(B, id, "yes").unwrap();
    let disputed = w.oracle.dispute(first, C).unwrap();
    w.engine.handle_callback(ORACLE, disputed).unwrap();
    assert_eq!(w.engine.get_market(&id).unwrap().state, MarketState::Asserted);
    // both bonds are held by the oracle
    assert_eq!(w.treasury.balance_of(&ORACLE), 80);

    // liveness cannot finalize a disputed assertion
    finalize_expired(&mut w);
    assert_eq!(w.engine.get_market(&id).unwrap().state, MarketState::Asserted);

    let verdict = w.oracle.arbitrate(first, false).unwrap();
    w.engine.handle_callback(ORACLE, verdict).unwrap();
    assert_eq!(w.engine.get_market(&id).unwrap().state, MarketState::Open);
    // the winning disputer takes both bonds
    assert_eq!(w.treasury.balance_of(&C), FUNDING + 40);
    assert_eq!(w.treasury.balance_of(&B), FUNDING - 100 - 40);

    let second = w.engine.assert_outcome(C, id, "no").unwrap();
    assert_eq!(
        w.oracle.settle(second),
        Err(OracleError::LivenessActive {
            assertion: second,
            expires_at: w.oracle.now() + 600
        })
    );
    finalize_expired(&mut w);

    let snap = w.engine.get_market(&id).unwrap();
    assert_eq!(snap.state, MarketState::Resolved);
    assert_eq!(snap.market.asserted_outcome_hash, outcome_hash("no"));
    // the upheld asserter gets the bond back plus the reward
    assert_eq!(w.treasury.balance_of(&C), FUNDING + 40 + 250);
    assert_eq!(w.treasury.balance_of(&ORACLE), 0);
    assert_eq!(w.engine.settle(B, id).unwrap().payout, 100);
    assert_eq!(w.treasury.balance_of(&B), FUNDING - 40);
}

/// Venue buyers only ever bought the losing side: every claim shares the
/// pool and nothing is stranded in custody.
#[test]
fn test_one_sided_buy_opposite_outcome_wins() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    w.engine.buy(B, id, Side::Second, 500, 0).unwrap();
    w.engine.buy(C, id, Side::Second, 300, 0).unwrap();

    let assertion = w.engine.assert_outcome(A, id, "yes").unwrap();
    w.engine.on_resolved(ORACLE, assertion, true).unwrap();
    let snap = w.engine.get_market(&id).unwrap();
    assert_eq!(snap.claim1_supply, 0);
    assert!(snap.market.pays_all_claims);

    assert_err!(w.engine.settle(A, id));
    let paid: u128 = [B, C]
        .into_iter()
        .map(|who| w.engine.settle(who, id).unwrap().payout)
        .sum();
    assert_eq!(paid, 800);

    let snap = w.engine.get_market(&id).unwrap();
    assert_eq!(snap.market.total_collateral, 0);
    assert_eq!(snap.claim2_supply, 0);
    assert_eq!(w.treasury.custody_balance(), 0);
}

/// Once every holder of a market with no winning claims settles, both
/// ledgers are empty and only rounding dust can remain.
#[test]
fn test_exhaustiveness_without_winning_claims() {
    let mut w = world(100);
    let id = yes_no(&mut w);
    for (who, input) in [(A, 333u128), (B, 1_001), (C, 77)] {
        w.engine.buy(who, id, Side::First, input, 0).unwrap();
    }

    let assertion = w.engine.assert_outcome(C, id, "no").unwrap();
    w.engine.on_resolved(ORACLE, assertion, true).unwrap();
    for who in [C, A, B] {
        w.engine.settle(who, id).unwrap();
    }

    let snap = w.engine.get_market(&id).unwrap();
    assert_eq!((snap.claim1_supply, snap.claim2_supply), (0, 0));
    assert!(snap.market.total_collateral < 3);
    // fees sit beside the pool in custody
    assert_eq!(
        w.treasury.custody_balance(),
        snap.market.total_collateral + snap.market.fees_accrued
    );
}

/// Oracle outages fail `assert` without moving the bond or the market.
#[test]
fn test_oracle_failure_is_atomic() {
    let mut w = world(0);
    let id = w.engine.initialize(A, "yes", "no", "q", 0, 25).unwrap();

    w.oracle.set_config(LocalOracleConfig {
        fail_submissions: true,
        ..Default::default()
    });
    assert!(matches!(
        w.engine.assert_outcome(B, id, "yes"),
        Err(MarketError::Oracle(OracleError::SubmissionFailed(_)))
    ));
    w.oracle.set_config(LocalOracleConfig {
        fail_quote: true,
        ..Default::default()
    });
    assert!(matches!(
        w.engine.assert_outcome(B, id, "yes"),
        Err(MarketError::Oracle(OracleError::QuoteFailed(_)))
    ));

    assert_eq!(w.treasury.balance_of(&B), FUNDING);
    assert_eq!(w.engine.get_market(&id).unwrap().state, MarketState::Open);
    assert_eq!(w.oracle.submitted_count(), 0);

    w.oracle.set_config(LocalOracleConfig::default());
    assert_ok!(w.engine.assert_outcome(B, id, "yes"));
}

/// Unauthorized callers cannot create, mint, assert or trade, but may settle
/// claims they were given.
#[test]
fn test_authorization_boundary() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    let denied = MarketError::Unauthorized { caller: OUTSIDER };

    assert_eq!(w.engine.initialize(OUTSIDER, "a", "b", "q", 0, 0), Err(denied.clone()));
    assert_eq!(w.engine.mint(OUTSIDER, id, 1), Err(denied.clone()));
    assert_eq!(w.engine.assert_outcome(OUTSIDER, id, "yes"), Err(denied.clone()));
    assert_eq!(w.engine.buy(OUTSIDER, id, Side::First, 10, 0), Err(denied));

    w.engine.mint(A, id, 4).unwrap();
    w.engine.transfer_claims(A, id, Side::First, OUTSIDER, 4).unwrap();
    let assertion = w.engine.assert_outcome(A, id, "yes").unwrap();
    w.engine.on_resolved(ORACLE, assertion, true).unwrap();
    assert_eq!(w.engine.settle(OUTSIDER, id).unwrap().payout, 4);
}

/// Callbacks delivered from another task through a shared lock apply once.
#[tokio::test]
async fn test_concurrent_callback_delivery() {
    let mut w = world(0);
    let id = yes_no(&mut w);
    w.engine.mint(A, id, 10).unwrap();
    let assertion = w.engine.assert_outcome(A, id, "yes").unwrap();
    let oracle = w.oracle.clone();
    let engine = Arc::new(RwLock::new(w.engine));

    oracle.freeze_time(oracle.now() + 600);
    let callbacks = oracle.expired();
    assert_eq!(callbacks.len(), 1);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let callbacks = callbacks.clone();
        let from = oracle.address();
        handles.push(tokio::spawn(async move {
            let mut engine = engine.write().await;
            callbacks
                .into_iter()
                .map(|cb| engine.handle_callback(from, cb))
                .filter(Result::is_ok)
                .count()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        applied += handle.await.unwrap();
    }
    assert_eq!(applied, 1);

    let engine = engine.read().await;
    assert_eq!(engine.get_market(&id).unwrap().state, MarketState::Resolved);
    assert_eq!(engine.assertion_market(&assertion), None);
}
