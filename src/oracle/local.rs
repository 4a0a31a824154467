//! In-process optimistic oracle.
//!
//! Assertions become final once their liveness window passes without a
//! dispute. A disputed assertion waits for [`LocalOracle::arbitrate`].
//! Every state change that the engine must hear about is returned as an
//! [`OracleCallback`]; the caller delivers it.
//!
//! Bonds are held in the oracle's own treasury account. An undisputed
//! assertion returns the bond to the asserter. A disputer matches the bond,
//! and arbitration pays both bonds to whichever side was right.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{keccak256, Address};
use parking_lot::Mutex;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::types::{AssertionId, AssertionRequest, OracleAdapter, OracleCallback};
use crate::error::{OracleError, TreasuryError};
use crate::treasury::Treasury;

/// Configuration for local oracle behavior.
#[derive(Debug, Clone, Default)]
pub struct LocalOracleConfig {
    /// Minimum bond quoted for every currency.
    pub minimum_bond: u128,
    /// Whether bond quotes fail.
    pub fail_quote: bool,
    /// Whether submissions fail.
    pub fail_submissions: bool,
}

/// Assertion as tracked by the local oracle.
#[derive(Debug, Clone)]
pub struct LocalAssertion {
    /// Original request.
    pub request: AssertionRequest,
    /// Unix timestamp of submission.
    pub submitted_at: u64,
    /// Unix timestamp when the liveness window closes.
    pub expires_at: u64,
    /// Who disputed, if anyone.
    pub disputer: Option<Address>,
    /// Bond posted by the disputer.
    pub dispute_bond: u128,
    /// Whether a resolution callback has been produced.
    pub settled: bool,
}

impl LocalAssertion {
    /// Account paid when the assertion finalizes, and how much.
    fn payout(&self, truthful: bool) -> Result<Option<(Address, u128)>, OracleError> {
        let pot = self
            .request
            .bond
            .checked_add(self.dispute_bond)
            .ok_or(TreasuryError::Overflow)?;
        if truthful {
            Ok(Some((self.request.asserter, pot)))
        } else {
            Ok(self.disputer.map(|disputer| (disputer, pot)))
        }
    }
}

#[derive(Debug, Default)]
struct State {
    assertions: HashMap<AssertionId, LocalAssertion>,
    nonce: u64,
    frozen_at: Option<u64>,
}

/// Optimistic oracle living in the same process as the engine.
pub struct LocalOracle {
    address: Address,
    treasury: Arc<dyn Treasury>,
    config: Mutex<LocalOracleConfig>,
    state: Mutex<State>,
}

impl fmt::Debug for LocalOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalOracle")
            .field("address", &self.address)
            .field("config", &*self.config.lock())
            .finish_non_exhaustive()
    }
}

impl LocalOracle {
    /// Create an oracle whose callbacks originate from `address`.
    ///
    /// `treasury` must use `address` as its custody account; bonds are held
    /// and paid out there.
    pub fn new(address: Address, treasury: Arc<dyn Treasury>) -> Self {
        Self::with_config(address, treasury, LocalOracleConfig::default())
    }

    /// Create an oracle with custom configuration.
    pub fn with_config(address: Address, treasury: Arc<dyn Treasury>, config: LocalOracleConfig) -> Self {
        Self {
            address,
            treasury,
            config: Mutex::new(config),
            state: Mutex::new(State::default()),
        }
    }

    /// Replace the configuration.
    pub fn set_config(&self, config: LocalOracleConfig) {
        *self.config.lock() = config;
    }

    /// Pin the oracle clock to `timestamp` instead of wall time.
    pub fn freeze_time(&self, timestamp: u64) {
        self.state.lock().frozen_at = Some(timestamp);
    }

    /// Current oracle time in unix seconds.
    pub fn now(&self) -> u64 {
        self.state
            .lock()
            .frozen_at
            .unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp().max(0) as u64)
    }

    /// Look up an assertion.
    pub fn assertion(&self, id: &AssertionId) -> Option<LocalAssertion> {
        self.state.lock().assertions.get(id).cloned()
    }

    /// Dispute a live assertion, pulling a bond equal to the asserter's from
    /// `disputer`.
    pub fn dispute(&self, id: AssertionId, disputer: Address) -> Result<OracleCallback, OracleError> {
        let now = self.now();
        let mut state = self.state.lock();
        let assertion = state
            .assertions
            .get_mut(&id)
            .ok_or(OracleError::UnknownAssertion(id))?;

        if assertion.settled {
            return Err(OracleError::AlreadySettled(id));
        }
        if assertion.disputer.is_some() {
            return Err(OracleError::AlreadyDisputed(id));
        }
        if now >= assertion.expires_at {
            return Err(OracleError::LivenessExpired(id));
        }

        let bond = assertion.request.bond;
        self.treasury.pull(disputer, bond)?;
        assertion.disputer = Some(disputer);
        assertion.dispute_bond = bond;
        warn!(assertion = %id, %disputer, bond, "assertion disputed");
        Ok(OracleCallback::Disputed { assertion: id })
    }

    /// Finalize an undisputed assertion whose liveness has passed.
    pub fn settle(&self, id: AssertionId) -> Result<OracleCallback, OracleError> {
        let now = self.now();
        let mut state = self.state.lock();
        let assertion = state
            .assertions
            .get_mut(&id)
            .ok_or(OracleError::UnknownAssertion(id))?;

        if assertion.settled {
            return Err(OracleError::AlreadySettled(id));
        }
        if assertion.disputer.is_some() {
            return Err(OracleError::DisputePending(id));
        }
        if now < assertion.expires_at {
            return Err(OracleError::LivenessActive {
                assertion: id,
                expires_at: assertion.expires_at,
            });
        }

        self.finalize(id, assertion, true)
    }

    /// Decide a disputed assertion.
    pub fn arbitrate(&self, id: AssertionId, truthful: bool) -> Result<OracleCallback, OracleError> {
        let mut state = self.state.lock();
        let assertion = state
            .assertions
            .get_mut(&id)
            .ok_or(OracleError::UnknownAssertion(id))?;

        if assertion.settled {
            return Err(OracleError::AlreadySettled(id));
        }
        if assertion.disputer.is_none() {
            return Err(OracleError::NotDisputed(id));
        }

        self.finalize(id, assertion, truthful)
    }

    /// Settle every undisputed assertion whose liveness has passed.
    ///
    /// An assertion whose bond cannot be returned stays pending and is
    /// retried on the next sweep.
    pub fn expired(&self) -> Vec<OracleCallback> {
        let now = self.now();
        let mut state = self.state.lock();
        let mut due: Vec<(u64, AssertionId)> = state
            .assertions
            .iter()
            .filter(|(_, a)| !a.settled && a.disputer.is_none() && now >= a.expires_at)
            .map(|(id, a)| (a.submitted_at, *id))
            .collect();
        due.sort();

        let mut callbacks = Vec::with_capacity(due.len());
        for (_, id) in due {
            let Some(assertion) = state.assertions.get_mut(&id) else {
                continue;
            };
            match self.finalize(id, assertion, true) {
                Ok(callback) => callbacks.push(callback),
                Err(e) => warn!(assertion = %id, error = %e, "expired assertion left pending"),
            }
        }
        if !callbacks.is_empty() {
            debug!(count = callbacks.len(), "expired assertions settled");
        }
        callbacks
    }

    /// Number of assertions ever submitted.
    pub fn submitted_count(&self) -> usize {
        self.state.lock().assertions.len()
    }

    fn finalize(
        &self,
        id: AssertionId,
        assertion: &mut LocalAssertion,
        truthful: bool,
    ) -> Result<OracleCallback, OracleError> {
        if let Some((winner, amount)) = assertion.payout(truthful)? {
            self.treasury.push(winner, amount)?;
            debug!(assertion = %id, %winner, amount, "bonds paid out");
        }
        assertion.settled = true;
        info!(assertion = %id, truthful, disputed = assertion.disputer.is_some(), "assertion finalized");
        Ok(OracleCallback::Resolved {
            assertion: id,
            truthful,
        })
    }
}

impl OracleAdapter for LocalOracle {
    fn address(&self) -> Address {
        self.address
    }

    fn quote_minimum_bond(&self, currency: &str) -> Result<u128, OracleError> {
        let config = self.config.lock();
        if config.fail_quote {
            return Err(OracleError::QuoteFailed(format!(
                "no bond quote available for {}",
                currency
            )));
        }
        Ok(config.minimum_bond)
    }

    fn submit_assertion(&self, request: AssertionRequest) -> Result<AssertionId, OracleError> {
        let (fail, minimum_bond) = {
            let config = self.config.lock();
            (config.fail_submissions, config.minimum_bond)
        };
        if fail {
            return Err(OracleError::SubmissionFailed(
                "oracle unavailable".to_string(),
            ));
        }
        if request.bond < minimum_bond {
            return Err(OracleError::SubmissionFailed(format!(
                "bond {} below minimum {}",
                request.bond, minimum_bond
            )));
        }

        let now = self.now();
        let mut state = self.state.lock();
        state.nonce += 1;

        let mut preimage = Vec::with_capacity(request.claim.len() + 48);
        preimage.extend_from_slice(&state.nonce.to_be_bytes());
        preimage.extend_from_slice(request.asserter.as_slice());
        preimage.extend_from_slice(&now.to_be_bytes());
        preimage.extend_from_slice(request.claim.as_bytes());
        let id = AssertionId(keccak256(&preimage));

        let expires_at = now.saturating_add(request.liveness_seconds);
        debug!(assertion = %id, asserter = %request.asserter, expires_at, "assertion opened");
        state.assertions.insert(
            id,
            LocalAssertion {
                request,
                submitted_at: now,
                expires_at,
                disputer: None,
                dispute_bond: 0,
                settled: false,
            },
        );
        Ok(id)
    }
}
