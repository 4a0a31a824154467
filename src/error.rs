//! Unified error types for the market engine.

use alloy::primitives::Address;
use thiserror::Error;

use crate::market::MarketId;
use crate::oracle::AssertionId;

/// Unified error type for the service binary and its wiring.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Market engine error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by market engine entry points.
///
/// Every rejected precondition maps to exactly one variant. A failed call
/// leaves no observable partial effects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Caller failed the registry authorization check.
    #[error("caller {caller} is not authorized")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// No market with this id exists.
    #[error("market {0} not found")]
    MarketNotFound(MarketId),

    /// Caller holds no redeemable balance.
    #[error("nothing to settle for {holder} in market {market}")]
    NothingToSettle {
        /// Market being settled.
        market: MarketId,
        /// Holder with no redeemable balance.
        holder: Address,
    },

    /// Market is already resolved.
    #[error("market {0} is already resolved")]
    MarketResolved(MarketId),

    /// Another assertion is in flight for this market.
    #[error("market {market} already has active assertion {assertion}")]
    ActiveAssertionExists {
        /// Market with the in-flight assertion.
        market: MarketId,
        /// The in-flight assertion.
        assertion: AssertionId,
    },

    /// Market has not been resolved yet.
    #[error("market {0} is not resolved")]
    MarketNotResolved(MarketId),

    /// Asserted label matches neither outcome nor the unresolvable literal.
    #[error("invalid outcome label: {0:?}")]
    InvalidOutcome(String),

    /// Amount must be non-zero.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Trade output fell below the caller's slippage limit.
    #[error("insufficient output: got {output}, minimum {minimum}")]
    InsufficientOutput {
        /// Output the trade would produce.
        output: u128,
        /// Minimum the caller accepts.
        minimum: u128,
    },

    /// Venue reserve cannot price the trade.
    #[error("insufficient liquidity: need {required}, available {available}")]
    InsufficientLiquidity {
        /// Reserve required.
        required: u128,
        /// Reserve available.
        available: u128,
    },

    /// Callback did not originate from the configured oracle.
    #[error("only the oracle may call back, got {caller}")]
    OnlyOracle {
        /// The rejected caller.
        caller: Address,
    },

    /// Callback named an unknown or already consumed assertion.
    #[error("unknown or consumed assertion {0}")]
    UnknownAssertion(AssertionId),

    /// Settlement payout would exceed recorded collateral.
    #[error("collateral underflow in market {market}: payout {payout}, available {available}")]
    CollateralUnderflow {
        /// Market whose books are inconsistent.
        market: MarketId,
        /// Attempted payout.
        payout: u128,
        /// Recorded collateral.
        available: u128,
    },

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// Claim ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Oracle boundary error.
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Collateral custody error.
    #[error("treasury error: {0}")]
    Treasury(#[from] TreasuryError),
}

impl MarketError {
    /// Whether this error indicates broken bookkeeping rather than a
    /// rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MarketError::CollateralUnderflow { .. } | MarketError::ArithmeticOverflow
        )
    }
}

/// Claim ledger errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Holder balance is lower than the requested amount.
    #[error("insufficient balance for {holder}: have {balance}, need {required}")]
    InsufficientBalance {
        /// Holder being debited.
        holder: Address,
        /// Current balance.
        balance: u128,
        /// Requested amount.
        required: u128,
    },

    /// Spender allowance is lower than the requested amount.
    #[error("insufficient allowance for {spender} on {owner}: have {allowance}, need {required}")]
    InsufficientAllowance {
        /// Owner of the balance.
        owner: Address,
        /// Approved spender.
        spender: Address,
        /// Current allowance.
        allowance: u128,
        /// Requested amount.
        required: u128,
    },

    /// Mint amount must be non-zero.
    #[error("mint amount must be greater than zero")]
    ZeroAmount,

    /// Balance or supply would overflow.
    #[error("ledger overflow")]
    Overflow,
}

/// Oracle boundary errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Minimum bond quote failed.
    #[error("bond quote failed: {0}")]
    QuoteFailed(String),

    /// Assertion submission failed.
    #[error("assertion submission failed: {0}")]
    SubmissionFailed(String),

    /// Assertion id unknown to the oracle.
    #[error("unknown assertion {0}")]
    UnknownAssertion(AssertionId),

    /// Assertion already disputed.
    #[error("assertion {0} already disputed")]
    AlreadyDisputed(AssertionId),

    /// Liveness window closed before the dispute arrived.
    #[error("liveness expired for assertion {0}")]
    LivenessExpired(AssertionId),

    /// Liveness window still open.
    #[error("assertion {assertion} still live until {expires_at}")]
    LivenessActive {
        /// Assertion still in its window.
        assertion: AssertionId,
        /// Unix timestamp when the window closes.
        expires_at: u64,
    },

    /// Disputed assertion awaits arbitration.
    #[error("assertion {0} is disputed and awaits arbitration")]
    DisputePending(AssertionId),

    /// Arbitration requested for an undisputed assertion.
    #[error("assertion {0} is not disputed")]
    NotDisputed(AssertionId),

    /// Assertion already settled.
    #[error("assertion {0} already settled")]
    AlreadySettled(AssertionId),

    /// Bond could not be collected or paid out.
    #[error("bond transfer failed: {0}")]
    Bond(#[from] TreasuryError),
}

/// Collateral custody errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreasuryError {
    /// Account cannot cover the transfer.
    #[error("insufficient funds in {account}: have {balance}, need {required}")]
    InsufficientFunds {
        /// Debited account.
        account: Address,
        /// Current balance.
        balance: u128,
        /// Requested amount.
        required: u128,
    },

    /// Balance would overflow.
    #[error("treasury overflow")]
    Overflow,
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, ServiceError>;
