//! Collateral custody.
//!
//! Value moves between participants and the engine's custody account only
//! through a [`Treasury`]. The engine never holds a balance it cannot
//! account for in its own books.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use tracing::debug;

use crate::error::TreasuryError;

/// Collateral token boundary.
pub trait Treasury: Send + Sync {
    /// Move `amount` from `from` into engine custody.
    fn pull(&self, from: Address, amount: u128) -> Result<(), TreasuryError>;

    /// Move `amount` out of engine custody to `to`.
    fn push(&self, to: Address, amount: u128) -> Result<(), TreasuryError>;

    /// Amount currently held in engine custody.
    fn custody_balance(&self) -> u128;
}

/// In-process collateral token.
///
/// Each handle has one custody account. Handles made with
/// [`InMemoryTreasury::account`] share the same balances.
#[derive(Debug, Clone)]
pub struct InMemoryTreasury {
    custody: Address,
    balances: Arc<DashMap<Address, u128>>,
}

impl InMemoryTreasury {
    /// Create a treasury whose custody account is `custody`.
    pub fn new(custody: Address) -> Self {
        Self {
            custody,
            balances: Arc::new(DashMap::new()),
        }
    }

    /// Handle over the same balances with `custody` as its custody account.
    pub fn account(&self, custody: Address) -> Self {
        Self {
            custody,
            balances: Arc::clone(&self.balances),
        }
    }

    /// Credit `amount` to `account` out of thin air (funding for tests and
    /// local runs).
    pub fn deposit(&self, account: Address, amount: u128) -> Result<(), TreasuryError> {
        let mut entry = self.balances.entry(account).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(TreasuryError::Overflow)?;
        Ok(())
    }

    /// Balance of `account`.
    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).map(|b| *b).unwrap_or(0)
    }

    /// The custody account.
    pub fn custody(&self) -> Address {
        self.custody
    }

    fn transfer(&self, from: Address, to: Address, amount: u128) -> Result<(), TreasuryError> {
        if from == to || amount == 0 {
            return Ok(());
        }
        let balance = self.balance_of(&from);
        if balance < amount {
            return Err(TreasuryError::InsufficientFunds {
                account: from,
                balance,
                required: amount,
            });
        }
        let credited = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(TreasuryError::Overflow)?;

        self.balances.insert(from, balance - amount);
        self.balances.insert(to, credited);
        debug!(%from, %to, amount, "collateral transferred");
        Ok(())
    }
}

impl Treasury for InMemoryTreasury {
    fn pull(&self, from: Address, amount: u128) -> Result<(), TreasuryError> {
        self.transfer(from, self.custody, amount)
    }

    fn push(&self, to: Address, amount: u128) -> Result<(), TreasuryError> {
        self.transfer(self.custody, to, amount)
    }

    fn custody_balance(&self) -> u128 {
        self.balance_of(&self.custody)
    }
}
