//! Fungible balance ledger for one outcome of one market.

use std::collections::HashMap;

use alloy::primitives::Address;

use crate::error::LedgerError;
use crate::market::{MarketId, Side};

/// Index of a ledger in the engine's ledger arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimId(pub(crate) usize);

impl ClaimId {
    /// Position in the arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Balances of one outcome claim.
///
/// `total_supply` always equals the sum of all balances. Zero balances are
/// removed so `holders()` only yields live positions.
#[derive(Debug, Clone)]
pub struct ClaimLedger {
    id: ClaimId,
    market: MarketId,
    side: Side,
    label: String,
    balances: HashMap<Address, u128>,
    allowances: HashMap<(Address, Address), u128>,
    total_supply: u128,
}

impl ClaimLedger {
    /// Create an empty ledger.
    pub(crate) fn new(id: ClaimId, market: MarketId, side: Side, label: impl Into<String>) -> Self {
        Self {
            id,
            market,
            side,
            label: label.into(),
            balances: HashMap::new(),
            allowances: HashMap::new(),
            total_supply: 0,
        }
    }

    /// Arena handle of this ledger.
    pub fn id(&self) -> ClaimId {
        self.id
    }

    /// Market that owns this ledger.
    pub fn market(&self) -> MarketId {
        self.market
    }

    /// Which outcome this ledger represents.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Outcome label the claim pays out on.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Balance of `holder`.
    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// Total outstanding claims.
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Remaining amount `spender` may move out of `owner`.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Holders with non-zero balances.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &u128)> {
        self.balances.iter()
    }

    /// Credit `amount` new claims to `holder`.
    pub(crate) fn mint(&mut self, holder: Address, amount: u128) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let balance = self
            .balance_of(&holder)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        self.total_supply = supply;
        self.balances.insert(holder, balance);
        Ok(())
    }

    /// Destroy `amount` claims held by `holder`.
    pub(crate) fn burn(&mut self, holder: Address, amount: u128) -> Result<(), LedgerError> {
        self.debit(holder, amount)?;
        // supply >= any single balance, so this cannot underflow
        self.total_supply -= amount;
        Ok(())
    }

    /// Move `amount` from `from` to `to`.
    pub fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<(), LedgerError> {
        let credited = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        if from == to {
            // self-transfer still requires the balance
            let balance = self.balance_of(&from);
            if balance < amount {
                return Err(LedgerError::InsufficientBalance {
                    holder: from,
                    balance,
                    required: amount,
                });
            }
            return Ok(());
        }
        self.debit(from, amount)?;
        if credited > 0 {
            self.balances.insert(to, credited);
        }
        Ok(())
    }

    /// Set the allowance of `spender` over `owner`'s balance.
    pub fn approve(&mut self, owner: Address, spender: Address, amount: u128) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    /// Move `amount` from `owner` to `to` on behalf of `spender`.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let allowance = self.allowance(&owner, &spender);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner,
                spender,
                allowance,
                required: amount,
            });
        }
        self.transfer(owner, to, amount)?;
        self.approve(owner, spender, allowance - amount);
        Ok(())
    }

    fn debit(&mut self, holder: Address, amount: u128) -> Result<(), LedgerError> {
        let balance = self.balance_of(&holder);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                holder,
                balance,
                required: amount,
            });
        }
        let remaining = balance - amount;
        if remaining == 0 {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, remaining);
        }
        Ok(())
    }
}
