use std::collections::BTreeMap;

use crate::error::TreasuryError;
use crate::types::{validate_amount, validate_entity_id};

/// Authoritative in-memory map of account balances.
///
/// Accounts are created lazily on first credit/debit reference; reading an
/// unseen id returns 0 without creating it. Balances are signed so that a
/// corrupted snapshot can be loaded and then repaired by the anomaly sweep,
/// but every mutation path validates before touching state.
#[derive(Debug, Default, Clone)]
pub struct LedgerStore {
    balances: BTreeMap<String, i64>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the store from a persisted snapshot document.
    pub fn from_snapshot(balances: BTreeMap<String, i64>) -> Self {
        Self { balances }
    }

    /// Balance for `id`, 0 for an unseen account. No implicit creation.
    pub fn balance(&self, id: &str) -> i64 {
        self.balances.get(id).copied().unwrap_or(0)
    }

    /// Total currency in circulation across all accounts.
    pub fn total_supply(&self) -> i64 {
        self.balances.values().sum()
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Increase `id`'s balance by `amount`. Creates the account on first
    /// reference. Returns the new balance.
    pub fn credit(&mut self, id: &str, amount: i64) -> Result<i64, TreasuryError> {
        validate_entity_id(id)?;
        validate_amount(amount)?;
        let balance = self.balances.entry(id.to_string()).or_insert(0);
        *balance += amount;
        Ok(*balance)
    }

    /// Decrease `id`'s balance by `amount`. Fails with `InsufficientFunds`
    /// when the account cannot cover it. Returns the new balance.
    pub fn debit(&mut self, id: &str, amount: i64) -> Result<i64, TreasuryError> {
        validate_entity_id(id)?;
        validate_amount(amount)?;
        let available = self.balance(id);
        if amount > available {
            return Err(TreasuryError::InsufficientFunds {
                account: id.to_string(),
                requested: amount,
                available,
            });
        }
        let balance = self.balances.entry(id.to_string()).or_insert(0);
        *balance -= amount;
        Ok(*balance)
    }

    /// Move `amount` from one account to another.
    ///
    /// Composed as debit-then-credit. The debit validates first, so a reject
    /// leaves no partial effect; there is however no rollback across a crash
    /// between the two steps (accepted risk).
    pub fn transfer(&mut self, from: &str, to: &str, amount: i64) -> Result<(), TreasuryError> {
        validate_entity_id(to)?;
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        Ok(())
    }

    /// Remove `amount` from circulation: a debit with no destination,
    /// modeling payment to the central issuer. Returns the new balance.
    pub fn destroy(&mut self, id: &str, amount: i64) -> Result<i64, TreasuryError> {
        self.debit(id, amount)
    }

    /// Administrative reset clearing every account.
    pub fn reset(&mut self) {
        self.balances.clear();
    }

    /// Snapshot document for the persistence gateway.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.balances.clone()
    }

    pub(crate) fn balances_mut(&mut self) -> &mut BTreeMap<String, i64> {
        &mut self.balances
    }
}
