//! Account ledger interface for yield payouts
//!
//! Holds balances for the distributor's custody account and every
//! recipient. Payouts go through `transfer_batch`, which must be
//! all-or-nothing: either every credit lands or no balance changes.

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use yieldsplit_types::{short_id, Amount, Identity};

/// Ledger shared between the yield source and the distributor
pub type SharedLedger = Arc<Mutex<dyn AccountLedger>>;

/// Interface for account ledger operations.
pub trait AccountLedger: Send + Sync {
    /// Credit an account.
    fn credit(&mut self, account: &Identity, amount: Amount) -> Result<()>;

    /// Debit an account; fails without change if the balance is short.
    fn debit(&mut self, account: &Identity, amount: Amount) -> Result<()>;

    fn balance_of(&self, account: &Identity) -> Result<Amount>;

    /// Sum of all balances.
    fn total_supply(&self) -> Result<Amount>;

    /// Snapshot of every balance.
    fn all_balances(&self) -> Result<HashMap<Identity, Amount>>;

    /// Move `transfers` out of `from` atomically.
    fn transfer_batch(&mut self, from: &Identity, transfers: &[(Identity, Amount)]) -> Result<()>;
}

/// Apply a batch to a copy of `balances`, returning the new map. Leaves the
/// input untouched on any failure.
fn apply_batch(
    balances: &HashMap<Identity, Amount>,
    from: &Identity,
    transfers: &[(Identity, Amount)],
) -> Result<HashMap<Identity, Amount>> {
    let total = transfers
        .iter()
        .try_fold(0u128, |acc, (_, amount)| acc.checked_add(*amount))
        .ok_or_else(|| anyhow!("Transfer batch total overflows"))?;
    let available = balances.get(from).copied().unwrap_or(0);
    if available < total {
        return Err(anyhow!(
            "Insufficient balance in {}: {} < {}",
            short_id(from),
            available,
            total
        ));
    }

    let mut next = balances.clone();
    next.insert(*from, available - total);
    for (to, amount) in transfers {
        let entry = next.entry(*to).or_insert(0);
        *entry = entry
            .checked_add(*amount)
            .ok_or_else(|| anyhow!("Balance overflow for {}", short_id(to)))?;
    }
    Ok(next)
}

// -----------------------------------------------------------------------------
// In-memory implementation
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryAccountLedger {
    balances: HashMap<Identity, Amount>,
    total_supply: Amount,
}

impl InMemoryAccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into the shared handle used by collaborators
    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }
}

impl AccountLedger for InMemoryAccountLedger {
    fn credit(&mut self, account: &Identity, amount: Amount) -> Result<()> {
        let current = self.balances.get(account).copied().unwrap_or(0);
        let balance = current
            .checked_add(amount)
            .ok_or_else(|| anyhow!("Balance overflow for {}", short_id(account)))?;
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| anyhow!("Total supply overflow"))?;
        self.balances.insert(*account, balance);
        self.total_supply = supply;
        Ok(())
    }

    fn debit(&mut self, account: &Identity, amount: Amount) -> Result<()> {
        let current = self.balances.get(account).copied().unwrap_or(0);
        if current < amount {
            return Err(anyhow!("Insufficient balance"));
        }
        self.balances.insert(*account, current - amount);
        self.total_supply = self.total_supply.saturating_sub(amount);
        Ok(())
    }

    fn balance_of(&self, account: &Identity) -> Result<Amount> {
        Ok(self.balances.get(account).copied().unwrap_or(0))
    }

    fn total_supply(&self) -> Result<Amount> {
        Ok(self.total_supply)
    }

    fn all_balances(&self) -> Result<HashMap<Identity, Amount>> {
        Ok(self.balances.clone())
    }

    fn transfer_batch(&mut self, from: &Identity, transfers: &[(Identity, Amount)]) -> Result<()> {
        self.balances = apply_batch(&self.balances, from, transfers)?;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Mock ledger with failure injection
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct MockAccountLedger {
    inner: InMemoryAccountLedger,
    batch_calls: Vec<(Identity, Vec<(Identity, Amount)>)>,
    rejected_recipients: HashSet<Identity>,
}

impl MockAccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any batch paying `account` fails as a whole
    pub fn reject_transfers_to(&mut self, account: Identity) {
        self.rejected_recipients.insert(account);
    }

    pub fn accept_all(&mut self) {
        self.rejected_recipients.clear();
    }

    /// Every attempted batch, including rejected ones
    pub fn batch_calls(&self) -> &[(Identity, Vec<(Identity, Amount)>)] {
        &self.batch_calls
    }
}

impl AccountLedger for MockAccountLedger {
    fn credit(&mut self, account: &Identity, amount: Amount) -> Result<()> {
        self.inner.credit(account, amount)
    }

    fn debit(&mut self, account: &Identity, amount: Amount) -> Result<()> {
        self.inner.debit(account, amount)
    }

    fn balance_of(&self, account: &Identity) -> Result<Amount> {
        self.inner.balance_of(account)
    }

    fn total_supply(&self) -> Result<Amount> {
        self.inner.total_supply()
    }

    fn all_balances(&self) -> Result<HashMap<Identity, Amount>> {
        self.inner.all_balances()
    }

    fn transfer_batch(&mut self, from: &Identity, transfers: &[(Identity, Amount)]) -> Result<()> {
        self.batch_calls.push((*from, transfers.to_vec()));
        if let Some((to, _)) = transfers
            .iter()
            .find(|(to, _)| self.rejected_recipients.contains(to))
        {
            return Err(anyhow!("Transfer to {} rejected", short_id(to)));
        }
        self.inner.transfer_batch(from, transfers)
    }
}
