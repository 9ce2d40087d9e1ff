//! Yield source collaborator
//!
//! The token mechanics that accrue yield live elsewhere; the distributor
//! only asks how much has accrued and claims it into custody.

use crate::account_ledger::SharedLedger;
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use yieldsplit_types::{short_id, Amount, Identity};

pub trait YieldSource: Send + Sync {
    /// Yield accrued and not yet claimed
    fn accrued_yield(&self) -> Result<Amount>;

    /// Move `amount` of accrued yield to `to`
    fn claim(&self, amount: Amount, to: &Identity) -> Result<()>;
}

/// Yield source that mints claimed yield into a shared ledger
pub struct InMemoryYieldSource {
    accrued: Mutex<Amount>,
    ledger: SharedLedger,
    fail_claims: AtomicBool,
}

impl InMemoryYieldSource {
    pub fn new(ledger: SharedLedger) -> Self {
        Self {
            accrued: Mutex::new(0),
            ledger,
            fail_claims: AtomicBool::new(false),
        }
    }

    /// Add newly accrued yield
    pub fn accrue(&self, amount: Amount) {
        let mut accrued = self.accrued.lock();
        *accrued = accrued.saturating_add(amount);
    }

    /// Make every subsequent claim fail
    pub fn set_fail_claims(&self, fail: bool) {
        self.fail_claims.store(fail, Ordering::SeqCst);
    }
}

impl YieldSource for InMemoryYieldSource {
    fn accrued_yield(&self) -> Result<Amount> {
        Ok(*self.accrued.lock())
    }

    fn claim(&self, amount: Amount, to: &Identity) -> Result<()> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(anyhow!("Yield source unavailable"));
        }
        let mut accrued = self.accrued.lock();
        if *accrued < amount {
            return Err(anyhow!("Claim of {} exceeds accrued {}", amount, *accrued));
        }
        self.ledger.lock().credit(to, amount)?;
        *accrued -= amount;
        debug!(target: "treasury", amount, to = %short_id(to), "Yield claimed");
        Ok(())
    }
}
