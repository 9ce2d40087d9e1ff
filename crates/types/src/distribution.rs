//! Per-cycle distribution record
//!
//! Written exactly once per successful distribution and never mutated
//! afterwards. Kept in a history keyed by cycle number for audit.

use crate::units::{checked_sum, Amount, CycleNumber, Identity, Tick};
use serde::{Deserialize, Serialize};

/// Payout to a single recipient within a distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientPayout {
    pub recipient: Identity,
    pub fixed_share: Amount,
    pub voted_share: Amount,
}

impl RecipientPayout {
    /// Total paid to this recipient
    pub fn total(&self) -> Amount {
        self.fixed_share.saturating_add(self.voted_share)
    }
}

/// Immutable snapshot of one cycle's distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// Cycle that was closed by this distribution
    pub cycle: CycleNumber,
    /// Tick at which the distribution executed
    pub executed_at: Tick,
    pub total_yield: Amount,
    pub fixed_amount: Amount,
    pub voted_amount: Amount,
    /// Sum of weighted votes used as the voted-split denominator
    pub total_weighted_votes: Amount,
    /// Ordered payouts, index-aligned with the recipient list at execution
    pub payouts: Vec<RecipientPayout>,
}

impl Distribution {
    /// Recipient identities in payout order
    pub fn recipients(&self) -> Vec<Identity> {
        self.payouts.iter().map(|p| p.recipient).collect()
    }

    /// Checks the conservation invariants:
    /// - fixed + voted == total
    /// - sum(fixed shares) == fixed
    /// - sum(voted shares) == voted
    pub fn is_balanced(&self) -> bool {
        let fixed: Vec<Amount> = self.payouts.iter().map(|p| p.fixed_share).collect();
        let voted: Vec<Amount> = self.payouts.iter().map(|p| p.voted_share).collect();

        self.fixed_amount.checked_add(self.voted_amount) == Some(self.total_yield)
            && checked_sum(&fixed) == Some(self.fixed_amount)
            && checked_sum(&voted) == Some(self.voted_amount)
    }

    /// Amount paid to `recipient`, zero if absent
    pub fn paid_to(&self, recipient: &Identity) -> Amount {
        self.payouts
            .iter()
            .filter(|p| &p.recipient == recipient)
            .map(RecipientPayout::total)
            .sum()
    }
}
