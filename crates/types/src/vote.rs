//! Vote records and the per-cycle running tally

use crate::units::{Amount, CycleNumber, Identity, Tick};
use serde::{Deserialize, Serialize};

/// A single voter's allocation for one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Voter identity
    pub voter: Identity,
    /// Cycle the vote counts towards
    pub cycle: CycleNumber,
    /// Points per recipient slot, index-aligned with the active recipient list
    pub points: Vec<u32>,
    /// Summed voting power at the time of the vote
    pub voting_power: Amount,
    /// `voting_power * points[i] / precision`, as added to the tally
    pub contributions: Vec<Amount>,
    /// Tick at which the vote was accepted
    pub cast_at: Tick,
    /// Replay nonce when the vote arrived signed
    #[serde(default)]
    pub nonce: Option<u64>,
}

/// Weighted vote accumulator for one cycle.
///
/// `per_recipient` only grows; a slot beyond its length is a recipient with
/// no votes yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningTally {
    pub cycle: CycleNumber,
    pub total_voting_power_used: Amount,
    pub per_recipient: Vec<Amount>,
}

impl RunningTally {
    pub fn new(cycle: CycleNumber) -> Self {
        Self {
            cycle,
            total_voting_power_used: 0,
            per_recipient: Vec::new(),
        }
    }

    /// Add a vote's contributions. Returns None on overflow, leaving the
    /// tally untouched.
    pub fn add(&mut self, contributions: &[Amount], power: Amount) -> Option<()> {
        let mut next = self.per_recipient.clone();
        if next.len() < contributions.len() {
            next.resize(contributions.len(), 0);
        }
        for (slot, value) in next.iter_mut().zip(contributions) {
            *slot = slot.checked_add(*value)?;
        }
        let total = self.total_voting_power_used.checked_add(power)?;
        self.per_recipient = next;
        self.total_voting_power_used = total;
        Some(())
    }

    /// Remove a previously added vote. Returns None if the tally does not
    /// contain those contributions, leaving the tally untouched.
    pub fn subtract(&mut self, contributions: &[Amount], power: Amount) -> Option<()> {
        if contributions.len() > self.per_recipient.len() {
            return None;
        }
        let mut next = self.per_recipient.clone();
        for (slot, value) in next.iter_mut().zip(contributions) {
            *slot = slot.checked_sub(*value)?;
        }
        let total = self.total_voting_power_used.checked_sub(power)?;
        self.per_recipient = next;
        self.total_voting_power_used = total;
        Some(())
    }

    /// Weighted votes padded (or cut) to `recipient_count` slots
    pub fn weighted_votes(&self, recipient_count: usize) -> Vec<Amount> {
        let mut votes = self.per_recipient.clone();
        votes.resize(recipient_count, 0);
        votes
    }

    /// Sum of all per-recipient weighted votes
    pub fn total_weighted(&self) -> Option<Amount> {
        crate::units::checked_sum(&self.per_recipient)
    }

    /// Whether any recipient slot beyond `recipient_count` holds votes
    pub fn has_votes_beyond(&self, recipient_count: usize) -> bool {
        self.per_recipient
            .iter()
            .skip(recipient_count)
            .any(|v| *v > 0)
    }
}
