//! Voting power strategies
//!
//! A voter's power is the sum over every configured strategy. Strategies are
//! read-only from the ledger's point of view; their backing data is updated
//! by whoever owns the stake or balance source.

use crate::errors::{GovernanceError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use yieldsplit_types::{Amount, CycleContext, Identity, Tick};

/// Source of voting power for one identity
pub trait VotingPowerStrategy: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Power of `voter` for the cycle described by `ctx`
    fn power_of(&self, voter: &Identity, ctx: &CycleContext) -> Result<Amount>;
}

/// Ordered set of strategies whose answers are summed
#[derive(Clone, Default)]
pub struct PowerStrategies {
    strategies: Vec<Arc<dyn VotingPowerStrategy>>,
}

impl PowerStrategies {
    pub fn new(strategies: Vec<Arc<dyn VotingPowerStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn push(&mut self, strategy: Arc<dyn VotingPowerStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Sum of every strategy's answer for `voter`. A failing strategy is
    /// reported as `PowerStrategy` under its name.
    pub fn total_power(&self, voter: &Identity, ctx: &CycleContext) -> Result<Amount> {
        let mut total: Amount = 0;
        for strategy in &self.strategies {
            let power = strategy
                .power_of(voter, ctx)
                .map_err(|e| GovernanceError::PowerStrategy {
                    strategy: strategy.name(),
                    reason: e.to_string(),
                })?;
            total = total
                .checked_add(power)
                .ok_or(GovernanceError::ArithmeticOverflow("voting power sum"))?;
        }
        Ok(total)
    }
}

impl std::fmt::Debug for PowerStrategies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.name()))
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Stake table
// -----------------------------------------------------------------------------

/// Power equal to a directly assigned stake
#[derive(Debug, Default)]
pub struct StakeWeightedPower {
    stakes: RwLock<HashMap<Identity, Amount>>,
}

impl StakeWeightedPower {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update an identity's stake
    pub fn update_stake(&self, who: Identity, stake: Amount) {
        self.stakes.write().insert(who, stake);
    }

    /// Remove an identity's stake
    pub fn remove_stake(&self, who: &Identity) {
        self.stakes.write().remove(who);
    }

    pub fn stake_of(&self, who: &Identity) -> Amount {
        self.stakes.read().get(who).copied().unwrap_or(0)
    }

    /// Sum of all stakes (saturating)
    pub fn total_stake(&self) -> Amount {
        self.stakes
            .read()
            .values()
            .fold(0u128, |acc, s| acc.saturating_add(*s))
    }
}

impl VotingPowerStrategy for StakeWeightedPower {
    fn name(&self) -> &'static str {
        "stake"
    }

    fn power_of(&self, voter: &Identity, _ctx: &CycleContext) -> Result<Amount> {
        Ok(self.stake_of(voter))
    }
}

// -----------------------------------------------------------------------------
// Balance checkpoints
// -----------------------------------------------------------------------------

/// Power equal to the tick-weighted average balance held over the previous
/// cycle window `[start - length, start)`.
///
/// Balance acquired after the current cycle started does not count towards
/// votes in it.
#[derive(Debug, Default)]
pub struct CheckpointedBalancePower {
    /// identity → (tick, balance from that tick on), sorted by tick
    checkpoints: RwLock<HashMap<Identity, Vec<(Tick, Amount)>>>,
}

impl CheckpointedBalancePower {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `who` holds `balance` from `tick` on. Checkpoints must be
    /// recorded in non-decreasing tick order; the same tick overwrites.
    pub fn record_balance(&self, who: Identity, tick: Tick, balance: Amount) -> Result<()> {
        let mut checkpoints = self.checkpoints.write();
        let entries = checkpoints.entry(who).or_default();
        match entries.last().map(|(last_tick, _)| *last_tick) {
            Some(last_tick) if last_tick > tick => {
                return Err(GovernanceError::InvalidParameter(
                    "balance checkpoints must be recorded in tick order",
                ));
            }
            Some(last_tick) if last_tick == tick => {
                if let Some(last) = entries.last_mut() {
                    last.1 = balance;
                }
            }
            _ => entries.push((tick, balance)),
        }
        Ok(())
    }

    /// Balance in effect at `tick`
    pub fn balance_at(&self, who: &Identity, tick: Tick) -> Amount {
        self.checkpoints
            .read()
            .get(who)
            .and_then(|entries| entries.iter().rev().find(|(t, _)| *t <= tick))
            .map(|(_, balance)| *balance)
            .unwrap_or(0)
    }

    /// Sum of `balance * ticks` over `[from, to)`
    pub fn tick_weighted_sum(&self, who: &Identity, from: Tick, to: Tick) -> Result<Amount> {
        let checkpoints = self.checkpoints.read();
        let Some(entries) = checkpoints.get(who) else {
            return Ok(0);
        };

        let mut acc: Amount = 0;
        for (i, (tick, balance)) in entries.iter().enumerate() {
            let seg_start = (*tick).max(from);
            let seg_end = entries
                .get(i + 1)
                .map(|(next, _)| *next)
                .unwrap_or(Tick::MAX)
                .min(to);
            if seg_end <= seg_start {
                continue;
            }
            let weighted = balance
                .checked_mul((seg_end - seg_start) as u128)
                .ok_or(GovernanceError::ArithmeticOverflow("tick-weighted balance"))?;
            acc = acc
                .checked_add(weighted)
                .ok_or(GovernanceError::ArithmeticOverflow("tick-weighted balance"))?;
        }
        Ok(acc)
    }
}

impl VotingPowerStrategy for CheckpointedBalancePower {
    fn name(&self) -> &'static str {
        "checkpointed-balance"
    }

    fn power_of(&self, voter: &Identity, ctx: &CycleContext) -> Result<Amount> {
        let (from, to) = ctx.previous_window();
        if to <= from {
            // no completed window yet: use the balance held at cycle start
            return Ok(self.balance_at(voter, ctx.start_tick));
        }
        let sum = self.tick_weighted_sum(voter, from, to)?;
        Ok(sum / (to - from) as u128)
    }
}
