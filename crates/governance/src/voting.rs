//! Vote ledger
//!
//! Accumulates per-recipient weighted votes for the open cycle only:
//!
//! contribution[i] = voting_power * points[i] / precision
//!
//! The ledger never reads the clock or the recipient registry itself; the
//! caller passes the cycle context and the active recipient count, and must
//! serialize `cast_vote` against distribution on the same cycle.

use crate::errors::{GovernanceError, Result};
use crate::parameters::{LedgerParams, RecastPolicy};
use crate::power::PowerStrategies;
use crate::signatures::{SignatureOracle, SignedVote};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};
use yieldsplit_types::{
    mul_div_u128, short_id, Amount, CycleContext, CycleNumber, Identity, RunningTally, VoteRecord,
};

/// Result of an accepted vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub record: VoteRecord,
    /// The vote this one replaced, under `RecastPolicy::Replace`
    pub replaced: Option<VoteRecord>,
}

/// Persisted ledger state used by [`VoteLedger::restore`]
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    /// The open cycle
    pub cycle: CycleNumber,
    /// Checked against the open cycle's records, never trusted alone
    pub open_tally: Option<RunningTally>,
    pub closed_tallies: Vec<RunningTally>,
    /// Vote records of any cycle
    pub records: Vec<VoteRecord>,
    /// Consumed signed-vote nonces
    pub nonces: Vec<(Identity, u64)>,
}

/// Votes validated against a snapshot of the open cycle, not yet applied
#[derive(Debug)]
pub struct StagedVotes {
    state: LedgerState,
    receipts: Vec<VoteReceipt>,
}

impl StagedVotes {
    pub fn receipts(&self) -> &[VoteReceipt] {
        &self.receipts
    }

    pub fn records(&self) -> impl Iterator<Item = &VoteRecord> {
        self.receipts.iter().map(|r| &r.record)
    }

    /// Open-cycle tally as it will be after commit
    pub fn tally(&self) -> &RunningTally {
        &self.state.tally
    }
}

/// Mutable state of the open cycle. Cloned to stage votes.
#[derive(Debug, Clone)]
struct LedgerState {
    cycle: CycleNumber,
    tally: RunningTally,
    ballots: HashMap<Identity, VoteRecord>,
    used_nonces: HashMap<Identity, HashSet<u64>>,
}

impl LedgerState {
    fn new(cycle: CycleNumber) -> Self {
        Self {
            cycle,
            tally: RunningTally::new(cycle),
            ballots: HashMap::new(),
            used_nonces: HashMap::new(),
        }
    }
}

/// Equal up to trailing zero slots
fn same_tally(a: &RunningTally, b: &RunningTally) -> bool {
    let len = a.per_recipient.len().max(b.per_recipient.len());
    a.total_voting_power_used == b.total_voting_power_used
        && a.weighted_votes(len) == b.weighted_votes(len)
}

/// Per-cycle vote accumulator with frozen history
#[derive(Debug)]
pub struct VoteLedger {
    params: LedgerParams,
    strategies: PowerStrategies,
    state: LedgerState,
    closed_tallies: BTreeMap<CycleNumber, RunningTally>,
    closed_ballots: BTreeMap<(CycleNumber, Identity), VoteRecord>,
}

impl VoteLedger {
    /// Create a ledger whose open cycle is `cycle`
    pub fn new(
        params: LedgerParams,
        strategies: PowerStrategies,
        cycle: CycleNumber,
    ) -> Result<Self> {
        params.validate()?;
        if strategies.is_empty() {
            return Err(GovernanceError::InvalidParameter(
                "at least one voting power strategy is required",
            ));
        }
        Ok(Self {
            params,
            strategies,
            state: LedgerState::new(cycle),
            closed_tallies: BTreeMap::new(),
            closed_ballots: BTreeMap::new(),
        })
    }

    /// Rebuild a ledger from persisted state.
    ///
    /// The open tally is always recomputed from the open cycle's records. A
    /// stored open tally that disagrees with them fails the restore with
    /// `TallyInconsistent`.
    pub fn restore(
        params: LedgerParams,
        strategies: PowerStrategies,
        snapshot: LedgerSnapshot,
    ) -> Result<Self> {
        let LedgerSnapshot {
            cycle,
            open_tally,
            closed_tallies,
            records,
            nonces,
        } = snapshot;

        let mut ledger = Self::new(params, strategies, cycle)?;
        for tally in closed_tallies.into_iter().filter(|t| t.cycle < cycle) {
            ledger.closed_tallies.insert(tally.cycle, tally);
        }
        for (voter, nonce) in nonces {
            ledger.state.used_nonces.entry(voter).or_default().insert(nonce);
        }

        let mut rebuilt = RunningTally::new(cycle);
        for record in records {
            if let Some(nonce) = record.nonce {
                ledger
                    .state
                    .used_nonces
                    .entry(record.voter)
                    .or_default()
                    .insert(nonce);
            }
            if record.cycle == cycle {
                rebuilt
                    .add(&record.contributions, record.voting_power)
                    .ok_or(GovernanceError::ArithmeticOverflow("restored tally"))?;
                ledger.state.ballots.insert(record.voter, record);
            } else if record.cycle < cycle {
                ledger
                    .closed_ballots
                    .insert((record.cycle, record.voter), record);
            }
        }

        if let Some(stored) = open_tally {
            if stored.cycle != cycle {
                return Err(GovernanceError::TallyInconsistent(format!(
                    "stored tally is for cycle {} but cycle {} is open",
                    stored.cycle, cycle
                )));
            }
            if !same_tally(&stored, &rebuilt) {
                return Err(GovernanceError::TallyInconsistent(format!(
                    "stored tally of cycle {} ({} power) disagrees with \
                     its {} ballots ({} power)",
                    cycle,
                    stored.total_voting_power_used,
                    ledger.state.ballots.len(),
                    rebuilt.total_voting_power_used
                )));
            }
        }
        ledger.state.tally = rebuilt;
        Ok(ledger)
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    /// Replace ledger parameters. Takes effect for the next vote.
    pub fn set_params(&mut self, params: LedgerParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn current_cycle(&self) -> CycleNumber {
        self.state.cycle
    }

    /// Summed voting power of `voter` for the given cycle context
    pub fn voting_power(&self, voter: &Identity, ctx: &CycleContext) -> Result<Amount> {
        self.strategies.total_power(voter, ctx)
    }

    /// Cast a vote for the open cycle.
    ///
    /// `recipient_count` is the length of the active recipient list; the
    /// point vector must match it exactly.
    pub fn cast_vote(
        &mut self,
        voter: Identity,
        points: &[u32],
        ctx: &CycleContext,
        recipient_count: usize,
    ) -> Result<VoteReceipt> {
        let staged = self.stage_vote(voter, points, ctx, recipient_count)?;
        self.commit(staged)?
            .into_iter()
            .next()
            .ok_or_else(|| GovernanceError::TallyInconsistent("empty staged vote".to_string()))
    }

    /// Cast a batch of signed votes atomically: any failure rejects the
    /// whole batch and leaves the ledger untouched.
    pub fn cast_signed_batch(
        &mut self,
        oracle: &dyn SignatureOracle,
        votes: &[SignedVote],
        ctx: &CycleContext,
        recipient_count: usize,
    ) -> Result<Vec<VoteReceipt>> {
        let staged = self.stage_signed_batch(oracle, votes, ctx, recipient_count)?;
        let receipts = self.commit(staged)?;
        info!(
            target: "governance",
            cycle = self.state.cycle,
            votes = receipts.len(),
            "Signed vote batch accepted"
        );
        Ok(receipts)
    }

    /// Validate a vote against a copy of the open cycle without applying it
    pub fn stage_vote(
        &self,
        voter: Identity,
        points: &[u32],
        ctx: &CycleContext,
        recipient_count: usize,
    ) -> Result<StagedVotes> {
        let mut state = self.state.clone();
        let receipt = self.apply_vote(&mut state, voter, points, ctx, recipient_count, None)?;
        Ok(StagedVotes {
            state,
            receipts: vec![receipt],
        })
    }

    /// Authenticate and validate a signed batch without applying it
    pub fn stage_signed_batch(
        &self,
        oracle: &dyn SignatureOracle,
        votes: &[SignedVote],
        ctx: &CycleContext,
        recipient_count: usize,
    ) -> Result<StagedVotes> {
        if votes.len() > self.params.max_batch_size {
            return Err(GovernanceError::BatchTooLarge {
                size: votes.len(),
                max: self.params.max_batch_size,
            });
        }

        let mut staged = self.state.clone();
        let mut receipts = Vec::with_capacity(votes.len());

        for vote in votes {
            let payload = &vote.payload;
            let voter = oracle.recover_voter(payload, &vote.signature)?;
            if voter != payload.voter {
                return Err(GovernanceError::InvalidSignature(format!(
                    "signature proves {} but payload claims {}",
                    short_id(&voter),
                    short_id(&payload.voter)
                )));
            }
            if payload.cycle != ctx.number {
                return Err(GovernanceError::WrongCycle {
                    expected: ctx.number,
                    got: payload.cycle,
                });
            }
            let nonce_used = staged
                .used_nonces
                .get(&voter)
                .map(|nonces| nonces.contains(&payload.nonce))
                .unwrap_or(false);
            if nonce_used {
                return Err(GovernanceError::NonceAlreadyUsed {
                    voter: short_id(&voter),
                    nonce: payload.nonce,
                });
            }

            let receipt = self.apply_vote(
                &mut staged,
                voter,
                &payload.points,
                ctx,
                recipient_count,
                Some(payload.nonce),
            )?;
            staged
                .used_nonces
                .entry(voter)
                .or_default()
                .insert(payload.nonce);
            receipts.push(receipt);
        }

        Ok(StagedVotes {
            state: staged,
            receipts,
        })
    }

    /// Apply previously staged votes.
    ///
    /// Fails with `WrongCycle` if the ledger moved to another cycle since
    /// staging. Staging and committing must not interleave with other
    /// writers.
    pub fn commit(&mut self, staged: StagedVotes) -> Result<Vec<VoteReceipt>> {
        if staged.state.cycle != self.state.cycle {
            return Err(GovernanceError::WrongCycle {
                expected: self.state.cycle,
                got: staged.state.cycle,
            });
        }
        self.state = staged.state;
        for receipt in &staged.receipts {
            self.log_accepted(receipt);
        }
        Ok(staged.receipts)
    }

    fn apply_vote(
        &self,
        state: &mut LedgerState,
        voter: Identity,
        points: &[u32],
        ctx: &CycleContext,
        recipient_count: usize,
        nonce: Option<u64>,
    ) -> Result<VoteReceipt> {
        if ctx.number != state.cycle {
            return Err(GovernanceError::WrongCycle {
                expected: state.cycle,
                got: ctx.number,
            });
        }
        self.validate_points(points, recipient_count)?;

        let prior = state.ballots.get(&voter).cloned();
        if prior.is_some() && self.params.recast_policy == RecastPolicy::Reject {
            return Err(GovernanceError::AlreadyVotedInCycle {
                voter: short_id(&voter),
                cycle: state.cycle,
            });
        }

        let power = self.strategies.total_power(&voter, ctx)?;
        if power == 0 || power < self.params.min_voting_power {
            return Err(GovernanceError::InsufficientVotingPower {
                power,
                required: self.params.min_voting_power.max(1),
            });
        }

        let contributions = points
            .iter()
            .map(|p| {
                mul_div_u128(power, *p as u128, self.params.precision)
                    .ok_or(GovernanceError::ArithmeticOverflow("vote contribution"))
            })
            .collect::<Result<Vec<Amount>>>()?;

        let mut tally = state.tally.clone();
        if let Some(previous) = &prior {
            tally
                .subtract(&previous.contributions, previous.voting_power)
                .ok_or_else(|| {
                    GovernanceError::TallyInconsistent(format!(
                        "previous vote of {} not present in cycle {} tally",
                        short_id(&voter),
                        state.cycle
                    ))
                })?;
        }
        tally
            .add(&contributions, power)
            .ok_or(GovernanceError::ArithmeticOverflow("cycle tally"))?;

        let record = VoteRecord {
            voter,
            cycle: state.cycle,
            points: points.to_vec(),
            voting_power: power,
            contributions,
            cast_at: ctx.current_tick,
            nonce,
        };

        state.tally = tally;
        state.ballots.insert(voter, record.clone());

        Ok(VoteReceipt {
            record,
            replaced: prior,
        })
    }

    fn validate_points(&self, points: &[u32], recipient_count: usize) -> Result<()> {
        if recipient_count == 0 {
            return Err(GovernanceError::InvalidPointsDistribution(
                "no active recipients to vote for".to_string(),
            ));
        }
        if points.len() != recipient_count {
            return Err(GovernanceError::InvalidPointsDistribution(format!(
                "expected {} entries, got {}",
                recipient_count,
                points.len()
            )));
        }
        if let Some((index, value)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| **p > self.params.max_points)
        {
            return Err(GovernanceError::InvalidPointsDistribution(format!(
                "entry {} has {} points, max is {}",
                index, value, self.params.max_points
            )));
        }
        if points.iter().all(|p| *p == 0) {
            return Err(GovernanceError::InvalidPointsDistribution(
                "points must not all be zero".to_string(),
            ));
        }
        Ok(())
    }

    fn log_accepted(&self, receipt: &VoteReceipt) {
        info!(
            target: "governance",
            cycle = receipt.record.cycle,
            voter = %short_id(&receipt.record.voter),
            power = receipt.record.voting_power,
            recast = receipt.replaced.is_some(),
            "Vote accepted"
        );
    }

    /// Raw per-recipient weighted votes of the open cycle. Slots beyond the
    /// returned length have no votes yet.
    pub fn current_distribution(&self) -> &[Amount] {
        &self.state.tally.per_recipient
    }

    /// Weighted votes of the open cycle padded to `recipient_count` slots
    pub fn weighted_votes(&self, recipient_count: usize) -> Vec<Amount> {
        self.state.tally.weighted_votes(recipient_count)
    }

    /// Total voting power used in the open cycle
    pub fn total_votes(&self) -> Amount {
        self.state.tally.total_voting_power_used
    }

    /// Sum of weighted votes in the open cycle
    pub fn total_weighted_votes(&self) -> Result<Amount> {
        self.state
            .tally
            .total_weighted()
            .ok_or(GovernanceError::ArithmeticOverflow("weighted vote total"))
    }

    /// Tally of the open cycle
    pub fn tally(&self) -> &RunningTally {
        &self.state.tally
    }

    pub fn has_voted(&self, voter: &Identity) -> bool {
        self.state.ballots.contains_key(voter)
    }

    /// Ballot of `voter` in the open cycle
    pub fn vote_of(&self, voter: &Identity) -> Option<&VoteRecord> {
        self.state.ballots.get(voter)
    }

    /// Number of ballots in the open cycle
    pub fn ballot_count(&self) -> usize {
        self.state.ballots.len()
    }

    /// Tally of any cycle, open or closed
    pub fn tally_for(&self, cycle: CycleNumber) -> Option<&RunningTally> {
        if cycle == self.state.cycle {
            Some(&self.state.tally)
        } else {
            self.closed_tallies.get(&cycle)
        }
    }

    /// Ballot of `voter` in any cycle, open or closed
    pub fn vote_in(&self, cycle: CycleNumber, voter: &Identity) -> Option<&VoteRecord> {
        if cycle == self.state.cycle {
            self.state.ballots.get(voter)
        } else {
            self.closed_ballots.get(&(cycle, *voter))
        }
    }

    /// Close the open cycle and start `next_cycle` with empty accumulators.
    ///
    /// The closed tally and ballots stay queryable. Consumed nonces carry
    /// over. Returns the frozen tally.
    pub fn reset_for_new_cycle(&mut self, next_cycle: CycleNumber) -> Result<RunningTally> {
        if next_cycle <= self.state.cycle {
            return Err(GovernanceError::InvalidParameter(
                "next cycle must be greater than the open cycle",
            ));
        }

        let closed_cycle = self.state.cycle;
        let frozen = std::mem::replace(&mut self.state.tally, RunningTally::new(next_cycle));
        for (voter, record) in self.state.ballots.drain() {
            self.closed_ballots.insert((closed_cycle, voter), record);
        }
        self.closed_tallies.insert(closed_cycle, frozen.clone());
        self.state.cycle = next_cycle;

        debug!(
            target: "governance",
            closed = closed_cycle,
            opened = next_cycle,
            power_used = frozen.total_voting_power_used,
            "Vote ledger reset for new cycle"
        );
        Ok(frozen)
    }
}
