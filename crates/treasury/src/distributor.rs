//! Yield Distributor: cycle-gated fixed + voted yield distribution
//!
//! Owns the cycle gate, the vote ledger and the split calculator behind a
//! single lock, so vote casting and distribution never interleave on the
//! same cycle. One `distribute()` call walks the phases
//!
//! `Idle → Validating → Computing → Paying → Closing → Idle`
//!
//! and either commits the whole cycle or leaves every piece of state as it
//! was before the call.
//!
//! ## Key Invariants
//! - At most one distribution per cycle: a second call fails the gate
//! - No partial payouts: all payouts land in one `transfer_batch`
//! - Yield claimed into custody but not paid stays there for the next try
//! - With a store, the close is marked pending before any funds move and
//!   committed in one write afterwards; `restore` refuses a pending close
//! - A recipient with a non-zero vote weight is never paid zero voted yield

use crate::account_ledger::SharedLedger;
use crate::config::DistributorConfig;
use crate::cycle::{CycleGate, TickSource};
use crate::errors::{Result, TreasuryError};
use crate::registry::RecipientRegistry;
use crate::split::SplitCalculator;
use crate::yield_source::YieldSource;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use yieldsplit_governance::{
    AccessControl, GovernanceError, LedgerParams, LedgerSnapshot, PowerStrategies, RecastPolicy,
    Role, SignatureOracle, SignedVote, StagedVotes, VoteLedger, VoteReceipt,
};
use yieldsplit_storage::{DistributionStore, StorageError};
use yieldsplit_types::{
    short_id, Amount, Cycle, CycleNumber, Distribution, Identity, RecipientPayout, RunningTally,
    Tick, VoteRecord,
};

// =============================================================================
// PHASES
// =============================================================================

/// Where a `distribute()` call currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistributionPhase {
    #[default]
    Idle,
    /// Readiness, pause, yield, recipient and vote checks
    Validating,
    /// Split plan and per-recipient allocation
    Computing,
    /// Pending-close marker, yield claim and payout batch
    Paying,
    /// Cycle advance, ledger reset, close commit
    Closing,
}

/// Returns the phase to `Idle` however the call ends
struct PhaseGuard<'a> {
    phase: &'a RwLock<DistributionPhase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a RwLock<DistributionPhase>, first: DistributionPhase) -> Self {
        *phase.write() = first;
        Self { phase }
    }

    fn set(&self, next: DistributionPhase) {
        *self.phase.write() = next;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.phase.write() = DistributionPhase::Idle;
    }
}

// =============================================================================
// COLLABORATORS
// =============================================================================

/// External systems the distributor reads from and pays through
#[derive(Clone)]
pub struct Collaborators {
    pub access: Arc<AccessControl>,
    pub clock: Arc<dyn TickSource>,
    pub yield_source: Arc<dyn YieldSource>,
    pub registry: Arc<dyn RecipientRegistry>,
    /// Holds custody and recipient balances
    pub ledger: SharedLedger,
    pub strategies: PowerStrategies,
    pub oracle: Arc<dyn SignatureOracle>,
    /// Write-through persistence; `None` keeps everything in memory
    pub store: Option<Arc<dyn DistributionStore>>,
}

/// Everything `distribute()` reads before computing, taken under one lock
#[derive(Debug, Clone)]
struct DistributionInputs {
    accrued: Amount,
    total_yield: Amount,
    recipients: Vec<Identity>,
    weights: Vec<Amount>,
    total_weighted: Amount,
}

struct DistributorState {
    gate: CycleGate,
    votes: VoteLedger,
    calculator: SplitCalculator,
    paused: bool,
    history: BTreeMap<CycleNumber, Distribution>,
}

fn stored<T>(result: anyhow::Result<T>) -> Result<T> {
    result.map_err(|e| TreasuryError::Storage(StorageError::from(e)))
}

// =============================================================================
// DISTRIBUTOR
// =============================================================================

pub struct YieldDistributor {
    executor_id: Identity,
    custody: Identity,
    access: Arc<AccessControl>,
    clock: Arc<dyn TickSource>,
    yield_source: Arc<dyn YieldSource>,
    registry: Arc<dyn RecipientRegistry>,
    ledger: SharedLedger,
    oracle: Arc<dyn SignatureOracle>,
    store: Option<Arc<dyn DistributionStore>>,
    phase: RwLock<DistributionPhase>,
    state: Mutex<DistributorState>,
}

impl YieldDistributor {
    /// Start a fresh distributor at the genesis cycle.
    ///
    /// `executor_id` is the identity the distributor acts as when it advances
    /// the cycle gate; it must hold `CycleManager`.
    pub fn new(
        config: &DistributorConfig,
        executor_id: Identity,
        deps: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        deps.access.require(&executor_id, Role::CycleManager)?;

        let start_tick = config.start_tick.unwrap_or_else(|| deps.clock.now());
        let gate = CycleGate::new(start_tick, config.cycle_length)?;
        let votes =
            VoteLedger::new(config.ledger_params(), deps.strategies.clone(), gate.number())?;

        if let Some(store) = &deps.store {
            stored(store.save_cycle(gate.cycle()))?;
        }

        info!(
            target: "treasury",
            cycle = gate.number(),
            start_tick,
            length = config.cycle_length,
            divisor = config.split_divisor,
            "Yield distributor initialised"
        );
        Self::assemble(config, executor_id, deps, gate, votes, BTreeMap::new())
    }

    /// Rebuild a distributor from its store, or start fresh if the store is
    /// empty.
    ///
    /// The persisted cycle record (including any runtime length change) wins
    /// over `config.cycle_length` and `config.start_tick`.
    pub fn restore(
        config: &DistributorConfig,
        executor_id: Identity,
        deps: Collaborators,
    ) -> Result<Self> {
        let store = deps.store.clone().ok_or_else(|| {
            TreasuryError::InvalidConfig("restore requires a distribution store".to_string())
        })?;
        let Some(cycle) = stored(store.load_cycle())? else {
            return Self::new(config, executor_id, deps);
        };
        if let Some(pending) = stored(store.pending_close())? {
            error!(
                target: "treasury",
                cycle = pending.cycle,
                total_yield = pending.total_yield,
                "Store holds an unresolved close; refusing to restore"
            );
            return Err(TreasuryError::UnresolvedClose(pending.cycle));
        }

        config.validate()?;
        deps.access.require(&executor_id, Role::CycleManager)?;
        let gate = CycleGate::resume(cycle)?;
        let history: BTreeMap<CycleNumber, Distribution> = stored(store.list_distributions())?
            .into_iter()
            .map(|d| (d.cycle, d))
            .collect();
        if history.contains_key(&cycle.number) {
            error!(
                target: "treasury",
                cycle = cycle.number,
                "Stored cycle record lags its distribution log"
            );
            return Err(TreasuryError::AlreadyDistributed(cycle.number));
        }

        let snapshot = LedgerSnapshot {
            cycle: cycle.number,
            open_tally: stored(store.get_tally(cycle.number))?,
            closed_tallies: stored(store.list_tallies())?,
            records: stored(store.list_votes(None))?,
            nonces: stored(store.list_nonces())?,
        };
        let votes = VoteLedger::restore(config.ledger_params(), deps.strategies.clone(), snapshot)?;

        info!(
            target: "treasury",
            cycle = cycle.number,
            ballots = votes.ballot_count(),
            distributions = history.len(),
            "Yield distributor restored"
        );
        Self::assemble(config, executor_id, deps, gate, votes, history)
    }

    fn assemble(
        config: &DistributorConfig,
        executor_id: Identity,
        deps: Collaborators,
        gate: CycleGate,
        votes: VoteLedger,
        history: BTreeMap<CycleNumber, Distribution>,
    ) -> Result<Self> {
        let calculator = SplitCalculator::new(config.split_divisor as u128)?;
        Ok(Self {
            executor_id,
            custody: config.custody_identity()?,
            access: deps.access,
            clock: deps.clock,
            yield_source: deps.yield_source,
            registry: deps.registry,
            ledger: deps.ledger,
            oracle: deps.oracle,
            store: deps.store,
            phase: RwLock::new(DistributionPhase::Idle),
            state: Mutex::new(DistributorState {
                gate,
                votes,
                calculator,
                paused: false,
                history,
            }),
        })
    }

    // -------------------------------------------------------------------------
    // Voting
    // -------------------------------------------------------------------------

    /// Cast a vote for the open cycle. `points` is index-aligned with the
    /// registry's active recipients.
    pub fn cast_vote(&self, voter: Identity, points: &[u32]) -> Result<VoteReceipt> {
        let mut state = self.state.lock();
        let ctx = state.gate.cycle().context_at(self.clock.now());
        let recipient_count = self.registry.active_recipients().len();

        let staged = state.votes.stage_vote(voter, points, &ctx, recipient_count)?;
        self.persist_staged(&staged)?;
        state.votes.commit(staged)?.pop().ok_or_else(|| {
            TreasuryError::Governance(GovernanceError::TallyInconsistent(
                "vote staged without a receipt".to_string(),
            ))
        })
    }

    /// Cast a batch of signed votes; any invalid entry rejects the batch
    pub fn cast_signed_batch(&self, votes: &[SignedVote]) -> Result<Vec<VoteReceipt>> {
        let mut state = self.state.lock();
        let ctx = state.gate.cycle().context_at(self.clock.now());
        let recipient_count = self.registry.active_recipients().len();

        let staged =
            state
                .votes
                .stage_signed_batch(self.oracle.as_ref(), votes, &ctx, recipient_count)?;
        self.persist_staged(&staged)?;
        let receipts = state.votes.commit(staged)?;
        info!(
            target: "treasury",
            cycle = ctx.number,
            votes = receipts.len(),
            "Signed vote batch accepted"
        );
        Ok(receipts)
    }

    /// Votes hit the store, together with the tally that counts them,
    /// before the ledger applies them
    fn persist_staged(&self, staged: &StagedVotes) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let records: Vec<VoteRecord> = staged.records().cloned().collect();
        stored(store.record_votes(&records, staged.tally()))
    }

    // -------------------------------------------------------------------------
    // Distribution
    // -------------------------------------------------------------------------

    /// Distribute the collected yield for the completed cycle, then open the
    /// next one.
    ///
    /// Every check runs before the first transfer. If the yield claim or
    /// the payout batch fails nothing is paid, the cycle stays open and any
    /// claimed yield remains in custody.
    pub fn distribute(&self) -> Result<Distribution> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let phase = PhaseGuard::enter(&self.phase, DistributionPhase::Validating);

        state.gate.ensure_ready(now)?;
        if state.paused {
            return Err(TreasuryError::SystemDisabled);
        }
        self.access.require(&self.executor_id, Role::CycleManager)?;
        let cycle = state.gate.number();
        if state.history.contains_key(&cycle) {
            return Err(TreasuryError::AlreadyDistributed(cycle));
        }
        let inputs = self.collect_inputs(&state)?;

        phase.set(DistributionPhase::Computing);
        let distribution = Self::allocate(&state, now, &inputs)?;

        phase.set(DistributionPhase::Paying);
        self.begin_close(&distribution)?;
        if let Err(e) = self.pay(cycle, &inputs, &distribution) {
            self.abandon_close(cycle);
            return Err(e);
        }

        phase.set(DistributionPhase::Closing);
        let next = state.gate.roll_over(now);
        let frozen = state.votes.reset_for_new_cycle(next.number)?;
        state.history.insert(cycle, distribution.clone());
        self.registry.on_cycle_closed(cycle);
        self.persist_close(&distribution, &frozen, state.votes.tally(), &next);

        info!(
            target: "treasury",
            cycle,
            total_yield = distribution.total_yield,
            fixed = distribution.fixed_amount,
            voted = distribution.voted_amount,
            recipients = distribution.payouts.len(),
            "Distribution committed"
        );
        Ok(distribution)
    }

    /// Dry run of the yield, recipient and vote checks plus the split, for
    /// the open cycle. Ignores readiness and pause; mutates nothing.
    pub fn preview_distribution(&self) -> Result<Distribution> {
        let state = self.state.lock();
        let inputs = self.collect_inputs(&state)?;
        Self::allocate(&state, self.clock.now(), &inputs)
    }

    fn collect_inputs(&self, state: &DistributorState) -> Result<DistributionInputs> {
        let cycle = state.gate.number();

        let accrued = self
            .yield_source
            .accrued_yield()
            .map_err(|e| TreasuryError::YieldClaim(e.to_string()))?;
        let held = self.custody_balance()?;
        let total_yield = accrued
            .checked_add(held)
            .ok_or(TreasuryError::ArithmeticOverflow("total yield"))?;
        if total_yield == 0 {
            return Err(TreasuryError::InsufficientYield);
        }

        let recipients = self.registry.active_recipients();
        if recipients.is_empty() {
            return Err(TreasuryError::NoRecipients);
        }
        if state.votes.tally().has_votes_beyond(recipients.len()) {
            return Err(TreasuryError::RecipientSetMismatch {
                recipients: recipients.len(),
            });
        }

        let weights = state.votes.weighted_votes(recipients.len());
        let total_weighted = state.votes.total_weighted_votes()?;
        if total_weighted == 0 {
            return Err(TreasuryError::NoVotesCast(cycle));
        }

        Ok(DistributionInputs {
            accrued,
            total_yield,
            recipients,
            weights,
            total_weighted,
        })
    }

    fn allocate(
        state: &DistributorState,
        now: Tick,
        inputs: &DistributionInputs,
    ) -> Result<Distribution> {
        let cycle = state.gate.number();
        let plan = state
            .calculator
            .plan(inputs.total_yield, &inputs.weights, inputs.total_weighted)
            .map_err(|e| {
                if let TreasuryError::InsufficientYieldPrecision { min_weight, .. } = &e {
                    warn!(
                        target: "treasury",
                        cycle,
                        min_weight = *min_weight,
                        total_yield = inputs.total_yield,
                        "Voted bucket too small for the smallest vote weight"
                    );
                }
                e
            })?;

        let payouts = inputs
            .recipients
            .iter()
            .zip(plan.fixed_shares.iter().zip(&plan.voted_shares))
            .map(|(recipient, (fixed, voted))| RecipientPayout {
                recipient: *recipient,
                fixed_share: *fixed,
                voted_share: *voted,
            })
            .collect();

        let distribution = Distribution {
            cycle,
            executed_at: now,
            total_yield: plan.total_yield,
            fixed_amount: plan.fixed_amount,
            voted_amount: plan.voted_amount,
            total_weighted_votes: plan.total_weighted_votes,
            payouts,
        };
        if !distribution.is_balanced() {
            return Err(TreasuryError::ConservationViolated(cycle));
        }

        debug!(
            target: "treasury",
            cycle,
            fixed = plan.fixed_amount,
            voted = plan.voted_amount,
            total_weighted = plan.total_weighted_votes,
            "Split plan computed"
        );
        Ok(distribution)
    }

    /// Claim accrued yield into custody, then pay every non-zero payout in
    /// one batch
    fn pay(
        &self,
        cycle: CycleNumber,
        inputs: &DistributionInputs,
        distribution: &Distribution,
    ) -> Result<()> {
        if inputs.accrued > 0 {
            self.yield_source
                .claim(inputs.accrued, &self.custody)
                .map_err(|e| {
                    warn!(target: "treasury", cycle, error = %e, "Yield claim failed");
                    TreasuryError::YieldClaim(e.to_string())
                })?;
        }

        let transfers: Vec<(Identity, Amount)> = distribution
            .payouts
            .iter()
            .map(|p| (p.recipient, p.total()))
            .filter(|(_, amount)| *amount > 0)
            .collect();
        for (recipient, amount) in &transfers {
            debug!(target: "treasury", cycle, recipient = %short_id(recipient), amount, "Payout");
        }

        self.ledger
            .lock()
            .transfer_batch(&self.custody, &transfers)
            .map_err(|e| {
                warn!(
                    target: "treasury",
                    cycle,
                    held = distribution.total_yield,
                    error = %e,
                    "Payout batch rejected; yield kept in custody"
                );
                TreasuryError::Payout(e.to_string())
            })
    }

    fn begin_close(&self, distribution: &Distribution) -> Result<()> {
        match &self.store {
            Some(store) => stored(store.begin_close(distribution)),
            None => Ok(()),
        }
    }

    /// Nothing was paid; drop the pending marker
    fn abandon_close(&self, cycle: CycleNumber) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.abandon_close(cycle) {
            error!(
                target: "treasury",
                cycle,
                error = %e,
                "Failed to clear pending close"
            );
        }
    }

    /// Commit the close after the payout landed. The in-memory commit
    /// already happened, so a failure is logged and not returned; the
    /// pending marker stays behind and blocks both the next close and a
    /// restore until it is reconciled.
    fn persist_close(
        &self,
        distribution: &Distribution,
        frozen: &RunningTally,
        open: &RunningTally,
        next: &Cycle,
    ) {
        let Some(store) = &self.store else {
            return;
        };
        let result = store
            .commit_close(distribution, frozen, open, next)
            .and_then(|_| store.flush());
        if let Err(e) = result {
            error!(
                target: "treasury",
                cycle = distribution.cycle,
                error = %e,
                "Failed to persist closed cycle; close left pending"
            );
        }
    }

    // -------------------------------------------------------------------------
    // Administration
    // -------------------------------------------------------------------------

    /// Change the cycle length; applies to the in-progress cycle. Admin only.
    pub fn set_cycle_length(&self, caller: &Identity, length: Tick) -> Result<()> {
        let mut state = self.state.lock();
        let mut gate = state.gate.clone();
        gate.set_length(length, caller, &self.access)?;
        if let Some(store) = &self.store {
            stored(store.save_cycle(gate.cycle()))?;
        }
        state.gate = gate;
        Ok(())
    }

    /// Admin only; zero is rejected
    pub fn set_split_divisor(&self, caller: &Identity, divisor: u128) -> Result<()> {
        self.access.require(caller, Role::Admin)?;
        let calculator = SplitCalculator::new(divisor)?;
        let mut state = self.state.lock();
        let previous = state.calculator.divisor();
        state.calculator = calculator;
        info!(
            target: "treasury",
            previous,
            divisor,
            caller = %short_id(caller),
            "Split divisor updated"
        );
        Ok(())
    }

    pub fn set_max_points(&self, caller: &Identity, max_points: u32) -> Result<()> {
        self.update_params(caller, "max_points", |p| p.max_points = max_points)
    }

    pub fn set_recast_policy(&self, caller: &Identity, policy: RecastPolicy) -> Result<()> {
        self.update_params(caller, "recast_policy", |p| p.recast_policy = policy)
    }

    pub fn set_min_voting_power(&self, caller: &Identity, min_power: Amount) -> Result<()> {
        self.update_params(caller, "min_voting_power", |p| p.min_voting_power = min_power)
    }

    fn update_params(
        &self,
        caller: &Identity,
        field: &'static str,
        apply: impl FnOnce(&mut LedgerParams),
    ) -> Result<()> {
        self.access.require(caller, Role::Admin)?;
        let mut state = self.state.lock();
        let mut params = state.votes.params().clone();
        apply(&mut params);
        state.votes.set_params(params)?;
        info!(
            target: "treasury",
            field,
            caller = %short_id(caller),
            "Ledger parameter updated"
        );
        Ok(())
    }

    /// Block `distribute()` until resumed. Voting stays open. EmergencyAdmin
    /// only.
    pub fn pause(&self, caller: &Identity) -> Result<()> {
        self.set_paused(caller, true)
    }

    pub fn resume(&self, caller: &Identity) -> Result<()> {
        self.set_paused(caller, false)
    }

    fn set_paused(&self, caller: &Identity, paused: bool) -> Result<()> {
        self.access.require(caller, Role::EmergencyAdmin)?;
        self.state.lock().paused = paused;
        info!(
            target: "treasury",
            paused,
            caller = %short_id(caller),
            "Distribution pause toggled"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn phase(&self) -> DistributionPhase {
        *self.phase.read()
    }

    pub fn executor_id(&self) -> Identity {
        self.executor_id
    }

    pub fn custody_account(&self) -> Identity {
        self.custody
    }

    /// Yield claimed earlier but not yet paid out
    pub fn custody_balance(&self) -> Result<Amount> {
        self.ledger
            .lock()
            .balance_of(&self.custody)
            .map_err(|e| TreasuryError::Payout(e.to_string()))
    }

    pub fn cycle(&self) -> Cycle {
        *self.state.lock().gate.cycle()
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().gate.is_ready(self.clock.now())
    }

    /// Elapsed share of the open cycle, 0..=100
    pub fn progress(&self) -> u8 {
        self.state.lock().gate.progress(self.clock.now())
    }

    pub fn ticks_remaining(&self) -> Tick {
        self.state.lock().gate.ticks_remaining(self.clock.now())
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn split_divisor(&self) -> u128 {
        self.state.lock().calculator.divisor()
    }

    pub fn ledger_params(&self) -> LedgerParams {
        self.state.lock().votes.params().clone()
    }

    /// Raw weighted votes of the open cycle
    pub fn current_distribution(&self) -> Vec<Amount> {
        self.state.lock().votes.current_distribution().to_vec()
    }

    /// Voting power used in the open cycle
    pub fn total_votes(&self) -> Amount {
        self.state.lock().votes.total_votes()
    }

    /// Power `voter` would vote with right now
    pub fn voting_power(&self, voter: &Identity) -> Result<Amount> {
        let state = self.state.lock();
        let ctx = state.gate.cycle().context_at(self.clock.now());
        Ok(state.votes.voting_power(voter, &ctx)?)
    }

    pub fn distribution(&self, cycle: CycleNumber) -> Option<Distribution> {
        self.state.lock().history.get(&cycle).cloned()
    }

    /// Every committed distribution, oldest first
    pub fn distributions(&self) -> Vec<Distribution> {
        self.state.lock().history.values().cloned().collect()
    }

    pub fn tally_for(&self, cycle: CycleNumber) -> Option<RunningTally> {
        self.state.lock().votes.tally_for(cycle).cloned()
    }

    pub fn vote_of(&self, cycle: CycleNumber, voter: &Identity) -> Option<VoteRecord> {
        self.state.lock().votes.vote_in(cycle, voter).cloned()
    }
}

// =============================================================================
// TESTS
// =============================================================================
