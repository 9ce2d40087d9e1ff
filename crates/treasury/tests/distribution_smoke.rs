//! Distribution Smoke Test
//!
//! End-to-end runs of the yield distributor against in-memory collaborators:
//! - The reference split (divisor 4, yield 1000, votes 300/500/200)
//! - At-most-once distribution per cycle
//! - Rejections that leave every balance untouched
//! - Custody carry-over after a rejected payout batch
//! - Signed batch voting with replay protection
//! - Restart from a sled store
//!
//! Run with: cargo test -p yieldsplit-treasury --test distribution_smoke -- --nocapture

use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;
use yieldsplit_governance::{
    AccessControl, Ed25519SignatureOracle, GovernanceError, PowerStrategies, Role, SignedVote,
    StakeWeightedPower, VotePayload, VotingPowerStrategy,
};
use yieldsplit_storage::{DistributionStore, SledDistributionStore};
use yieldsplit_treasury::{
    AccountLedger, Collaborators, DistributorConfig, InMemoryAccountLedger, InMemoryYieldSource,
    ManualClock, MockAccountLedger, QueuedRecipientRegistry, SharedLedger, TreasuryError,
    YieldDistributor, YieldSource,
};
use yieldsplit_types::{identity_from_label, Amount, Identity};

// =============================================================================
// TEST HELPERS
// =============================================================================

struct World {
    access: Arc<AccessControl>,
    clock: Arc<ManualClock>,
    source: Arc<InMemoryYieldSource>,
    stakes: Arc<StakeWeightedPower>,
    registry: Arc<QueuedRecipientRegistry>,
    ledger: SharedLedger,
    owner: Identity,
    keeper: Identity,
    recipients: Vec<Identity>,
}

impl World {
    fn new(ledger: SharedLedger) -> Self {
        let owner = identity_from_label("owner");
        let keeper = identity_from_label("keeper");
        let access = Arc::new(AccessControl::with_owner(owner));
        access.grant(&owner, keeper, Role::CycleManager).unwrap();

        let recipients: Vec<Identity> = ["alpha", "beta", "gamma"]
            .iter()
            .map(|l| identity_from_label(l))
            .collect();
        let registry =
            Arc::new(QueuedRecipientRegistry::new(access.clone(), recipients.clone()).unwrap());

        Self {
            access,
            clock: Arc::new(ManualClock::new(1000)),
            source: Arc::new(InMemoryYieldSource::new(ledger.clone())),
            stakes: Arc::new(StakeWeightedPower::new()),
            registry,
            ledger,
            owner,
            keeper,
            recipients,
        }
    }

    fn collaborators(&self, store: Option<Arc<dyn DistributionStore>>) -> Collaborators {
        Collaborators {
            access: self.access.clone(),
            clock: self.clock.clone(),
            yield_source: self.source.clone(),
            registry: self.registry.clone(),
            ledger: self.ledger.clone(),
            strategies: PowerStrategies::new(vec![
                self.stakes.clone() as Arc<dyn VotingPowerStrategy>
            ]),
            oracle: Arc::new(Ed25519SignatureOracle),
            store,
        }
    }

    fn distributor(&self, store: Option<Arc<dyn DistributionStore>>) -> YieldDistributor {
        YieldDistributor::new(&config(), self.keeper, self.collaborators(store)).unwrap()
    }

    fn balances(&self) -> Vec<Amount> {
        let ledger = self.ledger.lock();
        self.recipients
            .iter()
            .map(|r| ledger.balance_of(r).unwrap())
            .collect()
    }
}

fn config() -> DistributorConfig {
    DistributorConfig {
        cycle_length: 100,
        start_tick: Some(1000),
        split_divisor: 4,
        precision: 1_000,
        ..Default::default()
    }
}

fn in_memory_world() -> World {
    World::new(InMemoryAccountLedger::new().shared())
}

// =============================================================================
// TEST 1: REFERENCE SCENARIO
// =============================================================================

#[test]
fn test_reference_scenario_end_to_end() {
    println!("\n=== TEST 1: Reference Scenario ===");

    let world = in_memory_world();
    let distributor = world.distributor(None);

    let voter = identity_from_label("voter");
    world.stakes.update_stake(voter, 1_000);
    distributor.cast_vote(voter, &[300, 500, 200]).unwrap();
    println!("Weighted votes: {:?}", distributor.current_distribution());

    world.source.accrue(1_000);
    world.clock.set(1_100);
    println!("Cycle ready at tick 1100: {}", distributor.is_ready());

    let distribution = distributor.distribute().unwrap();
    println!(
        "Distributed {} (fixed {}, voted {})",
        distribution.total_yield, distribution.fixed_amount, distribution.voted_amount
    );
    for payout in &distribution.payouts {
        println!(
            "  fixed {:>4} + voted {:>4} = {:>4}",
            payout.fixed_share,
            payout.voted_share,
            payout.total()
        );
    }

    assert_eq!(distribution.fixed_amount, 250);
    assert_eq!(distribution.voted_amount, 750);
    assert_eq!(world.balances(), vec![309, 458, 233]);
    assert!(distribution.is_balanced());

    let next = distributor.cycle();
    assert_eq!(next.number, 2);
    assert_eq!(next.start_tick, 1_100);
    assert!(distributor.current_distribution().is_empty());

    println!("✅ Reference scenario paid 309 / 458 / 233");
}

// =============================================================================
// TEST 2: AT-MOST-ONCE PER CYCLE
// =============================================================================

#[test]
fn test_second_distribution_fails_gate() {
    println!("\n=== TEST 2: At-Most-Once Distribution ===");

    let world = in_memory_world();
    let distributor = world.distributor(None);
    let voter = identity_from_label("voter");
    world.stakes.update_stake(voter, 1_000);
    distributor.cast_vote(voter, &[1, 1, 1]).unwrap();
    world.source.accrue(900);
    world.clock.set(1_100);

    distributor.distribute().unwrap();
    let paid_once = world.balances();

    world.source.accrue(900);
    let err = distributor.distribute().unwrap_err();
    println!("Second call: {}", err);
    assert!(matches!(
        err,
        TreasuryError::CycleNotComplete {
            cycle: 2,
            remaining: 100
        }
    ));
    assert_eq!(world.balances(), paid_once);

    println!("✅ Second call rejected by the cycle gate");
}

// =============================================================================
// TEST 3: REJECTIONS LEAVE STATE UNTOUCHED
// =============================================================================

#[test]
fn test_no_votes_cast() {
    println!("\n=== TEST 3a: No Votes Cast ===");

    let world = in_memory_world();
    let distributor = world.distributor(None);
    world.source.accrue(1_000);
    world.clock.set(1_100);

    assert!(matches!(
        distributor.distribute(),
        Err(TreasuryError::NoVotesCast(1))
    ));
    assert_eq!(distributor.cycle().number, 1);
    assert_eq!(world.balances(), vec![0, 0, 0]);
    assert_eq!(world.source.accrued_yield().unwrap(), 1_000);

    println!("✅ Nothing paid, cycle still open");
}

#[test]
fn test_precision_guard() {
    println!("\n=== TEST 3b: Precision Guard ===");

    let world = in_memory_world();
    let distributor = world.distributor(None);

    // weights [1, 1_000_000, 1_000_000], total 2_000_001
    let dust = identity_from_label("dust");
    let whale = identity_from_label("whale");
    world.stakes.update_stake(dust, 1);
    world.stakes.update_stake(whale, 1_000_000);
    distributor.cast_vote(dust, &[1_000, 0, 0]).unwrap();
    distributor.cast_vote(whale, &[0, 1_000, 1_000]).unwrap();

    world.source.accrue(1_000);
    world.clock.set(1_100);

    let err = distributor.distribute().unwrap_err();
    println!("Rejected: {}", err);
    assert!(matches!(
        err,
        TreasuryError::InsufficientYieldPrecision {
            min_weight: 1,
            voted_amount: 750,
            total_weighted: 2_000_001
        }
    ));
    assert_eq!(world.balances(), vec![0, 0, 0]);
    assert_eq!(distributor.cycle().number, 1);

    println!("✅ Dust vote not silently paid zero");
}

#[test]
fn test_no_recast_keeps_original_vote() {
    println!("\n=== TEST 3c: No Recast ===");

    let world = in_memory_world();
    let distributor = world.distributor(None);
    let voter = identity_from_label("voter");
    world.stakes.update_stake(voter, 1_000);

    distributor.cast_vote(voter, &[1_000, 0, 0]).unwrap();
    let err = distributor.cast_vote(voter, &[0, 0, 1_000]).unwrap_err();
    assert!(matches!(
        err,
        TreasuryError::Governance(GovernanceError::AlreadyVotedInCycle { cycle: 1, .. })
    ));
    assert_eq!(distributor.current_distribution(), vec![1_000, 0, 0]);
    assert_eq!(distributor.total_votes(), 1_000);

    println!("✅ Original contribution unchanged");
}

// =============================================================================
// TEST 4: CUSTODY CARRY-OVER
// =============================================================================

#[test]
fn test_rejected_payout_carries_over() {
    println!("\n=== TEST 4: Custody Carry-Over ===");

    let mock = Arc::new(Mutex::new(MockAccountLedger::new()));
    let world = World::new(mock.clone());
    mock.lock().reject_transfers_to(world.recipients[2]);
    let distributor = world.distributor(None);

    let voter = identity_from_label("voter");
    world.stakes.update_stake(voter, 1_000);
    distributor.cast_vote(voter, &[300, 500, 200]).unwrap();
    world.source.accrue(1_000);
    world.clock.set(1_100);

    let err = distributor.distribute().unwrap_err();
    println!("First attempt: {}", err);
    assert!(matches!(err, TreasuryError::Payout(_)));
    assert_eq!(world.balances(), vec![0, 0, 0]);
    assert_eq!(distributor.custody_balance().unwrap(), 1_000);
    assert_eq!(distributor.cycle().number, 1);

    mock.lock().accept_all();
    let distribution = distributor.distribute().unwrap();
    println!("Retry distributed {}", distribution.total_yield);
    assert_eq!(distribution.total_yield, 1_000);
    assert_eq!(world.balances(), vec![309, 458, 233]);
    assert_eq!(distributor.custody_balance().unwrap(), 0);

    println!("✅ Claimed yield survived the failed batch");
}

// =============================================================================
// TEST 5: SIGNED BATCH VOTING
// =============================================================================

#[test]
fn test_signed_batch_and_replay() {
    println!("\n=== TEST 5: Signed Batch Voting ===");

    let world = in_memory_world();
    let distributor = world.distributor(None);

    let keys: Vec<SigningKey> = (1..=2u8).map(|s| SigningKey::from_bytes(&[s; 32])).collect();
    for key in &keys {
        world
            .stakes
            .update_stake(key.verifying_key().to_bytes(), 1_000);
    }
    let batch: Vec<SignedVote> = keys
        .iter()
        .map(|key| {
            SignedVote::sign(
                key,
                VotePayload {
                    voter: [0u8; 32],
                    cycle: 1,
                    nonce: 7,
                    points: vec![500, 500, 0],
                },
            )
        })
        .collect();

    let receipts = distributor.cast_signed_batch(&batch).unwrap();
    assert_eq!(receipts.len(), 2);
    assert_eq!(distributor.current_distribution(), vec![1_000, 1_000, 0]);

    let err = distributor.cast_signed_batch(&batch[..1]).unwrap_err();
    println!("Replay: {}", err);
    assert!(matches!(
        err,
        TreasuryError::Governance(GovernanceError::NonceAlreadyUsed { nonce: 7, .. })
    ));

    println!("✅ Batch accepted once, replay rejected");
}

// =============================================================================
// TEST 6: RESTART FROM SLED
// =============================================================================

#[test]
fn test_restart_from_sled_store() {
    println!("\n=== TEST 6: Restart From Sled ===");

    let temp_dir = TempDir::new().unwrap();
    let world = in_memory_world();
    let voter = identity_from_label("voter");
    world.stakes.update_stake(voter, 1_000);

    {
        let store: Arc<dyn DistributionStore> =
            Arc::new(SledDistributionStore::new(temp_dir.path()).unwrap());
        let distributor = world.distributor(Some(store.clone()));
        distributor.cast_vote(voter, &[300, 500, 200]).unwrap();
        world.source.accrue(1_000);
        world.clock.set(1_100);
        distributor.distribute().unwrap();
        distributor.cast_vote(voter, &[0, 0, 1_000]).unwrap();
        distributor.set_cycle_length(&world.owner, 40).unwrap();
        store.flush().unwrap();
    }

    let store: Arc<dyn DistributionStore> =
        Arc::new(SledDistributionStore::new(temp_dir.path()).unwrap());
    let restored =
        YieldDistributor::restore(&config(), world.keeper, world.collaborators(Some(store)))
            .unwrap();

    let cycle = restored.cycle();
    println!("Restored at cycle {} (length {})", cycle.number, cycle.length);
    assert_eq!(cycle.number, 2);
    assert_eq!(cycle.length, 40);
    assert_eq!(restored.distribution(1).unwrap().paid_to(&world.recipients[1]), 458);
    assert_eq!(restored.current_distribution(), vec![0, 0, 1_000]);

    // the restored ballot still blocks a second vote this cycle
    assert!(restored.cast_vote(voter, &[1, 1, 1]).is_err());

    world.source.accrue(300);
    world.clock.set(1_140);
    let distribution = restored.distribute().unwrap();
    assert_eq!(distribution.cycle, 2);
    assert_eq!(distribution.paid_to(&world.recipients[2]), 25 + 225);

    println!("✅ Votes, history and cycle length survived the restart");
}
