//! Integration tests for distribution store backends (Sled and in-memory).
//! Covers distribution records, vote records, tallies, the current cycle and
//! the pending-close marker.

use tempfile::TempDir;
use yieldsplit_storage::{
    DistributionStore, MemoryDistributionStore, SledDistributionStore, StorageError,
};
use yieldsplit_types::{
    identity_from_label, Cycle, Distribution, RecipientPayout, RunningTally, VoteRecord,
};

/// Helper to create a test distribution
fn create_test_distribution(cycle: u64) -> Distribution {
    let payouts = ["alpha", "beta", "gamma"]
        .iter()
        .map(|label| RecipientPayout {
            recipient: identity_from_label(label),
            fixed_share: 83,
            voted_share: 250,
        })
        .collect();
    Distribution {
        cycle,
        executed_at: 1000 + cycle * 100,
        total_yield: 1000,
        fixed_amount: 250,
        voted_amount: 750,
        total_weighted_votes: 1000,
        payouts,
    }
}

/// Helper to create a test vote record
fn create_test_vote(cycle: u64, voter: &str, nonce: Option<u64>) -> VoteRecord {
    VoteRecord {
        voter: identity_from_label(voter),
        cycle,
        points: vec![300, 500, 200],
        voting_power: 1000,
        contributions: vec![300, 500, 200],
        cast_at: 1010,
        nonce,
    }
}

/// Close `cycle` through the begin/commit bracket
fn close_cycle(store: &dyn DistributionStore, cycle: u64) -> anyhow::Result<()> {
    let distribution = create_test_distribution(cycle);
    let mut frozen = RunningTally::new(cycle);
    frozen.add(&[300, 500, 200], 1000).unwrap();
    let next = Cycle::genesis(1000, 100).successor(distribution.executed_at);
    store.begin_close(&distribution)?;
    store.commit_close(&distribution, &frozen, &RunningTally::new(cycle + 1), &next)
}

fn exercise_store(store: &dyn DistributionStore) {
    // Cycle
    assert!(store.load_cycle().unwrap().is_none());
    store.save_cycle(&Cycle::genesis(1000, 100)).unwrap();

    // Votes, nonces and the open tally land together
    let alice = identity_from_label("alice");
    let mut tally = RunningTally::new(1);
    tally.add(&[300, 500, 200], 1000).unwrap();
    store
        .record_votes(&[create_test_vote(1, "alice", Some(4))], &tally)
        .unwrap();
    tally.add(&[300, 500, 200], 1000).unwrap();
    store
        .record_votes(&[create_test_vote(1, "bob", None)], &tally)
        .unwrap();
    assert_eq!(store.list_votes(Some(1)).unwrap().len(), 2);
    assert_eq!(store.get_tally(1).unwrap(), Some(tally));
    assert_eq!(store.list_nonces().unwrap(), vec![(alice, 4)]);
    assert_eq!(
        store.get_vote(1, &alice).unwrap().and_then(|v| v.nonce),
        Some(4)
    );
    assert!(store.get_vote(2, &alice).unwrap().is_none());

    // Closing cycle 1 moves the cycle record and opens tally 2
    close_cycle(store, 1).unwrap();
    assert!(store.pending_close().unwrap().is_none());
    assert_eq!(store.load_cycle().unwrap().map(|c| c.number), Some(2));
    assert_eq!(store.get_tally(2).unwrap(), Some(RunningTally::new(2)));
    assert_eq!(store.get_tally(1).unwrap().unwrap().total_voting_power_used, 1000);

    store
        .record_votes(&[create_test_vote(2, "alice", None)], &RunningTally::new(2))
        .unwrap();
    assert_eq!(store.list_votes(None).unwrap().len(), 3);

    close_cycle(store, 2).unwrap();
    let cycles: Vec<u64> = store
        .list_distributions()
        .unwrap()
        .iter()
        .map(|d| d.cycle)
        .collect();
    assert_eq!(cycles, vec![1, 2]);
    assert_eq!(
        store.get_distribution(2).unwrap(),
        Some(create_test_distribution(2))
    );
    assert!(store.get_distribution(3).unwrap().is_none());
    assert_eq!(store.list_tallies().unwrap().len(), 3);
}

#[test]
fn test_memory_store_roundtrip() {
    let store = MemoryDistributionStore::new();
    exercise_store(&store);
}

#[test]
fn test_sled_store_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let store = SledDistributionStore::new(temp_dir.path()).unwrap();
    exercise_store(&store);
}

#[test]
fn test_abandoned_close_leaves_cycle_open() {
    let store = MemoryDistributionStore::new();
    let genesis = Cycle::genesis(1000, 100);
    store.save_cycle(&genesis).unwrap();

    store.begin_close(&create_test_distribution(1)).unwrap();
    assert!(matches!(
        StorageError::from(store.begin_close(&create_test_distribution(1)).unwrap_err()),
        StorageError::ClosePending(1)
    ));
    store.abandon_close(1).unwrap();

    assert_eq!(store.load_cycle().unwrap(), Some(genesis));
    assert!(store.list_distributions().unwrap().is_empty());
    close_cycle(&store, 1).unwrap();
}

#[test]
fn test_sled_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = SledDistributionStore::new(temp_dir.path()).unwrap();
        close_cycle(&store, 1).unwrap();
        store
            .record_votes(&[create_test_vote(2, "carol", Some(0))], &RunningTally::new(2))
            .unwrap();
        // left pending across the restart
        store.begin_close(&create_test_distribution(2)).unwrap();
        store.flush().unwrap();
    }

    let store = SledDistributionStore::new(temp_dir.path()).unwrap();
    assert_eq!(store.load_cycle().unwrap().map(|c| c.number), Some(2));
    assert_eq!(store.list_distributions().unwrap().len(), 1);
    assert_eq!(store.list_votes(Some(2)).unwrap()[0].nonce, Some(0));
    assert_eq!(store.pending_close().unwrap().map(|d| d.cycle), Some(2));

    // immutable history: cycle 1 cannot be rewritten after reopen
    store.abandon_close(2).unwrap();
    let err = close_cycle(&store, 1).unwrap_err();
    assert!(matches!(
        StorageError::from(err),
        StorageError::DuplicateDistribution(1)
    ));
}
