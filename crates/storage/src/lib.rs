use anyhow::Result;
use parking_lot::RwLock;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;
use yieldsplit_types::{
    Cycle, CycleNumber, Distribution, ErrorCategory, Identity, RunningTally, VoteRecord,
};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Distribution for cycle {0} already recorded")]
    DuplicateDistribution(CycleNumber),
    /// A close was begun and never committed or abandoned
    #[error("Close of cycle {0} is still pending")]
    ClosePending(CycleNumber),
    #[error("Corrupt record under key {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StorageError::DuplicateDistribution(_)
            | StorageError::ClosePending(_)
            | StorageError::Corrupt { .. } => ErrorCategory::Integrity,
            StorageError::Database(_)
            | StorageError::Serialization(_)
            | StorageError::Backend(_) => ErrorCategory::Internal,
        }
    }
}

impl From<anyhow::Error> for StorageError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StorageError>() {
            Ok(storage) => storage,
            Err(other) => StorageError::Backend(format!("{other:#}")),
        }
    }
}

impl From<TransactionError<StorageError>> for StorageError {
    fn from(err: TransactionError<StorageError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StorageError::Database(e),
        }
    }
}

/// Persisted state of the distributor.
///
/// Distribution records are immutable once written. Closing a cycle is
/// bracketed: `begin_close` marks the close pending before anything is
/// paid, then `commit_close` or `abandon_close` ends it. Every write method
/// is all-or-nothing.
pub trait DistributionStore: Send + Sync {
    /// Mark `distribution` as about to be paid. Fails if a close is already
    /// pending or the cycle already has a distribution.
    fn begin_close(&self, distribution: &Distribution) -> Result<()>;

    /// The close begun but not yet committed or abandoned, if any
    fn pending_close(&self) -> Result<Option<Distribution>>;

    /// Clear the pending close of `cycle`. A marker for another cycle is
    /// left alone.
    fn abandon_close(&self, cycle: CycleNumber) -> Result<()>;

    /// Record the paid distribution, the frozen tally of the closed cycle,
    /// the empty tally of the next one and the next cycle record, and clear
    /// the pending marker, in one write.
    fn commit_close(
        &self,
        distribution: &Distribution,
        frozen: &RunningTally,
        open: &RunningTally,
        next: &Cycle,
    ) -> Result<()>;

    fn get_distribution(&self, cycle: CycleNumber) -> Result<Option<Distribution>>;
    /// All distributions in ascending cycle order
    fn list_distributions(&self) -> Result<Vec<Distribution>>;

    /// Store vote records, their signed-vote nonces and the open-cycle tally
    /// that includes them, in one write
    fn record_votes(&self, records: &[VoteRecord], tally: &RunningTally) -> Result<()>;
    fn get_vote(&self, cycle: CycleNumber, voter: &Identity) -> Result<Option<VoteRecord>>;
    /// Votes of one cycle, or of every cycle when `cycle` is None
    fn list_votes(&self, cycle: Option<CycleNumber>) -> Result<Vec<VoteRecord>>;
    /// Consumed signed-vote nonces
    fn list_nonces(&self) -> Result<Vec<(Identity, u64)>>;

    fn save_cycle(&self, cycle: &Cycle) -> Result<()>;
    fn load_cycle(&self) -> Result<Option<Cycle>>;

    fn get_tally(&self, cycle: CycleNumber) -> Result<Option<RunningTally>>;
    /// All tallies in ascending cycle order
    fn list_tallies(&self) -> Result<Vec<RunningTally>>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

const CURRENT_CYCLE: &[u8] = b"current_cycle";
const PENDING_CLOSE: &[u8] = b"pending_close";

fn nonce_key(voter: &Identity, nonce: u64) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..32].copy_from_slice(voter);
    key[32..].copy_from_slice(&nonce.to_be_bytes());
    key
}

fn vote_key(cycle: CycleNumber, voter: &Identity) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..8].copy_from_slice(&cycle.to_be_bytes());
    key[8..].copy_from_slice(voter);
    key
}

type TxResult<T> = std::result::Result<T, ConflictableTransactionError<StorageError>>;

fn abort<T>(err: StorageError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Sled-backed implementation
pub struct SledDistributionStore {
    db: Db,
    distributions: Tree,
    votes: Tree,
    nonces: Tree,
    tallies: Tree,
    metadata: Tree,
}

impl SledDistributionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path).map_err(StorageError::from)?;
        Self::from_db(db)
    }

    /// Temporary database removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(StorageError::from)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let distributions = db.open_tree("distributions")?;
        let votes = db.open_tree("votes")?;
        let nonces = db.open_tree("nonces")?;
        let tallies = db.open_tree("tallies")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            distributions,
            votes,
            nonces,
            tallies,
            metadata,
        })
    }
}

impl DistributionStore for SledDistributionStore {
    fn begin_close(&self, distribution: &Distribution) -> Result<()> {
        let key = distribution.cycle.to_be_bytes();
        let data = serde_json::to_vec(distribution)?;

        (&self.distributions, &self.metadata)
            .transaction(|(distributions, metadata)| {
                if distributions.get(&key[..])?.is_some() {
                    return abort(StorageError::DuplicateDistribution(distribution.cycle));
                }
                if let Some(existing) = metadata.get(PENDING_CLOSE)? {
                    let cycle = match serde_json::from_slice::<Distribution>(&existing) {
                        Ok(pending) => pending.cycle,
                        Err(e) => return abort(StorageError::from(e)),
                    };
                    return abort(StorageError::ClosePending(cycle));
                }
                metadata.insert(PENDING_CLOSE, data.as_slice())?;
                Ok(())
            })
            .map_err(StorageError::from)?;
        debug!(target: "storage", cycle = distribution.cycle, "Close begun");
        Ok(())
    }

    fn pending_close(&self) -> Result<Option<Distribution>> {
        match self.metadata.get(PENDING_CLOSE)? {
            Some(v) => serde_json::from_slice(&v).map(Some).map_err(|e| {
                StorageError::Corrupt {
                    key: "pending_close".to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    fn abandon_close(&self, cycle: CycleNumber) -> Result<()> {
        let Some(raw) = self.metadata.get(PENDING_CLOSE)? else {
            return Ok(());
        };
        let pending: Distribution = serde_json::from_slice(&raw)?;
        if pending.cycle != cycle {
            return Ok(());
        }
        // a concurrent begin_close for another cycle keeps its marker
        let _ = self
            .metadata
            .compare_and_swap(PENDING_CLOSE, Some(raw), None as Option<&[u8]>)?;
        debug!(target: "storage", cycle, "Close abandoned");
        Ok(())
    }

    fn commit_close(
        &self,
        distribution: &Distribution,
        frozen: &RunningTally,
        open: &RunningTally,
        next: &Cycle,
    ) -> Result<()> {
        let key = distribution.cycle.to_be_bytes();
        let record = serde_json::to_vec(distribution)?;
        let frozen_key = frozen.cycle.to_be_bytes();
        let frozen_data = serde_json::to_vec(frozen)?;
        let open_key = open.cycle.to_be_bytes();
        let open_data = serde_json::to_vec(open)?;
        let cycle_data = serde_json::to_vec(next)?;

        (&self.distributions, &self.tallies, &self.metadata)
            .transaction(|(distributions, tallies, metadata)| {
                if distributions.get(&key[..])?.is_some() {
                    return abort(StorageError::DuplicateDistribution(distribution.cycle));
                }
                distributions.insert(&key[..], record.as_slice())?;
                tallies.insert(&frozen_key[..], frozen_data.as_slice())?;
                tallies.insert(&open_key[..], open_data.as_slice())?;
                metadata.insert(CURRENT_CYCLE, cycle_data.as_slice())?;
                metadata.remove(PENDING_CLOSE)?;
                Ok(())
            })
            .map_err(StorageError::from)?;
        debug!(
            target: "storage",
            cycle = distribution.cycle,
            next = next.number,
            "Close committed"
        );
        Ok(())
    }

    fn get_distribution(&self, cycle: CycleNumber) -> Result<Option<Distribution>> {
        self.distributions
            .get(cycle.to_be_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    fn list_distributions(&self) -> Result<Vec<Distribution>> {
        self.distributions
            .iter()
            .map(|r| {
                let (_, v) = r?;
                Ok(serde_json::from_slice::<Distribution>(&v)?)
            })
            .collect()
    }

    fn record_votes(&self, records: &[VoteRecord], tally: &RunningTally) -> Result<()> {
        let mut votes = Vec::with_capacity(records.len());
        let mut nonces = Vec::new();
        for record in records {
            votes.push((vote_key(record.cycle, &record.voter), serde_json::to_vec(record)?));
            if let Some(nonce) = record.nonce {
                nonces.push(nonce_key(&record.voter, nonce));
            }
        }
        let tally_key = tally.cycle.to_be_bytes();
        let tally_data = serde_json::to_vec(tally)?;

        (&self.votes, &self.nonces, &self.tallies)
            .transaction(|(vote_tree, nonce_tree, tally_tree)| {
                for (key, data) in &votes {
                    vote_tree.insert(&key[..], data.as_slice())?;
                }
                for key in &nonces {
                    nonce_tree.insert(&key[..], Vec::<u8>::new())?;
                }
                tally_tree.insert(&tally_key[..], tally_data.as_slice())?;
                Ok::<_, ConflictableTransactionError<StorageError>>(())
            })
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn get_vote(&self, cycle: CycleNumber, voter: &Identity) -> Result<Option<VoteRecord>> {
        self.votes
            .get(vote_key(cycle, voter))?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    fn list_votes(&self, cycle: Option<CycleNumber>) -> Result<Vec<VoteRecord>> {
        let iter = match cycle {
            Some(c) => self.votes.scan_prefix(c.to_be_bytes()),
            None => self.votes.iter(),
        };
        iter.map(|r| {
            let (_, v) = r?;
            Ok(serde_json::from_slice::<VoteRecord>(&v)?)
        })
        .collect()
    }

    fn list_nonces(&self) -> Result<Vec<(Identity, u64)>> {
        self.nonces
            .iter()
            .keys()
            .map(|k| {
                let key = k?;
                if key.len() != 40 {
                    return Err(StorageError::Corrupt {
                        key: hex::encode(&key),
                        reason: "nonce key must be 40 bytes".to_string(),
                    }
                    .into());
                }
                let mut voter = [0u8; 32];
                voter.copy_from_slice(&key[..32]);
                let mut nonce = [0u8; 8];
                nonce.copy_from_slice(&key[32..]);
                Ok((voter, u64::from_be_bytes(nonce)))
            })
            .collect()
    }

    fn save_cycle(&self, cycle: &Cycle) -> Result<()> {
        self.metadata
            .insert(CURRENT_CYCLE, serde_json::to_vec(cycle)?)?;
        Ok(())
    }

    fn load_cycle(&self) -> Result<Option<Cycle>> {
        match self.metadata.get(CURRENT_CYCLE)? {
            Some(v) => serde_json::from_slice(&v).map(Some).map_err(|e| {
                StorageError::Corrupt {
                    key: "current_cycle".to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    fn get_tally(&self, cycle: CycleNumber) -> Result<Option<RunningTally>> {
        self.tallies
            .get(cycle.to_be_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    fn list_tallies(&self) -> Result<Vec<RunningTally>> {
        self.tallies
            .iter()
            .map(|r| {
                let (_, v) = r?;
                Ok(serde_json::from_slice::<RunningTally>(&v)?)
            })
            .collect()
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory testing backend.
///
/// Write methods take every lock they touch before changing anything, in
/// field order.
#[derive(Default)]
pub struct MemoryDistributionStore {
    distributions: RwLock<BTreeMap<CycleNumber, Distribution>>,
    votes: RwLock<BTreeMap<(CycleNumber, Identity), VoteRecord>>,
    nonces: RwLock<BTreeSet<(Identity, u64)>>,
    tallies: RwLock<BTreeMap<CycleNumber, RunningTally>>,
    cycle: RwLock<Option<Cycle>>,
    pending: RwLock<Option<Distribution>>,
}

impl MemoryDistributionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DistributionStore for MemoryDistributionStore {
    fn begin_close(&self, distribution: &Distribution) -> Result<()> {
        let distributions = self.distributions.read();
        let mut pending = self.pending.write();
        if distributions.contains_key(&distribution.cycle) {
            return Err(StorageError::DuplicateDistribution(distribution.cycle).into());
        }
        if let Some(existing) = pending.as_ref() {
            return Err(StorageError::ClosePending(existing.cycle).into());
        }
        *pending = Some(distribution.clone());
        Ok(())
    }

    fn pending_close(&self) -> Result<Option<Distribution>> {
        Ok(self.pending.read().clone())
    }

    fn abandon_close(&self, cycle: CycleNumber) -> Result<()> {
        let mut pending = self.pending.write();
        if pending.as_ref().map(|d| d.cycle) == Some(cycle) {
            *pending = None;
        }
        Ok(())
    }

    fn commit_close(
        &self,
        distribution: &Distribution,
        frozen: &RunningTally,
        open: &RunningTally,
        next: &Cycle,
    ) -> Result<()> {
        let mut distributions = self.distributions.write();
        let mut tallies = self.tallies.write();
        let mut cycle = self.cycle.write();
        let mut pending = self.pending.write();
        if distributions.contains_key(&distribution.cycle) {
            return Err(StorageError::DuplicateDistribution(distribution.cycle).into());
        }
        distributions.insert(distribution.cycle, distribution.clone());
        tallies.insert(frozen.cycle, frozen.clone());
        tallies.insert(open.cycle, open.clone());
        *cycle = Some(*next);
        *pending = None;
        Ok(())
    }

    fn get_distribution(&self, cycle: CycleNumber) -> Result<Option<Distribution>> {
        Ok(self.distributions.read().get(&cycle).cloned())
    }

    fn list_distributions(&self) -> Result<Vec<Distribution>> {
        Ok(self.distributions.read().values().cloned().collect())
    }

    fn record_votes(&self, records: &[VoteRecord], tally: &RunningTally) -> Result<()> {
        let mut votes = self.votes.write();
        let mut nonces = self.nonces.write();
        let mut tallies = self.tallies.write();
        for record in records {
            votes.insert((record.cycle, record.voter), record.clone());
            if let Some(nonce) = record.nonce {
                nonces.insert((record.voter, nonce));
            }
        }
        tallies.insert(tally.cycle, tally.clone());
        Ok(())
    }

    fn get_vote(&self, cycle: CycleNumber, voter: &Identity) -> Result<Option<VoteRecord>> {
        Ok(self.votes.read().get(&(cycle, *voter)).cloned())
    }

    fn list_votes(&self, cycle: Option<CycleNumber>) -> Result<Vec<VoteRecord>> {
        Ok(self
            .votes
            .read()
            .values()
            .filter(|v| cycle.map(|c| c == v.cycle).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn list_nonces(&self) -> Result<Vec<(Identity, u64)>> {
        Ok(self.nonces.read().iter().copied().collect())
    }

    fn save_cycle(&self, cycle: &Cycle) -> Result<()> {
        *self.cycle.write() = Some(*cycle);
        Ok(())
    }

    fn load_cycle(&self) -> Result<Option<Cycle>> {
        Ok(*self.cycle.read())
    }

    fn get_tally(&self, cycle: CycleNumber) -> Result<Option<RunningTally>> {
        Ok(self.tallies.read().get(&cycle).cloned())
    }

    fn list_tallies(&self) -> Result<Vec<RunningTally>> {
        Ok(self.tallies.read().values().cloned().collect())
    }
}
