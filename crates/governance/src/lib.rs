//! Yieldsplit Governance
//!
//! Voting side of the yield splitter:
//! - per-cycle vote ledger with recast and nonce rules
//! - pluggable voting-power strategies
//! - ed25519 signed vote batches
//! - role-based access control shared with the treasury

pub mod access;
pub mod errors;
pub mod parameters;
pub mod power;
pub mod signatures;
pub mod voting;

pub use access::{AccessControl, Role};
pub use errors::{GovernanceError, Result};
pub use parameters::{LedgerParams, RecastPolicy};
pub use power::{
    CheckpointedBalancePower, PowerStrategies, StakeWeightedPower, VotingPowerStrategy,
};
pub use signatures::{Ed25519SignatureOracle, SignatureOracle, SignedVote, VotePayload};
pub use voting::{LedgerSnapshot, StagedVotes, VoteLedger, VoteReceipt};

/// Governance module version (for API introspection)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
