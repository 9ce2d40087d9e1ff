//! Error types for the Governance module

use crate::access::Role;
use thiserror::Error;
use yieldsplit_types::{Amount, CycleNumber, ErrorCategory};

/// Errors that can occur in the Governance module
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    /// Point vector has the wrong length, an over-limit entry, or sums to zero
    #[error("Invalid points distribution: {0}")]
    InvalidPointsDistribution(String),

    /// Voter already has a vote in this cycle and recasting is disabled
    #[error("Voter {voter} already voted in cycle {cycle}")]
    AlreadyVotedInCycle { voter: String, cycle: CycleNumber },

    /// Summed voting power is zero or below the configured minimum
    #[error("Insufficient voting power: {power} < required {required}")]
    InsufficientVotingPower { power: Amount, required: Amount },

    /// Signed vote nonce was already consumed by this voter
    #[error("Nonce {nonce} already used by voter {voter}")]
    NonceAlreadyUsed { voter: String, nonce: u64 },

    /// Signature does not authenticate the claimed voter
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Vote targets a cycle other than the open one
    #[error("Vote targets cycle {got} but cycle {expected} is open")]
    WrongCycle { expected: CycleNumber, got: CycleNumber },

    /// Signed batch exceeds the configured maximum
    #[error("Batch of {size} votes exceeds maximum {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// Caller lacks the required role
    #[error("Identity {identity} is not authorized for role {role:?}")]
    NotAuthorized { identity: String, role: Role },

    /// Invalid ledger parameter
    #[error("Invalid governance parameter: {0}")]
    InvalidParameter(&'static str),

    /// A voting-power strategy failed to answer
    #[error("Voting power strategy {strategy} failed: {reason}")]
    PowerStrategy {
        strategy: &'static str,
        reason: String,
    },

    /// Arithmetic overflow
    #[error("Arithmetic overflow while computing {0}")]
    ArithmeticOverflow(&'static str),

    /// Tally and stored ballots disagree
    #[error("Tally inconsistent: {0}")]
    TallyInconsistent(String),
}

impl GovernanceError {
    /// Taxonomy class of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            GovernanceError::InvalidPointsDistribution(_)
            | GovernanceError::InvalidParameter(_)
            | GovernanceError::BatchTooLarge { .. } => ErrorCategory::Configuration,
            GovernanceError::InsufficientVotingPower { .. } => ErrorCategory::Resource,
            GovernanceError::AlreadyVotedInCycle { .. }
            | GovernanceError::NonceAlreadyUsed { .. }
            | GovernanceError::InvalidSignature(_)
            | GovernanceError::WrongCycle { .. } => ErrorCategory::Integrity,
            GovernanceError::NotAuthorized { .. } => ErrorCategory::Authorization,
            GovernanceError::PowerStrategy { .. }
            | GovernanceError::ArithmeticOverflow(_)
            | GovernanceError::TallyInconsistent(_) => ErrorCategory::Internal,
        }
    }
}

/// Result type for Governance operations
pub type Result<T> = std::result::Result<T, GovernanceError>;
