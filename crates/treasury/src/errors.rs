//! Error types for the Treasury module

use thiserror::Error;
use yieldsplit_governance::GovernanceError;
use yieldsplit_storage::StorageError;
use yieldsplit_types::{Amount, CycleNumber, ErrorCategory, Tick};

/// Errors that can occur while configuring or running distributions
#[derive(Error, Debug)]
pub enum TreasuryError {
    /// Split divisor must be at least 1
    #[error("Invalid split divisor {0}: must be at least 1")]
    InvalidDivisor(u128),

    /// Cycle length must be positive
    #[error("Invalid cycle length {0}: must be positive")]
    InvalidCycleLength(Tick),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cycle gate is still closed
    #[error("Cycle {cycle} not complete: {remaining} ticks remaining")]
    CycleNotComplete { cycle: CycleNumber, remaining: Tick },

    /// Distribution is administratively paused
    #[error("Distribution is paused")]
    SystemDisabled,

    /// Nothing accrued and nothing held in custody
    #[error("No yield available to distribute")]
    InsufficientYield,

    #[error("No active recipients")]
    NoRecipients,

    #[error("No votes cast in cycle {0}")]
    NoVotesCast(CycleNumber),

    /// The smallest non-zero vote weight would round to a zero payout
    #[error(
        "Voted amount {voted_amount} too small: weight {min_weight} of {total_weighted} rounds to zero"
    )]
    InsufficientYieldPrecision {
        min_weight: Amount,
        voted_amount: Amount,
        total_weighted: Amount,
    },

    /// Votes were recorded against recipient slots that are no longer active
    #[error("Votes recorded for recipient slots beyond the {recipients} active recipients")]
    RecipientSetMismatch { recipients: usize },

    #[error("Recipient {0} already registered or queued")]
    RecipientExists(String),

    #[error("Recipient {0} not found")]
    RecipientNotFound(String),

    /// Computed payouts do not add up to the distributed total
    #[error("Distribution for cycle {0} violates conservation")]
    ConservationViolated(CycleNumber),

    #[error("Arithmetic overflow while computing {0}")]
    ArithmeticOverflow(&'static str),

    /// History already holds a distribution for the cycle being closed
    #[error("Cycle {0} was already distributed")]
    AlreadyDistributed(CycleNumber),

    /// The store holds a close that was begun but never committed or
    /// abandoned; its payout may or may not have landed
    #[error("Close of cycle {0} is unresolved; reconcile payouts before restarting")]
    UnresolvedClose(CycleNumber),

    /// The yield source refused the claim
    #[error("Yield claim failed: {0}")]
    YieldClaim(String),

    /// The payout batch was rejected; nothing was paid
    #[error("Payout failed: {0}")]
    Payout(String),

    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to initialise logging: {0}")]
    Telemetry(String),
}

impl TreasuryError {
    /// Taxonomy class of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            TreasuryError::InvalidDivisor(_)
            | TreasuryError::InvalidCycleLength(_)
            | TreasuryError::InvalidConfig(_)
            | TreasuryError::Config(_) => ErrorCategory::Configuration,
            TreasuryError::CycleNotComplete { .. } => ErrorCategory::Timing,
            TreasuryError::InsufficientYield
            | TreasuryError::NoRecipients
            | TreasuryError::NoVotesCast(_)
            | TreasuryError::InsufficientYieldPrecision { .. }
            | TreasuryError::YieldClaim(_)
            | TreasuryError::Payout(_) => ErrorCategory::Resource,
            TreasuryError::RecipientSetMismatch { .. }
            | TreasuryError::AlreadyDistributed(_)
            | TreasuryError::UnresolvedClose(_)
            | TreasuryError::RecipientExists(_)
            | TreasuryError::RecipientNotFound(_) => ErrorCategory::Integrity,
            TreasuryError::SystemDisabled => ErrorCategory::Authorization,
            TreasuryError::ConservationViolated(_)
            | TreasuryError::ArithmeticOverflow(_)
            | TreasuryError::Telemetry(_) => ErrorCategory::Internal,
            TreasuryError::Governance(e) => e.category(),
            TreasuryError::Storage(e) => e.category(),
        }
    }

    /// Whether retrying the same call later can succeed without a change
    /// of input
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Result type for Treasury operations
pub type Result<T> = std::result::Result<T, TreasuryError>;
