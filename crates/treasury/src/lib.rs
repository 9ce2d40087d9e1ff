//! yieldsplit Treasury Module
//!
//! Collects yield once per cycle and splits it between a fixed bucket, paid
//! equally to every active recipient, and a voted bucket, paid in
//! proportion to the cycle's weighted votes.

pub mod account_ledger;
pub mod config;
pub mod cycle;
pub mod distributor;
pub mod errors;
pub mod registry;
pub mod split;
pub mod telemetry;
pub mod yield_source;

pub use account_ledger::{AccountLedger, InMemoryAccountLedger, MockAccountLedger, SharedLedger};
pub use config::{DistributorConfig, LogFormat, LoggingConfig};
pub use cycle::{CycleGate, ManualClock, TickSource};
pub use distributor::{Collaborators, DistributionPhase, YieldDistributor};
pub use errors::{Result, TreasuryError};
pub use registry::{QueuedRecipientRegistry, RecipientRegistry};
pub use split::{check_precision_floor, split_fixed, split_voted, SplitCalculator, SplitPlan};
pub use telemetry::init_logging;
pub use yield_source::{InMemoryYieldSource, YieldSource};
