//! Error taxonomy shared across crates

use serde::{Deserialize, Serialize};

/// Broad class of a rejected operation, used to decide whether a caller may
/// retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Caller input failed validation; retry with corrected input
    Configuration,
    /// The cycle gate is closed; retry once enough ticks elapse
    Timing,
    /// Preconditions for a meaningful distribution are unmet
    Resource,
    /// Double action or forged authorization; never retry the same input
    Integrity,
    /// Administrative gating
    Authorization,
    /// Arithmetic overflow or backend failure
    Internal,
}

impl ErrorCategory {
    /// Whether the same operation can succeed later without operator action
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Configuration | ErrorCategory::Timing | ErrorCategory::Resource
        )
    }
}
