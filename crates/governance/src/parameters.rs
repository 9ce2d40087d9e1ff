use crate::errors::{GovernanceError, Result};
use serde::{Deserialize, Serialize};
use yieldsplit_types::{Amount, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_POINTS, DEFAULT_PRECISION};

/// What happens when a voter votes again in the same cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecastPolicy {
    /// Second vote fails with `AlreadyVotedInCycle`
    #[default]
    Reject,
    /// Previous contribution is subtracted, then the new one is added
    Replace,
}

/// Vote ledger parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerParams {
    /// Upper bound for a single point entry
    pub max_points: u32,
    /// Scaling constant: contribution = power * points / precision
    pub precision: u128,
    /// Maximum number of signed votes accepted in one batch
    pub max_batch_size: usize,
    /// Minimum summed voting power required to vote
    pub min_voting_power: Amount,
    pub recast_policy: RecastPolicy,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            precision: DEFAULT_PRECISION,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            min_voting_power: 0,
            recast_policy: RecastPolicy::Reject,
        }
    }
}

impl LedgerParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_points == 0 {
            return Err(GovernanceError::InvalidParameter("max_points must be positive"));
        }
        if self.precision == 0 {
            return Err(GovernanceError::InvalidParameter("precision must be positive"));
        }
        if self.max_batch_size == 0 {
            return Err(GovernanceError::InvalidParameter(
                "max_batch_size must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = LedgerParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.recast_policy, RecastPolicy::Reject);
        assert_eq!(params.max_points, 10_000);
    }

    #[test]
    fn test_zero_values_rejected() {
        for params in [
            LedgerParams {
                max_points: 0,
                ..Default::default()
            },
            LedgerParams {
                precision: 0,
                ..Default::default()
            },
            LedgerParams {
                max_batch_size: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                params.validate(),
                Err(GovernanceError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_recast_policy_names() {
        let policy: RecastPolicy = serde_json::from_str("\"replace\"").unwrap();
        assert_eq!(policy, RecastPolicy::Replace);
    }
}
