//! Distributor configuration
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables prefixed with `YIELDSPLIT_` (nested keys joined by `__`, e.g.
//! `YIELDSPLIT_LOGGING__LEVEL=debug`).

use crate::errors::{Result, TreasuryError};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use yieldsplit_governance::{LedgerParams, RecastPolicy};
use yieldsplit_types::{
    identity_from_hex, identity_from_label, Identity, Tick, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_MAX_POINTS,
};

/// Label the default custody identity is derived from
const DEFAULT_CUSTODY_LABEL: &str = "yieldsplit/custody";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Cycle duration in ticks
    pub cycle_length: Tick,
    /// Start of the genesis cycle; the clock's current tick when unset
    pub start_tick: Option<Tick>,
    /// `fixed = total / split_divisor`
    pub split_divisor: u64,
    pub max_points: u32,
    /// Weighted vote scaling constant
    pub precision: u64,
    pub max_batch_size: usize,
    pub min_voting_power: u64,
    pub recast_policy: RecastPolicy,
    /// Hex identity holding claimed yield until it is paid out
    pub custody_account: Option<String>,
    pub logging: LoggingConfig,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            cycle_length: 7_200,
            start_tick: None,
            split_divisor: 4,
            max_points: DEFAULT_MAX_POINTS,
            precision: 1_000_000_000_000_000_000,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            min_voting_power: 0,
            recast_policy: RecastPolicy::Reject,
            custody_account: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl DistributorConfig {
    /// Load from `path` (if given) and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("YIELDSPLIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document, then validate
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.split_divisor == 0 {
            return Err(TreasuryError::InvalidDivisor(0));
        }
        if self.cycle_length == 0 {
            return Err(TreasuryError::InvalidCycleLength(0));
        }
        if self.max_points == 0 {
            return Err(TreasuryError::InvalidConfig(
                "max_points must be positive".to_string(),
            ));
        }
        if self.precision == 0 {
            return Err(TreasuryError::InvalidConfig(
                "precision must be positive".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(TreasuryError::InvalidConfig(
                "max_batch_size must be positive".to_string(),
            ));
        }
        self.custody_identity()?;
        Ok(())
    }

    /// Vote ledger parameters derived from this config
    pub fn ledger_params(&self) -> LedgerParams {
        LedgerParams {
            max_points: self.max_points,
            precision: self.precision as u128,
            max_batch_size: self.max_batch_size,
            min_voting_power: self.min_voting_power as u128,
            recast_policy: self.recast_policy,
        }
    }

    pub fn custody_identity(&self) -> Result<Identity> {
        match &self.custody_account {
            Some(hex) => identity_from_hex(hex).map_err(|e| {
                TreasuryError::InvalidConfig(format!("custody_account: {e}"))
            }),
            None => Ok(identity_from_label(DEFAULT_CUSTODY_LABEL)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = DistributorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ledger_params().precision, 1_000_000_000_000_000_000);
        assert_eq!(
            config.custody_identity().unwrap(),
            identity_from_label(DEFAULT_CUSTODY_LABEL)
        );
    }

    #[test]
    fn test_toml_overrides() {
        let config = DistributorConfig::from_toml_str(
            r#"
            cycle_length = 100
            start_tick = 1000
            split_divisor = 3
            recast_policy = "replace"

            [logging]
            format = "compact"
            "#,
        )
        .unwrap();

        assert_eq!(config.cycle_length, 100);
        assert_eq!(config.start_tick, Some(1000));
        assert_eq!(config.split_divisor, 3);
        assert_eq!(config.recast_policy, RecastPolicy::Replace);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.max_points, DEFAULT_MAX_POINTS);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            DistributorConfig::from_toml_str("split_divisor = 0"),
            Err(TreasuryError::InvalidDivisor(0))
        ));
        assert!(matches!(
            DistributorConfig::from_toml_str("cycle_length = 0"),
            Err(TreasuryError::InvalidCycleLength(0))
        ));
        assert!(matches!(
            DistributorConfig::from_toml_str("precision = 0"),
            Err(TreasuryError::InvalidConfig(_))
        ));
        assert!(matches!(
            DistributorConfig::from_toml_str("custody_account = \"zz\""),
            Err(TreasuryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "cycle_length = 50\nmax_points = 100").unwrap();

        let config = DistributorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.cycle_length, 50);
        assert_eq!(config.ledger_params().max_points, 100);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = DistributorConfig::load(Some(Path::new("/nonexistent/yieldsplit.toml")))
            .unwrap_err();
        assert!(matches!(err, TreasuryError::Config(_)));
    }
}
