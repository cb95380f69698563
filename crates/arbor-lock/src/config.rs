use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shard count used when none is configured.
pub const DEFAULT_SHARD_COUNT: usize = 50;

/// Which locker implementation to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// One mutex for the whole tree.
    Trivial,
    /// Per-node locks along the ancestor chain.
    #[default]
    Path,
}

/// Configuration for the tree locker.
///
/// ```toml
/// strategy = "path"
/// shard_count = 64
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockerConfig {
    pub strategy: LockStrategy,
    /// Number of independent registry shards. More shards mean less
    /// contention when many never-seen keys are created at once, at the
    /// cost of one mutex and map per shard. Ignored by the trivial locker.
    pub shard_count: usize,
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            strategy: LockStrategy::Path,
            shard_count: DEFAULT_SHARD_COUNT,
        }
    }
}

impl LockerConfig {
    pub fn trivial() -> Self {
        Self {
            strategy: LockStrategy::Trivial,
            ..Default::default()
        }
    }

    pub fn path(shard_count: usize) -> Self {
        Self {
            strategy: LockStrategy::Path,
            shard_count,
        }
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::InvalidShardCount(self.shard_count));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = LockerConfig::default();
        assert_eq!(c.strategy, LockStrategy::Path);
        assert_eq!(c.shard_count, DEFAULT_SHARD_COUNT);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parse_full_document() {
        let c = LockerConfig::from_toml_str("strategy = \"trivial\"\nshard_count = 8\n").unwrap();
        assert_eq!(c.strategy, LockStrategy::Trivial);
        assert_eq!(c.shard_count, 8);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let c = LockerConfig::from_toml_str("shard_count = 3").unwrap();
        assert_eq!(c.strategy, LockStrategy::Path);
        assert_eq!(c.shard_count, 3);

        let empty = LockerConfig::from_toml_str("").unwrap();
        assert_eq!(empty, LockerConfig::default());
    }

    #[test]
    fn zero_shards_rejected() {
        let err = LockerConfig::from_toml_str("shard_count = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidShardCount(0)));
    }

    #[test]
    fn unknown_strategy_rejected() {
        let err = LockerConfig::from_toml_str("strategy = \"global\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "strategy = \"path\"").unwrap();
        writeln!(file, "shard_count = 16").unwrap();

        let c = LockerConfig::load(file.path()).unwrap();
        assert_eq!(c, LockerConfig::path(16));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LockerConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn renders_back_to_toml() {
        let c = LockerConfig::path(12);
        let rendered = c.to_toml_string().unwrap();
        assert_eq!(LockerConfig::from_toml_str(&rendered).unwrap(), c);
    }
}
