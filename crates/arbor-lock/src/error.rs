//! Error types for the locking subsystem.

use arbor_types::ResourceId;
use thiserror::Error;

/// Errors reported by lock acquisition.
///
/// Contention is never an error; it is ordinary blocking. Releasing a token
/// through the wrong unlock call is a programming error and panics instead
/// of returning a value of this type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    /// The target node (or the parent, for create) did not exist when the
    /// ancestor chain was resolved. No lock is held when this is returned.
    #[error("resource not found: {id}")]
    NotFound { id: ResourceId },
}

/// Errors from loading or validating locker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("shard count must be at least 1, got {0}")]
    InvalidShardCount(usize),

    #[error("invalid locker configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot render locker configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for lock acquisition.
pub type LockResult<T> = std::result::Result<T, LockError>;
