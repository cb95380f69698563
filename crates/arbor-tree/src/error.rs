//! Error types for resource tree operations.

use arbor_lock::{ConfigError, LockError};
use arbor_types::ResourceId;
use thiserror::Error;

/// Errors that can occur during tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The resource (or the parent, for create) does not exist.
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// The parent already has a child with this name.
    #[error("{parent} already has a child named {name:?}")]
    NameConflict { parent: ResourceId, name: String },

    /// The root cannot be deleted.
    #[error("the root resource cannot be deleted")]
    RootImmutable,

    /// Child or sibling bookkeeping is inconsistent.
    #[error("integrity violation at {id}: {reason}")]
    Integrity { id: ResourceId, reason: String },

    #[error("locker configuration: {0}")]
    Config(#[from] ConfigError),

    /// Failure in the storage backend.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A workload thread panicked.
    #[error("workload failed: {0}")]
    Workload(String),
}

impl TreeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<LockError> for TreeError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::NotFound { id } => Self::NotFound(id),
        }
    }
}

/// Convenience type alias for tree operations.
pub type TreeResult<T> = std::result::Result<T, TreeError>;
