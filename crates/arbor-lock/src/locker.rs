//! Startup-time selection between the two lockers.

use std::sync::Arc;

use arbor_types::ResourceId;
use tracing::info;

use crate::config::{LockStrategy, LockerConfig};
use crate::error::{ConfigError, LockResult};
use crate::path::PathLocker;
use crate::token::{LockToken, LockerId};
use crate::traits::{Locker, TreePathResolver};
use crate::trivial::TrivialLocker;

/// The locker a deployment runs with.
///
/// The variant is fixed when the service starts; callers go through the
/// [`Locker`] trait and never branch on which one is active.
#[derive(Debug)]
pub enum TreeLocker {
    Trivial(TrivialLocker),
    Path(PathLocker),
}

impl TreeLocker {
    /// Build the locker described by `config`.
    ///
    /// `resolver` is only consulted by the path locker.
    pub fn from_config(
        config: &LockerConfig,
        resolver: Arc<dyn TreePathResolver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let locker = match config.strategy {
            LockStrategy::Trivial => Self::Trivial(TrivialLocker::new()),
            LockStrategy::Path => Self::Path(PathLocker::new(resolver, config.shard_count)),
        };
        info!(
            strategy = ?config.strategy,
            shard_count = config.shard_count,
            locker = %locker.id(),
            "tree locker ready"
        );
        Ok(locker)
    }

    pub fn strategy(&self) -> LockStrategy {
        match self {
            Self::Trivial(_) => LockStrategy::Trivial,
            Self::Path(_) => LockStrategy::Path,
        }
    }

    pub fn id(&self) -> LockerId {
        match self {
            Self::Trivial(l) => l.id(),
            Self::Path(l) => l.id(),
        }
    }

    /// Live per-node lock entries; always zero for the trivial locker.
    pub fn live_entries(&self) -> usize {
        match self {
            Self::Trivial(_) => 0,
            Self::Path(l) => l.registry().live_entries(),
        }
    }

    fn inner(&self) -> &dyn Locker {
        match self {
            Self::Trivial(l) => l,
            Self::Path(l) => l,
        }
    }
}

impl Locker for TreeLocker {
    fn lock_everything(&self) -> LockToken {
        self.inner().lock_everything()
    }

    fn lock_update(&self, node: &ResourceId) -> LockResult<LockToken> {
        self.inner().lock_update(node)
    }

    fn lock_delete(&self, node: &ResourceId) -> LockResult<LockToken> {
        self.inner().lock_delete(node)
    }

    fn lock_create(&self, parent: &ResourceId, name: &str) -> LockResult<LockToken> {
        self.inner().lock_create(parent, name)
    }

    fn unlock_everything(&self, token: LockToken) {
        self.inner().unlock_everything(token)
    }

    fn unlock_update(&self, token: LockToken) {
        self.inner().unlock_update(token)
    }

    fn unlock_delete(&self, token: LockToken) {
        self.inner().unlock_delete(token)
    }

    fn unlock_create(&self, token: LockToken) {
        self.inner().unlock_create(token)
    }
}
