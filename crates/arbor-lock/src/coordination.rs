//! The process-wide lock arbitrating whole-tree against path-scoped work.

use std::fmt;
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};

/// Held by every path-scoped operation for its whole duration.
pub type SharedStamp = ArcRwLockReadGuard<RawRwLock, ()>;

/// Held by a whole-tree operation for its whole duration.
pub type ExclusiveStamp = ArcRwLockWriteGuard<RawRwLock, ()>;

/// A single reader/writer lock shared by the whole process.
///
/// Path-scoped operations hold it shared, whole-tree operations hold it
/// exclusively, so the two classes never overlap. It is always acquired
/// before any per-node lock.
#[derive(Default)]
pub struct GlobalCoordinationLock {
    lock: Arc<RwLock<()>>,
}

impl GlobalCoordinationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> SharedStamp {
        self.lock.read_arc()
    }

    pub fn exclusive(&self) -> ExclusiveStamp {
        self.lock.write_arc()
    }

    /// Whether any stamp, shared or exclusive, is outstanding.
    pub fn is_held(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn is_held_exclusive(&self) -> bool {
        self.lock.is_locked_exclusive()
    }
}

impl fmt::Debug for GlobalCoordinationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalCoordinationLock")
            .field("held", &self.is_held())
            .field("exclusive", &self.is_held_exclusive())
            .finish()
    }
}
