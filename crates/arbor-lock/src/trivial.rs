//! The single-mutex locker.

use std::fmt;
use std::sync::Arc;

use arbor_types::{OperationKind, ResourceId};
use parking_lot::Mutex;
use tracing::trace;

use crate::error::LockResult;
use crate::token::{Held, LockToken, LockerId};
use crate::traits::Locker;

/// Serializes every tree operation behind one mutex.
///
/// All four acquire calls take the same lock, so no two operations of any
/// kind ever overlap. No path resolution is done and acquisition never
/// reports `NotFound`.
pub struct TrivialLocker {
    id: LockerId,
    monitor: Arc<Mutex<()>>,
}

impl TrivialLocker {
    pub fn new() -> Self {
        Self {
            id: LockerId::next(),
            monitor: Arc::new(Mutex::new(())),
        }
    }

    pub fn id(&self) -> LockerId {
        self.id
    }

    pub fn is_locked(&self) -> bool {
        self.monitor.is_locked()
    }

    fn enter(&self, kind: OperationKind) -> LockToken {
        let guard = self.monitor.lock_arc();
        trace!(locker = %self.id, %kind, "entered tree monitor");
        LockToken::new(self.id, kind, Held::Monitor { _guard: guard })
    }
}

impl Default for TrivialLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrivialLocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrivialLocker")
            .field("id", &self.id)
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl Locker for TrivialLocker {
    fn lock_everything(&self) -> LockToken {
        self.enter(OperationKind::Everything)
    }

    fn lock_update(&self, _node: &ResourceId) -> LockResult<LockToken> {
        Ok(self.enter(OperationKind::Update))
    }

    fn lock_delete(&self, _node: &ResourceId) -> LockResult<LockToken> {
        Ok(self.enter(OperationKind::Delete))
    }

    fn lock_create(&self, _parent: &ResourceId, _name: &str) -> LockResult<LockToken> {
        Ok(self.enter(OperationKind::Create))
    }

    fn unlock_everything(&self, token: LockToken) {
        token.release(self.id, OperationKind::Everything);
    }

    fn unlock_update(&self, token: LockToken) {
        token.release(self.id, OperationKind::Update);
    }

    fn unlock_delete(&self, token: LockToken) {
        token.release(self.id, OperationKind::Delete);
    }

    fn unlock_create(&self, token: LockToken) {
        token.release(self.id, OperationKind::Create);
    }
}
