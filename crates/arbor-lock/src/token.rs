//! Lock tokens: the linear capability returned by every acquire call.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use arbor_types::{LockMode, OperationKind, ResourceKey};
use parking_lot::{ArcMutexGuard, RawMutex};
use tracing::trace;

use crate::coordination::{ExclusiveStamp, SharedStamp};
use crate::registry::HeldNode;

/// Identity of one locker instance.
///
/// Stamped into every token so that a token can only be released by the
/// locker that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LockerId(u64);

impl LockerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LockerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "locker#{}", self.0)
    }
}

pub(crate) enum Held {
    /// The trivial locker's single mutex.
    Monitor { _guard: ArcMutexGuard<RawMutex, ()> },
    /// The coordination lock held exclusively.
    Everything { _stamp: ExclusiveStamp },
    /// Per-node locks in chain order (deepest first) under a shared stamp.
    Path {
        nodes: Vec<HeldNode>,
        _stamp: SharedStamp,
    },
}

/// Proof that a set of locks is held.
///
/// A token is returned by an acquire call only once every lock for the
/// operation is held, and it must be handed to the matching `unlock_*` call
/// of the locker that issued it. The token is moved into that call, so it
/// cannot be released twice or used afterwards:
///
/// ```compile_fail
/// use arbor_lock::{Locker, TrivialLocker};
///
/// let locker = TrivialLocker::new();
/// let token = locker.lock_everything();
/// locker.unlock_everything(token);
/// locker.unlock_everything(token);
/// ```
///
/// Dropping a token without an unlock call also releases its locks.
#[must_use = "dropping a lock token releases its locks immediately"]
pub struct LockToken {
    locker: LockerId,
    kind: OperationKind,
    held: Held,
}

impl LockToken {
    pub(crate) fn new(locker: LockerId, kind: OperationKind, held: Held) -> Self {
        Self { locker, kind, held }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn issued_by(&self) -> LockerId {
        self.locker
    }

    /// Per-node locks held by this token, deepest first.
    ///
    /// Empty for whole-tree tokens and for every token of the trivial locker.
    pub fn locked_entries(&self) -> Vec<(ResourceKey, LockMode)> {
        match &self.held {
            Held::Path { nodes, .. } => nodes
                .iter()
                .map(|n| (n.key().clone(), n.mode()))
                .collect(),
            Held::Monitor { .. } | Held::Everything { .. } => Vec::new(),
        }
    }

    /// Consume the token on behalf of `locker`'s `unlock_<expected>` call.
    ///
    /// # Panics
    ///
    /// Panics if the token was issued by another locker or for another
    /// operation class. The locks are still released while unwinding.
    pub(crate) fn release(self, locker: LockerId, expected: OperationKind) {
        if self.locker != locker {
            panic!(
                "lock token issued by {} released through {}",
                self.locker, locker
            );
        }
        if self.kind != expected {
            panic!(
                "{} lock token released through unlock_{}",
                self.kind, expected
            );
        }
        drop(self);
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if let Held::Path { nodes, .. } = &mut self.held {
            // Root-most read locks first, then the two write locks. The
            // shared stamp goes last, with the remaining fields.
            while let Some(node) = nodes.pop() {
                drop(node);
            }
        }
        trace!(locker = %self.locker, kind = %self.kind, "released lock token");
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockToken")
            .field("locker", &self.locker)
            .field("kind", &self.kind)
            .field("entries", &self.locked_entries())
            .finish()
    }
}
