//! The [`Locker`] and [`TreePathResolver`] seams.

use arbor_types::ResourceId;

use crate::error::LockResult;
use crate::token::LockToken;

/// Acquire and release locks around tree operations.
///
/// Every acquire call blocks until all of its locks are held and then
/// returns a [`LockToken`]; there is no half-acquired state. The token must
/// be passed to the unlock call of the same class on the same locker.
/// Passing it anywhere else panics.
///
/// A thread must not request a second token while it still holds one: a
/// whole-tree request waiting behind another thread's path token would
/// block this thread's second request, and vice versa.
pub trait Locker: Send + Sync {
    /// Exclude every other tree access, path-scoped or whole-tree.
    fn lock_everything(&self) -> LockToken;

    /// Lock an existing node for mutation of itself and its parent's
    /// child bookkeeping.
    fn lock_update(&self, node: &ResourceId) -> LockResult<LockToken>;

    /// Lock an existing node for removal.
    fn lock_delete(&self, node: &ResourceId) -> LockResult<LockToken>;

    /// Lock `parent` for insertion of a child named `name`.
    fn lock_create(&self, parent: &ResourceId, name: &str) -> LockResult<LockToken>;

    fn unlock_everything(&self, token: LockToken);

    fn unlock_update(&self, token: LockToken);

    fn unlock_delete(&self, token: LockToken);

    fn unlock_create(&self, token: LockToken);
}

/// Point-in-time view of the tree's parent links, provided by storage.
pub trait TreePathResolver: Send + Sync {
    /// The chain from `node` up to the tree root: `node` first, then its
    /// parent, ending with the root. Returns `None` if `node` does not
    /// exist.
    ///
    /// The answer may be stale as soon as it is returned; callers only
    /// trust it once the returned nodes are locked.
    fn resolve_ancestor_chain(&self, node: &ResourceId) -> Option<Vec<ResourceId>>;
}
