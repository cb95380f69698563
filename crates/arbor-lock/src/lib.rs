//! Hierarchical locking for the Arbor resource tree.
//!
//! Every create, update, and delete on the tree asks a [`Locker`] for a
//! [`LockToken`] before touching storage and hands the token back when it is
//! done. Two lockers are provided and are interchangeable behind
//! [`TreeLocker`]:
//!
//! - [`TrivialLocker`] serializes every operation behind one mutex.
//! - [`PathLocker`] write-locks the target node and its parent, read-locks
//!   the remaining ancestors up to the root, and holds a process-wide
//!   coordination lock in shared mode so that whole-tree operations can
//!   exclude all path-scoped ones.
//!
//! # Lock ordering
//!
//! All acquisitions take the [`GlobalCoordinationLock`] first and then walk
//! the ancestor chain from the deepest entry toward the root. Node depth
//! never changes, so every caller agrees on one total order and no cycle of
//! waiters can form.
//!
//! # Modules
//!
//! - [`error`]: [`LockError`] and [`ConfigError`]
//! - [`config`]: [`LockerConfig`], loaded from TOML
//! - [`registry`]: [`LockRegistry`], the sharded per-node lock cache
//! - [`coordination`]: [`GlobalCoordinationLock`]
//! - [`token`]: [`LockToken`] and the guards it owns
//! - [`traits`]: the [`Locker`] and [`TreePathResolver`] seams
//! - [`trivial`], [`path`], [`locker`]: the implementations

pub mod config;
pub mod coordination;
pub mod error;
pub mod locker;
pub mod path;
pub mod registry;
pub mod token;
pub mod traits;
pub mod trivial;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{LockStrategy, LockerConfig, DEFAULT_SHARD_COUNT};
pub use coordination::GlobalCoordinationLock;
pub use error::{ConfigError, LockError, LockResult};
pub use locker::TreeLocker;
pub use path::PathLocker;
pub use registry::{HeldNode, LockRegistry, NodeLockHandle};
pub use token::{LockToken, LockerId};
pub use traits::{Locker, TreePathResolver};
pub use trivial::TrivialLocker;
