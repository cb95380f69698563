//! Sharded registry of per-node reader/writer locks.
//!
//! [`LockRegistry`] maps a [`ResourceKey`] to the lock object guarding that
//! tree position. Lock objects are created lazily on first lookup and live
//! only while some caller holds a [`NodeLockHandle`] for them, so the
//! registry's size tracks the number of nodes currently being locked rather
//! than the size of the tree.
//!
//! # Reclamation
//!
//! Each shard entry carries an explicit holder count. [`LockRegistry::get_or_create`]
//! increments it and dropping a [`NodeLockHandle`] decrements it, both under
//! the shard's mutex; the entry is removed when the count reaches zero. A
//! [`HeldNode`] releases its guard before its handle, so an entry is never
//! removed while its lock is still held.
//!
//! The shard mutex covers only this bookkeeping. Acquiring and releasing the
//! per-node lock happens outside it.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

use arbor_types::{LockMode, ResourceKey};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use tracing::debug;

/// The lock object guarding one tree position.
pub type NodeLock = RwLock<()>;

struct Entry {
    lock: Arc<NodeLock>,
    holders: usize,
}

type Shard = Mutex<HashMap<ResourceKey, Entry>>;

struct RegistryInner {
    shards: Box<[Shard]>,
    hasher: RandomState,
}

impl RegistryInner {
    fn shard_index(&self, key: &ResourceKey) -> usize {
        (self.hasher.hash_one(key) % self.shards.len() as u64) as usize
    }
}

/// Sharded, reference-counted cache of per-node locks.
///
/// Cloning a registry yields another handle to the same shards.
#[derive(Clone)]
pub struct LockRegistry {
    inner: Arc<RegistryInner>,
}

impl LockRegistry {
    /// Create a registry with `shard_count` independent shards.
    ///
    /// # Panics
    ///
    /// Panics if `shard_count` is zero. [`crate::LockerConfig::validate`]
    /// rejects that value before it reaches here.
    pub fn new(shard_count: usize) -> Self {
        assert!(shard_count > 0, "lock registry needs at least one shard");
        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            inner: Arc::new(RegistryInner {
                shards,
                hasher: RandomState::new(),
            }),
        }
    }

    /// Return the lock for `key`, creating it if no live entry exists.
    ///
    /// Every caller asking for the same key while any handle for it is alive
    /// receives the same lock object.
    pub fn get_or_create(&self, key: ResourceKey) -> NodeLockHandle {
        let shard = self.inner.shard_index(&key);
        let lock = {
            let mut map = self.inner.shards[shard].lock();
            let entry = map.entry(key.clone()).or_insert_with(|| Entry {
                lock: Arc::new(RwLock::new(())),
                holders: 0,
            });
            entry.holders += 1;
            Arc::clone(&entry.lock)
        };
        NodeLockHandle {
            registry: Arc::clone(&self.inner),
            shard,
            key,
            lock,
        }
    }

    /// Number of keys that currently have a live lock object.
    pub fn live_entries(&self) -> usize {
        self.inner.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }
}

impl fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("shard_count", &self.shard_count())
            .field("live_entries", &self.live_entries())
            .finish()
    }
}

/// A counted reference to one registry entry.
///
/// Keeps the entry alive until dropped. Call [`read`](Self::read) or
/// [`write`](Self::write) to actually acquire the lock.
pub struct NodeLockHandle {
    registry: Arc<RegistryInner>,
    shard: usize,
    key: ResourceKey,
    lock: Arc<NodeLock>,
}

impl NodeLockHandle {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Whether both handles refer to the same lock object.
    pub fn same_lock(&self, other: &NodeLockHandle) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }

    /// Block until the lock is held in shared mode.
    pub fn read(self) -> HeldNode {
        let guard = self.lock.read_arc();
        HeldNode {
            guard: NodeGuard::Shared(guard),
            handle: self,
        }
    }

    /// Block until the lock is held exclusively.
    pub fn write(self) -> HeldNode {
        let guard = self.lock.write_arc();
        HeldNode {
            guard: NodeGuard::Exclusive(guard),
            handle: self,
        }
    }

    /// Acquire in the given mode.
    pub fn acquire(self, mode: LockMode) -> HeldNode {
        match mode {
            LockMode::Shared => self.read(),
            LockMode::Exclusive => self.write(),
        }
    }
}

impl Drop for NodeLockHandle {
    fn drop(&mut self) {
        let mut map = self.registry.shards[self.shard].lock();
        let reclaim = match map.get_mut(&self.key) {
            Some(entry) => {
                entry.holders -= 1;
                entry.holders == 0
            }
            None => false,
        };
        if reclaim {
            map.remove(&self.key);
            debug!(key = %self.key, "reclaimed node lock");
        }
    }
}

impl fmt::Debug for NodeLockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeLockHandle")
            .field("key", &self.key)
            .field("shard", &self.shard)
            .finish()
    }
}

enum NodeGuard {
    Shared(ArcRwLockReadGuard<RawRwLock, ()>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// A per-node lock that is currently held.
///
/// Dropping it releases the lock and then the registry reference.
pub struct HeldNode {
    // Field order is drop order: the guard must go before the handle.
    guard: NodeGuard,
    handle: NodeLockHandle,
}

impl HeldNode {
    pub fn key(&self) -> &ResourceKey {
        self.handle.key()
    }

    pub fn mode(&self) -> LockMode {
        match self.guard {
            NodeGuard::Shared(_) => LockMode::Shared,
            NodeGuard::Exclusive(_) => LockMode::Exclusive,
        }
    }
}

impl fmt::Debug for HeldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeldNode")
            .field("key", self.key())
            .field("mode", &self.mode())
            .finish()
    }
}
