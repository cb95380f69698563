//! Locked create, update, and delete over a [`ResourceStore`].
//!
//! Every mutation follows the same shape: take the token for its operation
//! class, re-read what it needs from storage, mutate, hand the token back.
//! The lock is taken before the existence checks because the locker only
//! guarantees that the nodes it returned stay put while the token is held;
//! a check made before that could be stale by the time the write lands.

use std::collections::VecDeque;
use std::sync::Arc;

use arbor_lock::{Locker, LockerConfig, TreeLocker, TreePathResolver};
use arbor_types::ResourceId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{TreeError, TreeResult};
use crate::resource::Resource;
use crate::traits::ResourceStore;
use crate::ttl::ExpiryQueue;

/// Result of a whole-tree consistency check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Records reachable from the root, root included.
    pub resources: usize,
    /// Depth of the deepest record; the root is at depth zero.
    pub max_depth: usize,
}

/// The tree's request handler.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct TreeService<S> {
    store: Arc<S>,
    locker: TreeLocker,
    expiry: ExpiryQueue,
}

impl<S> TreeService<S>
where
    S: ResourceStore + TreePathResolver + 'static,
{
    /// Build a service over `store`, which also resolves ancestor chains
    /// for the path locker.
    pub fn new(store: Arc<S>, config: &LockerConfig) -> TreeResult<Self> {
        let resolver: Arc<dyn TreePathResolver> = store.clone();
        let locker = TreeLocker::from_config(config, resolver)?;
        Ok(Self {
            store,
            locker,
            expiry: ExpiryQueue::default(),
        })
    }
}

impl<S: ResourceStore> TreeService<S> {
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn locker(&self) -> &TreeLocker {
        &self.locker
    }

    pub fn expiry_queue(&self) -> &ExpiryQueue {
        &self.expiry
    }

    pub fn root_id(&self) -> &ResourceId {
        self.store.root_id()
    }

    /// Create a child of `parent` named `name`, appended after its
    /// youngest sibling.
    pub fn create(
        &self,
        parent: &ResourceId,
        name: &str,
        content: serde_json::Value,
    ) -> TreeResult<Resource> {
        self.create_with_expiry(parent, name, content, None)
    }

    /// Like [`create`](Self::create), but the resource reads as absent
    /// from `expires_at` on and is then collected.
    pub fn create_expiring(
        &self,
        parent: &ResourceId,
        name: &str,
        content: serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> TreeResult<Resource> {
        self.create_with_expiry(parent, name, content, Some(expires_at))
    }

    fn create_with_expiry(
        &self,
        parent: &ResourceId,
        name: &str,
        content: serde_json::Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> TreeResult<Resource> {
        let token = self.locker.lock_create(parent, name)?;
        let result = self.create_locked(parent, name, content, expires_at);
        self.locker.unlock_create(token);
        if let Ok(created) = &result {
            debug!(parent = %parent, name, resource = %created.id, "created resource");
        }
        result
    }

    fn create_locked(
        &self,
        parent_id: &ResourceId,
        name: &str,
        content: serde_json::Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> TreeResult<Resource> {
        let parent = self.live(parent_id)?;
        if self.store.child_named(parent_id, name)?.is_some() {
            return Err(TreeError::NameConflict {
                parent: parent_id.clone(),
                name: name.to_string(),
            });
        }

        let mut child = Resource::child(ResourceId::generate(), parent_id.clone(), name, content);
        child.prev_sibling = parent.latest_child.clone();
        child.expires_at = expires_at;
        let child_id = child.id.clone();

        self.store.put(child.clone())?;
        if let Some(prev) = &parent.latest_child {
            self.patch(prev, |r| r.next_sibling = Some(child_id.clone()))?;
        }
        self.patch(parent_id, |r| {
            if r.oldest_child.is_none() {
                r.oldest_child = Some(child_id.clone());
            }
            r.latest_child = Some(child_id.clone());
            r.child_count += 1;
        })?;
        self.store.bind_name(parent_id, name, &child_id)?;
        Ok(child)
    }

    /// Read a resource. No lock is taken.
    ///
    /// An expired resource reads as [`TreeError::NotFound`] and is queued
    /// for the collector.
    pub fn retrieve(&self, id: &ResourceId) -> TreeResult<Resource> {
        self.live(id)
    }

    /// Replace a resource's content.
    pub fn update(&self, id: &ResourceId, content: serde_json::Value) -> TreeResult<Resource> {
        let token = self.locker.lock_update(id)?;
        let result = self.live(id).and_then(|_| {
            let mut content = Some(content);
            self.patch(id, |r| {
                if let Some(c) = content.take() {
                    r.content = c;
                }
            })?;
            self.live(id)
        });
        self.locker.unlock_update(token);
        if result.is_ok() {
            debug!(resource = %id, "updated resource");
        }
        result
    }

    /// Delete a resource and its whole subtree. Returns the number of
    /// records removed.
    pub fn delete(&self, id: &ResourceId) -> TreeResult<usize> {
        if id == self.store.root_id() {
            return Err(TreeError::RootImmutable);
        }
        let token = self.locker.lock_delete(id)?;
        let result = self.delete_locked(id);
        self.locker.unlock_delete(token);
        if let Ok(removed) = result {
            debug!(resource = %id, removed, "deleted subtree");
        }
        result
    }

    /// Delete with the caller already holding a delete or whole-tree token.
    pub(crate) fn delete_locked(&self, id: &ResourceId) -> TreeResult<usize> {
        let node = self
            .store
            .get(id)?
            .ok_or_else(|| TreeError::NotFound(id.clone()))?;
        let parent_id = node.parent.clone().ok_or(TreeError::RootImmutable)?;

        // Every record the unlink touches must exist before any is patched.
        let linked = [Some(&parent_id), node.prev_sibling.as_ref(), node.next_sibling.as_ref()];
        for other in linked.into_iter().flatten() {
            if self.store.get(other)?.is_none() {
                return Err(TreeError::Integrity {
                    id: id.clone(),
                    reason: format!("linked record {other} is missing"),
                });
            }
        }

        match &node.prev_sibling {
            Some(prev) => self.patch(prev, |r| r.next_sibling = node.next_sibling.clone())?,
            None => self.patch(&parent_id, |r| r.oldest_child = node.next_sibling.clone())?,
        }
        match &node.next_sibling {
            Some(next) => self.patch(next, |r| r.prev_sibling = node.prev_sibling.clone())?,
            None => self.patch(&parent_id, |r| r.latest_child = node.prev_sibling.clone())?,
        }
        self.patch(&parent_id, |r| r.child_count = r.child_count.saturating_sub(1))?;
        self.store.unbind_name(&parent_id, &node.name)?;

        // Descendants are reached through child lists; the top node's own
        // siblings stay.
        let mut removed = 0;
        let mut pending = vec![(id.clone(), false)];
        while let Some((cur, follow_sibling)) = pending.pop() {
            let Some(record) = self.store.remove(&cur)? else {
                continue;
            };
            removed += 1;
            if follow_sibling {
                if let Some(next) = record.next_sibling {
                    pending.push((next, true));
                }
                if let Some(parent) = &record.parent {
                    self.store.unbind_name(parent, &record.name)?;
                }
            }
            if let Some(child) = record.oldest_child {
                pending.push((child, true));
            }
        }
        Ok(removed)
    }

    /// Children of `id` in creation order.
    ///
    /// Walks the list under the node's update lock so no child can be
    /// linked or unlinked mid-walk.
    pub fn children(&self, id: &ResourceId) -> TreeResult<Vec<Resource>> {
        let token = self.locker.lock_update(id)?;
        let result = self.live(id).and_then(|node| {
            let mut out = Vec::with_capacity(node.child_count);
            let mut cur = node.oldest_child;
            while let Some(child_id) = cur {
                let child = self
                    .store
                    .get(&child_id)?
                    .ok_or_else(|| TreeError::Integrity {
                        id: id.clone(),
                        reason: format!("listed child {child_id} is missing"),
                    })?;
                cur = child.next_sibling.clone();
                out.push(child);
            }
            Ok(out)
        });
        self.locker.unlock_update(token);
        result
    }

    /// Run `f` while every other tree access is excluded.
    ///
    /// `f` must not call back into this service's locking methods
    /// (`create`, `update`, `delete`, `children`, `reinitialize`,
    /// `verify_integrity`, or this one). Each of them waits for the token
    /// `f` is running under, so the thread deadlocks with either locker.
    pub fn with_everything_locked<T>(&self, f: impl FnOnce(&Self) -> T) -> T {
        let token = self.locker.lock_everything();
        let out = f(self);
        self.locker.unlock_everything(token);
        out
    }

    /// Drop everything but the root. Returns the number of records removed.
    pub fn reinitialize(&self) -> TreeResult<usize> {
        self.with_everything_locked(|svc| {
            let removed = svc.store.reset()?;
            svc.expiry.clear();
            debug!(removed, "reinitialized tree");
            Ok(removed)
        })
    }

    /// Check every record's child and sibling bookkeeping under the
    /// whole-tree lock.
    pub fn verify_integrity(&self) -> TreeResult<IntegrityReport> {
        self.with_everything_locked(|svc| svc.verify_locked())
    }

    fn verify_locked(&self) -> TreeResult<IntegrityReport> {
        let stored = self.store.len()?;
        let root_id = self.store.root_id().clone();
        let broken = |id: &ResourceId, reason: String| TreeError::Integrity {
            id: id.clone(),
            reason,
        };

        let root = self
            .store
            .get(&root_id)?
            .ok_or_else(|| broken(&root_id, "root is missing".into()))?;
        if !root.is_root() {
            return Err(broken(&root_id, "root has a parent".into()));
        }

        let mut report = IntegrityReport::default();
        let mut queue = VecDeque::from([(root, 0usize)]);
        while let Some((node, depth)) = queue.pop_front() {
            report.resources += 1;
            report.max_depth = report.max_depth.max(depth);
            if report.resources > stored {
                return Err(broken(&node.id, "child lists form a cycle".into()));
            }

            let mut prev: Option<ResourceId> = None;
            let mut count = 0;
            let mut cur = node.oldest_child.clone();
            while let Some(child_id) = cur {
                let child = self
                    .store
                    .get(&child_id)?
                    .ok_or_else(|| broken(&node.id, format!("listed child {child_id} is missing")))?;
                if child.parent.as_ref() != Some(&node.id) {
                    return Err(broken(&child_id, format!("parent is not {}", node.id)));
                }
                if child.prev_sibling != prev {
                    return Err(broken(&child_id, "prev_sibling does not match list".into()));
                }
                if self.store.child_named(&node.id, &child.name)?.as_ref() != Some(&child_id) {
                    return Err(broken(&child_id, format!("name {:?} is not bound", child.name)));
                }
                count += 1;
                if count > stored {
                    return Err(broken(&node.id, "sibling list forms a cycle".into()));
                }
                prev = Some(child_id);
                cur = child.next_sibling.clone();
                queue.push_back((child, depth + 1));
            }
            if node.latest_child != prev {
                return Err(broken(&node.id, "latest_child does not match list".into()));
            }
            if node.child_count != count {
                return Err(broken(
                    &node.id,
                    format!("child_count {} but {count} listed", node.child_count),
                ));
            }
        }

        if report.resources != stored {
            return Err(broken(
                &root_id,
                format!("{} records unreachable from root", stored - report.resources),
            ));
        }
        Ok(report)
    }

    /// Read a record that exists and has not expired.
    fn live(&self, id: &ResourceId) -> TreeResult<Resource> {
        let resource = self
            .store
            .get(id)?
            .ok_or_else(|| TreeError::NotFound(id.clone()))?;
        if resource.is_expired(Utc::now()) {
            if self.expiry.push(id.clone()) {
                debug!(resource = %id, "queued expired resource");
            }
            return Err(TreeError::NotFound(id.clone()));
        }
        Ok(resource)
    }

    fn patch(&self, id: &ResourceId, mut f: impl FnMut(&mut Resource)) -> TreeResult<()> {
        if self.store.modify(id, &mut f)? {
            Ok(())
        } else {
            Err(TreeError::Integrity {
                id: id.clone(),
                reason: "linked record is missing".into(),
            })
        }
    }
}
