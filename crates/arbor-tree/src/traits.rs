//! The [`ResourceStore`] trait defining the resource storage interface.
//!
//! Any backend implements this trait to hold the tree's records. The store
//! itself makes no ordering promises between records; [`crate::TreeService`]
//! gets those from the locker before it calls in.

use std::collections::HashSet;

use arbor_types::ResourceId;

use crate::error::TreeResult;
use crate::resource::Resource;

/// Storage backend for resource records and per-parent name bindings.
///
/// Each call is atomic with respect to the record it touches.
/// [`modify`](Self::modify) in particular applies its closure to the stored
/// record in place, so two callers patching different fields of one record
/// never lose each other's writes.
pub trait ResourceStore: Send + Sync {
    /// Id of the tree root. Fixed for the life of the store.
    fn root_id(&self) -> &ResourceId;

    /// Read a record. Returns `Ok(None)` if it does not exist.
    fn get(&self, id: &ResourceId) -> TreeResult<Option<Resource>>;

    /// Insert a new record or replace an existing one.
    fn put(&self, resource: Resource) -> TreeResult<()>;

    /// Apply `patch` to the stored record.
    ///
    /// Returns `Ok(false)` if the record does not exist.
    fn modify(&self, id: &ResourceId, patch: &mut dyn FnMut(&mut Resource)) -> TreeResult<bool>;

    /// Remove a record, returning it if it existed.
    fn remove(&self, id: &ResourceId) -> TreeResult<Option<Resource>>;

    /// Id of the child of `parent` bound to `name`, if any.
    fn child_named(&self, parent: &ResourceId, name: &str) -> TreeResult<Option<ResourceId>>;

    /// Bind `name` under `parent` to `child`.
    fn bind_name(&self, parent: &ResourceId, name: &str, child: &ResourceId) -> TreeResult<()>;

    /// Drop the binding of `name` under `parent`.
    fn unbind_name(&self, parent: &ResourceId, name: &str) -> TreeResult<()>;

    /// Ids of every stored record, root included.
    fn ids(&self) -> TreeResult<Vec<ResourceId>>;

    /// Remove every record but the root and reset the root's child
    /// bookkeeping. Returns the number of records removed.
    fn reset(&self) -> TreeResult<usize>;

    /// Number of stored records, root included.
    fn len(&self) -> TreeResult<usize> {
        Ok(self.ids()?.len())
    }

    /// The chain from `id` up to the root, `id` first.
    ///
    /// Returns `Ok(None)` if `id` or any ancestor is missing. Each record is
    /// read separately, so a concurrent delete can make the answer stale.
    fn ancestor_chain(&self, id: &ResourceId) -> TreeResult<Option<Vec<ResourceId>>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = Some(id.clone());
        while let Some(next) = cur {
            let Some(resource) = self.get(&next)? else {
                return Ok(None);
            };
            if !seen.insert(next.clone()) {
                return Err(crate::TreeError::Integrity {
                    id: id.clone(),
                    reason: "parent links form a cycle".into(),
                });
            }
            chain.push(next);
            cur = resource.parent;
        }
        Ok(Some(chain))
    }
}
