//! In-memory resource tree for tests, stress runs, and ephemeral use.
//!
//! [`InMemoryResourceTree`] keeps every record and name binding in
//! `HashMap`s behind a single `RwLock`. It implements [`ResourceStore`] and
//! doubles as the [`TreePathResolver`] the path locker walks.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use arbor_lock::TreePathResolver;
use arbor_types::ResourceId;
use tracing::warn;

use crate::error::{TreeError, TreeResult};
use crate::resource::Resource;
use crate::traits::ResourceStore;

#[derive(Debug, Default)]
struct TreeState {
    resources: HashMap<ResourceId, Resource>,
    names: HashMap<(ResourceId, String), ResourceId>,
}

/// An in-memory implementation of [`ResourceStore`].
///
/// Data is lost when the tree is dropped.
#[derive(Debug)]
pub struct InMemoryResourceTree {
    root: ResourceId,
    state: RwLock<TreeState>,
}

impl InMemoryResourceTree {
    /// Create a tree holding only a root named `root_name`.
    pub fn new(root_name: &str) -> Self {
        Self::with_root(ResourceId::generate(), root_name)
    }

    /// Create a tree whose root has a caller-chosen id.
    pub fn with_root(root: ResourceId, root_name: &str) -> Self {
        let mut state = TreeState::default();
        state
            .resources
            .insert(root.clone(), Resource::root(root.clone(), root_name));
        Self {
            root,
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> TreeResult<RwLockReadGuard<'_, TreeState>> {
        self.state
            .read()
            .map_err(|e| TreeError::Storage(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> TreeResult<RwLockWriteGuard<'_, TreeState>> {
        self.state
            .write()
            .map_err(|e| TreeError::Storage(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryResourceTree {
    fn default() -> Self {
        Self::new("root")
    }
}

impl ResourceStore for InMemoryResourceTree {
    fn root_id(&self) -> &ResourceId {
        &self.root
    }

    fn get(&self, id: &ResourceId) -> TreeResult<Option<Resource>> {
        Ok(self.read()?.resources.get(id).cloned())
    }

    fn put(&self, resource: Resource) -> TreeResult<()> {
        self.write()?.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    fn modify(&self, id: &ResourceId, patch: &mut dyn FnMut(&mut Resource)) -> TreeResult<bool> {
        let mut state = self.write()?;
        match state.resources.get_mut(id) {
            Some(resource) => {
                patch(resource);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, id: &ResourceId) -> TreeResult<Option<Resource>> {
        if *id == self.root {
            return Err(TreeError::RootImmutable);
        }
        Ok(self.write()?.resources.remove(id))
    }

    fn child_named(&self, parent: &ResourceId, name: &str) -> TreeResult<Option<ResourceId>> {
        let state = self.read()?;
        Ok(state.names.get(&(parent.clone(), name.to_string())).cloned())
    }

    fn bind_name(&self, parent: &ResourceId, name: &str, child: &ResourceId) -> TreeResult<()> {
        let mut state = self.write()?;
        let slot = (parent.clone(), name.to_string());
        if state.names.contains_key(&slot) {
            return Err(TreeError::NameConflict {
                parent: parent.clone(),
                name: name.to_string(),
            });
        }
        state.names.insert(slot, child.clone());
        Ok(())
    }

    fn unbind_name(&self, parent: &ResourceId, name: &str) -> TreeResult<()> {
        self.write()?
            .names
            .remove(&(parent.clone(), name.to_string()));
        Ok(())
    }

    fn ids(&self) -> TreeResult<Vec<ResourceId>> {
        Ok(self.read()?.resources.keys().cloned().collect())
    }

    fn reset(&self) -> TreeResult<usize> {
        let mut state = self.write()?;
        let before = state.resources.len();
        let root = self.root.clone();
        state.resources.retain(|id, _| *id == root);
        state.names.clear();
        if let Some(r) = state.resources.get_mut(&root) {
            r.oldest_child = None;
            r.latest_child = None;
            r.child_count = 0;
        }
        Ok(before - state.resources.len())
    }

    fn len(&self) -> TreeResult<usize> {
        Ok(self.read()?.resources.len())
    }

    /// Walks the parent links under one read lock, so the chain is a
    /// consistent snapshot.
    fn ancestor_chain(&self, id: &ResourceId) -> TreeResult<Option<Vec<ResourceId>>> {
        let state = self.read()?;
        let mut chain = Vec::new();
        let mut cur = Some(id.clone());
        while let Some(next) = cur {
            let Some(resource) = state.resources.get(&next) else {
                return Ok(None);
            };
            if chain.len() > state.resources.len() {
                return Err(TreeError::Integrity {
                    id: id.clone(),
                    reason: "parent links form a cycle".into(),
                });
            }
            cur = resource.parent.clone();
            chain.push(next);
        }
        Ok(Some(chain))
    }
}

impl TreePathResolver for InMemoryResourceTree {
    fn resolve_ancestor_chain(&self, node: &ResourceId) -> Option<Vec<ResourceId>> {
        match self.ancestor_chain(node) {
            Ok(chain) => chain,
            Err(e) => {
                warn!(node = %node, error = %e, "ancestor chain unavailable");
                None
            }
        }
    }
}
