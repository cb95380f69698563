//! A parent-link table standing in for storage in unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use arbor_types::ResourceId;
use parking_lot::RwLock;

use crate::traits::TreePathResolver;

pub(crate) fn id(s: &str) -> ResourceId {
    ResourceId::parse(s).unwrap()
}

#[derive(Default)]
pub(crate) struct ParentTable {
    parents: RwLock<HashMap<ResourceId, Option<ResourceId>>>,
}

impl ParentTable {
    /// Build from `(child, parent)` pairs; a `None` parent marks the root.
    pub(crate) fn with(links: &[(&str, Option<&str>)]) -> Arc<Self> {
        let table = Self::default();
        for (child, parent) in links {
            table.insert(child, *parent);
        }
        Arc::new(table)
    }

    pub(crate) fn insert(&self, child: &str, parent: Option<&str>) {
        self.parents.write().insert(id(child), parent.map(id));
    }

    pub(crate) fn remove(&self, child: &str) {
        self.parents.write().remove(&id(child));
    }
}

impl TreePathResolver for ParentTable {
    fn resolve_ancestor_chain(&self, node: &ResourceId) -> Option<Vec<ResourceId>> {
        let parents = self.parents.read();
        let mut chain = vec![node.clone()];
        let mut cur = parents.get(node)?.clone();
        while let Some(parent) = cur {
            cur = parents.get(&parent)?.clone();
            chain.push(parent);
        }
        Some(chain)
    }
}
