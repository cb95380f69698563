//! The resource record.

use arbor_types::ResourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One node of the resource tree.
///
/// Children of a resource form a doubly linked list in creation order:
/// `oldest_child` is the head, `latest_child` the tail, and each child's
/// `prev_sibling`/`next_sibling` link it to its neighbours. The links of a
/// child belong to its parent's bookkeeping and change only while the
/// parent is write-locked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    /// `None` only for the root.
    pub parent: Option<ResourceId>,
    pub name: String,
    pub content: serde_json::Value,
    pub oldest_child: Option<ResourceId>,
    pub latest_child: Option<ResourceId>,
    pub prev_sibling: Option<ResourceId>,
    pub next_sibling: Option<ResourceId>,
    pub child_count: usize,
    /// After this instant the resource reads as absent and is queued for
    /// collection.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Resource {
    pub fn root(id: ResourceId, name: impl Into<String>) -> Self {
        Self::detached(id, None, name.into(), serde_json::Value::Null)
    }

    /// A new child of `parent`, not yet linked into the sibling list.
    pub fn child(
        id: ResourceId,
        parent: ResourceId,
        name: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self::detached(id, Some(parent), name.into(), content)
    }

    fn detached(
        id: ResourceId,
        parent: Option<ResourceId>,
        name: String,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id,
            parent,
            name,
            content,
            oldest_child: None,
            latest_child: None,
            prev_sibling: None,
            next_sibling: None,
            child_count: 0,
            expires_at: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
