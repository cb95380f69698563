//! Lock keys and lock vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::ResourceId;

/// Identifies one tree position for locking purposes.
///
/// A committed node is keyed by its [`ResourceId`]. A child that does not
/// exist yet is keyed by its proposed name alone, independent of the parent
/// it is being created under. Same-named creates under different parents
/// therefore contend on one lock; this over-locks but never under-locks.
///
/// The two variants never compare equal, so a proposed name can never alias
/// a committed id that happens to have the same spelling.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKey {
    Resource(ResourceId),
    ProposedName(String),
}

impl ResourceKey {
    pub fn resource(id: &ResourceId) -> Self {
        Self::Resource(id.clone())
    }

    pub fn proposed(name: impl Into<String>) -> Self {
        Self::ProposedName(name.into())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(id) => write!(f, "res:{id}"),
            Self::ProposedName(name) => write!(f, "new:{name}"),
        }
    }
}

/// How a per-node lock is held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// The operation class a lock token was issued for.
///
/// A token must be released through the unlock call of the same class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Everything,
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Everything => "everything",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}
