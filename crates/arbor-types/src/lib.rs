//! Foundation types for Arbor.
//!
//! This crate provides the identifiers and small value types shared by the
//! locking subsystem and the resource tree built on top of it.
//!
//! # Key Types
//!
//! - [`ResourceId`]: Identifier of a committed node in the resource tree
//! - [`ResourceKey`]: Hashable lock key for a tree position (committed or proposed)
//! - [`LockMode`]: Shared or exclusive acquisition of a per-node lock
//! - [`OperationKind`]: The four classes of locker operation

pub mod error;
pub mod id;
pub mod key;

pub use error::TypeError;
pub use id::ResourceId;
pub use key::{LockMode, OperationKind, ResourceKey};
