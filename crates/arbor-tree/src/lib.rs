//! The Arbor resource tree.
//!
//! Resources form a single rooted tree. Each resource keeps its parent id
//! and the bookkeeping for its own children: oldest and latest child
//! pointers plus a doubly linked sibling list. [`TreeService`] performs
//! every mutation under a lock token from [`arbor_lock::TreeLocker`], so
//! concurrent requests from independent front-ends never corrupt that
//! bookkeeping.
//!
//! # Modules
//!
//! - [`error`]: [`TreeError`]
//! - [`resource`]: the [`Resource`] record
//! - [`traits`]: the [`ResourceStore`] storage seam
//! - [`memory`]: [`InMemoryResourceTree`], also the path resolver
//! - [`service`]: [`TreeService`], the locked CRUD handler
//! - [`ttl`]: [`ExpiryQueue`] and the background [`TtlCollector`]
//! - [`workload`]: random concurrent workload used for stress runs

pub mod error;
pub mod memory;
pub mod resource;
pub mod service;
pub mod traits;
pub mod ttl;
pub mod workload;

pub use error::{TreeError, TreeResult};
pub use memory::InMemoryResourceTree;
pub use resource::Resource;
pub use service::{IntegrityReport, TreeService};
pub use traits::ResourceStore;
pub use ttl::{CollectStats, CollectorHandle, ExpiryQueue, TtlCollector};
pub use workload::{run_stress, StressPlan, StressReport};
