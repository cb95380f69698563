//! Expiry collection.
//!
//! Reads that find an expired resource report it as missing and push its id
//! onto the service's [`ExpiryQueue`]. A [`TtlCollector`] drains that queue
//! in epochs; each epoch deletes the queued subtrees while holding the
//! whole-tree lock.

use std::collections::HashSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arbor_types::ResourceId;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::TreeResult;
use crate::service::TreeService;
use crate::traits::ResourceStore;

/// Ids of expired resources waiting for collection.
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    pending: Mutex<HashSet<ResourceId>>,
}

impl ExpiryQueue {
    /// Queue `id`. Returns `false` if it was already queued.
    pub fn push(&self, id: ResourceId) -> bool {
        self.pending.lock().insert(id)
    }

    pub fn drain(&self) -> Vec<ResourceId> {
        self.pending.lock().drain().collect()
    }

    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// Outcome of one collection epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollectStats {
    /// Queued resources that were deleted.
    pub collected: usize,
    /// Records removed, descendants included.
    pub removed: usize,
    /// Queued resources already gone or no longer expired.
    pub skipped: usize,
    /// Queued resources whose removal failed. They are not re-queued; a
    /// later read of a still-expired one queues it again.
    pub failed: usize,
}

/// Deletes expired resources queued on a [`TreeService`].
pub struct TtlCollector<S> {
    service: Arc<TreeService<S>>,
}

impl<S: ResourceStore + 'static> TtlCollector<S> {
    pub fn new(service: Arc<TreeService<S>>) -> Self {
        Self { service }
    }

    /// Run one epoch now.
    pub fn collect(&self) -> TreeResult<CollectStats> {
        let pending = self.service.expiry_queue().drain();
        if pending.is_empty() {
            return Ok(CollectStats::default());
        }
        debug!(pending = pending.len(), "collection epoch starting");

        let now = Utc::now();
        let stats = self.service.with_everything_locked(|svc| {
            let mut stats = CollectStats::default();
            for id in &pending {
                let outcome = svc.store().get(id).and_then(|found| match found {
                    None => {
                        // Usually removed along with an expired ancestor.
                        warn!(resource = %id, "expired resource already removed");
                        Ok(None)
                    }
                    Some(r) if !r.is_expired(now) => Ok(None),
                    Some(_) => svc.delete_locked(id).map(Some),
                });
                match outcome {
                    Ok(Some(removed)) => {
                        stats.removed += removed;
                        stats.collected += 1;
                    }
                    Ok(None) => stats.skipped += 1,
                    Err(e) => {
                        warn!(resource = %id, error = %e, "could not remove expired resource");
                        stats.failed += 1;
                    }
                }
            }
            stats
        });

        info!(
            collected = stats.collected,
            removed = stats.removed,
            skipped = stats.skipped,
            failed = stats.failed,
            "collection epoch finished"
        );
        Ok(stats)
    }

    /// Run an epoch every `interval` on a background thread until the
    /// returned handle is stopped or dropped.
    pub fn spawn(self, interval: Duration) -> TreeResult<CollectorHandle> {
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("arbor-ttl".into())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = self.collect() {
                            error!(error = %e, "collection epoch failed");
                        }
                    }
                    _ => break,
                }
            })?;
        info!(interval_ms = interval.as_millis() as u64, "expiry collector started");
        Ok(CollectorHandle {
            stop: Some(stop),
            thread: Some(thread),
        })
    }
}

/// Handle to a running collector thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct CollectorHandle {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CollectorHandle {
    /// Stop the thread and wait for an epoch in progress to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("expiry collector thread panicked");
            }
        }
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
