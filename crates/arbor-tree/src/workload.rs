//! Random concurrent workload over a [`TreeService`].
//!
//! [`run_stress`] seeds a balanced tree, lets a pool of threads issue a
//! random mix of create, update, delete, and whole-tree requests against
//! it, then verifies the tree's bookkeeping. A run that returns at all has
//! shown the locker to be deadlock-free for that interleaving; the final
//! integrity check shows it also kept mutations from overlapping.

use std::time::Instant;

use arbor_lock::LockStrategy;
use arbor_types::ResourceId;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{TreeError, TreeResult};
use crate::service::TreeService;
use crate::traits::ResourceStore;

/// Shape of a stress run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressPlan {
    pub threads: usize,
    pub ops_per_thread: usize,
    /// Depth of the seeded tree below the root.
    pub depth: usize,
    /// Children per seeded node.
    pub fanout: usize,
    pub seed: u64,
    /// Share of requests, in percent, that lock the whole tree.
    pub everything_percent: u8,
}

impl Default for StressPlan {
    fn default() -> Self {
        Self {
            threads: 8,
            ops_per_thread: 1_000,
            depth: 3,
            fanout: 4,
            seed: 0x5eed,
            everything_percent: 1,
        }
    }
}

/// What a stress run did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StressReport {
    pub strategy: LockStrategy,
    pub seeded: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub everything: usize,
    /// Requests that found their target gone.
    pub not_found: usize,
    pub name_conflicts: usize,
    /// Records left after the run, root included.
    pub resources: usize,
    pub max_depth: usize,
    /// Per-node lock entries still registered after the run.
    pub live_lock_entries: usize,
    pub elapsed_ms: u64,
}

impl StressReport {
    pub fn total_ops(&self) -> usize {
        self.creates + self.updates + self.deletes + self.everything
    }

    fn absorb(&mut self, other: &StressReport) {
        self.creates += other.creates;
        self.updates += other.updates;
        self.deletes += other.deletes;
        self.everything += other.everything;
        self.not_found += other.not_found;
        self.name_conflicts += other.name_conflicts;
    }
}

enum Op {
    Create,
    Update,
    Delete,
}

/// Known ids with their depth. Deleted ids stay; requests on them count
/// as not-found.
type Pool = RwLock<Vec<(ResourceId, usize)>>;

/// Seed a tree under the service's root and hammer it from
/// `plan.threads` threads.
pub fn run_stress<S: ResourceStore>(
    service: &TreeService<S>,
    plan: &StressPlan,
) -> TreeResult<StressReport> {
    let started = Instant::now();
    let pool = Pool::default();
    let seeded = seed_tree(service, plan, &pool)?;
    info!(
        strategy = ?service.locker().strategy(),
        seeded,
        threads = plan.threads,
        ops_per_thread = plan.ops_per_thread,
        "stress run starting"
    );

    let tallies: Vec<TreeResult<StressReport>> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..plan.threads)
            .map(|t| {
                let pool = &pool;
                s.spawn(move || worker(service, plan, pool, t))
            })
            .collect();
        workers
            .into_iter()
            .map(|w| {
                w.join()
                    .unwrap_or_else(|_| Err(TreeError::Workload("worker thread panicked".into())))
            })
            .collect()
    });

    let mut report = StressReport {
        strategy: service.locker().strategy(),
        seeded,
        ..StressReport::default()
    };
    for tally in tallies {
        report.absorb(&tally?);
    }

    let integrity = service.verify_integrity()?;
    report.resources = integrity.resources;
    report.max_depth = integrity.max_depth;
    report.live_lock_entries = service.locker().live_entries();
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        ops = report.total_ops(),
        resources = report.resources,
        elapsed_ms = report.elapsed_ms,
        "stress run finished"
    );
    Ok(report)
}

fn seed_tree<S: ResourceStore>(
    service: &TreeService<S>,
    plan: &StressPlan,
    pool: &Pool,
) -> TreeResult<usize> {
    let mut level = vec![service.root_id().clone()];
    let mut all = vec![(service.root_id().clone(), 0)];
    for depth in 1..=plan.depth {
        let mut next = Vec::with_capacity(level.len() * plan.fanout);
        for parent in &level {
            for i in 0..plan.fanout {
                let created = service.create(parent, &format!("s{depth}-{i}"), json!({ "seeded": true }))?;
                all.push((created.id.clone(), depth));
                next.push(created.id);
            }
        }
        level = next;
    }
    let seeded = all.len() - 1;
    *pool.write() = all;
    Ok(seeded)
}

fn worker<S: ResourceStore>(
    service: &TreeService<S>,
    plan: &StressPlan,
    pool: &Pool,
    thread: usize,
) -> TreeResult<StressReport> {
    let mut rng = StdRng::seed_from_u64(plan.seed.wrapping_add(thread as u64));
    let max_depth = plan.depth + 2;
    let mut tally = StressReport::default();

    for _ in 0..plan.ops_per_thread {
        if rng.gen_range(0..100u8) < plan.everything_percent {
            service.with_everything_locked(|_| ());
            tally.everything += 1;
            continue;
        }

        let (target, depth) = {
            let pool = pool.read();
            pool[rng.gen_range(0..pool.len())].clone()
        };
        let op = match rng.gen_range(0..100u8) {
            0..=44 if depth < max_depth => Op::Create,
            _ if depth == 0 => Op::Update,
            0..=74 => Op::Update,
            _ => Op::Delete,
        };

        let outcome = match op {
            Op::Create => {
                tally.creates += 1;
                let name = format!("r{}", rng.gen_range(0..32u8));
                service
                    .create(&target, &name, json!({ "thread": thread }))
                    .map(|created| pool.write().push((created.id, depth + 1)))
            }
            Op::Update => {
                tally.updates += 1;
                service
                    .update(&target, json!({ "thread": thread, "n": tally.updates }))
                    .map(drop)
            }
            Op::Delete => {
                tally.deletes += 1;
                service.delete(&target).map(drop)
            }
        };

        match outcome {
            Ok(()) => {}
            Err(TreeError::NotFound(_)) => tally.not_found += 1,
            Err(TreeError::NameConflict { .. }) => tally.name_conflicts += 1,
            Err(e) => return Err(e),
        }
    }

    debug!(thread, ops = tally.total_ops(), "stress worker done");
    Ok(tally)
}
