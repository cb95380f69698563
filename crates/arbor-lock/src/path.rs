//! The fine-grained, path-scoped locker.
//!
//! A path-scoped acquisition runs in this order:
//!
//! 1. Take the [`GlobalCoordinationLock`] shared, for the whole operation.
//! 2. Resolve the ancestor chain of the target through the
//!    [`TreePathResolver`]. A missing node fails here, before any per-node
//!    lock is taken.
//! 3. For a create, put the proposed child's key in front of the chain.
//! 4. Write-lock the first two chain entries: the node (or new child) and
//!    its parent. Those are the only records whose structure a create,
//!    update, or delete changes.
//! 5. Read-lock every remaining ancestor up to the root. This keeps a
//!    subtree delete higher up from running underneath an operation in
//!    progress, since the delete write-locks the subtree's top node.
//!
//! Entries are locked deepest first. Release runs in the opposite order
//! (see [`LockToken`]).

use std::fmt;
use std::sync::Arc;

use arbor_types::{OperationKind, ResourceId, ResourceKey};
use tracing::{debug, trace};

use crate::coordination::GlobalCoordinationLock;
use crate::error::{LockError, LockResult};
use crate::registry::{HeldNode, LockRegistry};
use crate::token::{Held, LockToken, LockerId};
use crate::traits::{Locker, TreePathResolver};

/// Number of chain entries taken exclusively.
const WRITE_LOCKED_ENTRIES: usize = 2;

/// Locks the target node, its parent, and its ancestors.
///
/// Operations whose node/parent pairs are disjoint run concurrently.
/// Operations sharing a parent serialize on that parent's write lock.
/// [`Locker::lock_everything`] excludes all of them through the
/// coordination lock and touches no per-node lock.
pub struct PathLocker {
    id: LockerId,
    resolver: Arc<dyn TreePathResolver>,
    registry: LockRegistry,
    global: GlobalCoordinationLock,
}

impl PathLocker {
    /// # Panics
    ///
    /// Panics if `shard_count` is zero.
    pub fn new(resolver: Arc<dyn TreePathResolver>, shard_count: usize) -> Self {
        Self {
            id: LockerId::next(),
            resolver,
            registry: LockRegistry::new(shard_count),
            global: GlobalCoordinationLock::new(),
        }
    }

    pub fn id(&self) -> LockerId {
        self.id
    }

    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    pub fn coordination(&self) -> &GlobalCoordinationLock {
        &self.global
    }

    fn lock_path(
        &self,
        kind: OperationKind,
        node: &ResourceId,
        proposed_child: Option<&str>,
    ) -> LockResult<LockToken> {
        let stamp = self.global.shared();

        let chain = match self.resolver.resolve_ancestor_chain(node) {
            Some(chain) if !chain.is_empty() => chain,
            _ => {
                debug!(locker = %self.id, %kind, node = %node, "ancestor chain not resolved");
                return Err(LockError::NotFound { id: node.clone() });
            }
        };

        let mut keys = Vec::with_capacity(chain.len() + 1);
        if let Some(name) = proposed_child {
            keys.push(ResourceKey::proposed(name));
        }
        keys.extend(chain.into_iter().map(ResourceKey::Resource));

        let depth = keys.len();
        let nodes = self.acquire_chain(keys);
        trace!(locker = %self.id, %kind, node = %node, depth, "acquired path locks");

        Ok(LockToken::new(
            self.id,
            kind,
            Held::Path {
                nodes,
                _stamp: stamp,
            },
        ))
    }

    fn acquire_chain(&self, keys: Vec<ResourceKey>) -> Vec<HeldNode> {
        keys.into_iter()
            .enumerate()
            .map(|(i, key)| {
                let handle = self.registry.get_or_create(key);
                if i < WRITE_LOCKED_ENTRIES {
                    handle.write()
                } else {
                    handle.read()
                }
            })
            .collect()
    }
}

impl fmt::Debug for PathLocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathLocker")
            .field("id", &self.id)
            .field("registry", &self.registry)
            .field("coordination", &self.global)
            .finish()
    }
}

impl Locker for PathLocker {
    fn lock_everything(&self) -> LockToken {
        let stamp = self.global.exclusive();
        trace!(locker = %self.id, "acquired whole-tree lock");
        LockToken::new(
            self.id,
            OperationKind::Everything,
            Held::Everything { _stamp: stamp },
        )
    }

    fn lock_update(&self, node: &ResourceId) -> LockResult<LockToken> {
        self.lock_path(OperationKind::Update, node, None)
    }

    fn lock_delete(&self, node: &ResourceId) -> LockResult<LockToken> {
        self.lock_path(OperationKind::Delete, node, None)
    }

    fn lock_create(&self, parent: &ResourceId, name: &str) -> LockResult<LockToken> {
        self.lock_path(OperationKind::Create, parent, Some(name))
    }

    fn unlock_everything(&self, token: LockToken) {
        token.release(self.id, OperationKind::Everything);
    }

    fn unlock_update(&self, token: LockToken) {
        token.release(self.id, OperationKind::Update);
    }

    fn unlock_delete(&self, token: LockToken) {
        token.release(self.id, OperationKind::Delete);
    }

    fn unlock_create(&self, token: LockToken) {
        token.release(self.id, OperationKind::Create);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{id, ParentTable};
    use arbor_types::LockMode;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const BLOCKED: Duration = Duration::from_millis(150);
    const PROMPT: Duration = Duration::from_secs(5);

    fn res(s: &str) -> ResourceKey {
        ResourceKey::resource(&id(s))
    }

    /// R
    /// ├── A
    /// ├── B
    /// └── C
    ///     └── D
    ///         └── E
    fn sample_tree() -> Arc<ParentTable> {
        ParentTable::with(&[
            ("R", None),
            ("A", Some("R")),
            ("B", Some("R")),
            ("C", Some("R")),
            ("D", Some("C")),
            ("E", Some("D")),
        ])
    }

    fn locker_over(tree: Arc<ParentTable>) -> PathLocker {
        PathLocker::new(tree, 8)
    }

    // ---- Chain shape ----

    #[test]
    fn update_write_locks_node_and_parent_then_reads_ancestors() {
        let locker = locker_over(sample_tree());
        let token = locker.lock_update(&id("E")).unwrap();
        assert_eq!(
            token.locked_entries(),
            vec![
                (res("E"), LockMode::Exclusive),
                (res("D"), LockMode::Exclusive),
                (res("C"), LockMode::Shared),
                (res("R"), LockMode::Shared),
            ]
        );
        assert!(locker.coordination().is_held());
        assert!(!locker.coordination().is_held_exclusive());
        locker.unlock_update(token);
    }

    #[test]
    fn create_puts_proposed_child_first() {
        let locker = locker_over(sample_tree());
        let token = locker.lock_create(&id("A"), "child1").unwrap();
        assert_eq!(token.kind(), OperationKind::Create);
        assert_eq!(
            token.locked_entries(),
            vec![
                (ResourceKey::proposed("child1"), LockMode::Exclusive),
                (res("A"), LockMode::Exclusive),
                (res("R"), LockMode::Shared),
            ]
        );
        locker.unlock_create(token);
    }

    #[test]
    fn root_update_locks_only_the_root() {
        let locker = locker_over(sample_tree());
        let token = locker.lock_delete(&id("R")).unwrap();
        assert_eq!(token.locked_entries(), vec![(res("R"), LockMode::Exclusive)]);
        locker.unlock_delete(token);
    }

    #[test]
    fn everything_touches_no_node_locks() {
        let locker = locker_over(sample_tree());
        let token = locker.lock_everything();
        assert!(token.locked_entries().is_empty());
        assert!(locker.coordination().is_held_exclusive());
        assert_eq!(locker.registry().live_entries(), 0);
        locker.unlock_everything(token);
        assert!(!locker.coordination().is_held());
    }

    // ---- Failure and linearity ----

    #[test]
    fn missing_node_fails_before_locking() {
        let tree = sample_tree();
        let locker = locker_over(tree.clone());
        let err = locker.lock_update(&id("ghost")).unwrap_err();
        assert_eq!(err, LockError::NotFound { id: id("ghost") });
        assert_eq!(locker.registry().live_entries(), 0);
        assert!(!locker.coordination().is_held());

        tree.remove("A");
        assert!(matches!(
            locker.lock_create(&id("A"), "x"),
            Err(LockError::NotFound { .. })
        ));
        assert!(!locker.coordination().is_held());
    }

    #[test]
    fn release_leaves_nothing_held() {
        let locker = locker_over(sample_tree());
        let t1 = locker.lock_update(&id("E")).unwrap();
        let t2 = locker.lock_create(&id("A"), "n").unwrap();
        // {E, D, C, R} and {new:n, A, R}: the root is shared.
        assert_eq!(locker.registry().live_entries(), 6);
        locker.unlock_update(t1);
        locker.unlock_create(t2);
        assert_eq!(locker.registry().live_entries(), 0);
        assert!(!locker.coordination().is_held());
    }

    #[test]
    fn dropped_token_releases_its_locks() {
        let locker = locker_over(sample_tree());
        {
            let _token = locker.lock_delete(&id("D")).unwrap();
            assert_eq!(locker.registry().live_entries(), 3);
        }
        assert_eq!(locker.registry().live_entries(), 0);
        assert!(!locker.coordination().is_held());
    }

    #[test]
    #[should_panic(expected = "create lock token released through unlock_update")]
    fn wrong_unlock_panics() {
        let locker = locker_over(sample_tree());
        let token = locker.lock_create(&id("A"), "n").unwrap();
        locker.unlock_update(token);
    }

    #[test]
    #[should_panic(expected = "released through")]
    fn foreign_locker_panics() {
        let tree = sample_tree();
        let first = locker_over(tree.clone());
        let second = locker_over(tree);
        let token = first.lock_update(&id("A")).unwrap();
        second.unlock_update(token);
    }

    #[test]
    fn misuse_panic_still_releases() {
        let locker = locker_over(sample_tree());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let token = locker.lock_everything();
            locker.unlock_delete(token);
        }));
        assert!(result.is_err());
        assert!(!locker.coordination().is_held());
    }

    // ---- Blocking behaviour ----

    #[test]
    fn everything_excludes_path_operations() {
        let locker = locker_over(sample_tree());
        let everything = locker.lock_everything();
        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                let t = locker.lock_update(&id("E")).unwrap();
                tx.send(()).unwrap();
                locker.unlock_update(t);
            });
            assert!(rx.recv_timeout(BLOCKED).is_err());
            locker.unlock_everything(everything);
            rx.recv_timeout(PROMPT).unwrap();
        });
    }

    #[test]
    fn path_operation_excludes_everything() {
        let locker = locker_over(sample_tree());
        let update = locker.lock_update(&id("A")).unwrap();
        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                let t = locker.lock_everything();
                tx.send(()).unwrap();
                locker.unlock_everything(t);
            });
            assert!(rx.recv_timeout(BLOCKED).is_err());
            locker.unlock_update(update);
            rx.recv_timeout(PROMPT).unwrap();
        });
    }

    #[test]
    fn siblings_serialize_on_their_parent() {
        // A and B share R as parent, so both write-lock R.
        let locker = locker_over(sample_tree());
        let first = locker.lock_update(&id("A")).unwrap();
        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                let t = locker.lock_update(&id("B")).unwrap();
                tx.send(()).unwrap();
                locker.unlock_update(t);
            });
            assert!(rx.recv_timeout(BLOCKED).is_err());
            locker.unlock_update(first);
            rx.recv_timeout(PROMPT).unwrap();
        });
    }

    #[test]
    fn disjoint_pairs_run_concurrently() {
        // Write pairs (new:child1, A) and (E, D) share nothing; both only
        // read-lock higher up.
        let locker = locker_over(sample_tree());
        let gate = locker.lock_create(&id("A"), "child1").unwrap();
        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                let t = locker.lock_update(&id("E")).unwrap();
                locker.unlock_update(t);
                tx.send(()).unwrap();
            });
            rx.recv_timeout(PROMPT)
                .expect("disjoint update waited on the create");
            locker.unlock_create(gate);
        });
    }

    #[test]
    fn ancestor_write_blocks_descendant_operation() {
        // Deleting C write-locks C; an update of E read-locks C.
        let locker = locker_over(sample_tree());
        let delete = locker.lock_delete(&id("C")).unwrap();
        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                let t = locker.lock_update(&id("E")).unwrap();
                tx.send(()).unwrap();
                locker.unlock_update(t);
            });
            assert!(rx.recv_timeout(BLOCKED).is_err());
            locker.unlock_delete(delete);
            rx.recv_timeout(PROMPT).unwrap();
        });
    }

    #[test]
    fn same_name_creates_contend_across_parents() {
        let locker = locker_over(sample_tree());
        let first = locker.lock_create(&id("A"), "sensor").unwrap();
        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                let t = locker.lock_create(&id("E"), "sensor").unwrap();
                tx.send(()).unwrap();
                locker.unlock_create(t);
            });
            assert!(rx.recv_timeout(BLOCKED).is_err());
            locker.unlock_create(first);
            rx.recv_timeout(PROMPT).unwrap();
        });
    }

    // ---- Stress ----

    /// Builds a complete tree `depth` levels below the root with `fanout`
    /// children per node and returns it with every non-root id.
    fn synthetic_tree(depth: usize, fanout: usize) -> (Arc<ParentTable>, Vec<String>) {
        let tree = ParentTable::default();
        tree.insert("root", None);
        let mut frontier = vec!["root".to_string()];
        let mut all = Vec::new();
        for _ in 0..depth {
            let mut next = Vec::new();
            for parent in &frontier {
                for i in 0..fanout {
                    let child = format!("{parent}.{i}");
                    tree.insert(&child, Some(parent));
                    next.push(child);
                }
            }
            all.extend(next.iter().cloned());
            frontier = next;
        }
        (Arc::new(tree), all)
    }

    #[test]
    fn random_contention_terminates_with_exclusion_intact() {
        let (tree, mut nodes) = synthetic_tree(4, 3);
        nodes.push("root".to_string());
        let locker = locker_over(tree);

        let everything_active = AtomicBool::new(false);
        let path_active = AtomicUsize::new(0);
        // Set while some token holds the key exclusively.
        let write_busy: HashMap<ResourceKey, AtomicBool> = nodes
            .iter()
            .map(|n| res(n))
            .chain(std::iter::once(ResourceKey::proposed("fresh")))
            .map(|k| (k, AtomicBool::new(false)))
            .collect();

        let (done_tx, done_rx) = mpsc::channel();
        thread::scope(|s| {
            for t in 0..8u64 {
                let done_tx = done_tx.clone();
                let (locker, nodes, write_busy) = (&locker, &nodes, &write_busy);
                let (everything_active, path_active) = (&everything_active, &path_active);
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(0xA5B0 + t);
                    for _ in 0..400 {
                        let roll = rng.gen_range(0..100);
                        if roll < 5 {
                            let token = locker.lock_everything();
                            assert!(!everything_active.swap(true, Ordering::SeqCst));
                            assert_eq!(path_active.load(Ordering::SeqCst), 0);
                            thread::yield_now();
                            everything_active.store(false, Ordering::SeqCst);
                            locker.unlock_everything(token);
                            continue;
                        }

                        let node = id(&nodes[rng.gen_range(0..nodes.len())]);
                        let token = match roll % 3 {
                            0 => locker.lock_update(&node).unwrap(),
                            1 => locker.lock_delete(&node).unwrap(),
                            _ => locker.lock_create(&node, "fresh").unwrap(),
                        };
                        let written: Vec<ResourceKey> = token
                            .locked_entries()
                            .into_iter()
                            .filter(|(_, mode)| *mode == LockMode::Exclusive)
                            .map(|(key, _)| key)
                            .collect();
                        assert!(!written.is_empty() && written.len() <= 2);

                        path_active.fetch_add(1, Ordering::SeqCst);
                        assert!(!everything_active.load(Ordering::SeqCst));
                        for key in &written {
                            assert!(!write_busy[key].swap(true, Ordering::SeqCst));
                        }
                        thread::yield_now();
                        for key in &written {
                            write_busy[key].store(false, Ordering::SeqCst);
                        }
                        path_active.fetch_sub(1, Ordering::SeqCst);

                        match token.kind() {
                            OperationKind::Update => locker.unlock_update(token),
                            OperationKind::Delete => locker.unlock_delete(token),
                            _ => locker.unlock_create(token),
                        }
                    }
                    done_tx.send(()).unwrap();
                });
            }
            for _ in 0..8 {
                done_rx
                    .recv_timeout(Duration::from_secs(60))
                    .expect("stress run did not finish; possible deadlock");
            }
        });

        assert_eq!(locker.registry().live_entries(), 0);
        assert!(!locker.coordination().is_held());
    }
}
