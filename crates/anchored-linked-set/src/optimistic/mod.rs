#![expect(unsafe_code, reason = "dereference nodes which an epoch guard keeps alive")]

mod node;
mod retired;


use std::{ptr::NonNull, sync::atomic::Ordering};
use std::fmt::{Debug, Formatter, Result as FmtResult};

use crossbeam_epoch::Guard;
use tracing::Level;

use crate::{error::InvariantViolation, interface::ConcurrentSortedSet};
use crate::maybe_loom::{lock, AtomicUsize, MutexGuard};
use self::node::{Found, Links, Node, Window};
use self::retired::RetiredNodes;


/// A sorted set which traverses without locks, and locks only the two nodes around the point it
/// intends to read or modify (optimistic, or "lazy", synchronization).
///
/// Each operation walks the chain unlocked, locks the `(pred, curr)` pair it ended on, and then
/// validates that neither node has been removed and that `pred` still links to `curr`. If
/// validation fails, both locks are released and the operation restarts from the sentinel. There
/// is no bound on the number of restarts; under adversarial scheduling, an operation may starve.
///
/// Removal is two-phase: the node is first marked as removed, which every validation observes,
/// and only then unlinked. Unlocked traversals may still be walking through an unlinked node, so
/// it is handed to an epoch-based collector owned by the set, which frees it once every operation
/// that could have seen it has finished. This happens as a side effect of later operations, while
/// the set is shared. [`reclaim_retired`] frees whatever is still pending at once.
///
/// The [`ConcurrentSortedSet`] trait must be imported to use the set effectively.
///
/// [`reclaim_retired`]: OptimisticSet::reclaim_retired
pub struct OptimisticSet<K> {
    /// The sentinel. It has no key, sorts before every node, and is never removed.
    head:    Links<K>,
    len:     AtomicUsize,
    retired: RetiredNodes<K>,
}

// SAFETY:
// The set owns every node in its chain and every retired node, and hence the keys in them.
// Nothing in a node is tied to the thread which allocated it.
unsafe impl<K: Send> Send for OptimisticSet<K> {}
// SAFETY:
// Through `&Self`, keys are compared by reference from any thread (requiring `Sync`), and are
// moved in by `insert` and dropped by whichever thread frees a retired node (requiring `Send`).
// Links are atomics, written only under the lock of the node which owns them, and the collector
// is thread-safe.
unsafe impl<K: Send + Sync> Sync for OptimisticSet<K> {}

/// A validated window, with both of its locks held.
struct LockedWindow<'s, K> {
    window:      Window<'s, K>,
    _pred_guard: MutexGuard<'s, ()>,
    _curr_guard: Option<MutexGuard<'s, ()>>,
}

impl<K> OptimisticSet<K> {
    /// Dereference a node pointer read from one of this set's links.
    ///
    /// # Safety
    /// `guard` must have come from `self.retired.pin()`, and `ptr` must have been loaded while
    /// `guard` was pinned, from the sentinel of `self` or from the links of a node previously
    /// returned by this function for `self` and `guard`.
    #[inline]
    unsafe fn node<'g>(&'g self, ptr: NonNull<Node<K>>, _guard: &'g Guard) -> &'g Node<K> {
        // SAFETY:
        // Every node reachable from the sentinel, even transiently, was allocated by
        // `Node::alloc`. It was reachable from the chain while `guard` was pinned, so it is freed
        // neither by the collector before `guard` is dropped, nor through `&mut self` while `self`
        // is borrowed. The returned reference lives no longer than either.
        unsafe { ptr.as_ref() }
    }

    /// Best-effort walk of the chain without any locks, skipping nodes marked as removed.
    ///
    /// Memory-safe even under concurrent mutation, but not linearizable: a key may be reported
    /// even though it was removed while the walk was in progress, and vice versa.
    fn for_each_unlocked<F: FnMut(&K)>(&self, mut visit: F) {
        let guard = self.retired.pin();
        let mut link = self.head.load_next();

        while let Some(node_ptr) = link {
            // SAFETY: `node_ptr` was loaded from the sentinel or from a node returned here,
            // while `guard` was pinned.
            let node = unsafe { self.node(node_ptr, &guard) };
            if !node.links().is_removed() {
                visit(node.key());
            }
            link = node.links().load_next();
        }
    }

    /// The number of nodes which were unlinked by [`remove`] and have not yet been freed.
    ///
    /// Removed nodes are freed in the background by later operations, so this stays small even
    /// when the set is shared for its whole life.
    ///
    /// [`remove`]: ConcurrentSortedSet::remove
    #[must_use]
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Free every node unlinked by [`remove`] which is still pending, returning how many were
    /// freed.
    ///
    /// Exclusive access proves that no traversal is still looking at them.
    ///
    /// [`remove`]: ConcurrentSortedSet::remove
    pub fn reclaim_retired(&mut self) -> usize {
        self.retired.reclaim()
    }
}

impl<K: Ord> OptimisticSet<K> {
    /// Walk the chain without locks, stopping at the first node whose key is not strictly less
    /// than `key`.
    fn traverse<'g>(&'g self, key: &K, guard: &'g Guard) -> Window<'g, K> {
        let mut pred = &self.head;

        loop {
            let curr = pred.load_next().map(|ptr| Found {
                ptr,
                // SAFETY: `ptr` was loaded from the sentinel or from a node returned here, while
                // the caller's `guard` was pinned.
                node: unsafe { self.node(ptr, guard) },
            });

            match curr {
                Some(curr) if curr.node.key() < key => pred = curr.node.links(),
                _ => return Window { pred, curr },
            }
        }
    }

    /// Traverse, lock, and validate, repeating until a validated window is locked.
    ///
    /// Locks are taken in ascending key order: `pred` (the sentinel, or a node whose key is
    /// strictly less than `key`) before `curr` (whose key is not). Threads therefore cannot
    /// deadlock, even with duplicate keys in the chain.
    ///
    /// `guard` must have come from `self.retired.pin()`.
    fn lock_window<'g>(&'g self, key: &K, guard: &'g Guard) -> LockedWindow<'g, K> {
        loop {
            let window = self.traverse(key, guard);
            debug_assert!(
                window.curr.is_none_or(|curr| curr.node.key() >= key),
                "`curr` must not sort before the key, or the lock order would be violated",
            );

            let pred_guard = lock(window.pred.lock());
            let curr_guard = window.curr.map(|curr| lock(curr.node.links().lock()));

            if window.validate() {
                return LockedWindow {
                    window,
                    _pred_guard: pred_guard,
                    _curr_guard: curr_guard,
                };
            }

            drop(curr_guard);
            drop(pred_guard);
            tracing::event!(Level::TRACE, "optimistic window failed validation; restarting");
        }
    }
}

impl<K: Ord> ConcurrentSortedSet<K> for OptimisticSet<K> {
    #[inline]
    fn new() -> Self {
        Self {
            head:    Links::new(None),
            len:     AtomicUsize::new(0),
            retired: RetiredNodes::new(),
        }
    }

    fn insert(&self, key: K) {
        let guard = self.retired.pin();
        let locked = self.lock_window(&key, &guard);
        let Window { pred, curr } = locked.window;

        // Publishing the node with `Release` makes its key visible to unlocked readers.
        pred.store_next(Some(Node::alloc(key, curr.map(|curr| curr.ptr))));
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    fn remove(&self, key: &K) -> bool {
        let guard = self.retired.pin();
        let locked = self.lock_window(key, &guard);
        let Window { pred, curr } = locked.window;

        let Some(curr) = curr.filter(|curr| curr.node.key() == key) else {
            return false;
        };

        // Mark first, so that any thread which already reached `curr` fails validation.
        curr.node.links().mark_removed();
        pred.store_next(curr.node.links().load_next());
        self.len.fetch_sub(1, Ordering::Relaxed);

        // SAFETY:
        // `curr.ptr` came from `Node::alloc` and was just unlinked. Only the thread which marks
        // a node as removed retires it, and a marked node never passes validation again, so it is
        // retired exactly once. `guard` came from `self.retired.pin()`.
        unsafe { self.retired.retire(curr.ptr, &guard) };
        drop(locked);

        true
    }

    fn contains(&self, key: &K) -> bool {
        let guard = self.retired.pin();
        let locked = self.lock_window(key, &guard);

        locked.window.curr.is_some_and(|curr| {
            !curr.node.links().is_removed() && curr.node.key() == key
        })
    }

    #[inline]
    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// This walk takes no locks, and is not linearizable with respect to concurrent operations.
    /// See [`OptimisticSet`] for why it is nonetheless memory-safe.
    fn to_vec(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut keys = Vec::with_capacity(self.len());
        self.for_each_unlocked(|key| keys.push(key.clone()));
        keys
    }

    fn check_invariants(&mut self) -> Result<usize, InvariantViolation> {
        let expected = self.len.load(Ordering::Relaxed);
        let mut found = 0;
        let mut prev_key: Option<&K> = None;
        let mut link = self.head.load_next();

        while let Some(node_ptr) = link {
            if found == expected {
                return Err(InvariantViolation::LengthMismatch { expected, found: found + 1 });
            }

            // SAFETY:
            // We have exclusive access to the set, so nothing can unlink or free this node.
            let node = unsafe { node_ptr.as_ref() };

            if node.links().is_removed() {
                return Err(InvariantViolation::RemovedNodeLinked { position: found });
            }
            if prev_key.is_some_and(|prev_key| node.key() < prev_key) {
                return Err(InvariantViolation::OutOfOrder { position: found });
            }

            prev_key = Some(node.key());
            found += 1;
            link = node.links().load_next();
        }

        if found == expected {
            Ok(found)
        } else {
            Err(InvariantViolation::LengthMismatch { expected, found })
        }
    }
}

impl<K: Ord> Default for OptimisticSet<K> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for OptimisticSet<K> {
    fn drop(&mut self) {
        let mut link = self.head.load_next();

        while let Some(node_ptr) = link {
            // SAFETY:
            // We have exclusive access, so nothing else references the chain.
            link = unsafe { node_ptr.as_ref() }.links().load_next();
            // SAFETY:
            // Nodes in the chain have never been retired, so each is freed exactly once here,
            // after its successor link was read. Nothing else borrows `self`.
            unsafe { Node::free(node_ptr) };
        }
        // Retired nodes are freed when the collector in `self.retired` is dropped.
    }
}

impl<K: Debug> Debug for OptimisticSet<K> {
    /// Uses the same unlocked, best-effort walk as [`to_vec`].
    ///
    /// [`to_vec`]: ConcurrentSortedSet::to_vec
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut set = f.debug_set();
        self.for_each_unlocked(|key| {
            set.entry(key);
        });
        set.finish()
    }
}
