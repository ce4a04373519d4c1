#![expect(unsafe_code, reason = "dereference and free nodes under the lock-coupling discipline")]

mod node;


use std::{ptr::NonNull, sync::atomic::Ordering};
use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{error::InvariantViolation, interface::ConcurrentSortedSet};
use crate::maybe_loom::{lock, AtomicUsize, Mutex, MutexGuard};
use self::node::{Link, Node};


/// A sorted set in which every traversal uses hand-over-hand locking (lock coupling).
///
/// A thread walking the chain holds the lock of at most two adjacent nodes at a time: it locks the
/// next node before releasing the one behind it. Because the edge being traversed is always
/// protected, no thread ever observes a half-finished insertion or removal, and operations never
/// need to retry. Locks are always acquired from the sentinel towards the tail, so threads cannot
/// deadlock on each other.
///
/// The cost is that every operation, including [`contains`], serializes with every other
/// operation that passes over the same nodes.
///
/// Removed nodes are freed immediately. This is sound because no reference to a node ever leaves
/// the set: a thread can only reach a node through its predecessor's lock, which the remover holds
/// while unlinking and freeing it.
///
/// The [`ConcurrentSortedSet`] trait must be imported to use the set effectively.
///
/// [`contains`]: ConcurrentSortedSet::contains
pub struct HandOverHandSet<K> {
    /// The sentinel. It has no key, sorts before every node, and is never removed.
    head: Mutex<Link<K>>,
    len:  AtomicUsize,
}

// SAFETY:
// The set owns every node in its chain, and hence the keys in them; sending the set sends the
// keys. Nothing in a node is tied to the thread which allocated it.
unsafe impl<K: Send> Send for HandOverHandSet<K> {}
// SAFETY:
// Through `&Self`, keys are compared by reference from any thread (requiring `Sync`), and are
// moved in by `insert` and dropped by `remove` on arbitrary threads (requiring `Send`). All links
// are only accessed while holding the lock which guards them.
unsafe impl<K: Send + Sync> Sync for HandOverHandSet<K> {}

/// The position at which a key belongs, with the locks of both neighbors held.
struct Window<'s, K> {
    /// The link which would point at a node with the searched-for key. Belongs to the sentinel or
    /// to the last node whose key is strictly less than the searched-for key.
    pred: MutexGuard<'s, Link<K>>,
    /// The first node whose key is greater than or equal to the searched-for key, if any.
    curr: Option<LockedNode<'s, K>>,
}

struct LockedNode<'s, K> {
    /// Provenance for eventually freeing the node.
    ptr:   NonNull<Node<K>>,
    node:  &'s Node<K>,
    guard: MutexGuard<'s, Link<K>>,
}

impl<K> HandOverHandSet<K> {
    /// Run `visit` on each key, in ascending order, using the same lock coupling as every other
    /// operation.
    ///
    /// # Panics or Deadlocks
    /// `visit` is run while node locks are held. If it attempts to use this set, a deadlock (or,
    /// depending on the mutex implementation, a panic) may occur.
    fn for_each_locked<F: FnMut(&K)>(&self, mut visit: F) {
        let mut pred = lock(&self.head);

        while let Some(curr_ptr) = *pred {
            // SAFETY:
            // `curr_ptr` was read from a link whose lock we hold, so the node cannot have been
            // freed (see the invariants of `Node`). The reference is not used after `pred` is
            // released, except through the lock of the node itself, which is acquired first.
            let curr = unsafe { curr_ptr.as_ref() };
            let curr_guard = lock(curr.next());
            visit(curr.key());
            // Hand over: the old `pred` is released only now that `curr` is locked.
            pred = curr_guard;
        }
    }
}

impl<K: Ord> HandOverHandSet<K> {
    /// Walk from the sentinel with lock coupling, stopping at the first node whose key is not
    /// strictly less than `key`.
    fn find(&self, key: &K) -> Window<'_, K> {
        let mut pred = lock(&self.head);

        loop {
            let Some(curr_ptr) = *pred else {
                return Window { pred, curr: None };
            };

            // SAFETY:
            // `curr_ptr` was read from a link whose lock is held, so it cannot be freed until
            // that lock is released. Before releasing it, we lock `curr`, and from then on any
            // remover of `curr` would first need `curr`'s lock as well.
            let curr = unsafe { curr_ptr.as_ref() };
            // This is the only place where a node lock is acquired during an operation, and the
            // node locked is always the successor of the one already held. That fixes the lock
            // order to chain order.
            let curr_guard = lock(curr.next());

            if curr.key() < key {
                pred = curr_guard;
            } else {
                return Window {
                    pred,
                    curr: Some(LockedNode {
                        ptr:   curr_ptr,
                        node:  curr,
                        guard: curr_guard,
                    }),
                };
            }
        }
    }
}

impl<K: Ord> ConcurrentSortedSet<K> for HandOverHandSet<K> {
    #[inline]
    fn new() -> Self {
        Self {
            head: Mutex::new(None),
            len:  AtomicUsize::new(0),
        }
    }

    fn insert(&self, key: K) {
        let mut window = self.find(&key);
        let successor = window.curr.as_ref().map(|curr| curr.ptr);

        // The new node is unreachable until this store, which happens under `pred`'s lock.
        *window.pred = Some(Node::alloc(key, successor));
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    fn remove(&self, key: &K) -> bool {
        let Window { mut pred, curr } = self.find(key);

        let Some(curr) = curr else {
            return false;
        };
        if curr.node.key() != key {
            return false;
        }

        *pred = *curr.guard;
        self.len.fetch_sub(1, Ordering::Relaxed);

        let LockedNode { ptr, guard, .. } = curr;
        drop(guard);
        // SAFETY:
        // `ptr` came from `Node::alloc`. It was just unlinked from `pred`, whose lock we still
        // hold, so no other thread can reach it; the only thread that could have been waiting on
        // its lock would have needed `pred`'s lock first. Its own guard was dropped above.
        unsafe { Node::free(ptr) };
        drop(pred);

        true
    }

    fn contains(&self, key: &K) -> bool {
        let window = self.find(key);
        window.curr.is_some_and(|curr| curr.node.key() == key)
    }

    #[inline]
    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Each key is read while its node is locked, as part of a single forwards lock-coupled walk.
    /// Concurrent operations behind the walk are not reflected, and operations ahead of it are
    /// reflected only if they finish before the walk reaches them.
    fn to_vec(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut keys = Vec::with_capacity(self.len());
        self.for_each_locked(|key| keys.push(key.clone()));
        keys
    }

    fn check_invariants(&mut self) -> Result<usize, InvariantViolation> {
        let expected = self.len.load(Ordering::Relaxed);
        let mut found = 0;
        let mut prev_key: Option<&K> = None;
        let mut link = *lock(&self.head);

        while let Some(node_ptr) = link {
            if found == expected {
                return Err(InvariantViolation::LengthMismatch { expected, found: found + 1 });
            }

            // SAFETY:
            // We have exclusive access to the set, so nothing can unlink or free this node.
            let node = unsafe { node_ptr.as_ref() };

            if prev_key.is_some_and(|prev_key| node.key() < prev_key) {
                return Err(InvariantViolation::OutOfOrder { position: found });
            }

            prev_key = Some(node.key());
            found += 1;
            link = *lock(node.next());
        }

        if found == expected {
            Ok(found)
        } else {
            Err(InvariantViolation::LengthMismatch { expected, found })
        }
    }
}

impl<K: Ord> Default for HandOverHandSet<K> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for HandOverHandSet<K> {
    fn drop(&mut self) {
        let mut link = *lock(&self.head);

        while let Some(node_ptr) = link {
            // SAFETY:
            // We have exclusive access, so nothing else references the chain.
            link = *lock(unsafe { node_ptr.as_ref() }.next());
            // SAFETY:
            // Each node in the chain is freed exactly once, after its successor link is read,
            // and the chain is discarded along with `self`.
            unsafe { Node::free(node_ptr) };
        }
    }
}

impl<K: Debug> Debug for HandOverHandSet<K> {
    /// # Panics or Deadlocks
    /// Formatting takes node locks; it may deadlock if a `Debug` implementation of a key uses
    /// the set.
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut set = f.debug_set();
        self.for_each_locked(|key| {
            set.entry(key);
        });
        set.finish()
    }
}
