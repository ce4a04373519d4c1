#![expect(unsafe_code, reason = "hand unlinked nodes to an epoch collector, which frees them later")]

use std::{marker::PhantomData, mem, ptr::NonNull};
use std::fmt::{Debug, Formatter, Result as FmtResult};
// Only a statistic; the collector does the synchronization which matters.
use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};

use crossbeam_epoch::{Collector, Guard};
use tracing::Level;

use super::node::Node;


/// Epoch-based reclamation of nodes which have been unlinked from a chain, but which unlocked
/// traversals may still be looking at.
///
/// Every operation on the owning set runs while pinned to the set's own [`Collector`]. A retired
/// node is freed by the collector once every operation which was pinned when the node was
/// unlinked has finished. Removed nodes are therefore freed while the set is still shared, as
/// later operations advance the epoch.
///
/// [`RetiredNodes::reclaim`] frees everything still pending at once, given exclusive access.
pub(super) struct RetiredNodes<K> {
    collector: Collector,
    /// Nodes retired but not yet freed.
    pending:   Arc<AtomicUsize>,
    _nodes:    PhantomData<NonNull<Node<K>>>,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl<K> RetiredNodes<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collector: Collector::new(),
            pending:   Arc::new(AtomicUsize::new(0)),
            _nodes:    PhantomData,
        }
    }

    /// Pin the current thread to this collector.
    ///
    /// No node which is reachable from the chain at any point while the returned guard is alive
    /// is freed before the guard is dropped.
    #[must_use]
    pub fn pin(&self) -> Guard {
        // The handle may be dropped right away; its registration lasts until the guard is dropped.
        self.collector.register().pin()
    }

    /// Hand an unlinked node over to the collector.
    ///
    /// # Safety
    /// `node` must have come from [`Node::alloc`], must already be unreachable from the chain
    /// (aside from through other unlinked nodes), and must not be retired or freed by anything
    /// else. `guard` must have come from [`RetiredNodes::pin`] on `self`.
    pub unsafe fn retire(&self, node: NonNull<Node<K>>, guard: &Guard) {
        self.pending.fetch_add(1, Ordering::Relaxed);

        let pending = Arc::clone(&self.pending);
        let free = move || {
            // SAFETY:
            // The collector runs this only after every thread which was pinned when `node` was
            // unlinked has unpinned, so nothing can still reach the node. It runs exactly once.
            unsafe { Node::free(node) };
            pending.fetch_sub(1, Ordering::Relaxed);
        };

        // SAFETY:
        // `free` may run on any thread pinned to this collector; sharing the owning set between
        // threads requires `K: Send`. It may also run when the collector is dropped, which happens
        // no later than the owning set, while any data borrowed by `K` is still alive.
        unsafe { guard.defer_unchecked(free) };
    }

    /// The number of retired nodes which have not been freed yet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Free every retired node which is still pending, returning how many were freed.
    ///
    /// Guards never outlive the operation which created them, so while `self` is exclusively
    /// borrowed, nothing is pinned to the collector. Dropping it runs every deferred free.
    pub fn reclaim(&mut self) -> usize {
        let before = self.len();
        drop(mem::replace(&mut self.collector, Collector::new()));
        let reclaimed = before - self.len();

        if reclaimed > 0 {
            tracing::event!(Level::DEBUG, "reclaimed {reclaimed} retired nodes");
        }
        reclaimed
    }
}

impl<K> Debug for RetiredNodes<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RetiredNodes")
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}
