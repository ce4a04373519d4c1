#![expect(unsafe_code, reason = "nodes are heap-allocated and linked through raw pointers")]

use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering;

use crate::maybe_loom::{AtomicBool, AtomicPtr, Mutex};


/// A link to the next node in a chain, or `None` at the tail.
pub(super) type Link<K> = Option<NonNull<Node<K>>>;


/// The part of a node which other nodes' operations care about: its outgoing link, whether the
/// node has been logically removed, and the lock which guards changes to both.
///
/// The sentinel of a set is a bare `Links` value, which is never marked as removed.
///
/// # Invariants
/// - `next` and `removed` are only written while `lock` is held, though `next` may be read at
///   any time.
/// - Any node referenced by `next` was allocated by [`Node::alloc`], and is not freed while any
///   thread which could have loaded the reference is still pinned. See [`RetiredNodes`].
/// - Once `removed` is `true`, it never becomes `false` again.
///
/// [`RetiredNodes`]: super::retired::RetiredNodes
#[derive(Debug)]
pub(super) struct Links<K> {
    next:    AtomicPtr<Node<K>>,
    removed: AtomicBool,
    lock:    Mutex<()>,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl<K> Links<K> {
    #[must_use]
    pub fn new(next: Link<K>) -> Self {
        Self {
            next:    AtomicPtr::new(link_to_ptr(next)),
            removed: AtomicBool::new(false),
            lock:    Mutex::new(()),
        }
    }

    /// Read the successor without holding any lock.
    ///
    /// `Acquire` pairs with the `Release` in [`Links::store_next`], so that the key of a newly
    /// published node is visible to whoever finds it.
    #[inline]
    #[must_use]
    pub fn load_next(&self) -> Link<K> {
        NonNull::new(self.next.load(Ordering::Acquire))
    }

    /// The caller must hold `self.lock()`.
    #[inline]
    pub fn store_next(&self, next: Link<K>) {
        self.next.store(link_to_ptr(next), Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// The caller must hold `self.lock()`. Irreversible.
    #[inline]
    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub const fn lock(&self) -> &Mutex<()> {
        &self.lock
    }
}

#[inline]
fn link_to_ptr<K>(link: Link<K>) -> *mut Node<K> {
    link.map_or(ptr::null_mut(), NonNull::as_ptr)
}


#[derive(Debug)]
pub(super) struct Node<K> {
    links: Links<K>,
    /// Never changes after the node is published.
    key:   K,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl<K> Node<K> {
    /// Allocate a node which is not yet linked into any chain.
    #[must_use]
    pub fn alloc(key: K, next: Link<K>) -> NonNull<Self> {
        NonNull::from(Box::leak(Box::new(Self {
            links: Links::new(next),
            key,
        })))
    }

    /// # Safety
    /// `node` must have come from [`Node::alloc`], must not have been freed already, and no
    /// reference to the node may be used afterwards.
    pub unsafe fn free(node: NonNull<Self>) {
        // SAFETY:
        // `node` was produced by `Box::leak` in `Node::alloc`, and by the caller's guarantee,
        // nothing else uses it after this point.
        drop(unsafe { Box::from_raw(node.as_ptr()) });
    }

    #[inline]
    #[must_use]
    pub const fn links(&self) -> &Links<K> {
        &self.links
    }

    #[inline]
    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }
}


/// A node found by an unlocked traversal.
pub(super) struct Found<'s, K> {
    /// Provenance for eventually retiring the node.
    pub ptr:  NonNull<Node<K>>,
    pub node: &'s Node<K>,
}

impl<K> Clone for Found<'_, K> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Found<'_, K> {}

/// A `(pred, curr)` pair observed by an unlocked traversal. Nothing guarantees that the pair is
/// still adjacent, or still in the chain, until it is locked and [validated].
///
/// [validated]: Window::validate
pub(super) struct Window<'s, K> {
    /// The sentinel, or the last node seen whose key was strictly less than the searched-for key.
    pub pred: &'s Links<K>,
    /// The successor of `pred` when it was read, if any.
    pub curr: Option<Found<'s, K>>,
}

impl<K> Clone for Window<'_, K> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Window<'_, K> {}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl<K> Window<'_, K> {
    /// Check that the window still reflects the chain: neither node has been logically removed,
    /// and `pred` still links directly to `curr`.
    ///
    /// Meaningful only while the locks of `pred` and `curr` (if any) are held; after that, the
    /// answer may be stale.
    #[must_use]
    pub fn validate(&self) -> bool {
        let curr_ptr = self.curr.map(|curr| curr.ptr);

        !self.pred.is_removed()
            && !self.curr.is_some_and(|curr| curr.node.links().is_removed())
            && self.pred.load_next() == curr_ptr
    }
}


#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;


    fn found<'a>(ptr: NonNull<Node<u32>>) -> Found<'a, u32> {
        // SAFETY: the tests free every node only at their very end.
        Found { ptr, node: unsafe { ptr.as_ref() } }
    }

    #[test]
    fn adjacent_live_pair_is_valid() {
        let curr_ptr = Node::alloc(7, None);
        let pred = Links::new(Some(curr_ptr));

        assert!(Window { pred: &pred, curr: Some(found(curr_ptr)) }.validate());

        // SAFETY: `curr_ptr` is unused after this.
        unsafe { Node::free(curr_ptr) };
    }

    #[test]
    fn empty_tail_is_valid() {
        let pred = Links::<u32>::new(None);
        assert!(Window { pred: &pred, curr: None }.validate());
    }

    #[test]
    fn removed_pred_is_invalid() {
        let curr_ptr = Node::alloc(7, None);
        let pred = Links::new(Some(curr_ptr));
        pred.mark_removed();

        assert!(!Window { pred: &pred, curr: Some(found(curr_ptr)) }.validate());

        // SAFETY: `curr_ptr` is unused after this.
        unsafe { Node::free(curr_ptr) };
    }

    #[test]
    fn removed_curr_is_invalid() {
        let curr_ptr = Node::alloc(7, None);
        let pred = Links::new(Some(curr_ptr));
        found(curr_ptr).node.links().mark_removed();

        assert!(!Window { pred: &pred, curr: Some(found(curr_ptr)) }.validate());

        // SAFETY: `curr_ptr` is unused after this.
        unsafe { Node::free(curr_ptr) };
    }

    #[test]
    fn spliced_pair_is_invalid() {
        let far_ptr = Node::alloc(9, None);
        let curr_ptr = Node::alloc(7, Some(far_ptr));
        let pred = Links::new(Some(curr_ptr));

        // Something was inserted between `pred` and `curr` after the traversal saw them.
        let between_ptr = Node::alloc(5, Some(curr_ptr));
        pred.store_next(Some(between_ptr));
        assert!(!Window { pred: &pred, curr: Some(found(curr_ptr)) }.validate());

        // The tail moved on as well.
        assert!(!Window { pred: found(curr_ptr).node.links(), curr: None }.validate());

        // SAFETY: none of the nodes are used after this.
        unsafe {
            Node::free(between_ptr);
            Node::free(curr_ptr);
            Node::free(far_ptr);
        }
    }
}
