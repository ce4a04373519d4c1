#![expect(unsafe_code, reason = "nodes are heap-allocated and linked through raw pointers")]

use std::ptr::NonNull;

use crate::maybe_loom::Mutex;


/// A link to the next node in a chain, or `None` at the tail.
pub(super) type Link<K> = Option<NonNull<Node<K>>>;


/// # Invariants, which may be relied on by unsafe code:
/// - Every `Node` is allocated by [`Node::alloc`] and released at most once, by [`Node::free`].
/// - While linked, a node is referenced by exactly one link: the sentinel's, or that of the node
///   before it. The lock guarding that link must be held to read or write the link.
/// - A node is freed only after being unlinked, and only by the thread which unlinked it, while
///   that thread still holds the lock of the node's former predecessor. Since no other thread
///   can read the link without that lock, no other thread can reach the node.
#[derive(Debug)]
pub(super) struct Node<K> {
    key:  K,
    /// Guards the link to the successor. Locking this is how a thread "locks the node".
    next: Mutex<Link<K>>,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl<K> Node<K> {
    /// Allocate a node which is not yet linked into any chain.
    #[must_use]
    pub fn alloc(key: K, next: Link<K>) -> NonNull<Self> {
        NonNull::from(Box::leak(Box::new(Self {
            key,
            next: Mutex::new(next),
        })))
    }

    /// # Safety
    /// `node` must have come from [`Node::alloc`], must no longer be reachable from any link,
    /// and no reference to the node (including a guard of its lock) may be used afterwards.
    pub unsafe fn free(node: NonNull<Self>) {
        // SAFETY:
        // `node` was produced by `Box::leak` in `Node::alloc`, and by the caller's guarantee,
        // nothing else uses it after this point, so ownership may be reclaimed by a `Box`.
        drop(unsafe { Box::from_raw(node.as_ptr()) });
    }

    #[inline]
    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    #[must_use]
    pub const fn next(&self) -> &Mutex<Link<K>> {
        &self.next
    }
}
