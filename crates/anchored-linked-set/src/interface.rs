use crate::error::InvariantViolation;


/// A set of ordered keys which may be read and mutated from many threads at once, through a
/// shared reference.
///
/// Despite the name, implementations in this crate do not enforce uniqueness: inserting a key
/// which compares equal to a member adds a second, adjacent member. Callers which need set
/// semantics should check [`contains`] first, under their own synchronization if necessary.
///
/// Every implementation is linearizable with respect to [`insert`], [`remove`], and
/// [`contains`]. None of them are lock-free; a thread may block on per-node locks, and (depending
/// on the implementation) may retry an operation any number of times under contention.
///
/// [`insert`]: ConcurrentSortedSet::insert
/// [`remove`]: ConcurrentSortedSet::remove
/// [`contains`]: ConcurrentSortedSet::contains
pub trait ConcurrentSortedSet<K: Ord>: Sized {
    /// Create an empty set.
    #[must_use]
    fn new() -> Self;

    /// Insert `key` at its sorted position.
    ///
    /// This always succeeds, even if an equal key is already present.
    fn insert(&self, key: K);

    /// Remove one member which compares equal to `key`.
    ///
    /// Returns `false` if there was no such member.
    fn remove(&self, key: &K) -> bool;

    /// Check whether a member comparing equal to `key` is present.
    #[must_use]
    fn contains(&self, key: &K) -> bool;

    /// The number of members, including duplicates.
    ///
    /// This is exact whenever no operation is in progress. While other threads are inserting or
    /// removing keys, the value may lag behind the chain itself.
    #[must_use]
    fn len(&self) -> usize;

    /// Equivalent to `self.len() == 0`.
    #[inline]
    #[must_use]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the members in ascending order.
    ///
    /// How consistent the copy is with concurrent mutation depends on the implementation; when no
    /// operation is in progress, it is exactly the contents of the set.
    #[must_use]
    fn to_vec(&self) -> Vec<K>
    where
        K: Clone;

    /// Walk the whole chain and confirm that its structural invariants hold, returning the number
    /// of members.
    ///
    /// Exclusive access guarantees that no operation is in progress, so this audit sees a
    /// quiescent state.
    fn check_invariants(&mut self) -> Result<usize, InvariantViolation>;
}
