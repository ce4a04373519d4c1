use thiserror::Error;


/// A broken structural invariant, found by a set's `check_invariants` audit.
///
/// The locking discipline of both sets is meant to make every variant of this error
/// unreachable; seeing one indicates a synchronization bug (or an `Ord` implementation which is
/// not a total order).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvariantViolation {
    /// The key at `position` (counting from the first node after the sentinel) compares strictly
    /// less than the key of the node before it.
    #[error("the key at position {position} sorts before the key preceding it")]
    OutOfOrder { position: usize },
    /// The node at `position` is logically removed, yet still reachable from the sentinel
    /// at a point where no operation is in progress.
    #[error("the node at position {position} is marked as removed but is still linked")]
    RemovedNodeLinked { position: usize },
    /// The number of reachable nodes differs from the set's length counter.
    ///
    /// The audit stops walking one node past `expected`, so a cycle in the chain is reported as
    /// `found == expected + 1`.
    #[error("the set counted {expected} members, but its chain holds {found} nodes")]
    LengthMismatch { expected: usize, found: usize },
}
