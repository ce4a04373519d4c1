//! Concurrent sorted sets over a singly linked chain, synchronized with one lock per node.
//!
//! Two strategies are provided, behind the common [`ConcurrentSortedSet`] trait:
//!
//! - [`HandOverHandSet`] uses lock coupling: every traversal holds the locks of at most two
//!   adjacent nodes, so it never observes a torn link and never retries.
//! - [`OptimisticSet`] traverses without locks, then locks and validates only the two nodes around
//!   the point of interest, retrying from the start of the chain if validation fails. Removed
//!   nodes are first marked, then unlinked, and are freed by an epoch-based collector once no
//!   operation can still be looking at them.
//!
//! Neither set enforces key uniqueness; equal keys are stored side by side.

mod maybe_loom;

mod error;
mod interface;

mod hand_over_hand;
mod optimistic;


pub use self::{
    error::InvariantViolation,
    hand_over_hand::HandOverHandSet,
    interface::ConcurrentSortedSet,
    optimistic::OptimisticSet,
};
