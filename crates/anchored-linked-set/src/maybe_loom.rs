#[cfg(loom)]
pub(crate) use loom::sync::Mutex as Mutex;
#[cfg(loom)]
pub(crate) use loom::sync::MutexGuard as MutexGuard;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::AtomicBool as AtomicBool;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::AtomicPtr as AtomicPtr;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::AtomicUsize as AtomicUsize;

// `loom` takes priority over the `parking_lot` feature.
#[cfg(all(loom, feature = "parking_lot"))]
use parking_lot as _;

#[cfg(all(not(loom), feature = "parking_lot"))]
pub(crate) use parking_lot::Mutex as Mutex;
#[cfg(all(not(loom), feature = "parking_lot"))]
pub(crate) use parking_lot::MutexGuard as MutexGuard;

#[cfg(all(not(loom), not(feature = "parking_lot")))]
pub(crate) use std::sync::Mutex as Mutex;
#[cfg(all(not(loom), not(feature = "parking_lot")))]
pub(crate) use std::sync::MutexGuard as MutexGuard;

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::AtomicBool as AtomicBool;
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::AtomicPtr as AtomicPtr;
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::AtomicUsize as AtomicUsize;


/// Acquire `mutex`, blocking the current thread until it is available.
///
/// A node lock can only be poisoned by a panic in a user-provided `Ord` implementation, and
/// every comparison happens before any link is written. The guarded data is therefore never left
/// half-updated, and a poisoned lock is simply recovered.
#[cfg(any(loom, not(feature = "parking_lot")))]
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| {
        tracing::event!(tracing::Level::DEBUG, "recovered a node lock poisoned by a panic");
        poison.into_inner()
    })
}

/// Acquire `mutex`, blocking the current thread until it is available.
#[cfg(all(not(loom), feature = "parking_lot"))]
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock()
}
