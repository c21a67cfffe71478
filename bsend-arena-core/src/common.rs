//! Indirection over the mutex implementation, so the rest of the crate
//! does not need to care whether it is built against `std` or a bare
//! `alloc` + `spin` no_std target.
//!
//! Keeping this swap behind one internal module avoids scattering `cfg`
//! attributes through the allocator logic itself.

#[cfg(feature = "std")]
pub(crate) use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(not(feature = "std"))]
pub(crate) use std::sync::Arc;
#[cfg(not(feature = "std"))]
pub(crate) use spin::{Mutex, MutexGuard};

/// Locks `m`, recovering from poisoning rather than propagating the panic:
/// an allocator poisoned by an unrelated panic elsewhere in the caller's
/// code should still be usable for bookkeeping that does not depend on
/// whatever invariant the panicking thread broke.
#[cfg(feature = "std")]
#[inline]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(not(feature = "std"))]
#[inline]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock()
}
