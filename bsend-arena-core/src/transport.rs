//! The transport seam: the only way this crate talks to a nonblocking
//! message-passing layer.
//!
//! The core never dispatches wire protocol itself. It consumes exactly
//! the primitives the submission and reclaim paths need: a nonblocking
//! send returning a request handle, progress and completion queries, a
//! blocking wait, a persistence predicate, and the reference-count pair
//! that lets the arena and a caller share a handle safely.

/// A nonblocking message-passing transport, as consumed by the
/// submission and reclaim paths.
///
/// Implementors are expected to be safe to call with the arena's
/// internal lock held (§5 of the design): `isend`, `progress`, `wait`,
/// and friends must not attempt to re-enter the same arena.
pub trait Transport {
    /// Opaque handle to an outstanding (or completed) nonblocking
    /// operation. Cloning a handle does not imply a fresh reference —
    /// reference counting is explicit via [`add_ref`](Transport::add_ref)
    /// / [`release`](Transport::release).
    type Request: Clone;
    /// Destination descriptor threaded through verbatim (a communicator,
    /// in MPI terms).
    type Comm;
    /// Transport-originated fault type, propagated without
    /// transformation by [`crate::error::Error::Transport`].
    type Error;

    /// Posts a nonblocking send of `len` bytes starting at `buf` to
    /// `dest` tagged `tag` on `comm`. Returns the request handle on
    /// success.
    ///
    /// # Safety
    /// `buf` must be valid for reads of `len` bytes for the duration of
    /// the call.
    unsafe fn isend(
        &self,
        buf: *const u8,
        len: usize,
        dest: i32,
        tag: i32,
        comm: &Self::Comm,
    ) -> Result<Self::Request, Self::Error>;

    /// Drives transport progress once, non-blocking. May advance the
    /// completion state of any outstanding request.
    fn progress(&self) -> Result<(), Self::Error>;

    /// True if `req`'s operation has completed.
    fn is_complete(&self, req: &Self::Request) -> bool;

    /// Blocks until `req`'s operation completes.
    fn wait(&self, req: &Self::Request) -> Result<(), Self::Error>;

    /// True if `req` is a persistent request (its owner may restart it,
    /// so the arena must not release its own reference on completion).
    fn is_persistent(&self, req: &Self::Request) -> bool;

    /// Registers an additional logical reference to `req`.
    fn add_ref(&self, req: &Self::Request);

    /// Releases one logical reference to `req`.
    fn release(&self, req: &Self::Request);
}
