//! The error type surfaced by every public operation in this crate.

use core::fmt;

/// Caller-visible back-pressure, the one fault kind the arena itself (as
/// opposed to the transport or packer collaborators) can produce:
/// buffer-already-attached and size-below-overhead on attach, no-arena-bound
/// and no-segment-large-enough on submit.
///
/// `available` is the arena's aligned size for "no segment large enough" or
/// "already attached" failures, or `0` when there is no arena bound at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferError {
    /// Bytes the caller asked for.
    pub requested: usize,
    /// Bytes available, per the diagnostic described above.
    pub available: usize,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no buffer space: requested {} bytes, {} bytes available",
            self.requested, self.available
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BufferError {}

/// Errors produced by the arena, generic over the transport's and packer's
/// own error types so their failures can be propagated verbatim instead of
/// being flattened into a string.
#[derive(Debug)]
pub enum Error<T, P> {
    /// Caller-visible back-pressure; see [`BufferError`].
    Buffer(BufferError),
    /// A fault reported by the [`Transport`](crate::transport::Transport)
    /// implementation, propagated without transformation.
    Transport(T),
    /// A fault reported by the [`Packer`](crate::pack::Packer)
    /// implementation, propagated without transformation.
    Pack(P),
}

impl<T, P> From<BufferError> for Error<T, P> {
    fn from(e: BufferError) -> Self {
        Error::Buffer(e)
    }
}

impl<T: fmt::Display, P: fmt::Display> fmt::Display for Error<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Buffer(e) => fmt::Display::fmt(e, f),
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Pack(e) => write!(f, "pack error: {e}"),
        }
    }
}

#[cfg(feature = "std")]
impl<T, P> std::error::Error for Error<T, P>
where
    T: fmt::Debug + fmt::Display,
    P: fmt::Debug + fmt::Display,
{
}
