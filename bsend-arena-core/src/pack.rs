//! The packer seam: the only way this crate talks to a serialization
//! layer.
//!
//! The core consumes exactly a pack-size query and a pack-into-buffer
//! primitive, plus a predicate for the "already packed" sentinel
//! datatype that lets `submit` skip serialization and `memcpy` the
//! payload directly.

/// A datatype-aware serializer, as consumed by the submission path.
pub trait Packer {
    /// The datatype descriptor threaded through verbatim.
    type Datatype: Copy;
    /// Packer-originated fault type, propagated without transformation
    /// by [`crate::error::Error::Pack`].
    type Error;

    /// True if `datatype` is the sentinel "already packed" type: the
    /// payload is raw bytes to be copied verbatim rather than
    /// serialized.
    fn is_already_packed(&self, datatype: &Self::Datatype) -> bool;

    /// Returns the number of bytes packing `count` elements of
    /// `datatype` would occupy. For the already-packed sentinel,
    /// this is `count`.
    fn pack_size(&self, datatype: &Self::Datatype, count: usize) -> Result<usize, Self::Error>;

    /// Packs `count` elements of `datatype` from `src` into the `dst`
    /// buffer (capacity `dst_len` bytes), returning the number of bytes
    /// actually written.
    ///
    /// # Safety
    /// `src` must be valid to read as `count` elements of `datatype`.
    /// `dst` must be valid for writes of `dst_len` bytes and must not
    /// alias `src`.
    unsafe fn pack_into(
        &self,
        datatype: &Self::Datatype,
        count: usize,
        src: *const u8,
        dst: *mut u8,
        dst_len: usize,
    ) -> Result<usize, Self::Error>;
}
