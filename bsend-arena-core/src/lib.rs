#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]
#![deny(missing_docs)]

//! Lock-guarded, intrusive free-list allocator for buffered-send message
//! staging.
//!
//! A [`Arena`] wraps a flat, caller-owned byte buffer and carves
//! message-sized [`SegmentHeader`](segment::SegmentHeader) regions out of
//! it on demand. Freed regions coalesce with their address-adjacent
//! neighbors. The allocator is generic over two small trait seams,
//! [`Transport`] and [`Packer`], so it never needs to know about a
//! concrete wire protocol or datatype system.
//!
//! [`Transport`]: transport::Transport
//! [`Packer`]: pack::Packer

#[cfg(not(any(feature = "std", feature = "alloc")))]
compile_error!("`bsend-arena-core` requires either the 'std' or 'alloc' feature to be enabled");

#[cfg(not(feature = "std"))]
extern crate alloc as std;

#[cfg(feature = "std")]
extern crate std;

mod common;

#[cfg(test)]
mod tests;

pub mod arena;
pub mod bindings;
pub mod error;
pub mod pack;
pub mod segment;
pub mod submit;
pub mod transport;

pub use arena::{detach, finalize, Arena};
pub use bindings::{comm_finalize, resolve, session_finalize, ArenaSlot};
pub use error::{BufferError, Error};
pub use pack::Packer;
pub use segment::{overhead, MAX_ALIGNMENT, MIN_BUFFER_BLOCK};
pub use submit::{reclaim, submit};
pub use transport::Transport;
