#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]
#![deny(missing_docs)]

//! Thin front crate over [`bsend_arena_core`]: the heavy lifting lives in
//! the `-core` crate so it can be depended on without pulling in this
//! crate's feature defaults.

pub use bsend_arena_core::*;
