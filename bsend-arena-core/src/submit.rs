//! Submission and reclaim: the two operations that move segments between
//! the free and active lists while a send is outstanding.

use core::ptr;

use crate::{
    arena::{Arena, Inner},
    error::{BufferError, Error},
    pack::Packer,
    transport::Transport,
};

/// Packs `payload` (`count` elements of `datatype`) into a free segment of
/// `arena`, hands the packed bytes to `transport`'s nonblocking send, and
/// moves the segment onto the active list.
///
/// Runs the reclaim path once before searching for space, and once more
/// between the two allocation passes if the first finds nothing — the
/// two-pass design exists because a first failure to find space may just
/// mean completions have not been polled recently.
///
/// If `want_request` is set, bumps the returned request's reference count
/// so the caller may independently wait/test on it later.
///
/// Fails with [`Error::Buffer`] if no arena is attached or no free segment
/// is large enough, after both passes. Fails with [`Error::Pack`] /
/// [`Error::Transport`] if the packer or transport collaborator reports a
/// fault; in that case the arena's state is left exactly as it was before
/// the call.
///
/// # Safety
/// `payload` must be valid to read as `count` elements of `datatype`
/// (ignored, and treated as `count` raw bytes, when `datatype` is the
/// packer's already-packed sentinel).
#[allow(clippy::too_many_arguments)]
pub unsafe fn submit<T, P>(
    arena: &Arena<T::Request>,
    transport: &T,
    packer: &P,
    payload: *const u8,
    count: usize,
    datatype: &P::Datatype,
    dest: i32,
    tag: i32,
    comm: &T::Comm,
    want_request: bool,
) -> Result<Option<T::Request>, Error<T::Error, P::Error>>
where
    T: Transport,
    P: Packer,
{
    let already_packed = packer.is_already_packed(datatype);
    let pack_size = if already_packed {
        count
    } else {
        packer.pack_size(datatype, count).map_err(Error::Pack)?
    };

    let outcome = arena.with_inner(|inner| {
        // SAFETY: `submit` is itself unsafe on the same contract.
        unsafe {
            submit_locked(
                inner,
                transport,
                packer,
                payload,
                count,
                datatype,
                dest,
                tag,
                comm,
                want_request,
                already_packed,
                pack_size,
            )
        }
    });

    match outcome {
        Some(result) => result,
        None => Err(Error::Buffer(BufferError {
            requested: pack_size,
            available: 0,
        })),
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn submit_locked<T, P>(
    inner: &mut Inner<T::Request>,
    transport: &T,
    packer: &P,
    payload: *const u8,
    count: usize,
    datatype: &P::Datatype,
    dest: i32,
    tag: i32,
    comm: &T::Comm,
    want_request: bool,
    already_packed: bool,
    pack_size: usize,
) -> Result<Option<T::Request>, Error<T::Error, P::Error>>
where
    T: Transport,
    P: Packer,
{
    reclaim_locked(inner, transport).map_err(Error::Transport)?;

    for pass in 0..2 {
        if let Some(mut p) = inner.find_buffer(pack_size) {
            let (dst_ptr, dst_len) = {
                let node = p.as_ref();
                (node.payload_ptr(), node.payload_capacity())
            };

            let packed = if already_packed {
                ptr::copy_nonoverlapping(payload, dst_ptr, count);
                count
            } else {
                packer
                    .pack_into(datatype, count, payload, dst_ptr, dst_len)
                    .map_err(Error::Pack)?
            };

            let req = transport
                .isend(dst_ptr, packed, dest, tag, comm)
                .map_err(Error::Transport)?;

            p.as_mut().set_payload_used(packed);
            p.as_mut().set_request(req.clone());
            inner.take_buffer(p, packed);

            return Ok(if want_request {
                transport.add_ref(&req);
                Some(req)
            } else {
                None
            });
        }

        if pass == 0 {
            reclaim_locked(inner, transport).map_err(Error::Transport)?;
        }
    }

    Err(Error::Buffer(BufferError {
        requested: pack_size,
        available: inner.aligned_size,
    }))
}

/// Drives one round of transport progress and releases every active
/// segment whose request has completed back to the free list, coalescing
/// with address-adjacent neighbors.
///
/// A no-op (without touching the transport) if the active list is empty.
/// Persistent requests are not released on the arena's side, since their
/// owner may restart them.
pub fn reclaim<T>(arena: &Arena<T::Request>, transport: &T) -> Result<(), T::Error>
where
    T: Transport,
{
    match arena.with_inner(|inner| unsafe { reclaim_locked(inner, transport) }) {
        Some(result) => result,
        None => Ok(()),
    }
}

pub(crate) unsafe fn reclaim_locked<T>(
    inner: &mut Inner<T::Request>,
    transport: &T,
) -> Result<(), T::Error>
where
    T: Transport,
{
    if inner.active_head().is_none() {
        return Ok(());
    }

    transport.progress()?;

    let mut cur = inner.active_head();
    while let Some(c) = cur {
        let next = c.as_ref().next;
        if transport.is_complete(c.as_ref().request()) {
            let persistent = transport.is_persistent(c.as_ref().request());
            let req = inner.free_segment(c);
            if persistent {
                #[cfg(feature = "debug-log")]
                log::trace!("bsend-arena: reclaim released segment at {c:p}, persistent request retained");
            } else {
                transport.release(&req);
                #[cfg(feature = "debug-log")]
                log::trace!("bsend-arena: reclaim released segment at {c:p}, request reference dropped");
            }
        }
        cur = next;
    }

    Ok(())
}
