//! Arena lifecycle and the intrusive free/active-list allocator.
//!
//! [`Arena<Req>`] owns, for the duration of attachment, a single
//! caller-supplied byte buffer. It threads two doubly-linked lists of
//! [`SegmentHeader`] records through that buffer: `free`, sorted
//! ascending by address, and `active`, insertion-ordered. Every public
//! operation takes the arena's internal lock for its entire duration,
//! except the blocking waits inside [`detach`], which run with the lock
//! released (§5 of the design).

use core::ptr::NonNull;

use crate::{
    common::{lock, Mutex},
    error::BufferError,
    segment::{header_true_size, overhead, SegmentHeader, MAX_ALIGNMENT, MIN_BUFFER_BLOCK},
    transport::Transport,
};

#[cfg(not(feature = "std"))]
use crate::std::vec::Vec;

#[inline]
fn addr<Req>(p: NonNull<SegmentHeader<Req>>) -> usize {
    p.as_ptr().cast::<u8>() as usize
}

/// The allocator state for an attached arena: the aligned window and its
/// two segment lists. Lives inside [`Arena`]'s mutex; never exposed
/// directly to callers.
pub(crate) struct Inner<Req> {
    orig_base: *mut u8,
    orig_size: usize,
    aligned_base: NonNull<u8>,
    pub(crate) aligned_size: usize,
    free_head: Option<NonNull<SegmentHeader<Req>>>,
    active_head: Option<NonNull<SegmentHeader<Req>>>,
}

// SAFETY: an `Inner` is only ever touched through `Arena`'s mutex, which
// serializes every access; the raw pointers it holds never escape that
// discipline.
unsafe impl<Req: Send> Send for Inner<Req> {}

impl<Req> Inner<Req> {
    /// Linear scan of the free list for the first segment whose payload
    /// capacity is at least `size`. Pure query; does not mutate state.
    pub(crate) fn find_buffer(&self, size: usize) -> Option<NonNull<SegmentHeader<Req>>> {
        let mut cur = self.free_head;
        while let Some(c) = cur {
            let node = unsafe { c.as_ref() };
            if node.payload_capacity() >= size {
                return Some(c);
            }
            cur = node.next;
        }
        None
    }

    /// Carves `size` bytes out of free segment `p`, splitting off a
    /// remainder when one large enough to be useful remains, then moves
    /// `p` onto the active list. `p` must currently be on the free list
    /// with `payload_capacity() >= size`.
    pub(crate) unsafe fn take_buffer(&mut self, mut p: NonNull<SegmentHeader<Req>>, size: usize) {
        let alloc_size = SegmentHeader::<Req>::round_alloc_size(size);
        let header_size = header_true_size::<Req>();
        let (prev, next, old_total) = {
            let node = p.as_ref();
            (node.prev, node.next, node.total_size())
        };

        let remainder_fits =
            alloc_size + header_size + MIN_BUFFER_BLOCK <= p.as_ref().payload_capacity();

        if remainder_fits {
            let left_total = alloc_size + header_size;
            let remainder_base =
                NonNull::new_unchecked(p.as_ref().base().add(left_total));
            let remainder_total = old_total - left_total;
            let mut remainder = SegmentHeader::<Req>::write_free(remainder_base, remainder_total);

            remainder.as_mut().prev = prev;
            remainder.as_mut().next = next;
            match prev {
                Some(mut pr) => pr.as_mut().next = Some(remainder),
                None => self.free_head = Some(remainder),
            }
            if let Some(mut nx) = next {
                nx.as_mut().prev = Some(remainder);
            }

            let node = p.as_mut();
            node.total_size = left_total;
            node.payload_capacity = alloc_size;

            #[cfg(feature = "debug-log")]
            log::trace!(
                "bsend-arena: take_buffer({size}) split segment at {:p}: {alloc_size} bytes taken, {remainder_total} bytes remain free",
                p.as_ptr()
            );
        } else {
            match prev {
                Some(mut pr) => pr.as_mut().next = next,
                None => self.free_head = next,
            }
            if let Some(mut nx) = next {
                nx.as_mut().prev = prev;
            }

            #[cfg(feature = "debug-log")]
            log::trace!(
                "bsend-arena: take_buffer({size}) consumed whole segment at {:p} ({old_total} bytes, remainder too small to split)",
                p.as_ptr()
            );
        }

        let node = p.as_mut();
        node.prev = None;
        node.next = self.active_head;
        if let Some(mut old_head) = self.active_head {
            old_head.as_mut().prev = Some(p);
        }
        self.active_head = Some(p);
    }

    /// Moves active segment `p` back to the free list, merging it with
    /// any address-adjacent free neighbor(s), and returns its request
    /// handle. `p` must currently be on the active list.
    pub(crate) unsafe fn free_segment(&mut self, mut p: NonNull<SegmentHeader<Req>>) -> Req {
        let (a_prev, a_next) = {
            let node = p.as_ref();
            (node.prev, node.next)
        };
        match a_prev {
            Some(mut pr) => pr.as_mut().next = a_next,
            None => self.active_head = a_next,
        }
        if let Some(mut nx) = a_next {
            nx.as_mut().prev = a_prev;
        }

        let req = p.as_mut().take_request();
        let p_base = addr(p);

        let mut avail_prev: Option<NonNull<SegmentHeader<Req>>> = None;
        let mut avail: Option<NonNull<SegmentHeader<Req>>> = None;
        let mut cur = self.free_head;
        while let Some(c) = cur {
            if addr(c) > p_base {
                avail = Some(c);
                break;
            }
            avail_prev = Some(c);
            cur = c.as_ref().next;
        }

        // Merge-right: absorb `avail` into `p` if address-adjacent.
        let merged_right = if let Some(av) = avail {
            if p_base + p.as_ref().total_size() == addr(av) {
                let av_next = av.as_ref().next;
                let av_total = av.as_ref().total_size();
                if let Some(mut nx) = av_next {
                    nx.as_mut().prev = Some(p);
                }
                let node = p.as_mut();
                node.total_size += av_total;
                node.next = av_next;
                true
            } else {
                p.as_mut().next = Some(av);
                false
            }
        } else {
            p.as_mut().next = None;
            false
        };

        // Merge-left: absorb `p` (possibly already grown above) into
        // `avail_prev` if address-adjacent.
        let merged_left = if let Some(mut ap) = avail_prev {
            if addr(ap) + ap.as_ref().total_size() == p_base {
                let p_next = p.as_ref().next;
                let p_total = p.as_ref().total_size();
                if let Some(mut nx) = p_next {
                    nx.as_mut().prev = Some(ap);
                }
                let ap_node = ap.as_mut();
                ap_node.total_size += p_total;
                ap_node.next = p_next;
                true
            } else {
                let p_next = p.as_ref().next;
                if let Some(mut nx) = p_next {
                    nx.as_mut().prev = Some(p);
                }
                p.as_mut().prev = Some(ap);
                ap.as_mut().next = Some(p);
                false
            }
        } else {
            let p_next = p.as_ref().next;
            if let Some(mut nx) = p_next {
                nx.as_mut().prev = Some(p);
            }
            p.as_mut().prev = None;
            self.free_head = Some(p);
            false
        };

        #[cfg(feature = "debug-log")]
        log::trace!(
            "bsend-arena: free_segment({p_base:#x}) merged_right={merged_right} merged_left={merged_left}"
        );
        #[cfg(not(feature = "debug-log"))]
        let _ = (merged_right, merged_left);

        req
    }

    /// Head of the active list, for the reclaim path to walk.
    pub(crate) fn active_head(&self) -> Option<NonNull<SegmentHeader<Req>>> {
        self.active_head
    }

    #[cfg(test)]
    pub(crate) fn free_list_addrs(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let mut cur = self.free_head;
        while let Some(c) = cur {
            let node = unsafe { c.as_ref() };
            out.push((addr(c), node.total_size()));
            cur = node.next;
        }
        out
    }

    #[cfg(test)]
    fn active_count(&self) -> usize {
        let mut n = 0;
        let mut cur = self.active_head;
        while let Some(c) = cur {
            n += 1;
            cur = unsafe { c.as_ref().next };
        }
        n
    }
}

/// Arena lifecycle state: either unattached, or attached with an
/// allocator window live inside it.
enum State<Req> {
    Empty,
    Attached(Inner<Req>),
}

/// A buffered-send staging arena for request-handle type `Req`.
///
/// Construct with [`Arena::new`] (unattached), then [`Arena::attach`] a
/// caller-owned buffer. [`crate::submit::submit`] and
/// [`crate::submit::reclaim`] operate on an attached arena; [`detach`]
/// returns the buffer to the caller once every outstanding send has been
/// waited on.
pub struct Arena<Req> {
    state: Mutex<State<Req>>,
}

// SAFETY: `Inner`'s raw pointers are only reachable through `Arena`'s
// mutex, which serializes all access across threads.
unsafe impl<Req: Send> Send for Arena<Req> {}
unsafe impl<Req: Send> Sync for Arena<Req> {}

impl<Req> Default for Arena<Req> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req> Arena<Req> {
    /// An unattached arena.
    pub fn new() -> Self {
        Arena {
            state: Mutex::new(State::Empty),
        }
    }

    /// True if a buffer is currently attached.
    pub fn is_attached(&self) -> bool {
        matches!(*lock(&self.state), State::Attached(_))
    }

    /// Attaches `buffer` (valid for `size` bytes) to this arena.
    ///
    /// Fails with [`BufferError`] if an arena is already attached, or if
    /// `size` is strictly less than [`overhead::<Req>()`](overhead).
    ///
    /// # Safety
    /// `buffer` must be valid for reads and writes of `size` bytes for
    /// the entire attached lifetime (until a matching [`detach`]
    /// returns), and the caller must not access that memory while
    /// attached.
    pub unsafe fn attach(&self, buffer: *mut u8, size: usize) -> Result<(), BufferError> {
        let mut guard = lock(&self.state);
        if let State::Attached(inner) = &*guard {
            return Err(BufferError {
                requested: size,
                available: inner.aligned_size,
            });
        }

        let min = overhead::<Req>();
        if size < min {
            return Err(BufferError {
                requested: size,
                available: 0,
            });
        }

        let base_addr = buffer as usize;
        let align = MAX_ALIGNMENT;
        let off = align.wrapping_sub(base_addr % align) % align;
        let aligned_base = NonNull::new_unchecked(buffer.add(off));
        let aligned_size = size - off;

        // `Req` is expected to be a plain handle (an index, a pointer, or
        // similarly pointer-sized/-aligned type), so its header's
        // alignment requirement never exceeds `MAX_ALIGNMENT`.
        debug_assert!(
            aligned_base.as_ptr() as usize % core::mem::align_of::<SegmentHeader<Req>>() == 0
        );

        let free = SegmentHeader::<Req>::write_free(aligned_base, aligned_size);

        *guard = State::Attached(Inner {
            orig_base: buffer,
            orig_size: size,
            aligned_base,
            aligned_size,
            free_head: Some(free),
            active_head: None,
        });

        #[cfg(feature = "debug-log")]
        log::trace!(
            "bsend-arena: attached {size} bytes at {buffer:p} (aligned window {aligned_size} bytes)"
        );

        Ok(())
    }

    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<Req>) -> R) -> Option<R> {
        let mut guard = lock(&self.state);
        match &mut *guard {
            State::Attached(inner) => Some(f(inner)),
            State::Empty => None,
        }
    }

    pub(crate) fn aligned_size(&self) -> usize {
        match &*lock(&self.state) {
            State::Attached(inner) => inner.aligned_size,
            State::Empty => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn free_list_addrs_for_test(&self) -> Vec<(usize, usize)> {
        match &*lock(&self.state) {
            State::Attached(inner) => inner.free_list_addrs(),
            State::Empty => Vec::new(),
        }
    }
}

/// Detaches `arena`'s buffer, blocking-waiting on every outstanding send
/// first (in active-list order), via `transport`.
///
/// Returns `(None, 0)` if no buffer was attached. Otherwise returns the
/// exact `(buffer, size)` pair originally passed to [`Arena::attach`].
pub fn detach<T>(arena: &Arena<T::Request>, transport: &T) -> (Option<*mut u8>, usize)
where
    T: Transport,
{
    let collected: Option<(*mut u8, usize, Vec<T::Request>)> = {
        let mut guard = lock(&arena.state);
        match core::mem::replace(&mut *guard, State::Empty) {
            State::Empty => None,
            State::Attached(inner) => {
                let mut reqs = Vec::new();
                let mut cur = inner.active_head;
                while let Some(c) = cur {
                    let node = unsafe { c.as_ref() };
                    reqs.push(unsafe { node.request() }.clone());
                    cur = node.next;
                }
                Some((inner.orig_base, inner.orig_size, reqs))
            }
        }
    };

    match collected {
        None => (None, 0),
        Some((base, size, reqs)) => {
            for req in &reqs {
                // Errors from a failing wait are not observable through
                // this signature (the original MPI contract has no
                // recovery path for a broken detach either); best effort
                // drain, then move on.
                let _ = transport.wait(req);
                transport.release(req);
            }
            (Some(base), size)
        }
    }
}

/// If `arena` is attached, [`detach`]s it (discarding the returned
/// buffer) via `transport`.
pub fn finalize<T>(arena: &Arena<T::Request>, transport: &T)
where
    T: Transport,
{
    let _ = detach(arena, transport);
}
