//! End-to-end coverage against a fake transport/packer pair, exercising
//! the scenarios and boundary behaviors from the design's testable
//! properties section directly against the public API.

use std::cell::RefCell;

use crate::{
    arena::{detach, finalize, Arena},
    error::Error,
    pack::Packer,
    segment::{header_true_size, overhead, MIN_BUFFER_BLOCK},
    submit::{reclaim, submit},
    transport::Transport,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FakeRequest {
    id: usize,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    completed: RefCell<Vec<bool>>,
    persistent: RefCell<Vec<bool>>,
    refs: RefCell<Vec<i32>>,
    waited: RefCell<Vec<usize>>,
    progress_calls: RefCell<usize>,
}

impl FakeTransport {
    fn complete(&self, req: FakeRequest) {
        self.completed.borrow_mut()[req.id] = true;
    }

    fn mark_persistent(&self, req: FakeRequest) {
        self.persistent.borrow_mut()[req.id] = true;
    }

    fn wait_order(&self) -> Vec<usize> {
        self.waited.borrow().clone()
    }

    fn refcount(&self, req: FakeRequest) -> i32 {
        self.refs.borrow()[req.id]
    }
}

impl Transport for FakeTransport {
    type Request = FakeRequest;
    type Comm = ();
    type Error = ();

    unsafe fn isend(
        &self,
        _buf: *const u8,
        _len: usize,
        _dest: i32,
        _tag: i32,
        _comm: &(),
    ) -> Result<FakeRequest, ()> {
        let id = self.completed.borrow().len();
        self.completed.borrow_mut().push(false);
        self.persistent.borrow_mut().push(false);
        self.refs.borrow_mut().push(1);
        Ok(FakeRequest { id })
    }

    fn progress(&self) -> Result<(), ()> {
        *self.progress_calls.borrow_mut() += 1;
        Ok(())
    }

    fn is_complete(&self, req: &FakeRequest) -> bool {
        self.completed.borrow()[req.id]
    }

    fn wait(&self, req: &FakeRequest) -> Result<(), ()> {
        self.waited.borrow_mut().push(req.id);
        self.completed.borrow_mut()[req.id] = true;
        Ok(())
    }

    fn is_persistent(&self, req: &FakeRequest) -> bool {
        self.persistent.borrow()[req.id]
    }

    fn add_ref(&self, req: &FakeRequest) {
        self.refs.borrow_mut()[req.id] += 1;
    }

    fn release(&self, req: &FakeRequest) {
        self.refs.borrow_mut()[req.id] -= 1;
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Datatype {
    /// Ordinary typed payload: packed via `pack_into`.
    Byte,
    /// The already-packed sentinel: `memcpy`d verbatim.
    Packed,
}

pub(crate) struct FakePacker;

impl Packer for FakePacker {
    type Datatype = Datatype;
    type Error = ();

    fn is_already_packed(&self, datatype: &Datatype) -> bool {
        matches!(datatype, Datatype::Packed)
    }

    fn pack_size(&self, _datatype: &Datatype, count: usize) -> Result<usize, ()> {
        Ok(count)
    }

    unsafe fn pack_into(
        &self,
        _datatype: &Datatype,
        count: usize,
        src: *const u8,
        dst: *mut u8,
        dst_len: usize,
    ) -> Result<usize, ()> {
        if count > dst_len {
            return Err(());
        }
        core::ptr::copy_nonoverlapping(src, dst, count);
        Ok(count)
    }
}

struct Harness {
    buf: Vec<u8>,
    arena: Arena<FakeRequest>,
    transport: FakeTransport,
    packer: FakePacker,
}

impl Harness {
    fn new(size: usize) -> Self {
        Harness {
            buf: vec![0u8; size],
            arena: Arena::new(),
            transport: FakeTransport::default(),
            packer: FakePacker,
        }
    }

    unsafe fn attach(&mut self) {
        self.arena.attach(self.buf.as_mut_ptr(), self.buf.len()).unwrap();
    }

    unsafe fn send(&self, payload: &[u8], want_request: bool) -> Result<Option<FakeRequest>, Error<(), ()>> {
        submit(
            &self.arena,
            &self.transport,
            &self.packer,
            payload.as_ptr(),
            payload.len(),
            &Datatype::Byte,
            1,
            7,
            &(),
            want_request,
        )
    }
}

/// Payload capacity of the sole free segment an untouched, freshly attached
/// arena holds. Panics if the free list does not hold exactly one segment.
fn solo_free_segment_payload_capacity(h: &Harness) -> usize {
    let free = h.arena.free_list_addrs_for_test();
    assert_eq!(free.len(), 1, "expected exactly one free segment before allocating");
    free[0].1 - header_true_size::<FakeRequest>()
}

#[test]
fn attach_detach_round_trip() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    assert!(h.arena.is_attached());

    let (base, size) = detach(&h.arena, &h.transport);
    assert_eq!(base, Some(h.buf.as_mut_ptr()));
    assert_eq!(size, 4096);
    assert!(!h.arena.is_attached());
}

#[test]
fn detach_on_unattached_arena_is_idempotent() {
    let arena: Arena<FakeRequest> = Arena::new();
    let transport = FakeTransport::default();
    assert_eq!(detach(&arena, &transport), (None, 0));
    assert_eq!(detach(&arena, &transport), (None, 0));
}

#[test]
fn attach_below_overhead_fails() {
    let mut h = Harness::new(overhead::<FakeRequest>() - 1);
    let err = unsafe { h.arena.attach(h.buf.as_mut_ptr(), h.buf.len()) }.unwrap_err();
    assert_eq!(err.requested, overhead::<FakeRequest>() - 1);
}

#[test]
fn attach_at_exactly_overhead_succeeds() {
    let mut h = Harness::new(overhead::<FakeRequest>());
    unsafe { h.arena.attach(h.buf.as_mut_ptr(), h.buf.len()) }.unwrap();
    assert!(h.arena.is_attached());
    // One zero-byte send must fit.
    let req = unsafe { h.send(&[], true) }.unwrap();
    assert!(req.is_some());
}

#[test]
fn double_attach_fails() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    let err = unsafe { h.arena.attach(h.buf.as_mut_ptr(), h.buf.len()) }.unwrap_err();
    assert_eq!(err.requested, 4096);
}

#[test]
fn single_small_send_lands_on_active_list() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    let payload = [0xABu8; 64];
    let req = unsafe { h.send(&payload, true) }.unwrap().unwrap();
    assert!(!h.transport.is_complete(&req));

    h.transport.complete(req);
    reclaim(&h.arena, &h.transport).unwrap();
    assert!(h.transport.is_complete(&req));
}

#[test]
fn oversize_submit_reports_buffer_error_with_diagnostic() {
    let mut h = Harness::new(256);
    unsafe { h.attach() };
    let payload = vec![0u8; 1024];
    let err = unsafe { h.send(&payload, false) }.unwrap_err();
    match err {
        Error::Buffer(e) => {
            assert_eq!(e.requested, 1024);
            assert_eq!(e.available, h.arena.aligned_size());
        }
        _ => panic!("expected Error::Buffer"),
    }
}

#[test]
fn fragmentation_and_two_pass_rescue() {
    let mut h = Harness::new(1024);
    unsafe { h.attach() };

    let payload = vec![0u8; 256];
    let r1 = unsafe { h.send(&payload, true) }.unwrap().unwrap();
    let r2 = unsafe { h.send(&payload, true) }.unwrap().unwrap();
    let r3 = unsafe { h.send(&payload, true) }.unwrap().unwrap();

    h.transport.complete(r2);

    // `submit`'s leading reclaim call (before the two-pass loop even
    // starts searching) drains r2's completion, so this first-fit find
    // succeeds immediately.
    let r4 = unsafe { h.send(&payload, true) }.unwrap();
    assert!(r4.is_some());

    let big = vec![0u8; 600];
    let err = unsafe { h.send(&big, false) }.unwrap_err();
    assert!(matches!(err, Error::Buffer(_)));

    let _ = (r1, r3);
}

#[test]
fn coalesce_both_sides() {
    let mut h = Harness::new(1024);
    unsafe { h.attach() };

    let payload = vec![0u8; 128];
    let a = unsafe { h.send(&payload, true) }.unwrap().unwrap();
    let b = unsafe { h.send(&payload, true) }.unwrap().unwrap();
    let c = unsafe { h.send(&payload, true) }.unwrap().unwrap();

    h.transport.complete(c);
    reclaim(&h.arena, &h.transport).unwrap();
    h.transport.complete(a);
    reclaim(&h.arena, &h.transport).unwrap();
    h.transport.complete(b);
    reclaim(&h.arena, &h.transport).unwrap();

    // After freeing every segment the arena coalesces back to exactly
    // one free span covering the whole aligned window.
    let free = h.arena.free_list_addrs_for_test();
    assert_eq!(free.len(), 1);
    assert_eq!(free[0].1, h.arena.aligned_size());

    let (base, size) = detach(&h.arena, &h.transport);
    assert!(base.is_some());
    assert_eq!(size, 1024);
}

#[test]
fn detach_blocks_on_in_flight_sends() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    let payload = vec![0u8; 64];
    let req = unsafe { h.send(&payload, true) }.unwrap().unwrap();
    assert!(!h.transport.is_complete(&req));

    let (base, size) = detach(&h.arena, &h.transport);
    assert_eq!(size, 4096);
    assert!(base.is_some());
    // `detach` must have waited on the still-outstanding request.
    assert_eq!(h.transport.wait_order(), vec![req.id]);
    assert!(h.transport.is_complete(&req));
}

#[test]
fn persistent_requests_are_not_released_by_reclaim() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    let payload = vec![0u8; 64];
    let req = unsafe { h.send(&payload, true) }.unwrap().unwrap();
    h.transport.mark_persistent(req);
    assert_eq!(h.transport.refcount(req), 2); // transport + caller's want_request bump

    h.transport.complete(req);
    reclaim(&h.arena, &h.transport).unwrap();
    // Reclaim frees the segment but must not call `release` on a
    // persistent request -- the refcount is untouched by reclaim itself.
    assert_eq!(h.transport.refcount(req), 2);
}

#[test]
fn already_packed_sentinel_skips_the_packer() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    let payload = [7u8; 32];
    let req = unsafe {
        submit(
            &h.arena,
            &h.transport,
            &h.packer,
            payload.as_ptr(),
            payload.len(),
            &Datatype::Packed,
            0,
            0,
            &(),
            false,
        )
    };
    assert!(req.unwrap().is_none());
}

#[test]
fn finalize_drains_outstanding_sends_and_empties_the_arena() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    let payload = vec![0u8; 64];
    let _req = unsafe { h.send(&payload, false) }.unwrap();

    finalize(&h.arena, &h.transport);
    assert!(!h.arena.is_attached());
}

#[test]
fn submit_of_full_capacity_consumes_whole_segment_without_split() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    let capacity = solo_free_segment_payload_capacity(&h);

    let payload = vec![0u8; capacity];
    let req = unsafe { h.send(&payload, true) }.unwrap();
    assert!(req.is_some());

    // No split: the whole segment was consumed, nothing left on the free
    // list.
    assert!(h.arena.free_list_addrs_for_test().is_empty());
}

#[test]
fn submit_one_byte_past_the_split_threshold_does_not_split() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    let capacity = solo_free_segment_payload_capacity(&h);
    let header = header_true_size::<FakeRequest>();
    // `capacity - header - MIN_BUFFER_BLOCK + 1`: the remainder a split
    // would leave is one byte too small to hold a header plus
    // `MIN_BUFFER_BLOCK`, so the whole segment is consumed instead.
    let size = capacity - header - MIN_BUFFER_BLOCK + 1;

    let payload = vec![0u8; size];
    let req = unsafe { h.send(&payload, true) }.unwrap();
    assert!(req.is_some());
    assert!(h.arena.free_list_addrs_for_test().is_empty());
}

#[test]
fn submit_at_the_split_threshold_splits_off_the_remainder() {
    let mut h = Harness::new(4096);
    unsafe { h.attach() };
    let capacity = solo_free_segment_payload_capacity(&h);
    let header = header_true_size::<FakeRequest>();
    // `capacity - header - MIN_BUFFER_BLOCK`: the remainder exactly fits a
    // header plus `MIN_BUFFER_BLOCK`, so the split rule fires.
    let size = capacity - header - MIN_BUFFER_BLOCK;

    let payload = vec![0u8; size];
    let req = unsafe { h.send(&payload, true) }.unwrap();
    assert!(req.is_some());

    let free = h.arena.free_list_addrs_for_test();
    assert_eq!(
        free.len(),
        1,
        "split must leave exactly one remainder free segment"
    );
    assert_eq!(
        free[0].1,
        header + MIN_BUFFER_BLOCK,
        "remainder must span exactly header_true_size + MIN_BUFFER_BLOCK bytes"
    );
}
