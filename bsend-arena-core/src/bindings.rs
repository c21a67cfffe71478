//! The three independent arena-owning slots (process, communicator,
//! session) and the priority order `submit` resolves them in.
//!
//! Each slot is a small cell holding at most one shared [`Arena`]. No
//! lock is shared across slots — resolving an arena only ever takes the
//! target slot's own lock long enough to clone out the `Arc` handle
//! underneath; the arena's own internal mutex then governs the actual
//! allocator operation.

use crate::{
    arena::Arena,
    common::{lock, Arc, Mutex},
    transport::Transport,
};

/// One of the three independent slots that can own an attached arena:
/// process-wide, per-communicator, or per-session. Populated by calling
/// [`ArenaSlot::bind`] with an already-attached [`Arena`], and consulted
/// by [`resolve`] in priority order.
pub struct ArenaSlot<Req> {
    slot: Mutex<Option<Arc<Arena<Req>>>>,
}

impl<Req> Default for ArenaSlot<Req> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req> ArenaSlot<Req> {
    /// An empty slot.
    pub const fn new() -> Self {
        ArenaSlot {
            slot: Mutex::new(None),
        }
    }

    /// Binds `arena` into this slot, replacing (and returning) whatever
    /// was bound previously.
    pub fn bind(&self, arena: Arc<Arena<Req>>) -> Option<Arc<Arena<Req>>> {
        core::mem::replace(&mut *lock(&self.slot), Some(arena))
    }

    /// Clears this slot, returning whatever was bound.
    pub fn clear(&self) -> Option<Arc<Arena<Req>>> {
        core::mem::take(&mut *lock(&self.slot))
    }

    /// Clones out the arena currently bound to this slot, if any.
    pub fn get(&self) -> Option<Arc<Arena<Req>>> {
        lock(&self.slot).clone()
    }

    /// Finalizes whatever arena is bound to this slot: removes it from the
    /// slot, then [`detach`](crate::arena::detach)es it via `transport`,
    /// blocking-waiting on every request still in flight. A no-op if
    /// nothing is bound.
    pub fn finalize<T>(&self, transport: &T)
    where
        T: Transport<Request = Req>,
    {
        if let Some(arena) = self.clear() {
            crate::arena::finalize(&arena, transport);
        }
    }
}

/// Resolves the arena a `submit` call should target, consulting
/// `communicator`, then `session`, then `process`, in that order, and
/// returning the first non-empty slot's arena.
pub fn resolve<Req>(
    communicator: &ArenaSlot<Req>,
    session: &ArenaSlot<Req>,
    process: &ArenaSlot<Req>,
) -> Option<Arc<Arena<Req>>> {
    communicator
        .get()
        .or_else(|| session.get())
        .or_else(|| process.get())
}

/// Finalizes a communicator-scoped arena slot (SPEC_FULL.md §4.1/§6):
/// detaches whatever arena is bound, blocking-waiting on every outstanding
/// send via `transport`, then empties `comm_slot`. A no-op if nothing is
/// bound to it.
pub fn comm_finalize<Req, T>(comm_slot: &ArenaSlot<Req>, transport: &T)
where
    T: Transport<Request = Req>,
{
    comm_slot.finalize(transport);
}

/// Finalizes a session-scoped arena slot; see [`comm_finalize`] for the
/// exact sequencing.
pub fn session_finalize<Req, T>(session_slot: &ArenaSlot<Req>, transport: &T)
where
    T: Transport<Request = Req>,
{
    session_slot.finalize(transport);
}
