//! Generation-0 Tracking List
//!
//! Index-linked circular ring of GC heads. Slot 0 is the sentinel; the ring
//! is empty iff the sentinel's `next` points back at itself.
//!
//! ```text
//!        ┌──────────────────────────────────────────┐
//!        v                                          │
//!   [sentinel] <-> [head a] <-> [head b] <-> [head c]
//!        ^                                          │
//!        └──────────────────────────────────────────┘
//! ```
//!
//! Track appends before the sentinel (tail); untrack unlinks in O(1).
//! Heads are allocated once per GC object and keep their slot for the
//! object's whole life, so a resized object keeps its ring position.

use crate::error::{GcError, Result};
use crate::object::ObjectId;
use serde::Serialize;

/// Slot of the generation-0 sentinel
pub const SENTINEL: usize = 0;

/// Value written to `next` after untrack; never a valid slot
const POISON: usize = usize::MAX;

/// Track state of a GC head
///
/// The first three states are the reserved markers; `Refs` carries the
/// collector's non-negative bookkeeping count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackState {
    Untracked,
    Reachable,
    TentativelyUnreachable,
    Refs(usize),
}

impl TrackState {
    #[inline]
    pub fn is_tracked(self) -> bool {
        self != TrackState::Untracked
    }

    /// Classic signed encoding: markers are -2, -3, -4
    pub fn to_raw(self) -> isize {
        match self {
            TrackState::Untracked => -2,
            TrackState::Reachable => -3,
            TrackState::TentativelyUnreachable => -4,
            TrackState::Refs(n) => n as isize,
        }
    }
}

/// GC head
#[derive(Debug, Clone)]
pub struct GcHead {
    next: usize,
    prev: usize,
    state: TrackState,
    owner: Option<ObjectId>,
}

impl GcHead {
    fn unlinked(owner: Option<ObjectId>) -> Self {
        Self {
            next: POISON,
            prev: POISON,
            state: TrackState::Untracked,
            owner,
        }
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        self.state
    }

    #[inline]
    pub fn owner(&self) -> Option<ObjectId> {
        self.owner
    }
}

/// TrackingList - generation 0
pub struct TrackingList {
    heads: Vec<GcHead>,
    free: Vec<usize>,
    poison: bool,
}

impl TrackingList {
    /// Create an empty ring
    ///
    /// With `poison` set, untrack overwrites `next` so later use of the stale
    /// link is caught by [`verify`](Self::verify).
    pub fn new(capacity: usize, poison: bool) -> Self {
        let mut heads = Vec::with_capacity(capacity.saturating_add(1));
        heads.push(GcHead {
            next: SENTINEL,
            prev: SENTINEL,
            state: TrackState::Reachable,
            owner: None,
        });

        Self {
            heads,
            free: Vec::new(),
            poison,
        }
    }

    /// Allocate an untracked head for `owner`
    pub(crate) fn allocate_head(&mut self, owner: ObjectId) -> usize {
        if let Some(slot) = self.free.pop() {
            self.heads[slot] = GcHead::unlinked(Some(owner));
            return slot;
        }
        self.heads.push(GcHead::unlinked(Some(owner)));
        self.heads.len() - 1
    }

    /// Return a head to the free list
    ///
    /// A head that is still tracked is unlinked first so the ring never
    /// points at a recycled slot.
    pub(crate) fn release_head(&mut self, slot: usize) {
        debug_assert!(slot != SENTINEL);
        self.untrack(slot);
        self.heads[slot] = GcHead::unlinked(None);
        self.free.push(slot);
    }

    #[inline]
    pub fn head(&self, slot: usize) -> &GcHead {
        &self.heads[slot]
    }

    #[inline]
    pub fn state(&self, slot: usize) -> TrackState {
        self.heads[slot].state
    }

    /// Overwrite a tracked head's state without moving it
    pub(crate) fn set_state(&mut self, slot: usize, state: TrackState) {
        debug_assert!(self.heads[slot].state.is_tracked() && state.is_tracked());
        self.heads[slot].state = state;
    }

    /// Link `slot` at the tail
    ///
    /// Returns `false` without touching the ring if it is already tracked.
    pub(crate) fn track(&mut self, slot: usize) -> bool {
        if self.heads[slot].state.is_tracked() {
            return false;
        }

        let last = self.heads[SENTINEL].prev;
        let head = &mut self.heads[slot];
        head.state = TrackState::Reachable;
        head.prev = last;
        head.next = SENTINEL;
        self.heads[last].next = slot;
        self.heads[SENTINEL].prev = slot;
        true
    }

    /// Unlink `slot`
    ///
    /// Returns `false` without touching the ring if it is not tracked.
    pub(crate) fn untrack(&mut self, slot: usize) -> bool {
        if !self.heads[slot].state.is_tracked() {
            return false;
        }

        let GcHead { next, prev, .. } = self.heads[slot];
        self.heads[prev].next = next;
        self.heads[next].prev = prev;

        let head = &mut self.heads[slot];
        head.state = TrackState::Untracked;
        if self.poison {
            head.next = POISON;
        }
        true
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heads[SENTINEL].next == SENTINEL
    }

    /// Number of tracked heads; walks the ring
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Tracked heads in ring order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.heads[SENTINEL].next,
        }
    }

    /// Walk the ring checking circularity and state consistency
    ///
    /// Returns the ring length.
    pub fn verify(&self) -> Result<usize> {
        let corrupt = |slot: usize, reason: &str| GcError::CorruptRing {
            slot,
            reason: reason.to_string(),
        };

        let mut prev = SENTINEL;
        let mut cursor = self.heads[SENTINEL].next;
        let mut walked = 0usize;

        while cursor != SENTINEL {
            let head = self.heads.get(cursor).ok_or_else(|| corrupt(prev, "next out of range"))?;
            if head.prev != prev {
                return Err(corrupt(cursor, "prev does not point back"));
            }
            if !head.state.is_tracked() {
                return Err(corrupt(cursor, "untracked head linked into ring"));
            }
            walked += 1;
            if walked >= self.heads.len() {
                return Err(corrupt(cursor, "ring does not close"));
            }
            prev = cursor;
            cursor = head.next;
        }

        if self.heads[SENTINEL].prev != prev {
            return Err(corrupt(SENTINEL, "sentinel prev is not the tail"));
        }

        let tracked = self.heads[1..].iter().filter(|h| h.state.is_tracked()).count();
        if tracked != walked {
            return Err(corrupt(
                SENTINEL,
                &format!("{} tracked heads but {} linked", tracked, walked),
            ));
        }

        Ok(walked)
    }
}

/// Iterator over tracked slots
pub struct Iter<'a> {
    list: &'a TrackingList,
    cursor: usize,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cursor == SENTINEL {
            return None;
        }
        let slot = self.cursor;
        self.cursor = self.list.heads[slot].next;
        Some(slot)
    }
}
