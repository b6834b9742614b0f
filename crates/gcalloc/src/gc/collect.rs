//! Collector entry point
//!
//! The cycle detection algorithm lives outside this crate. A [`Collector`]
//! is handed a [`Generation0`] view holding exactly the tracked objects; it
//! may annotate them with collector states, read refcounts and traverse
//! payloads, then names the objects to reclaim. Those are untracked and
//! freed, and every survivor is reset to `Reachable`.

use crate::error::{GcError, Result};
use crate::gc::heap::GcHeap;
use crate::gc::tracking::TrackState;
use crate::logging::AllocEvent;
use crate::object::{ObjectHeader, ObjectId, Visit, Visitor};
use std::time::Instant;

/// External collection algorithm
pub trait Collector {
    /// Inspect generation 0 and return the objects to reclaim
    fn collect(&mut self, generation: &mut Generation0<'_>) -> Vec<ObjectId>;
}

impl<F> Collector for F
where
    F: FnMut(&mut Generation0<'_>) -> Vec<ObjectId>,
{
    fn collect(&mut self, generation: &mut Generation0<'_>) -> Vec<ObjectId> {
        self(generation)
    }
}

/// View of generation 0 during a collection pass
///
/// Membership cannot change through this view.
pub struct Generation0<'a> {
    heap: &'a mut GcHeap,
}

impl Generation0<'_> {
    pub fn len(&self) -> usize {
        self.heap.tracking.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.tracking.is_empty()
    }

    /// Tracked objects in ring order
    pub fn ids(&self) -> Vec<ObjectId> {
        self.heap.tracked_ids()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.heap.is_tracked(id)
    }

    pub fn state(&self, id: ObjectId) -> Result<TrackState> {
        self.heap.state(id)
    }

    /// Record collector bookkeeping for a tracked object
    ///
    /// `Untracked` is rejected: only track/untrack may change membership.
    pub fn set_state(&mut self, id: ObjectId, state: TrackState) -> Result<()> {
        if !state.is_tracked() {
            return Err(GcError::InvalidArgument(
                "collector cannot mark an object untracked".to_string(),
            ));
        }
        let slot = self.heap.gc_slot(id)?;
        if !self.heap.tracking.state(slot).is_tracked() {
            return Err(GcError::NotTracked { id });
        }
        self.heap.tracking.set_state(slot, state);
        Ok(())
    }

    pub fn refcount(&self, id: ObjectId) -> Result<isize> {
        Ok(self.heap.header(id)?.refcount())
    }

    pub fn header(&self, id: ObjectId) -> Result<&ObjectHeader> {
        self.heap.header(id)
    }

    pub fn payload(&self, id: ObjectId) -> Result<&[u8]> {
        self.heap.payload(id)
    }

    pub fn traverse(&self, id: ObjectId, visitor: &mut dyn Visitor) -> Result<Visit> {
        self.heap.traverse(id, visitor)
    }
}

impl GcHeap {
    /// Run an external collector over generation 0
    ///
    /// Returns the number of reclaimed objects. Naming an object twice, or an
    /// object that is already freed, is a stale-handle violation. Naming a
    /// live object outside generation 0 is a not-tracked violation.
    pub fn collect(&mut self, collector: &mut dyn Collector) -> Result<usize> {
        let tracked = self.tracking.len();
        log::info!("Collection started: {} tracked objects", tracked);
        self.logger().log(AllocEvent::CollectStart { tracked });
        let start = Instant::now();

        let doomed = collector.collect(&mut Generation0 { heap: self });

        let mut reclaimed = 0;
        for id in doomed {
            if self.contains(id) && !self.is_tracked(id) {
                self.check("collect", Err(GcError::NotTracked { id }))?;
            }
            self.gc_del(id)?;
            reclaimed += 1;
        }

        let survivors: Vec<usize> = self.tracking.iter().collect();
        for slot in survivors {
            self.tracking.set_state(slot, TrackState::Reachable);
        }

        let duration_us = start.elapsed().as_micros() as u64;
        log::info!(
            "Collection finished: {} reclaimed in {}us",
            reclaimed,
            duration_us
        );
        self.logger().log(AllocEvent::CollectEnd {
            reclaimed,
            duration_us,
        });
        Ok(reclaimed)
    }
}
