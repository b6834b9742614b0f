//! GC Heap - sequential object table and generation 0
//!
//! Objects live in a slab of generation-checked slots. GC objects also own a
//! head in the [`TrackingList`]; the head slot is fixed for the object's
//! life, so resizing never moves an object within the ring.
//!
//! All mutation goes through `&mut self`: the heap has a single mutator by
//! construction.

use crate::allocator::{AllocatorRef, RawBlock};
use crate::config::GcAllocConfig;
use crate::error::{or_fatal, FatalPolicy, GcError, Result};
use crate::gc::tracking::{TrackState, TrackingList};
use crate::logging::{AllocEvent, GcLogger, LogLevel};
use crate::object::{layout, ObjectHeader, ObjectId, TrackingPolicy, TypeDescriptor, Visit, Visitor};
use crate::util::POINTER_WIDTH;
use std::sync::Arc;

struct ObjectSlot {
    generation: u32,
    entry: Option<ObjectEntry>,
}

struct ObjectEntry {
    header: ObjectHeader,
    payload: RawBlock,
    gc_slot: Option<usize>,
}

/// GcHeap - owner of every sequential-context object
pub struct GcHeap {
    slots: Vec<ObjectSlot>,
    free_slots: Vec<u32>,
    live: usize,
    pub(crate) tracking: TrackingList,
    allocator: AllocatorRef,
    policy: FatalPolicy,
    logger: Arc<GcLogger>,
}

impl GcHeap {
    /// Create an empty heap drawing payloads from `allocator`
    pub fn new(allocator: AllocatorRef, config: &GcAllocConfig, logger: Arc<GcLogger>) -> Self {
        Self {
            slots: Vec::with_capacity(config.initial_capacity),
            free_slots: Vec::new(),
            live: 0,
            tracking: TrackingList::new(config.initial_capacity, config.poison_untracked_links),
            allocator,
            policy: config.fatal_policy,
            logger,
        }
    }

    pub fn allocator(&self) -> &AllocatorRef {
        &self.allocator
    }

    pub fn fatal_policy(&self) -> FatalPolicy {
        self.policy
    }

    /// Objects allocated and not yet freed
    pub fn live_objects(&self) -> usize {
        self.live
    }

    pub fn tracking(&self) -> &TrackingList {
        &self.tracking
    }

    pub(crate) fn logger(&self) -> &Arc<GcLogger> {
        &self.logger
    }

    // === Allocation ===

    /// Allocate a fixed-size object with refcount 1
    pub fn new_object(&mut self, ty: &Arc<TypeDescriptor>) -> Result<ObjectId> {
        self.allocate(ObjectHeader::init(ty), false)
    }

    /// Allocate a variable-size object holding `items` items
    pub fn new_var(&mut self, ty: &Arc<TypeDescriptor>, items: usize) -> Result<ObjectId> {
        self.allocate(ObjectHeader::init_var(ty, items)?, false)
    }

    /// Allocate a fixed-size GC object; it starts untracked
    pub fn gc_new(&mut self, ty: &Arc<TypeDescriptor>) -> Result<ObjectId> {
        require_gc(ty)?;
        self.allocate(ObjectHeader::init(ty), true)
    }

    /// Allocate a variable-size GC object; it starts untracked
    pub fn gc_new_var(&mut self, ty: &Arc<TypeDescriptor>, items: usize) -> Result<ObjectId> {
        require_gc(ty)?;
        self.allocate(ObjectHeader::init_var(ty, items)?, true)
    }

    /// Adopt a block from any allocator as a fixed-size object
    ///
    /// The block must hold at least `fixed_size(ty)` bytes.
    pub fn init_object(&mut self, block: RawBlock, ty: &Arc<TypeDescriptor>) -> Result<ObjectId> {
        self.adopt(ObjectHeader::init(ty), block, false)
    }

    /// Adopt a block from any allocator as a variable-size object
    pub fn init_var_object(
        &mut self,
        block: RawBlock,
        ty: &Arc<TypeDescriptor>,
        items: usize,
    ) -> Result<ObjectId> {
        self.adopt(ObjectHeader::init_var(ty, items)?, block, false)
    }

    fn allocate(&mut self, header: ObjectHeader, gc: bool) -> Result<ObjectId> {
        let size = match header.object_size() {
            Some(size) => size,
            None => return Err(self.out_of_memory(usize::MAX)),
        };

        match RawBlock::allocate(&self.allocator, size) {
            Some(block) => self.insert(header, block, gc),
            None => Err(self.out_of_memory(size)),
        }
    }

    pub(crate) fn adopt(&mut self, header: ObjectHeader, block: RawBlock, gc: bool) -> Result<ObjectId> {
        let needed = header.object_size().unwrap_or(usize::MAX);
        if block.size() < needed {
            return Err(GcError::InvalidArgument(format!(
                "block of {} bytes is smaller than '{}' object of {} bytes",
                block.size(),
                header.type_name(),
                needed
            )));
        }
        self.insert(header, block, gc)
    }

    fn insert(&mut self, header: ObjectHeader, payload: RawBlock, gc: bool) -> Result<ObjectId> {
        let index = match self.free_slots.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| self.out_of_memory(payload.size()))?;
                self.slots.push(ObjectSlot {
                    generation: 1,
                    entry: None,
                });
                index
            },
        };

        let id = ObjectId::new(index, self.slots[index as usize].generation);
        let gc_slot = gc.then(|| self.tracking.allocate_head(id));
        let size = payload.size();

        log::debug!("Allocated {} {} ({} bytes)", header.type_name(), id, size);
        self.logger.log_with(LogLevel::Debug, || AllocEvent::Allocated {
            id: Some(id),
            type_name: header.type_name().to_string(),
            size,
        });

        self.slots[index as usize].entry = Some(ObjectEntry {
            header,
            payload,
            gc_slot,
        });
        self.live += 1;
        Ok(id)
    }

    fn out_of_memory(&self, size: usize) -> GcError {
        log::warn!("Allocation of {} bytes failed", size);
        self.logger.log(AllocEvent::AllocationFailure { size });
        GcError::OutOfMemory { requested: size }
    }

    // === Access ===

    fn entry(&self, id: ObjectId) -> Result<&ObjectEntry> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(GcError::StaleHandle { id })
    }

    fn entry_mut(&mut self, id: ObjectId) -> Result<&mut ObjectEntry> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(GcError::StaleHandle { id })
    }

    /// Whether `id` names a live object
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entry(id).is_ok()
    }

    pub fn header(&self, id: ObjectId) -> Result<&ObjectHeader> {
        Ok(&self.entry(id)?.header)
    }

    pub fn header_mut(&mut self, id: ObjectId) -> Result<&mut ObjectHeader> {
        Ok(&mut self.entry_mut(id)?.header)
    }

    pub fn payload(&self, id: ObjectId) -> Result<&[u8]> {
        Ok(self.entry(id)?.payload.as_slice())
    }

    pub fn payload_mut(&mut self, id: ObjectId) -> Result<&mut [u8]> {
        Ok(self.entry_mut(id)?.payload.as_mut_slice())
    }

    /// Weak reference slot of an object
    ///
    /// Lives at `payload base + weaklist_offset`; only types with a non-zero
    /// offset have one.
    pub fn weakref_slot(&mut self, id: ObjectId) -> Result<&mut usize> {
        let entry = self.entry_mut(id)?;
        let ty = Arc::clone(entry.header.ty());
        if !ty.supports_weakrefs() {
            return Err(GcError::WeakRefsUnsupported {
                type_name: ty.name().to_string(),
            });
        }

        let offset = ty.weaklist_offset();
        let bytes = entry
            .payload
            .as_mut_slice()
            .get_mut(offset..offset + POINTER_WIDTH)
            .ok_or_else(|| GcError::InvalidArgument(format!("weak slot of {} outside payload", id)))?;

        let ptr = bytes.as_mut_ptr() as *mut usize;
        debug_assert_eq!(ptr as usize % std::mem::align_of::<usize>(), 0);
        // SAFETY: payload blocks are pointer-aligned, the offset is
        // pointer-aligned, the bytes are initialized and exclusively borrowed.
        Ok(unsafe { &mut *ptr })
    }

    /// Report every object referenced from `id`'s payload
    pub fn traverse(&self, id: ObjectId, visitor: &mut dyn Visitor) -> Result<Visit> {
        let entry = self.entry(id)?;
        Ok(match entry.header.ty().traverse_fn() {
            Some(traverse) => traverse(&entry.header, entry.payload.as_slice(), visitor),
            None => Visit::Continue(()),
        })
    }

    // === Tracking ===

    pub(crate) fn gc_slot(&self, id: ObjectId) -> Result<usize> {
        let entry = self.entry(id)?;
        entry.gc_slot.ok_or_else(|| GcError::NotGcType {
            type_name: entry.header.type_name().to_string(),
        })
    }

    /// Route invariant violations through the fatal path
    pub(crate) fn check<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_bug() {
                self.logger.log(AllocEvent::InvariantViolation {
                    operation: operation.to_string(),
                    detail: err.to_string(),
                });
            }
        }
        or_fatal(self.policy, result)
    }

    /// Link into generation 0; fatal if already tracked
    pub fn track(&mut self, id: ObjectId) -> Result<()> {
        let result = self.try_track(id);
        self.check("track", result)
    }

    /// Link into generation 0, reporting misuse as an error
    pub fn try_track(&mut self, id: ObjectId) -> Result<()> {
        let slot = self.gc_slot(id)?;
        if !self.tracking.track(slot) {
            return Err(GcError::AlreadyTracked { id });
        }
        log::trace!("Tracked {}", id);
        self.logger.log_with(LogLevel::Trace, || AllocEvent::Tracked { id });
        Ok(())
    }

    /// Unlink from generation 0; fatal if not tracked
    pub fn untrack(&mut self, id: ObjectId) -> Result<()> {
        let result = self.try_untrack(id);
        self.check("untrack", result)
    }

    /// Unlink from generation 0, reporting misuse as an error
    pub fn try_untrack(&mut self, id: ObjectId) -> Result<()> {
        let slot = self.gc_slot(id)?;
        if !self.tracking.untrack(slot) {
            return Err(GcError::NotTracked { id });
        }
        log::trace!("Untracked {}", id);
        self.logger.log_with(LogLevel::Trace, || AllocEvent::Untracked { id });
        Ok(())
    }

    pub fn is_tracked(&self, id: ObjectId) -> bool {
        self.gc_slot(id)
            .map(|slot| self.tracking.state(slot).is_tracked())
            .unwrap_or(false)
    }

    pub fn state(&self, id: ObjectId) -> Result<TrackState> {
        Ok(self.tracking.state(self.gc_slot(id)?))
    }

    /// GC eligibility of one instance, honoring the type's predicate
    pub fn object_is_gc(&self, id: ObjectId) -> bool {
        self.entry(id)
            .map(|entry| {
                entry
                    .header
                    .ty()
                    .instance_is_gc(&entry.header, entry.payload.as_slice())
            })
            .unwrap_or(false)
    }

    /// Cheap filter: `false` means the object cannot be in generation 0
    pub fn may_be_tracked(&self, id: ObjectId) -> bool {
        let Ok(entry) = self.entry(id) else {
            return false;
        };
        self.object_is_gc(id)
            && (entry.header.ty().tracking() == TrackingPolicy::Eager || self.is_tracked(id))
    }

    /// Objects currently in generation 0, in ring order
    pub fn tracked_ids(&self) -> Vec<ObjectId> {
        self.tracking
            .iter()
            .filter_map(|slot| self.tracking.head(slot).owner())
            .collect()
    }

    /// Generation-0 length; walks the ring
    pub fn tracked_count(&self) -> usize {
        self.tracking.len()
    }

    /// Check ring structure and that every head belongs to its object
    pub fn verify_ring(&self) -> Result<usize> {
        let len = self.tracking.verify()?;
        for slot in self.tracking.iter() {
            let owned = self
                .tracking
                .head(slot)
                .owner()
                .and_then(|id| self.entry(id).ok())
                .is_some_and(|entry| entry.gc_slot == Some(slot));
            if !owned {
                return Err(GcError::CorruptRing {
                    slot,
                    reason: "head has no live owner".to_string(),
                });
            }
        }
        Ok(len)
    }

    // === Resize and release ===

    /// Resize a variable-size object to `items` items
    ///
    /// The handle, track state and ring position are preserved. On
    /// `OutOfMemory` the object is left untouched.
    pub fn resize(&mut self, id: ObjectId, items: usize) -> Result<ObjectId> {
        let result = self.try_resize(id, items);
        self.check("resize", result)
    }

    fn try_resize(&mut self, id: ObjectId, items: usize) -> Result<ObjectId> {
        let entry = self.entry(id)?;
        if entry.header.item_count().is_none() {
            return Err(GcError::InvalidArgument(format!(
                "{} of type '{}' is not variable-size",
                id,
                entry.header.type_name()
            )));
        }
        let Some(new_size) = layout::var_size(entry.header.ty(), items) else {
            return Err(self.out_of_memory(usize::MAX));
        };

        let entry = self.entry_mut(id)?;
        let old_size = entry.payload.size();
        if !entry.payload.resize(new_size) {
            return Err(self.out_of_memory(new_size));
        }
        entry.header.set_item_count(items);

        log::debug!("Resized {} from {} to {} bytes", id, old_size, new_size);
        self.logger.log_with(LogLevel::Debug, || AllocEvent::Resized {
            id: Some(id),
            old_size,
            new_size,
        });
        Ok(id)
    }

    /// Release an untracked object; fatal if it is still tracked
    pub fn free(&mut self, id: ObjectId) -> Result<()> {
        let result = self.try_free(id);
        self.check("free", result)
    }

    /// Release an untracked object, reporting misuse as an error
    pub fn try_free(&mut self, id: ObjectId) -> Result<()> {
        if self.is_tracked(id) {
            return Err(GcError::StillTracked { id });
        }
        self.remove(id).map(drop)
    }

    /// Untrack if needed, then release
    pub fn gc_del(&mut self, id: ObjectId) -> Result<()> {
        if self.is_tracked(id) {
            self.untrack(id)?;
        }
        self.free(id)
    }

    /// Detach an object from the heap, keeping its header and payload
    pub(crate) fn take(&mut self, id: ObjectId) -> Result<(ObjectHeader, RawBlock)> {
        if self.is_tracked(id) {
            self.untrack(id)?;
        }
        let result = self.remove(id);
        let entry = self.check("take", result)?;
        Ok((entry.header, entry.payload))
    }

    fn remove(&mut self, id: ObjectId) -> Result<ObjectEntry> {
        self.entry(id)?;
        let slot = &mut self.slots[id.index() as usize];
        let entry = slot.entry.take().ok_or(GcError::StaleHandle { id })?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.free_slots.push(id.index());
        self.live -= 1;

        if let Some(gc_slot) = entry.gc_slot {
            self.tracking.release_head(gc_slot);
        }

        let size = entry.payload.size();
        log::debug!("Freed {} {} ({} bytes)", entry.header.type_name(), id, size);
        self.logger.log_with(LogLevel::Debug, || AllocEvent::Freed {
            id: Some(id),
            type_name: entry.header.type_name().to_string(),
            size,
        });
        Ok(entry)
    }
}

fn require_gc(ty: &TypeDescriptor) -> Result<()> {
    if ty.supports_gc() {
        Ok(())
    } else {
        Err(GcError::NotGcType {
            type_name: ty.name().to_string(),
        })
    }
}
