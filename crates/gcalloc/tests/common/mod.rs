//! Test Utilities for the gcalloc Test Suite
//!
//! Fixtures build a context whose invariant violations panic instead of
//! aborting, so `#[should_panic]` can observe them. Assertion helpers are
//! strict: any ring inconsistency is a bug.

#![allow(dead_code)]

use gcalloc::logging::LogLevel;
use gcalloc::object::{load_ref, ObjectHeader, Visit, Visitor};
use gcalloc::{
    AllocatorContext, AllocatorRef, Collector, FatalPolicy, GcAllocConfig, GcHeap, Generation0,
    ObjectId, ObjectRef, RawAllocator, SystemAllocator, TrackState, TrackingPolicy,
    TypeDescriptor,
};
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any blocking wait in a test
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// ============================================================================
/// ALLOCATORS
/// ============================================================================

/// System allocator that can be switched into failing every request
#[derive(Default)]
pub struct FailingAllocator {
    inner: SystemAllocator,
    failing: AtomicBool,
}

impl FailingAllocator {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn live_blocks(&self) -> usize {
        self.inner.live_blocks()
    }
}

impl RawAllocator for FailingAllocator {
    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        if self.failing.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.malloc(size)
    }

    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        if self.failing.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.realloc(ptr, size)
    }

    unsafe fn free(&self, ptr: Option<NonNull<u8>>) {
        self.inner.free(ptr)
    }
}

/// ============================================================================
/// FIXTURE
/// ============================================================================

/// Test fixture around an [`AllocatorContext`]
pub struct AllocFixture {
    pub ctx: AllocatorContext,
    pub allocator: Arc<FailingAllocator>,
    pub config: GcAllocConfig,
}

impl AllocFixture {
    /// Panicking fatal policy, trace-level event log
    ///
    /// **Bug this finds:** Configuration validation bugs, initialization failures
    pub fn new() -> Self {
        let config = GcAllocConfig {
            fatal_policy: FatalPolicy::Panic,
            log_level: LogLevel::Trace,
            ..GcAllocConfig::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: GcAllocConfig) -> Self {
        let allocator = Arc::new(FailingAllocator::default());
        let shared: AllocatorRef = allocator.clone();
        let ctx = AllocatorContext::with_allocator(config.clone(), shared)
            .expect("context creation should succeed with valid config");
        Self {
            ctx,
            allocator,
            config,
        }
    }

    pub fn heap(&mut self) -> &mut GcHeap {
        self.ctx.heap_mut()
    }

    /// Allocate a sequential GC object
    pub fn gc_object(&mut self, ty: &Arc<TypeDescriptor>) -> ObjectId {
        self.ctx
            .heap_mut()
            .gc_new(ty)
            .unwrap_or_else(|e| panic!("gc_new({}) failed: {}", ty.name(), e))
    }

    /// Allocate and track a sequential GC object
    pub fn tracked_object(&mut self, ty: &Arc<TypeDescriptor>) -> ObjectId {
        let id = self.gc_object(ty);
        self.ctx.heap_mut().track(id).expect("fresh object must track");
        id
    }

    /// Store a reference into `field` of `from`
    pub fn link(&mut self, from: ObjectId, field: usize, to: Option<ObjectId>) {
        let payload = self.ctx.heap_mut().payload_mut(from).expect("live object");
        assert!(
            gcalloc::object::store_ref(payload, field * 8, to),
            "field {} outside payload",
            field
        );
    }

    pub fn set_refcount(&mut self, id: ObjectId, refcount: isize) {
        self.ctx
            .heap_mut()
            .header_mut(id)
            .expect("live object")
            .set_refcount(refcount);
    }
}

/// ============================================================================
/// SAMPLE TYPES
/// ============================================================================

fn traverse_node(_: &ObjectHeader, payload: &[u8], visitor: &mut dyn Visitor) -> Visit {
    gcalloc::visit!(visitor, load_ref(payload, 0));
    gcalloc::visit!(visitor, load_ref(payload, 8));
    Visit::Continue(())
}

fn traverse_items(header: &ObjectHeader, payload: &[u8], visitor: &mut dyn Visitor) -> Visit {
    let items = header.item_count().unwrap_or(0);
    for i in 0..items {
        gcalloc::visit!(visitor, load_ref(payload, 16 + i * 8));
    }
    Visit::Continue(())
}

fn first_byte_set(_: &ObjectHeader, payload: &[u8]) -> bool {
    payload.first().is_some_and(|&b| b != 0)
}

/// Fixed-size GC type with two reference fields
pub fn node_type() -> Arc<TypeDescriptor> {
    TypeDescriptor::builder("node")
        .basic_size(16)
        .gc()
        .traverse(traverse_node)
        .build()
        .expect("node type")
}

/// Variable-size GC type: 16-byte prefix, 8-byte items
pub fn list_type() -> Arc<TypeDescriptor> {
    TypeDescriptor::builder("list")
        .basic_size(16)
        .item_size(8)
        .gc()
        .traverse(traverse_items)
        .build()
        .expect("list type")
}

/// Variable-size GC type whose instances may stay untracked
pub fn tuple_type() -> Arc<TypeDescriptor> {
    TypeDescriptor::builder("tuple")
        .basic_size(16)
        .item_size(8)
        .gc()
        .tracking(TrackingPolicy::Lazy)
        .traverse(traverse_items)
        .build()
        .expect("tuple type")
}

/// Atom without GC support
pub fn int_type() -> Arc<TypeDescriptor> {
    TypeDescriptor::builder("int")
        .basic_size(8)
        .build()
        .expect("int type")
}

/// GC type with a weak reference slot at offset 8
pub fn weakable_type() -> Arc<TypeDescriptor> {
    TypeDescriptor::builder("weakable")
        .basic_size(24)
        .gc()
        .weaklist_offset(8)
        .build()
        .expect("weakable type")
}

/// GC type opting out per instance while its first byte is zero
pub fn maybe_gc_type() -> Arc<TypeDescriptor> {
    TypeDescriptor::builder("maybe")
        .basic_size(8)
        .gc()
        .is_gc(first_byte_set)
        .build()
        .expect("maybe type")
}

/// ============================================================================
/// REFERENCE COLLECTOR
/// ============================================================================

/// Trial-deletion cycle detector over generation 0
///
/// Objects whose refcount is fully explained by references from other
/// generation-0 objects, and that are not reachable from one that is not,
/// are reclaimed.
#[derive(Default)]
pub struct TrialDeletion {
    /// States observed for each object right before returning
    pub observed: HashMap<ObjectId, TrackState>,
}

impl Collector for TrialDeletion {
    fn collect(&mut self, generation: &mut Generation0<'_>) -> Vec<ObjectId> {
        let ids = generation.ids();
        let members: HashSet<ObjectId> = ids.iter().copied().collect();

        let mut refs: HashMap<ObjectId, usize> = ids
            .iter()
            .map(|&id| (id, generation.refcount(id).expect("tracked") as usize))
            .collect();

        for &id in &ids {
            let mut internal = Vec::new();
            generation
                .traverse(id, &mut |target: ObjectId| {
                    if members.contains(&target) {
                        internal.push(target);
                    }
                    Visit::Continue(())
                })
                .expect("tracked");
            for target in internal {
                if let Some(count) = refs.get_mut(&target) {
                    *count = count.saturating_sub(1);
                }
            }
        }

        let mut reachable: HashSet<ObjectId> =
            refs.iter().filter(|&(_, &n)| n > 0).map(|(&id, _)| id).collect();
        let mut work: Vec<ObjectId> = reachable.iter().copied().collect();
        while let Some(id) = work.pop() {
            let mut found = Vec::new();
            generation
                .traverse(id, &mut |target: ObjectId| {
                    found.push(target);
                    Visit::Continue(())
                })
                .expect("tracked");
            for target in found {
                if members.contains(&target) && reachable.insert(target) {
                    work.push(target);
                }
            }
        }

        let mut doomed = Vec::new();
        for &id in &ids {
            let state = if reachable.contains(&id) {
                TrackState::Refs(refs[&id])
            } else {
                doomed.push(id);
                TrackState::TentativelyUnreachable
            };
            generation.set_state(id, state).expect("tracked");
            self.observed.insert(id, generation.state(id).expect("tracked"));
        }
        doomed
    }
}

/// ============================================================================
/// STRICT ASSERTION HELPERS
/// ============================================================================

/// Assert the ring is circular and matches the tracked count
///
/// **Bug this finds:** Broken prev/next links, heads left in the ring after untrack
/// **Tolerance:** ZERO
#[track_caller]
pub fn assert_ring_consistent(heap: &GcHeap, context: &str) {
    let verified = heap
        .verify_ring()
        .unwrap_or_else(|e| panic!("{}: ring verification failed: {}", context, e));
    assert_eq!(
        verified,
        heap.tracked_count(),
        "{}: verified length {} differs from walked length {}",
        context,
        verified,
        heap.tracked_count()
    );
    assert_eq!(
        heap.tracking().is_empty(),
        verified == 0,
        "{}: is_empty disagrees with ring length {}",
        context,
        verified
    );
}

/// Assert generation 0 holds exactly `expected`, in order
///
/// **Bug this finds:** Insertion at the wrong end, lost or duplicated members
#[track_caller]
pub fn assert_ring_order(heap: &GcHeap, expected: &[ObjectId], context: &str) {
    assert_eq!(
        heap.tracked_ids(),
        expected,
        "{}: generation-0 order is wrong",
        context
    );
}

/// Assert an object reference is untracked in every sense
#[track_caller]
pub fn assert_untracked(ctx: &AllocatorContext, object: &ObjectRef, context: &str) {
    assert!(
        !ctx.is_tracked(object),
        "{}: {:?} unexpectedly tracked",
        context,
        object
    );
}
