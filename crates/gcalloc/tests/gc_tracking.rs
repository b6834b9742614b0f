//! Tracking Tests - generation-0 state machine
//!
//! These tests verify the track/untrack state machine:
//! - Ring circularity after arbitrary valid interleavings
//! - Tail insertion and O(1) unlink
//! - Fatal handling of double track / double untrack
//! - Resize keeping ring position and state
//!
//! ============================================================================
//! EACH TEST FINDS SPECIFIC RING CORRUPTION BUGS - DO NOT WEAKEN ASSERTIONS
//! ============================================================================

mod common;

use common::{
    assert_ring_consistent, assert_ring_order, int_type, list_type, maybe_gc_type, node_type,
    tuple_type, AllocFixture,
};
use gcalloc::logging::AllocEvent;
use gcalloc::{GcError, ObjectId, ObjectRef, TrackState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// ============================================================================
/// END TO END
/// ============================================================================

/// Track, untrack and free one object
///
/// **Bug this finds:** Ring length bookkeeping, fatal path firing on valid use
#[test]
fn test_track_untrack_free_roundtrip() {
    // Arrange
    let mut fixture = AllocFixture::new();
    let obj = fixture.ctx.gc_new(&node_type()).unwrap();
    assert!(!fixture.ctx.is_tracked(&obj), "objects start untracked");

    // Act & Assert
    fixture.ctx.track(&obj).unwrap();
    assert_eq!(fixture.ctx.heap().tracked_count(), 1);
    assert!(fixture.ctx.is_tracked(&obj));

    fixture.ctx.untrack(&obj).unwrap();
    assert_eq!(fixture.ctx.heap().tracked_count(), 0);
    assert!(fixture.ctx.heap().tracking().is_empty());

    fixture.ctx.free(obj).unwrap();
    assert_eq!(fixture.ctx.heap().live_objects(), 0);
}

/// **Bug this finds:** Insertion at the head instead of the tail
#[test]
fn test_track_appends_in_order() {
    let mut fixture = AllocFixture::new();
    let ty = node_type();
    let ids: Vec<ObjectId> = (0..5).map(|_| fixture.tracked_object(&ty)).collect();

    assert_ring_order(fixture.ctx.heap(), &ids, "after five tracks");
    assert_ring_consistent(fixture.ctx.heap(), "after five tracks");
}

/// **Bug this finds:** Unlink not splicing neighbours together
#[test]
fn test_untrack_from_every_position() {
    let mut fixture = AllocFixture::new();
    let ty = node_type();
    let ids: Vec<ObjectId> = (0..4).map(|_| fixture.tracked_object(&ty)).collect();

    fixture.heap().untrack(ids[3]).unwrap();
    fixture.heap().untrack(ids[0]).unwrap();
    assert_ring_order(fixture.ctx.heap(), &[ids[1], ids[2]], "after tail and head untrack");

    fixture.heap().untrack(ids[1]).unwrap();
    assert_ring_order(fixture.ctx.heap(), &[ids[2]], "after middle untrack");
    assert_ring_consistent(fixture.ctx.heap(), "after middle untrack");

    fixture.heap().track(ids[0]).unwrap();
    assert_ring_order(fixture.ctx.heap(), &[ids[2], ids[0]], "retrack goes to tail");
}

/// Random valid interleavings of track/untrack
///
/// **Bug this finds:** Any link update that breaks circularity in rare orders
/// **Invariant verified:** ring == set of tracked objects after every step
#[test]
fn test_random_interleavings_keep_ring_circular() {
    let mut rng = StdRng::seed_from_u64(0x6763_616c);
    let mut fixture = AllocFixture::new();
    let ty = node_type();
    let ids: Vec<ObjectId> = (0..48).map(|_| fixture.gc_object(&ty)).collect();
    let mut tracked = vec![false; ids.len()];

    for step in 0..4_000 {
        let i = rng.gen_range(0..ids.len());
        if tracked[i] {
            fixture.heap().untrack(ids[i]).unwrap();
        } else {
            fixture.heap().track(ids[i]).unwrap();
        }
        tracked[i] = !tracked[i];

        if step % 97 == 0 {
            assert_ring_consistent(fixture.ctx.heap(), &format!("step {}", step));
        }
    }

    let expected = tracked.iter().filter(|&&t| t).count();
    assert_eq!(fixture.ctx.heap().tracked_count(), expected);
    for (i, &id) in ids.iter().enumerate() {
        assert_eq!(fixture.ctx.heap().is_tracked(id), tracked[i], "object {} state", id);
    }
    assert_ring_consistent(fixture.ctx.heap(), "end of run");
}

/// **Bug this finds:** Ring not shrinking back to its pre-track size
#[test]
fn test_track_untrack_restores_length() {
    let mut fixture = AllocFixture::new();
    let ty = node_type();
    for _ in 0..3 {
        fixture.tracked_object(&ty);
    }
    let extra = fixture.gc_object(&ty);
    let before = fixture.ctx.heap().tracked_count();

    fixture.heap().track(extra).unwrap();
    fixture.heap().untrack(extra).unwrap();

    assert_eq!(fixture.ctx.heap().tracked_count(), before);
    assert_eq!(fixture.ctx.heap().state(extra).unwrap(), TrackState::Untracked);
}

/// ============================================================================
/// FATAL CONDITIONS
/// ============================================================================

/// **Bug this finds:** Double track silently corrupting the ring
#[test]
#[should_panic(expected = "GC object already tracked")]
fn test_double_track_is_fatal() {
    let mut fixture = AllocFixture::new();
    let obj = ObjectRef::Sequential(fixture.tracked_object(&node_type()));
    let _ = fixture.ctx.track(&obj);
}

/// **Bug this finds:** Double untrack silently corrupting the ring
#[test]
#[should_panic(expected = "GC object not tracked")]
fn test_untrack_untracked_is_fatal() {
    let mut fixture = AllocFixture::new();
    let obj = ObjectRef::Sequential(fixture.gc_object(&node_type()));
    let _ = fixture.ctx.untrack(&obj);
}

/// **Bug this finds:** Freeing an object still linked into generation 0
#[test]
#[should_panic(expected = "still tracked")]
fn test_free_tracked_is_fatal() {
    let mut fixture = AllocFixture::new();
    let id = fixture.tracked_object(&node_type());
    let _ = fixture.ctx.free(ObjectRef::Sequential(id));
}

/// **Bug this finds:** Use-after-free through a recycled slot
#[test]
#[should_panic(expected = "Stale object handle")]
fn test_stale_handle_is_fatal() {
    let mut fixture = AllocFixture::new();
    let ty = node_type();
    let old = fixture.gc_object(&ty);
    fixture.heap().free(old).unwrap();
    let _recycled = fixture.gc_object(&ty);

    let _ = fixture.heap().track(old);
}

/// Structured errors instead of the fatal path
///
/// **Bug this finds:** try_* variants mutating state before failing
#[test]
fn test_try_variants_report_errors() {
    let mut fixture = AllocFixture::new();
    let id = fixture.gc_object(&node_type());

    assert!(matches!(
        fixture.heap().try_untrack(id),
        Err(GcError::NotTracked { .. })
    ));
    fixture.heap().try_track(id).unwrap();
    let err = fixture.heap().try_track(id).unwrap_err();
    assert!(err.is_bug());
    assert!(matches!(err, GcError::AlreadyTracked { .. }));
    assert!(matches!(
        fixture.heap().try_free(id),
        Err(GcError::StillTracked { .. })
    ));

    assert_eq!(fixture.ctx.heap().tracked_count(), 1, "failed calls must not mutate");
    assert_ring_consistent(fixture.ctx.heap(), "after failed try_* calls");
}

/// **Bug this finds:** Invariant violations not reaching the event log
#[test]
fn test_violation_is_logged() {
    let mut fixture = AllocFixture::new();
    let id = fixture.tracked_object(&node_type());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = fixture.heap().track(id);
    }));

    assert!(result.is_err());
    let events = fixture.ctx.logger().events();
    assert!(events.iter().any(|e| matches!(
        &e.event,
        AllocEvent::InvariantViolation { operation, .. } if operation == "track"
    )));
}

/// **Bug this finds:** Non-GC objects getting linked into generation 0
#[test]
fn test_track_non_gc_type_is_caller_error() {
    let mut fixture = AllocFixture::new();
    let obj = fixture.ctx.new_object(&int_type()).unwrap();

    let err = fixture.ctx.track(&obj).unwrap_err();

    assert!(matches!(err, GcError::NotGcType { .. }));
    assert!(!err.is_bug());
    assert!(fixture.ctx.heap().tracking().is_empty());
}

/// ============================================================================
/// PREDICATES
/// ============================================================================

/// **Bug this finds:** may_be_tracked ignoring lazily tracked types
#[test]
fn test_may_be_tracked_with_lazy_policy() {
    let mut fixture = AllocFixture::new();
    let list = fixture.ctx.gc_new_var(&list_type(), 1).unwrap();
    let tuple = fixture.ctx.gc_new_var(&tuple_type(), 1).unwrap();
    let int = fixture.ctx.new_object(&int_type()).unwrap();

    assert!(fixture.ctx.may_be_tracked(&list), "eager type may always be tracked");
    assert!(!fixture.ctx.may_be_tracked(&tuple), "untracked lazy instance");
    assert!(!fixture.ctx.may_be_tracked(&int));

    fixture.ctx.track(&tuple).unwrap();
    assert!(fixture.ctx.may_be_tracked(&tuple));
}

/// **Bug this finds:** Per-instance GC predicate not consulted
#[test]
fn test_object_is_gc_uses_instance_predicate() {
    let mut fixture = AllocFixture::new();
    let obj = fixture.ctx.gc_new(&maybe_gc_type()).unwrap();
    let id = obj.as_sequential().unwrap();

    assert!(!fixture.ctx.object_is_gc(&obj));
    assert!(!fixture.ctx.may_be_tracked(&obj));

    fixture.heap().payload_mut(id).unwrap()[0] = 1;
    assert!(fixture.ctx.object_is_gc(&obj));
    assert!(fixture.ctx.may_be_tracked(&obj));
}

/// ============================================================================
/// RESIZE
/// ============================================================================

/// **Bug this finds:** Resize dropping the object out of the ring or moving it
#[test]
fn test_resize_keeps_ring_position_and_state() {
    let mut fixture = AllocFixture::new();
    let node = node_type();
    let list = list_type();
    let first = fixture.tracked_object(&node);
    let grown = fixture.heap().gc_new_var(&list, 1).unwrap();
    fixture.heap().track(grown).unwrap();
    let last = fixture.tracked_object(&node);
    fixture.heap().payload_mut(grown).unwrap()[0] = 0xEE;

    let resized = fixture.ctx.resize(ObjectRef::Sequential(grown), 64).unwrap();

    assert_eq!(resized.as_sequential(), Some(grown), "handle must stay stable");
    assert_ring_order(fixture.ctx.heap(), &[first, grown, last], "after resize");
    assert_eq!(fixture.ctx.heap().state(grown).unwrap(), TrackState::Reachable);
    let heap = fixture.ctx.heap();
    assert_eq!(heap.header(grown).unwrap().item_count(), Some(64));
    assert_eq!(heap.payload(grown).unwrap()[0], 0xEE, "prefix must survive");
    assert_ring_consistent(heap, "after resize");
}

/// **Bug this finds:** Failed resize leaving a half-updated object
#[test]
fn test_failed_resize_leaves_object_untouched() {
    let mut fixture = AllocFixture::new();
    let id = fixture.heap().gc_new_var(&list_type(), 2).unwrap();
    fixture.heap().track(id).unwrap();
    let size_before = fixture.ctx.heap().payload(id).unwrap().len();

    fixture.allocator.set_failing(true);
    let result = fixture.ctx.resize(ObjectRef::Sequential(id), 1_000);
    fixture.allocator.set_failing(false);

    assert!(matches!(result, Err(GcError::OutOfMemory { .. })));
    let heap = fixture.ctx.heap();
    assert_eq!(heap.header(id).unwrap().item_count(), Some(2));
    assert_eq!(heap.payload(id).unwrap().len(), size_before);
    assert!(heap.is_tracked(id));
}

/// **Bug this finds:** Resize accepted on fixed-size objects
#[test]
fn test_resize_fixed_object_rejected() {
    let mut fixture = AllocFixture::new();
    let id = fixture.gc_object(&node_type());

    let result = fixture.ctx.resize(ObjectRef::Sequential(id), 3);

    assert!(matches!(result, Err(GcError::InvalidArgument(_))));
}

/// gc_del untracks before freeing
///
/// **Bug this finds:** gc_del leaving a dangling head in the ring
#[test]
fn test_gc_del_untracks_first() {
    let mut fixture = AllocFixture::new();
    let ty = node_type();
    let keep = fixture.tracked_object(&ty);
    let doomed = fixture.tracked_object(&ty);

    fixture.ctx.gc_del(ObjectRef::Sequential(doomed)).unwrap();

    assert_ring_order(fixture.ctx.heap(), &[keep], "after gc_del");
    assert!(!fixture.ctx.heap().contains(doomed));
}
