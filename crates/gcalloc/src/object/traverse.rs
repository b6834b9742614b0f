//! Traversal helpers
//!
//! A type's [`TraverseFn`](crate::object::TraverseFn) reports each object its
//! payload refers to. References are stored in payloads as little-endian
//! `u64` words ([`store_ref`] / [`load_ref`]), 0 meaning empty.
//!
//! ```
//! use gcalloc::object::{load_ref, ObjectHeader, Visit, Visitor};
//! use gcalloc::visit;
//!
//! // Pair with two reference fields at offsets 0 and 8
//! fn traverse_pair(_: &ObjectHeader, payload: &[u8], visitor: &mut dyn Visitor) -> Visit {
//!     visit!(visitor, load_ref(payload, 0));
//!     visit!(visitor, load_ref(payload, 8));
//!     Visit::Continue(())
//! }
//! # let _ = traverse_pair;
//! ```

use crate::object::id::ObjectId;
use std::ops::ControlFlow;

/// Outcome of a visit; `Break` stops the traversal
pub type Visit = ControlFlow<()>;

/// Callback handed to a traverse function
pub trait Visitor {
    fn visit(&mut self, target: ObjectId) -> Visit;
}

impl<F> Visitor for F
where
    F: FnMut(ObjectId) -> Visit,
{
    fn visit(&mut self, target: ObjectId) -> Visit {
        self(target)
    }
}

/// Visit an optional reference, returning early if the visitor breaks
///
/// Empty references are skipped.
#[macro_export]
macro_rules! visit {
    ($visitor:expr, $target:expr) => {
        if let ::core::option::Option::Some(target) = $target {
            if let ::core::ops::ControlFlow::Break(()) =
                $crate::object::Visitor::visit(&mut *$visitor, target)
            {
                return ::core::ops::ControlFlow::Break(());
            }
        }
    };
}

const REF_WIDTH: usize = std::mem::size_of::<u64>();

/// Read a reference stored at `offset`
///
/// Out-of-range offsets read as empty.
pub fn load_ref(payload: &[u8], offset: usize) -> Option<ObjectId> {
    let bytes = payload.get(offset..offset.checked_add(REF_WIDTH)?)?;
    let mut word = [0u8; REF_WIDTH];
    word.copy_from_slice(bytes);
    ObjectId::from_bits(u64::from_le_bytes(word))
}

/// Write a reference at `offset`
///
/// Returns `false` if the slot does not fit in the payload.
pub fn store_ref(payload: &mut [u8], offset: usize, target: Option<ObjectId>) -> bool {
    let Some(end) = offset.checked_add(REF_WIDTH) else {
        return false;
    };
    let Some(slot) = payload.get_mut(offset..end) else {
        return false;
    };
    let bits = target.map_or(0, ObjectId::to_bits);
    slot.copy_from_slice(&bits.to_le_bytes());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectHeader;

    fn traverse_two(_: &ObjectHeader, payload: &[u8], visitor: &mut dyn Visitor) -> Visit {
        visit!(visitor, load_ref(payload, 0));
        visit!(visitor, load_ref(payload, 8));
        Visit::Continue(())
    }

    #[test]
    fn test_refs_in_payload() {
        let mut payload = [0u8; 16];
        let id = ObjectId::new(4, 2);

        assert!(store_ref(&mut payload, 8, Some(id)));
        assert!(!store_ref(&mut payload, 12, Some(id)));

        assert_eq!(load_ref(&payload, 0), None);
        assert_eq!(load_ref(&payload, 8), Some(id));
        assert_eq!(load_ref(&payload, 100), None);
    }

    #[test]
    fn test_visit_skips_empty_and_stops_on_break() {
        let ty = crate::TypeDescriptor::builder("pair").basic_size(16).build().unwrap();
        let header = ObjectHeader::init(&ty);
        let mut payload = [0u8; 16];
        store_ref(&mut payload, 0, Some(ObjectId::new(1, 1)));
        store_ref(&mut payload, 8, Some(ObjectId::new(2, 1)));

        let mut seen = Vec::new();
        let mut stop_after_first = |id: ObjectId| {
            seen.push(id);
            Visit::Break(())
        };
        let result = traverse_two(&header, &payload, &mut stop_after_first);

        assert!(result.is_break());
        assert_eq!(seen, vec![ObjectId::new(1, 1)]);

        let mut all = Vec::new();
        store_ref(&mut payload, 0, None);
        let result = traverse_two(&header, &payload, &mut |id: ObjectId| {
            all.push(id);
            Visit::Continue(())
        });
        assert!(result.is_continue());
        assert_eq!(all, vec![ObjectId::new(2, 1)]);
    }
}
