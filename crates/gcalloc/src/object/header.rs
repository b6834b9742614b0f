//! Object Header - refcount, type and item count
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ refcount (isize)             │  1 after init
//! ├──────────────────────────────┤
//! │ type (Arc<TypeDescriptor>)   │
//! ├──────────────────────────────┤
//! │ item count (Option<usize>)   │  variable-size objects only
//! └──────────────────────────────┘
//! ```

use crate::error::{GcError, Result};
use crate::object::layout;
use crate::object::types::TypeDescriptor;
use std::sync::Arc;

/// Object Header
///
/// Owned by exactly one object; cloned only when an object is bridged to
/// the other execution context.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    refcount: isize,
    ty: Arc<TypeDescriptor>,
    item_count: Option<usize>,
}

impl ObjectHeader {
    /// Header for a fixed-size object, holding its first reference
    pub fn init(ty: &Arc<TypeDescriptor>) -> Self {
        Self {
            refcount: 1,
            ty: Arc::clone(ty),
            item_count: None,
        }
    }

    /// Header for a variable-size object with `items` items
    pub fn init_var(ty: &Arc<TypeDescriptor>, items: usize) -> Result<Self> {
        if !ty.is_var_sized() {
            return Err(GcError::InvalidArgument(format!(
                "type '{}' has no item size",
                ty.name()
            )));
        }

        Ok(Self {
            refcount: 1,
            ty: Arc::clone(ty),
            item_count: Some(items),
        })
    }

    #[inline]
    pub fn refcount(&self) -> isize {
        self.refcount
    }

    #[inline]
    pub fn set_refcount(&mut self, refcount: isize) {
        self.refcount = refcount;
    }

    #[inline]
    pub fn ty(&self) -> &Arc<TypeDescriptor> {
        &self.ty
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    #[inline]
    pub fn item_count(&self) -> Option<usize> {
        self.item_count
    }

    pub(crate) fn set_item_count(&mut self, items: usize) {
        self.item_count = Some(items);
    }

    /// Payload size this header describes
    ///
    /// `None` only if the variable size overflows.
    pub fn object_size(&self) -> Option<usize> {
        match self.item_count {
            Some(items) => layout::var_size(&self.ty, items),
            None => Some(layout::fixed_size(&self.ty)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_sets_single_reference() {
        let ty = TypeDescriptor::builder("point").basic_size(16).build().unwrap();
        let header = ObjectHeader::init(&ty);

        assert_eq!(header.refcount(), 1);
        assert_eq!(header.type_name(), "point");
        assert_eq!(header.item_count(), None);
        assert_eq!(header.object_size(), Some(16));
    }

    #[test]
    fn test_init_var_records_items() {
        let ty = TypeDescriptor::builder("bytes")
            .basic_size(16)
            .item_size(1)
            .build()
            .unwrap();
        let header = ObjectHeader::init_var(&ty, 5).unwrap();

        assert_eq!(header.item_count(), Some(5));
        assert_eq!(header.refcount(), 1);
    }

    #[test]
    fn test_init_var_requires_item_size() {
        let ty = TypeDescriptor::builder("point").basic_size(16).build().unwrap();
        assert!(matches!(
            ObjectHeader::init_var(&ty, 2),
            Err(GcError::InvalidArgument(_))
        ));
    }
}
