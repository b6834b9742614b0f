//! Type Descriptors
//!
//! A [`TypeDescriptor`] fixes the shape of its instances: payload size, item
//! size for variable-size objects, GC eligibility, and where the weak
//! reference slot lives. Descriptors are built once and shared behind `Arc`.

use crate::error::{GcError, Result};
use crate::object::header::ObjectHeader;
use crate::object::traverse::{Visit, Visitor};
use crate::util::{Alignment, POINTER_WIDTH};
use std::fmt;
use std::sync::Arc;

/// Per-instance GC opt-out predicate
pub type IsGcFn = fn(&ObjectHeader, &[u8]) -> bool;

/// Reports every object referenced from an instance's payload
pub type TraverseFn = fn(&ObjectHeader, &[u8], &mut dyn Visitor) -> Visit;

/// How instances of a GC type enter generation 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingPolicy {
    /// Tracked as soon as they are created
    #[default]
    Eager,
    /// May stay untracked for their whole life (immutable containers that
    /// only hold atoms, for example)
    Lazy,
}

/// TypeDescriptor - immutable shape of a family of objects
pub struct TypeDescriptor {
    name: String,
    basic_size: usize,
    item_size: usize,
    supports_gc: bool,
    weaklist_offset: usize,
    is_gc: Option<IsGcFn>,
    tracking: TrackingPolicy,
    traverse: Option<TraverseFn>,
}

impl TypeDescriptor {
    /// Start describing a type
    ///
    /// # Examples
    /// ```
    /// use gcalloc::TypeDescriptor;
    ///
    /// let list = TypeDescriptor::builder("list")
    ///     .basic_size(16)
    ///     .item_size(8)
    ///     .gc()
    ///     .build()
    ///     .unwrap();
    ///
    /// assert!(list.is_var_sized());
    /// assert!(list.supports_gc());
    /// ```
    pub fn builder(name: impl Into<String>) -> TypeBuilder {
        TypeBuilder {
            name: name.into(),
            basic_size: 0,
            item_size: 0,
            supports_gc: false,
            weaklist_offset: 0,
            is_gc: None,
            tracking: TrackingPolicy::Eager,
            traverse: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed part of the payload in bytes
    #[inline]
    pub fn basic_size(&self) -> usize {
        self.basic_size
    }

    /// Bytes per item; 0 for fixed-size types
    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    #[inline]
    pub fn is_var_sized(&self) -> bool {
        self.item_size > 0
    }

    #[inline]
    pub fn supports_gc(&self) -> bool {
        self.supports_gc
    }

    /// Payload offset of the weak reference slot; 0 when unsupported
    #[inline]
    pub fn weaklist_offset(&self) -> usize {
        self.weaklist_offset
    }

    #[inline]
    pub fn supports_weakrefs(&self) -> bool {
        self.weaklist_offset > 0
    }

    #[inline]
    pub fn tracking(&self) -> TrackingPolicy {
        self.tracking
    }

    pub fn traverse_fn(&self) -> Option<TraverseFn> {
        self.traverse
    }

    /// Whether one instance takes part in collection
    pub fn instance_is_gc(&self, header: &ObjectHeader, payload: &[u8]) -> bool {
        self.supports_gc && self.is_gc.map_or(true, |is_gc| is_gc(header, payload))
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("basic_size", &self.basic_size)
            .field("item_size", &self.item_size)
            .field("supports_gc", &self.supports_gc)
            .field("weaklist_offset", &self.weaklist_offset)
            .field("tracking", &self.tracking)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TypeDescriptor`]
#[must_use]
pub struct TypeBuilder {
    name: String,
    basic_size: usize,
    item_size: usize,
    supports_gc: bool,
    weaklist_offset: usize,
    is_gc: Option<IsGcFn>,
    tracking: TrackingPolicy,
    traverse: Option<TraverseFn>,
}

impl TypeBuilder {
    pub fn basic_size(mut self, size: usize) -> Self {
        self.basic_size = size;
        self
    }

    pub fn item_size(mut self, size: usize) -> Self {
        self.item_size = size;
        self
    }

    /// Mark instances as collectable
    pub fn gc(mut self) -> Self {
        self.supports_gc = true;
        self
    }

    pub fn weaklist_offset(mut self, offset: usize) -> Self {
        self.weaklist_offset = offset;
        self
    }

    pub fn is_gc(mut self, predicate: IsGcFn) -> Self {
        self.is_gc = Some(predicate);
        self
    }

    pub fn tracking(mut self, policy: TrackingPolicy) -> Self {
        self.tracking = policy;
        self
    }

    pub fn traverse(mut self, traverse: TraverseFn) -> Self {
        self.traverse = Some(traverse);
        self
    }

    /// Validate and freeze the descriptor
    pub fn build(self) -> Result<Arc<TypeDescriptor>> {
        if self.basic_size == 0 {
            return Err(GcError::InvalidArgument(format!(
                "type '{}' has zero basic size",
                self.name
            )));
        }

        if self.weaklist_offset > 0 {
            let fits = self
                .weaklist_offset
                .checked_add(POINTER_WIDTH)
                .is_some_and(|end| end <= self.basic_size);
            if !Alignment::is_aligned(self.weaklist_offset, POINTER_WIDTH) || !fits {
                return Err(GcError::InvalidArgument(format!(
                    "type '{}': weak list offset {} must be pointer-aligned and inside {} bytes",
                    self.name, self.weaklist_offset, self.basic_size
                )));
            }
        }

        Ok(Arc::new(TypeDescriptor {
            name: self.name,
            basic_size: self.basic_size,
            item_size: self.item_size,
            supports_gc: self.supports_gc,
            weaklist_offset: self.weaklist_offset,
            is_gc: self.is_gc,
            tracking: self.tracking,
            traverse: self.traverse,
        }))
    }
}
