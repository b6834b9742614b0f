//! Allocator Module - Raw Allocation Façade
//!
//! Thin layer over a process allocator. Every object payload in gcalloc is a
//! [`RawBlock`] obtained through a [`RawAllocator`].
//!
//! ## Contract
//!
//! - `malloc(0)` returns a unique non-null pointer
//! - `realloc(None, n)` behaves exactly like `malloc(n)`
//! - `realloc(Some(p), 0)` returns non-null and does not free `p`
//! - `free(None)` is a no-op
//! - failure is reported only as `None`; nothing is logged or raised

pub mod system;

pub use system::SystemAllocator;

use std::ptr::NonNull;
use std::sync::Arc;

/// Raw memory provider behind every object
///
/// Implementations must be usable from any thread: concurrent-context
/// objects release their payload on whichever thread drops them last.
pub trait RawAllocator: Send + Sync {
    /// Allocate `size` bytes, at least pointer-aligned
    ///
    /// Contents are unspecified. Returns `None` on failure.
    fn malloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Resize a block
    ///
    /// On failure returns `None` and `ptr` stays valid and unchanged.
    ///
    /// # Safety
    /// `ptr` must be `None` or a live block returned by this allocator.
    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>>;

    /// Release a block
    ///
    /// # Safety
    /// `ptr` must be `None` or a live block returned by this allocator, and
    /// must not be used afterwards.
    unsafe fn free(&self, ptr: Option<NonNull<u8>>);
}

/// Shared handle to an allocator
pub type AllocatorRef = Arc<dyn RawAllocator>;

/// An owned block of raw memory
///
/// The block is zero-filled on creation and on growth, so its bytes can be
/// handed out as slices. It is returned to its allocator on drop.
pub struct RawBlock {
    ptr: NonNull<u8>,
    size: usize,
    allocator: AllocatorRef,
}

// SAFETY: the block is uniquely owned and the allocator is Send + Sync.
unsafe impl Send for RawBlock {}
unsafe impl Sync for RawBlock {}

impl RawBlock {
    /// Allocate a zeroed block of `size` bytes
    ///
    /// Returns `None` if the allocator has no memory.
    pub fn allocate(allocator: &AllocatorRef, size: usize) -> Option<Self> {
        let ptr = allocator.malloc(size)?;
        // SAFETY: `ptr` is a fresh block of at least `size` bytes.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Some(Self {
            ptr,
            size,
            allocator: Arc::clone(allocator),
        })
    }

    /// Resize in place or by moving
    ///
    /// Returns `false` and leaves the block untouched if the allocator fails.
    pub fn resize(&mut self, new_size: usize) -> bool {
        // SAFETY: `self.ptr` is live and owned by `self.allocator`.
        let Some(ptr) = (unsafe { self.allocator.realloc(Some(self.ptr), new_size) }) else {
            return false;
        };

        if new_size > self.size {
            // SAFETY: the block now spans `new_size` bytes.
            unsafe { std::ptr::write_bytes(ptr.as_ptr().add(self.size), 0, new_size - self.size) };
        }

        self.ptr = ptr;
        self.size = new_size;
        true
    }

    /// Usable size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Base address of the block
    #[inline]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `size` bytes are initialized and owned by `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Allocator this block returns to
    pub fn allocator(&self) -> &AllocatorRef {
        &self.allocator
    }
}

impl Drop for RawBlock {
    fn drop(&mut self) {
        // SAFETY: the block is live and never used after drop.
        unsafe { self.allocator.free(Some(self.ptr)) };
    }
}

impl std::fmt::Debug for RawBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBlock")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .finish()
    }
}
