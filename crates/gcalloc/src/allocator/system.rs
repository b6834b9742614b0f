//! System Allocator
//!
//! [`RawAllocator`] on top of `std::alloc`. Each block carries a size prefix
//! so `realloc` and `free` can rebuild the layout from the pointer alone.
//!
//! ```text
//! ┌──────────────────┬───────────────────────────┐
//! │ total size (16B) │ caller bytes ...          │
//! └──────────────────┴───────────────────────────┘
//!                    ^ returned pointer
//! ```

use super::RawAllocator;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Block alignment; also the width of the size prefix
pub const BLOCK_ALIGNMENT: usize = 16;

const PREFIX: usize = BLOCK_ALIGNMENT;

/// SystemAllocator - process heap backed allocator
#[derive(Debug, Default)]
pub struct SystemAllocator {
    live_blocks: AtomicUsize,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks handed out and not yet freed
    pub fn live_blocks(&self) -> usize {
        self.live_blocks.load(Ordering::Relaxed)
    }

    fn layout_for(total: usize) -> Option<Layout> {
        Layout::from_size_align(total, BLOCK_ALIGNMENT).ok()
    }

    /// Total allocation size for a request, including the prefix
    ///
    /// Zero-size requests still get one byte so every block is distinct.
    fn total_for(size: usize) -> Option<usize> {
        size.max(1).checked_add(PREFIX)
    }

    /// Recover the base pointer and layout of a block
    ///
    /// # Safety
    /// `ptr` must come from this allocator and be live.
    unsafe fn base_of(ptr: NonNull<u8>) -> (*mut u8, Layout) {
        let base = ptr.as_ptr().sub(PREFIX);
        let total = (base as *const usize).read();
        (base, Layout::from_size_align_unchecked(total, BLOCK_ALIGNMENT))
    }
}

impl RawAllocator for SystemAllocator {
    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        let total = Self::total_for(size)?;
        let layout = Self::layout_for(total)?;

        // SAFETY: `layout` has non-zero size.
        let base = unsafe { alloc::alloc(layout) };
        if base.is_null() {
            return None;
        }

        // SAFETY: `base` is 16-aligned and spans at least PREFIX bytes.
        unsafe {
            (base as *mut usize).write(total);
            self.live_blocks.fetch_add(1, Ordering::Relaxed);
            NonNull::new(base.add(PREFIX))
        }
    }

    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        let Some(ptr) = ptr else {
            return self.malloc(size);
        };

        // The caller keeps `ptr`; nothing is released.
        if size == 0 {
            return Some(ptr);
        }

        let total = Self::total_for(size)?;
        Self::layout_for(total)?;

        let (base, layout) = Self::base_of(ptr);
        let new_base = alloc::realloc(base, layout, total);
        if new_base.is_null() {
            return None;
        }

        (new_base as *mut usize).write(total);
        NonNull::new(new_base.add(PREFIX))
    }

    unsafe fn free(&self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else {
            return;
        };

        let (base, layout) = Self::base_of(ptr);
        alloc::dealloc(base, layout);
        self.live_blocks.fetch_sub(1, Ordering::Relaxed);
    }
}
