//! # gcalloc - Object Allocator with Generation-0 Tracking
//!
//! gcalloc allocates reference-counted objects described by a
//! [`TypeDescriptor`] and maintains the generation-0 list an external cycle
//! collector walks. Objects exist in one of two execution contexts:
//!
//! - **Sequential**: objects live in an object table owned by an
//!   [`AllocatorContext`]; GC objects can be linked into generation 0
//! - **Concurrent**: objects are shared handles with their own lock and
//!   wait/notify event; they are never collected
//!
//! ## Quick Start
//!
//! ```rust
//! use gcalloc::{AllocatorContext, GcAllocConfig, TypeDescriptor};
//!
//! fn main() -> Result<(), gcalloc::GcError> {
//!     let mut ctx = AllocatorContext::new(GcAllocConfig::default())?;
//!     let list = TypeDescriptor::builder("list")
//!         .basic_size(16)
//!         .item_size(8)
//!         .gc()
//!         .build()?;
//!
//!     let obj = ctx.gc_new_var(&list, 3)?;
//!     ctx.track(&obj)?;
//!     assert_eq!(ctx.heap().tracked_count(), 1);
//!
//!     ctx.gc_del(obj)?;
//!     assert!(ctx.heap().tracking().is_empty());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────── AllocatorContext ──────────────────────────┐
//! │                                                                      │
//! │   ExecutionContext::Sequential       ExecutionContext::Concurrent    │
//! │   ┌───────────────────────────┐      ┌─────────────────────────┐     │
//! │   │ GcHeap                    │      │ ConcurrentObject (Arc)  │     │
//! │   │  object table (ObjectId)  │      │  lock / event (lazy)    │     │
//! │   │  TrackingList (gen 0)     │      │  ConcurrentRegistry     │     │
//! │   └─────────────┬─────────────┘      └────────────┬────────────┘     │
//! │                 └──────────── RawAllocator ───────┘                  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariant Violations
//!
//! Tracking an object twice, untracking an untracked object, freeing a
//! tracked object or using a stale handle goes through [`error::fatal`]:
//! the process aborts by default, or panics under [`FatalPolicy::Panic`].
//! The `try_*` methods on [`GcHeap`] return these as errors instead.

// Object model and allocation
pub mod allocator;
pub mod object;

// Sequential and concurrent paths
pub mod concurrent;
pub mod context;
pub mod gc;

// Ambient
pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use allocator::{AllocatorRef, RawAllocator, RawBlock, SystemAllocator};
pub use concurrent::{ConcurrentObject, ConcurrentRegistry};
pub use config::GcAllocConfig;
pub use context::{AllocatorContext, ExecutionContext, ObjectRef};
pub use error::{FatalPolicy, GcError, Result};
pub use gc::{Collector, GcHeap, Generation0, TrackState};
pub use object::{ObjectHeader, ObjectId, TrackingPolicy, TypeDescriptor};

/// gcalloc version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create an allocator context configured from the environment
///
/// Reads the `GCALLOC_*` variables described in [`GcAllocConfig::from_env`].
pub fn init() -> Result<AllocatorContext> {
    AllocatorContext::new(GcAllocConfig::from_env())
}

/// Create an allocator context with an explicit configuration
pub fn init_with_config(config: GcAllocConfig) -> Result<AllocatorContext> {
    AllocatorContext::new(config)
}
