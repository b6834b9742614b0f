//! Context Dispatcher
//!
//! Routes every allocation and tracking operation to the sequential path
//! (object table + generation 0) or the concurrent path (shared objects with
//! their own lock and event).
//!
//! The path is chosen by an ambient per-thread [`ExecutionContext`], or
//! passed explicitly to the `*_in` variants:
//!
//! ```
//! use gcalloc::{AllocatorContext, ExecutionContext, GcAllocConfig, TypeDescriptor};
//!
//! let mut ctx = AllocatorContext::new(GcAllocConfig::default()).unwrap();
//! let ty = TypeDescriptor::builder("node").basic_size(16).gc().build().unwrap();
//!
//! let local = ctx.gc_new(&ty).unwrap();
//! assert!(local.as_sequential().is_some());
//!
//! let shared = {
//!     let _guard = ExecutionContext::Concurrent.enter();
//!     ctx.gc_new(&ty).unwrap()
//! };
//! ctx.track(&shared).unwrap();
//! assert!(!ctx.is_tracked(&shared));
//! ```

use crate::allocator::{AllocatorRef, RawBlock, SystemAllocator};
use crate::concurrent::{ConcurrentObject, ConcurrentRegistry};
use crate::config::GcAllocConfig;
use crate::error::{GcError, Result};
use crate::gc::{Collector, GcHeap};
use crate::logging::{AllocEvent, BridgeDirection, GcLogger, GcLoggerConfig, LogLevel};
use crate::object::{ObjectHeader, ObjectId, TypeDescriptor};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static CURRENT: Cell<ExecutionContext> = const { Cell::new(ExecutionContext::Sequential) };
}

/// Which object shape new allocations take
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionContext {
    /// Objects in the object table, eligible for generation 0
    #[default]
    Sequential,
    /// Shared objects with per-object synchronization, never collected
    Concurrent,
}

impl ExecutionContext {
    /// Ambient context of the calling thread
    pub fn current() -> Self {
        CURRENT.with(Cell::get)
    }

    /// Switch the calling thread's ambient context until the guard drops
    pub fn enter(self) -> ContextGuard {
        let previous = CURRENT.with(|current| current.replace(self));
        ContextGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    pub fn is_concurrent(self) -> bool {
        self == ExecutionContext::Concurrent
    }
}

/// Restores the previous ambient context on drop
#[must_use = "the context reverts as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: ExecutionContext,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(self.previous));
    }
}

/// Reference to an object of either shape
#[derive(Debug, Clone)]
pub enum ObjectRef {
    Sequential(ObjectId),
    Concurrent(ConcurrentObject),
}

impl ObjectRef {
    pub fn context(&self) -> ExecutionContext {
        match self {
            ObjectRef::Sequential(_) => ExecutionContext::Sequential,
            ObjectRef::Concurrent(_) => ExecutionContext::Concurrent,
        }
    }

    pub fn as_sequential(&self) -> Option<ObjectId> {
        match self {
            ObjectRef::Sequential(id) => Some(*id),
            ObjectRef::Concurrent(_) => None,
        }
    }

    pub fn as_concurrent(&self) -> Option<&ConcurrentObject> {
        match self {
            ObjectRef::Sequential(_) => None,
            ObjectRef::Concurrent(object) => Some(object),
        }
    }

    pub fn into_concurrent(self) -> Option<ConcurrentObject> {
        match self {
            ObjectRef::Sequential(_) => None,
            ObjectRef::Concurrent(object) => Some(object),
        }
    }
}

impl From<ObjectId> for ObjectRef {
    fn from(id: ObjectId) -> Self {
        ObjectRef::Sequential(id)
    }
}

impl From<ConcurrentObject> for ObjectRef {
    fn from(object: ConcurrentObject) -> Self {
        ObjectRef::Concurrent(object)
    }
}

/// AllocatorContext - one generation 0, one registry, one allocator
pub struct AllocatorContext {
    config: GcAllocConfig,
    heap: GcHeap,
    registry: Arc<ConcurrentRegistry>,
    logger: Arc<GcLogger>,
}

impl AllocatorContext {
    /// Create a context on the system allocator
    pub fn new(config: GcAllocConfig) -> Result<Self> {
        Self::with_allocator(config, Arc::new(SystemAllocator::new()))
    }

    /// Create a context drawing every payload from `allocator`
    pub fn with_allocator(config: GcAllocConfig, allocator: AllocatorRef) -> Result<Self> {
        config.validate()?;

        let logger = Arc::new(GcLogger::new(GcLoggerConfig::from(&config)));
        let heap = GcHeap::new(allocator, &config, Arc::clone(&logger));
        log::info!(
            "Allocator context created: fatal policy {:?}, capacity {}",
            config.fatal_policy,
            config.initial_capacity
        );

        Ok(Self {
            config,
            heap,
            registry: Arc::new(ConcurrentRegistry::new()),
            logger,
        })
    }

    pub fn config(&self) -> &GcAllocConfig {
        &self.config
    }

    pub fn heap(&self) -> &GcHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut GcHeap {
        &mut self.heap
    }

    pub fn registry(&self) -> &Arc<ConcurrentRegistry> {
        &self.registry
    }

    pub fn logger(&self) -> &Arc<GcLogger> {
        &self.logger
    }

    pub fn allocator(&self) -> &AllocatorRef {
        self.heap.allocator()
    }

    // === Allocation ===

    pub fn new_object(&mut self, ty: &Arc<TypeDescriptor>) -> Result<ObjectRef> {
        self.new_object_in(ExecutionContext::current(), ty)
    }

    pub fn new_object_in(
        &mut self,
        context: ExecutionContext,
        ty: &Arc<TypeDescriptor>,
    ) -> Result<ObjectRef> {
        match context {
            ExecutionContext::Sequential => self.heap.new_object(ty).map(ObjectRef::Sequential),
            ExecutionContext::Concurrent => self.new_concurrent(ObjectHeader::init(ty), None),
        }
    }

    pub fn new_var(&mut self, ty: &Arc<TypeDescriptor>, items: usize) -> Result<ObjectRef> {
        self.new_var_in(ExecutionContext::current(), ty, items)
    }

    pub fn new_var_in(
        &mut self,
        context: ExecutionContext,
        ty: &Arc<TypeDescriptor>,
        items: usize,
    ) -> Result<ObjectRef> {
        match context {
            ExecutionContext::Sequential => self.heap.new_var(ty, items).map(ObjectRef::Sequential),
            ExecutionContext::Concurrent => {
                self.new_concurrent(ObjectHeader::init_var(ty, items)?, None)
            },
        }
    }

    /// Allocate a GC object
    ///
    /// In the concurrent context this is a plain concurrent object: GC
    /// support of the type is irrelevant there.
    pub fn gc_new(&mut self, ty: &Arc<TypeDescriptor>) -> Result<ObjectRef> {
        self.gc_new_in(ExecutionContext::current(), ty)
    }

    pub fn gc_new_in(
        &mut self,
        context: ExecutionContext,
        ty: &Arc<TypeDescriptor>,
    ) -> Result<ObjectRef> {
        match context {
            ExecutionContext::Sequential => self.heap.gc_new(ty).map(ObjectRef::Sequential),
            ExecutionContext::Concurrent => self.new_concurrent(ObjectHeader::init(ty), None),
        }
    }

    pub fn gc_new_var(&mut self, ty: &Arc<TypeDescriptor>, items: usize) -> Result<ObjectRef> {
        self.gc_new_var_in(ExecutionContext::current(), ty, items)
    }

    pub fn gc_new_var_in(
        &mut self,
        context: ExecutionContext,
        ty: &Arc<TypeDescriptor>,
        items: usize,
    ) -> Result<ObjectRef> {
        match context {
            ExecutionContext::Sequential => {
                self.heap.gc_new_var(ty, items).map(ObjectRef::Sequential)
            },
            ExecutionContext::Concurrent => {
                self.new_concurrent(ObjectHeader::init_var(ty, items)?, None)
            },
        }
    }

    fn new_concurrent(
        &self,
        header: ObjectHeader,
        original_type: Option<Arc<TypeDescriptor>>,
    ) -> Result<ObjectRef> {
        let size = header.object_size().unwrap_or(usize::MAX);
        let Some(block) = RawBlock::allocate(self.heap.allocator(), size) else {
            log::warn!("Concurrent allocation of {} bytes failed", size);
            self.logger.log(AllocEvent::AllocationFailure { size });
            return Err(GcError::OutOfMemory { requested: size });
        };

        let type_name = header.type_name().to_string();
        let object = ConcurrentObject::create(header, block, original_type, &self.registry);

        log::debug!("Allocated concurrent {} ({} bytes)", type_name, size);
        self.logger.log_with(LogLevel::Debug, || AllocEvent::Allocated {
            id: None,
            type_name,
            size,
        });
        Ok(ObjectRef::Concurrent(object))
    }

    // === Tracking ===

    /// Link into generation 0; no-op for concurrent objects
    pub fn track(&mut self, object: &ObjectRef) -> Result<()> {
        match object {
            ObjectRef::Sequential(id) => self.heap.track(*id),
            ObjectRef::Concurrent(_) => Ok(()),
        }
    }

    /// Unlink from generation 0; no-op for concurrent objects
    pub fn untrack(&mut self, object: &ObjectRef) -> Result<()> {
        match object {
            ObjectRef::Sequential(id) => self.heap.untrack(*id),
            ObjectRef::Concurrent(_) => Ok(()),
        }
    }

    pub fn is_tracked(&self, object: &ObjectRef) -> bool {
        match object {
            ObjectRef::Sequential(id) => self.heap.is_tracked(*id),
            ObjectRef::Concurrent(_) => false,
        }
    }

    pub fn may_be_tracked(&self, object: &ObjectRef) -> bool {
        match object {
            ObjectRef::Sequential(id) => self.heap.may_be_tracked(*id),
            ObjectRef::Concurrent(_) => false,
        }
    }

    pub fn object_is_gc(&self, object: &ObjectRef) -> bool {
        match object {
            ObjectRef::Sequential(id) => self.heap.object_is_gc(*id),
            ObjectRef::Concurrent(_) => false,
        }
    }

    /// GC support of a type as seen from the calling thread's context
    pub fn type_is_gc(&self, ty: &TypeDescriptor) -> bool {
        self.type_is_gc_in(ExecutionContext::current(), ty)
    }

    /// Always `false` in the concurrent context
    pub fn type_is_gc_in(&self, context: ExecutionContext, ty: &TypeDescriptor) -> bool {
        context == ExecutionContext::Sequential && ty.supports_gc()
    }

    // === Resize and release ===

    /// Resize a variable-size object
    ///
    /// Handles stay valid; on `OutOfMemory` the object is untouched.
    pub fn resize(&mut self, object: ObjectRef, items: usize) -> Result<ObjectRef> {
        match object {
            ObjectRef::Sequential(id) => self.heap.resize(id, items).map(ObjectRef::Sequential),
            ObjectRef::Concurrent(concurrent) => {
                let old_size = concurrent.size()?;
                if let Err(err) = concurrent.resize(items) {
                    if err.is_recoverable() {
                        log::warn!("Concurrent resize of {} failed: {}", concurrent.type_name(), err);
                    }
                    return Err(err);
                }
                let new_size = concurrent.size()?;
                self.logger.log_with(LogLevel::Debug, || AllocEvent::Resized {
                    id: None,
                    old_size,
                    new_size,
                });
                Ok(ObjectRef::Concurrent(concurrent))
            },
        }
    }

    /// Release an object
    ///
    /// Sequential GC objects must be untracked first. Concurrent objects
    /// must be passed as their last handle.
    pub fn free(&mut self, object: ObjectRef) -> Result<()> {
        match object {
            ObjectRef::Sequential(id) => self.heap.free(id),
            ObjectRef::Concurrent(concurrent) => self.free_concurrent(concurrent),
        }
    }

    /// Untrack if needed, then release
    pub fn gc_del(&mut self, object: ObjectRef) -> Result<()> {
        match object {
            ObjectRef::Sequential(id) => self.heap.gc_del(id),
            ObjectRef::Concurrent(concurrent) => self.free_concurrent(concurrent),
        }
    }

    fn free_concurrent(&self, object: ConcurrentObject) -> Result<()> {
        let type_name = object.type_name().to_string();
        let size = object.size().unwrap_or(0);
        object.release()?;

        log::debug!("Freed concurrent {} ({} bytes)", type_name, size);
        self.logger.log_with(LogLevel::Debug, || AllocEvent::Freed {
            id: None,
            type_name,
            size,
        });
        Ok(())
    }

    // === Bridging ===

    /// Convert a sequential object into a concurrent one
    ///
    /// The payload and refcount carry over and the source type is recorded
    /// as `original_type`. The source is untracked and freed, so `id` is
    /// stale afterwards.
    pub fn move_to_concurrent(&mut self, id: ObjectId) -> Result<ConcurrentObject> {
        let (header, block) = self.heap.take(id)?;
        let original_type = Arc::clone(header.ty());
        let type_name = original_type.name().to_string();
        let object = ConcurrentObject::create(header, block, Some(original_type), &self.registry);

        log::info!("Bridged {} {} to the concurrent context", type_name, id);
        self.logger.log(AllocEvent::Bridged {
            type_name,
            direction: BridgeDirection::ToConcurrent,
        });
        Ok(object)
    }

    /// Convert a concurrent object into a sequential one
    ///
    /// The payload and refcount are copied under the object's lock. The
    /// source is invalidated and unregistered; other handles to it see
    /// `Invalidated` from then on. The new object starts untracked, with a
    /// GC head whenever its type supports GC.
    pub fn move_to_sequential(&mut self, object: &ConcurrentObject) -> Result<ObjectId> {
        let (header, block) = object.detach(self.heap.allocator())?;
        let gc = header.ty().supports_gc();
        let id = self.heap.adopt(header, block, gc)?;

        log::info!("Bridged {} to the sequential context as {}", object.type_name(), id);
        self.logger.log(AllocEvent::Bridged {
            type_name: object.type_name().to_string(),
            direction: BridgeDirection::ToSequential,
        });
        Ok(id)
    }

    // === Collection ===

    /// Hand generation 0 to an external collector
    pub fn collect(&mut self, collector: &mut dyn Collector) -> Result<usize> {
        self.heap.collect(collector)
    }

    /// Weak reference slot of a sequential object
    pub fn weakref_slot(&mut self, id: ObjectId) -> Result<&mut usize> {
        self.heap.weakref_slot(id)
    }
}
