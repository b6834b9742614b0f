//! Concurrent Module - objects shared across threads
//!
//! Concurrent-context objects never enter generation 0. Instead each one
//! carries a [`ConcurrentObjectState`]: a lazily created reader/writer lock
//! guarding its header and payload, a lazily created [`Event`] for
//! producer/consumer hand-off, and its entry in the [`ConcurrentRegistry`].
//!
//! ```text
//! ConcurrentObject (Arc) ──> Inner
//!                            ├── state: lock? event? list_entry original_type invalidated
//!                            └── body:  header + payload   (only through guards)
//! ```

pub mod event;
pub mod registry;

pub use event::Event;
pub use registry::ConcurrentRegistry;

use crate::allocator::{AllocatorRef, RawBlock};
use crate::context::ExecutionContext;
use crate::error::{GcError, Result};
use crate::object::{layout, ObjectHeader, TypeDescriptor};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

/// Synchronization state embedded in every concurrent object
///
/// Every field starts empty; the lock and event appear on first use.
pub struct ConcurrentObjectState {
    lock: OnceLock<RwLock<()>>,
    event: OnceLock<Event>,
    list_entry: OnceLock<u64>,
    original_type: Option<Arc<TypeDescriptor>>,
    invalidated: AtomicBool,
}

impl ConcurrentObjectState {
    fn new(original_type: Option<Arc<TypeDescriptor>>) -> Self {
        Self {
            lock: OnceLock::new(),
            event: OnceLock::new(),
            list_entry: OnceLock::new(),
            original_type,
            invalidated: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::Concurrent
    }

    pub fn has_lock(&self) -> bool {
        self.lock.get().is_some()
    }

    pub fn has_event(&self) -> bool {
        self.event.get().is_some()
    }

    /// Registry key, set when the object is registered
    pub fn list_entry(&self) -> Option<u64> {
        self.list_entry.get().copied()
    }

    /// Type the object had in the sequential context, if bridged in
    pub fn original_type(&self) -> Option<&Arc<TypeDescriptor>> {
        self.original_type.as_ref()
    }

    /// Set once the object has been bridged out
    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }
}

pub(crate) struct ObjectBody {
    header: ObjectHeader,
    payload: RawBlock,
}

pub(crate) struct Inner {
    ty: Arc<TypeDescriptor>,
    state: ConcurrentObjectState,
    body: UnsafeCell<ObjectBody>,
    registry: Weak<ConcurrentRegistry>,
}

// SAFETY: `body` is only reached through guards of `state.lock`.
unsafe impl Sync for Inner {}

impl Inner {
    fn unregister(&self) {
        if let (Some(entry), Some(registry)) = (self.state.list_entry(), self.registry.upgrade()) {
            registry.unregister(entry);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// ConcurrentObject - shared handle to a concurrent-context object
///
/// Cloning adds a handle; the payload is released when the last handle
/// drops or through [`AllocatorContext::free`](crate::AllocatorContext::free).
#[derive(Clone)]
pub struct ConcurrentObject {
    inner: Arc<Inner>,
}

impl ConcurrentObject {
    /// Wrap a header and payload and register the result
    pub(crate) fn create(
        header: ObjectHeader,
        payload: RawBlock,
        original_type: Option<Arc<TypeDescriptor>>,
        registry: &Arc<ConcurrentRegistry>,
    ) -> Self {
        let inner = Arc::new(Inner {
            ty: Arc::clone(header.ty()),
            state: ConcurrentObjectState::new(original_type),
            body: UnsafeCell::new(ObjectBody { header, payload }),
            registry: Arc::downgrade(registry),
        });
        let entry = registry.register(&inner);
        let _ = inner.state.list_entry.set(entry);
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn ty(&self) -> &Arc<TypeDescriptor> {
        &self.inner.ty
    }

    pub fn type_name(&self) -> &str {
        self.inner.ty.name()
    }

    pub fn state(&self) -> &ConcurrentObjectState {
        &self.inner.state
    }

    /// Number of live handles to this object
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &ConcurrentObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> &RwLock<()> {
        self.inner.state.lock.get_or_init(|| RwLock::new(()))
    }

    fn event(&self) -> &Event {
        self.inner.state.event.get_or_init(Event::new)
    }

    /// Take the exclusive lock; blocks until it is free
    ///
    /// Lock ordering between objects is the caller's responsibility.
    pub fn acquire_for_mutation(&self) -> Result<MutationGuard<'_>> {
        let lock = self.lock().write();
        if self.inner.state.is_invalidated() {
            return Err(GcError::Invalidated);
        }
        // SAFETY: the exclusive lock is held for as long as the guard lives.
        let body = unsafe { &mut *self.inner.body.get() };
        Ok(MutationGuard { _lock: lock, body })
    }

    /// Take a shared lock; blocks while a mutation is in progress
    pub fn acquire_shared(&self) -> Result<SharedGuard<'_>> {
        let lock = self.lock().read();
        if self.inner.state.is_invalidated() {
            return Err(GcError::Invalidated);
        }
        // SAFETY: a shared lock is held for as long as the guard lives.
        let body = unsafe { &*self.inner.body.get() };
        Ok(SharedGuard { _lock: lock, body })
    }

    pub fn refcount(&self) -> Result<isize> {
        Ok(self.acquire_shared()?.header().refcount())
    }

    pub fn item_count(&self) -> Result<Option<usize>> {
        Ok(self.acquire_shared()?.header().item_count())
    }

    /// Payload size in bytes
    pub fn size(&self) -> Result<usize> {
        Ok(self.acquire_shared()?.payload().len())
    }

    /// Block until the next [`notify`](Self::notify)
    pub fn wait(&self) {
        self.event().wait();
    }

    /// Block until the next notify or `timeout`; `false` on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.event().wait_timeout(timeout)
    }

    /// Block until `ready` holds for the object's header and payload
    ///
    /// `ready` runs under a shared lock and is re-checked after every
    /// notify. Fails with `Invalidated` if the object is bridged out while
    /// waiting.
    pub fn wait_until<F>(&self, mut ready: F) -> Result<()>
    where
        F: FnMut(&ObjectHeader, &[u8]) -> bool,
    {
        let event = self.event();
        loop {
            let ticket = event.ticket();
            {
                let guard = self.acquire_shared()?;
                if ready(guard.header(), guard.payload()) {
                    return Ok(());
                }
            }
            event.wait_past(ticket);
        }
    }

    /// Wake every thread waiting on this object
    pub fn notify(&self) {
        self.event().notify();
    }

    /// Resize a variable-size object under the exclusive lock
    ///
    /// On failure the object is untouched.
    pub fn resize(&self, items: usize) -> Result<()> {
        let mut guard = self.acquire_for_mutation()?;
        let body = &mut *guard.body;
        if body.header.item_count().is_none() {
            return Err(GcError::InvalidArgument(format!(
                "concurrent '{}' object is not variable-size",
                self.type_name()
            )));
        }

        let new_size = layout::var_size(&self.inner.ty, items)
            .ok_or(GcError::OutOfMemory { requested: usize::MAX })?;
        if !body.payload.resize(new_size) {
            return Err(GcError::OutOfMemory { requested: new_size });
        }
        body.header.set_item_count(items);
        Ok(())
    }

    /// Copy the body out, invalidate and unregister
    ///
    /// Waiters are woken so they observe the invalidation.
    pub(crate) fn detach(&self, allocator: &AllocatorRef) -> Result<(ObjectHeader, RawBlock)> {
        let guard = self.acquire_for_mutation()?;
        let size = guard.body.payload.size();
        let mut block =
            RawBlock::allocate(allocator, size).ok_or(GcError::OutOfMemory { requested: size })?;
        block.as_mut_slice().copy_from_slice(guard.body.payload.as_slice());
        let header = guard.body.header.clone();

        self.inner.state.invalidated.store(true, Ordering::Release);
        drop(guard);

        self.inner.unregister();
        self.notify();
        Ok((header, block))
    }

    /// Drop the last handle, releasing the payload
    pub(crate) fn release(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                drop(inner);
                Ok(())
            },
            Err(inner) => Err(GcError::ObjectShared {
                handles: Arc::strong_count(&inner),
            }),
        }
    }
}

impl fmt::Debug for ConcurrentObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentObject")
            .field("type", &self.type_name())
            .field("list_entry", &self.inner.state.list_entry())
            .field("invalidated", &self.inner.state.is_invalidated())
            .finish()
    }
}

/// Exclusive access to a concurrent object's body
pub struct MutationGuard<'a> {
    _lock: RwLockWriteGuard<'a, ()>,
    body: &'a mut ObjectBody,
}

impl MutationGuard<'_> {
    pub fn header(&self) -> &ObjectHeader {
        &self.body.header
    }

    pub fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.body.header
    }

    pub fn payload(&self) -> &[u8] {
        self.body.payload.as_slice()
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        self.body.payload.as_mut_slice()
    }
}

/// Shared access to a concurrent object's body
pub struct SharedGuard<'a> {
    _lock: RwLockReadGuard<'a, ()>,
    body: &'a ObjectBody,
}

impl SharedGuard<'_> {
    pub fn header(&self) -> &ObjectHeader {
        &self.body.header
    }

    pub fn payload(&self) -> &[u8] {
        self.body.payload.as_slice()
    }
}
