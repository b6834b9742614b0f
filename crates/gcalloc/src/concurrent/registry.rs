//! Concurrent object registry
//!
//! Bookkeeping list of live concurrent objects, for diagnostics and
//! enumeration only; the collector never reads it. One coarse lock guards
//! every insertion and removal.

use crate::concurrent::{ConcurrentObject, Inner};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// ConcurrentRegistry - live concurrent objects of one context
#[derive(Default)]
pub struct ConcurrentRegistry {
    entries: Mutex<IndexMap<u64, Weak<Inner>>>,
    next_entry: AtomicU64,
}

impl ConcurrentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, returning its list entry key
    pub(crate) fn register(&self, inner: &Arc<Inner>) -> u64 {
        let entry = self.next_entry.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.lock().insert(entry, Arc::downgrade(inner));
        entry
    }

    /// Remove an entry; `false` if it was already gone
    pub(crate) fn unregister(&self, entry: u64) -> bool {
        self.entries.lock().swap_remove(&entry).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, object: &ConcurrentObject) -> bool {
        object
            .state()
            .list_entry()
            .is_some_and(|entry| self.entries.lock().contains_key(&entry))
    }

    /// Snapshot of the live objects
    ///
    /// Handles are collected under the lock and returned after it is
    /// released, so dropping them can unregister without deadlock.
    pub fn live_objects(&self) -> Vec<ConcurrentObject> {
        let entries = self.entries.lock();
        entries
            .values()
            .filter_map(Weak::upgrade)
            .map(ConcurrentObject::from_inner)
            .collect()
    }
}

impl std::fmt::Debug for ConcurrentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentRegistry")
            .field("len", &self.len())
            .finish()
    }
}
