//! Error Module - gcalloc Error Types
//!
//! Defines all error types used in gcalloc.
//!
//! # Error Categories
//!
//! ## Recoverable
//! - `OutOfMemory` - the raw allocator returned no block, or a size overflowed
//!
//! ## Invariant Violations
//! - `AlreadyTracked` / `NotTracked` - track state machine misuse
//! - `StillTracked` - freeing an object that is still linked into generation 0
//! - `StaleHandle` - handle refers to a freed object
//! - `CorruptRing` - generation-0 ring failed verification
//!
//! These are routed through [`fatal`] by the non-`try_` API.
//!
//! ## Caller Errors
//! - `InvalidArgument`, `NotGcType`, `WeakRefsUnsupported`
//! - `Invalidated`, `ObjectShared` - concurrent object lifecycle
//! - `Configuration` - invalid [`GcAllocConfig`](crate::config::GcAllocConfig)

use crate::config::ConfigError;
use crate::object::ObjectId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for all gcalloc operations
///
/// # Examples
///
/// ```rust
/// use gcalloc::GcError;
///
/// fn handle_error(err: GcError) {
///     match err {
///         GcError::OutOfMemory { requested } => {
///             eprintln!("OOM: requested {} bytes", requested);
///         }
///         other if other.is_bug() => panic!("invariant violated: {}", other),
///         other => eprintln!("error: {}", other),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum GcError {
    /// The raw allocator could not satisfy the request
    ///
    /// **When returned:** `malloc`/`realloc` returned no block, or the computed
    /// object size overflowed `usize`
    ///
    /// **Recovery strategy:** Collect, release memory, or fail gracefully. The
    /// object passed to a failing resize is left untouched.
    #[error("Out of memory: requested {requested} bytes")]
    OutOfMemory { requested: usize },

    /// Track called on an object that is already in generation 0
    #[error("GC object already tracked: {id}")]
    AlreadyTracked { id: ObjectId },

    /// Untrack called on an object that is not in generation 0
    #[error("GC object not tracked: {id}")]
    NotTracked { id: ObjectId },

    /// Free called on an object that is still tracked
    #[error("GC object still tracked at free: {id}")]
    StillTracked { id: ObjectId },

    /// Handle refers to a freed (or never allocated) object
    #[error("Stale object handle: {id}")]
    StaleHandle { id: ObjectId },

    /// Generation-0 ring failed verification
    #[error("Generation-0 ring corrupted at slot {slot}: {reason}")]
    CorruptRing { slot: usize, reason: String },

    /// GC operation requested for a type without GC support
    #[error("Type '{type_name}' does not support garbage collection")]
    NotGcType { type_name: String },

    /// Weak reference slot requested for a type without one
    #[error("Type '{type_name}' does not support weak references")]
    WeakRefsUnsupported { type_name: String },

    /// Concurrent object was bridged to the sequential context
    #[error("Concurrent object has been invalidated by bridging")]
    Invalidated,

    /// Concurrent object still has other live handles
    #[error("Concurrent object is shared by {handles} handles")]
    ObjectShared { handles: usize },

    /// Function argument fails validation
    ///
    /// **Example scenarios:**
    /// - `init_var` on a type with `item_size == 0`
    /// - adopted block smaller than the object size
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl GcError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GcError::OutOfMemory { .. })
    }

    /// Check if this error indicates a broken invariant in calling code
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            GcError::AlreadyTracked { .. }
                | GcError::NotTracked { .. }
                | GcError::StillTracked { .. }
                | GcError::StaleHandle { .. }
                | GcError::CorruptRing { .. }
        )
    }
}

/// Result type alias for gcalloc operations
pub type Result<T> = std::result::Result<T, GcError>;

/// What to do when an invariant violation reaches the fatal path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalPolicy {
    /// Log and abort the process
    #[default]
    Abort,
    /// Panic with the diagnostic; lets test harnesses observe the failure
    Panic,
}

/// Report an unrecoverable invariant violation
///
/// Continuing after a double track or double untrack would corrupt the
/// generation-0 ring shared by every other object.
#[cold]
#[track_caller]
pub fn fatal(policy: FatalPolicy, err: GcError) -> ! {
    log::error!("Fatal gcalloc error: {}", err);
    match policy {
        FatalPolicy::Abort => {
            eprintln!("Fatal gcalloc error: {}", err);
            std::process::abort()
        },
        FatalPolicy::Panic => panic!("Fatal gcalloc error: {}", err),
    }
}

/// Unwrap a result, routing invariant violations through [`fatal`]
///
/// Errors that are not bugs are handed back to the caller.
pub(crate) fn or_fatal<T>(policy: FatalPolicy, result: Result<T>) -> Result<T> {
    match result {
        Err(err) if err.is_bug() => fatal(policy, err),
        other => other,
    }
}
