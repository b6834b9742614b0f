//! Configuration Module - Allocator Parameters
//!
//! Manages the knobs of an [`AllocatorContext`](crate::AllocatorContext):
//! how invariant violations are reported, how much of the object table is
//! reserved up front, and how allocator events are logged.

use crate::error::FatalPolicy;
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};

/// Main configuration for gcalloc
///
/// # Examples
///
/// ```rust
/// use gcalloc::{FatalPolicy, GcAllocConfig};
///
/// // Use default configuration
/// let config = GcAllocConfig::default();
///
/// // Panicking invariant checks for a test harness
/// let config = GcAllocConfig {
///     fatal_policy: FatalPolicy::Panic,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcAllocConfig {
    /// Reaction to double track, double untrack, freeing a tracked object and
    /// stale handles on the non-`try_` API
    ///
    /// Default: Abort
    pub fatal_policy: FatalPolicy,

    /// Clear the forward link of an untracked GC head
    ///
    /// The cleared link is never read as state; it only makes a confused
    /// caller walking a stale link fail loudly.
    ///
    /// Default: true
    pub poison_untracked_links: bool,

    /// Object table slots reserved at context creation
    ///
    /// The table grows on demand past this; values above
    /// [`MAX_INITIAL_CAPACITY`] are rejected.
    ///
    /// Default: 64
    pub initial_capacity: usize,

    /// Minimum level of events recorded by the context logger
    ///
    /// Default: Info
    pub log_level: LogLevel,

    /// Render logged events as JSON instead of text
    ///
    /// Default: false
    pub log_json: bool,

    /// Upper bound on retained logger events; older events are dropped
    ///
    /// Default: 1024
    pub max_logged_events: usize,
}

impl Default for GcAllocConfig {
    fn default() -> Self {
        GcAllocConfig {
            fatal_policy: FatalPolicy::Abort,
            poison_untracked_links: true,
            initial_capacity: 64,
            log_level: LogLevel::Info,
            log_json: false,
            max_logged_events: 1024,
        }
    }
}

impl GcAllocConfig {
    /// Validate configuration
    ///
    /// ```rust
    /// use gcalloc::GcAllocConfig;
    ///
    /// let config = GcAllocConfig {
    ///     max_logged_events: 0, // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Reserved eagerly, so keep it well below the id space
        if self.initial_capacity > MAX_INITIAL_CAPACITY {
            return Err(ConfigError::InvalidCapacity(format!(
                "initial_capacity must be <= {}",
                MAX_INITIAL_CAPACITY
            )));
        }

        if self.max_logged_events == 0 {
            return Err(ConfigError::InvalidLogging(
                "max_logged_events must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - GCALLOC_FATAL_POLICY (`abort` | `panic`)
    /// - GCALLOC_POISON_LINKS (`0` | `1`)
    /// - GCALLOC_INITIAL_CAPACITY
    /// - GCALLOC_LOG_LEVEL (`error` .. `trace`)
    /// - GCALLOC_LOG_JSON (`0` | `1`)
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GCALLOC_FATAL_POLICY") {
            match val.to_ascii_lowercase().as_str() {
                "abort" => config.fatal_policy = FatalPolicy::Abort,
                "panic" => config.fatal_policy = FatalPolicy::Panic,
                _ => {},
            }
        }

        if let Ok(val) = std::env::var("GCALLOC_POISON_LINKS") {
            config.poison_untracked_links = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("GCALLOC_INITIAL_CAPACITY") {
            if let Ok(capacity) = val.parse::<usize>() {
                config.initial_capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("GCALLOC_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                config.log_level = level;
            }
        }

        if let Ok(val) = std::env::var("GCALLOC_LOG_JSON") {
            config.log_json = parse_flag(&val);
        }

        config
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("Invalid logging setup: {0}")]
    InvalidLogging(String),
}

/// Largest number of simultaneously live sequential objects
pub const MAX_OBJECTS: usize = u32::MAX as usize;

/// Largest up-front reservation of the object table
pub const MAX_INITIAL_CAPACITY: usize = 1 << 20;
