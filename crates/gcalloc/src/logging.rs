//! Allocator Logging and Tracing
//!
//! Structured logging for allocator operations, useful for:
//! - Debugging track/untrack misuse
//! - Watching allocation failures in production
//! - Inspecting what a collector pass reclaimed
//!
//! Events are recorded in a bounded history and forwarded to the `log`
//! facade, either human-readable or as JSON.
//!
//! Log Levels:
//! - ERROR: invariant violations
//! - WARN: allocation failures
//! - INFO: collection passes, bridging
//! - DEBUG: allocation, free, resize
//! - TRACE: track / untrack

use crate::object::ObjectId;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Log level for allocator events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Parse a level name, case-insensitive
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn as_log(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Direction of a bridging conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeDirection {
    ToConcurrent,
    ToSequential,
}

/// Allocator event types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocEvent {
    /// Object created; `id` is `None` for concurrent objects
    Allocated {
        id: Option<ObjectId>,
        type_name: String,
        size: usize,
    },

    /// Object released
    Freed {
        id: Option<ObjectId>,
        type_name: String,
        size: usize,
    },

    /// Object linked into generation 0
    Tracked { id: ObjectId },

    /// Object unlinked from generation 0
    Untracked { id: ObjectId },

    /// Variable-size object resized
    Resized {
        id: Option<ObjectId>,
        old_size: usize,
        new_size: usize,
    },

    /// Object converted between execution contexts
    Bridged {
        type_name: String,
        direction: BridgeDirection,
    },

    /// Raw allocator returned no block
    AllocationFailure { size: usize },

    /// Broken caller invariant
    InvariantViolation { operation: String, detail: String },

    /// Collector pass started
    CollectStart { tracked: usize },

    /// Collector pass finished
    CollectEnd { reclaimed: usize, duration_us: u64 },
}

impl AllocEvent {
    /// Level this event is recorded at
    pub fn level(&self) -> LogLevel {
        match self {
            AllocEvent::InvariantViolation { .. } => LogLevel::Error,
            AllocEvent::AllocationFailure { .. } => LogLevel::Warn,
            AllocEvent::CollectStart { .. }
            | AllocEvent::CollectEnd { .. }
            | AllocEvent::Bridged { .. } => LogLevel::Info,
            AllocEvent::Allocated { .. } | AllocEvent::Freed { .. } | AllocEvent::Resized { .. } => {
                LogLevel::Debug
            },
            AllocEvent::Tracked { .. } | AllocEvent::Untracked { .. } => LogLevel::Trace,
        }
    }
}

/// An event together with the wall-clock time it was recorded
#[derive(Debug, Clone, Serialize)]
pub struct LoggedEvent {
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub event: AllocEvent,
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Render as JSON
    pub json: bool,

    /// Retained history bound
    pub max_events: usize,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            max_events: 1024,
        }
    }
}

impl From<&crate::config::GcAllocConfig> for GcLoggerConfig {
    fn from(config: &crate::config::GcAllocConfig) -> Self {
        Self {
            level: config.log_level,
            json: config.log_json,
            max_events: config.max_logged_events,
        }
    }
}

/// GcLogger - per-context event log
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<VecDeque<LoggedEvent>>,
    enabled: AtomicBool,
}

impl GcLogger {
    /// Create new logger
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Enable logging
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable logging
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Check whether events at `level` would be recorded
    #[inline]
    pub fn is_enabled_for(&self, level: LogLevel) -> bool {
        self.enabled.load(Ordering::Relaxed) && level <= self.config.level
    }

    /// Record an event
    pub fn log(&self, event: AllocEvent) {
        if !self.is_enabled_for(event.level()) {
            return;
        }

        let logged = LoggedEvent {
            timestamp: Local::now(),
            event,
        };
        self.emit(&logged);

        let mut events = self.events.lock();
        if events.len() >= self.config.max_events {
            events.pop_front();
        }
        events.push_back(logged);
    }

    /// Record an event built only when its level is enabled
    ///
    /// Keeps the per-object hot paths free of string formatting.
    #[inline]
    pub fn log_with<F>(&self, level: LogLevel, build: F)
    where
        F: FnOnce() -> AllocEvent,
    {
        if self.is_enabled_for(level) {
            self.log(build());
        }
    }

    fn emit(&self, logged: &LoggedEvent) {
        let level = logged.event.level().as_log();
        if self.config.json {
            if let Ok(json) = serde_json::to_string(logged) {
                log::log!(target: "gcalloc", level, "{}", json);
            }
        } else {
            log::log!(
                target: "gcalloc",
                level,
                "[{}] {}",
                logged.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                describe(&logged.event)
            );
        }
    }

    /// Get all retained events
    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Clear all events
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Get retained event count
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

fn describe(event: &AllocEvent) -> String {
    match event {
        AllocEvent::Allocated {
            id,
            type_name,
            size,
        } => match id {
            Some(id) => format!("[GC] Allocated {} {} ({} bytes)", type_name, id, size),
            None => format!("[GC] Allocated concurrent {} ({} bytes)", type_name, size),
        },
        AllocEvent::Freed {
            id,
            type_name,
            size,
        } => match id {
            Some(id) => format!("[GC] Freed {} {} ({} bytes)", type_name, id, size),
            None => format!("[GC] Freed concurrent {} ({} bytes)", type_name, size),
        },
        AllocEvent::Tracked { id } => format!("[GC] Tracked {}", id),
        AllocEvent::Untracked { id } => format!("[GC] Untracked {}", id),
        AllocEvent::Resized {
            id,
            old_size,
            new_size,
        } => format!(
            "[GC] Resized {} from {} to {} bytes",
            id.map(|id| id.to_string())
                .unwrap_or_else(|| "concurrent object".to_string()),
            old_size,
            new_size
        ),
        AllocEvent::Bridged {
            type_name,
            direction,
        } => format!("[GC] Bridged {} ({:?})", type_name, direction),
        AllocEvent::AllocationFailure { size } => {
            format!("[GC] Allocation failure: {} bytes", size)
        },
        AllocEvent::InvariantViolation { operation, detail } => {
            format!("[GC] Invariant violated in {}: {}", operation, detail)
        },
        AllocEvent::CollectStart { tracked } => {
            format!("[GC] Collection started ({} tracked objects)", tracked)
        },
        AllocEvent::CollectEnd {
            reclaimed,
            duration_us,
        } => format!(
            "[GC] Collection completed ({} us, reclaimed {} objects)",
            duration_us, reclaimed
        ),
    }
}
