//! GC Module - generation-0 tracking for sequential objects

pub mod collect;
pub mod heap;
pub mod tracking;

pub use collect::{Collector, Generation0};
pub use heap::GcHeap;
pub use tracking::{GcHead, TrackState, TrackingList};
