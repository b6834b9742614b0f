//! Object Module - Object model shared by both execution contexts
//!
//! Every object is an [`ObjectHeader`] plus a payload block. Sequential
//! objects are addressed through an [`ObjectId`]; concurrent objects carry
//! their header inside a shared handle.

pub mod header;
pub mod id;
pub mod layout;
pub mod traverse;
pub mod types;

pub use header::ObjectHeader;
pub use id::ObjectId;
pub use layout::{fixed_size, var_size};
pub use traverse::{load_ref, store_ref, Visit, Visitor};
pub use types::{IsGcFn, TraverseFn, TrackingPolicy, TypeBuilder, TypeDescriptor};
