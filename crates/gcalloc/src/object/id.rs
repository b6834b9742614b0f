//! Object handles
//!
//! An [`ObjectId`] names a slot in the sequential object table together with
//! the generation that slot had when the object was created. Freeing an
//! object bumps the slot generation, so old handles stop resolving.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle to a sequential-context object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a single word
    ///
    /// Live handles never pack to 0 (slot generations start at 1), so 0 can
    /// stand for "no reference" inside payloads.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Unpack a word written by [`to_bits`](Self::to_bits)
    #[inline]
    pub const fn from_bits(bits: u64) -> Option<Self> {
        if bits == 0 {
            return None;
        }
        Some(Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        })
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}
