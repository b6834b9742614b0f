//! Alignment Utilities
//!
//! Helper functions for size and address rounding.

/// Width of a pointer on the target, the alignment of variable-size objects
pub const POINTER_WIDTH: usize = std::mem::size_of::<*const ()>();

// Checked once for the whole build rather than on every size computation.
const _: () = assert!(POINTER_WIDTH.is_power_of_two());

/// Alignment - utility for alignment operations
///
/// Every `alignment` argument must be a power of two.
pub struct Alignment;

impl Alignment {
    /// Round value up to a multiple of `alignment`
    ///
    /// # Examples
    /// ```
    /// use gcalloc::util::Alignment;
    ///
    /// assert_eq!(Alignment::round_up(100, 8), Some(104));
    /// assert_eq!(Alignment::round_up(64, 8), Some(64));
    /// assert_eq!(Alignment::round_up(usize::MAX, 8), None);
    /// ```
    #[inline]
    pub fn round_up(value: usize, alignment: usize) -> Option<usize> {
        debug_assert!(alignment.is_power_of_two());
        value
            .checked_add(alignment - 1)
            .map(|padded| padded & !(alignment - 1))
    }

    /// Round value down to a multiple of `alignment`
    #[inline]
    pub fn round_down(value: usize, alignment: usize) -> usize {
        value & !(alignment - 1)
    }

    /// Check if value is aligned
    #[inline]
    pub fn is_aligned(value: usize, alignment: usize) -> bool {
        value & (alignment - 1) == 0
    }
}
