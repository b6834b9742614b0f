//! Layout Calculator
//!
//! Payload sizes for fixed and variable-size objects. Variable sizes are
//! rounded to the pointer width so pointer fields placed after the items stay
//! aligned.

use crate::object::types::TypeDescriptor;
use crate::util::{Alignment, POINTER_WIDTH};

/// Size of a fixed-size instance
#[inline]
pub fn fixed_size(ty: &TypeDescriptor) -> usize {
    ty.basic_size()
}

/// Size of an instance holding `items` items
///
/// Returns `None` when the size does not fit in `usize`.
///
/// # Examples
/// ```
/// use gcalloc::object::var_size;
/// use gcalloc::TypeDescriptor;
///
/// let ty = TypeDescriptor::builder("list").basic_size(16).item_size(8).build().unwrap();
/// assert_eq!(var_size(&ty, 3), Some(40));
/// ```
#[inline]
pub fn var_size(ty: &TypeDescriptor, items: usize) -> Option<usize> {
    let raw = items
        .checked_mul(ty.item_size())?
        .checked_add(ty.basic_size())?;
    Alignment::round_up(raw, POINTER_WIDTH)
}
