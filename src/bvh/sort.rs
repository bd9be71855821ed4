//! In-place axis sort of a primitive range.

use super::primitive::Primitive;

/// Sort `prims` by ascending `centre[axis]` (0=x, 1=y, 2=z).
///
/// Uses `f32::total_cmp`, so every input (NaN included) has a defined order.
/// The sort is stable: re-sorting a range already ordered on `axis` leaves
/// it untouched.
#[inline]
pub fn sort_along_axis(prims: &mut [Primitive], axis: usize) {
    debug_assert!(axis < 3, "axis out of range: {axis}");
    prims.sort_by(|a, b| a.centre[axis].total_cmp(&b.centre[axis]));
}

/// True if `prims` is in ascending `centre[axis]` order.
pub fn is_sorted_along_axis(prims: &[Primitive], axis: usize) -> bool {
    prims
        .windows(2)
        .all(|w| w[0].centre[axis].total_cmp(&w[1].centre[axis]).is_le())
}
