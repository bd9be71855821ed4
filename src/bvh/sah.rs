//! Sort-based SAH split evaluation.
//!
//! For each axis the range is sorted by centre, a left-to-right and a
//! right-to-left sweep record the surface area of every prefix and suffix,
//! and each split position is costed as
//! `area(prefix) * count(prefix) + area(suffix) * count(suffix)`.
//! The winning axis is re-applied so the range leaves partitioned.

use super::primitive::Primitive;
use super::sort::{is_sorted_along_axis, sort_along_axis};
use crate::util::Aabb;

/// Best split found for a range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitCandidate {
    /// First index of the right half, relative to the range start.
    pub index: usize,
    /// 0=x, 1=y, 2=z.
    pub axis: usize,
    pub cost: f32,
}

/// Reusable sweep buffers, sized to the largest range seen.
#[derive(Debug, Default)]
pub struct SahScratch {
    area_left: Vec<f32>,
    area_right: Vec<f32>,
}

impl SahScratch {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            area_left: Vec::with_capacity(n),
            area_right: Vec::with_capacity(n),
        }
    }

    fn prepare(&mut self, n: usize) {
        self.area_left.clear();
        self.area_left.resize(n, 0.0);
        self.area_right.clear();
        self.area_right.resize(n, 0.0);
    }

    /// Prefix and suffix surface areas of the current ordering.
    fn sweep(&mut self, prims: &[Primitive]) {
        let n = prims.len();

        let mut sweep = Aabb::EMPTY;
        for (i, p) in prims.iter().enumerate() {
            sweep.expand_by_box(&p.bounds);
            self.area_left[i] = sweep.surface_area();
        }

        sweep = Aabb::EMPTY;
        for i in (0..n).rev() {
            sweep.expand_by_box(&prims[i].bounds);
            self.area_right[i] = sweep.surface_area();
        }
    }

    /// Cheapest split of the current ordering as `(mid, cost)`.
    fn cheapest(&self, n: usize) -> (usize, f32) {
        let mut best_mid = 1;
        let mut best_cost = f32::INFINITY;
        for mid in 1..n {
            let cost = self.area_left[mid - 1] * mid as f32
                + self.area_right[mid] * (n - mid) as f32;
            if cost < best_cost {
                best_cost = cost;
                best_mid = mid;
            }
        }
        (best_mid, best_cost)
    }
}

/// Find the cheapest split over all three axes and leave `prims` sorted
/// along the winning axis.
///
/// `prims` must hold at least two primitives. On equal cost the lower axis
/// wins, keeping tree shapes deterministic.
pub fn find_best_split(prims: &mut [Primitive], scratch: &mut SahScratch) -> SplitCandidate {
    let n = prims.len();
    assert!(n >= 2, "SAH split needs at least two primitives, got {n}");

    scratch.prepare(n);
    let mut best = SplitCandidate {
        index: n / 2,
        axis: usize::MAX,
        cost: f32::INFINITY,
    };

    for axis in 0..3 {
        sort_along_axis(prims, axis);
        scratch.sweep(prims);
        let (index, cost) = scratch.cheapest(n);

        // Strict comparison: on equal cost the earlier axis stays.
        if best.axis == usize::MAX || cost < best.cost {
            best = SplitCandidate { index, axis, cost };
        }
    }

    if best.axis != 2 {
        sort_along_axis(prims, best.axis);
    }
    debug_assert!(is_sorted_along_axis(prims, best.axis));

    best
}
