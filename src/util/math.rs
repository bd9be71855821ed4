//! Math re-exports and the axis-aligned box used throughout the builder.

pub use glam::{Mat4, Vec3, Vec4};

use std::fmt;

/// Axis-aligned bounding box, single precision.
#[derive(Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Empty box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Tight box around a triangle.
    #[inline]
    pub fn from_triangle(vertices: &[Vec3; 3]) -> Self {
        let mut b = Self::EMPTY;
        for &v in vertices {
            b.expand_by_point(v);
        }
        b
    }

    /// True until the first point is added.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Union of two boxes.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Extents, clamped so empty and flat boxes report zero rather than negative lengths.
    #[inline]
    pub fn size(&self) -> Vec3 {
        (self.max - self.min).max(Vec3::ZERO)
    }

    /// Surface area, `2 * (ex*ey + ey*ez + ez*ex)`. Zero for empty or degenerate boxes.
    ///
    /// Extents are taken in f64 and the result saturates at `f32::MAX`, so
    /// boxes spanning most of the f32 range never yield inf or NaN.
    #[inline]
    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let e = self.max.as_dvec3() - self.min.as_dvec3();
        let e = e.max(glam::DVec3::ZERO);
        let area = 2.0 * (e.x * e.y + e.y * e.z + e.z * e.x);
        area.min(f32::MAX as f64) as f32
    }

    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Closed-interval overlap test (touching boxes overlap).
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// True if `other` lies entirely within this box.
    #[inline]
    pub fn contains_box(&self, other: &Self) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aabb({:?} - {:?})", self.min, self.max)
    }
}
