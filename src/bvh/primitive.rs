//! Triangle bounding-box primitive used during the build.

use crate::scene::Triangle;
use crate::util::{Aabb, Vec3};

/// One triangle's box plus its payload.
///
/// Built once per input triangle and never modified afterwards; the builder
/// only reorders primitives within its working slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    pub bounds: Aabb,
    /// Box midpoint, the sort key for axis sorting.
    pub centre: Vec3,
    pub triangle: Triangle,
}

impl Primitive {
    pub fn new(triangle: Triangle) -> Self {
        let bounds = Aabb::from_triangle(&triangle.vertices);
        Self {
            bounds,
            centre: bounds.center(),
            triangle,
        }
    }

    /// Grow the box to include a point, keeping the centre in step.
    pub fn expand_by_point(&mut self, p: Vec3) {
        self.bounds.expand_by_point(p);
        self.centre = self.bounds.center();
    }

    /// Grow the box by another box's extrema, keeping the centre in step.
    pub fn expand_by_box(&mut self, other: &Aabb) {
        self.bounds.expand_by_box(other);
        self.centre = self.bounds.center();
    }
}

/// Wrap every input triangle as a primitive, preserving order.
pub fn primitives_from_triangles(triangles: &[Triangle]) -> Vec<Primitive> {
    triangles.iter().copied().map(Primitive::new).collect()
}

/// Union of the boxes of a primitive range.
pub fn range_bounds(prims: &[Primitive]) -> Aabb {
    prims.iter().fold(Aabb::EMPTY, |acc, p| acc.union(&p.bounds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_bounds_and_centre() {
        let tri = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 1.0),
            3,
        );
        let p = Primitive::new(tri);
        assert_eq!(p.bounds.min, Vec3::ZERO);
        assert_eq!(p.bounds.max, Vec3::new(4.0, 2.0, 1.0));
        assert_eq!(p.centre, Vec3::new(2.0, 1.0, 0.5));
        assert_eq!(p.triangle.instance_id, 3);
    }

    #[test]
    fn test_expand_updates_centre() {
        let tri = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y, 0);
        let mut p = Primitive::new(tri);
        p.expand_by_point(Vec3::new(0.0, 0.0, 4.0));
        assert_eq!(p.centre, Vec3::new(0.5, 0.5, 2.0));

        p.expand_by_box(&Aabb::new(Vec3::splat(-1.0), Vec3::ZERO));
        assert_eq!(p.bounds.min, Vec3::splat(-1.0));
        assert_eq!(p.centre, Vec3::new(0.0, 0.0, 1.5));
    }

    #[test]
    fn test_range_bounds() {
        let prims = primitives_from_triangles(&[
            Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y, 0),
            Triangle::new(Vec3::splat(5.0), Vec3::splat(6.0), Vec3::new(5.0, 7.0, 5.0), 0),
        ]);
        let b = range_bounds(&prims);
        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, Vec3::new(6.0, 7.0, 6.0));
        assert!(range_bounds(&[]).is_empty());
    }
}
