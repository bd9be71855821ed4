//! CPU reader for serialized BVH buffers.
//!
//! Mirrors the loop the GPU shadow kernel runs: at every internal record the
//! caller decides whether to descend (advance past the header) or skip the
//! whole subtree (advance past the header plus `|skip|` units); leaves always
//! advance by their span; a zero skip ends the walk. Used to validate baked
//! buffers and by the `inspect` command.

use super::flatten::{unpack_payload, Float4, LeafRecord, NodeRecord};
use crate::scene::Triangle;
use crate::util::{Aabb, Error, Result, Vec3};

/// One decoded record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlatRecord {
    Internal { bounds: Aabb, skip: usize },
    Leaf { triangle: Triangle, span: usize },
    Terminator,
}

impl FlatRecord {
    /// Decode the record starting at unit `offset`.
    pub fn decode(units: &[Float4], offset: usize) -> Result<Self> {
        let head = units
            .get(offset)
            .ok_or_else(|| Error::malformed(format!("offset {offset} past end ({} units)", units.len())))?;
        let w = head[3];

        if w == 0.0 {
            return Ok(Self::Terminator);
        }

        if !w.is_finite() || w.fract() != 0.0 {
            return Err(Error::malformed(format!("non-integral tag {w} at unit {offset}")));
        }

        if w < 0.0 {
            let max = units
                .get(offset + 1)
                .ok_or_else(|| Error::malformed(format!("truncated node record at unit {offset}")))?;
            let bounds = Aabb::new(Vec3::new(head[0], head[1], head[2]), Vec3::new(max[0], max[1], max[2]));
            return Ok(Self::Internal {
                bounds,
                skip: (-w) as usize,
            });
        }

        let span = w as usize;
        if span != LeafRecord::UNITS {
            return Err(Error::malformed(format!("leaf span {span} at unit {offset}, expected {}", LeafRecord::UNITS)));
        }
        let (e1, e2) = match (units.get(offset + 1), units.get(offset + 2)) {
            (Some(e1), Some(e2)) => (e1, e2),
            _ => return Err(Error::malformed(format!("truncated leaf record at unit {offset}"))),
        };

        let v0 = Vec3::new(head[0], head[1], head[2]);
        let (instance_id, material) = unpack_payload(e2[3].to_bits());
        let triangle = Triangle::new(
            v0,
            v0 + Vec3::new(e1[0], e1[1], e1[2]),
            v0 + Vec3::new(e2[0], e2[1], e2[2]),
            instance_id,
        )
        .with_material(material);
        Ok(Self::Leaf { triangle, span })
    }
}

/// What a walk touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub nodes_entered: usize,
    pub nodes_skipped: usize,
    pub leaves_visited: usize,
    /// Unit offset of the terminator.
    pub end_offset: usize,
}

/// Walk a terminated buffer without a stack.
///
/// `enter` is called with each internal box and returns whether to descend.
/// `visit_leaf` receives every leaf reached.
pub fn walk<E, L>(units: &[Float4], mut enter: E, mut visit_leaf: L) -> Result<WalkStats>
where
    E: FnMut(&Aabb) -> bool,
    L: FnMut(&Triangle),
{
    let mut stats = WalkStats::default();
    let mut offset = 0usize;

    loop {
        match FlatRecord::decode(units, offset)? {
            FlatRecord::Terminator => {
                stats.end_offset = offset;
                return Ok(stats);
            }
            FlatRecord::Internal { bounds, skip } => {
                if enter(&bounds) {
                    stats.nodes_entered += 1;
                    offset += NodeRecord::UNITS;
                } else {
                    stats.nodes_skipped += 1;
                    offset += NodeRecord::UNITS + skip;
                }
            }
            FlatRecord::Leaf { triangle, span } => {
                visit_leaf(&triangle);
                stats.leaves_visited += 1;
                offset += span;
            }
        }
    }
}

/// Every leaf triangle in buffer order.
pub fn leaves(units: &[Float4]) -> Result<Vec<Triangle>> {
    let mut out = Vec::new();
    walk(units, |_| true, |t| out.push(*t))?;
    Ok(out)
}

/// Union of the top-level boxes, i.e. the scene bounds the root would have had.
pub fn scene_bounds(units: &[Float4]) -> Result<Aabb> {
    let mut bounds = Aabb::EMPTY;
    let mut offset = 0usize;
    loop {
        match FlatRecord::decode(units, offset)? {
            FlatRecord::Terminator => return Ok(bounds),
            FlatRecord::Internal { bounds: b, skip } => {
                bounds.expand_by_box(&b);
                offset += NodeRecord::UNITS + skip;
            }
            FlatRecord::Leaf { triangle, span } => {
                bounds.expand_by_box(&Aabb::from_triangle(&triangle.vertices));
                offset += span;
            }
        }
    }
}
