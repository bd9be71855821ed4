//! Skip-pointer serialization of a [`BvhTree`] for stackless GPU traversal.
//!
//! The output is a flat array of four-float units (16 bytes each):
//!
//! ```text
//! internal (2 units): [min.xyz, skip] [max.xyz, 0]
//! leaf     (3 units): [v0.xyz, 3]     [(v1-v0).xyz, 0] [(v2-v0).xyz, payload bits]
//! ```
//!
//! The leaf payload is one `u32` bit-cast into the float slot:
//!
//! ```text
//! bit 31      alpha tested
//! bits 20..30 material id
//! bits 0..19  instance id
//! ```
//!
//! `skip` is negative and counts the units occupied by the node's children,
//! so a traversal that misses a box advances `2 + |skip|` units and lands on
//! the record after the whole subtree. The root is not emitted; a shadow ray
//! always starts inside the scene bounds.

use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;

use super::tree::{BvhTree, NodeId, NodeKind};
use crate::scene::{MaterialTag, Triangle};
use crate::util::{Aabb, Error, Result};

/// One 16-byte element of the serialized buffer.
pub type Float4 = [f32; 4];

/// Byte stride of one unit.
pub const UNIT_STRIDE: usize = std::mem::size_of::<Float4>();

const INSTANCE_BITS: u32 = 20;
const MATERIAL_BITS: u32 = 11;
const ALPHA_TESTED_BIT: u32 = 1 << 31;

/// Largest instance id a leaf can carry.
pub const MAX_INSTANCE_ID: u32 = (1 << INSTANCE_BITS) - 1;
/// Largest material id a leaf can carry.
pub const MAX_MATERIAL_ID: u32 = (1 << MATERIAL_BITS) - 1;

/// Pack a triangle's instance and material into the leaf payload word.
pub fn pack_payload(instance_id: u32, material: MaterialTag) -> Result<u32> {
    if instance_id > MAX_INSTANCE_ID {
        return Err(Error::PayloadOutOfRange {
            field: "instance id",
            value: instance_id,
            max: MAX_INSTANCE_ID,
        });
    }
    if material.id > MAX_MATERIAL_ID {
        return Err(Error::PayloadOutOfRange {
            field: "material id",
            value: material.id,
            max: MAX_MATERIAL_ID,
        });
    }
    let alpha = if material.alpha_tested { ALPHA_TESTED_BIT } else { 0 };
    Ok(alpha | (material.id << INSTANCE_BITS) | instance_id)
}

/// Split a leaf payload word back into instance id and material.
pub fn unpack_payload(bits: u32) -> (u32, MaterialTag) {
    let instance_id = bits & MAX_INSTANCE_ID;
    let material = MaterialTag::new(
        (bits >> INSTANCE_BITS) & MAX_MATERIAL_ID,
        bits & ALPHA_TESTED_BIT != 0,
    );
    (instance_id, material)
}

/// Internal node record (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct NodeRecord {
    /// xyz = box min, w = skip (negative unit count, 0 for the terminator)
    pub min_bounds: Float4,
    /// xyz = box max, w unused
    pub max_bounds: Float4,
}

/// Leaf record (48 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LeafRecord {
    /// xyz = vertex0, w = record span in units
    pub vertex0: Float4,
    /// xyz = vertex1 - vertex0
    pub edge1: Float4,
    /// xyz = vertex2 - vertex0, w = packed payload bit pattern
    pub edge2: Float4,
}

impl NodeRecord {
    pub const UNITS: usize = std::mem::size_of::<Self>() / UNIT_STRIDE;

    pub fn new(bounds: &Aabb, skip: f32) -> Self {
        Self {
            min_bounds: bounds.min.extend(skip).to_array(),
            max_bounds: bounds.max.extend(0.0).to_array(),
        }
    }

    /// End-of-tree marker: an internal record with zero skip.
    pub fn terminator() -> Self {
        Self::zeroed()
    }
}

impl LeafRecord {
    pub const UNITS: usize = std::mem::size_of::<Self>() / UNIT_STRIDE;

    /// Fails with [`Error::PayloadOutOfRange`] if the ids do not fit the payload word.
    pub fn new(tri: &Triangle) -> Result<Self> {
        let payload = pack_payload(tri.instance_id, tri.material)?;
        let [v0, v1, v2] = tri.vertices;
        Ok(Self {
            vertex0: v0.extend(Self::UNITS as f32).to_array(),
            edge1: (v1 - v0).extend(0.0).to_array(),
            edge2: (v2 - v0).extend(f32::from_bits(payload)).to_array(),
        })
    }
}

/// Units written so far plus a record budget.
///
/// The budget only limits how many records may be pushed. Storage is
/// reserved separately, sized from the records actually expected, and
/// trimmed once the tree is written.
#[derive(Debug)]
pub struct RecordWriter {
    units: Vec<Float4>,
    records: usize,
    max_records: usize,
}

impl RecordWriter {
    /// Writer with no storage reserved up front.
    pub fn new(max_records: usize) -> Self {
        Self {
            units: Vec::new(),
            records: 0,
            max_records,
        }
    }

    /// Writer with room for `expected_records` leaf-sized records.
    ///
    /// Fails with [`Error::Allocation`] instead of aborting when the
    /// reservation cannot be satisfied.
    pub fn with_capacity(max_records: usize, expected_records: usize) -> Result<Self> {
        let mut writer = Self::new(max_records);
        let units = expected_records.saturating_mul(LeafRecord::UNITS);
        writer
            .units
            .try_reserve_exact(units)
            .map_err(|_| Error::Allocation { units })?;
        Ok(writer)
    }

    /// Records written so far.
    #[inline]
    pub fn records(&self) -> usize {
        self.records
    }

    /// Units written so far.
    #[inline]
    pub fn offset(&self) -> usize {
        self.units.len()
    }

    fn reserve_record(&mut self) -> Result<()> {
        if self.records >= self.max_records {
            return Err(Error::CapacityExceeded {
                needed: self.records + 1,
                capacity: self.max_records,
            });
        }
        self.records += 1;
        Ok(())
    }

    /// Append an internal record and return its unit offset.
    pub fn push_node(&mut self, record: NodeRecord) -> Result<usize> {
        self.reserve_record()?;
        let offset = self.units.len();
        self.units.extend_from_slice(bytemuck::cast_slice(&[record]));
        Ok(offset)
    }

    /// Append a leaf record and return its unit offset.
    pub fn push_leaf(&mut self, record: LeafRecord) -> Result<usize> {
        self.reserve_record()?;
        let offset = self.units.len();
        self.units.extend_from_slice(bytemuck::cast_slice(&[record]));
        Ok(offset)
    }

    /// Overwrite the skip of the internal record at `offset`.
    fn patch_skip(&mut self, offset: usize, skip: f32) {
        self.units[offset][3] = skip;
    }

    /// Trim the over-allocation and hand over the units.
    pub fn finish(mut self) -> Vec<Float4> {
        self.units.shrink_to_fit();
        self.units
    }
}

/// Per-kind record counts from one serialization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenCounts {
    pub internal_records: usize,
    pub leaf_records: usize,
}

enum Visit {
    Enter(NodeId),
    /// Children of the record at `record` are written; fill in its skip.
    Close { record: usize, after_header: usize },
}

/// Serialize the subtrees below the root into `writer`.
///
/// A tree that is a single leaf is written as that leaf. Fails with
/// [`Error::CapacityExceeded`] as soon as the record budget would be
/// exceeded; nothing is truncated.
#[tracing::instrument(skip_all, fields(node_count = tree.node_count()))]
pub fn flatten_tree(tree: &BvhTree, writer: &mut RecordWriter) -> Result<FlattenCounts> {
    let mut counts = FlattenCounts::default();
    let mut stack: SmallVec<[Visit; 64]> = SmallVec::new();

    match tree.node(tree.root()).children() {
        Some((left, right)) => {
            stack.push(Visit::Enter(right));
            stack.push(Visit::Enter(left));
        }
        None => stack.push(Visit::Enter(tree.root())),
    }

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(id) => {
                let node = tree.node(id);
                match node.kind {
                    NodeKind::Leaf(tri) => {
                        writer.push_leaf(LeafRecord::new(&tri)?)?;
                        counts.leaf_records += 1;
                    }
                    NodeKind::Internal { left, right } => {
                        let record = writer.push_node(NodeRecord::new(&node.bounds, 0.0))?;
                        counts.internal_records += 1;
                        stack.push(Visit::Close {
                            record,
                            after_header: record + NodeRecord::UNITS,
                        });
                        stack.push(Visit::Enter(right));
                        stack.push(Visit::Enter(left));
                    }
                }
            }
            Visit::Close { record, after_header } => {
                let skip = -((writer.offset() - after_header) as f32);
                writer.patch_skip(record, skip);
            }
        }
    }

    tracing::debug!(
        internal = counts.internal_records,
        leaves = counts.leaf_records,
        units = writer.offset(),
        "BVH flattened"
    );

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::primitive::primitives_from_triangles;
    use crate::util::Vec3;

    fn flat(tris: &[Triangle], max_records: usize) -> Result<(Vec<Float4>, FlattenCounts)> {
        let mut prims = primitives_from_triangles(tris);
        let tree = BvhTree::build(&mut prims);
        let mut writer = RecordWriter::new(max_records);
        let counts = flatten_tree(&tree, &mut writer)?;
        Ok((writer.finish(), counts))
    }

    fn row(n: usize) -> Vec<Triangle> {
        (0..n)
            .map(|i| {
                let c = Vec3::new(i as f32 * 4.0, 0.0, 0.0);
                Triangle::new(c, c + Vec3::X, c + Vec3::Y, i as u32)
            })
            .collect()
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(UNIT_STRIDE, 16);
        assert_eq!(NodeRecord::UNITS, 2);
        assert_eq!(LeafRecord::UNITS, 3);
    }

    #[test]
    fn test_leaf_layout() {
        let tri = Triangle::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(2.0, 2.0, 3.0),
            Vec3::new(1.0, 5.0, 3.0),
            9,
        );
        let rec = LeafRecord::new(&tri).unwrap();
        assert_eq!(rec.vertex0, [1.0, 2.0, 3.0, 3.0]);
        assert_eq!(rec.edge1, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&rec.edge2[..3], &[0.0, 3.0, 0.0]);
        assert_eq!(rec.edge2[3].to_bits(), 9);

        let rec = LeafRecord::new(&tri.with_material(MaterialTag::new(5, true))).unwrap();
        assert_eq!(rec.edge2[3].to_bits(), 0x8000_0000 | (5 << 20) | 9);
    }

    #[test]
    fn test_payload_unpack() {
        let material = MaterialTag::new(MAX_MATERIAL_ID, true);
        let bits = pack_payload(MAX_INSTANCE_ID, material).unwrap();
        assert_eq!(bits, u32::MAX);
        assert_eq!(unpack_payload(bits), (MAX_INSTANCE_ID, material));

        assert_eq!(unpack_payload(pack_payload(0, MaterialTag::OPAQUE).unwrap()), (0, MaterialTag::OPAQUE));
        assert_eq!(unpack_payload(pack_payload(77, MaterialTag::new(3, false)).unwrap()), (77, MaterialTag::new(3, false)));
    }

    #[test]
    fn test_payload_out_of_range() {
        let err = pack_payload(MAX_INSTANCE_ID + 1, MaterialTag::OPAQUE).unwrap_err();
        assert!(matches!(err, Error::PayloadOutOfRange { field: "instance id", .. }));

        let err = pack_payload(0, MaterialTag::new(MAX_MATERIAL_ID + 1, false)).unwrap_err();
        assert!(matches!(err, Error::PayloadOutOfRange { field: "material id", .. }));
    }

    #[test]
    fn test_single_leaf_root_written() {
        let (units, counts) = flat(&row(1), 4).unwrap();
        assert_eq!(counts, FlattenCounts { internal_records: 0, leaf_records: 1 });
        assert_eq!(units.len(), 3);
    }

    #[test]
    fn test_two_leaves_no_header() {
        let (units, counts) = flat(&row(2), 4).unwrap();
        assert_eq!(counts.internal_records, 0);
        assert_eq!(counts.leaf_records, 2);
        assert_eq!(units.len(), 6);
        assert_eq!(units[0][3], 3.0);
        assert_eq!(units[3][3], 3.0);
    }

    #[test]
    fn test_skip_lands_after_subtree() {
        let (units, counts) = flat(&row(37), 128).unwrap();
        assert_eq!(counts.leaf_records, 37);
        // Every node below the root except the leaves.
        assert_eq!(counts.internal_records, 37 - 2);

        // Walk records in order; for every internal record, the units covered
        // by `-skip` must hold exactly one complete subtree.
        let mut offset = 0;
        while offset < units.len() {
            let w = units[offset][3];
            if w < 0.0 {
                let after_header = offset + NodeRecord::UNITS;
                let next = (offset as f32 + NodeRecord::UNITS as f32 - w) as usize;
                assert!(next <= units.len());
                assert_eq!(subtree_end(&units, after_header), next);
                offset = after_header;
            } else {
                assert_eq!(w, LeafRecord::UNITS as f32);
                offset += LeafRecord::UNITS;
            }
        }
        assert_eq!(offset, units.len());
    }

    /// End offset of the complete two-child subtree pair starting at `offset`.
    fn subtree_end(units: &[Float4], offset: usize) -> usize {
        let mut pending = 2usize;
        let mut at = offset;
        while pending > 0 {
            let w = units[at][3];
            pending -= 1;
            if w < 0.0 {
                pending += 2;
                at += NodeRecord::UNITS;
            } else {
                at += LeafRecord::UNITS;
            }
        }
        at
    }

    #[test]
    fn test_capacity_exceeded() {
        let err = flat(&row(10), 5).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { capacity: 5, .. }));
    }

    #[test]
    fn test_reserve_failure_is_an_error() {
        let err = RecordWriter::with_capacity(16, usize::MAX / 2).unwrap_err();
        assert!(matches!(err, Error::Allocation { units: usize::MAX }));
    }

    #[test]
    fn test_budget_does_not_reserve() {
        let writer = RecordWriter::new(usize::MAX / 2);
        assert_eq!(writer.offset(), 0);
        assert_eq!(writer.units.capacity(), 0);
    }

    #[test]
    fn test_finish_trims() {
        let mut writer = RecordWriter::with_capacity(100, 100).unwrap();
        writer.push_node(NodeRecord::terminator()).unwrap();
        let units = writer.finish();
        assert_eq!(units.len(), 2);
        assert!(units.capacity() < 100 * LeafRecord::UNITS);
    }
}
