//! One-shot bake: triangles in, terminated GPU buffer out.
//!
//! The node arena exists only inside [`bake`]; it is dropped as a unit once
//! the buffer is written, before the terminator is appended.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::bvh::flatten::{flatten_tree, pack_payload, Float4, NodeRecord, RecordWriter, UNIT_STRIDE};
use crate::bvh::primitive::primitives_from_triangles;
use crate::bvh::tree::BvhTree;
use crate::bvh::walk;
use crate::scene::Triangle;
use crate::settings::BakeSettings;
use crate::util::{Error, Result};

/// File magic for persisted buffers.
pub const FILE_MAGIC: [u8; 4] = *b"SBVH";
/// Current file layout version.
pub const FILE_VERSION: u32 = 1;

/// Upper bound on units reserved from a file header before reading.
const READ_CHUNK_UNITS: usize = 1 << 16;

/// Upload description of the buffer: a read-only structured buffer of float4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub size_bytes: usize,
    pub element_count: usize,
    pub struct_stride: usize,
}

impl BufferDesc {
    fn for_units(unit_count: usize) -> Self {
        Self {
            size_bytes: unit_count * UNIT_STRIDE,
            element_count: unit_count,
            struct_stride: UNIT_STRIDE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BakeStats {
    pub triangle_count: usize,
    pub node_count: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
    pub internal_records: usize,
    pub leaf_records: usize,
    pub elapsed: Duration,
}

/// Serialized, terminated BVH ready for upload.
#[derive(Debug, Clone)]
pub struct BakedBvh {
    units: Vec<Float4>,
    desc: BufferDesc,
    stats: BakeStats,
}

/// Records the serialized tree will need, terminator included.
fn records_needed(tree: &BvhTree) -> usize {
    let body = if tree.node(tree.root()).is_leaf() {
        1
    } else {
        tree.node_count() - 1
    };
    body + 1
}

/// Build and serialize a BVH over `triangles`.
///
/// Fails with [`Error::EmptyScene`] for no input, with
/// [`Error::PayloadOutOfRange`] if a triangle's ids do not fit a leaf, and
/// with [`Error::CapacityExceeded`] if the tree needs more records than the
/// settings allow. No partial buffer is returned on failure.
#[tracing::instrument(skip_all, fields(tri_count = triangles.len()))]
pub fn bake(triangles: &[Triangle], settings: &BakeSettings) -> Result<BakedBvh> {
    settings.validate()?;
    if triangles.is_empty() {
        return Err(Error::EmptyScene);
    }
    for tri in triangles {
        pack_payload(tri.instance_id, tri.material)?;
    }

    let start = Instant::now();
    let budget = settings.record_budget(triangles.len());

    let (mut writer, counts, mut stats) = {
        let mut prims = primitives_from_triangles(triangles);
        let tree = BvhTree::build(&mut prims);

        let needed = records_needed(&tree);
        if needed > budget {
            return Err(Error::CapacityExceeded {
                needed,
                capacity: budget,
            });
        }

        // Reserve for what the tree needs; the budget stays a limit only.
        let mut writer = RecordWriter::with_capacity(budget, needed)?;
        let counts = flatten_tree(&tree, &mut writer)?;
        let stats = BakeStats {
            triangle_count: triangles.len(),
            node_count: tree.node_count(),
            leaf_count: tree.leaf_count(),
            max_depth: tree.max_depth(),
            ..Default::default()
        };
        (writer, counts, stats)
    };

    writer.push_node(NodeRecord::terminator())?;
    let units = writer.finish();

    stats.internal_records = counts.internal_records;
    stats.leaf_records = counts.leaf_records;
    stats.elapsed = start.elapsed();

    let baked = BakedBvh {
        desc: BufferDesc::for_units(units.len()),
        units,
        stats,
    };

    if settings.log_stats {
        tracing::info!(
            triangles = stats.triangle_count,
            nodes = stats.node_count,
            max_depth = stats.max_depth,
            bytes = baked.desc.size_bytes,
            "baked BVH in {:.2} seconds",
            stats.elapsed.as_secs_f64()
        );
    }

    Ok(baked)
}

impl BakedBvh {
    /// Wrap a terminated unit buffer (e.g. read from disk), validating it by
    /// walking every record.
    pub fn from_units(units: Vec<Float4>) -> Result<Self> {
        let mut stats = BakeStats::default();
        let walked = walk::walk(&units, |_| true, |_| {})?;
        if walked.end_offset + NodeRecord::UNITS != units.len() {
            return Err(Error::malformed(format!(
                "{} trailing units after terminator",
                units.len().saturating_sub(walked.end_offset + NodeRecord::UNITS)
            )));
        }
        stats.internal_records = walked.nodes_entered;
        stats.leaf_records = walked.leaves_visited;
        stats.triangle_count = walked.leaves_visited;
        stats.leaf_count = walked.leaves_visited;

        Ok(Self {
            desc: BufferDesc::for_units(units.len()),
            units,
            stats,
        })
    }

    #[inline]
    pub fn units(&self) -> &[Float4] {
        &self.units
    }

    /// Raw bytes for GPU upload.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.units)
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.desc.size_bytes
    }

    #[inline]
    pub fn desc(&self) -> BufferDesc {
        self.desc
    }

    #[inline]
    pub fn stats(&self) -> &BakeStats {
        &self.stats
    }

    /// Write the persisted form: magic, version, element count, then
    /// little-endian floats.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        let count = u32::try_from(self.units.len())
            .map_err(|_| Error::malformed("buffer too large for file header"))?;
        w.write_all(&FILE_MAGIC)?;
        w.write_u32::<LittleEndian>(FILE_VERSION)?;
        w.write_u32::<LittleEndian>(count)?;
        for unit in &self.units {
            for &f in unit {
                w.write_f32::<LittleEndian>(f)?;
            }
        }
        w.flush()?;
        Ok(())
    }

    /// Read and validate the persisted form.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != FILE_MAGIC {
            return Err(Error::malformed(format!("bad magic {magic:?}")));
        }
        let version = r.read_u32::<LittleEndian>()?;
        if version != FILE_VERSION {
            return Err(Error::malformed(format!("unsupported version {version}")));
        }

        // The header count is untrusted: grow while reading so a short
        // body fails with UnexpectedEof before any large allocation.
        let count = r.read_u32::<LittleEndian>()? as usize;
        let mut units = Vec::with_capacity(count.min(READ_CHUNK_UNITS));
        for _ in 0..count {
            let mut unit = [0.0f32; 4];
            r.read_f32_into::<LittleEndian>(&mut unit)?;
            units.push(unit);
        }

        Self::from_units(units)
    }
}
