//! SAH bounding volume hierarchy: build, flatten, read back.
//!
//! ## Pipeline
//! ```text
//! triangles → primitives → sort/SAH top-down build (arena) → skip-pointer units → GPU
//! ```

pub mod primitive;
pub mod sort;
pub mod sah;
pub mod tree;
pub mod flatten;
pub mod walk;

pub use primitive::{primitives_from_triangles, Primitive};
pub use sah::{find_best_split, SahScratch, SplitCandidate};
pub use sort::sort_along_axis;
pub use tree::{BvhTree, Node, NodeId, NodeKind};
pub use flatten::{
    flatten_tree, pack_payload, unpack_payload, Float4, FlattenCounts, LeafRecord, NodeRecord, RecordWriter,
    MAX_INSTANCE_ID, MAX_MATERIAL_ID, UNIT_STRIDE,
};
pub use walk::{walk, FlatRecord, WalkStats};
