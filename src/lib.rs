//! # shadow-bvh
//!
//! Offline bake of a bounding volume hierarchy over world-space triangles,
//! serialized into a flat float4 buffer that a GPU kernel walks without a
//! stack to answer shadow-ray occlusion queries.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (Aabb, errors)
//! - [`scene`] - Triangle input and mesh extraction
//! - [`bvh`] - SAH tree builder, skip-pointer serializer, CPU walker
//! - [`settings`] - Bake settings
//! - [`bake`] - One-shot bake and buffer file I/O
//!
//! ## Example
//!
//! ```ignore
//! use shadow_bvh::prelude::*;
//!
//! let tris = extract_triangles(&positions, &indices, &world, 0);
//! let baked = bake(&tris, &BakeSettings::default())?;
//! upload(baked.as_bytes(), baked.desc());
//! ```

pub mod util;
pub mod scene;
pub mod bvh;
pub mod settings;
pub mod bake;

// Re-export commonly used types
pub use util::{Aabb, Error, Result};
pub use scene::{extract_triangles, MaterialTag, Triangle};
pub use settings::BakeSettings;
pub use bake::{bake, BakeStats, BakedBvh, BufferDesc};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Aabb, Error, Mat4, Result, Vec3};
    pub use crate::scene::{extract_triangles, MaterialTag, SceneDesc, Triangle};
    pub use crate::settings::BakeSettings;
    pub use crate::bake::{bake, BakeStats, BakedBvh, BufferDesc};
    pub use crate::bvh::walk::{leaves, scene_bounds, walk};
}
