//! World-space triangle input.
//!
//! Bridges an indexed, object-space mesh (positions + index triples + world
//! matrix) to the flat triangle list the BVH builder consumes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::util::{Mat4, Result, Vec3};

/// Material a triangle belongs to, as seen by the shadow kernel.
///
/// Alpha-tested geometry needs a texture lookup before it can occlude, so
/// the kernel branches on the flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MaterialTag {
    pub id: u32,
    pub alpha_tested: bool,
}

impl MaterialTag {
    pub const OPAQUE: Self = Self {
        id: 0,
        alpha_tested: false,
    };

    #[inline]
    pub fn new(id: u32, alpha_tested: bool) -> Self {
        Self { id, alpha_tested }
    }
}

/// One world-space triangle tagged with its owning instance and material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
    pub instance_id: u32,
    pub material: MaterialTag,
}

impl Triangle {
    /// Triangle with the opaque default material.
    #[inline]
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, instance_id: u32) -> Self {
        Self {
            vertices: [v0, v1, v2],
            instance_id,
            material: MaterialTag::OPAQUE,
        }
    }

    #[inline]
    pub fn with_material(mut self, material: MaterialTag) -> Self {
        self.material = material;
        self
    }
}

/// Extract world-space triangles from an indexed position buffer.
///
/// Every complete index triple becomes one triangle; a trailing partial
/// triple is ignored. Triples referencing a missing vertex are skipped.
pub fn extract_triangles(
    positions: &[Vec3],
    indices: &[u32],
    transform: &Mat4,
    instance_id: u32,
) -> Vec<Triangle> {
    let mut tris = Vec::with_capacity(indices.len() / 3);
    let mut skipped = 0usize;

    for chunk in indices.chunks_exact(3) {
        let (i0, i1, i2) = (chunk[0] as usize, chunk[1] as usize, chunk[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            skipped += 1;
            continue;
        }

        tris.push(Triangle::new(
            transform.transform_point3(positions[i0]),
            transform.transform_point3(positions[i1]),
            transform.transform_point3(positions[i2]),
            instance_id,
        ));
    }

    if skipped > 0 {
        tracing::warn!(
            skipped,
            vertex_count = positions.len(),
            "dropped triangles with out-of-range indices"
        );
    }

    tris
}

/// One mesh instance in a scene description file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDesc {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    /// Column-major object-to-world matrix; identity when absent.
    #[serde(default)]
    pub transform: Option<[f32; 16]>,
    /// Defaults to the mesh's position in the file.
    #[serde(default)]
    pub instance_id: Option<u32>,
    /// Defaults to the mesh's position in the file.
    #[serde(default)]
    pub material_id: Option<u32>,
    #[serde(default)]
    pub alpha_tested: bool,
}

impl MeshDesc {
    pub fn world_matrix(&self) -> Mat4 {
        self.transform
            .map(|m| Mat4::from_cols_array(&m))
            .unwrap_or(Mat4::IDENTITY)
    }

    /// Material tag for a mesh at `index` in its scene.
    pub fn material(&self, index: u32) -> MaterialTag {
        MaterialTag::new(self.material_id.unwrap_or(index), self.alpha_tested)
    }
}

/// JSON scene description: a list of mesh instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDesc {
    pub meshes: Vec<MeshDesc>,
}

impl SceneDesc {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Flatten every mesh into world-space triangles.
    pub fn triangles(&self) -> Vec<Triangle> {
        let mut tris = Vec::new();
        for (i, mesh) in self.meshes.iter().enumerate() {
            let positions: Vec<Vec3> = mesh.positions.iter().map(|p| Vec3::from_array(*p)).collect();
            let index = i as u32;
            let id = mesh.instance_id.unwrap_or(index);
            let material = mesh.material(index);
            tris.extend(
                extract_triangles(&positions, &mesh.indices, &mesh.world_matrix(), id)
                    .into_iter()
                    .map(|t| t.with_material(material)),
            );
        }
        tracing::debug!(meshes = self.meshes.len(), triangles = tris.len(), "scene flattened");
        tris
    }
}
