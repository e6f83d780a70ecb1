//! Validated triangle mesh used as input geometry

use crate::{Error, Result};
use glam::Vec3;

/// An indexed triangle mesh
///
/// Every index is guaranteed to reference an existing vertex and no triangle
/// references the same vertex twice.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TriangleMesh {
    /// Flat array of [x, y, z] coordinates
    vertices: Vec<f32>,
    /// Three vertex indices per triangle
    indices: Vec<u32>,
}

impl TriangleMesh {
    /// Creates a mesh after validating the vertex and index buffers
    pub fn new(vertices: Vec<f32>, indices: Vec<u32>) -> Result<Self> {
        if vertices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "vertex buffer length {} is not a multiple of 3",
                vertices.len()
            )));
        }
        if indices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "index buffer length {} is not a multiple of 3",
                indices.len()
            )));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidMesh("vertex buffer contains non-finite values".into()));
        }

        let vert_count = vertices.len() / 3;
        for (tri, idx) in indices.chunks_exact(3).enumerate() {
            if let Some(bad) = idx.iter().find(|&&i| i as usize >= vert_count) {
                return Err(Error::InvalidMesh(format!(
                    "triangle {tri} references vertex {bad} but the mesh has {vert_count} vertices"
                )));
            }
            if idx[0] == idx[1] || idx[1] == idx[2] || idx[0] == idx[2] {
                return Err(Error::InvalidMesh(format!("triangle {tri} is degenerate")));
            }
        }

        Ok(Self { vertices, indices })
    }

    /// Builds a mesh from vertex positions and triangle index triples
    pub fn from_parts(vertices: &[Vec3], triangles: &[[u32; 3]]) -> Result<Self> {
        let verts = vertices.iter().flat_map(|v| [v.x, v.y, v.z]).collect();
        let indices = triangles.iter().flatten().copied().collect();
        Self::new(verts, indices)
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vert_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn tri_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns the vertex at `index`
    #[inline]
    pub fn vertex(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[index * 3..index * 3 + 3])
    }

    /// Returns the vertex indices of triangle `tri`
    #[inline]
    pub fn triangle(&self, tri: usize) -> [u32; 3] {
        [
            self.indices[tri * 3],
            self.indices[tri * 3 + 1],
            self.indices[tri * 3 + 2],
        ]
    }

    /// Returns the three corner positions of triangle `tri`
    #[inline]
    pub fn triangle_vertices(&self, tri: usize) -> [Vec3; 3] {
        self.triangle(tri).map(|i| self.vertex(i as usize))
    }

    /// Calculates the axis-aligned bounding box of the mesh
    pub fn calculate_bounds(&self) -> (Vec3, Vec3) {
        if self.vertices.is_empty() {
            return (Vec3::ZERO, Vec3::ZERO);
        }

        let mut bmin = Vec3::splat(f32::MAX);
        let mut bmax = Vec3::splat(f32::MIN);
        for v in self.vertices.chunks_exact(3) {
            let v = Vec3::from_slice(v);
            bmin = bmin.min(v);
            bmax = bmax.max(v);
        }
        (bmin, bmax)
    }
}
