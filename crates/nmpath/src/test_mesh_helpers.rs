//! Meshes shared by the planner tests

use std::sync::Arc;

use glam::Vec3;
use nav_common::Result;

use crate::{NavMeshConfig, TriNavMesh};

/// Unit squares on the y = 0 plane, two triangles each
///
/// Square `(x, z)` covers `[x, x + 1] x [z, z + 1]`. Squares listed in
/// `blocked` are left out.
pub fn grid_triangles(cols: u32, rows: u32, blocked: &[(u32, u32)]) -> (Vec<Vec3>, Vec<[u32; 3]>) {
    let mut verts = Vec::new();
    for z in 0..=rows {
        for x in 0..=cols {
            verts.push(Vec3::new(x as f32, 0.0, z as f32));
        }
    }
    let mut tris = Vec::new();
    for z in 0..rows {
        for x in 0..cols {
            if blocked.contains(&(x, z)) {
                continue;
            }
            let i00 = z * (cols + 1) + x;
            let i10 = i00 + 1;
            let i01 = i00 + cols + 1;
            let i11 = i01 + 1;
            tris.push([i00, i01, i11]);
            tris.push([i00, i11, i10]);
        }
    }
    (verts, tris)
}

pub fn grid_nav_mesh(cols: u32, rows: u32, blocked: &[(u32, u32)]) -> Result<TriNavMesh> {
    let (verts, tris) = grid_triangles(cols, rows, blocked);
    TriNavMesh::new(&verts, &tris, &NavMeshConfig::default())
}

/// A 3 x 3 L: the bottom row plus the right column
pub fn l_mesh(offset_scale: f32) -> Result<Arc<TriNavMesh>> {
    let (verts, tris) = grid_triangles(3, 3, &[(0, 1), (1, 1), (0, 2), (1, 2)]);
    let config = NavMeshConfig {
        offset_scale,
        ..NavMeshConfig::default()
    };
    Ok(Arc::new(TriNavMesh::new(&verts, &tris, &config)?))
}

/// A 4 x 1 strip and a separate 1 x 1 island at x = 6
pub fn island_mesh() -> Result<Arc<TriNavMesh>> {
    let (mut verts, mut tris) = grid_triangles(4, 1, &[]);
    let base = verts.len() as u32;
    verts.extend([
        Vec3::new(6.0, 0.0, 0.0),
        Vec3::new(7.0, 0.0, 0.0),
        Vec3::new(6.0, 0.0, 1.0),
        Vec3::new(7.0, 0.0, 1.0),
    ]);
    tris.push([base, base + 2, base + 3]);
    tris.push([base, base + 3, base + 1]);
    Ok(Arc::new(TriNavMesh::new(&verts, &tris, &NavMeshConfig::default())?))
}
