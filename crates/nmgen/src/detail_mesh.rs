//! Height detail for the polygon mesh
//!
//! Every polygon gets its own triangle sub-mesh. Boundary vertices are
//! copied from the polygon, so collinear vertices shared with neighbours are
//! kept. When the heightfield under a polygon's centre deviates from the
//! polygon's height by more than the allowed error, the centre is added as an
//! extra vertex at the sampled height.

use glam::Vec3;
use nav_common::Result;

use crate::poly_mesh::triangulate;
use crate::{CompactHeightfield, PolyMesh};

/// Triangle sub-meshes, one per polygon
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyMeshDetail {
    /// Vertices `[x, y, z]` in world units
    pub vertices: Vec<f32>,
    /// Triangles as three absolute vertex indices each, grouped by polygon
    pub triangles: Vec<u32>,
    pub vert_count: usize,
    pub tri_count: usize,
    pub poly_count: usize,
    /// First triangle of each polygon's sub-mesh
    pub poly_start: Vec<usize>,
    /// Number of triangles in each polygon's sub-mesh
    pub poly_tri_count: Vec<usize>,
}

impl PolyMeshDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex(&self, i: usize) -> Vec3 {
        Vec3::new(
            self.vertices[i * 3],
            self.vertices[i * 3 + 1],
            self.vertices[i * 3 + 2],
        )
    }

    pub fn triangle(&self, i: usize) -> [u32; 3] {
        [
            self.triangles[i * 3],
            self.triangles[i * 3 + 1],
            self.triangles[i * 3 + 2],
        ]
    }

    /// Triangles belonging to one polygon
    pub fn poly_triangles(&self, poly: usize) -> impl Iterator<Item = [u32; 3]> + '_ {
        let start = self.poly_start[poly];
        (start..start + self.poly_tri_count[poly]).map(move |i| self.triangle(i))
    }

    fn push_vertex(&mut self, v: Vec3) -> u32 {
        self.vertices.extend_from_slice(&[v.x, v.y, v.z]);
        self.vert_count += 1;
        (self.vert_count - 1) as u32
    }
}

/// Span height in `cell` closest to `y`
fn sample_height(chf: &CompactHeightfield, x: i32, z: i32, y: f32) -> Option<i32> {
    if !chf.contains_cell(x, z) {
        return None;
    }
    chf.cell_spans(x, z)
        .filter(|&i| chf.regions.get(i).map_or(true, |&r| r != 0))
        .map(|i| chf.spans[i].y as i32)
        .min_by(|a, b| {
            (*a as f32 - y)
                .abs()
                .total_cmp(&(*b as f32 - y).abs())
        })
}

/// Builds the detail mesh of a polygon mesh
///
/// `sample_distance` of zero disables height sampling. `max_deviation` is in
/// cell heights.
pub fn build_poly_mesh_detail(
    mesh: &PolyMesh,
    chf: &CompactHeightfield,
    sample_distance: f32,
    max_deviation: f32,
) -> Result<PolyMeshDetail> {
    let mut dmesh = PolyMeshDetail::new();
    let to_world = |x: f32, y: f32, z: f32| {
        mesh.bmin + Vec3::new(x * mesh.cs, y * mesh.ch, z * mesh.cs)
    };

    for p in 0..mesh.npolys {
        let cells: Vec<[u16; 3]> = mesh
            .poly_verts(p)
            .iter()
            .map(|&v| mesh.vertex(v as usize))
            .collect();
        let first_tri = dmesh.tri_count;

        let base: Vec<u32> = cells
            .iter()
            .map(|c| dmesh.push_vertex(to_world(c[0] as f32, c[1] as f32, c[2] as f32)))
            .collect();

        let n = cells.len() as f32;
        let cx = cells.iter().map(|c| c[0] as f32).sum::<f32>() / n;
        let cy = cells.iter().map(|c| c[1] as f32).sum::<f32>() / n;
        let cz = cells.iter().map(|c| c[2] as f32).sum::<f32>() / n;

        let centre_height = if sample_distance > 0.0 {
            sample_height(chf, cx.floor() as i32, cz.floor() as i32, cy)
                .filter(|&h| (h as f32 - cy).abs() > max_deviation)
        } else {
            None
        };

        let mut tris: Vec<[u32; 3]> = Vec::new();
        if let Some(h) = centre_height {
            let centre = dmesh.push_vertex(to_world(cx, h as f32, cz));
            for i in 0..base.len() {
                tris.push([centre, base[i], base[(i + 1) % base.len()]]);
            }
        } else {
            let pts: Vec<[i32; 2]> = cells.iter().map(|c| [c[0] as i32, c[2] as i32]).collect();
            match triangulate(&pts) {
                Some(local) => {
                    tris.extend(local.iter().map(|t| [base[t[0]], base[t[1]], base[t[2]]]));
                }
                None => {
                    log::warn!("Falling back to a fan for polygon {}", p);
                    for i in 1..base.len() - 1 {
                        tris.push([base[0], base[i], base[i + 1]]);
                    }
                }
            }
        }

        for t in &tris {
            dmesh.triangles.extend_from_slice(t);
        }
        dmesh.tri_count += tris.len();
        dmesh.poly_start.push(first_tri);
        dmesh.poly_tri_count.push(tris.len());
        dmesh.poly_count += 1;
    }

    log::debug!(
        "Built detail mesh: {} verts, {} tris",
        dmesh.vert_count,
        dmesh.tri_count
    );
    Ok(dmesh)
}
