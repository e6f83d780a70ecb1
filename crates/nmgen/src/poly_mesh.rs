//! Convex polygon mesh built from contours

use std::collections::HashMap;

use glam::Vec3;
use nav_common::{Error, Result};

use crate::contour::{left, left_on};
use crate::ContourSet;

/// Null index for polygon vertices and neighbours
pub const MESH_NULL_IDX: u16 = 0xffff;

/// Maximum vertical distance in cells between two vertices that are welded
const WELD_Y_TOLERANCE: i32 = 2;

/// A mesh of convex polygons
///
/// Each polygon takes `nvp * 2` entries in `polys`: the vertex indices padded
/// with [`MESH_NULL_IDX`], followed by the neighbour polygon across each edge.
/// Edge `i` runs from vertex `i` to vertex `i + 1`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyMesh {
    /// Vertices as `[x, y, z]` in cell units
    pub verts: Vec<u16>,
    pub polys: Vec<u16>,
    /// Region of each polygon
    pub regs: Vec<u16>,
    /// Area of each polygon
    pub areas: Vec<u8>,
    /// User flags of each polygon
    pub flags: Vec<u16>,
    pub nverts: usize,
    pub npolys: usize,
    /// Maximum vertices per polygon
    pub nvp: usize,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub border_size: i32,
    pub max_edge_error: f32,
}

impl PolyMesh {
    /// Creates an empty mesh
    pub fn new(nvp: usize, border_size: i32) -> Self {
        Self {
            verts: Vec::new(),
            polys: Vec::new(),
            regs: Vec::new(),
            areas: Vec::new(),
            flags: Vec::new(),
            nverts: 0,
            npolys: 0,
            nvp,
            bmin: Vec3::ZERO,
            bmax: Vec3::ZERO,
            cs: 0.0,
            ch: 0.0,
            border_size,
            max_edge_error: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.npolys == 0
    }

    /// Vertex indices of a polygon
    pub fn poly_verts(&self, poly: usize) -> &[u16] {
        let start = poly * self.nvp * 2;
        let p = &self.polys[start..start + self.nvp];
        &p[..count_poly_verts(p)]
    }

    /// Neighbour polygon across each edge of a polygon
    pub fn poly_neighbours(&self, poly: usize) -> &[u16] {
        let start = poly * self.nvp * 2 + self.nvp;
        let n = self.poly_verts(poly).len();
        &self.polys[start..start + n]
    }

    /// Vertex in cell units
    pub fn vertex(&self, i: usize) -> [u16; 3] {
        [self.verts[i * 3], self.verts[i * 3 + 1], self.verts[i * 3 + 2]]
    }

    /// Vertex in world units
    pub fn world_vertex(&self, i: usize) -> Vec3 {
        let [x, y, z] = self.vertex(i);
        self.bmin + Vec3::new(x as f32 * self.cs, y as f32 * self.ch, z as f32 * self.cs)
    }
}

fn count_poly_verts(p: &[u16]) -> usize {
    p.iter().position(|&v| v == MESH_NULL_IDX).unwrap_or(p.len())
}

/// Triangulates a simple counter-clockwise polygon by ear clipping
///
/// An ear is a strictly convex vertex whose triangle contains no other vertex,
/// not even on its boundary. The shortest diagonal wins. Returns `None` if the
/// polygon cannot be triangulated.
pub(crate) fn triangulate(pts: &[[i32; 2]]) -> Option<Vec<[usize; 3]>> {
    let mut idx: Vec<usize> = (0..pts.len()).collect();
    let mut tris = Vec::with_capacity(pts.len().saturating_sub(2));

    while idx.len() > 3 {
        let m = idx.len();
        let mut best: Option<(usize, i64)> = None;
        let mut first_convex = None;

        for k in 0..m {
            let (a, b, c) = (idx[(k + m - 1) % m], idx[k], idx[(k + 1) % m]);
            if !left(pts[a], pts[b], pts[c]) {
                continue;
            }
            first_convex.get_or_insert(k);

            let blocked = idx.iter().any(|&o| {
                o != a
                    && o != b
                    && o != c
                    && left_on(pts[a], pts[b], pts[o])
                    && left_on(pts[b], pts[c], pts[o])
                    && left_on(pts[c], pts[a], pts[o])
            });
            if blocked {
                continue;
            }

            let dx = (pts[c][0] - pts[a][0]) as i64;
            let dz = (pts[c][1] - pts[a][1]) as i64;
            let len = dx * dx + dz * dz;
            if best.map_or(true, |(_, l)| len < l) {
                best = Some((k, len));
            }
        }

        let k = best.map(|(k, _)| k).or(first_convex)?;
        tris.push([idx[(k + m - 1) % m], idx[k], idx[(k + 1) % m]]);
        idx.remove(k);
    }

    if idx.len() == 3 && left(pts[idx[0]], pts[idx[1]], pts[idx[2]]) {
        tris.push([idx[0], idx[1], idx[2]]);
    }
    Some(tris)
}

struct VertexWelder {
    verts: Vec<[i32; 3]>,
    buckets: HashMap<(i32, i32), Vec<usize>>,
}

impl VertexWelder {
    fn add(&mut self, v: [i32; 3]) -> usize {
        let bucket = self.buckets.entry((v[0], v[2])).or_default();
        if let Some(&i) = bucket
            .iter()
            .find(|&&i| (self.verts[i][1] - v[1]).abs() <= WELD_Y_TOLERANCE)
        {
            return i;
        }
        self.verts.push(v);
        bucket.push(self.verts.len() - 1);
        self.verts.len() - 1
    }
}

/// Shared edge of two polygons and whether joining them stays convex
///
/// Returns the squared length of the shared edge and the edge indices.
fn merge_value(pa: &[u16], pb: &[u16], verts: &[[i32; 3]], nvp: usize) -> Option<(i64, usize, usize)> {
    let na = pa.len();
    let nb = pb.len();
    if na + nb - 2 > nvp {
        return None;
    }

    let (ea, eb) = (0..na).find_map(|i| {
        let a0 = pa[i];
        let a1 = pa[(i + 1) % na];
        (0..nb)
            .find(|&j| pb[j] == a1 && pb[(j + 1) % nb] == a0)
            .map(|j| (i, j))
    })?;

    let xz = |v: u16| [verts[v as usize][0], verts[v as usize][2]];

    if !left_on(xz(pa[(ea + na - 1) % na]), xz(pa[ea]), xz(pb[(eb + 2) % nb])) {
        return None;
    }
    if !left_on(xz(pb[(eb + nb - 1) % nb]), xz(pb[eb]), xz(pa[(ea + 2) % na])) {
        return None;
    }

    let a = xz(pa[ea]);
    let b = xz(pa[(ea + 1) % na]);
    let dx = (a[0] - b[0]) as i64;
    let dz = (a[1] - b[1]) as i64;
    Some((dx * dx + dz * dz, ea, eb))
}

fn merge_poly_verts(pa: &[u16], pb: &[u16], ea: usize, eb: usize) -> Vec<u16> {
    let na = pa.len();
    let nb = pb.len();
    let mut merged = Vec::with_capacity(na + nb - 2);
    for i in 0..na - 1 {
        merged.push(pa[(ea + 1 + i) % na]);
    }
    for i in 0..nb - 1 {
        merged.push(pb[(eb + 1 + i) % nb]);
    }
    merged
}

/// Greedily merges polygons across their longest shared edge while the result
/// stays convex and within `nvp` vertices
fn merge_polygons(polys: &mut Vec<Vec<u16>>, verts: &[[i32; 3]], nvp: usize) {
    loop {
        let mut best: Option<(i64, usize, usize, usize, usize)> = None;
        for j in 0..polys.len() {
            for k in j + 1..polys.len() {
                if let Some((v, ea, eb)) = merge_value(&polys[j], &polys[k], verts, nvp) {
                    if best.map_or(true, |b| v > b.0) {
                        best = Some((v, j, k, ea, eb));
                    }
                }
            }
        }

        let Some((_, pa, pb, ea, eb)) = best else {
            break;
        };
        let merged = merge_poly_verts(&polys[pa], &polys[pb], ea, eb);
        polys[pa] = merged;
        polys.swap_remove(pb);
    }
}

/// Fills the neighbour half of every polygon
fn build_adjacency(mesh: &mut PolyMesh) {
    let nvp = mesh.nvp;
    let mut edges: HashMap<(u16, u16), (usize, usize)> = HashMap::new();

    for p in 0..mesh.npolys {
        let n = mesh.poly_verts(p).len();
        for j in 0..n {
            let base = p * nvp * 2;
            let v0 = mesh.polys[base + j];
            let v1 = mesh.polys[base + (j + 1) % n];
            let key = (v0.min(v1), v0.max(v1));
            match edges.get(&key) {
                Some(&(q, k)) if q != p => {
                    mesh.polys[base + nvp + j] = q as u16;
                    mesh.polys[q * nvp * 2 + nvp + k] = p as u16;
                }
                Some(_) => {}
                None => {
                    edges.insert(key, (p, j));
                }
            }
        }
    }
}

/// Builds a polygon mesh with at most `nvp` vertices per polygon
///
/// Contours that cannot be triangulated are skipped with a warning.
pub fn build_poly_mesh(cset: &ContourSet, nvp: usize) -> Result<PolyMesh> {
    if !(3..=crate::MAX_ALLOWED_VERTS_PER_POLY as usize).contains(&nvp) {
        return Err(Error::InvalidConfig(format!(
            "vertices per polygon must be in 3..={}",
            crate::MAX_ALLOWED_VERTS_PER_POLY
        )));
    }

    let mut mesh = PolyMesh::new(nvp, cset.border_size);
    mesh.bmin = cset.bmin;
    mesh.bmax = cset.bmax;
    mesh.cs = cset.cs;
    mesh.ch = cset.ch;
    mesh.max_edge_error = cset.max_error;

    let mut welder = VertexWelder {
        verts: Vec::new(),
        buckets: HashMap::new(),
    };

    for contour in &cset.contours {
        if contour.verts.len() < 3 {
            continue;
        }
        let pts: Vec<[i32; 2]> = contour.verts.iter().map(|v| [v[0], v[2]]).collect();
        let Some(tris) = triangulate(&pts) else {
            log::warn!("Bad triangulation for contour of region {}", contour.region);
            continue;
        };

        let remap: Vec<u16> = contour
            .verts
            .iter()
            .map(|v| welder.add([v[0], v[1], v[2]]) as u16)
            .collect();

        let mut polys: Vec<Vec<u16>> = tris
            .iter()
            .map(|t| vec![remap[t[0]], remap[t[1]], remap[t[2]]])
            .filter(|p| p[0] != p[1] && p[1] != p[2] && p[2] != p[0])
            .collect();

        if nvp > 3 {
            merge_polygons(&mut polys, &welder.verts, nvp);
        }

        for p in polys {
            let mut entry = vec![MESH_NULL_IDX; nvp * 2];
            entry[..p.len()].copy_from_slice(&p);
            mesh.polys.extend_from_slice(&entry);
            mesh.regs.push(contour.region);
            mesh.areas.push(contour.area);
            mesh.flags.push(0);
            mesh.npolys += 1;
        }
    }

    if welder.verts.len() >= MESH_NULL_IDX as usize {
        return Err(Error::NavMeshGeneration(format!(
            "too many vertices: {}",
            welder.verts.len()
        )));
    }

    mesh.nverts = welder.verts.len();
    mesh.verts = welder
        .verts
        .iter()
        .flat_map(|v| v.map(|c| c.clamp(0, u16::MAX as i32) as u16))
        .collect();

    build_adjacency(&mut mesh);

    log::debug!("Built poly mesh: {} verts, {} polys", mesh.nverts, mesh.npolys);
    Ok(mesh)
}
