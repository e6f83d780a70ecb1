//! Triangle cell navigation mesh used by the path planner

use std::collections::HashMap;

use glam::Vec3;
use nav_common::{
    closest_point_on_triangle, plane_height, point_in_triangle_2d, tri_area_2d, ChunkyTriMesh,
    ChunkyTriMeshNode, Error, Result, TriangleMesh,
};
use nmgen::{PolyMesh, PolyMeshDetail, NULL_AREA};

use crate::NavMeshConfig;

/// Distance from an edge within which a point still counts as inside a cell
const COLUMN_TOLERANCE: f32 = 1e-4;

/// Smallest XZ area a cell may have
const MIN_CELL_AREA: f32 = 1e-8;

/// One triangle of a [`TriNavMesh`]
///
/// Vertices are stored counter-clockwise seen from above. Wall `i` runs from
/// vertex `i` to vertex `i + 1` and `link(i)` is the cell across it.
#[derive(Debug, Clone, PartialEq)]
pub struct TriCell {
    verts: [Vec3; 3],
    links: [Option<usize>; 3],
    centroid: Vec3,
}

impl TriCell {
    fn new(verts: [Vec3; 3]) -> Self {
        Self {
            centroid: (verts[0] + verts[1] + verts[2]) / 3.0,
            verts,
            links: [None; 3],
        }
    }

    pub fn vertex(&self, i: usize) -> Vec3 {
        self.verts[i]
    }

    pub fn vertices(&self) -> &[Vec3; 3] {
        &self.verts
    }

    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    /// Cell across `wall`
    pub fn link(&self, wall: usize) -> Option<usize> {
        self.links[wall]
    }

    pub fn links(&self) -> impl Iterator<Item = usize> + '_ {
        self.links.iter().flatten().copied()
    }

    pub fn link_count(&self) -> usize {
        self.links.iter().flatten().count()
    }

    /// Wall shared with `cell`
    pub fn link_index(&self, cell: usize) -> Option<usize> {
        self.links.iter().position(|&l| l == Some(cell))
    }

    pub fn wall_midpoint(&self, wall: usize) -> Vec3 {
        (self.verts[wall] + self.verts[(wall + 1) % 3]) * 0.5
    }

    /// True if `p` lies inside the cell when seen from above
    pub fn is_in_column(&self, p: Vec3) -> bool {
        let [a, b, c] = self.verts;
        point_in_triangle_2d(p, a, b, c, COLUMN_TOLERANCE)
    }

    /// Height of the cell's plane below or above `p`
    pub fn plane_y(&self, p: Vec3) -> f32 {
        let [a, b, c] = self.verts;
        plane_height(p, a, b, c).unwrap_or(self.centroid.y)
    }

    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        let [a, b, c] = self.verts;
        closest_point_on_triangle(p, a, b, c)
    }
}

/// Navigation mesh made of linked triangle cells
#[derive(Debug, Clone)]
pub struct TriNavMesh {
    cells: Vec<TriCell>,
    index: ChunkyTriMesh,
    config: NavMeshConfig,
    bmin: Vec3,
    bmax: Vec3,
}

impl TriNavMesh {
    /// Builds the mesh from triangles, linking cells that share an edge
    ///
    /// Triangles must not be vertical. Edges shared by more than two
    /// triangles are left unlinked.
    pub fn new(vertices: &[Vec3], triangles: &[[u32; 3]], config: &NavMeshConfig) -> Result<Self> {
        config.validate()?;
        let mesh = TriangleMesh::from_parts(vertices, triangles)?;
        if mesh.is_empty() {
            return Err(Error::InvalidMesh("navigation mesh has no triangles".into()));
        }

        let mut cells = Vec::with_capacity(triangles.len());
        let mut edges: HashMap<(u32, u32), Vec<(usize, usize)>> = HashMap::new();
        for (i, tri) in triangles.iter().enumerate() {
            let mut idx = *tri;
            let [a, b, c] = idx.map(|v| vertices[v as usize]);
            let area = tri_area_2d(a, b, c);
            if area.abs() <= MIN_CELL_AREA {
                return Err(Error::InvalidMesh(format!(
                    "triangle {i} has no area seen from above"
                )));
            }
            if area > 0.0 {
                idx.swap(1, 2);
            }
            for wall in 0..3 {
                let (u, v) = (idx[wall], idx[(wall + 1) % 3]);
                edges.entry((u.min(v), u.max(v))).or_default().push((i, wall));
            }
            cells.push(TriCell::new(idx.map(|v| vertices[v as usize])));
        }

        for (key, sides) in &edges {
            match sides.as_slice() {
                [(c0, w0), (c1, w1)] => {
                    cells[*c0].links[*w0] = Some(*c1);
                    cells[*c1].links[*w1] = Some(*c0);
                }
                [_] => {}
                _ => log::warn!("Edge {:?} is shared by {} cells, leaving it unlinked", key, sides.len()),
            }
        }

        let index = ChunkyTriMesh::new(&mesh, &vec![1; mesh.tri_count()], config.tris_per_chunk)?;
        let (bmin, bmax) = mesh.calculate_bounds();
        log::debug!("Built navigation mesh with {} cells", cells.len());

        Ok(Self {
            cells,
            index,
            config: config.clone(),
            bmin,
            bmax,
        })
    }

    /// Builds the mesh from the detail triangles of a generated tile
    ///
    /// Detail vertices are welded when they share an XZ position and lie
    /// within one cell height of each other.
    pub fn from_poly_mesh(poly: &PolyMesh, detail: &PolyMeshDetail, config: &NavMeshConfig) -> Result<Self> {
        if detail.poly_count != poly.npolys {
            return Err(Error::InvalidMesh(format!(
                "detail mesh has {} polygons, poly mesh has {}",
                detail.poly_count, poly.npolys
            )));
        }

        let y_tolerance = poly.ch.max(f32::EPSILON);
        let mut verts: Vec<Vec3> = Vec::new();
        let mut welded: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
        let mut weld = |v: Vec3| -> u32 {
            let slot = welded.entry((v.x.to_bits(), v.z.to_bits())).or_default();
            if let Some(&i) = slot.iter().find(|&&i| (verts[i as usize].y - v.y).abs() <= y_tolerance) {
                return i;
            }
            verts.push(v);
            let i = (verts.len() - 1) as u32;
            slot.push(i);
            i
        };

        let mut tris = Vec::new();
        for p in 0..poly.npolys {
            if poly.areas[p] == NULL_AREA {
                continue;
            }
            for tri in detail.poly_triangles(p) {
                let idx = tri.map(|v| weld(detail.vertex(v as usize)));
                if idx[0] == idx[1] || idx[1] == idx[2] || idx[0] == idx[2] {
                    continue;
                }
                tris.push(idx);
            }
        }

        tris.retain(|t| {
            let [a, b, c] = t.map(|v| verts[v as usize]);
            tri_area_2d(a, b, c).abs() > MIN_CELL_AREA
        });
        Self::new(&verts, &tris, config)
    }

    pub fn cell(&self, i: usize) -> &TriCell {
        &self.cells[i]
    }

    pub fn cells(&self) -> &[TriCell] {
        &self.cells
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn config(&self) -> &NavMeshConfig {
        &self.config
    }

    pub fn plane_tolerance(&self) -> f32 {
        self.config.plane_tolerance
    }

    pub fn offset_scale(&self) -> f32 {
        self.config.offset_scale
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.bmin, self.bmax)
    }

    /// Cells whose spatial chunks overlap the XZ rectangle
    fn candidates(&self, bmin: [f32; 2], bmax: [f32; 2]) -> Vec<usize> {
        let mut leaves: Vec<ChunkyTriMeshNode> = Vec::new();
        self.index.query(bmin, bmax, &mut leaves);
        leaves
            .iter()
            .flat_map(|leaf| self.index.chunk_source_triangles(leaf))
            .map(|&t| t as usize)
            .collect()
    }

    /// Cell directly above or below `p` whose plane is vertically closest
    fn column_cell(&self, p: Vec3) -> Option<(usize, Vec3)> {
        let r = COLUMN_TOLERANCE;
        self.candidates([p.x - r, p.z - r], [p.x + r, p.z + r])
            .into_iter()
            .filter(|&i| self.cells[i].is_in_column(p))
            .map(|i| (i, Vec3::new(p.x, self.cells[i].plane_y(p), p.z)))
            .min_by(|a, b| (a.1.y - p.y).abs().total_cmp(&(b.1.y - p.y).abs()))
    }

    /// Finds the cell closest to `p` and the closest point on it
    ///
    /// With `must_be_in_column` only cells directly above or below `p` are
    /// considered.
    pub fn closest_cell(&self, p: Vec3, must_be_in_column: bool) -> Option<(usize, Vec3)> {
        let column = self.column_cell(p);
        if column.is_some() || must_be_in_column {
            return column;
        }

        let mut r = self.config.search_radius;
        loop {
            let bmin = [p.x - r, p.z - r];
            let bmax = [p.x + r, p.z + r];
            let best = self
                .candidates(bmin, bmax)
                .into_iter()
                .map(|i| (i, self.cells[i].closest_point(p)))
                .min_by(|a, b| a.1.distance_squared(p).total_cmp(&b.1.distance_squared(p)));
            if best.is_some() {
                return best;
            }
            let covers = bmin[0] <= self.bmin.x
                && bmin[1] <= self.bmin.z
                && bmax[0] >= self.bmax.x
                && bmax[1] >= self.bmax.z;
            if covers {
                return None;
            }
            r *= 2.0;
        }
    }

    /// True if a cell lies directly above or below `p` within `y_tolerance`
    pub fn is_valid_position(&self, p: Vec3, y_tolerance: f32) -> bool {
        self.column_cell(p)
            .is_some_and(|(_, q)| (p.y - q.y).abs() <= y_tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::*;

    #[test]
    fn test_links_shared_edges() -> Result<()> {
        let mesh = grid_nav_mesh(2, 1, &[])?;
        assert_eq!(mesh.cell_count(), 4);
        // Two square diagonals and the edge between the squares
        let links: usize = mesh.cells().iter().map(TriCell::link_count).sum();
        assert_eq!(links, 6);

        for (i, cell) in mesh.cells().iter().enumerate() {
            for n in cell.links() {
                assert!(mesh.cell(n).link_index(i).is_some(), "links must be symmetric");
            }
        }
        Ok(())
    }

    #[test]
    fn test_normalizes_winding() -> Result<()> {
        let verts = [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)];
        for tri in [[0, 1, 2], [0, 2, 1]] {
            let mesh = TriNavMesh::new(&verts, &[tri], &NavMeshConfig::default())?;
            let [a, b, c] = *mesh.cell(0).vertices();
            assert!(tri_area_2d(a, b, c) < 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_triangles() {
        let verts = [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0)];
        // Vertical
        assert!(TriNavMesh::new(&verts, &[[0, 1, 2]], &NavMeshConfig::default()).is_err());
        assert!(TriNavMesh::new(&verts, &[[0, 1, 7]], &NavMeshConfig::default()).is_err());
        assert!(TriNavMesh::new(&verts, &[], &NavMeshConfig::default()).is_err());
    }

    #[test]
    fn test_closest_cell() -> Result<()> {
        let mesh = grid_nav_mesh(2, 1, &[])?;

        let (cell, point) = mesh.closest_cell(Vec3::new(0.25, 0.4, 0.1), true).unwrap();
        assert!(mesh.cell(cell).is_in_column(Vec3::new(0.25, 0.0, 0.1)));
        assert!((point - Vec3::new(0.25, 0.0, 0.1)).length() < 1e-5);

        let far = Vec3::new(10.0, 0.0, 10.0);
        assert!(mesh.closest_cell(far, true).is_none());
        let (_, point) = mesh.closest_cell(far, false).unwrap();
        assert!((point - Vec3::new(2.0, 0.0, 1.0)).length() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_valid_position() -> Result<()> {
        let mesh = grid_nav_mesh(1, 1, &[])?;
        assert!(mesh.is_valid_position(Vec3::new(0.5, 0.1, 0.5), 0.2));
        assert!(!mesh.is_valid_position(Vec3::new(0.5, 0.5, 0.5), 0.2));
        assert!(!mesh.is_valid_position(Vec3::new(1.5, 0.0, 0.5), 0.2));
        Ok(())
    }

    #[test]
    fn test_closest_cell_picks_nearest_level() -> Result<()> {
        let verts = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(0.0, 3.0, 1.0),
            Vec3::new(1.0, 3.0, 0.0),
        ];
        let mesh = TriNavMesh::new(&verts, &[[0, 1, 2], [3, 4, 5]], &NavMeshConfig::default())?;
        let (lower, _) = mesh.closest_cell(Vec3::new(0.2, 0.5, 0.2), true).unwrap();
        let (upper, point) = mesh.closest_cell(Vec3::new(0.2, 2.6, 0.2), true).unwrap();
        assert_eq!(lower, 0);
        assert_eq!(upper, 1);
        assert!((point.y - 3.0).abs() < 1e-5);
        Ok(())
    }
}
