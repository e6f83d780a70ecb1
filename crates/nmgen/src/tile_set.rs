//! Tiled builds: the tile grid and the geometry of each tile

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use nav_common::{ChunkyTriMesh, ChunkyTriMeshNode, Error, Result, TriangleMesh};

use crate::{IncrementalBuilder, NMGenParams, NMGenTileParams, ProcessorSet};

/// Source geometry indexed for per tile extraction
#[derive(Debug, Clone)]
pub struct InputGeometry {
    mesh: TriangleMesh,
    chunks: ChunkyTriMesh,
    bmin: Vec3,
    bmax: Vec3,
}

impl InputGeometry {
    /// `areas` holds one area id per triangle
    pub fn new(mesh: TriangleMesh, areas: &[u8], tris_per_chunk: usize) -> Result<Self> {
        if mesh.is_empty() {
            return Err(Error::InvalidMesh("input geometry is empty".into()));
        }
        let chunks = ChunkyTriMesh::new(&mesh, areas, tris_per_chunk)?;
        let (bmin, bmax) = mesh.calculate_bounds();
        Ok(Self {
            mesh,
            chunks,
            bmin,
            bmax,
        })
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.bmin, self.bmax)
    }

    pub fn tri_count(&self) -> usize {
        self.mesh.tri_count()
    }

    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// Triangles whose chunks overlap the XZ rectangle, as a compact mesh
    /// with its area ids
    ///
    /// Returns `None` when no chunk overlaps.
    pub fn extract(&self, bmin: [f32; 2], bmax: [f32; 2]) -> Result<Option<(TriangleMesh, Vec<u8>)>> {
        let mut leaves: Vec<ChunkyTriMeshNode> = Vec::new();
        if self.chunks.query(bmin, bmax, &mut leaves) == 0 {
            return Ok(None);
        }

        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut areas = Vec::new();
        for leaf in &leaves {
            for (tri, &area) in self
                .chunks
                .chunk_triangles(leaf)
                .chunks_exact(3)
                .zip(self.chunks.chunk_areas(leaf))
            {
                for &v in tri {
                    let next = remap.len() as u32;
                    let i = *remap.entry(v).or_insert_with(|| {
                        let p = self.mesh.vertex(v as usize);
                        vertices.extend_from_slice(&[p.x, p.y, p.z]);
                        next
                    });
                    indices.push(i);
                }
                areas.push(area);
            }
        }
        Ok(Some((TriangleMesh::new(vertices, indices)?, areas)))
    }
}

/// A grid of square tiles covering the build bounds
#[derive(Debug, Clone)]
pub struct TileSetDefinition {
    params: NMGenParams,
    geometry: Arc<InputGeometry>,
    bmin: Vec3,
    bmax: Vec3,
    width: i32,
    depth: i32,
}

impl TileSetDefinition {
    /// The tile size comes from `params.tile_size`, which must be positive
    pub fn new(bmin: Vec3, bmax: Vec3, params: &NMGenParams, geometry: Arc<InputGeometry>) -> Result<Self> {
        params.validate()?;
        if params.tile_size <= 0 {
            return Err(Error::InvalidConfig("tile size must be positive for a tile set".into()));
        }
        if !(bmin.x < bmax.x && bmin.z < bmax.z && bmin.y <= bmax.y) {
            return Err(Error::InvalidConfig(format!("invalid bounds {bmin} .. {bmax}")));
        }

        let cells_x = ((bmax.x - bmin.x) / params.xz_cell_size + 0.5) as i32;
        let cells_z = ((bmax.z - bmin.z) / params.xz_cell_size + 0.5) as i32;
        let width = ((cells_x + params.tile_size - 1) / params.tile_size).max(1);
        let depth = ((cells_z + params.tile_size - 1) / params.tile_size).max(1);

        Ok(Self {
            params: params.clone(),
            geometry,
            bmin,
            bmax,
            width,
            depth,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.bmin, self.bmax)
    }

    pub fn params(&self) -> &NMGenParams {
        &self.params
    }

    pub fn geometry(&self) -> &Arc<InputGeometry> {
        &self.geometry
    }

    /// World size of one tile, excluding the border
    pub fn tile_world_size(&self) -> f32 {
        self.params.tile_size as f32 * self.params.xz_cell_size
    }

    /// Bounds of a tile without its border, `None` outside the grid
    pub fn tile_params(&self, tx: i32, tz: i32) -> Option<NMGenTileParams> {
        if tx < 0 || tz < 0 || tx >= self.width || tz >= self.depth {
            return None;
        }
        let size = self.tile_world_size();
        let bmin = Vec3::new(
            self.bmin.x + tx as f32 * size,
            self.bmin.y,
            self.bmin.z + tz as f32 * size,
        );
        let bmax = Vec3::new(bmin.x + size, self.bmax.y, bmin.z + size);
        NMGenTileParams::new(tx, tz, bmin, bmax).ok()
    }

    /// Creates the builder for one tile
    ///
    /// Returns `None` when no geometry overlaps the tile and its border.
    pub fn create_builder(&self, tx: i32, tz: i32, processors: ProcessorSet) -> Result<Option<IncrementalBuilder>> {
        let tile = self
            .tile_params(tx, tz)
            .ok_or_else(|| Error::InvalidConfig(format!("tile ({tx}, {tz}) is outside the tile set")))?;
        let border = self.params.border_size as f32 * self.params.xz_cell_size;
        let Some((mesh, areas)) = self.geometry.extract(
            [tile.bmin.x - border, tile.bmin.z - border],
            [tile.bmax.x + border, tile.bmax.z + border],
        )?
        else {
            return Ok(None);
        };
        IncrementalBuilder::new(tile, &self.params, mesh, areas, processors).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_geometry(n: u32) -> Result<InputGeometry> {
        let mut verts = Vec::new();
        for z in 0..=n {
            for x in 0..=n {
                verts.push(Vec3::new(x as f32, 0.0, z as f32));
            }
        }
        let mut tris = Vec::new();
        for z in 0..n {
            for x in 0..n {
                let i = z * (n + 1) + x;
                tris.push([i, i + n + 1, i + 1]);
                tris.push([i + 1, i + n + 1, i + n + 2]);
            }
        }
        let mesh = TriangleMesh::from_parts(&verts, &tris)?;
        let areas = vec![crate::MAX_AREA; mesh.tri_count()];
        InputGeometry::new(mesh, &areas, 64)
    }

    fn params() -> NMGenParams {
        NMGenParams {
            tile_size: 32,
            xz_cell_size: 0.5,
            border_size: 4,
            ..NMGenParams::default()
        }
    }

    #[test]
    fn test_tile_grid_size() -> Result<()> {
        let geom = Arc::new(grid_geometry(4)?);
        let set = TileSetDefinition::new(Vec3::ZERO, Vec3::new(40.0, 1.0, 20.0), &params(), geom)?;
        // 80 x 40 cells in tiles of 32
        assert_eq!((set.width(), set.depth()), (3, 2));
        assert!((set.tile_world_size() - 16.0).abs() < 1e-6);

        let tile = set.tile_params(1, 1).unwrap();
        assert_eq!(tile.bmin, Vec3::new(16.0, 0.0, 16.0));
        assert_eq!(tile.bmax, Vec3::new(32.0, 1.0, 32.0));
        assert!(set.tile_params(3, 0).is_none());
        assert!(set.tile_params(-1, 0).is_none());
        Ok(())
    }

    #[test]
    fn test_rejects_untiled_params() -> Result<()> {
        let geom = Arc::new(grid_geometry(2)?);
        let params = NMGenParams {
            tile_size: 0,
            ..NMGenParams::default()
        };
        assert!(TileSetDefinition::new(Vec3::ZERO, Vec3::ONE, &params, geom).is_err());
        Ok(())
    }

    #[test]
    fn test_extract_compacts_vertices() -> Result<()> {
        let geom = grid_geometry(16)?;
        let (mesh, areas) = geom.extract([0.0, 0.0], [1.0, 1.0])?.unwrap();
        assert_eq!(mesh.tri_count(), areas.len());
        assert!(mesh.tri_count() >= 2);
        assert!(mesh.tri_count() <= geom.tri_count());
        assert!(mesh.vert_count() <= mesh.tri_count() * 3);
        assert!(geom.extract([100.0, 100.0], [101.0, 101.0])?.is_none());
        Ok(())
    }

    #[test]
    fn test_create_builder_outside_geometry() -> Result<()> {
        let geom = Arc::new(grid_geometry(4)?);
        let set = TileSetDefinition::new(Vec3::ZERO, Vec3::new(40.0, 1.0, 40.0), &params(), geom)?;
        assert!(set.create_builder(0, 0, ProcessorSet::default())?.is_some());
        assert!(set.create_builder(2, 2, ProcessorSet::default())?.is_none());
        assert!(set.create_builder(5, 5, ProcessorSet::default()).is_err());
        Ok(())
    }
}
