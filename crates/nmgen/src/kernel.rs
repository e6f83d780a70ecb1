//! The voxel geometry kernel behind the build pipeline
//!
//! [`IncrementalBuilder`](crate::IncrementalBuilder) only talks to the kernel
//! through [`GeometryKernel`]. Every call gets the build context for
//! diagnostics and either produces the next stage's data or fails. All
//! methods default to the built-in voxel implementation so a custom kernel
//! only overrides what it changes.

use glam::Vec3;
use nav_common::{Result, TriangleMesh};

use crate::{
    BuildContext, CompactHeightfield, ContourSet, Heightfield, PolyMesh, PolyMeshDetail,
};

pub trait GeometryKernel: Send {
    /// Clears the area of triangles steeper than `walkable_slope`, returning
    /// the number of walkable triangles left
    fn clear_unwalkable_triangles(
        &mut self,
        _ctx: &mut BuildContext,
        mesh: &TriangleMesh,
        walkable_slope: f32,
        areas: &mut [u8],
    ) -> Result<usize> {
        Ok(crate::clear_unwalkable_triangles(mesh, walkable_slope, areas))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_heightfield(
        &mut self,
        _ctx: &mut BuildContext,
        mesh: &TriangleMesh,
        areas: &[u8],
        bmin: Vec3,
        bmax: Vec3,
        cs: f32,
        ch: f32,
        merge_threshold: i32,
    ) -> Result<Heightfield> {
        let mut hf = Heightfield::new(bmin, bmax, cs, ch)?;
        hf.rasterize_triangles(mesh, areas, merge_threshold)?;
        Ok(hf)
    }

    fn build_compact_heightfield(
        &mut self,
        _ctx: &mut BuildContext,
        hf: &Heightfield,
        walkable_height: i32,
        walkable_step: i32,
    ) -> Result<CompactHeightfield> {
        CompactHeightfield::build(hf, walkable_height, walkable_step)
    }

    fn erode_walkable_area(
        &mut self,
        _ctx: &mut BuildContext,
        chf: &mut CompactHeightfield,
        radius: i32,
    ) -> Result<()> {
        chf.erode_walkable_area(radius);
        Ok(())
    }

    fn build_distance_field(
        &mut self,
        _ctx: &mut BuildContext,
        chf: &mut CompactHeightfield,
    ) -> Result<()> {
        chf.build_distance_field();
        Ok(())
    }

    fn build_regions(
        &mut self,
        _ctx: &mut BuildContext,
        chf: &mut CompactHeightfield,
        border_size: i32,
        min_region_area: i32,
        merge_region_area: i32,
    ) -> Result<()> {
        crate::build_regions(chf, border_size, min_region_area, merge_region_area)
    }

    fn build_contours(
        &mut self,
        _ctx: &mut BuildContext,
        chf: &CompactHeightfield,
        max_error: f32,
        max_edge_len: i32,
    ) -> Result<ContourSet> {
        crate::build_contours(chf, max_error, max_edge_len)
    }

    fn build_poly_mesh(
        &mut self,
        _ctx: &mut BuildContext,
        cset: &ContourSet,
        nvp: usize,
    ) -> Result<PolyMesh> {
        crate::build_poly_mesh(cset, nvp)
    }

    fn build_poly_mesh_detail(
        &mut self,
        _ctx: &mut BuildContext,
        mesh: &PolyMesh,
        chf: &CompactHeightfield,
        sample_distance: f32,
        max_deviation: f32,
    ) -> Result<PolyMeshDetail> {
        crate::build_poly_mesh_detail(mesh, chf, sample_distance, max_deviation)
    }
}

/// The built-in voxel kernel
#[derive(Debug, Clone, Copy, Default)]
pub struct VoxelKernel;

impl GeometryKernel for VoxelKernel {}
