//! Single tile navigation mesh builder, advanced one stage at a time

use glam::Vec3;
use nav_common::{Error, Result, TriangleMesh};

use crate::kernel::{GeometryKernel, VoxelKernel};
use crate::processor::{AssetFlags, NMGenAssets, NMGenContext, ProcessorSet};
use crate::{
    BuildContext, BuildState, CompactHeightfield, ContourSet, Heightfield, NMGenParams,
    NMGenTileParams, PolyMesh, PolyMeshDetail,
};

const SOURCE: &str = "IncrementalBuilder";

/// Result of building one tile
///
/// A mesh without a poly mesh means the tile has no walkable surface. That is
/// a successful build, not a failure.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NMGenMesh {
    pub tile_x: i32,
    pub tile_z: i32,
    pub poly_mesh: Option<PolyMesh>,
    pub detail_mesh: Option<PolyMeshDetail>,
}

impl NMGenMesh {
    pub fn new(tile_x: i32, tile_z: i32, poly_mesh: PolyMesh, detail_mesh: Option<PolyMeshDetail>) -> Self {
        if poly_mesh.is_empty() {
            return Self::no_result(tile_x, tile_z);
        }
        Self {
            tile_x,
            tile_z,
            poly_mesh: Some(poly_mesh),
            detail_mesh,
        }
    }

    /// The result of a tile without walkable surface
    pub fn no_result(tile_x: i32, tile_z: i32) -> Self {
        Self {
            tile_x,
            tile_z,
            poly_mesh: None,
            detail_mesh: None,
        }
    }

    pub fn has_result(&self) -> bool {
        self.poly_mesh.is_some()
    }
}

enum StageOutcome {
    Continue,
    NoResult(&'static str),
}

/// Builds the navigation mesh of one tile
///
/// Every call to [`build`](Self::build) runs exactly one stage and returns the
/// new state. The state names the stage that completed last and only moves
/// forward, ending in [`BuildState::Complete`] or [`BuildState::Aborted`].
/// Processors run right after the stage they subscribe to.
pub struct IncrementalBuilder {
    tile: NMGenTileParams,
    params: NMGenParams,
    source: Option<TriangleMesh>,
    areas: Vec<u8>,
    processors: ProcessorSet,
    preserve: AssetFlags,
    kernel: Box<dyn GeometryKernel>,
    ctx: BuildContext,
    assets: NMGenAssets,
    state: BuildState,
    result: Option<NMGenMesh>,
}

impl std::fmt::Debug for IncrementalBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalBuilder")
            .field("tile", &self.tile)
            .field("state", &self.state)
            .field("processors", &self.processors)
            .finish_non_exhaustive()
    }
}

impl IncrementalBuilder {
    /// Creates a builder using the voxel kernel
    ///
    /// `areas` holds the area id of every triangle of `mesh`.
    pub fn new(
        tile: NMGenTileParams,
        params: &NMGenParams,
        mesh: TriangleMesh,
        areas: Vec<u8>,
        processors: ProcessorSet,
    ) -> Result<Self> {
        Self::with_kernel(tile, params, mesh, areas, processors, Box::new(VoxelKernel))
    }

    /// Creates a builder using a custom geometry kernel
    pub fn with_kernel(
        tile: NMGenTileParams,
        params: &NMGenParams,
        mesh: TriangleMesh,
        areas: Vec<u8>,
        processors: ProcessorSet,
        kernel: Box<dyn GeometryKernel>,
    ) -> Result<Self> {
        params.validate()?;
        if mesh.is_empty() {
            return Err(Error::InvalidMesh("no geometry".into()));
        }
        if areas.len() != mesh.tri_count() {
            return Err(Error::InvalidMesh(format!(
                "expected {} area ids, got {}",
                mesh.tri_count(),
                areas.len()
            )));
        }

        let mut ctx = BuildContext::new();
        processors.log_processors(&mut ctx);

        Ok(Self {
            tile,
            params: params.clone(),
            source: Some(mesh),
            areas,
            preserve: processors.preserve_assets(),
            processors,
            kernel,
            ctx,
            assets: NMGenAssets::default(),
            state: BuildState::Initialized,
            result: None,
        })
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn tile_x(&self) -> i32 {
        self.tile.tile_x
    }

    pub fn tile_z(&self) -> i32 {
        self.tile.tile_z
    }

    /// True if every processor may run on a worker thread
    pub fn is_thread_safe(&self) -> bool {
        self.processors.is_thread_safe()
    }

    pub fn messages(&self) -> Vec<String> {
        self.ctx.messages()
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// The build result, once complete
    pub fn result(&self) -> Option<&NMGenMesh> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<NMGenMesh> {
        self.result.take()
    }

    /// Heightfield kept past its disposal point on request of a processor
    pub fn heightfield(&self) -> Option<&Heightfield> {
        self.assets.heightfield.as_ref()
    }

    pub fn compact_field(&self) -> Option<&CompactHeightfield> {
        self.assets.compact_field.as_ref()
    }

    pub fn contours(&self) -> Option<&ContourSet> {
        self.assets.contours.as_ref()
    }

    /// Runs the next stage
    pub fn build(&mut self) -> BuildState {
        let Some(next) = self.state.next() else {
            return self.state;
        };

        if next == BuildState::Complete {
            self.finish();
            return self.state;
        }

        self.ctx.start_timer(next);
        let outcome = self.run_stage(next);
        self.ctx.stop_timer(next);

        match outcome {
            Ok(StageOutcome::Continue) => {
                self.state = next;
                let mut pctx = NMGenContext {
                    assets: &mut self.assets,
                    build: &mut self.ctx,
                    params: &self.params,
                    tile: &self.tile,
                };
                if let Err(e) = self.processors.process(next, &mut pctx) {
                    self.abort(next, e);
                }
            }
            Ok(StageOutcome::NoResult(reason)) => {
                self.ctx.log(format!("Completed after {next} with no result: {reason}"), Some(SOURCE));
                self.assets = NMGenAssets::default();
                self.result = Some(NMGenMesh::no_result(self.tile.tile_x, self.tile.tile_z));
                self.state = BuildState::Complete;
            }
            Err(e) => self.abort(next, e),
        }
        self.state
    }

    /// Runs stages until the build finishes
    pub fn build_all(&mut self) -> BuildState {
        while !self.is_finished() {
            self.build();
        }
        self.state
    }

    fn abort(&mut self, stage: BuildState, error: Error) {
        self.ctx.log_error(format!("Aborted at {stage}: {error}"), Some(SOURCE));
        self.assets = NMGenAssets::default();
        self.source = None;
        self.state = BuildState::Aborted;
    }

    fn finish(&mut self) {
        let poly_mesh = self.assets.poly_mesh.take();
        let detail_mesh = self.assets.detail_mesh.take();
        self.result = Some(match poly_mesh {
            Some(pm) => NMGenMesh::new(self.tile.tile_x, self.tile.tile_z, pm, detail_mesh),
            None => NMGenMesh::no_result(self.tile.tile_x, self.tile.tile_z),
        });
        self.ctx.log(
            format!("Build complete in {:?}", self.ctx.total_time()),
            Some(SOURCE),
        );
        self.state = BuildState::Complete;
    }

    fn grid_bounds(&self) -> (Vec3, Vec3) {
        let pad = self.params.border_size as f32 * self.params.xz_cell_size;
        let pad = Vec3::new(pad, 0.0, pad);
        (self.tile.bmin - pad, self.tile.bmax + pad)
    }

    fn run_stage(&mut self, stage: BuildState) -> Result<StageOutcome> {
        let (bmin, bmax) = self.grid_bounds();
        let p = &self.params;
        let ctx = &mut self.ctx;
        let kernel = &mut self.kernel;

        match stage {
            BuildState::ClearUnwalkableTris => {
                let mesh = self.source.as_ref().ok_or_else(|| missing("source mesh"))?;
                let walkable = kernel.clear_unwalkable_triangles(ctx, mesh, p.walkable_slope, &mut self.areas)?;
                ctx.log(format!("Walkable triangles: {walkable}"), Some(SOURCE));
                if walkable == 0 {
                    return Ok(StageOutcome::NoResult("no walkable triangles"));
                }
            }
            BuildState::HeightfieldBuild => {
                let mesh = self.source.take().ok_or_else(|| missing("source mesh"))?;
                let hf = kernel.build_heightfield(
                    ctx,
                    &mesh,
                    &self.areas,
                    bmin,
                    bmax,
                    p.xz_cell_size,
                    p.y_cell_size,
                    p.walkable_step,
                )?;
                let spans = hf.span_count();
                ctx.log(format!("Voxelized triangles. Span count: {spans}"), Some(SOURCE));
                if spans == 0 {
                    return Err(Error::Build("heightfield does not have any spans".into()));
                }
                self.assets.heightfield = Some(hf);
            }
            BuildState::MarkSpans => {
                if self.assets.heightfield.is_none() {
                    return Err(missing("heightfield"));
                }
            }
            BuildState::CompactFieldBuild => {
                let hf = self.assets.heightfield.as_ref().ok_or_else(|| missing("heightfield"))?;
                let chf = kernel.build_compact_heightfield(ctx, hf, p.walkable_height, p.walkable_step)?;
                let walkable = chf.walkable_span_count();
                ctx.log(format!("Built compact heightfield. Walkable spans: {walkable}"), Some(SOURCE));
                if !self.preserve.contains(AssetFlags::HEIGHTFIELD) {
                    self.assets.heightfield = None;
                }
                if walkable == 0 {
                    return Ok(StageOutcome::NoResult("no walkable spans"));
                }
                self.assets.compact_field = Some(chf);
            }
            BuildState::ApplyAreaMarkers => {
                if self.assets.compact_field.is_none() {
                    return Err(missing("compact heightfield"));
                }
            }
            BuildState::ErodeWalkableArea => {
                let chf = self.assets.compact_field.as_mut().ok_or_else(|| missing("compact heightfield"))?;
                if p.walkable_radius > 0 {
                    kernel.erode_walkable_area(ctx, chf, p.walkable_radius)?;
                    ctx.log(format!("Eroded walkable area by {} cells", p.walkable_radius), Some(SOURCE));
                }
            }
            BuildState::DistanceFieldBuild => {
                let chf = self.assets.compact_field.as_mut().ok_or_else(|| missing("compact heightfield"))?;
                kernel.build_distance_field(ctx, chf)?;
                ctx.log(format!("Built distance field. Max distance: {}", chf.max_distance), Some(SOURCE));
            }
            BuildState::RegionBuild => {
                let chf = self.assets.compact_field.as_mut().ok_or_else(|| missing("compact heightfield"))?;
                kernel.build_regions(ctx, chf, p.border_size, p.min_region_area, p.merge_region_area)?;
                ctx.log(format!("Built regions. Region count: {}", chf.max_regions.saturating_sub(1)), Some(SOURCE));
                // The null region counts, so a usable field has at least two
                if chf.max_regions < 2 {
                    return Ok(StageOutcome::NoResult("no usable regions"));
                }
            }
            BuildState::ContourBuild => {
                let chf = self.assets.compact_field.as_ref().ok_or_else(|| missing("compact heightfield"))?;
                let cset = kernel.build_contours(ctx, chf, p.edge_max_deviation, p.max_edge_length)?;
                ctx.log(format!("Built contour set. Contour count: {}", cset.contours.len()), Some(SOURCE));
                if cset.is_empty() {
                    return Err(Error::Build("no contours were generated".into()));
                }
                self.assets.contours = Some(cset);
            }
            BuildState::PolyMeshBuild => {
                let cset = self.assets.contours.as_ref().ok_or_else(|| missing("contour set"))?;
                let mesh = kernel.build_poly_mesh(ctx, cset, p.max_verts_per_poly as usize)?;
                ctx.log(format!("Built poly mesh. Poly count: {}", mesh.npolys), Some(SOURCE));
                if !self.preserve.contains(AssetFlags::CONTOUR_SET) {
                    self.assets.contours = None;
                }
                if mesh.is_empty() {
                    return Err(Error::Build("no polygons were generated".into()));
                }
                self.assets.poly_mesh = Some(mesh);
            }
            BuildState::DetailMeshBuild => {
                let mesh = self.assets.poly_mesh.as_ref().ok_or_else(|| missing("poly mesh"))?;
                let chf = self.assets.compact_field.as_ref().ok_or_else(|| missing("compact heightfield"))?;
                let detail = kernel.build_poly_mesh_detail(
                    ctx,
                    mesh,
                    chf,
                    p.detail_sample_distance,
                    p.detail_max_deviation,
                )?;
                ctx.log(format!("Built detail mesh. Triangle count: {}", detail.tri_count), Some(SOURCE));
                if !self.preserve.contains(AssetFlags::COMPACT_FIELD) {
                    self.assets.compact_field = None;
                }
                self.assets.detail_mesh = Some(detail);
            }
            BuildState::Initialized | BuildState::Complete | BuildState::Aborted => {}
        }
        Ok(StageOutcome::Continue)
    }
}

fn missing(what: &str) -> Error {
    Error::Build(format!("{what} is not available"))
}
