//! Incremental navigation mesh generation
//!
//! A tile is built from a triangle mesh in small steps by an
//! [`IncrementalBuilder`]: the geometry is voxelized into a [`Heightfield`],
//! reduced to the walkable [`CompactHeightfield`], partitioned into regions,
//! traced into contours and finally triangulated into a [`PolyMesh`] and a
//! [`PolyMeshDetail`]. [`NMGenProcessor`]s hook into the pipeline after each
//! stage. Builds can run on worker threads as [`BuildTask`]s, scheduled by a
//! [`ThreadedBuildManager`].

mod builder;
mod compact_heightfield;
mod config;
mod context;
mod contour;
mod detail_mesh;
mod heightfield;
mod kernel;
mod manager;
mod poly_mesh;
mod processor;
mod processors;
mod region;
mod state;
mod task;
mod tile_set;

#[cfg(test)]
mod builder_tests;
#[cfg(test)]
mod task_concurrency_tests;

pub use builder::{IncrementalBuilder, NMGenMesh};
pub use compact_heightfield::{
    CompactCell, CompactHeightfield, CompactSpan, DIR_OFFSET_X, DIR_OFFSET_Z, NOT_CONNECTED,
};
pub use config::{
    NMGenFlags, NMGenParams, NMGenTileParams, DEFAULT_POLY_FLAG, MAX_ALLOWED_SLOPE,
    MAX_ALLOWED_VERTS_PER_POLY, MAX_AREA, MIN_CELL_SIZE, MIN_WALKABLE_HEIGHT, NULL_AREA,
    SPAN_MAX_HEIGHT,
};
pub use context::{BuildContext, BuildMessage, MessageLevel, MAX_MESSAGES};
pub use contour::{build_contours, Contour, ContourSet, CONTOUR_VERTEX_SHARED};
pub use detail_mesh::{build_poly_mesh_detail, PolyMeshDetail};
pub use heightfield::{clear_unwalkable_triangles, Heightfield, Span};
pub use kernel::{GeometryKernel, VoxelKernel};
pub use manager::ThreadedBuildManager;
pub use poly_mesh::{build_poly_mesh, PolyMesh, MESH_NULL_IDX};
pub use processor::{
    AssetFlags, NMGenAssets, NMGenContext, NMGenProcessor, ProcessorSet, DEFAULT_PRIORITY,
    MIN_PRIORITY,
};
pub use processors::{
    ApplyPolygonFlags, AreaConvexMarker, AreaCylinderMarker, AreaMeshMarker, FilterLedgeSpans,
    FilterLowHeightSpans, FilterLowObstacles,
};
pub use region::build_regions;
pub use state::BuildState;
pub use task::{BuildTask, BuildTaskSnapshot, BuildTaskState};
pub use tile_set::{InputGeometry, TileSetDefinition};
