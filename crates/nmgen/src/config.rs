//! Configuration for the navigation mesh build process

use glam::Vec3;
use nav_common::{Error, Result};

/// The minimum allowed cell size
pub const MIN_CELL_SIZE: f32 = 0.01;

/// The maximum number of vertices a polygon may have
pub const MAX_ALLOWED_VERTS_PER_POLY: i32 = 6;

/// The minimum walkable height in cells
pub const MIN_WALKABLE_HEIGHT: i32 = 3;

/// The maximum walkable slope in degrees
pub const MAX_ALLOWED_SLOPE: f32 = 85.0;

/// Area id of unwalkable geometry
pub const NULL_AREA: u8 = 0;

/// The highest area id, also the default id given to walkable geometry
pub const MAX_AREA: u8 = 63;

/// Flag applied to polygons when no other flags are configured
pub const DEFAULT_POLY_FLAG: u16 = 0x01;

/// Maximum span height in cells
pub const SPAN_MAX_HEIGHT: u16 = 0x1fff;

bitflags::bitflags! {
    /// Selects the standard optional build steps
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(
        feature = "serialization",
        derive(serde::Serialize, serde::Deserialize)
    )]
    pub struct NMGenFlags: u8 {
        /// Mark spans next to ledges as unwalkable
        const LEDGE_SPANS_NOT_WALKABLE = 0x01;
        /// Mark spans without enough clearance as unwalkable
        const LOW_HEIGHT_SPANS_NOT_WALKABLE = 0x02;
        /// Make low obstacles next to walkable spans walkable
        const LOW_OBSTACLES_WALKABLE = 0x04;
        /// Apply the default polygon flag to every polygon
        const APPLY_POLY_FLAGS = 0x08;
    }
}

impl Default for NMGenFlags {
    fn default() -> Self {
        Self::LEDGE_SPANS_NOT_WALKABLE
            | Self::LOW_HEIGHT_SPANS_NOT_WALKABLE
            | Self::LOW_OBSTACLES_WALKABLE
            | Self::APPLY_POLY_FLAGS
    }
}

/// Configuration parameters for navigation mesh generation
///
/// Values suffixed with "cells" are in voxel units, everything else is in
/// world units unless noted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NMGenParams {
    /// Width and depth of a tile in cells. Zero disables tiling.
    pub tile_size: i32,
    /// Size of the non-navigable border around the heightfield, in cells
    pub border_size: i32,
    /// The width/depth resolution of the field (cell size)
    pub xz_cell_size: f32,
    /// The height resolution of the field (cell height)
    pub y_cell_size: f32,
    /// The maximum slope in degrees that is considered walkable
    pub walkable_slope: f32,
    /// Minimum floor to ceiling height that is still walkable, in cells
    pub walkable_height: i32,
    /// Maximum ledge height that is still traversable, in cells
    pub walkable_step: i32,
    /// Distance to erode the walkable area away from obstructions, in cells
    pub walkable_radius: i32,
    /// Maximum length of contour edges, in cells. Zero disables splitting.
    pub max_edge_length: i32,
    /// Maximum distance a simplified contour may deviate from the raw contour, in cells
    pub edge_max_deviation: f32,
    /// Islands smaller than this many cells are removed
    pub min_region_area: i32,
    /// Regions smaller than this many cells are merged into neighbours where possible
    pub merge_region_area: i32,
    /// Maximum vertices per polygon
    pub max_verts_per_poly: i32,
    /// Sampling distance for the detail mesh, in cells. Zero disables height sampling.
    pub detail_sample_distance: f32,
    /// Maximum distance the detail mesh may deviate from the heightfield, in cells
    pub detail_max_deviation: f32,
    /// Triangles per chunk of the input geometry index
    pub tris_per_chunk: usize,
}

impl Default for NMGenParams {
    fn default() -> Self {
        Self {
            tile_size: 0,
            border_size: 0,
            xz_cell_size: 0.2,
            y_cell_size: 0.1,
            walkable_slope: 45.5,
            walkable_height: 19,
            walkable_step: 3,
            walkable_radius: 2,
            max_edge_length: 12,
            edge_max_deviation: 3.0,
            min_region_area: 25,
            merge_region_area: 75,
            max_verts_per_poly: 6,
            detail_sample_distance: 6.0,
            detail_max_deviation: 1.0,
            tris_per_chunk: 256,
        }
    }
}

impl NMGenParams {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.xz_cell_size >= MIN_CELL_SIZE) || !(self.y_cell_size >= MIN_CELL_SIZE) {
            return Err(Error::InvalidConfig(format!(
                "cell sizes must be at least {MIN_CELL_SIZE}"
            )));
        }

        if !(0.0..=MAX_ALLOWED_SLOPE).contains(&self.walkable_slope) {
            return Err(Error::InvalidConfig(format!(
                "walkable slope {} is outside 0..={MAX_ALLOWED_SLOPE}",
                self.walkable_slope
            )));
        }

        if self.walkable_height < MIN_WALKABLE_HEIGHT {
            return Err(Error::InvalidConfig(format!(
                "walkable height must be at least {MIN_WALKABLE_HEIGHT} cells"
            )));
        }

        if self.walkable_step < 0 || self.walkable_radius < 0 {
            return Err(Error::InvalidConfig(
                "walkable step and radius must not be negative".to_string(),
            ));
        }

        if self.tile_size < 0 || self.border_size < 0 {
            return Err(Error::InvalidConfig(
                "tile and border sizes must not be negative".to_string(),
            ));
        }

        if self.max_edge_length < 0 || !(self.edge_max_deviation >= 0.0) {
            return Err(Error::InvalidConfig(
                "contour edge parameters must not be negative".to_string(),
            ));
        }

        if self.min_region_area < 0 || self.merge_region_area < 0 {
            return Err(Error::InvalidConfig(
                "region areas must not be negative".to_string(),
            ));
        }

        if !(3..=MAX_ALLOWED_VERTS_PER_POLY).contains(&self.max_verts_per_poly) {
            return Err(Error::InvalidConfig(format!(
                "vertices per polygon must be in 3..={MAX_ALLOWED_VERTS_PER_POLY}"
            )));
        }

        if !(self.detail_sample_distance == 0.0 || self.detail_sample_distance >= 0.9)
            || !(self.detail_max_deviation >= 0.0)
        {
            return Err(Error::InvalidConfig(
                "detail sample distance must be 0 or at least 0.9, deviation must not be negative"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Walkable height in world units
    pub fn world_walkable_height(&self) -> f32 {
        self.walkable_height as f32 * self.y_cell_size
    }

    /// Walkable step in world units
    pub fn world_walkable_step(&self) -> f32 {
        self.walkable_step as f32 * self.y_cell_size
    }

    /// Walkable radius in world units
    pub fn world_walkable_radius(&self) -> f32 {
        self.walkable_radius as f32 * self.xz_cell_size
    }
}

/// Location and bounds of the tile being built
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NMGenTileParams {
    pub tile_x: i32,
    pub tile_z: i32,
    /// Minimum bounds of the tile, excluding the border
    pub bmin: Vec3,
    /// Maximum bounds of the tile, excluding the border
    pub bmax: Vec3,
}

impl NMGenTileParams {
    pub fn new(tile_x: i32, tile_z: i32, bmin: Vec3, bmax: Vec3) -> Result<Self> {
        if !(bmin.x < bmax.x && bmin.z < bmax.z && bmin.y <= bmax.y) {
            return Err(Error::InvalidConfig(format!(
                "invalid tile bounds {bmin} .. {bmax}"
            )));
        }
        Ok(Self {
            tile_x,
            tile_z,
            bmin,
            bmax,
        })
    }
}
