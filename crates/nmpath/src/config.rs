//! Path planner and navigation mesh settings

use std::time::Duration;

use nav_common::{Error, Result};

use crate::DistanceHeuristic;

/// Largest allowed corner offset, as a fraction of the portal width
pub const MAX_OFFSET_SCALE: f32 = 0.5;

/// Settings of a [`TriNavMesh`](crate::TriNavMesh)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavMeshConfig {
    /// Vertical distance within which a point counts as standing on a cell
    pub plane_tolerance: f32,
    /// How far path corners are pulled into the portal, 0..=0.5
    pub offset_scale: f32,
    /// Initial XZ radius of the nearest cell search
    pub search_radius: f32,
    /// Triangles per spatial index chunk
    pub tris_per_chunk: usize,
}

impl Default for NavMeshConfig {
    fn default() -> Self {
        Self {
            plane_tolerance: 0.5,
            offset_scale: 0.1,
            search_radius: 1.0,
            tris_per_chunk: 256,
        }
    }
}

impl NavMeshConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.plane_tolerance > 0.0) {
            return Err(Error::InvalidConfig("plane tolerance must be positive".into()));
        }
        if !(0.0..=MAX_OFFSET_SCALE).contains(&self.offset_scale) {
            return Err(Error::InvalidConfig(format!(
                "offset scale {} is outside 0..={MAX_OFFSET_SCALE}",
                self.offset_scale
            )));
        }
        if !(self.search_radius > 0.0) {
            return Err(Error::InvalidConfig("search radius must be positive".into()));
        }
        Ok(())
    }
}

/// Settings of a [`MasterPlanner`](crate::MasterPlanner) and the thread
/// driving it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PlannerConfig {
    pub heuristic: DistanceHeuristic,
    /// Target length of one planner thread iteration
    pub frame_length: Duration,
    /// Interval between maintenance passes
    pub maintenance_frequency: Duration,
    /// Time budget for searches in one `process` call
    pub max_processing_time: Duration,
    /// Searches advanced concurrently, the rest wait in submission order
    pub search_pool_size: usize,
    /// Capacity of the path cache
    pub max_cached_paths: usize,
    /// Cached paths unused for longer than this are evicted. Zero disables
    /// the cache.
    pub max_path_age: Duration,
    /// Maximum corridor length of a repair search
    pub repair_search_depth: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            heuristic: DistanceHeuristic::LongestAxis,
            frame_length: Duration::from_millis(10),
            maintenance_frequency: Duration::from_millis(500),
            max_processing_time: Duration::from_millis(2),
            search_pool_size: 20,
            max_cached_paths: 64,
            max_path_age: Duration::from_secs(60),
            repair_search_depth: 2,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.search_pool_size == 0 {
            return Err(Error::InvalidConfig("search pool size must be at least 1".into()));
        }
        if self.max_cached_paths == 0 {
            return Err(Error::InvalidConfig("path cache must hold at least one path".into()));
        }
        if self.repair_search_depth == 0 {
            return Err(Error::InvalidConfig("repair search depth must be at least 1".into()));
        }
        Ok(())
    }

    pub fn caching_enabled(&self) -> bool {
        !self.max_path_age.is_zero()
    }
}
