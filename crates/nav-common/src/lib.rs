//! Common utilities and data structures shared by the navigation mesh builder
//! and the path planner

mod chunky_tri_mesh;
mod geometry;
mod mesh;

pub use chunky_tri_mesh::*;
pub use geometry::*;
pub use mesh::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("navigation mesh generation failed: {0}")]
    NavMeshGeneration(String),

    #[error("build failed: {0}")]
    Build(String),

    #[error("pathfinding failed: {0}")]
    Pathfinding(String),
}

/// Result type for navigation operations
pub type Result<T> = std::result::Result<T, Error>;
