//! Path planning on triangle cell navigation meshes
//!
//! A [`MasterPlanner`] owns a [`TriNavMesh`] and answers requests submitted
//! through cloneable [`Planner`] handles. Searches are incremental, so the
//! planner can run them a little at a time, usually on the thread owned by a
//! [`ThreadedPlanner`]. Found corridors are cached as [`MasterPath`]s and
//! handed out as [`Path`]s. Agents follow them with a
//! [`ClientPathManager`], which turns the corridor into steering targets in
//! their [`NavigationData`].

mod client_path_manager;
mod config;
mod heuristic;
mod master_path;
mod master_planner;
mod nav_mesh;
mod nav_request;
mod navigation_data;
mod search;
mod threaded_planner;

#[cfg(test)]
mod planner_scenario_tests;
#[cfg(test)]
mod test_mesh_helpers;

pub use client_path_manager::{ClientPathManager, DEFAULT_FAILURE_THRESHOLD, GOAL_MATCH_TOLERANCE_SQ};
pub use config::{NavMeshConfig, PlannerConfig, MAX_OFFSET_SCALE};
pub use heuristic::DistanceHeuristic;
pub use master_path::{MasterPath, Path};
pub use master_planner::{MasterPlanner, Planner};
pub use nav_mesh::{TriCell, TriNavMesh};
pub use nav_request::{NavRequest, NavRequestState};
pub use navigation_data::{NavigationData, NavigationState, DEFAULT_POSITION_TOLERANCE};
pub use search::{AStarSearch, DijkstraSearch, SearchState};
pub use threaded_planner::ThreadedPlanner;
