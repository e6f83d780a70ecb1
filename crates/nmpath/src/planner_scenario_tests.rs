//! End to end scenarios: agents following paths from a running planner

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::{Quat, Vec3};
use nav_common::{Result, TriangleMesh};
use web_time::Instant;

use crate::test_mesh_helpers::*;
use crate::*;

const START: Vec3 = Vec3::new(0.3, 0.0, 0.6);
const GOAL: Vec3 = Vec3::new(2.6, 0.0, 2.5);
const CORNER: Vec3 = Vec3::new(2.0, 0.0, 1.0);

fn agent(position: Vec3, goal: Vec3) -> NavigationData {
    let mut nav = NavigationData::new(position, Quat::IDENTITY, 0.3);
    nav.goal_position = goal;
    nav
}

fn quick_config() -> PlannerConfig {
    PlannerConfig {
        frame_length: Duration::from_millis(2),
        max_processing_time: Duration::from_millis(20),
        ..PlannerConfig::default()
    }
}

fn wait_for<T>(request: &NavRequest<T>) -> NavRequestState {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !request.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    request.state()
}

#[cfg(test)]
mod threaded_scenarios {
    use super::*;

    #[test]
    fn test_connected_path_moves_target_towards_goal() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut threaded = ThreadedPlanner::new(MasterPlanner::new(l_mesh(0.1)?, quick_config())?);
        assert!(threaded.start());

        let request = threaded.planner().get_path(START, GOAL);
        assert_eq!(wait_for(&request), NavRequestState::Complete);

        let mut path = request.data().unwrap();
        let target = path.get_target(START).unwrap();
        assert!(target.distance(GOAL) < START.distance(GOAL));
        Ok(())
    }

    #[test]
    fn test_island_request_fails() -> Result<()> {
        let mut threaded = ThreadedPlanner::new(MasterPlanner::new(island_mesh()?, quick_config())?);
        assert!(threaded.start());

        let request = threaded
            .planner()
            .get_path(Vec3::new(0.3, 0.0, 0.6), Vec3::new(6.5, 0.0, 0.3));
        assert_eq!(wait_for(&request), NavRequestState::Failed);
        Ok(())
    }

    #[test]
    fn test_many_clients_all_finish() -> Result<()> {
        let mut threaded = ThreadedPlanner::new(MasterPlanner::new(
            Arc::new(grid_nav_mesh(8, 8, &[(3, 3), (4, 3), (3, 4)])?),
            PlannerConfig {
                search_pool_size: 3,
                ..quick_config()
            },
        )?);
        assert!(threaded.start());

        let handles: Vec<_> = (0..6u32)
            .map(|i| {
                let planner = threaded.planner();
                thread::spawn(move || {
                    let start = Vec3::new(0.3 + i as f32, 0.0, 0.6);
                    let goal = Vec3::new(7.6 - i as f32, 0.0, 7.3);
                    let request = planner.get_path(start, goal);
                    (wait_for(&request), request.data())
                })
            })
            .collect();

        for handle in handles {
            let (state, path) = handle.join().expect("client thread panicked");
            assert_eq!(state, NavRequestState::Complete);
            assert!(path.is_some());
        }
        Ok(())
    }

    #[test]
    fn test_disposing_mid_flight_fails_requests() -> Result<()> {
        let config = PlannerConfig {
            frame_length: Duration::from_millis(200),
            ..quick_config()
        };
        let mut threaded = ThreadedPlanner::new(MasterPlanner::new(l_mesh(0.0)?, config)?);
        let planner = threaded.planner();
        assert!(threaded.start());
        // Let the thread settle into its first sleep
        thread::sleep(Duration::from_millis(20));

        let request = planner.get_path(START, GOAL);
        threaded.dispose();
        assert_eq!(wait_for(&request), NavRequestState::Failed);
        assert_eq!(planner.get_path(START, GOAL).state(), NavRequestState::Failed);
        Ok(())
    }
}

#[cfg(test)]
mod client_scenarios {
    use super::*;

    /// A manager that has adopted a path on the L mesh
    fn following() -> Result<(MasterPlanner, ClientPathManager, NavigationData)> {
        let mut master = MasterPlanner::new(l_mesh(0.0)?, quick_config())?;
        let mut manager = ClientPathManager::new(Some(master.planner()));
        let mut nav = agent(START, GOAL);

        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(manager.has_pending_request());
        // Nothing processed yet, so the same request is still pending
        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert_eq!(nav.target_position, nav.position);

        master.process(true);
        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(manager.path().is_some());
        Ok((master, manager, nav))
    }

    #[test]
    fn test_follows_corner_then_goal() -> Result<()> {
        let (_master, mut manager, mut nav) = following()?;
        assert!(nav.target_position.distance(CORNER) < 1e-4);

        nav.position = Vec3::new(2.5, 0.0, 1.2);
        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(nav.target_position.distance(GOAL) < 1e-5);
        Ok(())
    }

    #[test]
    fn test_without_planner_fails() {
        let mut manager = ClientPathManager::new(None);
        let mut nav = agent(START, GOAL);
        assert_eq!(manager.update(&mut nav), NavigationState::Failed);
        // Failed is sticky until exit
        assert_eq!(manager.update(&mut nav), NavigationState::Failed);

        manager.exit(&mut nav);
        assert_eq!(manager.state(), NavigationState::Inactive);
    }

    #[test]
    fn test_dispose_while_active_fails_and_stops() -> Result<()> {
        let (mut master, mut manager, mut nav) = following()?;
        assert_ne!(nav.target_position, nav.position);

        master.dispose();
        assert_eq!(manager.update(&mut nav), NavigationState::Failed);
        assert_eq!(nav.target_position, nav.position);
        assert!(manager.path().is_none());
        Ok(())
    }

    #[test]
    fn test_off_corridor_forces_new_search_on_tick_31() -> Result<()> {
        let (_master, mut manager, mut nav) = following()?;
        let last_target = nav.target_position;

        // Blocked square, outside the corridor
        nav.position = Vec3::new(0.5, 0.0, 2.5);
        for tick in 1..=30 {
            assert_eq!(manager.update(&mut nav), NavigationState::Active);
            assert_eq!(nav.target_position, last_target, "target moved on tick {tick}");
            assert!(manager.path().is_some());
        }

        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert_eq!(nav.target_position, nav.position);
        assert!(manager.path().is_none());

        // The next tick asks for a new path
        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(manager.has_pending_request());
        Ok(())
    }

    #[test]
    fn test_custom_failure_threshold() -> Result<()> {
        let mut master = MasterPlanner::new(l_mesh(0.0)?, quick_config())?;
        let mut manager = ClientPathManager::new(Some(master.planner())).with_failure_threshold(2);
        let mut nav = agent(START, GOAL);
        manager.update(&mut nav);
        master.process(true);
        manager.update(&mut nav);

        nav.position = Vec3::new(0.5, 0.0, 2.5);
        manager.update(&mut nav);
        manager.update(&mut nav);
        assert!(manager.path().is_some());
        manager.update(&mut nav);
        assert!(manager.path().is_none());
        Ok(())
    }

    #[test]
    fn test_goal_change_requests_new_path() -> Result<()> {
        let (mut master, mut manager, mut nav) = following()?;
        let first = manager.path().unwrap().id();

        nav.goal_position = Vec3::new(2.6, 0.0, 0.3);
        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(manager.has_pending_request());
        assert!(manager.path().is_none());

        master.process(true);
        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        let path = manager.path().unwrap();
        assert_ne!(path.id(), first);
        assert_eq!(path.goal(), nav.goal_position);
        Ok(())
    }

    #[test]
    fn test_goal_jitter_keeps_path() -> Result<()> {
        let (_master, mut manager, mut nav) = following()?;
        let first = manager.path().unwrap().id();

        nav.goal_position.x += 1e-6;
        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(!manager.has_pending_request());
        assert_eq!(manager.path().map(Path::id), Some(first));
        assert!(nav.target_position.distance(CORNER) < 1e-4);
        Ok(())
    }

    #[test]
    fn test_failed_search_fails_manager() -> Result<()> {
        let mut master = MasterPlanner::new(island_mesh()?, quick_config())?;
        let mut manager = ClientPathManager::new(Some(master.planner()));
        let mut nav = agent(Vec3::new(0.3, 0.0, 0.6), Vec3::new(6.5, 0.0, 0.3));

        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(master.process_all(1_000));
        assert_eq!(manager.update(&mut nav), NavigationState::Failed);
        assert_eq!(nav.target_position, nav.position);
        Ok(())
    }

    #[test]
    fn test_swapping_planner_restarts() -> Result<()> {
        let (mut master, mut manager, mut nav) = following()?;
        let mut other = MasterPlanner::new(l_mesh(0.0)?, quick_config())?;
        manager.set_planner(Some(other.planner()));

        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(manager.has_pending_request());
        master.process(true);
        assert!(master.is_idle());

        other.process(true);
        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(manager.path().is_some());
        Ok(())
    }

    #[test]
    fn test_exit_discards_pending_request() -> Result<()> {
        let mut master = MasterPlanner::new(l_mesh(0.0)?, quick_config())?;
        let mut manager = ClientPathManager::new(Some(master.planner()));
        let mut nav = agent(START, GOAL);
        manager.update(&mut nav);
        assert!(manager.has_pending_request());

        manager.exit(&mut nav);
        assert_eq!(manager.state(), NavigationState::Inactive);
        assert!(!manager.has_pending_request());
        master.process(true);
        assert_eq!(master.cached_path_count(), 0);

        // Re-entering starts over
        assert_eq!(manager.update(&mut nav), NavigationState::Active);
        assert!(manager.has_pending_request());
        Ok(())
    }
}

#[cfg(test)]
mod generated_mesh_scenarios {
    use super::*;
    use nmgen::{IncrementalBuilder, NMGenParams, NMGenTileParams, ProcessorSet, MAX_AREA};

    #[test]
    fn test_path_on_generated_tile() -> Result<()> {
        let mesh = TriangleMesh::from_parts(
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 10.0),
                Vec3::new(10.0, 0.0, 10.0),
                Vec3::new(10.0, 0.0, 0.0),
            ],
            &[[0, 1, 2], [0, 2, 3]],
        )?;
        let tile = NMGenTileParams::new(0, 0, Vec3::new(0.0, -1.0, 0.0), Vec3::new(10.0, 1.0, 10.0))?;
        let mut builder = IncrementalBuilder::new(
            tile,
            &NMGenParams::default(),
            mesh,
            vec![MAX_AREA; 2],
            ProcessorSet::default(),
        )?;
        builder.build_all();
        let result = builder.take_result().expect("plane produces a mesh");
        let (poly, detail) = (result.poly_mesh.unwrap(), result.detail_mesh.unwrap());

        let nav_mesh = Arc::new(TriNavMesh::from_poly_mesh(&poly, &detail, &NavMeshConfig::default())?);
        assert!(nav_mesh.cell_count() >= poly.npolys);

        let mut master = MasterPlanner::new(nav_mesh, quick_config())?;
        let start = Vec3::new(3.0, 0.0, 3.0);
        let goal = Vec3::new(7.0, 0.0, 7.0);
        let request = master.planner().get_path(start, goal);
        assert!(master.process_all(1_000));

        let mut path = request.data().expect("path across the tile");
        let target = path.get_target(start).unwrap();
        assert!(target.distance(goal) < start.distance(goal));
        Ok(())
    }
}
