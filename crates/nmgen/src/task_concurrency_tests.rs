//! Tests of builds running on worker threads

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use glam::Vec3;
use nav_common::{Error, Result, TriangleMesh};
use web_time::Instant;

use crate::*;

fn plane_builder(tile_x: i32) -> Result<IncrementalBuilder> {
    let mesh = TriangleMesh::from_parts(
        &[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 8.0),
            Vec3::new(8.0, 0.0, 8.0),
            Vec3::new(8.0, 0.0, 0.0),
        ],
        &[[0, 1, 2], [0, 2, 3]],
    )?;
    let tile = NMGenTileParams::new(tile_x, 0, Vec3::new(0.0, -1.0, 0.0), Vec3::new(8.0, 1.0, 8.0))?;
    IncrementalBuilder::new(tile, &NMGenParams::default(), mesh, vec![MAX_AREA; 2], ProcessorSet::default())
}

struct ExplodingContours;

impl GeometryKernel for ExplodingContours {
    fn build_contours(
        &mut self,
        _ctx: &mut BuildContext,
        _chf: &CompactHeightfield,
        _max_error: f32,
        _max_edge_len: i32,
    ) -> Result<ContourSet> {
        panic!("kernel exploded");
    }
}

/// Parks the worker inside the contour stage until released
struct GatedContours {
    reached: Sender<()>,
    release: Receiver<()>,
}

impl GeometryKernel for GatedContours {
    fn build_contours(
        &mut self,
        _ctx: &mut BuildContext,
        _chf: &CompactHeightfield,
        _max_error: f32,
        _max_edge_len: i32,
    ) -> Result<ContourSet> {
        let _ = self.reached.send(());
        let _ = self.release.recv_timeout(Duration::from_secs(10));
        Err(Error::Build("released after abort".into()))
    }
}

#[cfg(test)]
mod task_tests {
    use super::*;

    #[test]
    fn test_run_completes() -> Result<()> {
        let task = BuildTask::new(plane_builder(3)?, 0)?;
        assert_eq!(task.task_state(), BuildTaskState::Inactive);
        assert_eq!((task.tile_x(), task.tile_z()), (3, 0));

        task.run();
        let snapshot = task.snapshot();
        assert_eq!(snapshot.task_state, BuildTaskState::Complete);
        assert_eq!(snapshot.build_state, BuildState::Complete);
        assert!(snapshot.result.as_ref().is_some_and(NMGenMesh::has_result));
        assert!(!snapshot.messages.is_empty());

        // A second run is a no-op
        task.run();
        assert_eq!(task.task_state(), BuildTaskState::Complete);
        assert!(!task.request_abort("too late"));
        assert!(task.result().is_some());
        Ok(())
    }

    #[test]
    fn test_abort_before_run() -> Result<()> {
        let task = BuildTask::new(plane_builder(0)?, 0)?;
        assert!(task.request_abort("shutdown"));
        assert!(!task.request_abort("again"));

        task.run();
        assert_eq!(task.task_state(), BuildTaskState::Aborted);
        assert_eq!(task.build_state(), BuildState::Aborted);
        assert!(task.result().is_none());
        let messages = task.messages();
        assert_eq!(
            messages.iter().filter(|m| m.starts_with("Abort requested")).count(),
            1
        );
        assert!(messages.iter().any(|m| m.contains("shutdown")));
        Ok(())
    }

    #[test]
    fn test_abort_racing_completion_has_one_outcome() -> Result<()> {
        for i in 0..8 {
            let task = BuildTask::new(plane_builder(i)?, 0)?;
            let worker = task.clone();
            let handle = thread::spawn(move || worker.run());
            if i % 2 == 1 {
                thread::sleep(Duration::from_millis(1));
            }
            let aborted = task.request_abort("race");
            handle.join().expect("worker thread panicked");

            let snapshot = task.snapshot();
            if aborted {
                assert_eq!(snapshot.task_state, BuildTaskState::Aborted);
                assert_eq!(snapshot.build_state, BuildState::Aborted);
                assert!(snapshot.result.is_none());
            } else {
                assert_eq!(snapshot.task_state, BuildTaskState::Complete);
                assert!(snapshot.result.is_some());
            }
        }
        Ok(())
    }

    #[test]
    fn test_abort_mid_build_keeps_stage_history() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let (reached_tx, reached_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mesh = TriangleMesh::from_parts(
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 8.0),
                Vec3::new(8.0, 0.0, 8.0),
                Vec3::new(8.0, 0.0, 0.0),
            ],
            &[[0, 1, 2], [0, 2, 3]],
        )?;
        let tile = NMGenTileParams::new(0, 0, Vec3::new(0.0, -1.0, 0.0), Vec3::new(8.0, 1.0, 8.0))?;
        let builder = IncrementalBuilder::with_kernel(
            tile,
            &NMGenParams::default(),
            mesh,
            vec![MAX_AREA; 2],
            ProcessorSet::default(),
            Box::new(GatedContours {
                reached: reached_tx,
                release: release_rx,
            }),
        )?;
        let task = BuildTask::new(builder, 0)?;

        let worker = task.clone();
        let handle = thread::spawn(move || worker.run());
        reached_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("worker reached the contour stage");

        assert!(task.request_abort("shutdown"));
        let _ = release_tx.send(());
        handle.join().expect("worker thread panicked");

        assert_eq!(task.task_state(), BuildTaskState::Aborted);
        assert_eq!(task.build_state(), BuildState::Aborted);
        let messages = task.messages();
        assert!(messages.iter().any(|m| m.contains("Built regions")));
        assert_eq!(messages.last().map(String::as_str), Some("Abort requested: shutdown"));
        Ok(())
    }

    #[test]
    fn test_panic_becomes_abort() -> Result<()> {
        let mesh = TriangleMesh::from_parts(
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 8.0),
                Vec3::new(8.0, 0.0, 8.0),
            ],
            &[[0, 1, 2]],
        )?;
        let tile = NMGenTileParams::new(0, 0, Vec3::new(0.0, -1.0, 0.0), Vec3::new(8.0, 1.0, 8.0))?;
        let builder = IncrementalBuilder::with_kernel(
            tile,
            &NMGenParams::default(),
            mesh,
            vec![MAX_AREA],
            ProcessorSet::default(),
            Box::new(ExplodingContours),
        )?;
        let task = BuildTask::new(builder, 0)?;

        let worker = task.clone();
        thread::spawn(move || worker.run())
            .join()
            .expect("panic must not escape the task");

        assert_eq!(task.task_state(), BuildTaskState::Aborted);
        assert_eq!(task.build_state(), BuildState::Aborted);
        assert!(task
            .messages()
            .iter()
            .any(|m| m == "Aborted on exception: kernel exploded"));
        Ok(())
    }

    struct MainThreadOnly;

    impl NMGenProcessor for MainThreadOnly {
        fn name(&self) -> &str {
            "MainThreadOnly"
        }

        fn is_thread_safe(&self) -> bool {
            false
        }

        fn process_build(&mut self, _state: BuildState, _ctx: &mut NMGenContext<'_>) -> bool {
            true
        }
    }

    #[test]
    fn test_rejects_unsuitable_builders() -> Result<()> {
        let mut done = plane_builder(0)?;
        done.build_all();
        assert!(BuildTask::new(done, 0).is_err());

        let mesh = TriangleMesh::from_parts(
            &[Vec3::ZERO, Vec3::new(0.0, 0.0, 4.0), Vec3::new(4.0, 0.0, 4.0)],
            &[[0, 1, 2]],
        )?;
        let tile = NMGenTileParams::new(0, 0, Vec3::new(0.0, -1.0, 0.0), Vec3::new(4.0, 1.0, 4.0))?;
        let unsafe_builder = IncrementalBuilder::new(
            tile,
            &NMGenParams::default(),
            mesh,
            vec![MAX_AREA],
            ProcessorSet::new(vec![Box::new(MainThreadOnly)]),
        )?;
        assert!(BuildTask::new(unsafe_builder, 0).is_err());
        Ok(())
    }
}

#[cfg(test)]
mod manager_tests {
    use super::*;

    fn wait_idle(manager: &mut ThreadedBuildManager) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while !manager.is_idle() {
            assert!(Instant::now() < deadline, "builds did not finish");
            manager.update();
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_manager_runs_all_tasks() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut manager = ThreadedBuildManager::new(2);
        for x in 0..5 {
            manager.queue_task(BuildTask::new(plane_builder(x)?, 0)?);
        }
        assert_eq!(manager.queued_count(), 5);

        manager.update();
        assert!(manager.running_count() <= 2);
        wait_idle(&mut manager);

        let finished = manager.take_finished();
        assert_eq!(finished.len(), 5);
        assert!(finished
            .iter()
            .all(|t| t.task_state() == BuildTaskState::Complete));
        assert!(manager.take_finished().is_empty());
        Ok(())
    }

    #[test]
    fn test_queue_orders_by_priority() -> Result<()> {
        let mut manager = ThreadedBuildManager::new(1);
        for (x, priority) in [(0, 1), (1, 5), (2, 3), (3, 5)] {
            manager.queue_task(BuildTask::new(plane_builder(x)?, priority)?);
        }
        manager.abort_all("cancelled");

        let order: Vec<i32> = manager.take_finished().iter().map(BuildTask::tile_x).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
        assert!(manager.is_idle());
        Ok(())
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        assert_eq!(ThreadedBuildManager::new(0).max_concurrent(), 1);
    }
}
