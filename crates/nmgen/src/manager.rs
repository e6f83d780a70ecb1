//! Runs queued build tasks on worker threads

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};

use crate::BuildTask;

/// Queue of build tasks with a cap on concurrently running workers
///
/// Nothing happens in the background until [`update`](Self::update) is
/// called: each call reaps finished workers and starts queued tasks.
#[derive(Debug)]
pub struct ThreadedBuildManager {
    max_concurrent: usize,
    queue: VecDeque<BuildTask>,
    running: Vec<(BuildTask, JoinHandle<()>)>,
    finished: Vec<BuildTask>,
}

impl ThreadedBuildManager {
    /// `max_concurrent` is clamped to at least one worker
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            queue: VecDeque::new(),
            running: Vec::new(),
            finished: Vec::new(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Queues a task; higher priorities start first, equal priorities in
    /// submission order
    pub fn queue_task(&mut self, task: BuildTask) {
        let at = self
            .queue
            .iter()
            .position(|t| t.priority() < task.priority())
            .unwrap_or(self.queue.len());
        self.queue.insert(at, task);
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// True when nothing is queued or running
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty()
    }

    /// Reaps finished workers and starts queued tasks up to the limit
    pub fn update(&mut self) {
        let mut i = 0;
        while i < self.running.len() {
            if self.running[i].1.is_finished() {
                let (task, handle) = self.running.swap_remove(i);
                if handle.join().is_err() {
                    log::error!("Build worker for tile ({}, {}) panicked", task.tile_x(), task.tile_z());
                }
                self.finished.push(task);
            } else {
                i += 1;
            }
        }

        while self.running.len() < self.max_concurrent {
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            if task.is_finished() {
                self.finished.push(task);
                continue;
            }

            let worker = task.clone();
            let spawned = thread::Builder::new()
                .name(format!("nmgen-build-{}-{}", task.tile_x(), task.tile_z()))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => {
                    log::debug!("Started build of tile ({}, {})", task.tile_x(), task.tile_z());
                    self.running.push((task, handle));
                }
                Err(e) => {
                    log::warn!("Failed to start build worker: {}", e);
                    task.request_abort(&format!("failed to start worker: {e}"));
                    self.finished.push(task);
                }
            }
        }
    }

    /// Aborts every queued and running task
    pub fn abort_all(&mut self, reason: &str) {
        for task in self.queue.drain(..) {
            task.request_abort(reason);
            self.finished.push(task);
        }
        for (task, _) in &self.running {
            task.request_abort(reason);
        }
    }

    /// Hands over the tasks that have finished since the last call
    pub fn take_finished(&mut self) -> Vec<BuildTask> {
        std::mem::take(&mut self.finished)
    }
}

impl Drop for ThreadedBuildManager {
    fn drop(&mut self) {
        self.abort_all("build manager dropped");
        for (_, handle) in self.running.drain(..) {
            let _ = handle.join();
        }
    }
}
