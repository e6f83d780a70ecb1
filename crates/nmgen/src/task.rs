//! Running a tile build on a worker thread

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nav_common::{Error, Result};
use parking_lot::Mutex;

use crate::{BuildState, IncrementalBuilder, NMGenMesh};

/// Lifecycle of a [`BuildTask`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildTaskState {
    /// Created, not yet run
    Inactive,
    InProgress,
    Complete,
    Aborted,
}

impl BuildTaskState {
    pub fn is_finished(self) -> bool {
        matches!(self, BuildTaskState::Complete | BuildTaskState::Aborted)
    }
}

/// A consistent copy of a task's published state
#[derive(Debug, Clone)]
pub struct BuildTaskSnapshot {
    pub task_state: BuildTaskState,
    pub build_state: BuildState,
    pub result: Option<NMGenMesh>,
    pub messages: Vec<String>,
}

#[derive(Debug)]
struct Slot {
    task_state: BuildTaskState,
    build_state: BuildState,
    result: Option<NMGenMesh>,
    messages: Vec<String>,
}

struct TaskInner {
    tile_x: i32,
    tile_z: i32,
    priority: i32,
    abort: AtomicBool,
    slot: Mutex<Slot>,
    builder: Mutex<Option<IncrementalBuilder>>,
}

/// A tile build that runs to completion on whichever thread calls
/// [`run`](Self::run)
///
/// Cloning gives another handle to the same task. The terminal result is
/// written exactly once: either by the worker when the builder finishes or by
/// [`request_abort`](Self::request_abort), whichever takes the lock first.
#[derive(Clone)]
pub struct BuildTask {
    inner: Arc<TaskInner>,
}

impl std::fmt::Debug for BuildTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildTask")
            .field("tile_x", &self.inner.tile_x)
            .field("tile_z", &self.inner.tile_z)
            .field("priority", &self.inner.priority)
            .field("slot", &*self.inner.slot.lock())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl BuildTask {
    /// Wraps a builder that has not finished yet
    ///
    /// Fails if any of the builder's processors is not safe to run on a
    /// worker thread.
    pub fn new(builder: IncrementalBuilder, priority: i32) -> Result<Self> {
        if builder.is_finished() {
            return Err(Error::Build("builder has already finished".into()));
        }
        if !builder.is_thread_safe() {
            return Err(Error::Build(
                "builder has processors that are not thread safe".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(TaskInner {
                tile_x: builder.tile_x(),
                tile_z: builder.tile_z(),
                priority,
                abort: AtomicBool::new(false),
                slot: Mutex::new(Slot {
                    task_state: BuildTaskState::Inactive,
                    build_state: builder.state(),
                    result: None,
                    messages: Vec::new(),
                }),
                builder: Mutex::new(Some(builder)),
            }),
        })
    }

    pub fn tile_x(&self) -> i32 {
        self.inner.tile_x
    }

    pub fn tile_z(&self) -> i32 {
        self.inner.tile_z
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    /// Runs the build until it finishes or is aborted
    ///
    /// Only the first call does any work.
    pub fn run(&self) {
        let Some(mut builder) = self.inner.builder.lock().take() else {
            return;
        };

        {
            let mut slot = self.inner.slot.lock();
            if slot.task_state.is_finished() {
                return;
            }
            slot.task_state = BuildTaskState::InProgress;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            while !builder.is_finished() {
                if self.inner.abort.load(Ordering::Acquire) {
                    return;
                }
                let state = builder.build();
                if !state.is_finished() {
                    let mut slot = self.inner.slot.lock();
                    if !slot.task_state.is_finished() {
                        slot.build_state = state;
                        slot.messages = builder.messages();
                    }
                }
            }
        }));

        let mut slot = self.inner.slot.lock();
        if slot.task_state.is_finished() || self.inner.abort.load(Ordering::Acquire) {
            return;
        }

        match outcome {
            Ok(()) => {
                slot.build_state = builder.state();
                slot.messages = builder.messages();
                if builder.state() == BuildState::Complete {
                    slot.task_state = BuildTaskState::Complete;
                    slot.result = builder.take_result();
                } else {
                    slot.task_state = BuildTaskState::Aborted;
                }
            }
            Err(payload) => {
                let message = format!("Aborted on exception: {}", panic_message(payload.as_ref()));
                log::error!("Build task ({}, {}): {}", self.inner.tile_x, self.inner.tile_z, message);
                slot.messages = builder.messages();
                slot.messages.push(message);
                slot.build_state = BuildState::Aborted;
                slot.task_state = BuildTaskState::Aborted;
            }
        }
    }

    /// Aborts the task unless it has already finished
    ///
    /// Returns true if this call decided the outcome.
    pub fn request_abort(&self, reason: &str) -> bool {
        self.inner.abort.store(true, Ordering::Release);
        let mut slot = self.inner.slot.lock();
        if slot.task_state.is_finished() {
            return false;
        }
        slot.messages.push(format!("Abort requested: {reason}"));
        slot.build_state = BuildState::Aborted;
        slot.task_state = BuildTaskState::Aborted;
        slot.result = None;
        true
    }

    pub fn task_state(&self) -> BuildTaskState {
        self.inner.slot.lock().task_state
    }

    /// Latest build state published by the worker
    pub fn build_state(&self) -> BuildState {
        self.inner.slot.lock().build_state
    }

    pub fn is_finished(&self) -> bool {
        self.task_state().is_finished()
    }

    pub fn messages(&self) -> Vec<String> {
        self.inner.slot.lock().messages.clone()
    }

    /// The finished mesh, if the build completed
    pub fn result(&self) -> Option<NMGenMesh> {
        self.inner.slot.lock().result.clone()
    }

    pub fn snapshot(&self) -> BuildTaskSnapshot {
        let slot = self.inner.slot.lock();
        BuildTaskSnapshot {
            task_state: slot.task_state,
            build_state: slot.build_state,
            result: slot.result.clone(),
            messages: slot.messages.clone(),
        }
    }
}
