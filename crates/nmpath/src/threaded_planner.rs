//! Runs a [`MasterPlanner`] on its own thread

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use web_time::Instant;

use crate::master_planner::PlannerShared;
use crate::{MasterPlanner, Planner};

/// Pause after shutdown before the thread reports it has stopped
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Owns the thread that drives a [`MasterPlanner`]
///
/// The thread processes requests once per frame and sleeps for the rest of
/// it. [`dispose`](Self::dispose) only raises a flag; the thread fails
/// outstanding requests and exits at the top of its next iteration.
pub struct ThreadedPlanner {
    master: Option<MasterPlanner>,
    planner: Planner,
    shared: Arc<PlannerShared>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ThreadedPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedPlanner")
            .field("started", &self.handle.is_some())
            .field("running", &self.is_running())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl ThreadedPlanner {
    pub fn new(master: MasterPlanner) -> Self {
        Self {
            planner: master.planner(),
            shared: master.shared(),
            master: Some(master),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Client handle to the planner
    pub fn planner(&self) -> Planner {
        self.planner.clone()
    }

    /// Starts the planner thread; returns false if it was already started,
    /// the planner is disposed, or the thread could not be spawned
    pub fn start(&mut self) -> bool {
        if self.shared.is_disposed() {
            return false;
        }
        let Some(master) = self.master.take() else {
            return false;
        };

        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);
        let spawned = thread::Builder::new()
            .name("nmpath-planner".into())
            .spawn(move || run(master, &shared, &running));
        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                log::debug!("Path planner thread started");
                true
            }
            Err(e) => {
                log::error!("Failed to spawn path planner thread: {}", e);
                self.running.store(false, Ordering::Release);
                self.shared.set_disposed();
                false
            }
        }
    }

    /// True until the planner thread has shut down
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Asks the planner to shut down without waiting for it
    ///
    /// A planner that was never started is disposed immediately.
    pub fn dispose(&mut self) {
        self.shared.set_disposed();
        if let Some(mut master) = self.master.take() {
            master.dispose();
        }
    }
}

impl Drop for ThreadedPlanner {
    fn drop(&mut self) {
        self.dispose();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Path planner thread panicked during shutdown");
            }
        }
    }
}

fn run(mut master: MasterPlanner, shared: &PlannerShared, running: &AtomicBool) {
    let frame = master.config().frame_length;
    let maintenance_frequency = master.config().maintenance_frequency;
    let mut next_maintenance = Instant::now();

    while !shared.is_disposed() {
        let now = Instant::now();
        let maintenance = now >= next_maintenance;
        if maintenance {
            next_maintenance = now + maintenance_frequency;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| master.process(maintenance))) {
            Ok(elapsed) => {
                if let Some(rest) = frame.checked_sub(elapsed) {
                    thread::sleep(rest);
                }
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("Path planner stopped after a panic: {}", message);
                break;
            }
        }
    }

    shared.set_disposed();
    if panic::catch_unwind(AssertUnwindSafe(|| master.dispose())).is_err() {
        log::error!("Path planner panicked while disposing");
    }
    thread::sleep(SHUTDOWN_GRACE);
    running.store(false, Ordering::Release);
}
