//! Path planning service and the client handle used to submit requests

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use nav_common::Result;
use parking_lot::Mutex;
use web_time::Instant;

use crate::search::{AStarSearch, DijkstraSearch, SearchState};
use crate::{MasterPath, NavRequest, Path, PlannerConfig, TriNavMesh};

struct PathJob {
    start: Vec3,
    goal: Vec3,
    request: NavRequest<Path>,
}

struct RepairJob {
    start: Vec3,
    path: Path,
    request: NavRequest<Path>,
}

struct NearestJob {
    position: Vec3,
    request: NavRequest<Vec3>,
}

struct ValidJob {
    position: Vec3,
    y_tolerance: f32,
    request: NavRequest<bool>,
}

/// Searching job waiting for a pool slot
enum PendingJob {
    Path(PathJob),
    Repair(RepairJob),
}

impl PendingJob {
    fn request(&self) -> &NavRequest<Path> {
        match self {
            PendingJob::Path(job) => &job.request,
            PendingJob::Repair(job) => &job.request,
        }
    }
}

enum ActiveSearch {
    Path {
        job: PathJob,
        search: AStarSearch,
    },
    Repair {
        job: RepairJob,
        source: Arc<MasterPath>,
        search: DijkstraSearch,
    },
}

/// Search occupying a pool slot
struct ActiveJob {
    search: ActiveSearch,
    /// The client gave up on the request; the result is thrown away
    discarded: bool,
}

impl ActiveJob {
    fn request(&self) -> &NavRequest<Path> {
        match &self.search {
            ActiveSearch::Path { job, .. } => &job.request,
            ActiveSearch::Repair { job, .. } => &job.request,
        }
    }

    fn step(&mut self, mesh: &TriNavMesh, paths: &[Arc<MasterPath>]) -> SearchState {
        match &mut self.search {
            ActiveSearch::Path { search, .. } => search.process(mesh, paths),
            ActiveSearch::Repair { search, .. } => search.process(mesh),
        }
    }

    fn state(&self) -> SearchState {
        match &self.search {
            ActiveSearch::Path { search, .. } => search.state(),
            ActiveSearch::Repair { search, .. } => search.state(),
        }
    }
}

/// Requests handed over from client threads
#[derive(Default)]
struct Inbox {
    paths: Vec<PathJob>,
    repairs: Vec<RepairJob>,
    nearest: Vec<NearestJob>,
    valid: Vec<ValidJob>,
    discarded: Vec<NavRequest<Path>>,
    keep_alive: Vec<u64>,
    disposed: bool,
}

impl Inbox {
    /// Moves the queued requests out, keeping the disposed flag
    fn take(&mut self) -> Inbox {
        let disposed = self.disposed;
        let taken = std::mem::take(self);
        self.disposed = disposed;
        taken
    }
}

pub(crate) struct PlannerShared {
    inbox: Mutex<Inbox>,
}

impl PlannerShared {
    pub(crate) fn is_disposed(&self) -> bool {
        self.inbox.lock().disposed
    }

    /// Marks the planner disposed; later requests fail at once
    pub(crate) fn set_disposed(&self) {
        self.inbox.lock().disposed = true;
    }
}

/// Client handle to a [`MasterPlanner`]
///
/// Every call returns immediately. Results are delivered through the returned
/// [`NavRequest`], which clients poll. Once the planner is disposed, new
/// requests are returned already failed.
#[derive(Clone)]
pub struct Planner {
    shared: Arc<PlannerShared>,
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Planner {
    fn submit<T>(&self, push: impl FnOnce(&mut Inbox, NavRequest<T>)) -> NavRequest<T> {
        let mut inbox = self.shared.inbox.lock();
        if inbox.disposed {
            return NavRequest::failed();
        }
        let request = NavRequest::new();
        push(&mut *inbox, request.clone());
        request
    }

    /// Requests a path from `start` to `goal`
    pub fn get_path(&self, start: Vec3, goal: Vec3) -> NavRequest<Path> {
        self.submit(|inbox, request| inbox.paths.push(PathJob { start, goal, request }))
    }

    /// Tells the planner the result of `request` is no longer wanted
    ///
    /// The request fails at the next processing pass. A search already
    /// running for it finishes, but its path is not cached.
    pub fn discard_path_request(&self, request: &NavRequest<Path>) {
        let mut inbox = self.shared.inbox.lock();
        if !inbox.disposed && !request.is_finished() {
            inbox.discarded.push(request.clone());
        }
    }

    /// Requests a new path that leads from `start` back onto `path`
    pub fn repair_path(&self, start: Vec3, path: &Path) -> NavRequest<Path> {
        let path = path.clone();
        self.submit(|inbox, request| inbox.repairs.push(RepairJob { start, path, request }))
    }

    /// Resets the age of the path's corridor at the next maintenance pass
    pub fn keep_path_alive(&self, path: &Path) {
        let mut inbox = self.shared.inbox.lock();
        if !inbox.disposed {
            inbox.keep_alive.push(path.id());
        }
    }

    /// Closest point on the mesh to `position`
    pub fn get_nearest_valid_location(&self, position: Vec3) -> NavRequest<Vec3> {
        self.submit(|inbox, request| inbox.nearest.push(NearestJob { position, request }))
    }

    /// Whether `position` lies on the mesh within `y_tolerance` of its surface
    pub fn is_valid_location(&self, position: Vec3, y_tolerance: f32) -> NavRequest<bool> {
        self.submit(|inbox, request| {
            inbox.valid.push(ValidJob {
                position,
                y_tolerance,
                request,
            })
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// True if both handles talk to the same planner
    pub fn ptr_eq(&self, other: &Planner) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Owns the navigation mesh, the path cache and all searches
///
/// Nothing happens until [`process`](Self::process) is called. Requests made
/// through [`Planner`] handles are picked up at the start of each call.
pub struct MasterPlanner {
    mesh: Arc<TriNavMesh>,
    config: PlannerConfig,
    shared: Arc<PlannerShared>,
    waiting: VecDeque<PendingJob>,
    active: Vec<ActiveJob>,
    paths: Vec<Arc<MasterPath>>,
    keep_alive: Vec<u64>,
    next_id: u64,
    shut_down: bool,
}

impl std::fmt::Debug for MasterPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterPlanner")
            .field("waiting", &self.waiting.len())
            .field("active", &self.active.len())
            .field("cached_paths", &self.paths.len())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

impl MasterPlanner {
    pub fn new(mesh: Arc<TriNavMesh>, config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            mesh,
            config,
            shared: Arc::new(PlannerShared {
                inbox: Mutex::new(Inbox::default()),
            }),
            waiting: VecDeque::new(),
            active: Vec::new(),
            paths: Vec::new(),
            keep_alive: Vec::new(),
            next_id: 1,
            shut_down: false,
        })
    }

    /// A new client handle
    pub fn planner(&self) -> Planner {
        Planner {
            shared: Arc::clone(&self.shared),
        }
    }

    pub(crate) fn shared(&self) -> Arc<PlannerShared> {
        Arc::clone(&self.shared)
    }

    pub fn mesh(&self) -> &Arc<TriNavMesh> {
        &self.mesh
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.shut_down || self.shared.is_disposed()
    }

    pub fn active_search_count(&self) -> usize {
        self.active.len()
    }

    pub fn waiting_search_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn cached_path_count(&self) -> usize {
        self.paths.len()
    }

    /// True when no request is queued or being searched
    pub fn is_idle(&self) -> bool {
        if !self.waiting.is_empty() || !self.active.is_empty() {
            return false;
        }
        let inbox = self.shared.inbox.lock();
        inbox.paths.is_empty()
            && inbox.repairs.is_empty()
            && inbox.nearest.is_empty()
            && inbox.valid.is_empty()
            && inbox.discarded.is_empty()
    }

    /// Runs one planner pass and returns the time it took
    ///
    /// Location queries are always answered. Searches are stepped in turn
    /// until the processing budget is spent, at least once each.
    pub fn process(&mut self, maintenance: bool) -> Duration {
        let started = Instant::now();
        if self.shut_down {
            return started.elapsed();
        }

        let inbox = {
            let mut inbox = self.shared.inbox.lock();
            if inbox.disposed {
                drop(inbox);
                self.shutdown();
                return started.elapsed();
            }
            inbox.take()
        };

        self.waiting.extend(inbox.paths.into_iter().map(PendingJob::Path));
        self.waiting.extend(inbox.repairs.into_iter().map(PendingJob::Repair));
        self.keep_alive.extend(inbox.keep_alive);
        for request in &inbox.discarded {
            self.discard(request);
        }

        if maintenance {
            self.maintain();
        }

        for job in inbox.nearest {
            match self.mesh.closest_cell(job.position, false) {
                Some((_, point)) => job.request.complete(point),
                None => job.request.fail(),
            };
        }
        for job in inbox.valid {
            job.request
                .complete(self.mesh.is_valid_position(job.position, job.y_tolerance));
        }

        self.promote_waiting();
        self.step_searches(started);
        started.elapsed()
    }

    /// Processes with maintenance until no work is left or `max_passes` is
    /// reached; returns true if the planner went idle
    pub fn process_all(&mut self, max_passes: usize) -> bool {
        for _ in 0..max_passes {
            if self.is_idle() {
                return true;
            }
            self.process(true);
        }
        self.is_idle()
    }

    fn discard(&mut self, request: &NavRequest<Path>) {
        request.fail();
        self.waiting.retain(|job| !job.request().ptr_eq(request));
        for job in &mut self.active {
            if job.request().ptr_eq(request) {
                job.discarded = true;
            }
        }
    }

    /// Applies keep-alives and evicts paths that have not been used for
    /// longer than the maximum age
    fn maintain(&mut self) {
        for id in self.keep_alive.drain(..) {
            if let Some(path) = self.paths.iter().find(|p| p.id() == id) {
                path.reset_timestamp();
            }
        }
        if !self.config.caching_enabled() {
            return;
        }
        let now = Instant::now();
        let max_age = self.config.max_path_age;
        self.paths.retain(|path| {
            let stale = path.age(now) > max_age;
            if stale {
                log::debug!("Evicting stale path {}", path.id());
                path.dispose();
            }
            !stale
        });
    }

    fn promote_waiting(&mut self) {
        while self.active.len() < self.config.search_pool_size {
            let Some(job) = self.waiting.pop_front() else {
                break;
            };
            let started = match job {
                PendingJob::Path(job) => self.start_path(job),
                PendingJob::Repair(job) => self.start_repair(job),
            };
            if let Some(search) = started {
                self.active.push(ActiveJob {
                    search,
                    discarded: false,
                });
            }
        }
    }

    /// Answers from the cache or sets up a search
    fn start_path(&mut self, job: PathJob) -> Option<ActiveSearch> {
        let cells = self
            .mesh
            .closest_cell(job.start, true)
            .zip(self.mesh.closest_cell(job.goal, true));
        let Some(((start_cell, _), (goal_cell, _))) = cells else {
            log::debug!("Path request from {} to {} is off the mesh", job.start, job.goal);
            job.request.fail();
            return None;
        };

        let cached = self
            .paths
            .iter()
            .find(|p| !p.is_disposed() && p.goal_cell() == goal_cell && p.cell_index(start_cell).is_some());
        if let Some(master) = cached {
            master.reset_timestamp();
            job.request.complete(master.path(job.goal));
            return None;
        }

        let mut search = AStarSearch::new(self.config.heuristic);
        search.initialize(job.start, job.goal, start_cell, goal_cell);
        Some(ActiveSearch::Path { job, search })
    }

    fn start_repair(&mut self, job: RepairJob) -> Option<ActiveSearch> {
        let source = Arc::clone(job.path.master());
        if source.is_disposed() || !Arc::ptr_eq(source.mesh(), &self.mesh) {
            job.request.fail();
            return None;
        }
        let Some((start_cell, _)) = self.mesh.closest_cell(job.start, true) else {
            job.request.fail();
            return None;
        };

        let mut search = DijkstraSearch::new();
        search.initialize(
            job.start,
            start_cell,
            source.cells(),
            self.config.repair_search_depth,
            false,
        );
        Some(ActiveSearch::Repair { job, source, search })
    }

    fn step_searches(&mut self, started: Instant) {
        loop {
            if self.active.is_empty() {
                break;
            }
            let (mesh, paths) = (&self.mesh, &self.paths);
            for job in &mut self.active {
                job.step(mesh, paths);
            }

            let mut i = 0;
            while i < self.active.len() {
                if self.active[i].state().is_active() {
                    i += 1;
                } else {
                    let job = self.active.remove(i);
                    self.finish(job);
                }
            }

            if started.elapsed() >= self.config.max_processing_time {
                break;
            }
            self.promote_waiting();
        }
    }

    fn finish(&mut self, job: ActiveJob) {
        let state = job.state();
        match job.search {
            ActiveSearch::Path { job: path_job, search } => {
                if state != SearchState::Complete {
                    log::debug!("No path from {} to {}", path_job.start, path_job.goal);
                    path_job.request.fail();
                    return;
                }
                if job.discarded {
                    return;
                }
                self.publish(search.path_cells().to_vec(), path_job.goal, &path_job.request);
            }
            ActiveSearch::Repair {
                job: repair,
                source,
                search,
            } => {
                if state != SearchState::Complete {
                    repair.request.fail();
                    return;
                }
                if job.discarded {
                    return;
                }
                let best = search
                    .paths()
                    .iter()
                    .filter_map(|p| p.last().and_then(|&c| source.cell_index(c)).map(|k| (k, p)))
                    .max_by_key(|(k, _)| *k);
                let Some((k, prefix)) = best else {
                    repair.request.fail();
                    return;
                };
                let mut cells = prefix.clone();
                cells.extend_from_slice(&source.cells()[k + 1..]);
                self.publish(cells, repair.path.goal(), &repair.request);
            }
        }
    }

    /// Wraps a found corridor, caches it and completes the request
    fn publish(&mut self, cells: Vec<usize>, goal: Vec3, request: &NavRequest<Path>) {
        let id = self.next_id;
        self.next_id += 1;
        let master = match MasterPath::new(id, cells, Arc::clone(&self.mesh)) {
            Ok(master) => Arc::new(master),
            Err(e) => {
                log::warn!("Discarding search result: {}", e);
                request.fail();
                return;
            }
        };

        if self.config.caching_enabled() {
            if self.paths.len() >= self.config.max_cached_paths {
                self.evict_least_recent();
            }
            self.paths.push(Arc::clone(&master));
        }
        request.complete(master.path(goal));
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .paths
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| (p.last_used(), p.id()))
            .map(|(i, _)| i);
        if let Some(i) = oldest {
            let path = self.paths.remove(i);
            log::debug!("Path cache full, evicting path {}", path.id());
            path.dispose();
        }
    }

    /// Fails every outstanding request and disposes all cached paths
    ///
    /// Requests made afterwards fail at once.
    pub fn dispose(&mut self) {
        self.shared.set_disposed();
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let inbox = self.shared.inbox.lock().take();
        for job in &inbox.paths {
            job.request.fail();
        }
        for job in &inbox.repairs {
            job.request.fail();
        }
        for job in &inbox.nearest {
            job.request.fail();
        }
        for job in &inbox.valid {
            job.request.fail();
        }
        for request in &inbox.discarded {
            request.fail();
        }
        for job in self.waiting.drain(..) {
            job.request().fail();
        }
        for job in self.active.drain(..) {
            job.request().fail();
        }
        for path in self.paths.drain(..) {
            path.dispose();
        }
        self.keep_alive.clear();

        if !self.shut_down {
            self.shut_down = true;
            log::info!("Path planner disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::*;
    use crate::NavRequestState;

    fn run(master: &mut MasterPlanner) {
        assert!(master.process_all(10_000), "planner did not go idle");
    }

    fn config() -> PlannerConfig {
        PlannerConfig {
            max_processing_time: Duration::from_millis(50),
            ..PlannerConfig::default()
        }
    }

    #[test]
    fn test_get_path_completes() -> Result<()> {
        let mut master = MasterPlanner::new(l_mesh(0.0)?, config())?;
        let planner = master.planner();
        let start = Vec3::new(0.3, 0.0, 0.6);
        let goal = Vec3::new(2.6, 0.0, 2.5);

        let request = planner.get_path(start, goal);
        assert_eq!(request.state(), NavRequestState::Processing);
        run(&mut master);

        let (state, path) = request.snapshot();
        assert_eq!(state, NavRequestState::Complete);
        let mut path = path.unwrap();
        assert_eq!(path.goal(), goal);
        let target = path.get_target(start).unwrap();
        assert!(target.distance(goal) < start.distance(goal));
        assert_eq!(master.cached_path_count(), 1);
        Ok(())
    }

    #[test]
    fn test_unreachable_and_off_mesh_fail() -> Result<()> {
        let mut master = MasterPlanner::new(island_mesh()?, config())?;
        let planner = master.planner();
        let island = planner.get_path(Vec3::new(0.3, 0.0, 0.6), Vec3::new(6.5, 0.0, 0.3));
        let off_mesh = planner.get_path(Vec3::new(0.3, 0.0, 0.6), Vec3::new(5.0, 0.0, 0.5));
        run(&mut master);

        assert_eq!(island.state(), NavRequestState::Failed);
        assert_eq!(off_mesh.state(), NavRequestState::Failed);
        assert_eq!(master.cached_path_count(), 0);
        Ok(())
    }

    #[test]
    fn test_cached_path_is_reused() -> Result<()> {
        let mut master = MasterPlanner::new(l_mesh(0.0)?, config())?;
        let planner = master.planner();
        let goal = Vec3::new(2.6, 0.0, 2.5);

        let first = planner.get_path(Vec3::new(0.3, 0.0, 0.6), goal);
        run(&mut master);
        let first = first.data().unwrap();

        // Starting further along the same corridor
        let other_goal = Vec3::new(2.7, 0.0, 2.6);
        let second = planner.get_path(Vec3::new(2.2, 0.0, 0.7), other_goal);
        master.process(false);
        let second = second.data().unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.goal(), other_goal);
        assert_eq!(master.cached_path_count(), 1);
        Ok(())
    }

    #[test]
    fn test_discarded_request_is_not_cached() -> Result<()> {
        let mut master = MasterPlanner::new(l_mesh(0.0)?, config())?;
        let planner = master.planner();

        let request = planner.get_path(Vec3::new(0.3, 0.0, 0.6), Vec3::new(2.6, 0.0, 2.5));
        planner.discard_path_request(&request);
        run(&mut master);

        assert_eq!(request.state(), NavRequestState::Failed);
        assert_eq!(master.cached_path_count(), 0);
        Ok(())
    }

    #[test]
    fn test_recently_used_path_survives_eviction() -> Result<()> {
        let config = PlannerConfig {
            max_cached_paths: 2,
            ..config()
        };
        let mesh = Arc::new(grid_nav_mesh(6, 1, &[])?);
        let mut master = MasterPlanner::new(mesh, config)?;
        let planner = master.planner();
        let start = Vec3::new(0.3, 0.0, 0.6);

        let mut paths = Vec::new();
        for goal_x in [2.6, 4.6] {
            let request = planner.get_path(start, Vec3::new(goal_x, 0.0, 0.3));
            run(&mut master);
            paths.push(request.data().unwrap());
            std::thread::sleep(Duration::from_millis(5));
        }

        // Reuse the older path, then add a third
        let reused = planner.get_path(start, Vec3::new(2.6, 0.0, 0.3));
        run(&mut master);
        assert_eq!(reused.data().unwrap().id(), paths[0].id());
        std::thread::sleep(Duration::from_millis(5));

        let third = planner.get_path(start, Vec3::new(5.6, 0.0, 0.3));
        run(&mut master);
        assert!(third.data().is_some());

        assert_eq!(master.cached_path_count(), 2);
        assert!(!paths[0].is_disposed());
        assert!(paths[1].is_disposed());
        Ok(())
    }

    #[test]
    fn test_stale_paths_are_evicted() -> Result<()> {
        let config = PlannerConfig {
            max_path_age: Duration::from_millis(20),
            ..config()
        };
        let mut master = MasterPlanner::new(l_mesh(0.0)?, config)?;
        let planner = master.planner();
        let request = planner.get_path(Vec3::new(0.3, 0.0, 0.6), Vec3::new(2.6, 0.0, 2.5));
        run(&mut master);
        let path = request.data().unwrap();

        std::thread::sleep(Duration::from_millis(40));
        master.process(false);
        assert!(!path.is_disposed());

        planner.keep_path_alive(&path);
        master.process(true);
        assert!(!path.is_disposed(), "kept alive path must survive");

        std::thread::sleep(Duration::from_millis(40));
        master.process(true);
        assert!(path.is_disposed());
        assert_eq!(master.cached_path_count(), 0);
        Ok(())
    }

    #[test]
    fn test_caching_can_be_disabled() -> Result<()> {
        let config = PlannerConfig {
            max_path_age: Duration::ZERO,
            ..config()
        };
        let mut master = MasterPlanner::new(l_mesh(0.0)?, config)?;
        let request = master
            .planner()
            .get_path(Vec3::new(0.3, 0.0, 0.6), Vec3::new(2.6, 0.0, 2.5));
        run(&mut master);
        assert!(request.data().is_some());
        assert_eq!(master.cached_path_count(), 0);
        Ok(())
    }

    #[test]
    fn test_repair_rejoins_corridor() -> Result<()> {
        let config = PlannerConfig {
            repair_search_depth: 4,
            ..config()
        };
        let mesh = Arc::new(grid_nav_mesh(6, 2, &[])?);
        let mut master = MasterPlanner::new(mesh, config)?;
        let planner = master.planner();

        let goal = Vec3::new(5.6, 0.0, 0.3);
        let request = planner.get_path(Vec3::new(0.6, 0.0, 0.3), goal);
        run(&mut master);
        let path = request.data().unwrap();

        // The agent drifted into the upper row
        let drifted = Vec3::new(2.6, 0.0, 1.7);
        assert!(!path.is_in_path_column(drifted));
        let repair = planner.repair_path(drifted, &path);
        run(&mut master);

        let mut repaired = repair.data().unwrap();
        assert_ne!(repaired.id(), path.id());
        assert_eq!(repaired.goal(), goal);
        assert!(repaired.is_in_path_column(drifted));
        assert!(repaired.get_target(drifted).is_some());
        let last = *repaired.master().cells().last().unwrap();
        assert_eq!(last, path.master().goal_cell());
        Ok(())
    }

    #[test]
    fn test_repair_out_of_reach_fails() -> Result<()> {
        let config = PlannerConfig {
            repair_search_depth: 1,
            ..config()
        };
        let mesh = Arc::new(grid_nav_mesh(6, 3, &[])?);
        let mut master = MasterPlanner::new(mesh, config)?;
        let planner = master.planner();
        let request = planner.get_path(Vec3::new(0.6, 0.0, 0.3), Vec3::new(5.6, 0.0, 0.3));
        run(&mut master);
        let path = request.data().unwrap();

        let repair = planner.repair_path(Vec3::new(2.6, 0.0, 2.7), &path);
        run(&mut master);
        assert_eq!(repair.state(), NavRequestState::Failed);
        Ok(())
    }

    #[test]
    fn test_location_queries() -> Result<()> {
        let mut master = MasterPlanner::new(island_mesh()?, config())?;
        let planner = master.planner();

        let nearest = planner.get_nearest_valid_location(Vec3::new(4.8, 2.0, 0.5));
        let valid = planner.is_valid_location(Vec3::new(1.5, 0.1, 0.5), 0.2);
        let too_high = planner.is_valid_location(Vec3::new(1.5, 1.0, 0.5), 0.2);
        let gap = planner.is_valid_location(Vec3::new(5.0, 0.0, 0.5), 0.2);
        master.process(false);

        let point = nearest.data().unwrap();
        assert!(point.distance(Vec3::new(4.0, 0.0, 0.5)) < 1e-4);
        assert_eq!(valid.data(), Some(true));
        assert_eq!(too_high.data(), Some(false));
        assert_eq!(gap.data(), Some(false));
        Ok(())
    }

    #[test]
    fn test_dispose_fails_everything() -> Result<()> {
        let mut master = MasterPlanner::new(l_mesh(0.0)?, config())?;
        let planner = master.planner();

        let done = planner.get_path(Vec3::new(0.3, 0.0, 0.6), Vec3::new(2.6, 0.0, 2.5));
        run(&mut master);
        let path = done.data().unwrap();

        let pending = planner.get_path(Vec3::new(0.3, 0.0, 0.6), Vec3::new(2.5, 0.0, 1.5));
        master.dispose();
        assert!(master.is_disposed());
        assert!(planner.is_disposed());
        assert_eq!(pending.state(), NavRequestState::Failed);
        assert!(path.is_disposed());

        let late = planner.get_path(Vec3::new(0.3, 0.0, 0.6), Vec3::new(2.6, 0.0, 2.5));
        assert_eq!(late.state(), NavRequestState::Failed);
        assert_eq!(planner.is_valid_location(Vec3::ZERO, 1.0).state(), NavRequestState::Failed);

        // Still a no-op afterwards
        master.process(true);
        master.dispose();
        Ok(())
    }
}
