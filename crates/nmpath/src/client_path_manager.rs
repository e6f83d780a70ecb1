//! Keeps an agent's steering target on a planned path

use crate::{NavRequest, NavRequestState, NavigationData, NavigationState, Path, Planner};

/// Consecutive failed target lookups tolerated before a new search
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 30;

/// Squared distance within which a path's goal still matches the agent's goal
pub const GOAL_MATCH_TOLERANCE_SQ: f32 = 1e-10;

/// Requests paths for one agent and turns them into steering targets
///
/// Call [`update`](Self::update) once per tick. The manager asks the planner
/// for a path whenever the agent has none or its goal moved, then writes the
/// next corner of the path into [`NavigationData::target_position`].
///
/// If the agent leaves the corridor, the last target is kept for up to
/// `failure_threshold` ticks before the path is dropped and the target
/// snapped to the agent's position.
#[derive(Debug)]
pub struct ClientPathManager {
    planner: Option<Planner>,
    active_planner: Option<Planner>,
    path: Option<Path>,
    request: Option<NavRequest<Path>>,
    failures: u32,
    failure_threshold: u32,
    state: NavigationState,
}

impl ClientPathManager {
    pub fn new(planner: Option<Planner>) -> Self {
        Self {
            planner,
            active_planner: None,
            path: None,
            request: None,
            failures: 0,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            state: NavigationState::Inactive,
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Planner used from the next update on
    pub fn set_planner(&mut self, planner: Option<Planner>) {
        self.planner = planner;
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub fn has_pending_request(&self) -> bool {
        self.request.is_some()
    }

    /// Advances the manager by one tick
    pub fn update(&mut self, nav: &mut NavigationData) -> NavigationState {
        match self.state {
            NavigationState::Inactive => {
                if !self.initialize(nav) {
                    self.state = NavigationState::Failed;
                    return self.state;
                }
                self.state = NavigationState::Active;
            }
            NavigationState::Active => {}
            _ => {
                self.state = NavigationState::Failed;
                return self.state;
            }
        }

        let swapped = match (&self.active_planner, &self.planner) {
            (Some(active), Some(configured)) => active.is_disposed() || !active.ptr_eq(configured),
            _ => true,
        };
        if swapped {
            self.cleanup(nav);
            if !self.initialize(nav) {
                self.state = NavigationState::Failed;
                return self.state;
            }
        }

        if let Some(request) = &self.request {
            match request.snapshot() {
                (NavRequestState::Processing, _) => return self.state,
                (NavRequestState::Complete, Some(path)) => {
                    self.path = Some(path);
                    self.request = None;
                }
                _ => {
                    self.cleanup(nav);
                    self.state = NavigationState::Failed;
                    return self.state;
                }
            }
        }

        let stale = self
            .path
            .as_ref()
            .map_or(true, |p| {
                p.is_disposed() || p.goal().distance_squared(nav.goal_position) > GOAL_MATCH_TOLERANCE_SQ
            });
        if stale {
            self.failures = 0;
            self.path = None;
            let Some(planner) = &self.active_planner else {
                self.state = NavigationState::Failed;
                return self.state;
            };
            let request = planner.get_path(nav.position, nav.goal_position);
            let finished = request.is_finished();
            self.request = Some(request);
            if finished {
                log::debug!("Path request failed on submission");
                self.cleanup(nav);
                self.state = NavigationState::Failed;
            }
            return self.state;
        }

        let target = self.path.as_mut().and_then(|p| p.get_target(nav.position));
        match target {
            Some(target) => {
                nav.target_position = target;
                self.failures = 0;
            }
            None => {
                self.failures += 1;
                if self.failures > self.failure_threshold {
                    log::debug!("Agent left its path for {} ticks, searching again", self.failures);
                    self.failures = 0;
                    nav.target_position = nav.position;
                    self.path = None;
                }
            }
        }
        self.state
    }

    /// Drops all path state and returns to `Inactive`
    pub fn exit(&mut self, nav: &mut NavigationData) {
        self.cleanup(nav);
        self.state = NavigationState::Inactive;
    }

    fn initialize(&mut self, nav: &mut NavigationData) -> bool {
        nav.target_position = nav.position;
        self.active_planner = self.planner.clone();
        self.active_planner.as_ref().is_some_and(|p| !p.is_disposed())
    }

    /// Releases the request, path and planner without touching the state
    fn cleanup(&mut self, nav: &mut NavigationData) {
        if let (Some(request), Some(planner)) = (self.request.take(), &self.active_planner) {
            if !request.is_finished() {
                planner.discard_path_request(&request);
            }
        }
        self.active_planner = None;
        self.path = None;
        self.failures = 0;
        nav.target_position = nav.position;
    }
}
