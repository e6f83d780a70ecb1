//! Incremental graph searches over the cells of a [`TriNavMesh`]
//!
//! Both searches advance one node per [`process`](AStarSearch::process)
//! call so the planner can spread them over several frames.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use glam::Vec3;

use crate::{DistanceHeuristic, MasterPath, TriNavMesh};

/// Progress of a search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SearchState {
    #[default]
    Uninitialized,
    Initialized,
    Processing,
    Complete,
    Failed,
}

impl SearchState {
    pub fn is_active(self) -> bool {
        matches!(self, SearchState::Initialized | SearchState::Processing)
    }
}

#[derive(Debug, Clone)]
struct SearchNode {
    cell: usize,
    parent: Option<usize>,
    g: f32,
    h: f32,
    /// Number of cells on the path ending here
    depth: usize,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    f: f32,
    node: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap on f, older nodes first on ties
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Node storage and open list shared by both searches
///
/// Updated nodes are pushed again instead of re-heaped; stale heap entries
/// are skipped when popped.
#[derive(Debug, Default)]
struct OpenSet {
    nodes: Vec<SearchNode>,
    lookup: HashMap<usize, usize>,
    heap: BinaryHeap<HeapEntry>,
}

impl OpenSet {
    fn clear(&mut self) {
        self.nodes.clear();
        self.lookup.clear();
        self.heap.clear();
    }

    fn push_start(&mut self, cell: usize) {
        self.clear();
        self.nodes.push(SearchNode {
            cell,
            parent: None,
            g: 0.0,
            h: 0.0,
            depth: 1,
            closed: false,
        });
        self.lookup.insert(cell, 0);
        self.heap.push(HeapEntry { f: 0.0, node: 0 });
    }

    /// Pops and closes the best open node
    fn pop(&mut self) -> Option<usize> {
        while let Some(entry) = self.heap.pop() {
            let node = &mut self.nodes[entry.node];
            if node.closed || entry.f != node.g + node.h {
                continue;
            }
            node.closed = true;
            return Some(entry.node);
        }
        None
    }

    fn is_closed(&self, cell: usize) -> bool {
        self.lookup
            .get(&cell)
            .is_some_and(|&i| self.nodes[i].closed)
    }

    fn has_open(&self) -> bool {
        !self.heap.is_empty()
    }

    /// Cost of moving from the node's entry wall to the wall shared with
    /// `cell`
    fn step_cost(&self, mesh: &TriNavMesh, from: usize, cell: usize, start: Vec3) -> f32 {
        let node = &self.nodes[from];
        let here = mesh.cell(node.cell);
        let exit = here
            .link_index(cell)
            .map_or_else(|| mesh.cell(cell).centroid(), |w| here.wall_midpoint(w));
        let entry = match node.parent {
            None => start,
            Some(p) => here
                .link_index(self.nodes[p].cell)
                .map_or_else(|| here.centroid(), |w| here.wall_midpoint(w)),
        };
        entry.distance(exit)
    }

    /// Opens `cell` through `from`, or re-parents it if that is cheaper
    fn relax(&mut self, mesh: &TriNavMesh, from: usize, cell: usize, start: Vec3, h: impl FnOnce() -> f32) {
        let g = self.nodes[from].g + self.step_cost(mesh, from, cell, start);
        let depth = self.nodes[from].depth + 1;
        match self.lookup.get(&cell) {
            Some(&i) => {
                let node = &mut self.nodes[i];
                if node.closed || g >= node.g {
                    return;
                }
                node.parent = Some(from);
                node.g = g;
                node.depth = depth;
                self.heap.push(HeapEntry { f: g + node.h, node: i });
            }
            None => {
                let h = h();
                let i = self.nodes.len();
                self.nodes.push(SearchNode {
                    cell,
                    parent: Some(from),
                    g,
                    h,
                    depth,
                    closed: false,
                });
                self.lookup.insert(cell, i);
                self.heap.push(HeapEntry { f: g + h, node: i });
            }
        }
    }

    /// Cells from the start to `node`
    fn path_to(&self, node: usize) -> Vec<usize> {
        let mut cells = Vec::with_capacity(self.nodes[node].depth);
        let mut cur = Some(node);
        while let Some(i) = cur {
            cells.push(self.nodes[i].cell);
            cur = self.nodes[i].parent;
        }
        cells.reverse();
        cells
    }
}

/// A* search from a start cell to a goal cell
///
/// Cells with a single link are never expanded since no path can pass
/// through them. When the search reaches a cell on a cached path to the same
/// goal cell, it completes by joining that path.
#[derive(Debug)]
pub struct AStarSearch {
    heuristic: DistanceHeuristic,
    state: SearchState,
    start: Vec3,
    goal: Vec3,
    start_cell: usize,
    goal_cell: usize,
    open: OpenSet,
    path: Vec<usize>,
    joined: Option<u64>,
}

impl AStarSearch {
    pub fn new(heuristic: DistanceHeuristic) -> Self {
        Self {
            heuristic,
            state: SearchState::Uninitialized,
            start: Vec3::ZERO,
            goal: Vec3::ZERO,
            start_cell: 0,
            goal_cell: 0,
            open: OpenSet::default(),
            path: Vec::new(),
            joined: None,
        }
    }

    pub fn initialize(&mut self, start: Vec3, goal: Vec3, start_cell: usize, goal_cell: usize) -> SearchState {
        self.reset();
        self.start = start;
        self.goal = goal;
        self.start_cell = start_cell;
        self.goal_cell = goal_cell;
        self.open.push_start(start_cell);
        self.state = SearchState::Initialized;
        self.state
    }

    pub fn reset(&mut self) {
        self.open.clear();
        self.path.clear();
        self.joined = None;
        self.state = SearchState::Uninitialized;
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn start_cell(&self) -> usize {
        self.start_cell
    }

    pub fn goal_cell(&self) -> usize {
        self.goal_cell
    }

    pub fn goal(&self) -> Vec3 {
        self.goal
    }

    /// Corridor found by a completed search
    pub fn path_cells(&self) -> &[usize] {
        &self.path
    }

    /// Id of the cached path the result was joined to
    pub fn joined_path(&self) -> Option<u64> {
        self.joined
    }

    fn complete(&mut self, path: Vec<usize>) -> SearchState {
        self.path = path;
        self.open.clear();
        self.state = SearchState::Complete;
        self.state
    }

    /// Expands one node
    pub fn process(&mut self, mesh: &TriNavMesh, cached: &[Arc<MasterPath>]) -> SearchState {
        if self.state == SearchState::Initialized {
            self.state = SearchState::Processing;
            if self.start_cell == self.goal_cell {
                return self.complete(vec![self.start_cell]);
            }
        }
        if self.state != SearchState::Processing {
            return self.state;
        }

        let Some(current) = self.open.pop() else {
            self.open.clear();
            self.state = SearchState::Failed;
            return self.state;
        };
        let cell = self.open.nodes[current].cell;
        if cell == self.goal_cell {
            let path = self.open.path_to(current);
            return self.complete(path);
        }

        let join = cached
            .iter()
            .filter(|p| !p.is_disposed() && p.goal_cell() == self.goal_cell)
            .find_map(|p| p.cell_index(cell).map(|k| (p.id(), p.cells()[k + 1..].to_vec())));
        if let Some((id, rest)) = join {
            let mut path = self.open.path_to(current);
            path.extend(rest);
            self.joined = Some(id);
            return self.complete(path);
        }

        let links: Vec<usize> = mesh.cell(cell).links().collect();
        for next in links {
            if self.open.is_closed(next) {
                continue;
            }
            if mesh.cell(next).link_count() == 1 {
                if next == self.goal_cell {
                    let mut path = self.open.path_to(current);
                    path.push(next);
                    return self.complete(path);
                }
                continue;
            }
            let (heuristic, goal) = (self.heuristic, self.goal);
            let centroid = mesh.cell(next).centroid();
            self.open
                .relax(mesh, current, next, self.start, || heuristic.distance(centroid, goal));
        }

        if !self.open.has_open() {
            self.open.clear();
            self.state = SearchState::Failed;
        }
        self.state
    }
}

/// Uniform cost search from a start cell to the nearest of several goal
/// cells, limited to a maximum corridor length
#[derive(Debug, Default)]
pub struct DijkstraSearch {
    state: SearchState,
    start: Vec3,
    start_cell: usize,
    goals: Vec<usize>,
    max_depth: usize,
    select_first: bool,
    open: OpenSet,
    paths: Vec<Vec<usize>>,
}

impl DijkstraSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// With `select_first` the search stops at the first goal reached,
    /// otherwise it collects a path to every goal within reach
    pub fn initialize(
        &mut self,
        start: Vec3,
        start_cell: usize,
        goal_cells: &[usize],
        max_depth: usize,
        select_first: bool,
    ) -> SearchState {
        self.reset();
        self.start = start;
        self.start_cell = start_cell;
        self.goals = goal_cells.to_vec();
        self.max_depth = max_depth.max(1);
        self.select_first = select_first;
        self.open.push_start(start_cell);
        self.state = SearchState::Initialized;
        SearchState::Initialized
    }

    pub fn reset(&mut self) {
        self.open.clear();
        self.goals.clear();
        self.paths.clear();
        self.state = SearchState::Uninitialized;
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Paths found so far, each ending in a goal cell
    pub fn paths(&self) -> &[Vec<usize>] {
        &self.paths
    }

    fn finish(&mut self, state: SearchState) -> SearchState {
        self.open.clear();
        self.state = state;
        state
    }

    fn exhausted(&mut self) -> SearchState {
        if self.paths.is_empty() {
            self.finish(SearchState::Failed)
        } else {
            self.finish(SearchState::Complete)
        }
    }

    /// Expands one node
    pub fn process(&mut self, mesh: &TriNavMesh) -> SearchState {
        match self.state() {
            SearchState::Initialized => {
                self.state = SearchState::Processing;
                if self.goals.contains(&self.start_cell) {
                    self.paths.push(vec![self.start_cell]);
                    return self.finish(SearchState::Complete);
                }
            }
            SearchState::Processing => {}
            other => return other,
        }

        let Some(current) = self.open.pop() else {
            return self.exhausted();
        };
        let cell = self.open.nodes[current].cell;
        let depth = self.open.nodes[current].depth;

        let links: Vec<usize> = mesh.cell(cell).links().collect();
        for next in links {
            if self.open.is_closed(next) {
                continue;
            }
            if let Some(g) = self.goals.iter().position(|&c| c == next) {
                let mut path = self.open.path_to(current);
                path.push(next);
                self.paths.push(path);
                if self.select_first || self.goals.len() == 1 {
                    return self.finish(SearchState::Complete);
                }
                self.goals.swap_remove(g);
            }
            if mesh.cell(next).link_count() == 1 || depth >= self.max_depth {
                continue;
            }
            self.open.relax(mesh, current, next, self.start, || 0.0);
        }

        if !self.open.has_open() {
            return self.exhausted();
        }
        SearchState::Processing
    }
}
