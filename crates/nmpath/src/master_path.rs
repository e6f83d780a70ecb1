//! Cached corridors and the per-agent view of them

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use nav_common::{dist_sqr_2d, tri_area_2d, Error, Result};
use parking_lot::Mutex;
use web_time::Instant;

use crate::config::MAX_OFFSET_SCALE;
use crate::TriNavMesh;

/// Signed area below which a point counts as lying on a funnel edge
const FUNNEL_TOLERANCE: f32 = 1e-5;

/// Squared XZ distance below which two funnel points are the same
const SAME_POINT_SQR: f32 = 1e-10;

/// A corridor of linked cells ending at a goal cell
///
/// Master paths are owned by the planner and shared with agents through
/// [`Path`] handles. Once disposed, handles stop answering queries.
#[derive(Debug)]
pub struct MasterPath {
    id: u64,
    cells: Vec<usize>,
    /// Wall of `cells[i]` leading into `cells[i + 1]`
    exit_walls: Vec<usize>,
    mesh: Arc<TriNavMesh>,
    last_used: Mutex<Instant>,
    disposed: AtomicBool,
}

impl MasterPath {
    /// Fails if the corridor is empty or two consecutive cells are not linked
    pub fn new(id: u64, cells: Vec<usize>, mesh: Arc<TriNavMesh>) -> Result<Self> {
        if cells.is_empty() {
            return Err(Error::Pathfinding("path corridor is empty".into()));
        }
        if let Some(&bad) = cells.iter().find(|&&c| c >= mesh.cell_count()) {
            return Err(Error::Pathfinding(format!("path cell {bad} is not in the mesh")));
        }
        let exit_walls = cells
            .windows(2)
            .map(|w| {
                mesh.cell(w[0]).link_index(w[1]).ok_or_else(|| {
                    Error::Pathfinding(format!("path cells {} and {} are not linked", w[0], w[1]))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id,
            cells,
            exit_walls,
            mesh,
            last_used: Mutex::new(Instant::now()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn start_cell(&self) -> usize {
        self.cells[0]
    }

    pub fn goal_cell(&self) -> usize {
        self.cells[self.cells.len() - 1]
    }

    pub fn mesh(&self) -> &Arc<TriNavMesh> {
        &self.mesh
    }

    /// Position of `cell` in the corridor
    pub fn cell_index(&self, cell: usize) -> Option<usize> {
        self.cells.iter().position(|&c| c == cell)
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    /// Time since the path was created or last reused
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used())
    }

    pub fn reset_timestamp(&self) {
        *self.last_used.lock() = Instant::now();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Creates a handle to this corridor ending at `goal`
    pub fn path(self: &Arc<Self>, goal: Vec3) -> Path {
        Path {
            root: Arc::clone(self),
            goal,
            last_cell: 0,
        }
    }

    fn is_on_cell(&self, p: Vec3, index: usize) -> bool {
        let cell = self.mesh.cell(self.cells[index]);
        cell.is_in_column(p) && (cell.plane_y(p) - p.y).abs() <= self.mesh.plane_tolerance()
    }

    /// Corridor index of the cell below or above `p` that is vertically
    /// closest to it
    fn index_at(&self, p: Vec3) -> Option<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &c)| self.mesh.cell(c).is_in_column(p))
            .map(|(i, &c)| (i, (self.mesh.cell(c).plane_y(p) - p.y).abs()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Exit portal of corridor cell `index` as (left, right) seen from
    /// inside the cell
    fn portal(&self, index: usize) -> (Vec3, Vec3) {
        let cell = self.mesh.cell(self.cells[index]);
        let wall = self.exit_walls[index];
        (cell.vertex((wall + 1) % 3), cell.vertex(wall))
    }
}

/// An agent's handle to a [`MasterPath`] with its own goal position
#[derive(Debug, Clone)]
pub struct Path {
    root: Arc<MasterPath>,
    goal: Vec3,
    /// Corridor index found by the previous lookup
    last_cell: usize,
}

impl Path {
    pub fn id(&self) -> u64 {
        self.root.id
    }

    pub fn goal(&self) -> Vec3 {
        self.goal
    }

    pub fn is_disposed(&self) -> bool {
        self.root.is_disposed()
    }

    pub fn cell_count(&self) -> usize {
        self.root.len()
    }

    pub fn master(&self) -> &Arc<MasterPath> {
        &self.root
    }

    fn index_for(&mut self, p: Vec3) -> Option<usize> {
        if self.last_cell < self.root.len() && self.root.is_on_cell(p, self.last_cell) {
            return Some(self.last_cell);
        }
        let index = self.root.index_at(p)?;
        self.last_cell = index;
        Some(index)
    }

    /// Next corner of the corridor visible from `from`, or the goal if it is
    /// visible
    ///
    /// Corners are moved towards the other side of the funnel by the mesh's
    /// offset scale. Returns `None` if the path is disposed or `from` is
    /// outside the corridor.
    pub fn get_target(&mut self, from: Vec3) -> Option<Vec3> {
        if self.is_disposed() {
            return None;
        }
        let mut start = self.index_for(from)?;
        let last = self.root.len() - 1;

        let same = |a: Vec3, b: Vec3| dist_sqr_2d(a, b) <= SAME_POINT_SQR;
        let (mut left, mut right) = loop {
            if start >= last {
                return Some(self.goal);
            }
            let (l, r) = self.root.portal(start);
            if same(from, l) || same(from, r) {
                start += 1;
            } else {
                break (l, r);
            }
        };

        let scale = self.root.mesh.offset_scale().clamp(0.0, MAX_OFFSET_SCALE);
        let toward = |c: Vec3, other: Vec3| c + (other - c) * scale;
        let inside_right = |p: Vec3, right: Vec3| tri_area_2d(from, right, p) <= FUNNEL_TOLERANCE;
        let inside_left = |p: Vec3, left: Vec3| tri_area_2d(from, left, p) >= -FUNNEL_TOLERANCE;

        for index in start + 1..=last {
            let (nl, nr) = if index == last {
                (self.goal, self.goal)
            } else {
                self.root.portal(index)
            };

            if !same(nr, right) && inside_right(nr, right) {
                if inside_left(nr, left) {
                    right = nr;
                } else {
                    return Some(toward(left, right));
                }
            }
            if !same(nl, left) && inside_left(nl, left) {
                if inside_right(nl, right) {
                    left = nl;
                } else {
                    return Some(toward(right, left));
                }
            }
        }
        Some(self.goal)
    }

    /// Closest point on the corridor surface
    pub fn force_to_path(&self, p: Vec3) -> Vec3 {
        let mesh = &self.root.mesh;
        self.root
            .cells
            .iter()
            .map(|&c| mesh.cell(c).closest_point(p))
            .min_by(|a, b| a.distance_squared(p).total_cmp(&b.distance_squared(p)))
            .unwrap_or(p)
    }

    /// Moves `p` onto the corridor plane, or `None` if it is outside the
    /// corridor column
    pub fn force_y_to_path(&mut self, p: Vec3) -> Option<Vec3> {
        let index = self.index_for(p)?;
        let cell = self.root.mesh.cell(self.root.cells[index]);
        Some(Vec3::new(p.x, cell.plane_y(p), p.z))
    }

    pub fn is_in_path_column(&self, p: Vec3) -> bool {
        self.root
            .cells
            .iter()
            .any(|&c| self.root.mesh.cell(c).is_in_column(p))
    }

    /// Corridor triangles as an unindexed vertex list, three per cell
    pub fn path_polys(&self) -> (Vec<Vec3>, Vec<u32>) {
        let verts: Vec<Vec3> = self
            .root
            .cells
            .iter()
            .flat_map(|&c| *self.root.mesh.cell(c).vertices())
            .collect();
        let indices = (0..verts.len() as u32).collect();
        (verts, indices)
    }
}
