//! Solid heightfield: rasterization and span filters

use glam::Vec3;
use nav_common::{Error, Result, TriangleMesh};

use crate::{NULL_AREA, SPAN_MAX_HEIGHT};

/// Height used for the open space above the top span of a column
const MAX_HEIGHTFIELD_HEIGHT: i32 = 0xffff;

/// A solid interval in a heightfield column, in cell units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub min: u16,
    pub max: u16,
    pub area: u8,
}

/// A voxelized representation of the input geometry
///
/// Every column holds its spans sorted bottom-up and never overlapping.
#[derive(Debug, Clone)]
pub struct Heightfield {
    /// Number of cells along the x-axis
    pub width: i32,
    /// Number of cells along the z-axis
    pub depth: i32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    columns: Vec<Vec<Span>>,
}

impl Heightfield {
    /// Creates an empty heightfield covering the given bounds
    pub fn new(bmin: Vec3, bmax: Vec3, cs: f32, ch: f32) -> Result<Self> {
        if !(cs > 0.0 && ch > 0.0) {
            return Err(Error::InvalidConfig("cell sizes must be positive".into()));
        }
        if !(bmin.x < bmax.x && bmin.z < bmax.z && bmin.y <= bmax.y) {
            return Err(Error::InvalidConfig(format!(
                "invalid heightfield bounds {bmin} .. {bmax}"
            )));
        }

        let width = (((bmax.x - bmin.x) / cs).ceil() as i32).max(1);
        let depth = (((bmax.z - bmin.z) / cs).ceil() as i32).max(1);
        // Column indices are computed in i32
        let Some(cells) = width.checked_mul(depth) else {
            return Err(Error::InvalidConfig(format!(
                "heightfield of {width} x {depth} cells is too large"
            )));
        };

        Ok(Self {
            width,
            depth,
            bmin,
            bmax,
            cs,
            ch,
            columns: vec![Vec::new(); cells as usize],
        })
    }

    #[inline]
    fn column_index(&self, x: i32, z: i32) -> usize {
        (x + z * self.width) as usize
    }

    #[inline]
    pub fn contains_cell(&self, x: i32, z: i32) -> bool {
        x >= 0 && z >= 0 && x < self.width && z < self.depth
    }

    /// Spans of a column, bottom-up
    pub fn column(&self, x: i32, z: i32) -> &[Span] {
        if !self.contains_cell(x, z) {
            return &[];
        }
        &self.columns[self.column_index(x, z)]
    }

    pub fn span_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Number of spans whose area is not the null area
    pub fn walkable_span_count(&self) -> usize {
        self.columns
            .iter()
            .flatten()
            .filter(|s| s.area != NULL_AREA)
            .count()
    }

    /// Adds a span, merging it with every span it touches
    ///
    /// When the merged top is within `merge_threshold` of an existing top the
    /// larger area id wins.
    pub fn add_span(&mut self, x: i32, z: i32, min: u16, max: u16, area: u8, merge_threshold: i32) {
        if !self.contains_cell(x, z) {
            return;
        }
        let idx = self.column_index(x, z);
        let column = &mut self.columns[idx];

        let (mut smin, mut smax, mut area) = (min, max, area);
        let mut i = 0;
        while i < column.len() {
            let cur = column[i];
            if cur.min > smax {
                break;
            }
            if cur.max < smin {
                i += 1;
                continue;
            }

            smin = smin.min(cur.min);
            smax = smax.max(cur.max);
            if (smax as i32 - cur.max as i32).abs() <= merge_threshold {
                area = area.max(cur.area);
            }
            column.remove(i);
        }

        column.insert(
            i,
            Span {
                min: smin,
                max: smax,
                area,
            },
        );
    }

    /// Rasterizes every triangle of the mesh with its area id
    pub fn rasterize_triangles(
        &mut self,
        mesh: &TriangleMesh,
        areas: &[u8],
        merge_threshold: i32,
    ) -> Result<()> {
        if areas.len() != mesh.tri_count() {
            return Err(Error::InvalidMesh(format!(
                "expected {} area ids, got {}",
                mesh.tri_count(),
                areas.len()
            )));
        }
        for (tri, &area) in areas.iter().enumerate() {
            self.rasterize_triangle(&mesh.triangle_vertices(tri), area, merge_threshold);
        }
        Ok(())
    }

    /// Rasterizes one triangle by clipping it against every cell it overlaps
    pub fn rasterize_triangle(&mut self, verts: &[Vec3; 3], area: u8, merge_threshold: i32) {
        let tmin = verts[0].min(verts[1]).min(verts[2]);
        let tmax = verts[0].max(verts[1]).max(verts[2]);

        if tmax.x < self.bmin.x
            || tmin.x > self.bmax.x
            || tmax.z < self.bmin.z
            || tmin.z > self.bmax.z
            || tmax.y < self.bmin.y
            || tmin.y > self.bmax.y
        {
            return;
        }

        let ics = 1.0 / self.cs;
        let x0 = (((tmin.x - self.bmin.x) * ics).floor() as i32).clamp(0, self.width - 1);
        let x1 = (((tmax.x - self.bmin.x) * ics).floor() as i32).clamp(0, self.width - 1);
        let z0 = (((tmin.z - self.bmin.z) * ics).floor() as i32).clamp(0, self.depth - 1);
        let z1 = (((tmax.z - self.bmin.z) * ics).floor() as i32).clamp(0, self.depth - 1);
        let height_range = self.bmax.y - self.bmin.y;

        let mut row = Vec::with_capacity(7);
        let mut scratch = Vec::with_capacity(7);
        let mut cell = Vec::with_capacity(7);

        for z in z0..=z1 {
            let cz = self.bmin.z + z as f32 * self.cs;
            clip_axis(verts, &mut scratch, 2, cz, true);
            clip_axis(&scratch, &mut row, 2, cz + self.cs, false);
            if row.len() < 3 {
                continue;
            }

            for x in x0..=x1 {
                let cx = self.bmin.x + x as f32 * self.cs;
                clip_axis(&row, &mut scratch, 0, cx, true);
                clip_axis(&scratch, &mut cell, 0, cx + self.cs, false);
                if cell.len() < 3 {
                    continue;
                }

                let mut ymin = cell[0].y;
                let mut ymax = cell[0].y;
                for v in &cell[1..] {
                    ymin = ymin.min(v.y);
                    ymax = ymax.max(v.y);
                }
                ymin -= self.bmin.y;
                ymax -= self.bmin.y;
                if ymax < 0.0 || ymin > height_range {
                    continue;
                }

                let max_h = SPAN_MAX_HEIGHT as i32;
                let smin = ((ymin.max(0.0) / self.ch).floor() as i32).clamp(0, max_h - 1);
                let smax = ((ymax / self.ch).ceil() as i32).clamp(smin + 1, max_h);
                self.add_span(x, z, smin as u16, smax as u16, area, merge_threshold);
            }
        }
    }

    /// Lets walkable spans extend over low obstacles such as curbs
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_step: i32) {
        for column in &mut self.columns {
            let mut prev_walkable = false;
            let mut prev_area = NULL_AREA;
            let mut prev_max = 0i32;

            for span in column.iter_mut() {
                let walkable = span.area != NULL_AREA;
                if !walkable && prev_walkable && span.max as i32 - prev_max <= walkable_step {
                    span.area = prev_area;
                }
                prev_walkable = walkable;
                prev_area = span.area;
                prev_max = span.max as i32;
            }
        }
    }

    /// Marks spans at ledges, or with too much height variation among their
    /// neighbours, as unwalkable
    pub fn filter_ledge_spans(&mut self, walkable_height: i32, walkable_step: i32) {
        const DIRS: [(i32, i32); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];
        let mut ledges = Vec::new();

        for z in 0..self.depth {
            for x in 0..self.width {
                let column = self.column(x, z);
                for (i, span) in column.iter().enumerate() {
                    if span.area == NULL_AREA {
                        continue;
                    }

                    let bot = span.max as i32;
                    let top = column
                        .get(i + 1)
                        .map_or(MAX_HEIGHTFIELD_HEIGHT, |s| s.min as i32);

                    let mut min_neighbor = MAX_HEIGHTFIELD_HEIGHT;
                    let mut accessible_min = bot;
                    let mut accessible_max = bot;

                    for (dx, dz) in DIRS {
                        let (nx, nz) = (x + dx, z + dz);
                        if !self.contains_cell(nx, nz) {
                            min_neighbor = min_neighbor.min(-walkable_step - bot);
                            continue;
                        }

                        let neighbor = self.column(nx, nz);

                        // From minus infinity to the first span
                        let nbot = -walkable_step;
                        let ntop = neighbor
                            .first()
                            .map_or(MAX_HEIGHTFIELD_HEIGHT, |s| s.min as i32);
                        if top.min(ntop) - bot.max(nbot) > walkable_height {
                            min_neighbor = min_neighbor.min(nbot - bot);
                        }

                        for (j, ns) in neighbor.iter().enumerate() {
                            let nbot = ns.max as i32;
                            let ntop = neighbor
                                .get(j + 1)
                                .map_or(MAX_HEIGHTFIELD_HEIGHT, |s| s.min as i32);
                            if top.min(ntop) - bot.max(nbot) > walkable_height {
                                min_neighbor = min_neighbor.min(nbot - bot);
                                if (nbot - bot).abs() <= walkable_step {
                                    accessible_min = accessible_min.min(nbot);
                                    accessible_max = accessible_max.max(nbot);
                                }
                            }
                        }
                    }

                    if min_neighbor < -walkable_step
                        || accessible_max - accessible_min > walkable_step
                    {
                        ledges.push((x, z, i));
                    }
                }
            }
        }

        for (x, z, i) in ledges {
            let idx = self.column_index(x, z);
            self.columns[idx][i].area = NULL_AREA;
        }
    }

    /// Marks spans without enough clearance above them as unwalkable
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: i32) {
        for column in &mut self.columns {
            for i in 0..column.len() {
                let bot = column[i].max as i32;
                let top = column
                    .get(i + 1)
                    .map_or(MAX_HEIGHTFIELD_HEIGHT, |s| s.min as i32);
                if top - bot < walkable_height {
                    column[i].area = NULL_AREA;
                }
            }
        }
    }
}

/// Clears the area of every triangle steeper than `walkable_slope` degrees
///
/// Works for either triangle winding. Returns the number of triangles that
/// remain walkable.
pub fn clear_unwalkable_triangles(mesh: &TriangleMesh, walkable_slope: f32, areas: &mut [u8]) -> usize {
    let threshold = walkable_slope.to_radians().cos();
    let mut walkable = 0;
    for (tri, area) in areas.iter_mut().enumerate().take(mesh.tri_count()) {
        let [a, b, c] = mesh.triangle_vertices(tri);
        let normal = (b - a).cross(c - a).normalize_or_zero();
        if normal.y.abs() < threshold {
            *area = NULL_AREA;
        } else if *area != NULL_AREA {
            walkable += 1;
        }
    }
    walkable
}

/// Sutherland-Hodgman clip of a polygon against one axis aligned plane
fn clip_axis(input: &[Vec3], out: &mut Vec<Vec3>, axis: usize, bound: f32, keep_above: bool) {
    out.clear();
    let n = input.len();
    for i in 0..n {
        let a = input[i];
        let b = input[(i + 1) % n];
        let da = if keep_above { a[axis] - bound } else { bound - a[axis] };
        let db = if keep_above { b[axis] - bound } else { bound - b[axis] };

        if da >= 0.0 {
            out.push(a);
        }
        if (da > 0.0 && db < 0.0) || (da < 0.0 && db > 0.0) {
            let t = da / (da - db);
            out.push(a + (b - a) * t);
        }
    }
}
