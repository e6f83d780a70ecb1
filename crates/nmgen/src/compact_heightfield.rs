//! Compact heightfield: open space above walkable spans with neighbour links
//!
//! Also hosts the span level operations that run on the compact form:
//! erosion, the distance field and area marking.

use std::collections::VecDeque;

use glam::Vec3;
use nav_common::{plane_height, point_in_polygon_2d, point_in_triangle_2d, Result};

use crate::{Heightfield, NULL_AREA};

/// Marker for a missing neighbour connection
pub const NOT_CONNECTED: u8 = 0xff;

/// Offset in x for each of the four directions
pub const DIR_OFFSET_X: [i32; 4] = [-1, 0, 1, 0];
/// Offset in z for each of the four directions
pub const DIR_OFFSET_Z: [i32; 4] = [0, 1, 0, -1];

/// A grid cell of the compact heightfield
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactCell {
    /// Index of the first span of the cell
    pub index: u32,
    /// Number of spans in the cell
    pub count: u32,
}

/// Open space above a walkable span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSpan {
    /// Floor height in cells
    pub y: u16,
    /// Height of the open space in cells
    pub h: u16,
    /// Layer index of the connected span in each neighbouring cell
    pub con: [u8; 4],
}

impl CompactSpan {
    /// Layer index of the neighbour in `dir`, if connected
    #[inline]
    pub fn connection(&self, dir: usize) -> Option<usize> {
        match self.con[dir] {
            NOT_CONNECTED => None,
            layer => Some(layer as usize),
        }
    }
}

/// Compact heightfield structure
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    pub width: i32,
    pub depth: i32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub walkable_height: i32,
    pub walkable_step: i32,
    pub border_size: i32,
    /// Largest value of the distance field
    pub max_distance: u16,
    /// One past the largest region id
    pub max_regions: u16,
    pub cells: Vec<CompactCell>,
    pub spans: Vec<CompactSpan>,
    /// Area id per span
    pub areas: Vec<u8>,
    /// Distance to the nearest boundary per span, empty until built
    pub dist: Vec<u16>,
    /// Region id per span, zero for no region
    pub regions: Vec<u16>,
}

impl CompactHeightfield {
    /// Builds the compact form of every walkable span of a heightfield
    pub fn build(hf: &Heightfield, walkable_height: i32, walkable_step: i32) -> Result<Self> {
        let cell_count = (hf.width * hf.depth) as usize;
        let mut cells = vec![CompactCell::default(); cell_count];
        let mut spans = Vec::with_capacity(hf.walkable_span_count());
        let mut areas = Vec::with_capacity(spans.capacity());

        for z in 0..hf.depth {
            for x in 0..hf.width {
                let column = hf.column(x, z);
                let cell = &mut cells[(x + z * hf.width) as usize];
                cell.index = spans.len() as u32;

                for (i, span) in column.iter().enumerate() {
                    if span.area == NULL_AREA {
                        continue;
                    }
                    let bot = span.max as i32;
                    let top = column.get(i + 1).map_or(0xffff, |s| s.min as i32);
                    spans.push(CompactSpan {
                        y: bot.clamp(0, 0xffff) as u16,
                        h: (top - bot).clamp(0, 0xff) as u16,
                        con: [NOT_CONNECTED; 4],
                    });
                    areas.push(span.area);
                    cell.count += 1;
                }
            }
        }

        let mut chf = Self {
            width: hf.width,
            depth: hf.depth,
            bmin: hf.bmin,
            bmax: hf.bmax,
            cs: hf.cs,
            ch: hf.ch,
            walkable_height,
            walkable_step,
            border_size: 0,
            max_distance: 0,
            max_regions: 0,
            cells,
            spans,
            regions: vec![0; areas.len()],
            areas,
            dist: Vec::new(),
        };
        chf.connect_neighbours();
        Ok(chf)
    }

    fn connect_neighbours(&mut self) {
        for z in 0..self.depth {
            for x in 0..self.width {
                let cell = self.cell(x, z);
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    let span = self.spans[i];
                    for dir in 0..4 {
                        let nx = x + DIR_OFFSET_X[dir];
                        let nz = z + DIR_OFFSET_Z[dir];
                        if !self.contains_cell(nx, nz) {
                            continue;
                        }
                        let ncell = self.cell(nx, nz);
                        for k in 0..ncell.count as usize {
                            let ns = self.spans[ncell.index as usize + k];
                            let bot = span.y.max(ns.y) as i32;
                            let top = (span.y as i32 + span.h as i32).min(ns.y as i32 + ns.h as i32);
                            if top - bot >= self.walkable_height
                                && (ns.y as i32 - span.y as i32).abs() <= self.walkable_step
                            {
                                if k < NOT_CONNECTED as usize {
                                    self.spans[i].con[dir] = k as u8;
                                }
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    #[inline]
    pub fn contains_cell(&self, x: i32, z: i32) -> bool {
        x >= 0 && z >= 0 && x < self.width && z < self.depth
    }

    #[inline]
    pub fn cell(&self, x: i32, z: i32) -> CompactCell {
        self.cells[(x + z * self.width) as usize]
    }

    /// Span indices of a cell
    #[inline]
    pub fn cell_spans(&self, x: i32, z: i32) -> std::ops::Range<usize> {
        let cell = self.cell(x, z);
        cell.index as usize..(cell.index + cell.count) as usize
    }

    /// Cell and span index of the neighbour of span `i` at (x, z) in `dir`
    #[inline]
    pub fn neighbour(&self, x: i32, z: i32, i: usize, dir: usize) -> Option<(i32, i32, usize)> {
        let layer = self.spans[i].connection(dir)?;
        let nx = x + DIR_OFFSET_X[dir];
        let nz = z + DIR_OFFSET_Z[dir];
        Some((nx, nz, self.cell(nx, nz).index as usize + layer))
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    pub fn walkable_span_count(&self) -> usize {
        self.areas.iter().filter(|&&a| a != NULL_AREA).count()
    }

    /// World position of the floor of span `i` in cell (x, z), at the cell centre
    pub fn span_position(&self, x: i32, z: i32, i: usize) -> Vec3 {
        Vec3::new(
            self.bmin.x + (x as f32 + 0.5) * self.cs,
            self.bmin.y + self.spans[i].y as f32 * self.ch,
            self.bmin.z + (z as f32 + 0.5) * self.cs,
        )
    }

    /// Breadth first distance (in cells) of every walkable span to the
    /// nearest span that borders unwalkable space
    fn boundary_distances(&self) -> Vec<u16> {
        let mut dist = vec![u16::MAX; self.spans.len()];
        let mut queue = VecDeque::new();

        for z in 0..self.depth {
            for x in 0..self.width {
                for i in self.cell_spans(x, z) {
                    if self.areas[i] == NULL_AREA {
                        continue;
                    }
                    let boundary = (0..4).any(|dir| match self.neighbour(x, z, i, dir) {
                        Some((_, _, ni)) => self.areas[ni] == NULL_AREA,
                        None => true,
                    });
                    if boundary {
                        dist[i] = 0;
                        queue.push_back((x, z, i));
                    }
                }
            }
        }

        while let Some((x, z, i)) = queue.pop_front() {
            let next = dist[i].saturating_add(1);
            for dir in 0..4 {
                if let Some((nx, nz, ni)) = self.neighbour(x, z, i, dir) {
                    if self.areas[ni] != NULL_AREA && dist[ni] > next {
                        dist[ni] = next;
                        queue.push_back((nx, nz, ni));
                    }
                }
            }
        }

        dist
    }

    /// Removes `radius` rings of walkable spans next to unwalkable space
    pub fn erode_walkable_area(&mut self, radius: i32) {
        if radius <= 0 {
            return;
        }
        let dist = self.boundary_distances();
        for (area, d) in self.areas.iter_mut().zip(dist) {
            if *area != NULL_AREA && (d as i32) < radius {
                *area = NULL_AREA;
            }
        }
    }

    /// Computes the distance of every walkable span to the walkable boundary
    pub fn build_distance_field(&mut self) {
        let mut dist = self.boundary_distances();
        for (d, &area) in dist.iter_mut().zip(&self.areas) {
            if area == NULL_AREA {
                *d = 0;
            }
        }
        self.max_distance = dist.iter().copied().max().unwrap_or(0);
        self.dist = dist;
    }

    /// Applies `area` to walkable spans whose floor lies inside the box
    pub fn mark_box_area(&mut self, bmin: Vec3, bmax: Vec3, area: u8) -> usize {
        self.mark_where(area, |p| {
            p.x >= bmin.x && p.x <= bmax.x && p.y >= bmin.y && p.y <= bmax.y && p.z >= bmin.z && p.z <= bmax.z
        })
    }

    /// Applies `area` to walkable spans inside a convex polygon extruded
    /// between `hmin` and `hmax`
    pub fn mark_convex_poly_area(&mut self, verts: &[Vec3], hmin: f32, hmax: f32, area: u8) -> usize {
        if verts.len() < 3 {
            return 0;
        }
        self.mark_where(area, |p| p.y >= hmin && p.y <= hmax && point_in_polygon_2d(p, verts))
    }

    /// Applies `area` to walkable spans inside a vertical cylinder standing on `pos`
    pub fn mark_cylinder_area(&mut self, pos: Vec3, radius: f32, height: f32, area: u8) -> usize {
        let r2 = radius * radius;
        self.mark_where(area, |p| {
            let dx = p.x - pos.x;
            let dz = p.z - pos.z;
            p.y >= pos.y && p.y <= pos.y + height && dx * dx + dz * dz <= r2
        })
    }

    /// Applies `area` to walkable spans under a triangle whose floor lies
    /// within `y_tolerance` of the triangle's plane
    pub fn mark_triangle_area(&mut self, verts: &[Vec3; 3], y_tolerance: f32, area: u8) -> usize {
        let [a, b, c] = *verts;
        let tmin = a.min(b).min(c);
        let tmax = a.max(b).max(c);
        let x0 = (((tmin.x - self.bmin.x) / self.cs).floor() as i32).max(0);
        let z0 = (((tmin.z - self.bmin.z) / self.cs).floor() as i32).max(0);
        let x1 = (((tmax.x - self.bmin.x) / self.cs).floor() as i32).min(self.width - 1);
        let z1 = (((tmax.z - self.bmin.z) / self.cs).floor() as i32).min(self.depth - 1);

        let mut marked = 0;
        for z in z0..=z1 {
            for x in x0..=x1 {
                for i in self.cell_spans(x, z) {
                    if self.areas[i] == NULL_AREA {
                        continue;
                    }
                    let p = self.span_position(x, z, i);
                    if !point_in_triangle_2d(p, a, b, c, 0.0) {
                        continue;
                    }
                    let Some(h) = plane_height(p, a, b, c) else {
                        continue;
                    };
                    if (p.y - h).abs() <= y_tolerance {
                        self.areas[i] = area;
                        marked += 1;
                    }
                }
            }
        }
        marked
    }

    fn mark_where(&mut self, area: u8, inside: impl Fn(Vec3) -> bool) -> usize {
        let mut marked = 0;
        for z in 0..self.depth {
            for x in 0..self.width {
                for i in self.cell_spans(x, z) {
                    if self.areas[i] == NULL_AREA {
                        continue;
                    }
                    if inside(self.span_position(x, z, i)) {
                        self.areas[i] = area;
                        marked += 1;
                    }
                }
            }
        }
        marked
    }
}
