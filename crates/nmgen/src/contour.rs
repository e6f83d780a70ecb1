//! Region outlines traced into simplified contours
//!
//! Contour vertices live on the corners of the heightfield grid. Every
//! corner of any region that lies on a shared boundary is kept by all regions
//! touching that boundary, so neighbouring polygons always share whole edges.

use std::collections::{BTreeMap, HashSet};

use glam::Vec3;
use nav_common::{Error, Result};

use crate::{CompactHeightfield, NULL_AREA};

/// Vertex flag: the vertex touches another region and is never simplified away
pub const CONTOUR_VERTEX_SHARED: i32 = 0x1;

/// Outline of one region
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    /// Simplified vertices as [x, y, z, flags] in cell units
    pub verts: Vec<[i32; 4]>,
    /// Every grid corner along the outline as [x, y, z, flags]
    pub raw_verts: Vec<[i32; 4]>,
    pub region: u16,
    pub area: u8,
}

/// All contours of a tile
#[derive(Debug, Clone)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub width: i32,
    pub depth: i32,
    pub border_size: i32,
    pub max_error: f32,
}

impl ContourSet {
    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Run {
    x0: i32,
    x1: i32,
    spans: Vec<usize>,
}

#[derive(Debug, Default)]
struct RegionRows {
    area: u8,
    rows: BTreeMap<i32, Run>,
}

impl RegionRows {
    fn span_at(&self, x: i32, z: i32) -> Option<usize> {
        let run = self.rows.get(&z)?;
        if x < run.x0 || x > run.x1 {
            return None;
        }
        run.spans.get((x - run.x0) as usize).copied()
    }
}

/// Twice the signed area of triangle abc on the grid, negative when c lies
/// left of a->b
#[inline]
pub(crate) fn area2(a: [i32; 2], b: [i32; 2], c: [i32; 2]) -> i64 {
    (c[0] - a[0]) as i64 * (b[1] - a[1]) as i64 - (b[0] - a[0]) as i64 * (c[1] - a[1]) as i64
}

#[inline]
pub(crate) fn left(a: [i32; 2], b: [i32; 2], c: [i32; 2]) -> bool {
    area2(a, b, c) < 0
}

#[inline]
pub(crate) fn left_on(a: [i32; 2], b: [i32; 2], c: [i32; 2]) -> bool {
    area2(a, b, c) <= 0
}

fn between(a: [i32; 2], b: [i32; 2], c: [i32; 2]) -> bool {
    if area2(a, b, c) != 0 {
        return false;
    }
    if a[0] != b[0] {
        (a[0] <= c[0] && c[0] <= b[0]) || (a[0] >= c[0] && c[0] >= b[0])
    } else {
        (a[1] <= c[1] && c[1] <= b[1]) || (a[1] >= c[1] && c[1] >= b[1])
    }
}

/// True if segments ab and cd touch or cross
pub(crate) fn segments_intersect(a: [i32; 2], b: [i32; 2], c: [i32; 2], d: [i32; 2]) -> bool {
    let proper = area2(a, b, c) != 0
        && area2(a, b, d) != 0
        && area2(c, d, a) != 0
        && area2(c, d, b) != 0
        && (left(a, b, c) ^ left(a, b, d))
        && (left(c, d, a) ^ left(c, d, b));
    proper || between(a, b, c) || between(a, b, d) || between(c, d, a) || between(c, d, b)
}

/// Twice the signed area of a polygon, negative for counter-clockwise
pub(crate) fn polygon_area2(points: &[[i32; 2]]) -> i64 {
    let n = points.len();
    let mut area = 0i64;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        area += a[0] as i64 * b[1] as i64 - b[0] as i64 * a[1] as i64;
    }
    -area
}

/// Traces and simplifies the outline of every region
pub fn build_contours(chf: &CompactHeightfield, max_error: f32, max_edge_len: i32) -> Result<ContourSet> {
    let regions = collect_region_rows(chf)?;

    let corners: Vec<(u16, Vec<[i32; 2]>)> = regions
        .iter()
        .map(|(&r, rows)| (r, outline_corners(rows)))
        .collect();
    let global_corners: HashSet<[i32; 2]> = corners
        .iter()
        .flat_map(|(_, c)| c.iter().copied())
        .collect();

    let mut contours = Vec::with_capacity(corners.len());
    for (r, own) in &corners {
        let rows = &regions[r];

        let raw = walk_outline(own);
        let own_set: HashSet<[i32; 2]> = own.iter().copied().collect();

        let mut points: Vec<[i32; 2]> = raw
            .iter()
            .copied()
            .filter(|p| own_set.contains(p) || global_corners.contains(p))
            .collect();
        let mut shared: Vec<bool> = points
            .iter()
            .map(|&p| touches_other_region(chf, *r, p))
            .collect();

        simplify(&mut points, &mut shared, max_error);
        let (points, shared, ys) = split_long_edges(&points, &shared, max_edge_len, |p| {
            corner_height(chf, rows, p)
        });

        if points.len() < 3 {
            log::warn!("Dropped degenerate contour of region {}", r);
            continue;
        }

        let verts = points
            .iter()
            .zip(&shared)
            .zip(&ys)
            .map(|((p, &s), &y)| [p[0], y, p[1], if s { CONTOUR_VERTEX_SHARED } else { 0 }])
            .collect();
        let raw_verts = raw
            .iter()
            .map(|&p| {
                let flags = if touches_other_region(chf, *r, p) {
                    CONTOUR_VERTEX_SHARED
                } else {
                    0
                };
                [p[0], corner_height(chf, rows, p).unwrap_or(0), p[1], flags]
            })
            .collect();

        contours.push(Contour {
            verts,
            raw_verts,
            region: *r,
            area: rows.area,
        });
    }

    log::debug!("Built {} contours", contours.len());

    Ok(ContourSet {
        contours,
        bmin: chf.bmin,
        bmax: chf.bmax,
        cs: chf.cs,
        ch: chf.ch,
        width: chf.width,
        depth: chf.depth,
        border_size: chf.border_size,
        max_error,
    })
}

fn collect_region_rows(chf: &CompactHeightfield) -> Result<BTreeMap<u16, RegionRows>> {
    let mut regions: BTreeMap<u16, RegionRows> = BTreeMap::new();
    for z in 0..chf.depth {
        for x in 0..chf.width {
            for i in chf.cell_spans(x, z) {
                let r = chf.regions.get(i).copied().unwrap_or(0);
                if r == 0 || chf.areas[i] == NULL_AREA {
                    continue;
                }
                let region = regions.entry(r).or_default();
                region.area = chf.areas[i];
                match region.rows.get_mut(&z) {
                    Some(run) => {
                        if x != run.x1 + 1 {
                            return Err(Error::NavMeshGeneration(format!(
                                "region {r} has more than one run in row {z}"
                            )));
                        }
                        run.x1 = x;
                        run.spans.push(i);
                    }
                    None => {
                        region.rows.insert(
                            z,
                            Run {
                                x0: x,
                                x1: x,
                                spans: vec![i],
                            },
                        );
                    }
                }
            }
        }
    }

    for (r, region) in &regions {
        let zs: Vec<i32> = region.rows.keys().copied().collect();
        if zs.windows(2).any(|w| w[1] != w[0] + 1) {
            return Err(Error::NavMeshGeneration(format!(
                "region {r} rows are not contiguous"
            )));
        }
    }
    Ok(regions)
}

/// Corner points of the outline of a monotone region, counter-clockwise
/// with x to the right and z up
fn outline_corners(region: &RegionRows) -> Vec<[i32; 2]> {
    let rows: Vec<(i32, i32, i32)> = region
        .rows
        .iter()
        .map(|(&z, run)| (z, run.x0, run.x1 + 1))
        .collect();
    let mut pts = Vec::with_capacity(rows.len() * 6);
    let (z0, a0, b0) = rows[0];
    pts.push([a0, z0]);
    pts.push([b0, z0]);
    for k in 0..rows.len() {
        let (z, _, b) = rows[k];
        pts.push([b, z]);
        pts.push([b, z + 1]);
        if let Some(&(_, _, bn)) = rows.get(k + 1) {
            pts.push([bn, z + 1]);
        }
    }
    for k in (0..rows.len()).rev() {
        let (z, a, _) = rows[k];
        pts.push([a, z + 1]);
        pts.push([a, z]);
        if k > 0 {
            pts.push([rows[k - 1].1, z]);
        }
    }

    pts.dedup();
    while pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    remove_collinear(&mut pts);
    pts
}

fn remove_collinear(pts: &mut Vec<[i32; 2]>) {
    let mut i = 0;
    while pts.len() > 3 && i < pts.len() {
        let n = pts.len();
        let prev = pts[(i + n - 1) % n];
        let next = pts[(i + 1) % n];
        if area2(prev, pts[i], next) == 0 {
            pts.remove(i);
            i = i.saturating_sub(1);
        } else {
            i += 1;
        }
    }
}

/// Every grid point along an axis aligned outline, in order
fn walk_outline(corners: &[[i32; 2]]) -> Vec<[i32; 2]> {
    let mut out = Vec::new();
    let n = corners.len();
    for i in 0..n {
        let a = corners[i];
        let b = corners[(i + 1) % n];
        let dx = (b[0] - a[0]).signum();
        let dz = (b[1] - a[1]).signum();
        let mut p = a;
        while p != b {
            out.push(p);
            p = [p[0] + dx, p[1] + dz];
        }
    }
    out
}

/// True when one of the four cells around grid corner `p` holds a span of
/// another region
fn touches_other_region(chf: &CompactHeightfield, region: u16, p: [i32; 2]) -> bool {
    for (x, z) in [(p[0] - 1, p[1] - 1), (p[0], p[1] - 1), (p[0] - 1, p[1]), (p[0], p[1])] {
        if !chf.contains_cell(x, z) {
            continue;
        }
        for i in chf.cell_spans(x, z) {
            let r = chf.regions[i];
            if r != 0 && r != region {
                return true;
            }
        }
    }
    false
}

/// Highest floor of the region among the four cells around grid corner `p`
fn corner_height(chf: &CompactHeightfield, region: &RegionRows, p: [i32; 2]) -> Option<i32> {
    [(p[0] - 1, p[1] - 1), (p[0], p[1] - 1), (p[0] - 1, p[1]), (p[0], p[1])]
        .into_iter()
        .filter_map(|(x, z)| region.span_at(x, z))
        .map(|i| chf.spans[i].y as i32)
        .max()
}

fn dist_point_segment_sqr(p: [i32; 2], a: [i32; 2], b: [i32; 2]) -> f32 {
    let (px, pz) = (p[0] as f32, p[1] as f32);
    let (ax, az) = (a[0] as f32, a[1] as f32);
    let (dx, dz) = (b[0] as f32 - ax, b[1] as f32 - az);
    let len_sqr = dx * dx + dz * dz;
    let t = if len_sqr > 0.0 {
        (((px - ax) * dx + (pz - az) * dz) / len_sqr).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let qx = ax + t * dx - px;
    let qz = az + t * dz - pz;
    qx * qx + qz * qz
}

/// Removes unshared vertices that deviate less than `max_error` from the
/// segment joining their neighbours, as long as the outline stays simple
fn simplify(points: &mut Vec<[i32; 2]>, shared: &mut Vec<bool>, max_error: f32) {
    if max_error <= 0.0 {
        return;
    }
    let max_error_sqr = max_error * max_error;

    loop {
        let mut removed = false;
        let mut i = 0;
        while i < points.len() && points.len() > 4 {
            let n = points.len();
            if shared[i] {
                i += 1;
                continue;
            }
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;
            if dist_point_segment_sqr(points[i], points[prev], points[next]) <= max_error_sqr
                && can_remove(points, i)
            {
                points.remove(i);
                shared.remove(i);
                removed = true;
            } else {
                i += 1;
            }
        }
        if !removed {
            break;
        }
    }
}

fn can_remove(points: &[[i32; 2]], i: usize) -> bool {
    let n = points.len();
    let prev = (i + n - 1) % n;
    let next = (i + 1) % n;
    let (a, b) = (points[prev], points[next]);
    if a == b {
        return false;
    }

    for k in 0..n {
        let k1 = (k + 1) % n;
        if [prev, i, next].contains(&k) || [prev, i, next].contains(&k1) {
            continue;
        }
        if segments_intersect(a, b, points[k], points[k1]) {
            return false;
        }
    }

    let before = polygon_area2(points);
    let after = before - area2(points[prev], points[i], points[next]);
    after != 0 && (after < 0) == (before < 0)
}

/// Splits edges longer than `max_edge_len`
///
/// Axis aligned edges are split on multiples of `max_edge_len`, so both
/// regions sharing an edge split it at the same points. Returns the points,
/// their shared flags and heights.
fn split_long_edges(
    points: &[[i32; 2]],
    shared: &[bool],
    max_edge_len: i32,
    height: impl Fn([i32; 2]) -> Option<i32>,
) -> (Vec<[i32; 2]>, Vec<bool>, Vec<i32>) {
    let n = points.len();
    let mut out = Vec::with_capacity(n);
    let mut out_shared = Vec::with_capacity(n);
    let mut out_y = Vec::with_capacity(n);
    let ys: Vec<i32> = points.iter().map(|&p| height(p).unwrap_or(0)).collect();

    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        out.push(a);
        out_shared.push(shared[i]);
        out_y.push(ys[i]);

        if max_edge_len <= 0 {
            continue;
        }

        if a[0] == b[0] || a[1] == b[1] {
            let axis = if a[1] == b[1] { 0 } else { 1 };
            let step = (b[axis] - a[axis]).signum();
            let mut c = a[axis] + step;
            while c != b[axis] {
                if c.rem_euclid(max_edge_len) == 0 {
                    let mut p = a;
                    p[axis] = c;
                    out.push(p);
                    out_shared.push(shared[i] && shared[(i + 1) % n]);
                    out_y.push(height(p).unwrap_or(ys[i]));
                }
                c += step;
            }
        } else {
            let dx = (b[0] - a[0]) as f32;
            let dz = (b[1] - a[1]) as f32;
            let len = (dx * dx + dz * dz).sqrt();
            let parts = (len / max_edge_len as f32).ceil() as i32;
            for k in 1..parts {
                let t = k as f32 / parts as f32;
                let p = [
                    a[0] + (dx * t).round() as i32,
                    a[1] + (dz * t).round() as i32,
                ];
                if p == a || p == b || out.last() == Some(&p) {
                    continue;
                }
                let y = ys[i] as f32 + (ys[(i + 1) % n] - ys[i]) as f32 * t;
                out.push(p);
                out_shared.push(false);
                out_y.push(y.round() as i32);
            }
        }
    }

    (out, out_shared, out_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_regions, Heightfield};

    fn chf_from_mask(mask: &[&str]) -> CompactHeightfield {
        let depth = mask.len() as i32;
        let width = mask[0].len() as i32;
        let mut hf = Heightfield::new(
            Vec3::ZERO,
            Vec3::new(width as f32, 10.0, depth as f32),
            1.0,
            0.5,
        )
        .unwrap();
        for (z, row) in mask.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    hf.add_span(x as i32, z as i32, 0, 2, 63, 1);
                }
            }
        }
        let mut chf = CompactHeightfield::build(&hf, 3, 1).unwrap();
        build_regions(&mut chf, 0, 0, 0).unwrap();
        chf
    }

    fn xz(contour: &Contour) -> Vec<[i32; 2]> {
        contour.verts.iter().map(|v| [v[0], v[2]]).collect()
    }

    #[test]
    fn test_rectangle_contour() -> Result<()> {
        let chf = chf_from_mask(&["####", "####", "####"]);
        let cset = build_contours(&chf, 1.3, 0)?;
        assert_eq!(cset.contours.len(), 1);
        let c = &cset.contours[0];
        assert_eq!(xz(c), vec![[0, 0], [4, 0], [4, 3], [0, 3]]);
        assert!(c.verts.iter().all(|v| v[1] == 2 && v[3] == 0));
        assert_eq!(c.raw_verts.len(), 14);
        assert!(polygon_area2(&xz(c)) < 0);
        Ok(())
    }

    #[test]
    fn test_shared_boundaries_have_matching_vertices() -> Result<()> {
        // Two narrow regions below one wide region. The wide region must pick
        // up the inner corners of both so the shared edges match exactly.
        let chf = chf_from_mask(&["##.##", "##.##", "#####", "#####"]);
        let cset = build_contours(&chf, 0.0, 0)?;
        assert_eq!(cset.contours.len(), 3);

        let edges = |c: &Contour| -> HashSet<([i32; 2], [i32; 2])> {
            let pts = xz(c);
            (0..pts.len())
                .map(|i| (pts[i], pts[(i + 1) % pts.len()]))
                .collect()
        };
        let left = edges(&cset.contours[0]);
        let right = edges(&cset.contours[1]);
        let top = edges(&cset.contours[2]);

        assert!(left.contains(&([2, 2], [0, 2])));
        assert!(top.contains(&([0, 2], [2, 2])));
        assert!(right.contains(&([5, 2], [3, 2])));
        assert!(top.contains(&([3, 2], [5, 2])));

        let shared = cset.contours[2]
            .verts
            .iter()
            .filter(|v| v[3] & CONTOUR_VERTEX_SHARED != 0)
            .count();
        assert_eq!(shared, 4);
        Ok(())
    }

    #[test]
    fn test_staircase_is_simplified() -> Result<()> {
        let mask = ["#.......", "##......", "###.....", "####....", "#####...", "######.."];
        let chf = chf_from_mask(&mask);
        let exact = build_contours(&chf, 0.0, 0)?;
        let simplified = build_contours(&chf, 1.5, 0)?;
        assert!(simplified.contours[0].verts.len() < exact.contours[0].verts.len());
        assert!(simplified.contours[0].verts.len() >= 4);
        Ok(())
    }

    #[test]
    fn test_long_edges_split_on_grid_multiples() -> Result<()> {
        let chf = chf_from_mask(&["##########", "##########"]);
        let cset = build_contours(&chf, 0.0, 4)?;
        let pts = xz(&cset.contours[0]);
        assert!(pts.contains(&[4, 0]));
        assert!(pts.contains(&[8, 0]));
        assert!(pts.contains(&[4, 2]));
        assert!(pts.contains(&[8, 2]));
        Ok(())
    }

    #[test]
    fn test_segments_intersect() {
        assert!(segments_intersect([0, 0], [4, 4], [0, 4], [4, 0]));
        assert!(!segments_intersect([0, 0], [1, 0], [0, 1], [1, 1]));
        assert!(segments_intersect([0, 0], [4, 0], [2, 0], [2, 3]));
    }
}
