//! 2D geometry operations on the XZ plane
//!
//! Most operations ignore the Y component (Y-up coordinate system). The sign
//! convention of [`tri_area_2d`] is shared by every winding test in the crate.

use glam::Vec3;

/// Calculate twice the signed area of a triangle on the XZ plane.
///
/// The sign indicates the winding order when looking down the Y axis:
/// - Positive: clockwise
/// - Negative: counter-clockwise
/// - Zero: degenerate (collinear points)
#[inline]
pub fn tri_area_2d(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let abx = b.x - a.x;
    let abz = b.z - a.z;
    let acx = c.x - a.x;
    let acz = c.z - a.z;
    acx * abz - abx * acz
}

/// Check if point c is left of the line from a to b (on XZ plane).
#[inline]
pub fn left(a: Vec3, b: Vec3, c: Vec3) -> bool {
    tri_area_2d(a, b, c) < 0.0
}

/// Check if point c is left of or on the line from a to b (on XZ plane).
#[inline]
pub fn left_on(a: Vec3, b: Vec3, c: Vec3) -> bool {
    tri_area_2d(a, b, c) <= 0.0
}

/// Squared distance between two points on the XZ plane.
#[inline]
pub fn dist_sqr_2d(a: Vec3, b: Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    dx * dx + dz * dz
}

/// Squared distance from point p to segment ab on the XZ plane.
pub fn dist_point_segment_sqr_2d(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    let len_sqr = dx * dx + dz * dz;
    let mut t = if len_sqr > 0.0 {
        ((p.x - a.x) * dx + (p.z - a.z) * dz) / len_sqr
    } else {
        0.0
    };
    t = t.clamp(0.0, 1.0);
    let qx = a.x + t * dx - p.x;
    let qz = a.z + t * dz - p.z;
    qx * qx + qz * qz
}

/// Tests whether p lies inside triangle abc on the XZ plane.
///
/// Points within `tolerance` of an edge count as inside. Works for either
/// winding.
pub fn point_in_triangle_2d(p: Vec3, a: Vec3, b: Vec3, c: Vec3, tolerance: f32) -> bool {
    let d1 = tri_area_2d(a, b, p);
    let d2 = tri_area_2d(b, c, p);
    let d3 = tri_area_2d(c, a, p);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    if !(has_neg && has_pos) {
        return true;
    }
    if tolerance <= 0.0 {
        return false;
    }
    let tol_sqr = tolerance * tolerance;
    dist_point_segment_sqr_2d(p, a, b) <= tol_sqr
        || dist_point_segment_sqr_2d(p, b, c) <= tol_sqr
        || dist_point_segment_sqr_2d(p, c, a) <= tol_sqr
}

/// Height of the plane through abc at the XZ position of p.
///
/// Returns `None` for triangles that are vertical when seen from above.
pub fn plane_height(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let normal = (b - a).cross(c - a);
    if normal.y.abs() <= f32::EPSILON {
        return None;
    }
    Some(a.y - (normal.x * (p.x - a.x) + normal.z * (p.z - a.z)) / normal.y)
}

/// Find the closest point on a triangle to a given point
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Check if two XZ rectangles overlap. Touching edges count as overlap.
#[inline]
pub fn overlap_rect_2d(amin: [f32; 2], amax: [f32; 2], bmin: [f32; 2], bmax: [f32; 2]) -> bool {
    !(amin[0] > bmax[0] || amax[0] < bmin[0] || amin[1] > bmax[1] || amax[1] < bmin[1])
}

/// Check if a point lies inside a convex or concave polygon on the XZ plane.
pub fn point_in_polygon_2d(p: Vec3, verts: &[Vec3]) -> bool {
    let mut inside = false;
    let n = verts.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi.z > p.z) != (vj.z > p.z))
            && (p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
