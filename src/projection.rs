//! Point-to-segment projection and the exhaustive closest-segment search.
//!
//! All computations are planar in lon/lat degree space. The search keeps
//! squared distances so the square root is taken once per point afterwards.

use geo::Coord;

use crate::geometry::Segment;

/// Clamped projection of a point onto a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Closest point on the segment
    pub point: Coord<f64>,
    /// Position along the segment, clamped to [0, 1]
    pub t: f64,
}

/// Project `p` onto segment `a`-`b`.
///
/// A scalar parameter below 0 snaps to `a`, above 1 snaps to `b`.
/// A zero-length segment projects every point onto `a` with `t = 0`.
pub fn project_point_on_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> Projection {
    let ap = p - a;
    let ab = b - a;
    let ab2 = ab.x * ab.x + ab.y * ab.y;

    if ab2 == 0.0 {
        return Projection { point: a, t: 0.0 };
    }

    let t = (ap.x * ab.x + ap.y * ab.y) / ab2;
    if t < 0.0 {
        Projection { point: a, t: 0.0 }
    } else if t > 1.0 {
        Projection { point: b, t: 1.0 }
    } else {
        Projection {
            point: Coord {
                x: a.x + t * ab.x,
                y: a.y + t * ab.y,
            },
            t,
        }
    }
}

/// Squared planar distance from `p` to segment `a`-`b`.
pub fn squared_distance_to_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let closest = project_point_on_segment(p, a, b).point;
    let d = p - closest;
    d.x * d.x + d.y * d.y
}

/// Along-route distance of the projection of `p` onto `segment`.
///
/// Interpolates the segment's endpoint distances at the clamped projection
/// parameter, so a point projecting onto an endpoint gets exactly that
/// endpoint's distance.
pub fn distance_along_segment(p: Coord<f64>, segment: &Segment) -> f64 {
    let proj = project_point_on_segment(p, segment.start(), segment.end());
    if proj.t == 0.0 {
        return segment.start_distance;
    }
    if proj.t == 1.0 {
        return segment.end_distance;
    }
    segment.start_distance + proj.t * (segment.end_distance - segment.start_distance)
}

/// Find the closest segment of every point by exhaustive search.
///
/// Returns the minimum squared distance and the index of the segment that
/// achieved it. The comparison is strict, so exact ties keep the lowest index.
/// With no segments every distance is infinite and every index 0.
pub fn closest_projection(points: &[Coord<f64>], segments: &[Segment]) -> (Vec<f64>, Vec<usize>) {
    let mut min_squared = vec![f64::INFINITY; points.len()];
    let mut closest = vec![0usize; points.len()];

    for (i, p) in points.iter().enumerate() {
        for (j, segment) in segments.iter().enumerate() {
            let d = squared_distance_to_segment(*p, segment.start(), segment.end());
            if d < min_squared[i] {
                min_squared[i] = d;
                closest[i] = j;
            }
        }
    }

    (min_squared, closest)
}
