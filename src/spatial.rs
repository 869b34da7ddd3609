//! R-tree segment index for closest-segment queries on long routes.
//!
//! Produces exactly the same distances and indices as the exhaustive
//! `closest_projection`: leaf distances use the same point-to-segment
//! function, and among exactly equal distances the lowest index wins.

use geo::Coord;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geometry::Segment;
use crate::projection::squared_distance_to_segment;

/// A route segment with its position in the direction's polyline
#[derive(Debug, Clone, Copy)]
pub struct IndexedSegment {
    pub idx: usize,
    pub start: Coord<f64>,
    pub end: Coord<f64>,
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.start.x, self.start.y], [self.end.x, self.end.y])
    }
}

impl PointDistance for IndexedSegment {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        squared_distance_to_segment(Coord { x: point[0], y: point[1] }, self.start, self.end)
    }
}

/// Spatial index over the segments of one direction.
pub struct SegmentIndex {
    tree: RTree<IndexedSegment>,
}

impl SegmentIndex {
    /// Build the index from a direction's ordered segments.
    pub fn new(segments: &[Segment]) -> Self {
        let indexed: Vec<IndexedSegment> = segments
            .iter()
            .enumerate()
            .map(|(idx, s)| IndexedSegment {
                idx,
                start: s.start(),
                end: s.end(),
            })
            .collect();
        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    /// Minimum squared distance and closest segment index for one point.
    pub fn closest(&self, point: Coord<f64>) -> (f64, usize) {
        let query = [point.x, point.y];
        let mut best: Option<(f64, usize)> = None;

        for (segment, d) in self.tree.nearest_neighbor_iter_with_distance_2(&query) {
            match best {
                None => best = Some((d, segment.idx)),
                Some((best_d, best_idx)) => {
                    if d > best_d {
                        break;
                    }
                    if segment.idx < best_idx {
                        best = Some((best_d, segment.idx));
                    }
                }
            }
        }

        best.unwrap_or((f64::INFINITY, 0))
    }

    /// Indexed counterpart of `closest_projection`.
    pub fn closest_projection(&self, points: &[Coord<f64>]) -> (Vec<f64>, Vec<usize>) {
        points.iter().map(|p| self.closest(*p)).unzip()
    }
}
