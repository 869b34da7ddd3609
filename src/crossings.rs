//! Virtual stop crossings.
//!
//! Between two consecutive on-route points travelling the same direction,
//! every stop whose distance lies in `[d0, d1)` was passed. Each crossing is
//! placed by linear interpolation in time using the stop distance as key.
//! Crossings that fall outside their bracketing points are dropped without
//! aborting the trace.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::geometry::RouteGeometry;
use crate::speed::MeanSpeeds;
use crate::{DirectionId, EnrichedPoint};

/// Synthetic point marking the moment a stop was passed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VirtualCrossing {
    /// Interpolated unix time in seconds
    pub timestamp: f64,
    /// Equal to the stop's along-route distance
    pub distance_traveled: f64,
    pub cumulative_distance: f64,
    pub direction: DirectionId,
    pub stop_index: usize,
    /// Distance from this stop to the following one (0 at the terminal)
    pub distance_to_next_stop: f64,
    /// Copied from the later bracketing point
    pub speeds: MeanSpeeds,
}

/// Crossings of one trace plus the ones that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossingOutcome {
    pub crossings: Vec<VirtualCrossing>,
    pub rejected: Vec<TraceError>,
}

/// Interpolate the crossing of `stop_index` between `p0` and `p1`.
///
/// Requires `d0 <= stop <= d1` and `t0 <= timestamp <= t1`, so the pair must
/// be given in travel order.
pub fn interpolate_crossing(
    p0: &EnrichedPoint,
    p1: &EnrichedPoint,
    direction: DirectionId,
    stop_index: usize,
    stop_distances: &[f64],
) -> Result<VirtualCrossing> {
    let stop_distance = *stop_distances
        .get(stop_index)
        .ok_or_else(|| TraceError::StopIndexOutOfBounds {
            direction,
            stop_index,
            stop_count: stop_distances.len(),
        })?;

    let (d0, d1) = (p0.distance_traveled, p1.distance_traveled);
    let (t0, t1) = (p0.point.timestamp, p1.point.timestamp);

    let t = (stop_distance - d0) / (d1 - d0);
    let timestamp = t0 as f64 + t * (t1 - t0) as f64;

    let in_range = d0 <= stop_distance
        && stop_distance <= d1
        && t0 as f64 <= timestamp
        && timestamp <= t1 as f64;
    if !in_range {
        return Err(TraceError::InterpolationOutOfRange {
            stop_index,
            distance: stop_distance,
            d0,
            d1,
            timestamp,
            t0,
            t1,
        });
    }

    let cumulative_distance =
        p0.cumulative_distance + t * (p1.cumulative_distance - p0.cumulative_distance);
    let distance_to_next_stop = stop_distances
        .get(stop_index + 1)
        .map(|next| next - stop_distance)
        .unwrap_or(0.0);

    Ok(VirtualCrossing {
        timestamp,
        distance_traveled: stop_distance,
        cumulative_distance,
        direction,
        stop_index,
        distance_to_next_stop,
        speeds: p1.speeds,
    })
}

/// Emit a virtual crossing for every stop passed along an enriched trace.
pub fn interpolate_crossings(points: &[EnrichedPoint], geometry: &RouteGeometry) -> CrossingOutcome {
    let mut outcome = CrossingOutcome::default();

    for pair in points.windows(2) {
        let (p0, p1) = (&pair[0], &pair[1]);
        if !(p0.on_route && p1.on_route) {
            continue;
        }
        let direction = match (p0.direction, p1.direction) {
            (Some(a), Some(b)) if a == b => a,
            _ => continue,
        };

        let stops = geometry.stop_distances(direction);
        let from = stops.partition_point(|s| *s < p0.distance_traveled);
        let to = stops.partition_point(|s| *s < p1.distance_traveled);
        if from == to {
            continue;
        }

        for stop_index in from.min(to)..from.max(to) {
            match interpolate_crossing(p0, p1, direction, stop_index, stops) {
                Ok(crossing) => outcome.crossings.push(crossing),
                Err(e) => {
                    debug!("[Crossings] Dropped crossing at t={}: {}", p1.point.timestamp, e);
                    outcome.rejected.push(e);
                }
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::DirectionGeometry;
    use crate::TracePoint;
    use geo::Coord;
    use std::collections::BTreeMap;

    fn geometry(stops: Vec<f64>) -> RouteGeometry {
        let mut dirs = BTreeMap::new();
        dirs.insert(
            0,
            DirectionGeometry::from_polyline(
                &[Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }],
                &[0.0, 1000.0],
                stops,
            ),
        );
        RouteGeometry::new("r", dirs).unwrap()
    }

    fn point(ts: i64, distance: f64, direction: Option<DirectionId>) -> EnrichedPoint {
        let mut p = EnrichedPoint::unmatched(TracePoint::new(ts, 0.0, 0.0));
        p.on_route = true;
        p.direction = direction;
        p.distance_traveled = distance;
        p.cumulative_distance = distance + 1000.0;
        p.speeds = MeanSpeeds {
            speed_1min: ts as f64,
            speed_3min: 2.0,
            speed_5min: 3.0,
        };
        p
    }

    #[test]
    fn test_single_crossing_between_points() {
        let geometry = geometry(vec![0.0, 50.0, 100.0]);
        let points = vec![point(100, 40.0, Some(0)), point(130, 55.0, Some(0))];
        let outcome = interpolate_crossings(&points, &geometry);

        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.crossings.len(), 1);
        let c = outcome.crossings[0];
        assert_eq!(c.stop_index, 1);
        assert_eq!(c.distance_traveled, 50.0);
        assert!(c.timestamp > 100.0 && c.timestamp < 130.0);
        assert!((c.timestamp - 120.0).abs() < 1e-9);
        assert!((c.cumulative_distance - 1050.0).abs() < 1e-9);
        assert_eq!(c.distance_to_next_stop, 50.0);
        assert_eq!(c.speeds, points[1].speeds);
    }

    #[test]
    fn test_multiple_crossings_in_one_interval() {
        let geometry = geometry(vec![0.0, 50.0, 100.0, 150.0]);
        let points = vec![point(0, 10.0, Some(0)), point(140, 150.0, Some(0))];
        let outcome = interpolate_crossings(&points, &geometry);

        let stops: Vec<usize> = outcome.crossings.iter().map(|c| c.stop_index).collect();
        assert_eq!(stops, vec![1, 2]);
        for c in &outcome.crossings {
            assert!(c.distance_traveled >= 10.0 && c.distance_traveled <= 150.0);
        }
    }

    #[test]
    fn test_terminal_stop_is_crossed() {
        let geometry = geometry(vec![0.0, 50.0, 100.0]);
        let points = vec![point(0, 90.0, Some(0)), point(10, 110.0, Some(0))];
        let outcome = interpolate_crossings(&points, &geometry);
        assert_eq!(outcome.crossings.len(), 1);
        assert_eq!(outcome.crossings[0].stop_index, 2);
        assert_eq!(outcome.crossings[0].distance_to_next_stop, 0.0);
    }

    #[test]
    fn test_swapped_pair_fails_validation() {
        let stops = [0.0, 50.0, 100.0];
        let p0 = point(100, 40.0, Some(0));
        let p1 = point(130, 55.0, Some(0));
        assert!(interpolate_crossing(&p0, &p1, 0, 1, &stops).is_ok());
        let err = interpolate_crossing(&p1, &p0, 0, 1, &stops).unwrap_err();
        assert!(matches!(err, TraceError::InterpolationOutOfRange { .. }));
    }

    #[test]
    fn test_backward_movement_is_dropped_not_fatal() {
        let geometry = geometry(vec![0.0, 50.0, 100.0]);
        let points = vec![
            point(0, 55.0, Some(0)),
            point(10, 45.0, Some(0)),
            point(20, 105.0, Some(0)),
        ];
        let outcome = interpolate_crossings(&points, &geometry);
        assert_eq!(outcome.rejected.len(), 1);
        let stops: Vec<usize> = outcome.crossings.iter().map(|c| c.stop_index).collect();
        assert_eq!(stops, vec![1, 2]);
    }

    #[test]
    fn test_stop_index_out_of_bounds() {
        let p0 = point(0, 0.0, Some(0));
        let p1 = point(10, 10.0, Some(0));
        let err = interpolate_crossing(&p0, &p1, 0, 5, &[0.0, 5.0]).unwrap_err();
        assert!(matches!(err, TraceError::StopIndexOutOfBounds { stop_index: 5, .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_direction_change_or_off_route_skips_pair() {
        let geometry = geometry(vec![0.0, 50.0, 100.0]);
        let mut off = point(10, 60.0, Some(0));
        off.on_route = false;
        let points = vec![
            point(0, 40.0, Some(0)),
            off,
            point(20, 80.0, None),
        ];
        let outcome = interpolate_crossings(&points, &geometry);
        assert!(outcome.crossings.is_empty());
        assert!(outcome.rejected.is_empty());
    }
}
