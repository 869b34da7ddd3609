//! Route geometry: per-direction segments with along-route distances and stops.
//!
//! A `RouteGeometry` is built once per route and never mutated. It is either
//! assembled directly from `DirectionGeometry` values or derived from static
//! trip records, in which case missing cumulative distances are filled in.

use std::collections::BTreeMap;

use geo::{Coord, Line};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, TraceError};
use crate::geo_utils::cumulative_lengths;
use crate::projection::{closest_projection, distance_along_segment};
use crate::DirectionId;

/// One straight piece of a route shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Shape vertices (x = longitude, y = latitude)
    pub line: Line<f64>,
    /// Distance from the route start at `line.start` (meters)
    pub start_distance: f64,
    /// Distance from the route start at `line.end` (meters)
    pub end_distance: f64,
}

impl Segment {
    pub fn new(start: Coord<f64>, end: Coord<f64>, start_distance: f64, end_distance: f64) -> Self {
        Self {
            line: Line::new(start, end),
            start_distance,
            end_distance,
        }
    }

    pub fn start(&self) -> Coord<f64> {
        self.line.start
    }

    pub fn end(&self) -> Coord<f64> {
        self.line.end
    }
}

/// Geometry of one travel direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionGeometry {
    segments: Vec<Segment>,
    stop_distances: Vec<f64>,
}

impl DirectionGeometry {
    /// Wrap already-ordered segments and stop distances.
    ///
    /// Nothing is validated here; `RouteGeometry::new` checks every direction.
    pub fn new(segments: Vec<Segment>, stop_distances: Vec<f64>) -> Self {
        Self {
            segments,
            stop_distances,
        }
    }

    /// Build segments from a polyline and the cumulative distance at each vertex.
    pub fn from_polyline(coords: &[Coord<f64>], distances: &[f64], stop_distances: Vec<f64>) -> Self {
        let segments = coords
            .windows(2)
            .zip(distances.windows(2))
            .map(|(c, d)| Segment::new(c[0], c[1], d[0], d[1]))
            .collect();
        Self::new(segments, stop_distances)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn stop_distances(&self) -> &[f64] {
        &self.stop_distances
    }

    /// Along-route length of this direction.
    pub fn length(&self) -> f64 {
        self.segments.last().map(|s| s.end_distance).unwrap_or(0.0)
    }

    fn validate(&self, route_id: &str, direction: DirectionId) -> Result<()> {
        let invalid = |message: String| TraceError::InvalidGeometry {
            route_id: route_id.to_string(),
            message: format!("direction {}: {}", direction, message),
        };

        if self.segments.is_empty() {
            return Err(invalid("no segments".to_string()));
        }
        if self.stop_distances.is_empty() {
            return Err(invalid("no stops".to_string()));
        }

        for (i, seg) in self.segments.iter().enumerate() {
            if !seg.start_distance.is_finite() || !seg.end_distance.is_finite() {
                return Err(invalid(format!("segment {} has a non-finite distance", i)));
            }
            if seg.end_distance < seg.start_distance {
                return Err(invalid(format!("segment {} runs backwards", i)));
            }
        }
        for (i, pair) in self.segments.windows(2).enumerate() {
            if pair[1].start_distance < pair[0].end_distance {
                return Err(invalid(format!(
                    "segment {} starts before segment {} ends",
                    i + 1,
                    i
                )));
            }
        }

        for (i, pair) in self.stop_distances.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(invalid(format!(
                    "stop distances not strictly increasing at stop {}",
                    i + 1
                )));
            }
        }

        Ok(())
    }
}

/// Immutable geometry of a route, keyed by direction id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    route_id: String,
    directions: BTreeMap<DirectionId, DirectionGeometry>,
}

impl RouteGeometry {
    /// Validate and wrap per-direction geometry.
    ///
    /// Fails with `InvalidGeometry` when the route has no directions or any
    /// direction has no segments, no stops, or unordered distances.
    pub fn new(
        route_id: impl Into<String>,
        directions: BTreeMap<DirectionId, DirectionGeometry>,
    ) -> Result<Self> {
        let route_id = route_id.into();
        if directions.is_empty() {
            return Err(TraceError::InvalidGeometry {
                route_id,
                message: "no directions".to_string(),
            });
        }
        for (direction, geometry) in &directions {
            geometry.validate(&route_id, *direction)?;
        }
        Ok(Self {
            route_id,
            directions,
        })
    }

    /// Derive route geometry from static trip records.
    ///
    /// The first trip seen for each direction supplies that direction's shape
    /// and stops. Missing shape distances are accumulated along the shape;
    /// missing stop distances come from projecting the stop onto the shape.
    pub fn from_trips(route_id: impl Into<String>, trips: &[TripRecord]) -> Result<Self> {
        let route_id = route_id.into();
        let mut directions = BTreeMap::new();

        for trip in trips {
            if directions.contains_key(&trip.direction_id) {
                continue;
            }
            debug!(
                "[Geometry] Route {} direction {} from trip {} ({} shape points, {} stops)",
                route_id,
                trip.direction_id,
                trip.trip_id,
                trip.shape.len(),
                trip.stops.len()
            );
            directions.insert(trip.direction_id, direction_from_trip(&route_id, trip)?);
        }

        Self::new(route_id, directions)
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    /// Direction ids in ascending order.
    pub fn direction_ids(&self) -> impl Iterator<Item = DirectionId> + '_ {
        self.directions.keys().copied()
    }

    pub fn direction(&self, direction: DirectionId) -> Option<&DirectionGeometry> {
        self.directions.get(&direction)
    }

    pub fn directions(&self) -> impl Iterator<Item = (DirectionId, &DirectionGeometry)> {
        self.directions.iter().map(|(d, g)| (*d, g))
    }

    pub fn direction_count(&self) -> usize {
        self.directions.len()
    }

    /// Stop distances of a direction, empty for an unknown direction.
    pub fn stop_distances(&self, direction: DirectionId) -> &[f64] {
        self.directions
            .get(&direction)
            .map(|g| g.stop_distances())
            .unwrap_or(&[])
    }
}

// ============================================================================
// Static trip records
// ============================================================================

/// A vertex of a trip's shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapePoint {
    pub longitude: f64,
    pub latitude: f64,
    /// Cumulative distance along the shape in meters, if the feed provides it
    pub distance: Option<f64>,
}

impl ShapePoint {
    pub fn new(longitude: f64, latitude: f64, distance: Option<f64>) -> Self {
        Self {
            longitude,
            latitude,
            distance,
        }
    }

    fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }
}

/// A stop served by a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopPoint {
    pub stop_id: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Distance along the trip's shape in meters, if the feed provides it
    pub distance: Option<f64>,
}

/// One trip of a route as read from the static schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub trip_id: String,
    pub direction_id: DirectionId,
    /// Shape vertices in sequence order
    pub shape: Vec<ShapePoint>,
    /// Stops in stop-sequence order
    pub stops: Vec<StopPoint>,
}

fn direction_from_trip(route_id: &str, trip: &TripRecord) -> Result<DirectionGeometry> {
    trip.shape
        .get(1)
        .ok_or_invalid_geometry(route_id, &format!("trip {} has fewer than 2 shape points", trip.trip_id))?;

    let coords: Vec<Coord<f64>> = trip.shape.iter().map(ShapePoint::coord).collect();

    let distances: Vec<f64> = if trip.shape.iter().all(|p| p.distance.is_some()) {
        trip.shape.iter().filter_map(|p| p.distance).collect()
    } else {
        cumulative_lengths(&coords)
    };

    let segments: Vec<Segment> = coords
        .windows(2)
        .zip(distances.windows(2))
        .map(|(c, d)| Segment::new(c[0], c[1], d[0], d[1]))
        .collect();

    let mut stop_distances: Vec<f64> = trip
        .stops
        .iter()
        .map(|stop| match stop.distance {
            Some(d) => d,
            None => project_stop(stop, &segments),
        })
        .filter(|d| d.is_finite())
        .collect();
    stop_distances.sort_by(|a, b| a.total_cmp(b));
    stop_distances.dedup();

    Ok(DirectionGeometry::new(segments, stop_distances))
}

fn project_stop(stop: &StopPoint, segments: &[Segment]) -> f64 {
    let coord = Coord {
        x: stop.longitude,
        y: stop.latitude,
    };
    let (_, closest) = closest_projection(&[coord], segments);
    segments
        .get(closest[0])
        .map(|seg| distance_along_segment(coord, seg))
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn straight_direction(stops: Vec<f64>) -> DirectionGeometry {
        DirectionGeometry::from_polyline(
            &[c(0.0, 0.0), c(10.0, 0.0), c(20.0, 0.0)],
            &[0.0, 10.0, 20.0],
            stops,
        )
    }

    #[test]
    fn test_from_polyline_builds_segments() {
        let dir = straight_direction(vec![0.0, 20.0]);
        assert_eq!(dir.segments().len(), 2);
        assert_eq!(dir.segments()[1].start_distance, 10.0);
        assert_eq!(dir.length(), 20.0);
    }

    #[test]
    fn test_route_geometry_rejects_empty_direction() {
        let mut dirs = BTreeMap::new();
        dirs.insert(0, straight_direction(vec![0.0, 20.0]));
        dirs.insert(1, DirectionGeometry::new(vec![], vec![0.0]));
        let err = RouteGeometry::new("r", dirs).unwrap_err();
        assert!(matches!(err, TraceError::InvalidGeometry { .. }));
        assert!(err.to_string().contains("direction 1"));
    }

    #[test]
    fn test_route_geometry_rejects_missing_stops() {
        let mut dirs = BTreeMap::new();
        dirs.insert(0, straight_direction(vec![]));
        assert!(RouteGeometry::new("r", dirs).is_err());
    }

    #[test]
    fn test_route_geometry_rejects_unsorted_stops() {
        let mut dirs = BTreeMap::new();
        dirs.insert(0, straight_direction(vec![0.0, 15.0, 15.0]));
        assert!(RouteGeometry::new("r", dirs).is_err());
    }

    #[test]
    fn test_route_geometry_rejects_no_directions() {
        assert!(RouteGeometry::new("r", BTreeMap::new()).is_err());
    }

    #[test]
    fn test_from_trips_uses_feed_distances() {
        let trip = TripRecord {
            trip_id: "t0".to_string(),
            direction_id: 0,
            shape: vec![
                ShapePoint::new(0.0, 0.0, Some(0.0)),
                ShapePoint::new(0.001, 0.0, Some(111.0)),
                ShapePoint::new(0.002, 0.0, Some(222.0)),
            ],
            stops: vec![
                StopPoint {
                    stop_id: "b".to_string(),
                    longitude: 0.002,
                    latitude: 0.0,
                    distance: Some(222.0),
                },
                StopPoint {
                    stop_id: "a".to_string(),
                    longitude: 0.0,
                    latitude: 0.0,
                    distance: Some(0.0),
                },
            ],
        };
        let geometry = RouteGeometry::from_trips("r", &[trip]).unwrap();
        assert_eq!(geometry.stop_distances(0), &[0.0, 222.0]);
        assert_eq!(geometry.direction(0).unwrap().length(), 222.0);
    }

    #[test]
    fn test_from_trips_derives_missing_distances() {
        let trip = TripRecord {
            trip_id: "t1".to_string(),
            direction_id: 1,
            shape: vec![
                ShapePoint::new(0.0, 0.0, None),
                ShapePoint::new(0.01, 0.0, None),
            ],
            stops: vec![
                StopPoint {
                    stop_id: "a".to_string(),
                    longitude: 0.0,
                    latitude: 0.0001,
                    distance: None,
                },
                StopPoint {
                    stop_id: "m".to_string(),
                    longitude: 0.005,
                    latitude: -0.0001,
                    distance: None,
                },
            ],
        };
        let geometry = RouteGeometry::from_trips("r", &[trip]).unwrap();
        let dir = geometry.direction(1).unwrap();
        // 0.01° of longitude at the equator is ~1112 m
        assert!((dir.length() - 1112.0).abs() < 5.0);
        let stops = dir.stop_distances();
        assert_eq!(stops[0], 0.0);
        assert!((stops[1] - dir.length() / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_trips_first_trip_per_direction_wins() {
        let make = |id: &str, end: f64| TripRecord {
            trip_id: id.to_string(),
            direction_id: 0,
            shape: vec![
                ShapePoint::new(0.0, 0.0, Some(0.0)),
                ShapePoint::new(end, 0.0, Some(end * 1000.0)),
            ],
            stops: vec![StopPoint {
                stop_id: "s".to_string(),
                longitude: 0.0,
                latitude: 0.0,
                distance: Some(0.0),
            }],
        };
        let geometry = RouteGeometry::from_trips("r", &[make("a", 1.0), make("b", 2.0)]).unwrap();
        assert_eq!(geometry.direction_count(), 1);
        assert_eq!(geometry.direction(0).unwrap().length(), 1000.0);
    }

    #[test]
    fn test_from_trips_short_shape_is_invalid() {
        let trip = TripRecord {
            trip_id: "t".to_string(),
            direction_id: 0,
            shape: vec![ShapePoint::new(0.0, 0.0, Some(0.0))],
            stops: vec![],
        };
        assert!(RouteGeometry::from_trips("r", &[trip]).is_err());
    }
}
