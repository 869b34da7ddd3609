//! On-route classification.
//!
//! Every direction's segments are searched once for the whole trace. Degree
//! distances become meters at the trace's mean latitude; a point is on route
//! when its closest direction is strictly nearer than the tolerance.

use std::collections::BTreeMap;

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::geo_utils::{degrees_to_meters, mean_latitude};
use crate::geometry::{RouteGeometry, Segment};
use crate::projection::{closest_projection, distance_along_segment};
use crate::spatial::SegmentIndex;
use crate::{DirectionId, ProjectorKind, TracePoint};

/// Projection of a trace onto one direction's polyline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionProjection {
    /// Minimum squared distance in degrees²
    pub squared_distance: Vec<f64>,
    /// Index of the closest segment
    pub segment_index: Vec<usize>,
    /// Distance to the polyline in meters
    pub distance_to_route: Vec<f64>,
    /// Along-route distance of the projected point from the direction's start
    pub distance_from_start: Vec<f64>,
}

/// Result of classifying a trace against every direction of a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Latitude used for the degree to meter conversion
    pub mean_latitude: f64,
    pub per_direction: BTreeMap<DirectionId, DirectionProjection>,
    /// Minimum meters distance across directions
    pub in_route_distance: Vec<f64>,
    pub on_route: Vec<bool>,
}

impl Classification {
    /// Along-route distances keyed by direction, borrowed.
    pub fn distances_from_start(&self) -> BTreeMap<DirectionId, &[f64]> {
        self.per_direction
            .iter()
            .map(|(d, p)| (*d, p.distance_from_start.as_slice()))
            .collect()
    }

    pub fn on_route_count(&self) -> usize {
        self.on_route.iter().filter(|b| **b).count()
    }
}

/// Closest-segment search over a route, built once per geometry.
pub enum SegmentSearch {
    BruteForce,
    /// One R-tree per direction
    Indexed(BTreeMap<DirectionId, SegmentIndex>),
}

impl SegmentSearch {
    pub fn new(kind: ProjectorKind, geometry: &RouteGeometry) -> Self {
        match kind {
            ProjectorKind::BruteForce => SegmentSearch::BruteForce,
            ProjectorKind::RTree => SegmentSearch::Indexed(
                geometry
                    .directions()
                    .map(|(d, g)| (d, SegmentIndex::new(g.segments())))
                    .collect(),
            ),
        }
    }

    /// Minimum squared distance and closest segment index per point.
    pub fn closest_projection(
        &self,
        direction: DirectionId,
        coords: &[Coord<f64>],
        segments: &[Segment],
    ) -> (Vec<f64>, Vec<usize>) {
        match self {
            SegmentSearch::Indexed(indexes) => match indexes.get(&direction) {
                Some(index) => index.closest_projection(coords),
                None => closest_projection(coords, segments),
            },
            SegmentSearch::BruteForce => closest_projection(coords, segments),
        }
    }
}

/// Project a trace onto one direction.
pub fn project_direction(
    coords: &[Coord<f64>],
    geometry: &RouteGeometry,
    direction: DirectionId,
    latitude: f64,
    search: &SegmentSearch,
) -> DirectionProjection {
    let segments = geometry
        .direction(direction)
        .map(|g| g.segments())
        .unwrap_or(&[]);

    let (squared_distance, segment_index) = search.closest_projection(direction, coords, segments);

    let distance_to_route = squared_distance
        .iter()
        .map(|d2| degrees_to_meters(d2.sqrt(), latitude))
        .collect();

    let distance_from_start = coords
        .iter()
        .zip(&segment_index)
        .map(|(c, idx)| {
            segments
                .get(*idx)
                .map(|seg| distance_along_segment(*c, seg))
                .unwrap_or(0.0)
        })
        .collect();

    DirectionProjection {
        squared_distance,
        segment_index,
        distance_to_route,
        distance_from_start,
    }
}

/// Classify every point of a trace as on or off route.
pub fn classify(
    points: &[TracePoint],
    geometry: &RouteGeometry,
    tolerance_meters: f64,
    search: &SegmentSearch,
) -> Classification {
    let latitude = mean_latitude(points).unwrap_or(0.0);
    let coords: Vec<Coord<f64>> = points.iter().map(TracePoint::coord).collect();

    let per_direction: BTreeMap<DirectionId, DirectionProjection> = geometry
        .direction_ids()
        .map(|d| (d, project_direction(&coords, geometry, d, latitude, search)))
        .collect();

    let in_route_distance: Vec<f64> = (0..points.len())
        .map(|i| {
            per_direction
                .values()
                .map(|p| p.distance_to_route[i])
                .fold(f64::INFINITY, f64::min)
        })
        .collect();

    let on_route = in_route_distance
        .iter()
        .map(|d| *d < tolerance_meters)
        .collect();

    Classification {
        mean_latitude: latitude,
        per_direction,
        in_route_distance,
        on_route,
    }
}
