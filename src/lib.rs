//! # Route Trace
//!
//! Map-matching and feature reconstruction for transit vehicle GPS traces.
//!
//! For each vehicle-day trace this library works out, against a known route
//! geometry:
//! - the closest route segment of every ping and whether it is on route
//! - the direction of travel, with hysteresis and backward propagation
//! - cumulative distance and time across direction changes and midnight
//! - the stops bracketing every ping and trailing-window mean speeds
//! - virtual points marking the interpolated moment each stop was passed
//!
//! ## Features
//!
//! - **`parallel`** - Process many traces concurrently with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use geo::Coord;
//! use route_trace::{DirectionGeometry, RouteGeometry, Trace, TraceConfig, TraceEngine, TracePoint};
//!
//! let mut directions = BTreeMap::new();
//! directions.insert(
//!     0,
//!     DirectionGeometry::from_polyline(
//!         &[Coord { x: -43.20, y: -22.90 }, Coord { x: -43.19, y: -22.90 }],
//!         &[0.0, 1025.0],
//!         vec![0.0, 500.0, 1025.0],
//!     ),
//! );
//! let geometry = RouteGeometry::new("232", directions).unwrap();
//! let engine = TraceEngine::new(geometry, TraceConfig::default()).unwrap();
//!
//! let points = (0..20)
//!     .map(|i| TracePoint::new(1_700_000_000 + i * 30, -43.20 + i as f64 * 0.0005, -22.90))
//!     .collect();
//! let trace = Trace::new("bus-1", "232", points);
//!
//! let features = engine.process(&trace);
//! assert_eq!(features.points.len(), 20);
//! println!("{} stop crossings", features.crossings.len());
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use geo::Coord;
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TraceError};

// Geographic utilities (degree/meter conversion, haversine, day keys)
pub mod geo_utils;

// Route geometry per direction, built once per route
pub mod geometry;
pub use geometry::{DirectionGeometry, RouteGeometry, Segment, ShapePoint, StopPoint, TripRecord};

// Point-to-segment projection and exhaustive closest-segment search
pub mod projection;
pub use projection::{closest_projection, squared_distance_to_segment};

// R-tree segment index with the same results as the exhaustive search
pub mod spatial;
pub use spatial::SegmentIndex;

// On-route classification
pub mod classify;
pub use classify::{classify, Classification, DirectionProjection, SegmentSearch};

// Direction state machine
pub mod direction;
pub use direction::{resolve_directions, DirectionSeries, DirectionSource, ResolverParams};

// Distance/time accumulation
pub mod accumulate;
pub use accumulate::{accumulate, Accumulation};

// Stop bracketing
pub mod stops;
pub use stops::{bracket, bracket_trace, StopBracket};

// Trailing-window mean speed
pub mod speed;
pub use speed::{mean_speed, mean_speeds, MeanSpeeds, SPEED_WINDOWS_MINUTES};

// Virtual stop crossings
pub mod crossings;
pub use crossings::{interpolate_crossings, CrossingOutcome, VirtualCrossing};

// Per-trace pipeline
pub mod engine;
pub use engine::{MatchStats, TraceEngine, TraceFeatures};

// Many traces: assembly from raw records, filtering, isolation of failures
pub mod batch;
pub use batch::{
    assemble_traces, filter_trace, process_route, process_traces, BatchConfig, BatchResult,
    PositionRecord, TraceFailure,
};
#[cfg(feature = "parallel")]
pub use batch::process_traces_parallel;

// Tabular rows handed to the persistence layer
pub mod output;
pub use output::{crossing_rows, enriched_rows, to_json_lines, CrossingRow, EnrichedRow};

// ============================================================================
// Core Types
// ============================================================================

/// Direction of travel along a route (typically 0 = outbound, 1 = inbound).
pub type DirectionId = u8;

/// A GPS ping: unix timestamp in seconds plus lon/lat degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub timestamp: i64,
    pub longitude: f64,
    pub latitude: f64,
}

impl TracePoint {
    pub fn new(timestamp: i64, longitude: f64, latitude: f64) -> Self {
        Self {
            timestamp,
            longitude,
            latitude,
        }
    }

    /// Planar coordinate (x = longitude, y = latitude).
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One vehicle's pings on one service day, sorted by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub vehicle_id: String,
    pub service_id: String,
    pub points: Vec<TracePoint>,
}

impl Trace {
    pub fn new(
        vehicle_id: impl Into<String>,
        service_id: impl Into<String>,
        points: Vec<TracePoint>,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            service_id: service_id.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// UTC calendar date of the first ping.
    pub fn service_date(&self) -> Option<NaiveDate> {
        let first = self.points.first()?;
        DateTime::from_timestamp(first.timestamp, 0).map(|dt| dt.date_naive())
    }

    /// Identifier used in logs and failure reports: `vehicle@service/date`.
    pub fn trace_id(&self) -> String {
        match self.service_date() {
            Some(date) => format!("{}@{}/{}", self.vehicle_id, self.service_id, date),
            None => format!("{}@{}", self.vehicle_id, self.service_id),
        }
    }
}

/// Closest-segment search strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectorKind {
    /// Compare every point with every segment
    #[default]
    BruteForce,
    /// R-tree over segment envelopes, identical results
    RTree,
}

/// Configuration of the per-trace pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Maximum distance from the route for a ping to count as on route.
    /// Default: 100.0 meters
    pub on_route_tolerance: f64,

    /// Distance from every direction's start beyond which the current
    /// direction is locked in.
    /// Default: 500.0 meters
    pub terminal_tolerance: f64,

    /// Minimum trend difference between directions to infer one.
    /// Default: 100.0 meters
    pub direction_tolerance: f64,

    /// Trailing window size of the direction inference, in points.
    /// Default: 3
    pub lookback: u32,

    /// Closest-segment search strategy.
    /// Default: brute force
    pub projector: ProjectorKind,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            on_route_tolerance: 100.0,
            terminal_tolerance: 500.0,
            direction_tolerance: 100.0,
            lookback: 3,
            projector: ProjectorKind::BruteForce,
        }
    }
}

impl TraceConfig {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let tolerances = [
            ("on_route_tolerance", self.on_route_tolerance),
            ("terminal_tolerance", self.terminal_tolerance),
            ("direction_tolerance", self.direction_tolerance),
        ];
        for (name, value) in tolerances {
            if !value.is_finite() || value <= 0.0 {
                return Err(TraceError::InvalidConfig {
                    message: format!("{} must be a positive number, got {}", name, value),
                });
            }
        }
        if self.lookback == 0 {
            return Err(TraceError::InvalidConfig {
                message: "lookback must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn resolver_params(&self) -> ResolverParams {
        ResolverParams {
            lookback: self.lookback as usize,
            terminal_tolerance: self.terminal_tolerance,
            direction_tolerance: self.direction_tolerance,
        }
    }
}

/// Projection of a single ping onto one direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointProjection {
    /// Squared distance to the closest segment in degrees²
    pub squared_distance: f64,
    pub segment_index: usize,
    /// Distance to the closest segment in meters
    pub distance_to_route: f64,
    /// Along-route distance from the direction's start in meters
    pub distance_from_start: f64,
}

/// A ping with every reconstructed feature attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPoint {
    pub point: TracePoint,
    pub projections: BTreeMap<DirectionId, PointProjection>,
    /// Minimum distance to the route across directions (meters)
    pub in_route_distance: f64,
    pub on_route: bool,
    /// Resolved direction, `None` while unknown
    pub direction: Option<DirectionId>,
    pub direction_source: Option<DirectionSource>,
    pub distance_traveled: f64,
    pub cumulative_distance: f64,
    /// Seconds since the previous ping
    pub time_delta: i64,
    /// Seconds since the last direction change
    pub cumulative_time: i64,
    pub stops: Option<StopBracket>,
    pub speeds: MeanSpeeds,
}

impl EnrichedPoint {
    /// A ping with no route features (off route, direction unknown).
    pub fn unmatched(point: TracePoint) -> Self {
        Self {
            point,
            projections: BTreeMap::new(),
            in_route_distance: f64::INFINITY,
            on_route: false,
            direction: None,
            direction_source: None,
            distance_traveled: 0.0,
            cumulative_distance: 0.0,
            time_delta: 0,
            cumulative_time: 0,
            stops: None,
            speeds: MeanSpeeds::default(),
        }
    }

    /// Whether the direction came from the forward pass rather than backfill.
    pub fn direction_is_direct(&self) -> bool {
        matches!(
            self.direction_source,
            Some(DirectionSource::Inferred) | Some(DirectionSource::Locked)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
