//! # Batch Processing
//!
//! Turns raw position records into vehicle-day traces and runs many traces
//! through one route's engine. A failing trace is reported with its context
//! and never stops the rest of the batch; a route whose geometry cannot be
//! built fails every trace assigned to it.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::engine::{TraceEngine, TraceFeatures};
use crate::error::{Result, TraceError};
use crate::geo_utils::day_index;
use crate::geometry::{RouteGeometry, TripRecord};
use crate::{Trace, TraceConfig, TracePoint};

// ============================================================================
// Core Types
// ============================================================================

/// A raw position report as delivered by the vehicle feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub vehicle_id: String,
    pub service_id: String,
    pub timestamp: i64,
    pub longitude: f64,
    pub latitude: f64,
}

/// Batch configuration: pipeline settings plus trace size bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub trace: TraceConfig,

    /// Traces with fewer points are skipped.
    /// Default: 300 (about 2.5 hours of pings at 30 s)
    pub min_points: usize,

    /// Traces with more points are skipped.
    /// Default: 2880 (one day of pings at 30 s)
    pub max_points: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            trace: TraceConfig::default(),
            min_points: 300,
            max_points: 2880,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        self.trace.validate()?;
        if self.min_points > self.max_points {
            return Err(TraceError::InvalidConfig {
                message: format!(
                    "min_points ({}) exceeds max_points ({})",
                    self.min_points, self.max_points
                ),
            });
        }
        Ok(())
    }
}

/// A trace that produced no features, with enough context to find it again.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFailure {
    pub trace_id: String,
    pub vehicle_id: String,
    pub service_id: String,
    pub error: TraceError,
}

impl TraceFailure {
    fn new(trace: &Trace, error: TraceError) -> Self {
        Self {
            trace_id: trace.trace_id(),
            vehicle_id: trace.vehicle_id.clone(),
            service_id: trace.service_id.clone(),
            error,
        }
    }
}

/// Outcome of a batch: processed traces and the ones that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub processed: Vec<TraceFeatures>,
    pub failures: Vec<TraceFailure>,
}

impl BatchResult {
    fn from_outcomes(outcomes: Vec<std::result::Result<TraceFeatures, TraceFailure>>) -> Self {
        let mut result = BatchResult::default();
        for outcome in outcomes {
            match outcome {
                Ok(features) => result.processed.push(features),
                Err(failure) => {
                    warn!("[Batch] Skipping {}: {}", failure.trace_id, failure.error);
                    result.failures.push(failure);
                }
            }
        }
        result
    }

    pub fn crossing_count(&self) -> usize {
        self.processed.iter().map(|f| f.crossings.len()).sum()
    }
}

// ============================================================================
// Trace Assembly
// ============================================================================

/// Group position records into traces keyed by (vehicle, service, UTC day).
///
/// Points within a trace are sorted by timestamp and duplicate timestamps
/// keep their first record. Records with invalid coordinates are dropped.
pub fn assemble_traces(records: &[PositionRecord]) -> Vec<Trace> {
    let mut groups: BTreeMap<(&str, &str, i64), Vec<TracePoint>> = BTreeMap::new();
    let mut invalid = 0usize;

    for record in records {
        let point = TracePoint::new(record.timestamp, record.longitude, record.latitude);
        if !point.is_valid() {
            invalid += 1;
            continue;
        }
        groups
            .entry((
                record.vehicle_id.as_str(),
                record.service_id.as_str(),
                day_index(record.timestamp),
            ))
            .or_default()
            .push(point);
    }

    if invalid > 0 {
        warn!("[Batch] Dropped {} records with invalid coordinates", invalid);
    }

    groups
        .into_iter()
        .map(|((vehicle_id, service_id, _), mut points)| {
            // Stable sort keeps the first record of a duplicated timestamp
            points.sort_by_key(|p| p.timestamp);
            points.dedup_by_key(|p| p.timestamp);
            Trace::new(vehicle_id, service_id, points)
        })
        .collect()
}

/// Check a trace's size against the batch bounds.
pub fn filter_trace(trace: &Trace, config: &BatchConfig) -> Result<()> {
    let point_count = trace.len();
    if point_count == 0 {
        return Err(TraceError::EmptyTrace {
            trace_id: trace.trace_id(),
        });
    }
    if point_count < config.min_points {
        return Err(TraceError::InsufficientPoints {
            trace_id: trace.trace_id(),
            point_count,
            minimum_required: config.min_points,
        });
    }
    if point_count > config.max_points {
        return Err(TraceError::TooManyPoints {
            trace_id: trace.trace_id(),
            point_count,
            maximum_allowed: config.max_points,
        });
    }
    Ok(())
}

fn process_one(
    engine: &TraceEngine,
    trace: &Trace,
    config: &BatchConfig,
) -> std::result::Result<TraceFeatures, TraceFailure> {
    filter_trace(trace, config).map_err(|e| TraceFailure::new(trace, e))?;
    Ok(engine.process(trace))
}

// ============================================================================
// Batch Runners
// ============================================================================

/// Process traces one after another.
pub fn process_traces(engine: &TraceEngine, traces: &[Trace], config: &BatchConfig) -> BatchResult {
    let outcomes = traces
        .iter()
        .map(|trace| process_one(engine, trace, config))
        .collect();
    BatchResult::from_outcomes(outcomes)
}

/// Process traces using parallel processing.
///
/// Same results and ordering as `process_traces`.
#[cfg(feature = "parallel")]
pub fn process_traces_parallel(
    engine: &TraceEngine,
    traces: &[Trace],
    config: &BatchConfig,
) -> BatchResult {
    use rayon::prelude::*;

    let outcomes = traces
        .par_iter()
        .map(|trace| process_one(engine, trace, config))
        .collect();
    BatchResult::from_outcomes(outcomes)
}

/// Build a route's geometry and process every trace assigned to it.
///
/// A geometry or configuration error is reported against each trace.
pub fn process_route(
    route_id: &str,
    trips: &[TripRecord],
    traces: &[Trace],
    config: &BatchConfig,
) -> BatchResult {
    let engine = config
        .validate()
        .and_then(|_| RouteGeometry::from_trips(route_id, trips))
        .and_then(|geometry| TraceEngine::new(geometry, config.trace.clone()));

    let engine = match engine {
        Ok(engine) => engine,
        Err(e) => {
            warn!("[Batch] Route {} unusable, failing {} traces: {}", route_id, traces.len(), e);
            return BatchResult {
                processed: Vec::new(),
                failures: traces
                    .iter()
                    .map(|trace| TraceFailure::new(trace, e.clone()))
                    .collect(),
            };
        }
    };

    #[cfg(feature = "parallel")]
    let result = process_traces_parallel(&engine, traces, config);

    #[cfg(not(feature = "parallel"))]
    let result = process_traces(&engine, traces, config);

    info!(
        "[Batch] Route {}: {} traces processed, {} skipped, {} crossings",
        route_id,
        result.processed.len(),
        result.failures.len(),
        result.crossing_count()
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vehicle: &str, ts: i64) -> PositionRecord {
        PositionRecord {
            vehicle_id: vehicle.to_string(),
            service_id: "232".to_string(),
            timestamp: ts,
            longitude: -43.2,
            latitude: -22.9,
        }
    }

    #[test]
    fn test_assemble_groups_by_vehicle_and_day() {
        let day = 86_400 * 19_000;
        let records = vec![
            record("a", day + 60),
            record("b", day + 30),
            record("a", day + 30),
            record("a", day + 86_400 + 5),
        ];
        let traces = assemble_traces(&records);
        assert_eq!(traces.len(), 3);

        let first = &traces[0];
        assert_eq!(first.vehicle_id, "a");
        let ts: Vec<i64> = first.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(ts, vec![day + 30, day + 60]);
        assert_eq!(traces[1].vehicle_id, "a");
        assert_eq!(traces[1].len(), 1);
        assert_eq!(traces[2].vehicle_id, "b");
    }

    #[test]
    fn test_assemble_dedups_timestamps_and_drops_invalid() {
        let mut dup = record("a", 100);
        dup.longitude = -43.0;
        let mut bad = record("a", 200);
        bad.latitude = 95.0;
        let traces = assemble_traces(&[record("a", 100), dup, bad]);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].len(), 1);
        assert_eq!(traces[0].points[0].longitude, -43.2);
    }

    #[test]
    fn test_filter_trace_bounds() {
        let config = BatchConfig {
            min_points: 2,
            max_points: 3,
            ..BatchConfig::default()
        };
        let points = |n: i64| (0..n).map(|i| TracePoint::new(i, 0.0, 0.0)).collect();

        assert!(matches!(
            filter_trace(&Trace::new("v", "s", vec![]), &config),
            Err(TraceError::EmptyTrace { .. })
        ));
        assert!(matches!(
            filter_trace(&Trace::new("v", "s", points(1)), &config),
            Err(TraceError::InsufficientPoints { point_count: 1, .. })
        ));
        assert!(filter_trace(&Trace::new("v", "s", points(3)), &config).is_ok());
        assert!(matches!(
            filter_trace(&Trace::new("v", "s", points(4)), &config),
            Err(TraceError::TooManyPoints { point_count: 4, .. })
        ));
    }

    #[test]
    fn test_batch_config_validation() {
        assert!(BatchConfig::default().validate().is_ok());
        let config = BatchConfig {
            min_points: 10,
            max_points: 5,
            ..BatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unusable_route_fails_every_trace() {
        let traces = vec![
            Trace::new("a", "232", vec![TracePoint::new(0, 0.0, 0.0)]),
            Trace::new("b", "232", vec![TracePoint::new(0, 0.0, 0.0)]),
        ];
        let result = process_route("232", &[], &traces, &BatchConfig::default());
        assert!(result.processed.is_empty());
        assert_eq!(result.failures.len(), 2);
        assert!(result
            .failures
            .iter()
            .all(|f| matches!(f.error, TraceError::InvalidGeometry { .. })));
        assert_eq!(result.failures[1].vehicle_id, "b");
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        use crate::geometry::DirectionGeometry;
        use geo::Coord;

        let mut dirs = BTreeMap::new();
        dirs.insert(
            0,
            DirectionGeometry::from_polyline(
                &[Coord { x: 0.0, y: 0.0 }, Coord { x: 0.01, y: 0.0 }],
                &[0.0, 1113.2],
                vec![0.0, 556.6, 1113.2],
            ),
        );
        let geometry = RouteGeometry::new("r", dirs).unwrap();
        let engine = TraceEngine::new(geometry, TraceConfig::default()).unwrap();

        let traces: Vec<Trace> = (0..8)
            .map(|v| {
                let n = 5 + v * 3;
                let points = (0..n)
                    .map(|i| TracePoint::new(i as i64 * 30, 0.0005 * i as f64, 0.0))
                    .collect();
                Trace::new(format!("v{}", v), "r", points)
            })
            .collect();
        let config = BatchConfig {
            min_points: 10,
            ..BatchConfig::default()
        };

        let sequential = process_traces(&engine, &traces, &config);
        let parallel = process_traces_parallel(&engine, &traces, &config);
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.failures.len(), 2);
    }
}
