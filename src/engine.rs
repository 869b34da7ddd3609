//! # Trace Engine
//!
//! Runs the per-trace pipeline against one route geometry. The stages run in
//! a fixed order, each consuming the previous stage's output:
//!
//! 1. classify points as on/off route
//! 2. resolve the direction of travel
//! 3. accumulate distance and time
//! 4. bracket points between stops
//! 5. compute trailing-window mean speeds
//! 6. interpolate virtual stop crossings
//!
//! The engine holds no state between traces, so one engine can be shared by
//! any number of worker threads.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::accumulate::accumulate;
use crate::classify::{classify, SegmentSearch};
use crate::crossings::{interpolate_crossings, VirtualCrossing};
use crate::direction::resolve_directions;
use crate::error::Result;
use crate::geometry::RouteGeometry;
use crate::speed::mean_speeds;
use crate::stops::bracket_trace;
use crate::{EnrichedPoint, PointProjection, Trace, TraceConfig, TracePoint};

// ============================================================================
// Core Types
// ============================================================================

/// Counters describing how well a trace matched its route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub point_count: usize,
    pub on_route_points: usize,
    pub resolved_points: usize,
    pub crossings_emitted: usize,
    pub crossings_dropped: usize,
}

impl MatchStats {
    /// Fraction of points within tolerance of the route (0 for an empty trace).
    pub fn on_route_ratio(&self) -> f64 {
        if self.point_count == 0 {
            0.0
        } else {
            self.on_route_points as f64 / self.point_count as f64
        }
    }
}

/// Everything reconstructed for one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFeatures {
    pub trace_id: String,
    pub points: Vec<EnrichedPoint>,
    pub crossings: Vec<VirtualCrossing>,
    pub stats: MatchStats,
}

// ============================================================================
// Trace Engine
// ============================================================================

pub struct TraceEngine {
    geometry: RouteGeometry,
    config: TraceConfig,
    search: SegmentSearch,
}

impl TraceEngine {
    /// Create an engine for one route. Fails on an invalid configuration.
    pub fn new(geometry: RouteGeometry, config: TraceConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "[TraceEngine] Route {} with {} directions, projector {:?}",
            geometry.route_id(),
            geometry.direction_count(),
            config.projector
        );
        let search = SegmentSearch::new(config.projector, &geometry);
        Ok(Self {
            geometry,
            config,
            search,
        })
    }

    pub fn geometry(&self) -> &RouteGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Reconstruct features for one trace.
    ///
    /// Never fails: traces too short to resolve a direction come back with
    /// every point off direction, and crossings that cannot be placed are
    /// counted in `stats.crossings_dropped`.
    pub fn process(&self, trace: &Trace) -> TraceFeatures {
        let trace_id = trace.trace_id();
        let (points, crossings, stats) = self.process_points(&trace.points);

        info!(
            "[TraceEngine] {} on route {}: {} points, {} on route, {} resolved, {} crossings ({} dropped)",
            trace_id,
            self.geometry.route_id(),
            stats.point_count,
            stats.on_route_points,
            stats.resolved_points,
            stats.crossings_emitted,
            stats.crossings_dropped
        );

        TraceFeatures {
            trace_id,
            points,
            crossings,
            stats,
        }
    }

    /// Run the pipeline over timestamp-sorted points.
    pub fn process_points(
        &self,
        points: &[TracePoint],
    ) -> (Vec<EnrichedPoint>, Vec<VirtualCrossing>, MatchStats) {
        if points.is_empty() {
            return (Vec::new(), Vec::new(), MatchStats::default());
        }
        if points.len() <= self.config.lookback as usize {
            debug!(
                "[TraceEngine] {} points within lookback of {}, directions stay unknown",
                points.len(),
                self.config.lookback
            );
        }

        let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();

        let classification = classify(
            points,
            &self.geometry,
            self.config.on_route_tolerance,
            &self.search,
        );
        let distances = classification.distances_from_start();

        let series = resolve_directions(
            &classification.on_route,
            &distances,
            &self.config.resolver_params(),
        );

        let acc = accumulate(
            &timestamps,
            &classification.on_route,
            &series.direction,
            &distances,
        );

        let brackets = bracket_trace(&self.geometry, &series.direction, &acc.distance_traveled);
        let speeds = mean_speeds(&timestamps, &acc.cumulative_distance, &classification.on_route);

        let enriched: Vec<EnrichedPoint> = points
            .iter()
            .enumerate()
            .map(|(i, point)| EnrichedPoint {
                point: *point,
                projections: classification
                    .per_direction
                    .iter()
                    .map(|(d, p)| {
                        (
                            *d,
                            PointProjection {
                                squared_distance: p.squared_distance[i],
                                segment_index: p.segment_index[i],
                                distance_to_route: p.distance_to_route[i],
                                distance_from_start: p.distance_from_start[i],
                            },
                        )
                    })
                    .collect(),
                in_route_distance: classification.in_route_distance[i],
                on_route: classification.on_route[i],
                direction: series.direction[i],
                direction_source: series.source[i],
                distance_traveled: acc.distance_traveled[i],
                cumulative_distance: acc.cumulative_distance[i],
                time_delta: acc.time_delta[i],
                cumulative_time: acc.cumulative_time[i],
                stops: brackets[i],
                speeds: speeds[i],
            })
            .collect();

        let outcome = interpolate_crossings(&enriched, &self.geometry);

        let stats = MatchStats {
            point_count: points.len(),
            on_route_points: classification.on_route_count(),
            resolved_points: series.resolved_count(),
            crossings_emitted: outcome.crossings.len(),
            crossings_dropped: outcome.rejected.len(),
        };

        (enriched, outcome.crossings, stats)
    }
}
