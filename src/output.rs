//! Flat rows for the persistence layer.
//!
//! One `EnrichedRow` per ping and one `CrossingRow` per virtual stop
//! crossing, with the UTC date and time of day split out for partitioning.
//! An unknown direction is written as -1.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::engine::TraceFeatures;
use crate::error::{Result, TraceError};
use crate::{DirectionId, Trace};

/// Column value for a point whose direction is unknown.
pub const UNKNOWN_DIRECTION: i16 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRow {
    pub vehicle_id: String,
    pub service_id: String,
    pub timestamp: i64,
    pub date: String,
    pub time_of_day: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Meters to the closest segment, per direction
    pub distance_to_route: BTreeMap<DirectionId, f64>,
    /// Meters from each direction's start
    pub distance_from_start: BTreeMap<DirectionId, f64>,
    pub in_route_distance: f64,
    pub on_route: bool,
    pub direction: i16,
    /// Direction assigned by the forward pass rather than backfilled
    pub direction_direct: bool,
    pub distance_traveled: f64,
    pub cumulative_distance: f64,
    pub time_delta: i64,
    pub cumulative_time: i64,
    pub last_stop: Option<usize>,
    pub next_stop: Option<usize>,
    pub distance_to_last_stop: Option<f64>,
    pub distance_to_next_stop: Option<f64>,
    pub speed_1min: f64,
    pub speed_3min: f64,
    pub speed_5min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingRow {
    pub vehicle_id: String,
    pub service_id: String,
    pub timestamp: f64,
    pub date: String,
    pub time_of_day: String,
    pub direction: i16,
    pub stop_index: usize,
    pub distance_traveled: f64,
    pub cumulative_distance: f64,
    pub distance_to_next_stop: f64,
    pub speed_1min: f64,
    pub speed_3min: f64,
    pub speed_5min: f64,
}

/// UTC date (`YYYY-MM-DD`) and time of day (`HH:MM:SS`) of a unix timestamp.
///
/// Fractional seconds are truncated. Out-of-range timestamps give empty strings.
pub fn split_timestamp(timestamp: f64) -> (String, String) {
    match DateTime::from_timestamp(timestamp.floor() as i64, 0) {
        Some(dt) => (
            dt.date_naive().to_string(),
            dt.format("%H:%M:%S").to_string(),
        ),
        None => (String::new(), String::new()),
    }
}

fn direction_column(direction: Option<DirectionId>) -> i16 {
    direction.map(i16::from).unwrap_or(UNKNOWN_DIRECTION)
}

/// One row per ping of a processed trace.
pub fn enriched_rows(trace: &Trace, features: &TraceFeatures) -> Vec<EnrichedRow> {
    features
        .points
        .iter()
        .map(|p| {
            let (date, time_of_day) = split_timestamp(p.point.timestamp as f64);
            EnrichedRow {
                vehicle_id: trace.vehicle_id.clone(),
                service_id: trace.service_id.clone(),
                timestamp: p.point.timestamp,
                date,
                time_of_day,
                longitude: p.point.longitude,
                latitude: p.point.latitude,
                distance_to_route: p
                    .projections
                    .iter()
                    .map(|(d, proj)| (*d, proj.distance_to_route))
                    .collect(),
                distance_from_start: p
                    .projections
                    .iter()
                    .map(|(d, proj)| (*d, proj.distance_from_start))
                    .collect(),
                in_route_distance: p.in_route_distance,
                on_route: p.on_route,
                direction: direction_column(p.direction),
                direction_direct: p.direction_is_direct(),
                distance_traveled: p.distance_traveled,
                cumulative_distance: p.cumulative_distance,
                time_delta: p.time_delta,
                cumulative_time: p.cumulative_time,
                last_stop: p.stops.map(|s| s.last_stop),
                next_stop: p.stops.map(|s| s.next_stop),
                distance_to_last_stop: p.stops.map(|s| s.distance_to_last_stop),
                distance_to_next_stop: p.stops.map(|s| s.distance_to_next_stop),
                speed_1min: p.speeds.speed_1min,
                speed_3min: p.speeds.speed_3min,
                speed_5min: p.speeds.speed_5min,
            }
        })
        .collect()
}

/// One row per virtual stop crossing of a processed trace.
pub fn crossing_rows(trace: &Trace, features: &TraceFeatures) -> Vec<CrossingRow> {
    features
        .crossings
        .iter()
        .map(|c| {
            let (date, time_of_day) = split_timestamp(c.timestamp);
            CrossingRow {
                vehicle_id: trace.vehicle_id.clone(),
                service_id: trace.service_id.clone(),
                timestamp: c.timestamp,
                date,
                time_of_day,
                direction: direction_column(Some(c.direction)),
                stop_index: c.stop_index,
                distance_traveled: c.distance_traveled,
                cumulative_distance: c.cumulative_distance,
                distance_to_next_stop: c.distance_to_next_stop,
                speed_1min: c.speeds.speed_1min,
                speed_3min: c.speeds.speed_3min,
                speed_5min: c.speeds.speed_5min,
            }
        })
        .collect()
}

/// Serialize rows as JSON lines, one object per line.
pub fn to_json_lines<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut out = String::new();
    for row in rows {
        let line = serde_json::to_string(row).map_err(|e| TraceError::Export {
            message: e.to_string(),
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MatchStats;
    use crate::{EnrichedPoint, MeanSpeeds, StopBracket, TracePoint, VirtualCrossing};

    fn features() -> (Trace, TraceFeatures) {
        // 2024-05-01T23:59:50Z
        let ts = 1_714_607_990;
        let trace = Trace::new(
            "B31044",
            "232",
            vec![TracePoint::new(ts, -43.2, -22.9), TracePoint::new(ts + 20, -43.2, -22.9)],
        );
        let mut second = EnrichedPoint::unmatched(trace.points[1]);
        second.on_route = true;
        second.direction = Some(1);
        second.stops = Some(StopBracket {
            last_stop: 2,
            next_stop: 3,
            distance_to_last_stop: 10.0,
            distance_to_next_stop: 90.0,
        });
        let crossing = VirtualCrossing {
            timestamp: ts as f64 + 12.5,
            distance_traveled: 400.0,
            cumulative_distance: 1400.0,
            direction: 1,
            stop_index: 2,
            distance_to_next_stop: 100.0,
            speeds: MeanSpeeds::default(),
        };
        let features = TraceFeatures {
            trace_id: trace.trace_id(),
            points: vec![EnrichedPoint::unmatched(trace.points[0]), second],
            crossings: vec![crossing],
            stats: MatchStats::default(),
        };
        (trace, features)
    }

    #[test]
    fn test_split_timestamp() {
        let (date, time) = split_timestamp(1_714_607_990.75);
        assert_eq!(date, "2024-05-01");
        assert_eq!(time, "23:59:50");
    }

    #[test]
    fn test_enriched_rows() {
        let (trace, features) = features();
        let rows = enriched_rows(&trace, &features);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].direction, UNKNOWN_DIRECTION);
        assert_eq!(rows[0].next_stop, None);
        assert_eq!(rows[1].direction, 1);
        assert_eq!(rows[1].date, "2024-05-02");
        assert_eq!(rows[1].time_of_day, "00:00:10");
        assert_eq!(rows[1].next_stop, Some(3));
        assert_eq!(rows[1].distance_to_next_stop, Some(90.0));
    }

    #[test]
    fn test_crossing_rows_and_json_lines() {
        let (trace, features) = features();
        let rows = crossing_rows(&trace, &features);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].time_of_day, "00:00:02");
        assert_eq!(rows[0].stop_index, 2);

        let json = to_json_lines(&rows).unwrap();
        assert_eq!(json.lines().count(), 1);
        let parsed: CrossingRow = serde_json::from_str(json.trim_end()).unwrap();
        assert_eq!(parsed, rows[0]);
    }
}
