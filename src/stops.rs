//! Stop bracketing: the stops immediately behind and ahead of a point.

use serde::{Deserialize, Serialize};

use crate::geometry::RouteGeometry;
use crate::DirectionId;

/// Stops bracketing a point along its direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopBracket {
    pub last_stop: usize,
    pub next_stop: usize,
    pub distance_to_last_stop: f64,
    pub distance_to_next_stop: f64,
}

/// Bracket a distance within an ascending stop-distance list.
///
/// `next_stop` is the first stop at or beyond `distance`, clamped to the
/// terminal stop; `last_stop` is the one before it, clamped to the first.
/// Returns `None` for an empty stop list.
pub fn bracket(stop_distances: &[f64], distance: f64) -> Option<StopBracket> {
    if stop_distances.is_empty() {
        return None;
    }
    let last_index = stop_distances.len() - 1;
    let next_stop = stop_distances.partition_point(|s| *s < distance).min(last_index);
    let last_stop = next_stop.saturating_sub(1);

    Some(StopBracket {
        last_stop,
        next_stop,
        distance_to_last_stop: (distance - stop_distances[last_stop]).max(0.0),
        distance_to_next_stop: (stop_distances[next_stop] - distance).max(0.0),
    })
}

/// Bracket every point of a trace using its resolved direction's stops.
///
/// Points with an unknown direction get no bracket.
pub fn bracket_trace(
    geometry: &RouteGeometry,
    directions: &[Option<DirectionId>],
    distance_traveled: &[f64],
) -> Vec<Option<StopBracket>> {
    directions
        .iter()
        .zip(distance_traveled)
        .map(|(direction, distance)| {
            direction.and_then(|d| bracket(geometry.stop_distances(d), *distance))
        })
        .collect()
}
