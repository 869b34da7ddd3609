//! Distance and time accumulation across direction runs and calendar days.
//!
//! Along-route distance restarts at every terminal, so each direction change
//! folds the last distance of the finished run into an offset. A change is two
//! different known directions meeting; unknown or off-route points in between
//! do not end a run. The offset is cleared at midnight (UTC day index change).
//! Cumulative time restarts at each direction change. The two resets are
//! independent triggers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geo_utils::day_index;
use crate::DirectionId;

/// Distance and time series of one trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Accumulation {
    /// Distance from the start of the resolved direction (0 when unknown)
    pub distance_traveled: Vec<f64>,
    /// Distance traveled plus the running offset
    pub cumulative_distance: Vec<f64>,
    /// Seconds since the previous point (0 for the first point)
    pub time_delta: Vec<i64>,
    /// Seconds accumulated within the current direction run
    pub cumulative_time: Vec<i64>,
}

/// Accumulate distance and time over a classified, direction-resolved trace.
pub fn accumulate(
    timestamps: &[i64],
    on_route: &[bool],
    directions: &[Option<DirectionId>],
    distances: &BTreeMap<DirectionId, &[f64]>,
) -> Accumulation {
    let n = timestamps.len();
    let mut acc = Accumulation {
        distance_traveled: Vec::with_capacity(n),
        cumulative_distance: Vec::with_capacity(n),
        time_delta: Vec::with_capacity(n),
        cumulative_time: Vec::with_capacity(n),
    };

    let mut offset = 0.0;
    let mut elapsed = 0i64;
    // Last known direction and the distance traveled at that point
    let mut last_known: Option<(DirectionId, f64)> = None;

    for i in 0..n {
        let traveled = match directions[i] {
            Some(direction) if on_route[i] => distances
                .get(&direction)
                .map(|d| d[i])
                .unwrap_or(0.0),
            _ => 0.0,
        };

        let delta = if i == 0 {
            0
        } else {
            timestamps[i] - timestamps[i - 1]
        };

        if i > 0 {
            match (last_known, directions[i]) {
                (Some((previous, previous_traveled)), Some(current)) if previous != current => {
                    offset += previous_traveled;
                    elapsed = delta;
                }
                _ => elapsed += delta,
            }
            if day_index(timestamps[i]) != day_index(timestamps[i - 1]) {
                offset = 0.0;
            }
        }

        if let Some(direction) = directions[i] {
            last_known = Some((direction, traveled));
        }

        acc.distance_traveled.push(traveled);
        acc.cumulative_distance.push(traveled + offset);
        acc.time_delta.push(delta);
        acc.cumulative_time.push(elapsed);
    }

    acc
}
