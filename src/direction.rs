//! Direction inference with hysteresis.
//!
//! One forward pass assigns a direction to on-route points. Mid-route the
//! previous direction is locked in; near a terminal the direction is inferred
//! from how the along-route distance trends over a short trailing window.
//! Every assignment is immediately propagated backwards over on-route points
//! that are still unknown.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::DirectionId;

/// How a point's direction was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectionSource {
    /// Window trend comparison decided it
    Inferred,
    /// Copied from the previous point while far from every terminal
    Locked,
    /// Propagated backwards from a later resolved point
    Backfilled,
}

/// Parameters of the direction state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverParams {
    /// Trailing window size, also the first index considered
    pub lookback: usize,
    /// Distance from start every direction must exceed to lock (meters)
    pub terminal_tolerance: f64,
    /// Minimum trend gap between the best and runner-up direction (meters)
    pub direction_tolerance: f64,
}

/// Resolved direction series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionSeries {
    pub direction: Vec<Option<DirectionId>>,
    pub source: Vec<Option<DirectionSource>>,
}

impl DirectionSeries {
    fn unknown(len: usize) -> Self {
        Self {
            direction: vec![None; len],
            source: vec![None; len],
        }
    }

    pub fn resolved_count(&self) -> usize {
        self.direction.iter().filter(|d| d.is_some()).count()
    }
}

/// Trend of a trailing window: its mean minus its first value.
fn window_trend(window: &[f64]) -> f64 {
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    mean - window[0]
}

/// Pick the direction whose trend beats every other by more than `tolerance`.
fn infer_direction(
    distances: &BTreeMap<DirectionId, &[f64]>,
    start: usize,
    end: usize,
    tolerance: f64,
) -> Option<DirectionId> {
    if distances.len() == 1 {
        return distances.keys().next().copied();
    }

    let mut best: Option<(DirectionId, f64)> = None;
    let mut runner_up = f64::NEG_INFINITY;
    for (direction, series) in distances {
        let trend = window_trend(&series[start..=end]);
        match best {
            Some((_, best_trend)) if trend <= best_trend => runner_up = runner_up.max(trend),
            Some((_, best_trend)) => {
                runner_up = best_trend;
                best = Some((*direction, trend));
            }
            None => best = Some((*direction, trend)),
        }
    }

    let (direction, best_trend) = best?;
    if best_trend - runner_up > tolerance {
        Some(direction)
    } else {
        None
    }
}

/// Resolve the travel direction of every point.
///
/// `distances` holds each direction's distance-from-start series, all the
/// same length as `on_route`. Traces no longer than the lookback stay unknown.
pub fn resolve_directions(
    on_route: &[bool],
    distances: &BTreeMap<DirectionId, &[f64]>,
    params: &ResolverParams,
) -> DirectionSeries {
    let n = on_route.len();
    let mut series = DirectionSeries::unknown(n);
    let lookback = params.lookback.max(1);

    if distances.is_empty() || n <= lookback {
        return series;
    }

    for i in lookback..n {
        if !on_route[i] {
            continue;
        }

        let far_from_terminals = distances
            .values()
            .all(|d| d[i] > params.terminal_tolerance);

        match series.direction[i - 1] {
            Some(previous) if far_from_terminals => {
                series.direction[i] = Some(previous);
                series.source[i] = Some(DirectionSource::Locked);
            }
            _ => {
                let start = i + 1 - lookback;
                if let Some(direction) =
                    infer_direction(distances, start, i, params.direction_tolerance)
                {
                    series.direction[i] = Some(direction);
                    series.source[i] = Some(DirectionSource::Inferred);
                }
            }
        }

        let Some(resolved) = series.direction[i] else {
            continue;
        };

        let mut j = i;
        while j > 0 && on_route[j - 1] && series.direction[j - 1].is_none() {
            series.direction[j - 1] = Some(resolved);
            series.source[j - 1] = Some(DirectionSource::Backfilled);
            j -= 1;
        }
    }

    series
}
