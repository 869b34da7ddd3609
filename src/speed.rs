//! Trailing-window mean speed.

use serde::{Deserialize, Serialize};

/// Window lengths, in minutes, of the speed features.
pub const SPEED_WINDOWS_MINUTES: [u32; 3] = [1, 3, 5];

/// Mean speeds (km/h) over the trailing 1, 3 and 5 minute windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanSpeeds {
    pub speed_1min: f64,
    pub speed_3min: f64,
    pub speed_5min: f64,
}

/// Mean speed in km/h over a trailing window of `window_minutes`.
///
/// For each on-route point whose predecessor is also on route, the reference
/// point is the nearest earlier point at least the window length back, never
/// reaching past the start of the current on-route run. Everything else gets 0.
pub fn mean_speed(
    timestamps: &[i64],
    cumulative_distance: &[f64],
    on_route: &[bool],
    window_minutes: u32,
) -> Vec<f64> {
    let window = 60 * i64::from(window_minutes);
    let mut speeds = vec![0.0; timestamps.len()];
    let mut run_start = 0;

    for i in 1..timestamps.len() {
        if !on_route[i - 1] {
            run_start = i;
        }
        if !(on_route[i] && on_route[i - 1]) {
            continue;
        }

        let mut j = i - 1;
        while j > run_start && timestamps[i] - timestamps[j] < window {
            j -= 1;
        }

        let dt = timestamps[i] - timestamps[j];
        if dt != 0 {
            speeds[i] = (cumulative_distance[i] - cumulative_distance[j]) / dt as f64 * 3.6;
        }
    }

    speeds
}

/// Speeds for all three standard windows, one entry per point.
pub fn mean_speeds(
    timestamps: &[i64],
    cumulative_distance: &[f64],
    on_route: &[bool],
) -> Vec<MeanSpeeds> {
    let [w1, w3, w5] =
        SPEED_WINDOWS_MINUTES.map(|w| mean_speed(timestamps, cumulative_distance, on_route, w));

    (0..timestamps.len())
        .map(|i| MeanSpeeds {
            speed_1min: w1[i],
            speed_3min: w3[i],
            speed_5min: w5[i],
        })
        .collect()
}
