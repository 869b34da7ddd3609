//! Geographic utilities: degree/meter conversion, haversine length, day keys.
//!
//! Route matching works on raw lon/lat degrees as a planar approximation.
//! Distances found in degree space are turned into meters with a single
//! latitude-dependent scale factor evaluated at the trace's mean latitude.

use geo::{Coord, Distance, Haversine, Point};

use crate::TracePoint;

/// Meters per degree at the equator.
pub const METERS_PER_DEGREE_EQUATOR: f64 = 111_320.0;

/// Eccentricity-squared term used by the latitude correction.
const LATITUDE_CORRECTION: f64 = 0.006_694_38;

/// Seconds in a calendar day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Meters per degree at the given latitude (degrees).
///
/// `111320 * (1 - 0.00669438 * lat_radians²)`
pub fn meters_per_degree(latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    METERS_PER_DEGREE_EQUATOR * (1.0 - LATITUDE_CORRECTION * lat_rad * lat_rad)
}

/// Convert a distance in degrees to meters at the given latitude.
pub fn degrees_to_meters(degrees: f64, latitude: f64) -> f64 {
    degrees * meters_per_degree(latitude)
}

/// Convert a distance in meters to degrees at the given latitude.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    meters / meters_per_degree(latitude)
}

/// Great-circle distance between two lon/lat coordinates in meters.
pub fn haversine_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Haversine::distance(Point::from(a), Point::from(b))
}

/// Cumulative haversine length at each vertex of a polyline, starting at 0.
pub fn cumulative_lengths(coords: &[Coord<f64>]) -> Vec<f64> {
    let mut total = 0.0;
    let mut out = Vec::with_capacity(coords.len());
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            total += haversine_distance(coords[i - 1], *c);
        }
        out.push(total);
    }
    out
}

/// Mean latitude of a trace, `None` for an empty trace.
pub fn mean_latitude(points: &[TracePoint]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let sum: f64 = points.iter().map(|p| p.latitude).sum();
    Some(sum / points.len() as f64)
}

/// Calendar day index (UTC) of a unix timestamp in seconds.
pub fn day_index(timestamp: i64) -> i64 {
    timestamp.div_euclid(SECONDS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_meters_per_degree_equator() {
        assert_eq!(meters_per_degree(0.0), METERS_PER_DEGREE_EQUATOR);
    }

    #[test]
    fn test_meters_per_degree_rio() {
        // -22.9° → 111320 * (1 - 0.00669438 * 0.3997²)
        let expected = 111_320.0 * (1.0 - 0.006_694_38 * (-22.9f64).to_radians().powi(2));
        assert!(approx_eq(meters_per_degree(-22.9), expected, 1e-9));
        assert!(meters_per_degree(-22.9) < METERS_PER_DEGREE_EQUATOR);
    }

    #[test]
    fn test_degrees_meters_inverse() {
        let m = degrees_to_meters(0.001, 45.0);
        assert!(approx_eq(meters_to_degrees(m, 45.0), 0.001, 1e-12));
    }

    #[test]
    fn test_haversine_known_value() {
        // London to Paris is approximately 344 km
        let london = Coord { x: -0.1278, y: 51.5074 };
        let paris = Coord { x: 2.3522, y: 48.8566 };
        assert!(approx_eq(haversine_distance(london, paris), 343_560.0, 5000.0));
    }

    #[test]
    fn test_haversine_one_degree_on_equator() {
        let d = haversine_distance(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 });
        assert!(approx_eq(d, 111_195.0, 5.0));
        assert_eq!(haversine_distance(Coord { x: 3.0, y: 4.0 }, Coord { x: 3.0, y: 4.0 }), 0.0);
    }

    #[test]
    fn test_cumulative_lengths() {
        let coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.001, y: 0.0 },
            Coord { x: 0.002, y: 0.0 },
        ];
        let lengths = cumulative_lengths(&coords);
        assert_eq!(lengths[0], 0.0);
        assert!(approx_eq(lengths[2], 2.0 * lengths[1], 1e-6));
    }

    #[test]
    fn test_mean_latitude_empty() {
        assert!(mean_latitude(&[]).is_none());
    }

    #[test]
    fn test_day_index_rollover() {
        assert_eq!(day_index(86_399), 0);
        assert_eq!(day_index(86_400), 1);
        assert_eq!(day_index(-1), -1);
    }
}
