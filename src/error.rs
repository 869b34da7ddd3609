//! Unified error handling for the route-trace library.
//!
//! Errors fall in two groups: route-level failures (`InvalidGeometry`,
//! `InvalidConfig`) that abort every trace of a route, and trace-level
//! conditions that are recorded and skipped without aborting anything.

use thiserror::Error;

use crate::DirectionId;

/// Unified error type for route-trace operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    /// The route has no usable directions, or a direction lacks segments or stops
    #[error("Invalid geometry for route '{route_id}': {message}")]
    InvalidGeometry { route_id: String, message: String },

    /// A virtual crossing fell outside its bracketing points
    #[error(
        "Interpolated crossing of stop {stop_index} out of range: distance {distance:.1} not in [{d0:.1}, {d1:.1}] or timestamp {timestamp:.1} not in [{t0}, {t1}]"
    )]
    InterpolationOutOfRange {
        stop_index: usize,
        distance: f64,
        d0: f64,
        d1: f64,
        timestamp: f64,
        t0: i64,
        t1: i64,
    },

    /// Trace has no points at all
    #[error("Trace '{trace_id}' is empty")]
    EmptyTrace { trace_id: String },

    /// Trace is shorter than the point count an operation requires
    #[error("Trace '{trace_id}' has {point_count} points, minimum {minimum_required} required")]
    InsufficientPoints {
        trace_id: String,
        point_count: usize,
        minimum_required: usize,
    },

    /// Trace is longer than the batch filter accepts
    #[error("Trace '{trace_id}' has {point_count} points, maximum {maximum_allowed} allowed")]
    TooManyPoints {
        trace_id: String,
        point_count: usize,
        maximum_allowed: usize,
    },

    /// A crossing referenced a stop the direction does not have
    #[error("Stop index {stop_index} out of bounds for direction {direction} ({stop_count} stops)")]
    StopIndexOutOfBounds {
        direction: DirectionId,
        stop_index: usize,
        stop_count: usize,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    InvalidConfig { message: String },

    /// Rows could not be serialized
    #[error("Export error: {message}")]
    Export { message: String },
}

impl TraceError {
    /// Whether the error only affects a single crossing and processing continues.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TraceError::InterpolationOutOfRange { .. } | TraceError::StopIndexOutOfBounds { .. }
        )
    }
}

/// Result type alias for route-trace operations.
pub type Result<T> = std::result::Result<T, TraceError>;

/// Extension trait for converting Option to TraceError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an invalid geometry error.
    fn ok_or_invalid_geometry(self, route_id: &str, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_geometry(self, route_id: &str, message: &str) -> Result<T> {
        self.ok_or_else(|| TraceError::InvalidGeometry {
            route_id: route_id.to_string(),
            message: message.to_string(),
        })
    }
}
