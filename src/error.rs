use thiserror::Error;

use crate::types::CalibrationMode;

/// Fusion core error types
///
/// Every variant is local and recoverable: the offending sample, range or
/// setting is rejected and the session keeps going.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("Non-monotonic timestamp: {t} is not after {previous}")]
    NonMonotonicTimestamp { t: f64, previous: f64 },

    #[error("Non-finite {field} in sample at t={t}")]
    NonFiniteSample { t: f64, field: &'static str },

    #[error("Insufficient samples for {mode} calibration: got {got}, need {need}")]
    InsufficientCalibrationSamples {
        mode: CalibrationMode,
        got: usize,
        need: usize,
    },

    #[error("Degenerate {mode} calibration: {reason}")]
    DegenerateCalibration {
        mode: CalibrationMode,
        reason: &'static str,
    },

    #[error("Invalid time step: {0}")]
    InvalidTimeStep(f64),

    #[error("Invalid label range: {start}..{end}")]
    InvalidLabelRange { start: u32, end: u32 },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: &'static str, value: f64 },
}

/// Result type for fusion operations
pub type FusionResult<T> = Result<T, FusionError>;
