pub mod label;
pub mod linalg;

pub use label::*;
pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FusionError, FusionResult};

/// One 9-axis reading from the puck.
///
/// `t` is seconds since session start; accel in m/s², gyro in rad/s,
/// mag in the sensor's native units (only directions and ratios matter).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t: f64,
    pub accel: Vec3,
    pub gyro: Vec3,
    pub mag: Vec3,
}

impl Sample {
    pub fn new(t: f64, accel: Vec3, gyro: Vec3, mag: Vec3) -> Self {
        Self { t, accel, gyro, mag }
    }

    /// Reject NaN/Inf anywhere in the reading.
    pub fn validate(&self) -> FusionResult<()> {
        if !self.t.is_finite() {
            return Err(FusionError::NonFiniteSample { t: self.t, field: "t" });
        }
        let fields = [("accel", &self.accel), ("gyro", &self.gyro), ("mag", &self.mag)];
        for (field, v) in fields {
            if v.iter().any(|c| !c.is_finite()) {
                return Err(FusionError::NonFiniteSample { t: self.t, field });
            }
        }
        Ok(())
    }
}

/// Aggregate statistics over one fixed-duration slice of the stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub index: u32,
    pub time_start: f64,
    pub time_end: f64,
    pub sample_count: u32,
    pub accel_mag_mean: f64,
    pub gyro_mag_mean: f64,
    /// Closed by `flush()` rather than by the stream crossing `time_end`.
    pub partial: bool,
}

impl Window {
    pub fn duration(&self) -> f64 {
        self.time_end - self.time_start
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.time_start && t < self.time_end
    }
}

/// Which magnetometer procedure a sample range is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    EarthField,
    HardIron,
}

impl fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationMode::EarthField => write!(f, "earth_field"),
            CalibrationMode::HardIron => write!(f, "hard_iron"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum CalibrationKind {
    /// Mean field vector captured while stationary (sensor frame).
    EarthField { reference: Vec3 },
    /// Constant offset to subtract from raw readings, and the radius of the
    /// fitted sphere (local field strength after correction).
    HardIron { offset: Vec3, field_radius: f64 },
}

impl CalibrationKind {
    pub fn mode(&self) -> CalibrationMode {
        match self {
            CalibrationKind::EarthField { .. } => CalibrationMode::EarthField,
            CalibrationKind::HardIron { .. } => CalibrationMode::HardIron,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub kind: CalibrationKind,
    /// 1.0 = perfectly consistent capture, 0.0 = unusable.
    pub quality: f64,
    /// Earth-field only.
    pub magnitude: Option<f64>,
    /// Earth-field only.
    pub avg_deviation: Option<f64>,
    pub sample_count: u32,
    pub start_sample: u32,
    pub end_sample: u32,
}

impl CalibrationResult {
    pub fn mode(&self) -> CalibrationMode {
        self.kind.mode()
    }

    pub fn hard_iron_offset(&self) -> Option<Vec3> {
        match self.kind {
            CalibrationKind::HardIron { offset, .. } => Some(offset),
            CalibrationKind::EarthField { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub t: f64,
    pub position: Vec3,
}
