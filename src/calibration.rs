//! Magnetometer calibration
//!
//! Two independent procedures over a range of raw magnetometer readings:
//!
//! - **Earth-field capture**: the puck is held still; the mean reading is the
//!   local reference field. Spread of per-sample magnitudes around the mean
//!   magnitude flags motion during capture.
//! - **Hard-iron estimation**: the puck is turned through many orientations;
//!   readings lie on a sphere centred on the hard-iron offset `b`. Solved as
//!   linear least squares on `‖m‖² = 2 m·b + c`, `c = r² − ‖b‖²`.
//!
//! Both report `quality = 1 − avg_deviation / magnitude`, clamped to [0, 1].

use log::debug;

use crate::error::{FusionError, FusionResult};
use crate::types::{
    CalibrationKind, CalibrationMode, CalibrationResult, SphereFitMat, SphereFitVec, Vec3,
};

/// Degrees of freedom of each fit; configured minimums are floored here.
pub const EARTH_FIELD_MIN_SAMPLES: usize = 2;
pub const HARD_IRON_MIN_SAMPLES: usize = 4;

pub const DEFAULT_EARTH_FIELD_SAMPLES: usize = 10;
pub const DEFAULT_HARD_IRON_SAMPLES: usize = 20;

// Smallest/largest eigenvalue of the normal matrix below which the sample
// cloud does not span enough directions to locate the sphere centre.
const SPHERE_FIT_CONDITION: f64 = 1e-12;
const MIN_FIELD_MAGNITUDE: f64 = 1e-9;

pub struct MagnetometerCalibrator {
    min_earth_field_samples: usize,
    min_hard_iron_samples: usize,
}

impl Default for MagnetometerCalibrator {
    fn default() -> Self {
        Self::new(DEFAULT_EARTH_FIELD_SAMPLES, DEFAULT_HARD_IRON_SAMPLES)
    }
}

impl MagnetometerCalibrator {
    pub fn new(min_earth_field_samples: usize, min_hard_iron_samples: usize) -> Self {
        Self {
            min_earth_field_samples: min_earth_field_samples.max(EARTH_FIELD_MIN_SAMPLES),
            min_hard_iron_samples: min_hard_iron_samples.max(HARD_IRON_MIN_SAMPLES),
        }
    }

    pub fn min_samples(&self, mode: CalibrationMode) -> usize {
        match mode {
            CalibrationMode::EarthField => self.min_earth_field_samples,
            CalibrationMode::HardIron => self.min_hard_iron_samples,
        }
    }

    /// Run the procedure for `mode`. The returned range is `0..samples.len()`;
    /// callers working in session indices overwrite it.
    pub fn calibrate(&self, mode: CalibrationMode, samples: &[Vec3]) -> FusionResult<CalibrationResult> {
        let need = self.min_samples(mode);
        if samples.len() < need {
            return Err(FusionError::InsufficientCalibrationSamples {
                mode,
                got: samples.len(),
                need,
            });
        }

        let result = match mode {
            CalibrationMode::EarthField => earth_field(samples)?,
            CalibrationMode::HardIron => hard_iron(samples)?,
        };
        debug!("{} calibration over {} samples: quality {:.3}", mode, samples.len(), result.quality);
        Ok(result)
    }
}

fn mean(samples: &[Vec3]) -> Vec3 {
    samples.iter().fold(Vec3::zeros(), |acc, m| acc + m) / samples.len() as f64
}

/// Mean absolute deviation of `values` around `center`.
fn mean_abs_deviation(values: impl Iterator<Item = f64>, center: f64) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + (v - center).abs(), n + 1));
    sum / n.max(1) as f64
}

fn quality(avg_deviation: f64, magnitude: f64) -> f64 {
    (1.0 - avg_deviation / magnitude).clamp(0.0, 1.0)
}

fn earth_field(samples: &[Vec3]) -> FusionResult<CalibrationResult> {
    let reference = mean(samples);
    let magnitude = reference.norm();
    if magnitude < MIN_FIELD_MAGNITUDE {
        return Err(FusionError::DegenerateCalibration {
            mode: CalibrationMode::EarthField,
            reason: "mean field is zero",
        });
    }

    let avg_deviation = mean_abs_deviation(samples.iter().map(|m| m.norm()), magnitude);

    Ok(CalibrationResult {
        kind: CalibrationKind::EarthField { reference },
        quality: quality(avg_deviation, magnitude),
        magnitude: Some(magnitude),
        avg_deviation: Some(avg_deviation),
        sample_count: samples.len() as u32,
        start_sample: 0,
        end_sample: samples.len() as u32,
    })
}

fn hard_iron(samples: &[Vec3]) -> FusionResult<CalibrationResult> {
    let degenerate = |reason| FusionError::DegenerateCalibration {
        mode: CalibrationMode::HardIron,
        reason,
    };

    // Centre on the centroid so the normal equations stay well scaled.
    let centroid = mean(samples);
    let mut ata = SphereFitMat::zeros();
    let mut aty = SphereFitVec::zeros();
    for m in samples {
        let p = m - centroid;
        let row = SphereFitVec::new(2.0 * p.x, 2.0 * p.y, 2.0 * p.z, 1.0);
        ata += row * row.transpose();
        aty += row * p.norm_squared();
    }

    let eigenvalues = ata.symmetric_eigenvalues();
    let (lo, hi) = (eigenvalues.min(), eigenvalues.max());
    if !(hi > 0.0) || lo <= hi * SPHERE_FIT_CONDITION {
        return Err(degenerate("samples do not span enough orientations"));
    }

    let solution = ata
        .cholesky()
        .ok_or_else(|| degenerate("normal matrix is not positive definite"))?
        .solve(&aty);

    let center = Vec3::new(solution[0], solution[1], solution[2]);
    let radius_sq = solution[3] + center.norm_squared();
    if !(radius_sq > 0.0) {
        return Err(degenerate("fitted radius is not positive"));
    }
    let offset = centroid + center;
    let field_radius = radius_sq.sqrt();

    let radii: Vec<f64> = samples.iter().map(|m| (m - offset).norm()).collect();
    let mean_radius = radii.iter().sum::<f64>() / radii.len() as f64;
    let residual = mean_abs_deviation(radii.iter().copied(), mean_radius);

    Ok(CalibrationResult {
        kind: CalibrationKind::HardIron { offset, field_radius },
        quality: quality(residual, mean_radius),
        magnitude: None,
        avg_deviation: None,
        sample_count: samples.len() as u32,
        start_sample: 0,
        end_sample: samples.len() as u32,
    })
}
