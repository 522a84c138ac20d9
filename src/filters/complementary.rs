//! Complementary AHRS orientation filter
//!
//! Gyro integration (`q̇ = ½ q ⊗ (0, ω)`, forward Euler) corrected by the
//! accelerometer's gravity direction and, once a magnetometer calibration is
//! available, by the magnetic field direction. The correction is the cross
//! product between measured and expected directions in the body frame, fed
//! back as a small rotation scaled by `gain · dt`.
//!
//! The same filter runs in three configurations:
//! - `OrientationFusion::new`: accel + calibrated mag (the "fused" attitude)
//! - `OrientationFusion::heading_only`: mag only (the "iron" attitude)
//! - `OrientationFusion::gyro_only`: no correction (the "raw" attitude)

use log::debug;
use nalgebra::Quaternion;
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, FusionResult};
use crate::types::{OrientationQuaternion, Sample, Vec3};

pub const DEFAULT_FUSION_GAIN: f64 = 0.5; // 1/s
pub const DEFAULT_MAG_REJECTION: f64 = 0.25; // fraction of expected field strength

const MIN_VECTOR_NORM: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionSources {
    pub accel: bool,
    pub mag: bool,
}

/// What the filter knows about the magnetometer.
///
/// Magnetometer correction only runs while a reference is set.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MagReference {
    /// Subtracted from every raw reading.
    pub hard_iron_offset: Option<Vec3>,
    /// Field strength after correction; readings too far from it are ignored.
    pub expected_magnitude: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrientationState {
    /// Quaternion (w, x, y, z)
    pub quaternion: (f64, f64, f64, f64),
    /// (roll, pitch, yaw) in radians
    pub euler: (f64, f64, f64),
    pub updates: u64,
    pub mag_corrections: u64,
    pub mag_rejections: u64,
}

pub struct OrientationFusion {
    quaternion: OrientationQuaternion,
    gain: f64,
    sources: CorrectionSources,
    mag_reference: Option<MagReference>,
    mag_rejection: f64,

    // Update counters
    updates: u64,
    mag_corrections: u64,
    mag_rejections: u64,
}

impl OrientationFusion {
    /// Accelerometer tilt correction plus magnetometer heading once calibrated.
    pub fn new(gain: f64) -> Self {
        Self::with_sources(gain, CorrectionSources { accel: true, mag: true })
    }

    /// Magnetometer heading correction only; active from the first sample.
    pub fn heading_only(gain: f64) -> Self {
        let mut filter = Self::with_sources(gain, CorrectionSources { accel: false, mag: true });
        filter.mag_reference = Some(MagReference::default());
        filter
    }

    /// Pure gyro integration.
    pub fn gyro_only() -> Self {
        Self::with_sources(0.0, CorrectionSources { accel: false, mag: false })
    }

    pub fn with_sources(gain: f64, sources: CorrectionSources) -> Self {
        Self {
            quaternion: OrientationQuaternion::identity(),
            gain,
            sources,
            mag_reference: None,
            mag_rejection: DEFAULT_MAG_REJECTION,
            updates: 0,
            mag_corrections: 0,
            mag_rejections: 0,
        }
    }

    pub fn set_mag_reference(&mut self, reference: MagReference) {
        debug!(
            "mag reference set: offset={:?} expected={:?}",
            reference.hard_iron_offset.map(|o| (o.x, o.y, o.z)),
            reference.expected_magnitude
        );
        self.mag_reference = Some(reference);
    }

    pub fn mag_reference(&self) -> Option<&MagReference> {
        self.mag_reference.as_ref()
    }

    pub fn set_mag_rejection(&mut self, fraction: f64) {
        self.mag_rejection = fraction;
    }

    /// Predict with the gyro, correct with accel/mag, renormalize.
    ///
    /// A non-positive or non-finite `dt`, or a non-finite sample, is rejected
    /// and leaves the quaternion untouched.
    pub fn update(&mut self, sample: &Sample, dt: f64) -> FusionResult<OrientationQuaternion> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(FusionError::InvalidTimeStep(dt));
        }
        sample.validate()?;

        // Predict: q += ½ q ⊗ (0, ω) dt
        let q = self.quaternion.into_inner();
        let q_dot = q * Quaternion::from_imag(sample.gyro) * 0.5;
        let mut predicted = OrientationQuaternion::new_normalize(q + q_dot * dt);

        // Correct
        let mut error = Vec3::zeros();
        if self.sources.accel {
            if let Some(e) = Self::gravity_error(&predicted, &sample.accel) {
                error += e;
            }
        }
        if self.sources.mag {
            if let Some(e) = self.magnetic_error(&predicted, &sample.mag) {
                error += e;
                self.mag_corrections += 1;
            }
        }
        if self.gain > 0.0 && error.norm_squared() > 0.0 {
            predicted *= OrientationQuaternion::from_scaled_axis(error * (self.gain * dt));
        }

        predicted.renormalize();
        self.quaternion = predicted;
        self.updates += 1;
        Ok(predicted)
    }

    /// Measured × expected "up" direction, both in the body frame.
    fn gravity_error(q: &OrientationQuaternion, accel: &Vec3) -> Option<Vec3> {
        let measured = accel.try_normalize(MIN_VECTOR_NORM)?;
        let expected = q.inverse_transform_vector(&Vec3::z());
        Some(measured.cross(&expected))
    }

    /// Measured × expected field direction. The expected direction keeps the
    /// measured inclination and points the horizontal part at world +x.
    fn magnetic_error(&mut self, q: &OrientationQuaternion, mag: &Vec3) -> Option<Vec3> {
        let reference = self.mag_reference?;
        let corrected = mag - reference.hard_iron_offset.unwrap_or_else(Vec3::zeros);
        let strength = corrected.norm();
        if strength < MIN_VECTOR_NORM {
            return None;
        }
        if let Some(expected) = reference.expected_magnitude {
            if expected > 0.0 && ((strength - expected) / expected).abs() > self.mag_rejection {
                self.mag_rejections += 1;
                return None;
            }
        }

        let measured = corrected / strength;
        let h = q.transform_vector(&measured);
        let b = Vec3::new(h.x.hypot(h.y), 0.0, h.z);
        let expected = q.inverse_transform_vector(&b);
        Some(measured.cross(&expected))
    }

    pub fn quaternion(&self) -> OrientationQuaternion {
        self.quaternion
    }

    pub fn get_state(&self) -> OrientationState {
        let q = self.quaternion.quaternion();
        OrientationState {
            quaternion: (q.w, q.i, q.j, q.k),
            euler: self.quaternion.euler_angles(),
            updates: self.updates,
            mag_corrections: self.mag_corrections,
            mag_rejections: self.mag_rejections,
        }
    }
}
