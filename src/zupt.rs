use crate::types::Sample;

pub const DEFAULT_ZUPT_ACCEL_THRESHOLD: f64 = 0.3; // m/s² band around gravity
pub const DEFAULT_ZUPT_GYRO_THRESHOLD: f64 = 0.1; // rad/s
pub const DEFAULT_ZUPT_QUIESCENCE_PERIOD: f64 = 0.5; // seconds

/// Detects stationary periods for zero-velocity updates.
///
/// A sample is "still" when `| ‖accel‖ − g |` and `‖gyro‖` are both under
/// their thresholds. The detector is quiescent once samples have been still
/// continuously for longer than `quiescence_period`.
pub struct StationaryDetector {
    gravity: f64,
    accel_threshold: f64,
    gyro_threshold: f64,
    quiescence_period: f64,
    still_since: Option<f64>,
    quiescent: bool,
}

impl StationaryDetector {
    pub fn new(gravity: f64, accel_threshold: f64, gyro_threshold: f64, quiescence_period: f64) -> Self {
        Self {
            gravity,
            accel_threshold,
            gyro_threshold,
            quiescence_period,
            still_since: None,
            quiescent: false,
        }
    }

    pub fn is_still(&self, sample: &Sample) -> bool {
        (sample.accel.norm() - self.gravity).abs() < self.accel_threshold
            && sample.gyro.norm() < self.gyro_threshold
    }

    /// Feed the next sample; returns whether the device is now quiescent.
    pub fn update(&mut self, sample: &Sample) -> bool {
        if self.is_still(sample) {
            let since = *self.still_since.get_or_insert(sample.t);
            self.quiescent = sample.t - since > self.quiescence_period;
        } else {
            self.still_since = None;
            self.quiescent = false;
        }
        self.quiescent
    }

    pub fn is_quiescent(&self) -> bool {
        self.quiescent
    }

    /// Seconds of continuous stillness up to `now`.
    pub fn still_duration(&self, now: f64) -> f64 {
        self.still_since.map(|since| (now - since).max(0.0)).unwrap_or(0.0)
    }
}
