use log::debug;

use crate::error::{FusionError, FusionResult};
use crate::types::{Sample, Window};

pub const DEFAULT_WINDOW_DURATION: f64 = 1.0; // seconds

struct OpenWindow {
    slot: u32,
    time_start: f64,
    time_end: f64,
    sample_count: u32,
    accel_mag_sum: f64,
    gyro_mag_sum: f64,
}

impl OpenWindow {
    fn close(self, partial: bool) -> Window {
        let n = self.sample_count.max(1) as f64;
        Window {
            index: self.slot,
            time_start: self.time_start,
            time_end: self.time_end,
            sample_count: self.sample_count,
            accel_mag_mean: self.accel_mag_sum / n,
            gyro_mag_mean: self.gyro_mag_sum / n,
            partial,
        }
    }
}

/// Slices the sample stream into fixed-duration, non-overlapping windows.
///
/// Windows sit on a grid anchored at the first sample: slot `k` covers
/// `[t0 + k·d, t0 + (k+1)·d)`. Membership is decided against exactly those
/// boundary values, so every counted sample satisfies `Window::contains`.
/// A window closes when a sample reaches its `time_end`; slots that receive
/// no samples emit nothing.
pub struct Windower {
    window_duration: f64,
    origin: Option<f64>,
    open: Option<OpenWindow>,
    last_t: Option<f64>,
}

impl Windower {
    /// `window_duration` must be positive and finite (checked by `PipelineConfig::validate`).
    pub fn new(window_duration: f64) -> Self {
        Self {
            window_duration,
            origin: None,
            open: None,
            last_t: None,
        }
    }

    pub fn window_duration(&self) -> f64 {
        self.window_duration
    }

    /// Add a sample; returns the window it closed, if any.
    pub fn push(&mut self, sample: &Sample) -> FusionResult<Option<Window>> {
        sample.validate()?;
        if let Some(previous) = self.last_t {
            if sample.t <= previous {
                return Err(FusionError::NonMonotonicTimestamp { t: sample.t, previous });
            }
        }
        self.last_t = Some(sample.t);

        let origin = *self.origin.get_or_insert(sample.t);

        let closed = match self.open.take() {
            Some(open) if sample.t >= open.time_end => Some(open.close(false)),
            Some(open) => {
                self.open = Some(open);
                None
            }
            None => None,
        };

        if self.open.is_none() {
            let slot = self.slot_for(origin, sample.t);
            self.open = Some(OpenWindow {
                slot,
                time_start: self.boundary(origin, slot),
                time_end: self.boundary(origin, slot + 1),
                sample_count: 0,
                accel_mag_sum: 0.0,
                gyro_mag_sum: 0.0,
            });
        }
        if let Some(open) = self.open.as_mut() {
            open.sample_count += 1;
            open.accel_mag_sum += sample.accel.norm();
            open.gyro_mag_sum += sample.gyro.norm();
        }

        if let Some(ref w) = closed {
            debug!(
                "window {} closed: {} samples, |a|={:.3}, |w|={:.3}",
                w.index, w.sample_count, w.accel_mag_mean, w.gyro_mag_mean
            );
        }
        Ok(closed)
    }

    /// Start of grid slot `slot`.
    fn boundary(&self, origin: f64, slot: u32) -> f64 {
        origin + slot as f64 * self.window_duration
    }

    /// Slot whose `[boundary(k), boundary(k+1))` holds `t` (`t >= origin`).
    fn slot_for(&self, origin: f64, t: f64) -> u32 {
        let mut slot = ((t - origin) / self.window_duration).floor().max(0.0) as u32;
        while slot > 0 && self.boundary(origin, slot) > t {
            slot -= 1;
        }
        while self.boundary(origin, slot + 1) <= t {
            slot += 1;
        }
        slot
    }

    /// Close whatever window is open, even if it has not reached full duration.
    pub fn flush(&mut self) -> Option<Window> {
        let window = self.open.take()?.close(true);
        debug!("window {} flushed with {} samples", window.index, window.sample_count);
        Some(window)
    }
}
