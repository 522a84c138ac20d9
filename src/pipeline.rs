// pipeline.rs: per-session orchestration
//
// One synchronous push API drives every stage in lockstep per sample:
//   SampleBuffer → Windower → OrientationFusion → TrajectoryIntegrator
// with the MagnetometerCalibrator run over buffered ranges named by
// calibration labels. No I/O, no runtime; the host owns transport.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::buffer::{SampleBuffer, DEFAULT_BUFFER_CAPACITY};
use crate::calibration::{
    MagnetometerCalibrator, DEFAULT_EARTH_FIELD_SAMPLES, DEFAULT_HARD_IRON_SAMPLES, EARTH_FIELD_MIN_SAMPLES,
    HARD_IRON_MIN_SAMPLES,
};
use crate::error::{FusionError, FusionResult};
use crate::filters::{MagReference, OrientationFusion, OrientationState, DEFAULT_FUSION_GAIN, DEFAULT_MAG_REJECTION};
use crate::session::{SessionKind, SessionResult};
use crate::smoothing::{SmootherKind, DEFAULT_FILTER_TIME_CONSTANT};
use crate::trajectory::{TrajectoryIntegrator, TrajectorySet};
use crate::types::{
    CalibrationKind, CalibrationMode, CalibrationResult, Label, OrientationQuaternion, Sample, Vec3, Window,
    STANDARD_GRAVITY,
};
use crate::windower::{Windower, DEFAULT_WINDOW_DURATION};
use crate::zupt::{DEFAULT_ZUPT_ACCEL_THRESHOLD, DEFAULT_ZUPT_GYRO_THRESHOLD, DEFAULT_ZUPT_QUIESCENCE_PERIOD};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // ── Windowing / buffering ──
    pub window_duration: f64,
    pub buffer_capacity: usize,

    // ── Orientation filter ──
    pub fusion_gain: f64,
    pub mag_rejection: f64,

    // ── ZUPT ──
    pub enable_zupt: bool,
    pub zupt_threshold: f64,
    pub zupt_gyro_threshold: f64,
    pub zupt_quiescence_period: f64,

    // ── Calibration ──
    pub min_earth_field_samples: usize,
    pub min_hard_iron_samples: usize,

    // ── Trajectory ──
    pub gravity: f64,
    pub trajectory_filter_time_constant: f64,
    pub trajectory_smoother: SmootherKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_duration: DEFAULT_WINDOW_DURATION,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            fusion_gain: DEFAULT_FUSION_GAIN,
            mag_rejection: DEFAULT_MAG_REJECTION,
            enable_zupt: true,
            zupt_threshold: DEFAULT_ZUPT_ACCEL_THRESHOLD,
            zupt_gyro_threshold: DEFAULT_ZUPT_GYRO_THRESHOLD,
            zupt_quiescence_period: DEFAULT_ZUPT_QUIESCENCE_PERIOD,
            min_earth_field_samples: DEFAULT_EARTH_FIELD_SAMPLES,
            min_hard_iron_samples: DEFAULT_HARD_IRON_SAMPLES,
            gravity: STANDARD_GRAVITY,
            trajectory_filter_time_constant: DEFAULT_FILTER_TIME_CONSTANT,
            trajectory_smoother: SmootherKind::Exponential,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> FusionResult<()> {
        let positive = [
            ("window_duration", self.window_duration),
            ("fusion_gain", self.fusion_gain),
            ("mag_rejection", self.mag_rejection),
            ("zupt_threshold", self.zupt_threshold),
            ("zupt_gyro_threshold", self.zupt_gyro_threshold),
            ("zupt_quiescence_period", self.zupt_quiescence_period),
            ("gravity", self.gravity),
            ("trajectory_filter_time_constant", self.trajectory_filter_time_constant),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(FusionError::InvalidConfig { field, value });
            }
        }
        if self.buffer_capacity == 0 {
            return Err(FusionError::InvalidConfig { field: "buffer_capacity", value: 0.0 });
        }
        if self.trajectory_smoother == SmootherKind::HannWindow(0) {
            return Err(FusionError::InvalidConfig { field: "trajectory_smoother", value: 0.0 });
        }
        Ok(())
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    WindowClosed(Window),
    CalibrationCompleted(CalibrationResult),
    CalibrationSkipped { mode: CalibrationMode, start_sample: u32, end_sample: u32, reason: FusionError },
    ZuptEngaged { t: f64 },
    ZuptReleased { t: f64 },
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
struct PendingCalibration {
    mode: CalibrationMode,
    start_sample: u32,
    end_sample: u32,
}

pub struct SessionPipeline {
    config: PipelineConfig,
    kind: SessionKind,

    buffer: SampleBuffer,
    windower: Windower,
    calibrator: MagnetometerCalibrator,
    fusion: OrientationFusion,
    integrator: TrajectoryIntegrator,

    windows: Vec<Window>,
    calibration_results: Vec<CalibrationResult>,
    labels: Vec<Label>,
    pending: Vec<PendingCalibration>,
    queued_events: Vec<PipelineEvent>,

    // Latest calibration of each kind, in resolution order
    earth_field_magnitude: Option<f64>,
    hard_iron: Option<(Vec3, f64)>,

    first_t: Option<f64>,
    last_t: Option<f64>,
    rejected_samples: u32,
}

impl SessionPipeline {
    pub fn new(config: PipelineConfig, kind: SessionKind) -> FusionResult<Self> {
        config.validate()?;
        if config.min_earth_field_samples < EARTH_FIELD_MIN_SAMPLES {
            warn!(
                "min_earth_field_samples {} raised to {}",
                config.min_earth_field_samples, EARTH_FIELD_MIN_SAMPLES
            );
        }
        if config.min_hard_iron_samples < HARD_IRON_MIN_SAMPLES {
            warn!("min_hard_iron_samples {} raised to {}", config.min_hard_iron_samples, HARD_IRON_MIN_SAMPLES);
        }

        let mut fusion = OrientationFusion::new(config.fusion_gain);
        fusion.set_mag_rejection(config.mag_rejection);

        Ok(Self {
            buffer: SampleBuffer::with_capacity(config.buffer_capacity),
            windower: Windower::new(config.window_duration),
            calibrator: MagnetometerCalibrator::new(config.min_earth_field_samples, config.min_hard_iron_samples),
            fusion,
            integrator: TrajectoryIntegrator::new(&config),
            windows: Vec::new(),
            calibration_results: Vec::new(),
            labels: Vec::new(),
            pending: Vec::new(),
            queued_events: Vec::new(),
            earth_field_magnitude: None,
            hard_iron: None,
            first_t: None,
            last_t: None,
            rejected_samples: 0,
            config,
            kind,
        })
    }

    /// Record a label. Calibration labels are routed to the calibrator as
    /// soon as their whole range has been received.
    pub fn add_label(&mut self, label: Label) -> FusionResult<()> {
        label.validate()?;
        if let Some(mode) = label.calibration_mode() {
            self.pending.push(PendingCalibration {
                mode,
                start_sample: label.start_sample,
                end_sample: label.end_sample,
            });
            let events = self.resolve_due_calibrations();
            self.queued_events.extend(events);
        }
        self.labels.push(label);
        Ok(())
    }

    /// Feed one sample through every stage.
    ///
    /// A rejected sample leaves the pipeline untouched apart from the
    /// rejection counter; callers keep pushing.
    pub fn push_sample(&mut self, sample: Sample) -> FusionResult<Vec<PipelineEvent>> {
        let dt = match self.admit(&sample) {
            Ok(dt) => dt,
            Err(e) => {
                self.rejected_samples += 1;
                warn!("sample rejected: {}", e);
                return Err(e);
            }
        };

        let mut events = std::mem::take(&mut self.queued_events);
        self.buffer.push(sample)?;

        if let Some(window) = self.windower.push(&sample)? {
            self.windows.push(window.clone());
            events.push(PipelineEvent::WindowClosed(window));
        }

        match dt {
            Some(dt) => {
                let q = self.fusion.update(&sample, dt)?;
                let step = self.integrator.step(&sample, &q, dt)?;
                if step.zupt_changed {
                    events.push(if step.quiescent {
                        PipelineEvent::ZuptEngaged { t: sample.t }
                    } else {
                        PipelineEvent::ZuptReleased { t: sample.t }
                    });
                }
            }
            None => {
                self.integrator.begin(&sample);
                self.first_t = Some(sample.t);
            }
        }
        self.last_t = Some(sample.t);

        events.extend(self.resolve_due_calibrations());
        Ok(events)
    }

    /// Validate before any stage mutates; returns `dt` to the previous sample.
    fn admit(&self, sample: &Sample) -> FusionResult<Option<f64>> {
        sample.validate()?;
        let Some(previous) = self.last_t else {
            return Ok(None);
        };
        if sample.t <= previous {
            return Err(FusionError::NonMonotonicTimestamp { t: sample.t, previous });
        }
        let dt = sample.t - previous;
        if !dt.is_finite() {
            return Err(FusionError::InvalidTimeStep(dt));
        }
        Ok(Some(dt))
    }

    /// Close the open window and resolve every outstanding calibration
    /// label against whatever has been received.
    pub fn flush(&mut self) -> Vec<PipelineEvent> {
        let mut events = std::mem::take(&mut self.queued_events);
        if let Some(window) = self.windower.flush() {
            self.windows.push(window.clone());
            events.push(PipelineEvent::WindowClosed(window));
        }

        let received = self.buffer.next_index();
        for pending in std::mem::take(&mut self.pending) {
            if pending.end_sample > received {
                warn!(
                    "{} label {}..{} ends past the last sample ({}), clipping",
                    pending.mode, pending.start_sample, pending.end_sample, received
                );
            }
            events.push(self.run_calibration(pending));
        }
        events
    }

    /// Flush and hand over the session's results.
    pub fn finish(mut self) -> SessionResult {
        self.flush();

        let duration = match (self.first_t, self.last_t) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        let trajectories = self.integrator.into_trajectories();
        let statistics = trajectories.statistics();

        info!(
            "{:?} session finished: {} samples ({} rejected), {:.2}s, {} windows, {} calibrations",
            self.kind,
            self.buffer.next_index(),
            self.rejected_samples,
            duration,
            self.windows.len(),
            self.calibration_results.len()
        );

        SessionResult {
            kind: self.kind,
            windows: self.windows,
            calibration_results: self.calibration_results,
            trajectories,
            statistics,
            duration,
            labels: self.labels,
            sample_count: self.buffer.next_index(),
            rejected_samples: self.rejected_samples,
        }
    }

    fn resolve_due_calibrations(&mut self) -> Vec<PipelineEvent> {
        let received = self.buffer.next_index();
        let (due, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|p| p.end_sample <= received);
        self.pending = waiting;
        due.into_iter().map(|pending| self.run_calibration(pending)).collect()
    }

    fn run_calibration(&mut self, pending: PendingCalibration) -> PipelineEvent {
        let retained = self.buffer.retained();
        let start = pending.start_sample.max(retained.start);
        let end = pending.end_sample.min(retained.end).max(start);
        if start > pending.start_sample {
            warn!(
                "{} label {}..{}: samples before {} no longer buffered",
                pending.mode, pending.start_sample, pending.end_sample, start
            );
        }

        let mags: Vec<Vec3> = self.buffer.range(start, end).map(|s| s.mag).collect();
        match self.calibrator.calibrate(pending.mode, &mags) {
            Ok(mut result) => {
                result.start_sample = start;
                result.end_sample = end;
                info!(
                    "{} calibration over {}..{}: quality {:.3} from {} samples",
                    result.mode(),
                    start,
                    end,
                    result.quality,
                    result.sample_count
                );
                self.apply_calibration(&result);
                let key = (result.start_sample, result.end_sample);
                let at = self
                    .calibration_results
                    .partition_point(|r| (r.start_sample, r.end_sample) <= key);
                self.calibration_results.insert(at, result.clone());
                PipelineEvent::CalibrationCompleted(result)
            }
            Err(reason) => {
                warn!(
                    "{} label {}..{} skipped: {}",
                    pending.mode, pending.start_sample, pending.end_sample, reason
                );
                PipelineEvent::CalibrationSkipped {
                    mode: pending.mode,
                    start_sample: pending.start_sample,
                    end_sample: pending.end_sample,
                    reason,
                }
            }
        }
    }

    /// Each kind only replaces what it owns: earth-field sets the expected
    /// field strength, hard-iron sets the offset (and its own radius).
    fn apply_calibration(&mut self, result: &CalibrationResult) {
        match result.kind {
            CalibrationKind::EarthField { .. } => {
                self.earth_field_magnitude = result.magnitude;
            }
            CalibrationKind::HardIron { offset, field_radius } => {
                self.hard_iron = Some((offset, field_radius));
                self.integrator.set_hard_iron_offset(offset, field_radius);
            }
        }

        let reference = MagReference {
            hard_iron_offset: self.hard_iron.map(|(offset, _)| offset),
            expected_magnitude: self.hard_iron.map(|(_, radius)| radius).or(self.earth_field_magnitude),
        };
        debug!("fused filter mag reference now {:?}", reference);
        self.fusion.set_mag_reference(reference);
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn calibration_results(&self) -> &[CalibrationResult] {
        &self.calibration_results
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn trajectories(&self) -> &TrajectorySet {
        self.integrator.trajectories()
    }

    pub fn orientation(&self) -> OrientationQuaternion {
        self.fusion.quaternion()
    }

    pub fn orientation_state(&self) -> OrientationState {
        self.fusion.get_state()
    }

    pub fn is_quiescent(&self) -> bool {
        self.integrator.is_quiescent()
    }

    pub fn sample_count(&self) -> u32 {
        self.buffer.next_index()
    }

    pub fn rejected_samples(&self) -> u32 {
        self.rejected_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest(t: f64) -> Sample {
        Sample::new(t, Vec3::new(0.0, 0.0, 9.81), Vec3::zeros(), Vec3::new(30.0, 0.0, -40.0))
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let config = PipelineConfig { window_duration: 0.0, ..PipelineConfig::default() };
        assert_eq!(
            config.validate(),
            Err(FusionError::InvalidConfig { field: "window_duration", value: 0.0 })
        );

        let config = PipelineConfig { fusion_gain: f64::NAN, ..PipelineConfig::default() };
        assert!(SessionPipeline::new(config, SessionKind::Recording).is_err());

        let config = PipelineConfig { trajectory_smoother: SmootherKind::HannWindow(0), ..PipelineConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_from_json() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "window_duration": 0.5, "enable_zupt": false, "trajectory_smoother": { "hann_window": 9 } }"#,
        )
        .unwrap();
        assert_eq!(config.window_duration, 0.5);
        assert!(!config.enable_zupt);
        assert_eq!(config.trajectory_smoother, SmootherKind::HannWindow(9));
        assert_eq!(config.fusion_gain, DEFAULT_FUSION_GAIN);
    }

    #[test]
    fn test_window_events() {
        let mut pipeline = SessionPipeline::new(PipelineConfig::default(), SessionKind::Streaming).unwrap();
        let mut closed = 0;
        for i in 0..25 {
            let events = pipeline.push_sample(rest(i as f64 * 0.1)).unwrap();
            closed += events.iter().filter(|e| matches!(e, PipelineEvent::WindowClosed(_))).count();
        }
        assert_eq!(closed, 2);

        let events = pipeline.flush();
        assert!(matches!(&events[..], [PipelineEvent::WindowClosed(w)] if w.partial && w.sample_count == 5));
    }

    #[test]
    fn test_rejected_sample_does_not_advance() {
        let mut pipeline = SessionPipeline::new(PipelineConfig::default(), SessionKind::Recording).unwrap();
        pipeline.push_sample(rest(0.0)).unwrap();
        pipeline.push_sample(rest(0.1)).unwrap();

        assert!(matches!(
            pipeline.push_sample(rest(0.05)),
            Err(FusionError::NonMonotonicTimestamp { .. })
        ));
        let mut bad = rest(0.2);
        bad.gyro.y = f64::NAN;
        assert!(matches!(
            pipeline.push_sample(bad),
            Err(FusionError::NonFiniteSample { field: "gyro", .. })
        ));

        pipeline.push_sample(rest(0.2)).unwrap();
        assert_eq!(pipeline.sample_count(), 3);
        assert_eq!(pipeline.rejected_samples(), 2);
        assert_eq!(pipeline.trajectories().len(), 3);
    }

    #[test]
    fn test_label_for_received_range_calibrates_on_next_event() {
        let mut pipeline = SessionPipeline::new(PipelineConfig::default(), SessionKind::Calibration).unwrap();
        for i in 0..15 {
            pipeline.push_sample(rest(i as f64 * 0.1)).unwrap();
        }
        pipeline
            .add_label(Label::calibration(0, 12, CalibrationMode::EarthField))
            .unwrap();
        assert_eq!(pipeline.calibration_results().len(), 1);

        let events = pipeline.push_sample(rest(1.5)).unwrap();
        assert!(matches!(&events[0], PipelineEvent::CalibrationCompleted(r) if r.end_sample == 12));
    }

    #[test]
    fn test_invalid_label_rejected() {
        let mut pipeline = SessionPipeline::new(PipelineConfig::default(), SessionKind::Recording).unwrap();
        assert_eq!(
            pipeline.add_label(Label::new(5, 5)),
            Err(FusionError::InvalidLabelRange { start: 5, end: 5 })
        );
        assert!(pipeline.labels().is_empty());
    }
}
