//! Dead-reckoned trajectories
//!
//! Four position tracks share one time axis:
//! - raw: gyro-only attitude, no drift compensation
//! - iron: gyro attitude with hard-iron corrected magnetometer heading
//! - fused: attitude from the session's `OrientationFusion`
//! - filtered: causal smoothing of the fused track
//!
//! Every variant double-integrates world-frame linear acceleration
//! (`R·a − g`). When enabled, zero-velocity updates clamp velocity to zero
//! while the device is quiescent.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, FusionResult};
use crate::filters::{MagReference, OrientationFusion};
use crate::pipeline::PipelineConfig;
use crate::smoothing::PositionSmoother;
use crate::types::{OrientationQuaternion, Sample, TrajectoryPoint, VariantPositions, Vec3, VARIANT_COUNT};
use crate::zupt::StationaryDetector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryVariant {
    Raw,
    Iron,
    Fused,
    Filtered,
}

impl TrajectoryVariant {
    pub const ALL: [TrajectoryVariant; VARIANT_COUNT] = [
        TrajectoryVariant::Raw,
        TrajectoryVariant::Iron,
        TrajectoryVariant::Fused,
        TrajectoryVariant::Filtered,
    ];

    pub fn index(self) -> usize {
        match self {
            TrajectoryVariant::Raw => 0,
            TrajectoryVariant::Iron => 1,
            TrajectoryVariant::Fused => 2,
            TrajectoryVariant::Filtered => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TrajectoryVariant::Raw => "raw",
            TrajectoryVariant::Iron => "iron",
            TrajectoryVariant::Fused => "fused",
            TrajectoryVariant::Filtered => "filtered",
        }
    }
}

/// All four variants at one timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinedPoint {
    pub t: f64,
    pub positions: VariantPositions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStatistics {
    /// Largest distance between any two variants at a shared timestamp.
    pub max_deviation: f64,
    pub max_deviation_t: Option<f64>,
    /// Distance from first to last point, per variant (indexed by `TrajectoryVariant::index`).
    pub endpoint_drift: [f64; VARIANT_COUNT],
    pub path_length: [f64; VARIANT_COUNT],
}

/// Struct-of-arrays: the four tracks always have equal length and equal timestamps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySet {
    tracks: [Vec<TrajectoryPoint>; VARIANT_COUNT],
}

impl TrajectorySet {
    pub fn get(&self, variant: TrajectoryVariant) -> &[TrajectoryPoint] {
        &self.tracks[variant.index()]
    }

    pub fn raw(&self) -> &[TrajectoryPoint] {
        self.get(TrajectoryVariant::Raw)
    }

    pub fn iron(&self) -> &[TrajectoryPoint] {
        self.get(TrajectoryVariant::Iron)
    }

    pub fn fused(&self) -> &[TrajectoryPoint] {
        self.get(TrajectoryVariant::Fused)
    }

    pub fn filtered(&self) -> &[TrajectoryPoint] {
        self.get(TrajectoryVariant::Filtered)
    }

    pub fn len(&self) -> usize {
        self.tracks[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks[0].is_empty()
    }

    pub fn push_step(&mut self, t: f64, positions: VariantPositions) {
        for (track, position) in self.tracks.iter_mut().zip(positions) {
            track.push(TrajectoryPoint { t, position });
        }
    }

    pub fn combined(&self) -> Vec<CombinedPoint> {
        (0..self.len())
            .map(|i| CombinedPoint {
                t: self.tracks[0][i].t,
                positions: std::array::from_fn(|v| self.tracks[v][i].position),
            })
            .collect()
    }

    pub fn statistics(&self) -> TrajectoryStatistics {
        let mut stats = TrajectoryStatistics::default();

        for point in self.combined() {
            for a in 0..VARIANT_COUNT {
                for b in (a + 1)..VARIANT_COUNT {
                    let deviation = (point.positions[a] - point.positions[b]).norm();
                    if deviation > stats.max_deviation {
                        stats.max_deviation = deviation;
                        stats.max_deviation_t = Some(point.t);
                    }
                }
            }
        }

        for (v, track) in self.tracks.iter().enumerate() {
            if let (Some(first), Some(last)) = (track.first(), track.last()) {
                stats.endpoint_drift[v] = (last.position - first.position).norm();
            }
            stats.path_length[v] = track
                .windows(2)
                .map(|pair| (pair[1].position - pair[0].position).norm())
                .sum();
        }
        stats
    }
}

/// Per-step output of the integrator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrajectoryStep {
    pub t: f64,
    pub deltas: VariantPositions,
    pub positions: VariantPositions,
    pub quiescent: bool,
    /// Quiescence flipped on this step.
    pub zupt_changed: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct DeadReckoner {
    velocity: Vec3,
    position: Vec3,
}

impl DeadReckoner {
    fn accelerate(&mut self, world_accel: Vec3, dt: f64) {
        self.velocity += world_accel * dt;
    }

    fn zero_velocity(&mut self) {
        self.velocity = Vec3::zeros();
    }

    fn advance(&mut self, dt: f64) -> Vec3 {
        let delta = self.velocity * dt;
        self.position += delta;
        delta
    }
}

const RAW: usize = 0;
const IRON: usize = 1;
const FUSED: usize = 2;
const FILTERED: usize = 3;

pub struct TrajectoryIntegrator {
    gravity: Vec3,
    raw_attitude: OrientationFusion,
    iron_attitude: OrientationFusion,
    reckoners: [DeadReckoner; 3],
    smoother: PositionSmoother,
    filtered_position: Vec3,
    zupt: Option<StationaryDetector>,
    quiescent: bool,
    trajectories: TrajectorySet,
}

impl TrajectoryIntegrator {
    pub fn new(config: &PipelineConfig) -> Self {
        let mut iron_attitude = OrientationFusion::heading_only(config.fusion_gain);
        iron_attitude.set_mag_rejection(config.mag_rejection);

        let zupt = config.enable_zupt.then(|| {
            StationaryDetector::new(
                config.gravity,
                config.zupt_threshold,
                config.zupt_gyro_threshold,
                config.zupt_quiescence_period,
            )
        });

        Self {
            gravity: Vec3::new(0.0, 0.0, config.gravity),
            raw_attitude: OrientationFusion::gyro_only(),
            iron_attitude,
            reckoners: [DeadReckoner::default(); 3],
            smoother: PositionSmoother::new(config.trajectory_smoother, config.trajectory_filter_time_constant),
            filtered_position: Vec3::zeros(),
            zupt,
            quiescent: false,
            trajectories: TrajectorySet::default(),
        }
    }

    /// Anchor every track at the origin on the session's first sample.
    pub fn begin(&mut self, sample: &Sample) {
        if let Some(zupt) = self.zupt.as_mut() {
            self.quiescent = zupt.update(sample);
        }
        self.filtered_position = self.smoother.apply(Vec3::zeros(), 0.0);
        self.trajectories.push_step(sample.t, [Vec3::zeros(); VARIANT_COUNT]);
    }

    /// Hard-iron correction for the iron attitude's heading reference.
    pub fn set_hard_iron_offset(&mut self, offset: Vec3, field_radius: f64) {
        self.iron_attitude.set_mag_reference(MagReference {
            hard_iron_offset: Some(offset),
            expected_magnitude: (field_radius > 0.0).then_some(field_radius),
        });
    }

    /// Integrate one sample into all four tracks.
    pub fn step(&mut self, sample: &Sample, fused: &OrientationQuaternion, dt: f64) -> FusionResult<TrajectoryStep> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(FusionError::InvalidTimeStep(dt));
        }
        sample.validate()?;

        let raw_q = self.raw_attitude.update(sample, dt)?;
        let iron_q = self.iron_attitude.update(sample, dt)?;

        let was_quiescent = self.quiescent;
        if let Some(zupt) = self.zupt.as_mut() {
            self.quiescent = zupt.update(sample);
        }
        let zupt_changed = was_quiescent != self.quiescent;
        if zupt_changed {
            debug!("zupt {} at t={:.3}", if self.quiescent { "engaged" } else { "released" }, sample.t);
        }

        let mut deltas = [Vec3::zeros(); VARIANT_COUNT];
        let mut positions = [Vec3::zeros(); VARIANT_COUNT];
        let attitudes = [raw_q, iron_q, *fused];
        for (i, (reckoner, q)) in self.reckoners.iter_mut().zip(attitudes.iter()).enumerate() {
            reckoner.accelerate(q.transform_vector(&sample.accel) - self.gravity, dt);
            if self.quiescent {
                reckoner.zero_velocity();
            }
            deltas[i] = reckoner.advance(dt);
            positions[i] = reckoner.position;
        }

        let filtered = self.smoother.apply(positions[FUSED], dt);
        deltas[FILTERED] = filtered - self.filtered_position;
        positions[FILTERED] = filtered;
        self.filtered_position = filtered;

        self.trajectories.push_step(sample.t, positions);

        Ok(TrajectoryStep {
            t: sample.t,
            deltas,
            positions,
            quiescent: self.quiescent,
            zupt_changed,
        })
    }

    pub fn is_quiescent(&self) -> bool {
        self.quiescent
    }

    pub fn raw_attitude(&self) -> OrientationQuaternion {
        self.raw_attitude.quaternion()
    }

    pub fn iron_attitude(&self) -> OrientationQuaternion {
        self.iron_attitude.quaternion()
    }

    pub fn position(&self, variant: TrajectoryVariant) -> Vec3 {
        match variant {
            TrajectoryVariant::Raw => self.reckoners[RAW].position,
            TrajectoryVariant::Iron => self.reckoners[IRON].position,
            TrajectoryVariant::Fused => self.reckoners[FUSED].position,
            TrajectoryVariant::Filtered => self.filtered_position,
        }
    }

    pub fn trajectories(&self) -> &TrajectorySet {
        &self.trajectories
    }

    pub fn into_trajectories(self) -> TrajectorySet {
        self.trajectories
    }
}
