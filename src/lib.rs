//! Sensor-fusion and calibration core for the puck 9-axis IMU.
//!
//! Feed timestamped accel/gyro/mag samples and optional labels into a
//! [`SessionPipeline`]; read back fixed-duration [`Window`] statistics,
//! magnetometer [`CalibrationResult`]s and four dead-reckoned trajectories
//! (raw, iron, fused, filtered) as a [`SessionResult`].
//!
//! ```no_run
//! use puck_fusion::{PipelineConfig, Sample, SessionKind, SessionPipeline, Vec3};
//!
//! let mut pipeline = SessionPipeline::new(PipelineConfig::default(), SessionKind::Recording)?;
//! for i in 0..30 {
//!     let t = i as f64 * 0.1;
//!     let sample = Sample::new(t, Vec3::new(0.0, 0.0, 9.81), Vec3::zeros(), Vec3::new(30.0, 0.0, -40.0));
//!     if let Err(e) = pipeline.push_sample(sample) {
//!         eprintln!("dropped: {e}");
//!     }
//! }
//! let result = pipeline.finish();
//! println!("{} windows, drift {:?}", result.windows.len(), result.statistics.endpoint_drift);
//! # Ok::<(), puck_fusion::FusionError>(())
//! ```

pub mod buffer;
pub mod calibration;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod session;
pub mod smoothing;
pub mod trajectory;
pub mod types;
pub mod windower;
pub mod zupt;

#[cfg(test)]
mod scenario_tests;

pub use buffer::SampleBuffer;
pub use calibration::MagnetometerCalibrator;
pub use error::{FusionError, FusionResult};
pub use filters::{OrientationFusion, OrientationState};
pub use pipeline::{PipelineConfig, PipelineEvent, SessionPipeline};
pub use session::{SessionKind, SessionResult};
pub use smoothing::SmootherKind;
pub use trajectory::{TrajectoryIntegrator, TrajectorySet, TrajectoryStatistics, TrajectoryVariant};
pub use types::{
    CalibrationKind, CalibrationMode, CalibrationResult, Label, OrientationQuaternion, Sample, TrajectoryPoint, Vec3,
    Window,
};
pub use windower::Windower;
pub use zupt::StationaryDetector;
