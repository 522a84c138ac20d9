//! End-to-end sessions through `SessionPipeline`.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use crate::pipeline::{PipelineConfig, PipelineEvent, SessionPipeline};
use crate::session::{SessionKind, SessionResult};
use crate::trajectory::TrajectoryVariant;
use crate::types::{CalibrationMode, Label, OrientationQuaternion, Sample, Vec3};

const G: f64 = 9.81;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn earth_field() -> Vec3 {
    Vec3::new(22.0, 0.0, -42.0)
}

fn at_rest(t: f64, accel_bias: Vec3) -> Sample {
    Sample::new(t, Vec3::new(0.0, 0.0, G) + accel_bias, Vec3::zeros(), earth_field())
}

/// Readings as the puck is turned by hand: random attitude per sample, field
/// plus a constant hard-iron offset, small accel/gyro noise.
fn tumbling(rng: &mut StdRng, t: f64, offset: Vec3) -> Sample {
    let attitude = OrientationQuaternion::from_euler_angles(
        rng.gen_range(-PI..PI),
        rng.gen_range(-PI / 2.0..PI / 2.0),
        rng.gen_range(-PI..PI),
    );
    let accel = attitude.inverse_transform_vector(&Vec3::new(0.0, 0.0, G));
    let gyro = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
    let mag = attitude.inverse_transform_vector(&earth_field()) + offset;
    Sample::new(t, accel, gyro, mag)
}

fn pipeline(config: PipelineConfig) -> SessionPipeline {
    SessionPipeline::new(config, SessionKind::Recording).unwrap()
}

fn replay(samples: &[Sample], labels: &[Label], config: PipelineConfig) -> SessionResult {
    let mut pipeline = pipeline(config);
    for label in labels {
        pipeline.add_label(label.clone()).unwrap();
    }
    for sample in samples {
        let _ = pipeline.push_sample(*sample);
    }
    pipeline.finish()
}

#[test]
fn test_windows_have_fixed_duration_and_exact_means() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(3);
    let samples: Vec<Sample> = (0..53)
        .map(|i| {
            let t = 0.4 + i as f64 * 0.1 + rng.gen_range(0.0..0.05);
            let accel = Vec3::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0), G);
            let gyro = Vec3::new(0.0, rng.gen_range(-0.5..0.5), 0.0);
            Sample::new(t, accel, gyro, earth_field())
        })
        .collect();

    let result = replay(&samples, &[], PipelineConfig::default());
    assert_eq!(result.windows.len(), 6);
    assert_eq!(result.partial_windows(), 1);
    assert!(result.windows.last().unwrap().partial);

    let total: u32 = result.windows.iter().map(|w| w.sample_count).sum();
    assert_eq!(total, 53);

    for window in &result.windows {
        assert_relative_eq!(window.duration(), 1.0, epsilon = 1e-9);
        let inside: Vec<&Sample> = samples.iter().filter(|s| window.contains(s.t)).collect();
        assert_eq!(inside.len() as u32, window.sample_count);
        let n = inside.len() as f64;
        let accel_mean = inside.iter().map(|s| s.accel.norm()).sum::<f64>() / n;
        let gyro_mean = inside.iter().map(|s| s.gyro.norm()).sum::<f64>() / n;
        assert_relative_eq!(window.accel_mag_mean, accel_mean, epsilon = 1e-9);
        assert_relative_eq!(window.gyro_mag_mean, gyro_mean, epsilon = 1e-9);
    }
}

#[test]
fn test_short_session_yields_one_partial_window() {
    init_logging();
    let samples: Vec<Sample> = (0..3).map(|i| at_rest(i as f64 * 0.1, Vec3::zeros())).collect();
    let result = replay(&samples, &[], PipelineConfig::default());

    assert_eq!(result.windows.len(), 1);
    assert!(result.windows[0].partial);
    assert_eq!(result.windows[0].sample_count, 3);
    assert_relative_eq!(result.duration, 0.2, epsilon = 1e-12);
}

#[test]
fn test_empty_session() {
    let result = pipeline(PipelineConfig::default()).finish();
    assert!(result.windows.is_empty());
    assert!(result.trajectories.is_empty());
    assert_eq!(result.duration, 0.0);
    assert_eq!(result.sample_count, 0);
}

#[test]
fn test_zupt_bounds_raw_drift_at_rest() {
    init_logging();
    // 10 Hz for 30 s with a small uncompensated accelerometer bias.
    let bias = Vec3::new(0.02, 0.0, 0.0);
    let samples: Vec<Sample> = (0..=300).map(|i| at_rest(i as f64 * 0.1, bias)).collect();

    let with_zupt = replay(&samples, &[], PipelineConfig::default());
    let without_zupt = replay(
        &samples,
        &[],
        PipelineConfig {
            enable_zupt: false,
            ..PipelineConfig::default()
        },
    );

    let raw = TrajectoryVariant::Raw.index();
    let bounded = with_zupt.statistics.endpoint_drift[raw];
    let unbounded = without_zupt.statistics.endpoint_drift[raw];
    assert!(bounded < 0.01, "raw drift with zupt: {bounded}");
    assert!(unbounded > bounded);
    assert!(unbounded > 8.0, "raw drift without zupt: {unbounded}");

    for variant in TrajectoryVariant::ALL {
        assert_eq!(with_zupt.trajectories.get(variant).len(), 301);
    }
}

#[test]
fn test_zupt_events() {
    init_logging();
    let mut pipeline = pipeline(PipelineConfig::default());
    let mut engaged = Vec::new();
    let mut released = Vec::new();
    for i in 0..40 {
        let t = i as f64 * 0.1;
        let mut sample = at_rest(t, Vec3::zeros());
        if i == 20 {
            sample.gyro = Vec3::new(0.0, 0.0, 1.0);
        }
        for event in pipeline.push_sample(sample).unwrap() {
            match event {
                PipelineEvent::ZuptEngaged { t } => engaged.push(t),
                PipelineEvent::ZuptReleased { t } => released.push(t),
                _ => {}
            }
        }
    }
    assert_eq!(engaged.len(), 2);
    assert_eq!(released.len(), 1);
    assert_relative_eq!(released[0], 2.0, epsilon = 1e-12);
}

#[test]
fn test_replay_is_deterministic() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(99);
    let offset = Vec3::new(12.0, -7.0, 3.0);
    let mut samples: Vec<Sample> = (0..20).map(|i| at_rest(i as f64 * 0.1, Vec3::zeros())).collect();
    samples.extend((20..80).map(|i| tumbling(&mut rng, i as f64 * 0.1, offset)));
    samples.extend((80..120).map(|i| at_rest(i as f64 * 0.1, Vec3::new(0.3, -0.1, 0.0))));
    let labels = [
        Label::calibration(0, 20, CalibrationMode::EarthField),
        Label::calibration(20, 80, CalibrationMode::HardIron),
    ];

    let first = replay(&samples, &labels, PipelineConfig::default());
    let second = replay(&samples, &labels, PipelineConfig::default());
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.calibration_results.len(), 2);
}

#[test]
fn test_hard_iron_through_pipeline() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(42);
    let offset = Vec3::new(35.0, -18.0, 9.0);
    let mut pipeline = SessionPipeline::new(PipelineConfig::default(), SessionKind::Calibration).unwrap();
    // Label arrives before its samples.
    pipeline.add_label(Label::calibration(0, 40, CalibrationMode::HardIron)).unwrap();

    let mut completed = Vec::new();
    for i in 0..60 {
        let sample = tumbling(&mut rng, i as f64 * 0.1, offset);
        for event in pipeline.push_sample(sample).unwrap() {
            if let PipelineEvent::CalibrationCompleted(result) = event {
                completed.push((i, result));
            }
        }
    }

    assert_eq!(completed.len(), 1);
    let (at, result) = &completed[0];
    assert_eq!(*at, 39);
    assert_eq!((result.start_sample, result.end_sample), (0, 40));
    let estimated = result.hard_iron_offset().unwrap();
    assert!((estimated - offset).norm() < 1e-6);
    assert!(result.quality > 0.999);

    let session = pipeline.finish();
    assert_eq!(session.kind, SessionKind::Calibration);
    assert_eq!(session.hard_iron_offset(), Some(estimated));
    assert_eq!(session.labels.len(), 1);
}

#[test]
fn test_results_ordered_by_range_not_arrival() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(5);
    let offset = Vec3::new(4.0, 4.0, -4.0);
    let mut samples: Vec<Sample> = (0..30).map(|i| tumbling(&mut rng, i as f64 * 0.1, offset)).collect();
    samples.extend((30..50).map(|i| at_rest(i as f64 * 0.1, Vec3::zeros())));

    let mut pipeline = pipeline(PipelineConfig::default());
    for sample in &samples {
        pipeline.push_sample(*sample).unwrap();
    }
    pipeline.add_label(Label::calibration(30, 50, CalibrationMode::EarthField)).unwrap();
    pipeline.add_label(Label::calibration(0, 30, CalibrationMode::HardIron)).unwrap();

    let session = pipeline.finish();
    let modes: Vec<CalibrationMode> = session.calibration_results.iter().map(|r| r.mode()).collect();
    assert_eq!(modes, vec![CalibrationMode::HardIron, CalibrationMode::EarthField]);

    let earth = &session.calibration_results[1];
    assert_relative_eq!(earth.quality, 1.0, epsilon = 1e-12);
    assert_relative_eq!(earth.magnitude.unwrap(), earth_field().norm(), epsilon = 1e-9);
}

#[test]
fn test_insufficient_calibration_samples_yield_no_result() {
    init_logging();
    let mut pipeline = pipeline(PipelineConfig::default());
    pipeline.add_label(Label::calibration(2, 7, CalibrationMode::EarthField)).unwrap();
    pipeline.add_label(Label::calibration(10, 13, CalibrationMode::HardIron)).unwrap();

    let mut skipped = Vec::new();
    for i in 0..20 {
        for event in pipeline.push_sample(at_rest(i as f64 * 0.1, Vec3::zeros())).unwrap() {
            if let PipelineEvent::CalibrationSkipped { mode, .. } = event {
                skipped.push(mode);
            }
        }
    }

    assert_eq!(skipped, vec![CalibrationMode::EarthField, CalibrationMode::HardIron]);
    let session = pipeline.finish();
    assert!(session.calibration_results.is_empty());
    assert_eq!(session.labels.len(), 2);
}

#[test]
fn test_label_past_end_is_clipped_at_flush() {
    init_logging();
    let mut pipeline = pipeline(PipelineConfig::default());
    pipeline.add_label(Label::calibration(5, 500, CalibrationMode::EarthField)).unwrap();
    for i in 0..25 {
        pipeline.push_sample(at_rest(i as f64 * 0.1, Vec3::zeros())).unwrap();
    }
    assert!(pipeline.calibration_results().is_empty());

    let events = pipeline.flush();
    let result = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::CalibrationCompleted(r) => Some(r.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!((result.start_sample, result.end_sample), (5, 25));
    assert_eq!(result.sample_count, 20);
}

#[test]
fn test_bad_samples_do_not_abort_session() {
    init_logging();
    let mut pipeline = pipeline(PipelineConfig::default());
    for i in 0..30 {
        let t = i as f64 * 0.1;
        let mut sample = at_rest(t, Vec3::zeros());
        if i % 10 == 5 {
            sample.mag.z = f64::INFINITY;
        }
        let _ = pipeline.push_sample(sample);
        if i == 12 {
            // Duplicate timestamp
            assert!(pipeline.push_sample(at_rest(t, Vec3::zeros())).is_err());
        }
    }

    let session = pipeline.finish();
    assert_eq!(session.rejected_samples, 4);
    assert_eq!(session.sample_count, 27);
    assert_eq!(session.trajectories.len(), 27);
    let windowed: u32 = session.windows.iter().map(|w| w.sample_count).sum();
    assert_eq!(windowed, 27);
}
