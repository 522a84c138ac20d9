use serde::{Deserialize, Serialize};

use crate::trajectory::{TrajectorySet, TrajectoryStatistics};
use crate::types::{CalibrationMode, CalibrationResult, Label, Vec3, Window};

/// What the host was doing when it recorded the session.
///
/// Processing is identical for every kind; it is carried through so
/// consumers can tell sessions apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Labelled capture for later annotation
    #[default]
    Recording,
    /// Live view, not persisted by the host
    Streaming,
    /// Dedicated magnetometer calibration run
    Calibration,
}

/// Everything the core produced for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub kind: SessionKind,
    pub windows: Vec<Window>,
    /// Ordered by `(start_sample, end_sample)`.
    pub calibration_results: Vec<CalibrationResult>,
    pub trajectories: TrajectorySet,
    pub statistics: TrajectoryStatistics,
    /// Seconds between the first and last accepted sample.
    pub duration: f64,
    /// Labels exactly as supplied, in arrival order.
    pub labels: Vec<Label>,
    pub sample_count: u32,
    pub rejected_samples: u32,
}

impl SessionResult {
    pub fn calibrations(&self, mode: CalibrationMode) -> impl Iterator<Item = &CalibrationResult> + '_ {
        self.calibration_results.iter().filter(move |r| r.mode() == mode)
    }

    /// Last hard-iron offset in stream order.
    pub fn hard_iron_offset(&self) -> Option<Vec3> {
        self.calibration_results.iter().rev().find_map(|r| r.hard_iron_offset())
    }

    pub fn partial_windows(&self) -> usize {
        self.windows.iter().filter(|w| w.partial).count()
    }
}
