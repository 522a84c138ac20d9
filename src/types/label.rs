//! Annotation labels attached to sample-index ranges.
//!
//! Labels come from the annotation tooling upstream and are carried through
//! the pipeline unmodified. Only `calibration` is read by the core: it routes
//! the labelled range to the magnetometer calibrator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{CalibrationMode, CalibrationResult};
use crate::error::{FusionError, FusionResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pose {
    Neutral,
    Fist,
    OpenPalm,
    Pinch,
    Point,
    ThumbsUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerState {
    Extended,
    Curled,
    Pressed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    #[default]
    Unknown,
    Stationary,
    Translation,
    Rotation,
    Gesture,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationLabel {
    #[default]
    None,
    EarthField,
    HardIron,
}

impl CalibrationLabel {
    pub fn mode(self) -> Option<CalibrationMode> {
        match self {
            CalibrationLabel::None => None,
            CalibrationLabel::EarthField => Some(CalibrationMode::EarthField),
            CalibrationLabel::HardIron => Some(CalibrationMode::HardIron),
        }
    }
}

/// Calibration summary recorded alongside a label by the annotation tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelMetadata {
    pub quality: f64,
    #[serde(default)]
    pub magnitude: Option<f64>,
    #[serde(default)]
    pub avg_deviation: Option<f64>,
    pub sample_count: u32,
}

impl From<&CalibrationResult> for LabelMetadata {
    fn from(result: &CalibrationResult) -> Self {
        Self {
            quality: result.quality,
            magnitude: result.magnitude,
            avg_deviation: result.avg_deviation,
            sample_count: result.sample_count,
        }
    }
}

/// Annotation over the half-open sample-index range `start_sample..end_sample`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub start_sample: u32,
    pub end_sample: u32,
    #[serde(default)]
    pub pose: Option<Pose>,
    #[serde(default)]
    pub fingers: BTreeMap<Finger, FingerState>,
    #[serde(default)]
    pub motion: Motion,
    #[serde(default)]
    pub calibration: CalibrationLabel,
    #[serde(default)]
    pub custom: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Option<LabelMetadata>,
}

impl Label {
    pub fn new(start_sample: u32, end_sample: u32) -> Self {
        Self {
            start_sample,
            end_sample,
            pose: None,
            fingers: BTreeMap::new(),
            motion: Motion::Unknown,
            calibration: CalibrationLabel::None,
            custom: BTreeSet::new(),
            metadata: None,
        }
    }

    pub fn calibration(start_sample: u32, end_sample: u32, mode: CalibrationMode) -> Self {
        let mut label = Self::new(start_sample, end_sample);
        label.calibration = match mode {
            CalibrationMode::EarthField => CalibrationLabel::EarthField,
            CalibrationMode::HardIron => CalibrationLabel::HardIron,
        };
        label
    }

    pub fn validate(&self) -> FusionResult<()> {
        if self.start_sample >= self.end_sample {
            return Err(FusionError::InvalidLabelRange {
                start: self.start_sample,
                end: self.end_sample,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> u32 {
        self.end_sample.saturating_sub(self.start_sample)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: u32) -> bool {
        index >= self.start_sample && index < self.end_sample
    }

    pub fn calibration_mode(&self) -> Option<CalibrationMode> {
        self.calibration.mode()
    }
}
