use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::types::Vec3;

pub const DEFAULT_FILTER_TIME_CONSTANT: f64 = 0.5; // seconds

/// Which causal smoother produces the filtered trajectory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmootherKind {
    /// First-order low-pass with the configured time constant.
    #[default]
    Exponential,
    /// Rising-half Hann-weighted window of the given length.
    HannWindow(usize),
}

/// Exponential moving average on positions.
///
/// `alpha = dt / (tau + dt)` per step, so irregular sample spacing is handled.
pub struct ExponentialSmoother {
    time_constant: f64,
    last_output: Vec3,
    initialized: bool,
}

impl ExponentialSmoother {
    pub fn new(time_constant: f64) -> Self {
        Self {
            time_constant,
            last_output: Vec3::zeros(),
            initialized: false,
        }
    }

    pub fn apply(&mut self, input: Vec3, dt: f64) -> Vec3 {
        if !self.initialized {
            self.last_output = input;
            self.initialized = true;
            return input;
        }
        let alpha = dt / (self.time_constant + dt);
        self.last_output = self.last_output * (1.0 - alpha) + input * alpha;
        self.last_output
    }
}

/// Weighted mean of the last `window_size` positions.
///
/// Weights follow the rising half of a Hann window, oldest to newest, so the
/// latest position always carries the largest weight and the output never
/// lags by a whole sample.
pub struct HannSmoother {
    history: VecDeque<Vec3>,
    window_size: usize,
    weights: HashMap<usize, Vec<f64>>,
}

impl HannSmoother {
    /// `window_size` of 0 is treated as 1 (pass-through).
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        HannSmoother {
            history: VecDeque::with_capacity(window_size),
            window_size,
            weights: HashMap::new(),
        }
    }

    pub fn apply(&mut self, position: Vec3) -> Vec3 {
        if self.history.len() == self.window_size {
            self.history.pop_front();
        }
        self.history.push_back(position);

        let filled = self.history.len();
        let weights = self.weights.entry(filled).or_insert_with(|| Self::rising_hann(filled));
        self.history
            .iter()
            .zip(weights.iter())
            .fold(Vec3::zeros(), |acc, (p, w)| acc + p * *w)
    }

    /// `sin²(π(i+1) / 2n)` for `i` in `0..n`, normalized to sum to 1.
    fn rising_hann(n: usize) -> Vec<f64> {
        let raw: Vec<f64> = (1..=n)
            .map(|k| (std::f64::consts::FRAC_PI_2 * k as f64 / n as f64).sin().powi(2))
            .collect();
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|w| w / total).collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// The filtered-trajectory smoother selected by configuration.
pub enum PositionSmoother {
    Exponential(ExponentialSmoother),
    Hann(HannSmoother),
}

impl PositionSmoother {
    pub fn new(kind: SmootherKind, time_constant: f64) -> Self {
        match kind {
            SmootherKind::Exponential => PositionSmoother::Exponential(ExponentialSmoother::new(time_constant)),
            SmootherKind::HannWindow(size) => PositionSmoother::Hann(HannSmoother::new(size)),
        }
    }

    pub fn apply(&mut self, position: Vec3, dt: f64) -> Vec3 {
        match self {
            PositionSmoother::Exponential(s) => s.apply(position, dt),
            PositionSmoother::Hann(s) => s.apply(position),
        }
    }
}
