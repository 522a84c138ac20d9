use std::collections::VecDeque;
use std::ops::Range;

use crate::error::{FusionError, FusionResult};
use crate::types::Sample;

pub const DEFAULT_BUFFER_CAPACITY: usize = 6000; // 10 min at 10 Hz

/// Fixed-capacity queue of accepted samples, addressed by absolute sample index.
///
/// Indices count accepted samples only; the first sample of a session is
/// index 0. When the buffer is full the oldest sample is dropped, so only
/// `retained()` can be read back, but indices keep counting.
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    first_index: u32,
    last_t: Option<f64>,
}

impl SampleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SampleBuffer {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            first_index: 0,
            last_t: None,
        }
    }

    /// Validate and append a sample, returning its index.
    pub fn push(&mut self, sample: Sample) -> FusionResult<u32> {
        sample.validate()?;
        if let Some(previous) = self.last_t {
            if sample.t <= previous {
                return Err(FusionError::NonMonotonicTimestamp { t: sample.t, previous });
            }
        }

        let index = self.next_index();
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
            self.first_index += 1;
        }
        self.samples.push_back(sample);
        self.last_t = Some(sample.t);
        Ok(index)
    }

    /// Index the next accepted sample will get (= total accepted so far).
    pub fn next_index(&self) -> u32 {
        self.first_index + self.samples.len() as u32
    }

    pub fn retained(&self) -> Range<u32> {
        self.first_index..self.next_index()
    }

    pub fn get(&self, index: u32) -> Option<&Sample> {
        if index < self.first_index {
            return None;
        }
        self.samples.get((index - self.first_index) as usize)
    }

    /// Retained samples whose index lies in `start..end`.
    pub fn range(&self, start: u32, end: u32) -> impl Iterator<Item = &Sample> + '_ {
        let lo = start.max(self.first_index);
        let hi = end.min(self.next_index());
        let (skip, take) = if lo < hi {
            ((lo - self.first_index) as usize, (hi - lo) as usize)
        } else {
            (0, 0)
        };
        self.samples.iter().skip(skip).take(take)
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
