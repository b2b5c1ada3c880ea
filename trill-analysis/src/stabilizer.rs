//! Outlier rejection and moving-average smoothing for raw pitch estimates
//!
//! Frame-level pitch trackers jitter, drop out on unvoiced frames and jump by
//! an octave now and then. The stabilizer gates each sample twice (voicing,
//! then distance from the running mean) and reports the mean of the last few
//! accepted samples, so the output moves smoothly enough to drive motion.

use crate::pitch::{is_unvoiced, UNVOICED_THRESHOLD};
use std::collections::VecDeque;
use thiserror::Error;

/// Errors raised when building a stabilizer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StabilizerError {
    #[error("History capacity must be at least 1")]
    ZeroCapacity,
    #[error("Maximum deviation must be positive and finite, got {0}")]
    InvalidDeviation(f32),
    #[error("Floor value must be finite, got {0}")]
    InvalidFloor(f32),
}

/// Stabilizer parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizerConfig {
    /// Number of accepted samples averaged into the output
    pub capacity: usize,
    /// Largest allowed distance from the running mean, in semitones
    pub max_deviation: f32,
    /// Value reported before any sample has been accepted
    pub floor: f32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            max_deviation: 10.0,
            floor: UNVOICED_THRESHOLD,
        }
    }
}

/// Outcome of feeding one sample, for callers that want to know why
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleVerdict {
    /// Sample joined the history
    Accepted,
    /// Unvoiced sentinel (or non-finite garbage)
    Unvoiced,
    /// Too far from the running mean
    Outlier,
}

/// Bounded moving-average pitch filter
///
/// Not thread-safe by itself: exactly one consumer should feed it.
#[derive(Debug, Clone)]
pub struct PitchStabilizer {
    config: StabilizerConfig,
    history: VecDeque<f32>,
    /// Most recent accepted raw sample, `None` until the first acceptance
    last_accepted: Option<f32>,
}

impl Default for PitchStabilizer {
    fn default() -> Self {
        Self {
            config: StabilizerConfig::default(),
            history: VecDeque::with_capacity(StabilizerConfig::default().capacity),
            last_accepted: None,
        }
    }
}

impl PitchStabilizer {
    /// Create a stabilizer with the given parameters
    pub fn new(config: StabilizerConfig) -> Result<Self, StabilizerError> {
        if config.capacity == 0 {
            return Err(StabilizerError::ZeroCapacity);
        }
        if !(config.max_deviation.is_finite() && config.max_deviation > 0.0) {
            return Err(StabilizerError::InvalidDeviation(config.max_deviation));
        }
        if !config.floor.is_finite() {
            return Err(StabilizerError::InvalidFloor(config.floor));
        }

        Ok(Self {
            config,
            history: VecDeque::with_capacity(config.capacity),
            last_accepted: None,
        })
    }

    /// Shorthand for a stabilizer with a custom history size
    pub fn with_capacity(capacity: usize) -> Result<Self, StabilizerError> {
        Self::new(StabilizerConfig {
            capacity,
            ..StabilizerConfig::default()
        })
    }

    /// Feed one raw semitone estimate and return the smoothed pitch
    ///
    /// Never fails. Rejected samples (unvoiced or outliers) leave the history
    /// untouched and return the last accepted raw sample, or the floor if
    /// nothing has been accepted yet.
    pub fn update(&mut self, raw: f32) -> f32 {
        self.classify_and_update(raw).0
    }

    /// Like [`update`](Self::update), also reporting what happened to the sample
    pub fn classify_and_update(&mut self, raw: f32) -> (f32, SampleVerdict) {
        if is_unvoiced(raw) {
            return (self.held_value(), SampleVerdict::Unvoiced);
        }

        if let Some(mean) = self.mean() {
            if (raw - mean).abs() > self.config.max_deviation {
                tracing::trace!(raw, mean, "pitch outlier rejected");
                return (self.held_value(), SampleVerdict::Outlier);
            }
        }

        self.history.push_back(raw);
        if self.history.len() > self.config.capacity {
            self.history.pop_front();
        }
        self.last_accepted = Some(raw);

        (self.mean().unwrap_or(raw), SampleVerdict::Accepted)
    }

    /// Mean of the current history, or `None` when empty
    ///
    /// Summed in f64: the mean of finite f32 samples always fits in f32, but
    /// their f32 sum may not.
    pub fn mean(&self) -> Option<f32> {
        if self.history.is_empty() {
            return None;
        }
        let sum: f64 = self.history.iter().map(|&v| f64::from(v)).sum();
        Some((sum / self.history.len() as f64) as f32)
    }

    /// Value returned for a rejected sample
    pub fn held_value(&self) -> f32 {
        self.last_accepted.unwrap_or(self.config.floor)
    }

    /// Accepted samples, oldest first
    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    /// Most recent accepted raw sample
    pub fn last_accepted(&self) -> Option<f32> {
        self.last_accepted
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Forget all samples (new detector session)
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_accepted = None;
    }
}
