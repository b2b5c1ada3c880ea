//! Per-frame pitch tracking: sliding window, estimator, stabilizer

use std::collections::VecDeque;
use trill_analysis::pitch::is_unvoiced;
use trill_analysis::{semitones_to_midi, PitchEstimator, PitchStabilizer, SampleVerdict};

/// The most recent `frame_size` samples of a stream
#[derive(Debug, Clone)]
pub struct FrameWindow {
    samples: VecDeque<f32>,
    frame_size: usize,
}

impl FrameWindow {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            samples: VecDeque::with_capacity(frame_size),
            frame_size,
        }
    }

    /// Append samples, discarding the oldest beyond the frame size
    pub fn push(&mut self, samples: &[f32]) {
        // Only the tail can survive
        let skip = samples.len().saturating_sub(self.frame_size);
        for &s in &samples[skip..] {
            if self.samples.len() == self.frame_size {
                self.samples.pop_front();
            }
            self.samples.push_back(s);
        }
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.frame_size
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples oldest first
    pub fn latest(&mut self) -> &[f32] {
        self.samples.make_contiguous()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// One tracked pitch value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchReading {
    /// Estimator output in A4-relative semitones (may be the unvoiced sentinel)
    pub raw: f32,
    /// Stabilizer output in A4-relative semitones
    pub smoothed: f32,
    /// `smoothed` on the MIDI scale
    pub midi: f32,
    pub verdict: SampleVerdict,
}

impl PitchReading {
    pub fn is_voiced(&self) -> bool {
        !is_unvoiced(self.raw)
    }
}

/// Estimator plus stabilizer, fed from a sample stream
pub struct PitchTracker {
    /// `None` when raw values arrive already estimated
    estimator: Option<Box<dyn PitchEstimator>>,
    stabilizer: PitchStabilizer,
    window: FrameWindow,
    hop_size: usize,
    since_last: usize,
}

impl PitchTracker {
    /// `hop_size` is the number of new samples required between estimates
    pub fn new(
        estimator: Box<dyn PitchEstimator>,
        stabilizer: PitchStabilizer,
        hop_size: usize,
    ) -> Self {
        let window = FrameWindow::new(estimator.frame_size());
        Self {
            estimator: Some(estimator),
            stabilizer,
            window,
            hop_size: hop_size.max(1),
            since_last: 0,
        }
    }

    /// Tracker for pitch estimated elsewhere, fed through [`update`](Self::update)
    ///
    /// [`push_samples`](Self::push_samples) never yields a reading.
    pub fn from_stabilizer(stabilizer: PitchStabilizer) -> Self {
        Self {
            estimator: None,
            stabilizer,
            window: FrameWindow::new(0),
            hop_size: 1,
            since_last: 0,
        }
    }

    /// Feed new samples; estimates at most once per call
    ///
    /// Returns a reading when the window is full and at least one hop of new
    /// audio has arrived since the previous estimate.
    pub fn push_samples(&mut self, samples: &[f32]) -> Option<PitchReading> {
        let estimator = self.estimator.as_mut()?;
        self.window.push(samples);
        self.since_last += samples.len();

        if !self.window.is_full() || self.since_last < self.hop_size {
            return None;
        }
        self.since_last = 0;

        let raw = estimator.estimate(self.window.latest());
        Some(self.update(raw))
    }

    /// Feed a raw semitone value straight into the stabilizer
    ///
    /// For pitch that arrives already estimated (e.g. over the network).
    pub fn update(&mut self, raw: f32) -> PitchReading {
        let (smoothed, verdict) = self.stabilizer.classify_and_update(raw);
        tracing::trace!(raw, smoothed, ?verdict, "pitch frame");
        PitchReading {
            raw,
            smoothed,
            midi: semitones_to_midi(smoothed),
            verdict,
        }
    }

    pub fn stabilizer(&self) -> &PitchStabilizer {
        &self.stabilizer
    }

    /// Start a new detector session
    pub fn reset(&mut self) {
        self.stabilizer.reset();
        self.window.clear();
        self.since_last = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use trill_analysis::{SpectralPeakEstimator, UNVOICED_THRESHOLD};

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / 44100.0).sin())
            .collect()
    }

    #[test]
    fn test_window_keeps_latest() {
        let mut window = FrameWindow::new(3);
        window.push(&[1.0, 2.0]);
        assert!(!window.is_full());
        window.push(&[3.0, 4.0]);
        assert_eq!(window.latest(), &[2.0, 3.0, 4.0]);
        window.push(&[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(window.latest(), &[6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_tracker_waits_for_full_window() {
        let estimator = SpectralPeakEstimator::new(44100, 4096);
        let mut tracker = PitchTracker::new(Box::new(estimator), PitchStabilizer::default(), 1024);
        assert!(tracker.push_samples(&sine(440.0, 2048)).is_none());

        let reading = tracker.push_samples(&sine(440.0, 4096)).unwrap();
        assert!(reading.is_voiced());
        assert_eq!(reading.verdict, SampleVerdict::Accepted);
        assert!((reading.midi - 69.0).abs() < 0.5, "midi {}", reading.midi);

        // Less than a hop of new audio: no new estimate
        assert!(tracker.push_samples(&sine(440.0, 512)).is_none());
        assert!(tracker.push_samples(&sine(440.0, 512)).is_some());
    }

    #[test]
    fn test_tracker_holds_through_silence() {
        let estimator = SpectralPeakEstimator::new(44100, 2048);
        let mut tracker = PitchTracker::new(Box::new(estimator), PitchStabilizer::default(), 2048);
        let voiced = tracker.push_samples(&sine(220.0, 2048)).unwrap();

        let silent = tracker.push_samples(&vec![0.0; 2048]).unwrap();
        assert_eq!(silent.raw, UNVOICED_THRESHOLD);
        assert!(!silent.is_voiced());
        assert_eq!(silent.verdict, SampleVerdict::Unvoiced);
        assert_eq!(silent.smoothed, voiced.smoothed);
    }

    #[test]
    fn test_update_raw_values() {
        let estimator = SpectralPeakEstimator::new(44100, 1024);
        let mut tracker = PitchTracker::new(Box::new(estimator), PitchStabilizer::default(), 512);
        assert_eq!(tracker.update(3.0).midi, 72.0);
        tracker.reset();
        assert!(tracker.stabilizer().is_empty());
    }

    #[test]
    fn test_tracker_without_estimator() {
        let mut tracker = PitchTracker::from_stabilizer(PitchStabilizer::default());
        assert!(tracker.push_samples(&sine(440.0, 4096)).is_none());

        let reading = tracker.update(-12.0);
        assert_eq!(reading.verdict, SampleVerdict::Accepted);
        assert_eq!(reading.midi, 57.0);
        assert_eq!(tracker.update(UNVOICED_THRESHOLD).smoothed, -12.0);
    }
}
