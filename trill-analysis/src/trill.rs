//! Lip-trill detection from the amplitude envelope
//!
//! A lip trill shows up as a strong, regular amplitude flutter somewhere in the
//! 15-32 Hz range, whatever pitch is being sung on top of it. Detection runs
//! per block of audio:
//!
//! 1. Amplitude envelope via the analytic signal (FFT Hilbert transform)
//! 2. Zero-phase Butterworth low-pass to keep only the flutter
//! 3. Loudness gate on the mean envelope
//! 4. Envelope peaks counted and converted to a flutter rate
//! 5. Regularity check on the spacing between peaks

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Trill detector parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrillConfig {
    /// Envelope smoothing cutoff (Hz)
    pub envelope_cutoff_hz: f32,
    /// Minimum mean envelope level
    pub amplitude_threshold: f32,
    /// Lowest accepted flutter rate (Hz)
    pub min_rate_hz: f32,
    /// Highest accepted flutter rate (Hz)
    pub max_rate_hz: f32,
    /// Maximum standard deviation of peak spacing (seconds)
    pub periodicity_threshold: f32,
}

impl Default for TrillConfig {
    fn default() -> Self {
        Self {
            envelope_cutoff_hz: 30.0,
            amplitude_threshold: 0.02,
            min_rate_hz: 15.0,
            max_rate_hz: 32.0,
            periodicity_threshold: 0.015,
        }
    }
}

/// Per-block detection details
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrillAnalysis {
    /// Mean of the smoothed envelope
    pub avg_amplitude: f32,
    /// Envelope peaks per second (0 when the block was gated early)
    pub peak_frequency: f32,
    /// Standard deviation of peak spacing in seconds (0 when not computed)
    pub interval_std: f32,
    pub is_trilling: bool,
}

/// Butterworth Q values for the two second-order sections of a 4th order filter
const BUTTERWORTH_Q: [f64; 2] = [0.541_196_100_146_197, 1.306_562_964_876_376_7];

/// Second-order low-pass section
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn low_pass(cutoff: f64, sample_rate: f64, q: f64) -> Self {
        let omega = 2.0 * PI * cutoff / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_omega) / 2.0 / a0,
            b1: (1.0 - cos_omega) / a0,
            b2: (1.0 - cos_omega) / 2.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Filter in place, starting from the steady state for the first sample
    fn run(&self, samples: &mut [f64]) {
        let Some(&first) = samples.first() else {
            return;
        };
        // Unity DC gain, so a settled filter has every delay equal to the input
        let (mut x1, mut x2, mut y1, mut y2) = (first, first, first, first);
        for s in samples.iter_mut() {
            let input = *s;
            let output =
                self.b0 * input + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = input;
            y2 = y1;
            y1 = output;
            *s = output;
        }
    }
}

/// Block-based lip-trill detector
pub struct TrillDetector {
    sample_rate: u32,
    config: TrillConfig,
    sections: [Biquad; 2],
    /// Cached forward/inverse plans, keyed by block length
    plans: Option<(usize, Arc<dyn rustfft::Fft<f32>>, Arc<dyn rustfft::Fft<f32>>)>,
}

impl TrillDetector {
    /// Create a detector with default thresholds
    pub fn new(sample_rate: u32) -> Self {
        Self::with_config(sample_rate, TrillConfig::default())
    }

    /// Create a detector with custom thresholds
    pub fn with_config(sample_rate: u32, config: TrillConfig) -> Self {
        let sr = sample_rate.max(1) as f64;
        // Keep the cutoff well under Nyquist
        let cutoff = (config.envelope_cutoff_hz as f64).clamp(0.1, sr * 0.45);
        let sections = BUTTERWORTH_Q.map(|q| Biquad::low_pass(cutoff, sr, q));

        Self {
            sample_rate,
            config,
            sections,
            plans: None,
        }
    }

    pub fn config(&self) -> &TrillConfig {
        &self.config
    }

    /// Whether the block contains a lip trill
    pub fn detect(&mut self, block: &[f32]) -> bool {
        self.analyze(block).is_trilling
    }

    /// Run the full detection and report intermediate measurements
    pub fn analyze(&mut self, block: &[f32]) -> TrillAnalysis {
        let mut analysis = TrillAnalysis::default();
        if block.len() < 3 {
            return analysis;
        }

        let envelope = self.smoothed_envelope(block);

        analysis.avg_amplitude = (envelope.iter().sum::<f64>() / envelope.len() as f64) as f32;
        if analysis.avg_amplitude < self.config.amplitude_threshold {
            return analysis;
        }

        let peaks = find_peaks(&envelope);
        if peaks.len() < 2 {
            return analysis;
        }

        let block_seconds = block.len() as f32 / self.sample_rate as f32;
        analysis.peak_frequency = peaks.len() as f32 / block_seconds;
        if !(self.config.min_rate_hz..=self.config.max_rate_hz).contains(&analysis.peak_frequency) {
            return analysis;
        }

        let intervals: Vec<f64> = peaks
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 / self.sample_rate as f64)
            .collect();
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let variance =
            intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
        analysis.interval_std = variance.sqrt() as f32;
        analysis.is_trilling = analysis.interval_std < self.config.periodicity_threshold;

        tracing::debug!(
            avg_amplitude = analysis.avg_amplitude,
            peak_frequency = analysis.peak_frequency,
            interval_std = analysis.interval_std,
            is_trilling = analysis.is_trilling,
            "trill block analyzed"
        );

        analysis
    }

    /// Amplitude envelope, low-passed with zero phase
    fn smoothed_envelope(&mut self, block: &[f32]) -> Vec<f64> {
        let envelope = self.hilbert_envelope(block);

        // Odd extension at both ends tames the filter start-up transient
        let pad = (3.0 * self.sample_rate as f32 / self.config.envelope_cutoff_hz.max(0.1)) as usize;
        let pad = pad.min(envelope.len() - 1);
        let first = envelope[0];
        let last = envelope[envelope.len() - 1];

        let mut padded = Vec::with_capacity(envelope.len() + 2 * pad);
        padded.extend((1..=pad).rev().map(|i| 2.0 * first - envelope[i]));
        padded.extend_from_slice(&envelope);
        padded.extend((1..=pad).map(|i| 2.0 * last - envelope[envelope.len() - 1 - i]));

        for section in &self.sections {
            section.run(&mut padded);
        }
        padded.reverse();
        for section in &self.sections {
            section.run(&mut padded);
        }
        padded.reverse();

        padded[pad..pad + envelope.len()].to_vec()
    }

    /// Magnitude of the analytic signal
    fn hilbert_envelope(&mut self, block: &[f32]) -> Vec<f64> {
        let n = block.len();
        let (fwd, inv) = match &self.plans {
            Some((len, fwd, inv)) if *len == n => (Arc::clone(fwd), Arc::clone(inv)),
            _ => {
                let mut planner = FftPlanner::new();
                let fwd = planner.plan_fft_forward(n);
                let inv = planner.plan_fft_inverse(n);
                self.plans = Some((n, Arc::clone(&fwd), Arc::clone(&inv)));
                (fwd, inv)
            }
        };

        let mut buffer: Vec<Complex<f32>> = block.iter().map(|&s| Complex::new(s, 0.0)).collect();
        fwd.process(&mut buffer);

        // Keep DC (and Nyquist for even n), double positive, zero negative frequencies
        let half = n / 2;
        for (k, bin) in buffer.iter_mut().enumerate() {
            let gain = if k == 0 || (n % 2 == 0 && k == half) {
                1.0
            } else if k < (n + 1) / 2 {
                2.0
            } else {
                0.0
            };
            *bin *= gain;
        }

        inv.process(&mut buffer);

        // rustfft does not normalize the inverse transform
        let scale = 1.0 / n as f64;
        buffer.iter().map(|c| c.norm() as f64 * scale).collect()
    }
}

/// Indices of local maxima (strictly above the left neighbour, not below the right)
fn find_peaks(signal: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    for i in 1..signal.len().saturating_sub(1) {
        if signal[i] > signal[i - 1] && signal[i] >= signal[i + 1] {
            peaks.push(i);
        }
    }
    peaks
}
