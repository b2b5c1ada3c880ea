//! Pitch analysis for Trill Flight
//!
//! Provides pitch unit conversions, a frame-level pitch estimator seam,
//! outlier-rejecting pitch smoothing and lip-trill detection.

pub mod pitch;
mod stabilizer;
mod trill;

pub use pitch::{
    hz_to_semitones, semitones_to_midi, PitchEstimator, SpectralPeakEstimator, A4_MIDI,
    UNVOICED_THRESHOLD,
};
pub use stabilizer::{PitchStabilizer, SampleVerdict, StabilizerConfig, StabilizerError};
pub use trill::{TrillAnalysis, TrillConfig, TrillDetector};
