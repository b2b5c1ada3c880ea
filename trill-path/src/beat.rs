//! Wall-clock to beat conversion

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Seconds per beat must be positive and finite, got {0}")]
pub struct InvalidTimeRatio(pub f32);

/// Converts elapsed seconds to beats at a fixed tempo
///
/// Level events and path durations are measured in beats, so the game clock
/// goes through one of these before it reaches a [`PathTimeline`](crate::PathTimeline).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatClock {
    /// Seconds per beat
    time_ratio: f32,
    /// Beat offset of the clock's zero
    origin: f32,
}

impl Default for BeatClock {
    fn default() -> Self {
        Self {
            time_ratio: 0.3,
            origin: 0.0,
        }
    }
}

impl BeatClock {
    pub fn new(time_ratio: f32) -> Result<Self, InvalidTimeRatio> {
        if !(time_ratio.is_finite() && time_ratio > 0.0) {
            return Err(InvalidTimeRatio(time_ratio));
        }
        Ok(Self {
            time_ratio,
            origin: 0.0,
        })
    }

    /// Clock whose beats are counted from `seconds` onwards
    pub fn starting_at(self, seconds: f32) -> Self {
        Self {
            origin: seconds / self.time_ratio,
            ..self
        }
    }

    pub fn time_ratio(&self) -> f32 {
        self.time_ratio
    }

    /// Tempo in beats per minute
    pub fn bpm(&self) -> f32 {
        60.0 / self.time_ratio
    }

    /// Beats elapsed at `seconds`
    pub fn beats(&self, seconds: f32) -> f32 {
        seconds / self.time_ratio - self.origin
    }

    /// Seconds at which `beats` have elapsed
    pub fn seconds(&self, beats: f32) -> f32 {
        (beats + self.origin) * self.time_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beats() {
        let clock = BeatClock::new(0.5).unwrap();
        assert_eq!(clock.beats(2.0), 4.0);
        assert_eq!(clock.seconds(4.0), 2.0);
        assert_eq!(clock.bpm(), 120.0);
    }

    #[test]
    fn test_origin() {
        let clock = BeatClock::new(0.5).unwrap().starting_at(10.0);
        assert_eq!(clock.beats(10.0), 0.0);
        assert_eq!(clock.beats(11.0), 2.0);
        assert_eq!(clock.seconds(2.0), 11.0);
    }

    #[test]
    fn test_rejects_bad_ratio() {
        assert_eq!(BeatClock::new(0.0), Err(InvalidTimeRatio(0.0)));
        assert!(BeatClock::new(f32::NAN).is_err());
        assert_eq!(BeatClock::default().time_ratio(), 0.3);
    }
}
