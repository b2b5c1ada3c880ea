//! Musical key to world height mapping

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeightMapError {
    #[error("Key range is empty ({low} to {high})")]
    EmptyKeyRange { low: f32, high: f32 },
    #[error("Ceiling {ceiling} must be above ground + offset ({floor})")]
    InvertedBand { ceiling: f32, floor: f32 },
}

/// Linear mapping from MIDI keys onto a vertical band
///
/// `low_key` lands at `ground + offset`, `high_key` at `ceiling`. Keys outside
/// the range extrapolate; clamping is the caller's business.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightMap {
    ground: f32,
    ceiling: f32,
    offset: f32,
    low_key: f32,
    high_key: f32,
}

impl Default for HeightMap {
    fn default() -> Self {
        Self {
            ground: 0.0,
            ceiling: 40.0,
            offset: 5.0,
            low_key: 53.0,
            high_key: 80.0,
        }
    }
}

impl HeightMap {
    pub fn new(
        ground: f32,
        ceiling: f32,
        offset: f32,
        low_key: f32,
        high_key: f32,
    ) -> Result<Self, HeightMapError> {
        if (high_key - low_key).abs() < f32::EPSILON {
            return Err(HeightMapError::EmptyKeyRange {
                low: low_key,
                high: high_key,
            });
        }
        if ceiling <= ground + offset {
            return Err(HeightMapError::InvertedBand {
                ceiling,
                floor: ground + offset,
            });
        }
        Ok(Self {
            ground,
            ceiling,
            offset,
            low_key,
            high_key,
        })
    }

    /// Height for a MIDI key
    pub fn key_to_height(&self, key: f32) -> f32 {
        self.ground
            + self.offset
            + (self.ceiling - self.ground - self.offset) * (key - self.low_key)
                / (self.high_key - self.low_key)
    }

    /// Inverse of [`key_to_height`](Self::key_to_height)
    pub fn height_to_key(&self, height: f32) -> f32 {
        self.low_key
            + (height - self.ground - self.offset) * (self.high_key - self.low_key)
                / (self.ceiling - self.ground - self.offset)
    }

    pub fn ground(&self) -> f32 {
        self.ground
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_band() {
        let map = HeightMap::default();
        assert_eq!(map.key_to_height(53.0), 5.0);
        assert_eq!(map.key_to_height(80.0), 40.0);
        assert!((map.height_to_key(map.key_to_height(69.0)) - 69.0).abs() < 1e-4);
    }

    #[test]
    fn test_extrapolates() {
        let map = HeightMap::default();
        assert!(map.key_to_height(40.0) < map.ground() + 5.0);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        assert!(matches!(
            HeightMap::new(0.0, 40.0, 5.0, 60.0, 60.0),
            Err(HeightMapError::EmptyKeyRange { .. })
        ));
        assert!(matches!(
            HeightMap::new(0.0, 4.0, 5.0, 53.0, 80.0),
            Err(HeightMapError::InvertedBand { .. })
        ));
    }
}
