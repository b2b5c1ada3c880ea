//! Mapping from smoothed pitch to the controller's target value

/// Offset-then-clamp applied to the stabilizer's MIDI output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputRange {
    pub offset: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for OutputRange {
    fn default() -> Self {
        Self {
            offset: 40.0,
            min: 0.0,
            max: 150.0,
        }
    }
}

impl OutputRange {
    /// Non-finite values fall back to the defaults
    pub fn new(offset: f32, min: f32, max: f32) -> Self {
        let defaults = Self::default();
        let finite_or = |v: f32, fallback: f32| if v.is_finite() { v } else { fallback };
        let offset = finite_or(offset, defaults.offset);
        let min = finite_or(min, defaults.min);
        let max = finite_or(max, defaults.max);

        // Swapped bounds would make clamp panic
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self { offset, min, max }
    }

    pub fn apply(&self, midi: f32) -> f32 {
        (midi + self.offset).clamp(self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_clamp() {
        let range = OutputRange::default();
        assert_eq!(range.apply(69.0), 109.0);
        assert_eq!(range.apply(200.0), 150.0);
        assert_eq!(range.apply(-100.0), 0.0);
    }

    #[test]
    fn test_swapped_bounds() {
        let range = OutputRange::new(0.0, 10.0, 5.0);
        assert_eq!(range.apply(7.0), 7.0);
        assert_eq!(range.apply(20.0), 10.0);
    }

    #[test]
    fn test_non_finite_bounds_fall_back() {
        let range = OutputRange::new(f32::NAN, f32::NAN, f32::INFINITY);
        assert_eq!(range, OutputRange::default());
        assert_eq!(range.apply(69.0), 109.0);
    }
}
