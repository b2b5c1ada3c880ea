//! Time-to-position mapping along a fixed polyline
//!
//! The path is traversed at constant speed: elapsed time is turned into a
//! fraction of the total duration, and that fraction into a distance along
//! the polyline. Queries normally arrive once per frame with non-decreasing
//! time, so the owning segment is found by walking a persistent cursor
//! forward instead of searching from the start each time.

use crate::vec3::Vec3;
use thiserror::Error;

/// Errors raised when a timeline cannot be built from its definition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Path needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("Path point {0} has a non-finite coordinate")]
    NonFinitePoint(usize),
    #[error("Path segment {0} has zero length")]
    ZeroLengthSegment(usize),
    #[error("Path has zero total length")]
    ZeroLength,
    #[error("Total duration must be positive and finite, got {0}")]
    InvalidDuration(f32),
}

/// What to do when a query asks for a time before the cursor's segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegressionPolicy {
    /// Keep the cursor where it is and report the start of its segment
    #[default]
    Stall,
    /// Binary search back to the owning segment
    Rewind,
}

/// Position and heading at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSample {
    pub position: Vec3,
    /// Unit direction of the owning segment
    pub forward: Vec3,
    /// Index of the owning segment
    pub segment: usize,
    /// Arc length from the start of the path
    pub distance: f32,
}

/// Constant-speed walk along a polyline over a fixed duration
#[derive(Debug, Clone)]
pub struct PathTimeline {
    points: Vec<Vec3>,
    segment_lengths: Vec<f32>,
    /// Arc length at the start of each segment
    segment_starts: Vec<f32>,
    total_length: f32,
    total_duration: f32,
    cursor: usize,
    policy: RegressionPolicy,
}

impl PathTimeline {
    /// Build a timeline that covers `points` in `total_duration`
    pub fn new(points: Vec<Vec3>, total_duration: f32) -> Result<Self, ConfigurationError> {
        if points.len() < 2 {
            return Err(ConfigurationError::TooFewPoints(points.len()));
        }
        if let Some(idx) = points.iter().position(|p| !p.is_finite()) {
            return Err(ConfigurationError::NonFinitePoint(idx));
        }
        if !(total_duration.is_finite() && total_duration > 0.0) {
            return Err(ConfigurationError::InvalidDuration(total_duration));
        }

        let segment_lengths: Vec<f32> = points.windows(2).map(|w| w[0].distance(w[1])).collect();

        let mut segment_starts = Vec::with_capacity(segment_lengths.len());
        let mut total_length = 0.0f32;
        for &len in &segment_lengths {
            segment_starts.push(total_length);
            total_length += len;
        }

        if !(total_length > 0.0 && total_length.is_finite()) {
            return Err(ConfigurationError::ZeroLength);
        }
        if let Some(idx) = segment_lengths.iter().position(|&len| len <= 0.0) {
            return Err(ConfigurationError::ZeroLengthSegment(idx));
        }

        Ok(Self {
            points,
            segment_lengths,
            segment_starts,
            total_length,
            total_duration,
            cursor: 0,
            policy: RegressionPolicy::default(),
        })
    }

    /// Choose how time regressions are handled
    pub fn with_policy(mut self, policy: RegressionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Position at elapsed time `t`
    pub fn position_at(&mut self, t: f32) -> Vec3 {
        self.sample_at(t).position
    }

    /// Unit forward direction at elapsed time `t`
    pub fn forward_at(&mut self, t: f32) -> Vec3 {
        self.sample_at(t).forward
    }

    /// Position and direction at elapsed time `t`
    ///
    /// `t` saturates to `[0, total_duration]`; NaN counts as 0.
    pub fn sample_at(&mut self, t: f32) -> PathSample {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, self.total_duration) };
        let target = self.total_length * (t / self.total_duration);

        self.seek(target);

        let segment = self.cursor;
        let start = self.points[segment];
        let end = self.points[segment + 1];
        let len = self.segment_lengths[segment];
        let fraction = (target - self.segment_starts[segment]) / len;

        PathSample {
            position: start.lerp(end, fraction),
            forward: (end - start).normalized(),
            segment,
            distance: target,
        }
    }

    /// Move the cursor to the segment owning arc length `target`
    fn seek(&mut self, target: f32) {
        let start = self.segment_starts[self.cursor];
        match self.policy {
            RegressionPolicy::Stall if target < start => {
                tracing::warn!(
                    distance = target,
                    cursor = self.cursor,
                    "path queried backwards in time; holding cursor"
                );
                return;
            }
            RegressionPolicy::Rewind if self.cursor > 0 && target <= start => {
                // Segment i ends where segment i + 1 starts; a vertex
                // belongs to the earlier segment.
                let idx = self.segment_starts[1..].partition_point(|&end| end < target);
                tracing::debug!(from = self.cursor, to = idx, "path cursor rewound");
                self.cursor = idx.min(self.last_segment());
                return;
            }
            _ => {}
        }

        let last = self.last_segment();
        while self.cursor < last
            && target > self.segment_starts[self.cursor] + self.segment_lengths[self.cursor]
        {
            self.cursor += 1;
        }
    }

    fn last_segment(&self) -> usize {
        self.segment_lengths.len() - 1
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn segment_lengths(&self) -> &[f32] {
        &self.segment_lengths
    }

    pub fn segment_count(&self) -> usize {
        self.segment_lengths.len()
    }

    pub fn total_length(&self) -> f32 {
        self.total_length
    }

    pub fn total_duration(&self) -> f32 {
        self.total_duration
    }

    /// Segment the last query landed in
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Arc length consumed before the cursor's segment
    pub fn consumed(&self) -> f32 {
        self.segment_starts[self.cursor]
    }

    pub fn policy(&self) -> RegressionPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn corner() -> PathTimeline {
        PathTimeline::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(10.0, 0.0, 0.0),
                Vec3::new(10.0, 0.0, 10.0),
            ],
            10.0,
        )
        .unwrap()
    }

    /// Distance from `p` to the segment a-b
    fn distance_to_segment(p: Vec3, a: Vec3, b: Vec3) -> f32 {
        let ab = b - a;
        let t = ((p.x - a.x) * ab.x + (p.y - a.y) * ab.y + (p.z - a.z) * ab.z)
            / (ab.x * ab.x + ab.y * ab.y + ab.z * ab.z);
        p.distance(a.lerp(b, t))
    }

    #[test]
    fn test_corner_midpoint() {
        let mut timeline = corner();
        assert_eq!(timeline.total_length(), 20.0);
        assert!(timeline.position_at(5.0).approx_eq(Vec3::new(10.0, 0.0, 0.0), EPS));
        // The vertex belongs to the first segment
        assert!(timeline.forward_at(5.0).approx_eq(Vec3::new(1.0, 0.0, 0.0), EPS));
        assert_eq!(timeline.cursor(), 0);

        assert!(timeline.forward_at(5.01).approx_eq(Vec3::new(0.0, 0.0, 1.0), EPS));
        assert_eq!(timeline.cursor(), 1);
    }

    #[test]
    fn test_forward_just_before_vertex() {
        let mut timeline = corner();
        assert!(timeline.forward_at(4.99).approx_eq(Vec3::new(1.0, 0.0, 0.0), EPS));
        let after = timeline.sample_at(7.5);
        assert!(after.position.approx_eq(Vec3::new(10.0, 0.0, 5.0), EPS));
        assert!(after.forward.approx_eq(Vec3::new(0.0, 0.0, 1.0), EPS));
    }

    #[test]
    fn test_endpoints() {
        let mut timeline = corner();
        assert!(timeline.position_at(0.0).approx_eq(Vec3::ZERO, EPS));
        assert!(timeline.position_at(10.0).approx_eq(Vec3::new(10.0, 0.0, 10.0), EPS));
        // Repeated queries at the end are idempotent
        assert!(timeline.position_at(10.0).approx_eq(Vec3::new(10.0, 0.0, 10.0), EPS));
        assert_eq!(timeline.cursor(), 1);
    }

    #[test]
    fn test_time_saturates() {
        let mut timeline = corner();
        assert!(timeline.position_at(-3.0).approx_eq(Vec3::ZERO, EPS));
        assert!(timeline.position_at(f32::NAN).approx_eq(Vec3::ZERO, EPS));
        assert!(timeline.position_at(25.0).approx_eq(Vec3::new(10.0, 0.0, 10.0), EPS));
        assert!(timeline
            .position_at(f32::INFINITY)
            .approx_eq(Vec3::new(10.0, 0.0, 10.0), EPS));
        assert_eq!(timeline.cursor(), timeline.segment_count() - 1);
    }

    #[test]
    fn test_positions_lie_on_polyline_and_cursor_is_monotone() {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 4.0),
            Vec3::new(3.0, 2.0, 9.0),
            Vec3::new(-1.0, 2.0, 9.5),
            Vec3::new(-1.0, 0.0, 20.0),
        ];
        let mut timeline = PathTimeline::new(points.clone(), 7.0).unwrap();

        let mut last_cursor = 0;
        let mut last_distance = 0.0;
        for i in 0..=700 {
            let t = i as f32 * 0.01;
            let sample = timeline.sample_at(t);
            assert!(sample.segment >= last_cursor);
            assert!(sample.distance >= last_distance);
            let a = points[sample.segment];
            let b = points[sample.segment + 1];
            assert!(
                distance_to_segment(sample.position, a, b) < 1e-3,
                "t={} off segment {}",
                t,
                sample.segment
            );
            assert!((sample.forward.length() - 1.0).abs() < 1e-5);
            last_cursor = sample.segment;
            last_distance = sample.distance;
        }
        assert_eq!(last_cursor, 3);
    }

    #[test]
    fn test_skipping_segments_in_one_query() {
        let points: Vec<Vec3> = (0..6).map(|i| Vec3::ground(i as f32, 0.0)).collect();
        let mut timeline = PathTimeline::new(points, 5.0).unwrap();
        assert!(timeline.position_at(3.5).approx_eq(Vec3::ground(3.5, 0.0), EPS));
        assert_eq!(timeline.cursor(), 3);
        assert_eq!(timeline.consumed(), 3.0);
    }

    #[test]
    fn test_regression_stalls_by_default() {
        let mut timeline = corner();
        timeline.position_at(8.0);
        assert_eq!(timeline.cursor(), 1);

        // Going back into the first segment holds the cursor at segment 1
        let sample = timeline.sample_at(2.0);
        assert_eq!(sample.segment, 1);
        assert!(sample.position.approx_eq(Vec3::new(10.0, 0.0, 0.0), EPS));
        assert_eq!(timeline.cursor(), 1);
    }

    #[test]
    fn test_regression_rewinds_when_asked() {
        let mut timeline = corner().with_policy(RegressionPolicy::Rewind);
        timeline.position_at(8.0);
        let sample = timeline.sample_at(2.0);
        assert_eq!(sample.segment, 0);
        assert!(sample.position.approx_eq(Vec3::new(4.0, 0.0, 0.0), EPS));

        // Exactly at the vertex the earlier segment owns it
        let sample = timeline.sample_at(5.0);
        assert_eq!(sample.segment, 0);
        timeline.position_at(9.0);
        let sample = timeline.sample_at(5.0);
        assert_eq!(sample.segment, 0);
        assert!(sample.position.approx_eq(Vec3::new(10.0, 0.0, 0.0), EPS));
    }

    #[test]
    fn test_rejects_degenerate_paths() {
        assert_eq!(
            PathTimeline::new(vec![Vec3::ZERO], 1.0).unwrap_err(),
            ConfigurationError::TooFewPoints(1)
        );
        assert_eq!(
            PathTimeline::new(vec![Vec3::ZERO, Vec3::ZERO], 1.0).unwrap_err(),
            ConfigurationError::ZeroLength
        );
        assert_eq!(
            PathTimeline::new(
                vec![Vec3::ZERO, Vec3::ground(1.0, 0.0), Vec3::ground(1.0, 0.0)],
                1.0
            )
            .unwrap_err(),
            ConfigurationError::ZeroLengthSegment(1)
        );
        assert_eq!(
            PathTimeline::new(vec![Vec3::ZERO, Vec3::ground(1.0, 0.0)], 0.0).unwrap_err(),
            ConfigurationError::InvalidDuration(0.0)
        );
        assert!(matches!(
            PathTimeline::new(vec![Vec3::ZERO, Vec3::new(f32::NAN, 0.0, 0.0)], 1.0),
            Err(ConfigurationError::NonFinitePoint(1))
        ));
    }
}
