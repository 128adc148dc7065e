use chrono::Duration;

use crate::segment::Segment;

/// Decides whether a segment was spent running.
///
/// A segment is dropped only when it is both long (a pause or GPS dropout)
/// and slow (walking or standing). A long gap covered at running pace still
/// counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityFilter {
    gap_threshold: Duration,
    slow_pace_threshold: f64,
}

impl Default for ActivityFilter {
    fn default() -> Self {
        ActivityFilter::new(Duration::seconds(8), 0.67)
    }
}

impl ActivityFilter {
    pub fn new(gap_threshold: Duration, slow_pace_threshold: f64) -> Self {
        ActivityFilter {
            gap_threshold,
            slow_pace_threshold,
        }
    }

    pub fn gap_threshold(&self) -> Duration {
        self.gap_threshold
    }

    pub fn slow_pace_threshold(&self) -> f64 {
        self.slow_pace_threshold
    }

    pub fn include(&self, segment: &Segment) -> bool {
        if segment.elapsed <= self.gap_threshold {
            return true;
        }
        match segment.pace() {
            Some(pace) => pace <= self.slow_pace_threshold,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(elapsed_s: i64, distance_m: f64) -> Segment {
        Segment::new(distance_m, Duration::seconds(elapsed_s))
    }

    #[test]
    fn test_slow_long_segment_is_excluded() {
        // 10 s/m
        assert!(!ActivityFilter::default().include(&seg(10, 1.0)));
    }

    #[test]
    fn test_fast_long_segment_is_included() {
        // 0.5 s/m
        assert!(ActivityFilter::default().include(&seg(10, 20.0)));
    }

    #[test]
    fn test_short_segment_is_always_included() {
        let filter = ActivityFilter::default();
        for distance in [0.0, 0.1, 1.0, 50.0, 5000.0] {
            assert!(filter.include(&seg(5, distance)));
        }
    }

    #[test]
    fn test_gap_threshold_is_inclusive() {
        assert!(ActivityFilter::default().include(&seg(8, 0.5)));
        assert!(!ActivityFilter::default().include(&seg(9, 0.5)));
    }

    #[test]
    fn test_standing_still_through_a_gap_is_excluded() {
        assert!(!ActivityFilter::default().include(&seg(30, 0.0)));
        assert!(ActivityFilter::default().include(&seg(0, 0.0)));
    }

    #[test]
    fn test_custom_thresholds() {
        let filter = ActivityFilter::new(Duration::seconds(2), 1.0);
        // 3 s over 4 m is 0.75 s/m
        assert!(filter.include(&seg(3, 4.0)));
        assert!(!filter.include(&seg(3, 2.0)));
    }
}
