use chrono::{DateTime, Duration, Utc};

use crate::track::Coordinate;

/// Spherical Earth radius used for every distance in this crate.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in metres between two points given in degrees.
pub fn segment_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    // Rounding can push h just past 1 for antipodal points.
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// The stretch between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub distance_m: f64,
    pub elapsed: Duration,
}

impl Segment {
    pub fn new(distance_m: f64, elapsed: Duration) -> Self {
        Segment {
            distance_m,
            elapsed,
        }
    }

    /// Distance from the (smoothed) coordinates, time from the recorded fixes.
    pub fn between(a: Coordinate, b: Coordinate, t_a: DateTime<Utc>, t_b: DateTime<Utc>) -> Self {
        Segment::new(segment_distance(a, b), t_b - t_a)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.num_milliseconds() as f64 / 1000.0
    }

    /// Seconds per metre, undefined for a segment that did not move.
    pub fn pace(&self) -> Option<f64> {
        if self.distance_m > 0.0 {
            Some(self.elapsed_secs() / self.distance_m)
        } else {
            None
        }
    }
}
