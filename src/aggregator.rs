use log::debug;
use serde::{Deserialize, Serialize};

use crate::activity_filter::ActivityFilter;
use crate::error::{Result, TrackError};
use crate::segment::Segment;
use crate::track::{SmoothedTrack, Track};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_distance_m: f64,
    pub duration_min: f64,
}

impl RunMetrics {
    /// Average speed over the whole recorded span, pauses included.
    pub fn avg_speed_mps(&self) -> Option<f64> {
        if self.duration_min > 0.0 {
            Some(self.total_distance_m / (self.duration_min * 60.0))
        } else {
            None
        }
    }
}

/// Sum the distance of every running segment and measure the session span.
///
/// Distance comes from the smoothed coordinates with paused or walked segments
/// dropped. Duration is first-to-last timestamp of the raw track and ignores
/// the filter entirely.
pub fn aggregate(
    track: &Track,
    smoothed: &SmoothedTrack,
    filter: &ActivityFilter,
) -> Result<RunMetrics> {
    if track.len() < 2 {
        return Err(TrackError::EmptyTrack {
            path: track.source().to_path_buf(),
            points: track.len(),
        });
    }
    if smoothed.len() != track.len() {
        return Err(TrackError::malformed(
            track.source(),
            format!(
                "smoothed track has {} points but the track has {}",
                smoothed.len(),
                track.len()
            ),
        ));
    }

    let fixes = track.fixes();
    let coords = smoothed.points();
    let mut total_distance_m = 0.0;
    let mut excluded = 0usize;

    for i in 0..fixes.len() - 1 {
        let segment = Segment::between(coords[i], coords[i + 1], fixes[i].time, fixes[i + 1].time);
        if !segment.distance_m.is_finite() {
            return Err(TrackError::numeric(
                track.source(),
                format!("segment {i} has distance {}", segment.distance_m),
            ));
        }
        if filter.include(&segment) {
            total_distance_m += segment.distance_m;
        } else {
            excluded += 1;
        }
    }

    if !total_distance_m.is_finite() {
        return Err(TrackError::numeric(track.source(), "total distance overflowed"));
    }

    let span = fixes[fixes.len() - 1].time - fixes[0].time;
    let duration_min = span.num_milliseconds() as f64 / 1000.0 / 60.0;

    debug!(
        "{}: {:.1} m over {:.2} min, {} of {} segments excluded",
        track.source().display(),
        total_distance_m,
        duration_min,
        excluded,
        fixes.len() - 1
    );

    Ok(RunMetrics {
        total_distance_m,
        duration_min,
    })
}
