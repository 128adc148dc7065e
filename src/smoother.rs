use crate::error::{Result, TrackError};
use crate::track::{SmoothedTrack, Track};

/// Turns raw fixes into denoised coordinates.
///
/// Implementations work in degrees and must return exactly one coordinate per
/// fix, in the same order, so timestamps can be looked up by index.
pub trait Smoother: Send + Sync {
    fn name(&self) -> &'static str;

    fn smooth(&self, track: &Track) -> Result<SmoothedTrack>;
}

/// Passes coordinates through untouched. The baseline the other smoothers are
/// compared against.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySmoother;

impl Smoother for IdentitySmoother {
    fn name(&self) -> &'static str {
        "none"
    }

    fn smooth(&self, track: &Track) -> Result<SmoothedTrack> {
        Ok(SmoothedTrack::new(track.coordinates()))
    }
}

/// Reject output that lost alignment with the track or went non-finite.
pub(crate) fn checked(
    track: &Track,
    smoothed: SmoothedTrack,
    smoother: &str,
) -> Result<SmoothedTrack> {
    if smoothed.len() != track.len() {
        return Err(TrackError::numeric(
            track.source(),
            format!(
                "{smoother} smoother returned {} points for {} fixes",
                smoothed.len(),
                track.len()
            ),
        ));
    }
    if let Some(i) = smoothed.points().iter().position(|c| !c.is_finite()) {
        return Err(TrackError::numeric(
            track.source(),
            format!("{smoother} smoother produced a non-finite coordinate at index {i}"),
        ));
    }
    Ok(smoothed)
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};

    use crate::track::{Fix, Track};

    /// A track sampled every `step_s` seconds.
    pub fn track_from(coords: &[(f64, f64)], step_s: i64) -> Track {
        let t0 = Utc.with_ymd_and_hms(2017, 6, 1, 18, 30, 0).unwrap();
        let fixes = coords
            .iter()
            .enumerate()
            .map(|(i, &(lat, lon))| Fix::new(lat, lon, t0 + Duration::seconds(step_s * i as i64)))
            .collect();
        Track::new("synthetic.gpx", fixes)
    }

    /// A straight eastward run with deterministic zig-zag jitter on top.
    pub fn jittery_line(n: usize, jitter_deg: f64) -> Track {
        let coords: Vec<(f64, f64)> = (0..n)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                (49.25 + sign * jitter_deg, -123.10 + i as f64 * 0.00003)
            })
            .collect();
        track_from(&coords, 1)
    }
}
