//! Fixed-interval Kalman smoother for GPS positions.
//!
//! The state is (lat, lon) in degrees with an identity transition: a runner's
//! position does not jump between fixes. Process and observation covariances
//! are both isotropic, so the two axes never couple and each one is run as an
//! independent scalar filter. That is exact for this model, not an
//! approximation.
//!
//! Forward pass: ordinary Kalman filter seeded with the first fix and the
//! observation variance. Backward pass: Rauch-Tung-Striebel.

use log::debug;

use crate::error::Result;
use crate::smoother::{checked, Smoother};
use crate::track::{SmoothedTrack, Track};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanSmoother {
    observation_variance: f64,
    transition_variance: f64,
}

impl KalmanSmoother {
    /// Standard deviations are in degrees.
    pub fn new(observation_stddev: f64, transition_stddev: f64) -> Self {
        KalmanSmoother {
            observation_variance: observation_stddev * observation_stddev,
            transition_variance: transition_stddev * transition_stddev,
        }
    }

    fn smooth_axis(&self, observations: &[f64]) -> Vec<f64> {
        let n = observations.len();
        if n == 0 {
            return Vec::new();
        }
        let r = self.observation_variance;
        let q = self.transition_variance;

        let mut filtered_mean = Vec::with_capacity(n);
        let mut filtered_var = Vec::with_capacity(n);

        let mut predicted_mean = observations[0];
        let mut predicted_var = r;
        for (t, &z) in observations.iter().enumerate() {
            if t > 0 {
                predicted_mean = filtered_mean[t - 1];
                predicted_var = filtered_var[t - 1] + q;
            }
            let gain = predicted_var / (predicted_var + r);
            filtered_mean.push(predicted_mean + gain * (z - predicted_mean));
            filtered_var.push((1.0 - gain) * predicted_var);
        }

        let mut smoothed = filtered_mean.clone();
        for t in (0..n - 1).rev() {
            // predicted mean for t+1 is filtered_mean[t] under an identity transition
            let gain = filtered_var[t] / (filtered_var[t] + q);
            smoothed[t] = filtered_mean[t] + gain * (smoothed[t + 1] - filtered_mean[t]);
        }
        smoothed
    }
}

impl Smoother for KalmanSmoother {
    fn name(&self) -> &'static str {
        "kalman"
    }

    fn smooth(&self, track: &Track) -> Result<SmoothedTrack> {
        let lats = self.smooth_axis(&track.latitudes());
        let lons = self.smooth_axis(&track.longitudes());
        debug!(
            "{}: kalman smoothed {} fixes (r={:e}, q={:e})",
            track.source().display(),
            track.len(),
            self.observation_variance,
            self.transition_variance
        );
        checked(track, SmoothedTrack::from_axes(&lats, &lons), self.name())
    }
}
