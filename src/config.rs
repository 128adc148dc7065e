use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::activity_filter::ActivityFilter;
use crate::butterworth_smoother::ButterworthSmoother;
use crate::error::{Result, TrackError};
use crate::kalman_smoother::KalmanSmoother;
use crate::smoother::{IdentitySmoother, Smoother};

/// Which smoother the pipeline runs before integrating distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingMode {
    #[default]
    Kalman,
    Butterworth,
    None,
}

/// How forgiving the GPX reader is about broken XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[default]
    Strict,
    /// Retry once after minimal repairs (missing declaration, truncated file, stray bytes).
    Tolerant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Segments longer than this are pauses unless they were run fast enough.
    pub gap_threshold_sec: f64,
    /// Seconds per metre; 0.67 s/m is roughly 1.5 m/s.
    pub slow_pace_threshold: f64,
    pub smoothing: SmoothingMode,
    /// Kalman observation noise, in degrees.
    pub observation_stddev: f64,
    /// Kalman process noise, in degrees.
    pub transition_stddev: f64,
    /// Butterworth cutoff as a fraction of Nyquist, in (0, 1).
    pub butterworth_cutoff: f64,
    pub parse_mode: ParseMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            gap_threshold_sec: 8.0,
            slow_pace_threshold: 0.67,
            smoothing: SmoothingMode::Kalman,
            observation_stddev: 20.0 / 100_000.0,
            transition_stddev: 10.0 / 100_000.0,
            butterworth_cutoff: 0.3,
            parse_mode: ParseMode::Strict,
        }
    }
}

impl PipelineConfig {
    pub fn with_smoothing(mut self, smoothing: SmoothingMode) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }

    /// Thresholds must be finite, with a non-negative gap and a positive pace.
    pub fn activity_filter(&self) -> Result<ActivityFilter> {
        let gap_sec = self.gap_threshold_sec;
        if !(gap_sec.is_finite() && gap_sec >= 0.0) {
            return Err(TrackError::InvalidConfig {
                reason: format!(
                    "gap threshold must be a non-negative number of seconds, got {gap_sec}"
                ),
            });
        }
        let pace = self.slow_pace_threshold;
        if !(pace.is_finite() && pace > 0.0) {
            return Err(TrackError::InvalidConfig {
                reason: format!("slow pace threshold must be positive, got {pace} s/m"),
            });
        }

        let gap_ms = (gap_sec * 1000.0).round() as i64;
        let gap = Duration::try_milliseconds(gap_ms).ok_or_else(|| TrackError::InvalidConfig {
            reason: format!("gap threshold of {gap_sec} s is out of range"),
        })?;
        Ok(ActivityFilter::new(gap, pace))
    }

    /// Build the smoother this configuration selects.
    pub fn smoother(&self) -> Result<Box<dyn Smoother>> {
        let smoother: Box<dyn Smoother> = match self.smoothing {
            SmoothingMode::Kalman => {
                let valid = self.observation_stddev.is_finite()
                    && self.observation_stddev > 0.0
                    && self.transition_stddev.is_finite()
                    && self.transition_stddev >= 0.0;
                if !valid {
                    return Err(TrackError::Filter {
                        reason: format!(
                            "kalman noise must be finite with a positive observation term, \
                             got observation {} transition {}",
                            self.observation_stddev, self.transition_stddev
                        ),
                    });
                }
                Box::new(KalmanSmoother::new(self.observation_stddev, self.transition_stddev))
            }
            SmoothingMode::Butterworth => {
                Box::new(ButterworthSmoother::new(self.butterworth_cutoff)?)
            }
            SmoothingMode::None => Box::new(IdentitySmoother),
        };
        Ok(smoother)
    }
}
