use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type};
use log::debug;

use crate::error::{Result, TrackError};
use crate::smoother::{checked, Smoother};
use crate::track::{SmoothedTrack, Track};

const ORDER: usize = 3;
/// Samples of odd extension added at each end before filtering.
const PAD_LEN: usize = 3 * (ORDER + 1);
/// The conjugate pole pair of a third-order Butterworth filter.
const Q_SECOND_ORDER_SECTION: f64 = 1.0;

/// Zero-phase third-order Butterworth low-pass, applied to latitude and
/// longitude separately.
///
/// The filter is a second-order section followed by a first-order one. Each
/// pass starts from the steady state of its first input sample, and the ends
/// are padded with an odd reflection of the signal, so the output neither
/// starts at zero nor bends at the edges.
#[derive(Debug, Clone, Copy)]
pub struct ButterworthSmoother {
    cutoff: f64,
    sections: [Coefficients<f64>; 2],
}

impl ButterworthSmoother {
    /// `cutoff` is a fraction of the Nyquist frequency.
    pub fn new(cutoff: f64) -> Result<Self> {
        if !(cutoff > 0.0 && cutoff < 1.0) {
            return Err(TrackError::Filter {
                reason: format!("cutoff must be between 0 and 1 of Nyquist, got {cutoff}"),
            });
        }

        // With a sample rate of 2 the Nyquist frequency is 1 and the cutoff
        // can be passed through as-is.
        let sample_rate = 2.0_f64;
        let second = Coefficients::<f64>::from_params(
            Type::LowPass,
            sample_rate.hz(),
            cutoff.hz(),
            Q_SECOND_ORDER_SECTION,
        )
        .map_err(|e| TrackError::Filter {
            reason: format!("second-order section: {e:?}"),
        })?;

        let k = (std::f64::consts::PI * cutoff / sample_rate).tan();
        let first = Coefficients {
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
            b0: k / (k + 1.0),
            b1: k / (k + 1.0),
            b2: 0.0,
        };

        Ok(ButterworthSmoother {
            cutoff,
            sections: [second, first],
        })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n < 2 {
            return x.to_vec();
        }
        let pad = PAD_LEN.min(n - 1);

        let mut extended = Vec::with_capacity(n + 2 * pad);
        for i in (1..=pad).rev() {
            extended.push(2.0 * x[0] - x[i]);
        }
        extended.extend_from_slice(x);
        for i in 1..=pad {
            extended.push(2.0 * x[n - 1] - x[n - 1 - i]);
        }

        let mut forward = self.run_cascade(&extended);
        forward.reverse();
        let mut backward = self.run_cascade(&forward);
        backward.reverse();

        backward[pad..pad + n].to_vec()
    }

    /// One causal pass. Filtering `x - x[0]` from rest is the same as starting
    /// at steady state for `x[0]`, because the DC gain is one.
    fn run_cascade(&self, x: &[f64]) -> Vec<f64> {
        let offset = x[0];
        let mut stages: Vec<DirectForm1<f64>> = self
            .sections
            .iter()
            .map(|&coeffs| DirectForm1::<f64>::new(coeffs))
            .collect();

        x.iter()
            .map(|&v| {
                let mut y = v - offset;
                for stage in stages.iter_mut() {
                    y = stage.run(y);
                }
                y + offset
            })
            .collect()
    }
}

impl Smoother for ButterworthSmoother {
    fn name(&self) -> &'static str {
        "butterworth"
    }

    fn smooth(&self, track: &Track) -> Result<SmoothedTrack> {
        let lats = self.filtfilt(&track.latitudes());
        let lons = self.filtfilt(&track.longitudes());
        debug!(
            "{}: butterworth smoothed {} fixes (cutoff {})",
            track.source().display(),
            track.len(),
            self.cutoff
        );
        checked(track, SmoothedTrack::from_axes(&lats, &lons), self.name())
    }
}
