use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::session::SessionResult;

/// Runs at or above this air temperature (°C) count as hot.
pub const HEAT_THRESHOLD_C: f64 = 19.0;

/// Two-sided significance level for the trend and hot/cool tests.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Ordinary least-squares line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Two-sided p-value for a zero slope, Student's t with n - 2 degrees of
    /// freedom. `None` with only two samples.
    pub p_value: Option<f64>,
    pub samples: usize,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Slope per day when x is a unix timestamp in seconds.
    pub fn slope_per_day(&self) -> f64 {
        self.slope * SECONDS_PER_DAY
    }

    /// Whether a zero slope is rejected at [`SIGNIFICANCE_LEVEL`].
    pub fn is_significant(&self) -> bool {
        self.p_value.is_some_and(|p| p < SIGNIFICANCE_LEVEL)
    }
}

/// `None` with fewer than two points or when every x is the same.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let r_squared = if syy == 0.0 { 1.0 } else { (sxy * sxy) / (sxx * syy) };

    Some(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
        r_squared,
        p_value: slope_p_value(slope, sxx, syy - slope * sxy, n),
        samples: n,
    })
}

fn slope_p_value(slope: f64, sxx: f64, residual_ss: f64, n: usize) -> Option<f64> {
    if n < 3 {
        return None;
    }
    let dof = (n - 2) as f64;
    let residual_ss = residual_ss.max(0.0);
    if residual_ss == 0.0 {
        // every point on the line
        return Some(if slope == 0.0 { 1.0 } else { 0.0 });
    }

    let t = slope / (residual_ss / dof / sxx).sqrt();
    let students_t = StudentsT::new(0.0, 1.0, dof).ok()?;
    Some(2.0 * students_t.sf(t.abs()))
}

/// Result of a two-sided Mann-Whitney U test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MannWhitney {
    /// U statistic of the first sample.
    pub u: f64,
    pub p_value: f64,
}

impl MannWhitney {
    pub fn is_significant(&self) -> bool {
        self.p_value < SIGNIFICANCE_LEVEL
    }
}

/// Two-sided Mann-Whitney U test using the normal approximation with tie and
/// continuity corrections.
///
/// `None` when either sample is empty, a value is not finite, or every value
/// is tied.
pub fn mann_whitney_u(first: &[f64], second: &[f64]) -> Option<MannWhitney> {
    if first.is_empty() || second.is_empty() {
        return None;
    }
    if first.iter().chain(second).any(|v| !v.is_finite()) {
        return None;
    }

    let mut pooled: Vec<(f64, bool)> = first
        .iter()
        .map(|&v| (v, true))
        .chain(second.iter().map(|&v| (v, false)))
        .collect();
    pooled.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n = pooled.len();
    let mut first_rank_sum = 0.0;
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && pooled[end].0 == pooled[start].0 {
            end += 1;
        }
        // ranks start+1..=end share their mean
        let rank = (start + 1 + end) as f64 / 2.0;
        let tied = (end - start) as f64;
        tie_term += tied * tied * tied - tied;
        let from_first = pooled[start..end].iter().filter(|(_, is_first)| *is_first).count();
        first_rank_sum += rank * from_first as f64;
        start = end;
    }

    let (n1, n2, total) = (first.len() as f64, second.len() as f64, n as f64);
    let u = first_rank_sum - n1 * (n1 + 1.0) / 2.0;
    let mean = n1 * n2 / 2.0;
    let variance = n1 * n2 / 12.0 * ((total + 1.0) - tie_term / (total * (total - 1.0)));
    if variance <= 0.0 {
        return None;
    }

    let z = (u.max(n1 * n2 - u) - mean - 0.5) / variance.sqrt();
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some(MannWhitney {
        u,
        p_value: (2.0 * normal.sf(z)).min(1.0),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupSummary {
    pub count: usize,
    pub mean_distance_m: f64,
    pub mean_duration_min: f64,
    pub mean_speed_mps: Option<f64>,
}

impl GroupSummary {
    fn from_results(results: &[&SessionResult]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        let n = results.len() as f64;
        let speeds: Vec<f64> = results.iter().filter_map(|r| r.metrics.avg_speed_mps()).collect();

        Some(GroupSummary {
            count: results.len(),
            mean_distance_m: results.iter().map(|r| r.metrics.total_distance_m).sum::<f64>() / n,
            mean_duration_min: results.iter().map(|r| r.metrics.duration_min).sum::<f64>() / n,
            mean_speed_mps: if speeds.is_empty() {
                None
            } else {
                Some(speeds.iter().sum::<f64>() / speeds.len() as f64)
            },
        })
    }
}

/// Split into (hot, cool); sessions without a temperature are in neither.
pub fn split_by_temperature(
    results: &[SessionResult],
    threshold_c: f64,
) -> (Vec<&SessionResult>, Vec<&SessionResult>) {
    results
        .iter()
        .filter(|r| r.session.temperature.is_some())
        .partition(|r| r.session.temperature.is_some_and(|t| t >= threshold_c))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub distance: Option<LinearFit>,
    pub duration: Option<LinearFit>,
    pub speed: Option<LinearFit>,
    pub hot: Option<GroupSummary>,
    pub cool: Option<GroupSummary>,
    /// Average speed on hot days against cool days.
    pub hot_vs_cool_speed: Option<MannWhitney>,
}

/// Fit distance, duration and speed against session start time, and compare
/// hot against cool days.
pub fn summarize_trends(results: &[SessionResult]) -> TrendSummary {
    let dated: Vec<(f64, &SessionResult)> = results
        .iter()
        .filter_map(|r| r.session.datetime.map(|dt| (dt.and_utc().timestamp() as f64, r)))
        .collect();

    let (hot, cool) = split_by_temperature(results, HEAT_THRESHOLD_C);
    let hot_speeds: Vec<f64> = hot.iter().filter_map(|r| r.metrics.avg_speed_mps()).collect();
    let cool_speeds: Vec<f64> = cool.iter().filter_map(|r| r.metrics.avg_speed_mps()).collect();

    TrendSummary {
        distance: fit_against_time(&dated, |r| Some(r.metrics.total_distance_m)),
        duration: fit_against_time(&dated, |r| Some(r.metrics.duration_min)),
        speed: fit_against_time(&dated, |r| r.metrics.avg_speed_mps()),
        hot: GroupSummary::from_results(&hot),
        cool: GroupSummary::from_results(&cool),
        hot_vs_cool_speed: mann_whitney_u(&hot_speeds, &cool_speeds),
    }
}

fn fit_against_time(
    dated: &[(f64, &SessionResult)],
    value: impl Fn(&SessionResult) -> Option<f64>,
) -> Option<LinearFit> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = dated
        .iter()
        .filter_map(|&(x, r)| value(r).map(|y| (x, y)))
        .unzip();
    linear_fit(&xs, &ys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RunMetrics;
    use crate::session::Session;
    use chrono::NaiveDate;

    fn result(
        day: u32,
        temperature: Option<f64>,
        distance_m: f64,
        duration_min: f64,
    ) -> SessionResult {
        SessionResult {
            session: Session {
                filename: format!("run{day}.gpx"),
                datetime: NaiveDate::from_ymd_opt(2017, 6, day)
                    .and_then(|d| d.and_hms_opt(7, 0, 0)),
                temperature,
            },
            metrics: RunMetrics {
                total_distance_m: distance_m,
                duration_min,
            },
        }
    }

    #[test]
    fn test_linear_fit_exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let fit = linear_fit(&xs, &ys).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!((fit.predict(10.0) - 21.0).abs() < 1e-9);
        assert!(fit.p_value.unwrap() < 1e-6);
        assert!(fit.is_significant());
    }

    #[test]
    fn test_linear_fit_degenerate_inputs() {
        assert_eq!(linear_fit(&[1.0], &[2.0]), None);
        assert_eq!(linear_fit(&[1.0, 1.0], &[2.0, 3.0]), None);
    }

    #[test]
    fn test_linear_fit_noisy() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [2.0, 4.1, 5.9, 8.2, 9.8];
        let fit = linear_fit(&xs, &ys).unwrap();
        assert!((fit.slope - 1.97).abs() < 1e-9);
        assert!(fit.r_squared > 0.99 && fit.r_squared < 1.0);
        assert!((fit.p_value.unwrap() - 4.8054229e-5).abs() < 1e-9);
    }

    #[test]
    fn test_flat_noisy_trend_is_not_significant() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ys = [5.0, 4.0, 6.0, 5.5, 4.5, 5.2];
        let fit = linear_fit(&xs, &ys).unwrap();
        assert!((fit.p_value.unwrap() - 0.776412070).abs() < 1e-6);
        assert!(!fit.is_significant());
    }

    #[test]
    fn test_two_points_have_no_p_value() {
        let fit = linear_fit(&[0.0, 1.0], &[3.0, 5.0]).unwrap();
        assert_eq!(fit.p_value, None);
        assert!(!fit.is_significant());
    }

    #[test]
    fn test_mann_whitney_with_ties() {
        let hot = [3.1, 2.9, 3.4, 2.7];
        let cool = [2.5, 2.8, 2.6, 2.9, 2.4];
        let test = mann_whitney_u(&hot, &cool).unwrap();
        assert_eq!(test.u, 17.5);
        assert!((test.p_value - 0.0850999325).abs() < 1e-8);
        assert!(!test.is_significant());

        // U of the second sample is the complement, the p-value is symmetric
        let swapped = mann_whitney_u(&cool, &hot).unwrap();
        assert_eq!(swapped.u, 20.0 - 17.5);
        assert!((swapped.p_value - test.p_value).abs() < 1e-12);
    }

    #[test]
    fn test_mann_whitney_identical_samples() {
        let test = mann_whitney_u(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(test.u, 4.5);
        assert_eq!(test.p_value, 1.0);
    }

    #[test]
    fn test_mann_whitney_degenerate_inputs() {
        assert_eq!(mann_whitney_u(&[], &[1.0]), None);
        assert_eq!(mann_whitney_u(&[2.0, 2.0], &[2.0]), None);
        assert_eq!(mann_whitney_u(&[f64::NAN], &[1.0]), None);
    }

    #[test]
    fn test_split_by_temperature() {
        let results = vec![
            result(1, Some(25.0), 5000.0, 30.0),
            result(2, Some(19.0), 5200.0, 31.0),
            result(3, Some(12.0), 6000.0, 32.0),
            result(4, None, 7000.0, 40.0),
        ];
        let (hot, cool) = split_by_temperature(&results, HEAT_THRESHOLD_C);
        assert_eq!(hot.len(), 2);
        assert_eq!(cool.len(), 1);
        assert_eq!(cool[0].session.filename, "run3.gpx");
    }

    #[test]
    fn test_summary_tracks_growth_per_day() {
        let results = vec![
            result(1, Some(25.0), 5000.0, 30.0),
            result(2, Some(15.0), 5100.0, 30.0),
            result(3, Some(21.0), 5200.0, 30.0),
        ];
        let summary = summarize_trends(&results);

        let distance = summary.distance.unwrap();
        assert!((distance.slope_per_day() - 100.0).abs() < 1e-6);
        assert_eq!(distance.samples, 3);

        let hot = summary.hot.unwrap();
        assert_eq!(hot.count, 2);
        assert!((hot.mean_distance_m - 5100.0).abs() < 1e-9);
        let cool = summary.cool.unwrap();
        assert_eq!(cool.count, 1);
        assert!((cool.mean_speed_mps.unwrap() - 5100.0 / 1800.0).abs() < 1e-12);

        // hot runs were 5000 and 5200 m in 30 min, the cool one 5100 m
        let speed_test = summary.hot_vs_cool_speed.unwrap();
        assert_eq!(speed_test.u, 1.0);
    }
}
