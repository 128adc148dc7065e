use std::path::Path;

use log::info;

use crate::aggregator::{aggregate, RunMetrics};
use crate::activity_filter::ActivityFilter;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::smoother::Smoother;
use crate::track::{SmoothedTrack, Track};
use crate::track_parser::parse_track;

/// Parse, smooth and integrate one GPX file at a time.
///
/// Holds only configuration, so one pipeline can be shared across threads.
pub struct TrackPipeline {
    config: PipelineConfig,
    smoother: Box<dyn Smoother>,
    filter: ActivityFilter,
}

impl TrackPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let smoother = config.smoother()?;
        let filter = config.activity_filter()?;
        Ok(TrackPipeline {
            config,
            smoother,
            filter,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn smoother_name(&self) -> &'static str {
        self.smoother.name()
    }

    /// Parse and smooth without aggregating, for exporting the cleaned path.
    pub fn smooth_track(&self, path: &Path) -> Result<(Track, SmoothedTrack)> {
        let track = parse_track(path, self.config.parse_mode)?;
        let smoothed = self.smoother.smooth(&track)?;
        Ok((track, smoothed))
    }

    pub fn metrics_for(&self, track: &Track, smoothed: &SmoothedTrack) -> Result<RunMetrics> {
        aggregate(track, smoothed, &self.filter)
    }

    pub fn compute_run_metrics(&self, path: &Path) -> Result<RunMetrics> {
        let (track, smoothed) = self.smooth_track(path)?;
        let metrics = self.metrics_for(&track, &smoothed)?;
        info!(
            "{}: {:.1} m in {:.1} min ({} smoothing)",
            path.display(),
            metrics.total_distance_m,
            metrics.duration_min,
            self.smoother.name()
        );
        Ok(metrics)
    }
}

/// Run metrics for one file with the default configuration.
pub fn compute_run_metrics(path: impl AsRef<Path>) -> Result<RunMetrics> {
    TrackPipeline::new(PipelineConfig::default())?.compute_run_metrics(path.as_ref())
}
