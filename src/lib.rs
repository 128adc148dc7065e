//! # GPX Run Metrics
//!
//! Distance and duration of running sessions recorded as GPX tracks.
//!
//! Raw GPS fixes jitter by several metres, so summing the distance between
//! consecutive fixes overstates how far you ran. The pipeline here:
//! - parses the fixes and their timestamps
//! - smooths the path (Kalman by default, Butterworth or none on request)
//! - sums haversine distances, skipping pauses and walking
//! - measures duration from the first to the last timestamp
//!
//! The [`session`] and [`trends`] modules run the pipeline over a directory of
//! recordings and look for trends against time and temperature.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gpx_run_metrics::{PipelineConfig, SmoothingMode, TrackPipeline};
//!
//! let pipeline = TrackPipeline::new(
//!     PipelineConfig::default().with_smoothing(SmoothingMode::Butterworth),
//! )?;
//! let metrics = pipeline.compute_run_metrics("RunKeep_20170601-183012.gpx".as_ref())?;
//! println!("{:.0} m in {:.1} min", metrics.total_distance_m, metrics.duration_min);
//! # Ok::<(), gpx_run_metrics::TrackError>(())
//! ```

pub mod error;
pub use error::{Result, TrackError};

pub mod config;
pub use config::{ParseMode, PipelineConfig, SmoothingMode};

pub mod track;
pub use track::{Coordinate, Fix, SmoothedTrack, Track};

pub mod track_parser;
pub use track_parser::{parse_track, parse_track_from_reader, write_track};

// Smoothers, one capability with three implementations
pub mod smoother;
pub use smoother::{IdentitySmoother, Smoother};
pub mod kalman_smoother;
pub use kalman_smoother::KalmanSmoother;
pub mod butterworth_smoother;
pub use butterworth_smoother::ButterworthSmoother;

pub mod segment;
pub use segment::{segment_distance, Segment, EARTH_RADIUS_M};

pub mod activity_filter;
pub use activity_filter::ActivityFilter;

pub mod aggregator;
pub use aggregator::{aggregate, RunMetrics};

pub mod pipeline;
pub use pipeline::{compute_run_metrics, TrackPipeline};

// Batch glue around the pipeline
pub mod session;
pub use session::{Session, SessionOutcome, SessionResult};
pub mod trends;
pub use trends::{
    linear_fit, mann_whitney_u, summarize_trends, LinearFit, MannWhitney, TrendSummary,
};
