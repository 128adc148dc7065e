//! Batch bookkeeping around the pipeline: listing recordings, the session
//! manifest CSV, running every session, and the results CSV.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime};
use csv::{Reader, Writer};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::aggregator::RunMetrics;
use crate::error::{Result, TrackError};
use crate::pipeline::TrackPipeline;

/// Recorder file names carry the start time at this character range,
/// e.g. `RunKeep_20170601-183012.gpx`.
const FILENAME_DATETIME_RANGE: std::ops::Range<usize> = 8..23;
const FILENAME_DATETIME_FORMAT: &str = "%Y%m%d-%H%M%S";
const MANIFEST_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One recorded run as listed in the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Relative to the manifest's directory.
    pub filename: String,
    pub datetime: Option<NaiveDateTime>,
    /// Air temperature in °C, if someone wrote it down.
    pub temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestRecord {
    filename: String,
    #[serde(default)]
    datetime: String,
    #[serde(default)]
    temperature: Option<f64>,
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub session: Session,
    pub result: Result<RunMetrics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub session: Session,
    pub metrics: RunMetrics,
}

#[derive(Debug, Serialize)]
struct ResultRecord<'a> {
    filename: &'a str,
    datetime: String,
    temperature: Option<f64>,
    distance_m: f64,
    duration_min: f64,
    avg_speed_mps: Option<f64>,
}

/// Every `.gpx` file under `dir`, sorted by path.
pub fn scan_gpx_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_gpx = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"));
        if is_gpx {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn datetime_from_filename(filename: &str) -> Option<NaiveDateTime> {
    let stamp: String = filename
        .chars()
        .skip(FILENAME_DATETIME_RANGE.start)
        .take(FILENAME_DATETIME_RANGE.len())
        .collect();
    NaiveDateTime::parse_from_str(&stamp, FILENAME_DATETIME_FORMAT).ok()
}

/// Datetimes in a hand-edited manifest come in a few shapes.
pub fn parse_manifest_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    [
        FILENAME_DATETIME_FORMAT,
        MANIFEST_DATETIME_FORMAT,
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// List the recordings under `dir`, dating each one from its file name.
pub fn build_manifest(dir: &Path) -> Result<Vec<Session>> {
    let files = scan_gpx_files(dir)?;
    let mut sessions = Vec::with_capacity(files.len());

    for path in files {
        let relative = path.strip_prefix(dir).unwrap_or(&path);
        let filename = relative.to_string_lossy().replace('\\', "/");
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let datetime = datetime_from_filename(&file_name);
        if datetime.is_none() {
            warn!("{}: no start time in the file name, leaving datetime empty", filename);
        }

        sessions.push(Session {
            filename,
            datetime,
            temperature: None,
        });
    }

    info!("found {} GPX files under {}", sessions.len(), dir.display());
    Ok(sessions)
}

pub fn write_manifest(sessions: &[Session], path: &Path) -> Result<()> {
    let mut wtr = Writer::from_path(path).map_err(|e| TrackError::csv(path, e))?;
    for session in sessions {
        wtr.serialize(ManifestRecord {
            filename: session.filename.clone(),
            datetime: format_datetime(session.datetime),
            temperature: session.temperature,
        })
        .map_err(|e| TrackError::csv(path, e))?;
    }
    wtr.flush().map_err(|e| TrackError::io(path, e))?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<Vec<Session>> {
    let mut rdr = Reader::from_path(path).map_err(|e| TrackError::csv(path, e))?;
    let mut sessions = Vec::new();

    for record in rdr.deserialize::<ManifestRecord>() {
        let record = record.map_err(|e| TrackError::csv(path, e))?;
        let datetime = parse_manifest_datetime(&record.datetime);
        if datetime.is_none() && !record.datetime.trim().is_empty() {
            warn!(
                "{}: unrecognised datetime {:?} for {}",
                path.display(),
                record.datetime,
                record.filename
            );
        }
        sessions.push(Session {
            filename: record.filename,
            datetime,
            temperature: record.temperature,
        });
    }

    info!("loaded {} sessions from {}", sessions.len(), path.display());
    Ok(sessions)
}

/// Run the pipeline over every session in parallel. Outcomes keep the input
/// order; failures are reported, never replaced by a zero distance.
pub fn analyze_sessions(
    pipeline: &TrackPipeline,
    sessions: &[Session],
    base_dir: &Path,
) -> Vec<SessionOutcome> {
    let total = sessions.len();
    let processed = AtomicUsize::new(0);
    let start = Instant::now();

    info!(
        "processing {} sessions on {} cores with {} smoothing",
        total,
        num_cpus::get(),
        pipeline.smoother_name()
    );

    let outcomes: Vec<SessionOutcome> = sessions
        .par_iter()
        .map(|session| {
            let path = base_dir.join(&session.filename);
            let result = pipeline.compute_run_metrics(&path);
            if let Err(e) = &result {
                warn!("skipping {}: {}", session.filename, e);
            }

            let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 50 == 0 || count == total {
                info!("progress: {}/{} sessions", count, total);
            }

            SessionOutcome {
                session: session.clone(),
                result,
            }
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        "processed {} sessions ({} failed) in {:.2}s",
        total,
        failed,
        start.elapsed().as_secs_f64()
    );
    outcomes
}

/// Keep the sessions that produced metrics.
pub fn successful(outcomes: Vec<SessionOutcome>) -> Vec<SessionResult> {
    outcomes
        .into_iter()
        .filter_map(|outcome| match outcome.result {
            Ok(metrics) => Some(SessionResult {
                session: outcome.session,
                metrics,
            }),
            Err(_) => None,
        })
        .collect()
}

pub fn write_session_results(results: &[SessionResult], path: &Path) -> Result<()> {
    let mut wtr = Writer::from_path(path).map_err(|e| TrackError::csv(path, e))?;
    for r in results {
        wtr.serialize(ResultRecord {
            filename: &r.session.filename,
            datetime: format_datetime(r.session.datetime),
            temperature: r.session.temperature,
            distance_m: r.metrics.total_distance_m,
            duration_min: r.metrics.duration_min,
            avg_speed_mps: r.metrics.avg_speed_mps(),
        })
        .map_err(|e| TrackError::csv(path, e))?;
    }
    wtr.flush().map_err(|e| TrackError::io(path, e))?;
    Ok(())
}

fn format_datetime(datetime: Option<NaiveDateTime>) -> String {
    datetime
        .map(|dt| dt.format(MANIFEST_DATETIME_FORMAT).to_string())
        .unwrap_or_default()
}
