use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while turning one GPX file into run metrics.
///
/// Every variant is terminal for the track being processed. Callers running a
/// batch decide whether to skip the file and carry on.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("{} is not a usable track: {reason}", path.display())]
    MalformedTrack { path: PathBuf, reason: String },

    #[error("{} produced a non-finite value: {reason}", path.display())]
    Numeric { path: PathBuf, reason: String },

    #[error("{} has {points} usable points, at least 2 are needed for a distance", path.display())]
    EmptyTrack { path: PathBuf, points: usize },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("filter design failed: {reason}")]
    Filter { reason: String },

    #[error("invalid pipeline configuration: {reason}")]
    InvalidConfig { reason: String },
}

pub type Result<T> = std::result::Result<T, TrackError>;

impl TrackError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TrackError::MalformedTrack {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn numeric(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TrackError::Numeric {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrackError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        TrackError::Csv {
            path: path.into(),
            source,
        }
    }
}
