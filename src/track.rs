use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// One GPS observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    pub time: DateTime<Utc>,
}

impl Fix {
    pub fn new(lat: f64, lon: f64, time: DateTime<Utc>) -> Self {
        Fix { lat, lon, time }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Coordinate { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Fixes from one recording session, in time order.
///
/// Only the parser builds these, so a `Track` always has non-decreasing
/// timestamps. The source path is kept for error reporting.
#[derive(Debug, Clone)]
pub struct Track {
    source: PathBuf,
    fixes: Vec<Fix>,
}

impl Track {
    pub(crate) fn new(source: impl Into<PathBuf>, fixes: Vec<Fix>) -> Self {
        Track {
            source: source.into(),
            fixes,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn fixes(&self) -> &[Fix] {
        &self.fixes
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.fixes.iter().map(Fix::coordinate).collect()
    }

    pub fn latitudes(&self) -> Vec<f64> {
        self.fixes.iter().map(|f| f.lat).collect()
    }

    pub fn longitudes(&self) -> Vec<f64> {
        self.fixes.iter().map(|f| f.lon).collect()
    }
}

/// Denoised coordinates, index-aligned with the [`Track`] they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedTrack {
    points: Vec<Coordinate>,
}

impl SmoothedTrack {
    pub fn new(points: Vec<Coordinate>) -> Self {
        SmoothedTrack { points }
    }

    pub fn from_axes(lats: &[f64], lons: &[f64]) -> Self {
        let points = lats
            .iter()
            .zip(lons)
            .map(|(&lat, &lon)| Coordinate::new(lat, lon))
            .collect();
        SmoothedTrack { points }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
