//! GPX reading and writing.
//!
//! Points are collected in document order across every track and segment,
//! each paired with its own `<time>`. A recording whose final point lost its
//! timestamp is accepted without that point; any other gap is an error.
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read};
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use geo::point;
use gpx::{read, write, Gpx, GpxVersion, Track as GpxTrack, TrackSegment, Waypoint};
use log::{debug, warn};

use crate::config::ParseMode;
use crate::error::{Result, TrackError};
use crate::track::{Fix, SmoothedTrack, Track};

pub fn parse_track(path: &Path, mode: ParseMode) -> Result<Track> {
    let file = File::open(path).map_err(|e| TrackError::io(path, e))?;
    let reader = BufReader::new(file);

    match mode {
        ParseMode::Strict => parse_track_from_reader(reader, path),
        ParseMode::Tolerant => parse_tolerantly(reader, path),
    }
}

/// Parse a GPX document from any reader. `source` only labels errors.
pub fn parse_track_from_reader<R: Read>(reader: R, source: &Path) -> Result<Track> {
    let gpx = read(reader)
        .map_err(|e| TrackError::malformed(source, format!("unreadable GPX: {e}")))?;
    track_from_gpx(&gpx, source)
}

fn parse_tolerantly<R: Read>(mut reader: R, source: &Path) -> Result<Track> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| TrackError::io(source, e))?;

    match read(Cursor::new(&bytes)) {
        Ok(gpx) => track_from_gpx(&gpx, source),
        Err(e) => {
            warn!(
                "{}: standard parsing failed ({}), retrying after repairs",
                source.display(),
                e
            );
            let repaired = apply_minimal_repairs(&String::from_utf8_lossy(&bytes));
            let gpx = read(Cursor::new(repaired.as_bytes())).map_err(|e| {
                TrackError::malformed(source, format!("unreadable GPX even after repairs: {e}"))
            })?;
            track_from_gpx(&gpx, source)
        }
    }
}

fn track_from_gpx(gpx: &Gpx, source: &Path) -> Result<Track> {
    let points: Vec<&Waypoint> = gpx
        .tracks
        .iter()
        .flat_map(|track| &track.segments)
        .flat_map(|segment| &segment.points)
        .collect();

    if points.is_empty() {
        return Err(TrackError::malformed(source, "no track points found"));
    }

    let last = points.len() - 1;
    let mut fixes: Vec<Fix> = Vec::with_capacity(points.len());

    for (i, pt) in points.iter().enumerate() {
        let lat = pt.point().y();
        let lon = pt.point().x();
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(TrackError::malformed(
                source,
                format!("track point {i} has out-of-range coordinates ({lat}, {lon})"),
            ));
        }

        let time = match pt.time.clone() {
            Some(t) => to_utc(t).ok_or_else(|| {
                TrackError::malformed(
                    source,
                    format!("track point {i} has an unrepresentable time"),
                )
            })?,
            None if i == last && i > 0 => {
                warn!(
                    "{}: final track point has no timestamp, dropping it",
                    source.display()
                );
                break;
            }
            None => {
                return Err(TrackError::malformed(
                    source,
                    format!("track point {i} of {} has no timestamp", points.len()),
                ));
            }
        };

        if let Some(prev) = fixes.last() {
            if time < prev.time {
                return Err(TrackError::malformed(
                    source,
                    format!(
                        "timestamp goes backwards at track point {i} ({} < {})",
                        time, prev.time
                    ),
                ));
            }
        }

        fixes.push(Fix::new(lat, lon, time));
    }

    debug!("{}: parsed {} fixes", source.display(), fixes.len());
    Ok(Track::new(source, fixes))
}

fn to_utc(stamp: gpx::Time) -> Option<DateTime<Utc>> {
    let odt: time::OffsetDateTime = stamp.into();
    Utc.timestamp_opt(odt.unix_timestamp(), odt.nanosecond()).single()
}

/// Write smoothed coordinates as a bare GPX 1.1 point list for visual inspection.
pub fn write_track(smoothed: &SmoothedTrack, path: &Path) -> Result<()> {
    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some("gpx-run-metrics".to_string());

    let mut segment = TrackSegment::new();
    for c in smoothed.points() {
        segment.points.push(Waypoint::new(point!(x: c.lon, y: c.lat)));
    }

    let mut track = GpxTrack::new();
    track.segments.push(segment);
    gpx.tracks.push(track);

    let file = File::create(path).map_err(|e| TrackError::io(path, e))?;
    write(&gpx, BufWriter::new(file))
        .map_err(|e| TrackError::io(path, std::io::Error::other(e.to_string())))?;

    debug!("wrote {} smoothed points to {}", smoothed.len(), path.display());
    Ok(())
}

/// Repairs that never invent or move a fix.
fn apply_minimal_repairs(content: &str) -> String {
    let mut repaired = remove_invalid_xml_chars(content);

    if !repaired.trim_start().starts_with("<?xml") {
        repaired = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", repaired.trim_start());
    }

    if repaired.contains("<gpx") {
        repaired = add_gpx_version(&repaired);
    }

    close_truncated_document(&repaired)
}

fn add_gpx_version(content: &str) -> String {
    let Some(gpx_start) = content.find("<gpx") else {
        return content.to_string();
    };
    let Some(gpx_len) = content[gpx_start..].find('>') else {
        return content.to_string();
    };

    let gpx_tag = &content[gpx_start..gpx_start + gpx_len + 1];
    if gpx_tag.contains("version=") {
        return content.to_string();
    }

    let mut new_tag = gpx_tag.trim_end_matches('>').to_string();
    new_tag.push_str(" version=\"1.1\"");
    if !gpx_tag.contains("xmlns=") {
        new_tag.push_str(" xmlns=\"http://www.topografix.com/GPX/1/1\"");
    }
    new_tag.push('>');

    content.replacen(gpx_tag, &new_tag, 1)
}

/// A file cut off mid-recording keeps every complete `<trkpt>` and gets its
/// open containers closed.
fn close_truncated_document(content: &str) -> String {
    let trimmed = content.trim_end();
    if trimmed.ends_with("</gpx>") || !trimmed.contains("<gpx") {
        return trimmed.to_string();
    }

    let mut repaired = match trimmed.rfind("</trkpt>") {
        Some(end) => trimmed[..end + "</trkpt>".len()].to_string(),
        None => trimmed.to_string(),
    };

    let open_trkseg = repaired.matches("<trkseg>").count();
    let close_trkseg = repaired.matches("</trkseg>").count();
    for _ in close_trkseg..open_trkseg {
        repaired.push_str("\n</trkseg>");
    }

    let open_trk = repaired.matches("<trk>").count();
    let close_trk = repaired.matches("</trk>").count();
    for _ in close_trk..open_trk {
        repaired.push_str("\n</trk>");
    }

    repaired.push_str("\n</gpx>\n");
    repaired
}

fn remove_invalid_xml_chars(content: &str) -> String {
    content
        .chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r')
                || (' '..='\u{D7FF}').contains(&c)
                || ('\u{E000}'..='\u{FFFD}').contains(&c)
                || c >= '\u{10000}'
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
<metadata><time>2017-06-01T18:29:00Z</time></metadata>
<trk><trkseg>"#;
    const FOOTER: &str = "</trkseg></trk></gpx>";

    fn doc(points: &str) -> String {
        format!("{HEADER}{points}{FOOTER}")
    }

    fn parse_str(content: &str) -> Result<Track> {
        parse_track_from_reader(content.as_bytes(), Path::new("test.gpx"))
    }

    #[test]
    fn test_reads_every_point_with_its_time() {
        let content = doc(r#"
<trkpt lat="49.2800" lon="-123.1200"><time>2017-06-01T18:30:00Z</time></trkpt>
<trkpt lat="49.2801" lon="-123.1201"><time>2017-06-01T18:30:02Z</time></trkpt>
<trkpt lat="49.2802" lon="-123.1202"><time>2017-06-01T18:30:04Z</time></trkpt>"#);

        let track = parse_str(&content).unwrap();
        assert_eq!(track.len(), 3);
        assert_eq!(track.fixes()[2].lat, 49.2802);
        assert_eq!(track.fixes()[2].lon, -123.1202);
        let span = track.fixes()[2].time - track.fixes()[0].time;
        assert_eq!(span.num_seconds(), 4);
    }

    #[test]
    fn test_points_across_segments_are_concatenated() {
        let content = format!(
            "{HEADER}<trkpt lat=\"1.0\" lon=\"1.0\"><time>2017-06-01T18:30:00Z</time></trkpt>\
             </trkseg><trkseg>\
             <trkpt lat=\"1.1\" lon=\"1.1\"><time>2017-06-01T18:30:05Z</time></trkpt>{FOOTER}"
        );
        let track = parse_str(&content).unwrap();
        assert_eq!(track.len(), 2);
    }

    #[test]
    fn test_no_points_is_malformed() {
        let err = parse_str(&doc("")).unwrap_err();
        assert!(matches!(err, TrackError::MalformedTrack { .. }));
    }

    #[test]
    fn test_bad_latitude_is_malformed() {
        let content =
            doc(r#"<trkpt lat="north" lon="1.0"><time>2017-06-01T18:30:00Z</time></trkpt>"#);
        assert!(matches!(
            parse_str(&content),
            Err(TrackError::MalformedTrack { .. })
        ));
    }

    #[test]
    fn test_out_of_range_coordinates_are_malformed() {
        let cases = [("95.0", "1.0"), ("-90.5", "1.0"), ("1.0", "180.5"), ("1.0", "-200.0")];
        for (lat, lon) in cases {
            let content = doc(&format!(
                "<trkpt lat=\"1.0\" lon=\"1.0\"><time>2017-06-01T18:30:00Z</time></trkpt>\
                 <trkpt lat=\"{lat}\" lon=\"{lon}\"><time>2017-06-01T18:30:02Z</time></trkpt>"
            ));
            assert!(
                matches!(parse_str(&content), Err(TrackError::MalformedTrack { .. })),
                "({lat}, {lon})"
            );
        }
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let content = doc(r#"<trkpt lat="1.0" lon="1.0"><time>yesterday</time></trkpt>"#);
        assert!(matches!(
            parse_str(&content),
            Err(TrackError::MalformedTrack { .. })
        ));
    }

    #[test]
    fn test_missing_final_timestamp_is_tolerated() {
        let content = doc(r#"
<trkpt lat="1.0" lon="1.0"><time>2017-06-01T18:30:00Z</time></trkpt>
<trkpt lat="1.0" lon="1.001"><time>2017-06-01T18:30:02Z</time></trkpt>
<trkpt lat="1.0" lon="1.002"></trkpt>"#);
        let track = parse_str(&content).unwrap();
        assert_eq!(track.len(), 2);
    }

    #[test]
    fn test_missing_middle_timestamp_is_malformed() {
        let content = doc(r#"
<trkpt lat="1.0" lon="1.0"><time>2017-06-01T18:30:00Z</time></trkpt>
<trkpt lat="1.0" lon="1.001"></trkpt>
<trkpt lat="1.0" lon="1.002"><time>2017-06-01T18:30:04Z</time></trkpt>"#);
        assert!(matches!(
            parse_str(&content),
            Err(TrackError::MalformedTrack { .. })
        ));
    }

    #[test]
    fn test_backwards_time_is_malformed() {
        let content = doc(r#"
<trkpt lat="1.0" lon="1.0"><time>2017-06-01T18:30:10Z</time></trkpt>
<trkpt lat="1.0" lon="1.001"><time>2017-06-01T18:30:02Z</time></trkpt>"#);
        let err = parse_str(&content).unwrap_err();
        assert!(err.to_string().contains("backwards"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = parse_track(Path::new("/nonexistent/run.gpx"), ParseMode::Strict).unwrap_err();
        assert!(matches!(err, TrackError::Io { .. }));
    }

    #[test]
    fn test_tolerant_mode_recovers_truncated_file() {
        let truncated = format!(
            "{HEADER}
<trkpt lat=\"1.0\" lon=\"1.0\"><time>2017-06-01T18:30:00Z</time></trkpt>
<trkpt lat=\"1.0\" lon=\"1.001\"><time>2017-06-01T18:30:02Z</time></trkpt>
<trkpt lat=\"1.0\" lon=\"1.00"
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(truncated.as_bytes()).unwrap();

        assert!(parse_track(file.path(), ParseMode::Strict).is_err());
        let track = parse_track(file.path(), ParseMode::Tolerant).unwrap();
        assert_eq!(track.len(), 2);
    }

    #[test]
    fn test_repairs_add_declaration_and_version() {
        let repaired = apply_minimal_repairs("<gpx creator=\"x\"><trk></trk></gpx>");
        assert!(repaired.starts_with("<?xml"));
        assert!(repaired.contains("version=\"1.1\""));
        assert!(repaired.trim_end().ends_with("</gpx>"));
    }

    #[test]
    fn test_invalid_chars_are_stripped() {
        assert_eq!(remove_invalid_xml_chars("a\u{0}b\u{1}c\n"), "abc\n");
    }

    #[test]
    fn test_write_track_exports_points_without_times() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.gpx");
        let smoothed = SmoothedTrack::from_axes(&[1.0, 1.0, 1.0], &[1.0, 1.001, 1.002]);
        write_track(&smoothed, &out).unwrap();

        let gpx = read(BufReader::new(File::open(&out).unwrap())).unwrap();
        let points = &gpx.tracks[0].segments[0].points;
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.time.is_none()));
        assert!((points[1].point().x() - 1.001).abs() < 1e-9);
    }
}
