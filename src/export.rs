// Export of finished runs to interchange formats

use std::{fs, io::Write, path::Path};

use geo_types::Point;
use gpx::{Gpx, GpxVersion, Metadata, Person, Time, Track, TrackSegment, Waypoint};
use log::info;
use time::OffsetDateTime;

use crate::{errors::PacetrackError, run::RunRecord};

const CREATOR: &str = "pacetrack";
const TRACK_TYPE: &str = "running";

/// A format a finished run can be written out as
pub trait Exporter {
    fn file_extension(&self) -> &'static str;

    /// Serialize the run into `writer`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyRoute` for a run without points and `ExportError` when
    /// the output cannot be produced.
    fn export(&self, run: &RunRecord, writer: &mut dyn Write) -> Result<(), PacetrackError>;

    /// Write the export to `path`. Nothing is created when the export fails.
    fn export_to_file(&self, run: &RunRecord, path: &Path) -> Result<(), PacetrackError> {
        let mut buffer = Vec::new();
        self.export(run, &mut buffer)?;
        fs::write(path, &buffer).map_err(|e| PacetrackError::ExportError {
            reason: format!("cannot write {}: {}", path.display(), e),
        })?;
        info!("Exported run to {}", path.display());
        Ok(())
    }
}

/// GPX 1.1 with one `running` track made of a single segment
#[derive(Debug, Default, Clone, Copy)]
pub struct GpxExporter;

fn gpx_time(timestamp_ms: i64) -> Result<Time, PacetrackError> {
    OffsetDateTime::from_unix_timestamp_nanos(timestamp_ms as i128 * 1_000_000)
        .map(Time::from)
        .map_err(|e| PacetrackError::ExportError {
            reason: format!("timestamp {} out of range: {}", timestamp_ms, e),
        })
}

impl GpxExporter {
    pub fn to_gpx(&self, run: &RunRecord) -> Result<Gpx, PacetrackError> {
        if run.route.is_empty() {
            return Err(PacetrackError::EmptyRoute);
        }

        let mut segment = TrackSegment::new();
        for sample in &run.route {
            let mut waypoint = Waypoint::new(Point::new(sample.longitude, sample.latitude));
            waypoint.elevation = sample.altitude_m;
            waypoint.time = Some(gpx_time(sample.timestamp_ms)?);
            segment.points.push(waypoint);
        }

        let mut track = Track::new();
        track.name = Some(display_name(run));
        track.description = run.notes.clone();
        track.type_ = Some(TRACK_TYPE.to_string());
        track.segments.push(segment);

        let mut gpx = Gpx::default();
        gpx.version = GpxVersion::Gpx11;
        gpx.creator = Some(CREATOR.to_string());
        gpx.metadata = Some(Metadata {
            name: Some(display_name(run)),
            time: Some(gpx_time(run.date_ms)?),
            author: Some(Person {
                name: Some(CREATOR.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        gpx.tracks.push(track);
        Ok(gpx)
    }
}

impl Exporter for GpxExporter {
    fn file_extension(&self) -> &'static str {
        "gpx"
    }

    fn export(&self, run: &RunRecord, writer: &mut dyn Write) -> Result<(), PacetrackError> {
        let gpx = self.to_gpx(run)?;
        gpx::write(&gpx, writer).map_err(|e| PacetrackError::ExportError {
            reason: e.to_string(),
        })
    }
}

fn display_name(run: &RunRecord) -> String {
    run.name.clone().unwrap_or_else(|| "Run".to_string())
}

/// `pacetrack_<YYYY-MM-DD>_<name>.gpx`, safe to use as a file name
pub fn suggested_file_name(run: &RunRecord) -> String {
    let date = OffsetDateTime::from_unix_timestamp_nanos(run.date_ms as i128 * 1_000_000)
        .map(|t| {
            let date = t.date();
            format!(
                "{:04}-{:02}-{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            )
        })
        .unwrap_or_else(|_| "unknown-date".to_string());
    let name: String = display_name(run)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}_{}_{}.gpx", CREATOR, date, name)
}

/// Problems that make a run unsuitable for export; empty when it is fine
pub fn validate_run(run: &RunRecord) -> Vec<String> {
    let mut problems = Vec::new();
    if run.route.len() < 2 {
        problems.push(format!(
            "route has {} point(s), at least 2 are needed",
            run.route.len()
        ));
    }
    let invalid = run
        .route
        .iter()
        .filter(|s| {
            !s.latitude.is_finite()
                || !s.longitude.is_finite()
                || s.latitude.abs() > 90.
                || s.longitude.abs() > 180.
        })
        .count();
    if invalid > 0 {
        problems.push(format!("{} point(s) have invalid coordinates", invalid));
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{track::LocationSample, units::UnitSystem};

    // 2024-03-10T08:00:00Z
    const START_MS: i64 = 1_710_057_600_000;

    fn run() -> RunRecord {
        let mut run = RunRecord::from_route(
            vec![
                LocationSample::new(48.8566, 2.3522, START_MS).with_altitude(35.),
                LocationSample::new(48.8611, 2.3522, START_MS + 180_000),
                LocationSample::new(48.8656, 2.3522, START_MS + 360_000).with_altitude(41.5),
            ],
            START_MS,
            UnitSystem::Metric,
        );
        run.set_name(Some("Seine loop".to_string())).unwrap();
        run
    }

    #[test]
    fn test_gpx_document_shape() {
        let mut buffer = Vec::new();
        GpxExporter.export(&run(), &mut buffer).unwrap();

        let parsed = gpx::read(buffer.as_slice()).unwrap();
        assert_eq!(parsed.version, GpxVersion::Gpx11);
        let metadata = parsed.metadata.unwrap();
        assert_eq!(metadata.name.as_deref(), Some("Seine loop"));
        assert!(metadata.time.is_some());

        assert_eq!(parsed.tracks.len(), 1);
        let track = &parsed.tracks[0];
        assert_eq!(track.type_.as_deref(), Some("running"));
        assert_eq!(track.segments.len(), 1);

        let points = &track.segments[0].points;
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].point().y(), 48.8566);
        assert_eq!(points[0].point().x(), 2.3522);
        assert_eq!(points[0].elevation, Some(35.));
        assert_eq!(points[1].elevation, None);
        assert!(points.iter().all(|p| p.time.is_some()));
    }

    #[test]
    fn test_empty_route_is_rejected() {
        let empty = RunRecord::from_route(vec![], START_MS, UnitSystem::Metric);
        let mut buffer = Vec::new();
        assert!(matches!(
            GpxExporter.export(&empty, &mut buffer),
            Err(PacetrackError::EmptyRoute)
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_suggested_file_name() {
        assert_eq!(
            suggested_file_name(&run()),
            "pacetrack_2024-03-10_Seine-loop.gpx"
        );
        let unnamed = RunRecord::from_route(vec![], START_MS, UnitSystem::Metric);
        assert_eq!(suggested_file_name(&unnamed), "pacetrack_2024-03-10_Run.gpx");
    }

    #[test]
    fn test_validate_run() {
        assert!(validate_run(&run()).is_empty());

        let mut broken = run();
        broken.route.truncate(1);
        broken.route[0].latitude = f64::NAN;
        let problems = validate_run(&broken);
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_export_to_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(suggested_file_name(&run()));
        GpxExporter.export_to_file(&run(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Seine loop"));
        assert!(content.contains("<ele>41.5</ele>"));
    }

    #[test]
    fn test_empty_route_leaves_no_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let empty = RunRecord::from_route(vec![], START_MS, UnitSystem::Metric);
        let path = temp_dir.path().join(suggested_file_name(&empty));
        assert!(matches!(
            GpxExporter.export_to_file(&empty, &path),
            Err(PacetrackError::EmptyRoute)
        ));
        assert!(!path.exists());
    }
}
