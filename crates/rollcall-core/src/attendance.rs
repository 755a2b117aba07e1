//! Per-day attendance log and the per-session buffer that feeds it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::Path;
use thiserror::Error;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("no attendance records found: {0}")]
    NoRecords(String),
    #[error("attendance I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("attendance CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl AttendanceRecord {
    /// Record stamped with the current local time.
    pub fn now(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Matches collected during one tracking session, flushed once at the end.
#[derive(Debug, Default)]
pub struct AttendanceBuffer {
    records: Vec<AttendanceRecord>,
    seen: HashSet<u32>,
    dedupe: bool,
}

impl AttendanceBuffer {
    /// With `dedupe`, only the first sighting of each ID is kept.
    pub fn new(dedupe: bool) -> Self {
        Self {
            dedupe,
            ..Self::default()
        }
    }

    /// Returns false when the record was dropped as a repeat sighting.
    pub fn push(&mut self, record: AttendanceRecord) -> bool {
        let first = self.seen.insert(record.id);
        if self.dedupe && !first {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn into_records(self) -> Vec<AttendanceRecord> {
        self.records
    }
}

/// Append `records` to the day file, writing the `ID,Name,Timestamp` header
/// first when the file is missing or empty. Returns the rows written.
pub fn append_records(path: &Path, records: &[AttendanceRecord]) -> Result<usize, AttendanceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), rows = records.len(), header = needs_header, "attendance appended");
    Ok(records.len())
}

/// All records in a day file.
pub fn read_day(path: &Path) -> Result<Vec<AttendanceRecord>, AttendanceError> {
    if !path.exists() {
        return Err(AttendanceError::NoRecords(path.display().to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let records = reader
        .deserialize()
        .collect::<Result<Vec<AttendanceRecord>, csv::Error>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, name: &str, ts: &str) -> AttendanceRecord {
        AttendanceRecord {
            id,
            name: name.into(),
            timestamp: ts.into(),
        }
    }

    #[test]
    fn test_buffer_dedupes_by_id() {
        let mut buf = AttendanceBuffer::new(true);
        assert!(buf.push(record(1, "Ada", "2026-10-16 09:00:00")));
        assert!(buf.push(record(2, "Alan", "2026-10-16 09:00:01")));
        assert!(!buf.push(record(1, "Ada", "2026-10-16 09:00:02")));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.records()[0].timestamp, "2026-10-16 09:00:00");
    }

    #[test]
    fn test_buffer_keeps_every_match() {
        let mut buf = AttendanceBuffer::new(false);
        buf.push(record(1, "Ada", "a"));
        buf.push(record(1, "Ada", "b"));
        assert_eq!(buf.into_records().len(), 2);
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Attendance").join("Attendance_20261016.csv");

        append_records(&path, &[record(1, "Ada", "2026-10-16 09:00:00")]).unwrap();
        append_records(&path, &[record(2, "Grace Hopper", "2026-10-16 10:00:00")]).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            raw,
            "ID,Name,Timestamp\n1,Ada,2026-10-16 09:00:00\n2,Grace Hopper,2026-10-16 10:00:00\n"
        );

        let rows = read_day(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], record(2, "Grace Hopper", "2026-10-16 10:00:00"));
    }

    #[test]
    fn test_append_to_empty_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.csv");
        std::fs::write(&path, "").unwrap();

        append_records(&path, &[record(9, "Linus", "t")]).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("ID,Name,Timestamp\n"));
    }

    #[test]
    fn test_read_day_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_day(&dir.path().join("Attendance_19700101.csv")).unwrap_err();
        assert!(matches!(err, AttendanceError::NoRecords(_)));
    }

    #[test]
    fn test_now_timestamp_format() {
        let r = AttendanceRecord::now(4, "Ada");
        assert!(chrono::NaiveDateTime::parse_from_str(&r.timestamp, TIMESTAMP_FORMAT).is_ok());
    }
}
