//! On-disk layout of a rollcall data root.
//!
//! ```text
//! <root>/TrainingImage/<name>.<id>.<seq>.jpg
//! <root>/StudentDetails/StudentDetails.csv
//! <root>/TrainingImageLabel/trainer.json
//! <root>/Attendance/Attendance_<YYYYMMDD>.csv
//! ```

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TRAINING_DIR: &str = "TrainingImage";
const ROSTER_DIR: &str = "StudentDetails";
const MODEL_DIR: &str = "TrainingImageLabel";
const ATTENDANCE_DIR: &str = "Attendance";

#[derive(Error, Debug)]
#[error("failed to create {path}: {source}")]
pub struct LayoutError {
    path: String,
    #[source]
    source: std::io::Error,
}

#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create every directory of the layout. Existing directories are left alone.
    pub fn ensure(&self) -> Result<(), LayoutError> {
        for dir in self.directories() {
            std::fs::create_dir_all(&dir).map_err(|source| LayoutError {
                path: dir.display().to_string(),
                source,
            })?;
        }
        tracing::debug!(root = %self.root.display(), "data directories ready");
        Ok(())
    }

    pub fn directories(&self) -> [PathBuf; 4] {
        [
            self.training_dir(),
            self.roster_dir(),
            self.model_dir(),
            self.attendance_dir(),
        ]
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn training_dir(&self) -> PathBuf {
        self.root.join(TRAINING_DIR)
    }

    pub fn roster_dir(&self) -> PathBuf {
        self.root.join(ROSTER_DIR)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join(MODEL_DIR)
    }

    pub fn attendance_dir(&self) -> PathBuf {
        self.root.join(ATTENDANCE_DIR)
    }

    pub fn roster_path(&self) -> PathBuf {
        self.roster_dir().join("StudentDetails.csv")
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("trainer.json")
    }

    pub fn attendance_path(&self, day: NaiveDate) -> PathBuf {
        self.attendance_dir()
            .join(format!("Attendance_{}.csv", day.format("%Y%m%d")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = DataLayout::new("/srv/class");
        let day = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(
            layout.attendance_path(day),
            PathBuf::from("/srv/class/Attendance/Attendance_20260309.csv")
        );
        assert_eq!(
            layout.roster_path(),
            PathBuf::from("/srv/class/StudentDetails/StudentDetails.csv")
        );
        assert_eq!(layout.model_path(), PathBuf::from("/srv/class/TrainingImageLabel/trainer.json"));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure().unwrap();
        layout.ensure().unwrap();
        for d in layout.directories() {
            assert!(d.is_dir(), "{} missing", d.display());
        }
    }

    #[test]
    fn test_ensure_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = DataLayout::new(&blocker).ensure().unwrap_err();
        assert!(err.to_string().contains("TrainingImage"), "{err}");
    }
}
