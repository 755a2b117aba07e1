//! Training sample file names: `<name>.<id>.<sequence>.jpg`.
//!
//! The student ID embedded in the file name is the label used at training time.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SAMPLE_EXTENSION: &str = "jpg";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SampleError {
    #[error("expected <name>.<id>.<sequence>.jpg, got {0:?}")]
    BadShape(String),
    #[error("non-numeric {field} in {file:?}")]
    NotNumeric { field: &'static str, file: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleName {
    pub name: String,
    pub id: u32,
    pub sequence: u32,
}

impl SampleName {
    pub fn new(name: &str, id: u32, sequence: u32) -> Self {
        Self {
            name: name.to_string(),
            id,
            sequence,
        }
    }

    pub fn parse(file_name: &str) -> Result<Self, SampleError> {
        let parts: Vec<&str> = file_name.split('.').collect();
        let [name, id, sequence, ext] = parts.as_slice() else {
            return Err(SampleError::BadShape(file_name.to_string()));
        };
        if name.is_empty() || !ext.eq_ignore_ascii_case(SAMPLE_EXTENSION) {
            return Err(SampleError::BadShape(file_name.to_string()));
        }

        let id = id.parse().map_err(|_| SampleError::NotNumeric {
            field: "id",
            file: file_name.to_string(),
        })?;
        let sequence = sequence.parse().map_err(|_| SampleError::NotNumeric {
            field: "sequence",
            file: file_name.to_string(),
        })?;

        Ok(Self {
            name: name.to_string(),
            id,
            sequence,
        })
    }
}

impl fmt::Display for SampleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{SAMPLE_EXTENSION}", self.name, self.id, self.sequence)
    }
}

/// Result of scanning the training image directory.
#[derive(Debug, Default)]
pub struct SampleScan {
    pub samples: Vec<(PathBuf, SampleName)>,
    /// Files whose names do not follow the sample naming scheme.
    pub skipped: Vec<PathBuf>,
}

/// List the samples in `dir`, sorted by path.
pub fn scan_dir(dir: &Path) -> std::io::Result<SampleScan> {
    let mut scan = SampleScan::default();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let parsed = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(SampleName::parse);

        match parsed {
            Some(Ok(sample)) => scan.samples.push((path, sample)),
            Some(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping file in training directory");
                scan.skipped.push(path);
            }
            None => scan.skipped.push(path),
        }
    }

    scan.samples.sort_by(|a, b| a.0.cmp(&b.0));
    scan.skipped.sort();
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SampleName::new("Ada Lovelace", 7, 12).to_string(), "Ada Lovelace.7.12.jpg");
    }

    #[test]
    fn test_parse() {
        let s = SampleName::parse("Ada Lovelace.7.12.jpg").unwrap();
        assert_eq!(s, SampleName::new("Ada Lovelace", 7, 12));
        assert_eq!(SampleName::parse("bob.3.1.JPG").unwrap().id, 3);
    }

    #[test]
    fn test_parse_rejects_bad_shape() {
        for name in ["bob.jpg", "bob.3.jpg", "bob.3.1.2.jpg", ".3.1.jpg", "bob.3.1.png"] {
            assert!(
                matches!(SampleName::parse(name), Err(SampleError::BadShape(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        assert_eq!(
            SampleName::parse("bob.x.1.jpg"),
            Err(SampleError::NotNumeric { field: "id", file: "bob.x.1.jpg".into() })
        );
        assert!(matches!(
            SampleName::parse("bob.3.-1.jpg"),
            Err(SampleError::NotNumeric { field: "sequence", .. })
        ));
    }

    #[test]
    fn test_scan_dir() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.2.1.jpg", "a.1.1.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.1.1.jpg")).unwrap();

        let scan = scan_dir(dir.path()).unwrap();
        let ids: Vec<u32> = scan.samples.iter().map(|(_, s)| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(scan.skipped, vec![dir.path().join("notes.txt")]);
    }
}
