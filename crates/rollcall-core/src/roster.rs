//! Student roster: a header-less `ID,Name` CSV that only ever grows.
//!
//! IDs are not required to be unique; lookups return the first row that
//! carries the requested ID.

use std::fs::OpenOptions;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("both ID and name are required")]
    MissingField,
    #[error("name must contain only letters and spaces: {0:?}")]
    InvalidName(String),
    #[error("ID must be a non-negative whole number: {0:?}")]
    InvalidId(String),
    #[error("student database not found: {0}")]
    NotFound(String),
    #[error("malformed roster row at line {line}: {reason}")]
    Malformed { line: u64, reason: String },
    #[error("roster I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("roster CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: u32,
    pub name: String,
}

/// Check a registration request before any camera work starts.
pub fn validate_registration(id: &str, name: &str) -> Result<RosterEntry, RosterError> {
    let id = id.trim();
    let name = name.trim();

    if id.is_empty() || name.is_empty() {
        return Err(RosterError::MissingField);
    }

    let letters: String = name.chars().filter(|c| *c != ' ').collect();
    if letters.is_empty() || !letters.chars().all(char::is_alphabetic) {
        return Err(RosterError::InvalidName(name.to_string()));
    }

    let id = id
        .parse::<u32>()
        .map_err(|_| RosterError::InvalidId(id.to_string()))?;

    Ok(RosterEntry {
        id,
        name: name.to_string(),
    })
}

#[derive(Debug, Default, Clone)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Append one row, creating the file and its directory if needed.
    pub fn append(path: &Path, entry: &RosterEntry) -> Result<(), RosterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record([entry.id.to_string(), entry.name.clone()])?;
        writer.flush()?;

        tracing::info!(id = entry.id, name = %entry.name, path = %path.display(), "roster entry appended");
        Ok(())
    }

    /// Read the whole roster. A leading `Id,Name` header row is tolerated.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        if !path.exists() {
            return Err(RosterError::NotFound(path.display().to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut entries = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let line = record.position().map_or(index as u64 + 1, |p| p.line());

            if record.iter().all(str::is_empty) {
                continue;
            }
            if record.len() < 2 {
                return Err(RosterError::Malformed {
                    line,
                    reason: format!("expected 2 columns (ID, Name), found {}", record.len()),
                });
            }

            let raw_id = &record[0];
            let id = match raw_id.parse::<u32>() {
                Ok(id) => id,
                Err(_) if index == 0 && raw_id.eq_ignore_ascii_case("id") => continue,
                Err(_) => {
                    return Err(RosterError::Malformed {
                        line,
                        reason: format!("ID {raw_id:?} is not a number"),
                    })
                }
            };

            entries.push(RosterEntry {
                id,
                name: record[1].to_string(),
            });
        }

        tracing::debug!(path = %path.display(), entries = entries.len(), "roster loaded");
        Ok(Self { entries })
    }

    /// First entry registered under `id`.
    pub fn lookup(&self, id: u32) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, name: &str) -> RosterEntry {
        RosterEntry { id, name: name.into() }
    }

    #[test]
    fn test_validate_registration() {
        assert_eq!(validate_registration(" 12 ", "Ada Lovelace").unwrap(), entry(12, "Ada Lovelace"));
        assert!(matches!(validate_registration("", "Ada"), Err(RosterError::MissingField)));
        assert!(matches!(validate_registration("1", "  "), Err(RosterError::MissingField)));
        assert!(matches!(validate_registration("1", "R2D2"), Err(RosterError::InvalidName(_))));
        assert!(matches!(validate_registration("1", "Ada.L"), Err(RosterError::InvalidName(_))));
        assert!(matches!(validate_registration("-4", "Ada"), Err(RosterError::InvalidId(_))));
        assert!(matches!(validate_registration("abc", "Ada"), Err(RosterError::InvalidId(_))));
    }

    #[test]
    fn test_append_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("StudentDetails").join("StudentDetails.csv");

        Roster::append(&path, &entry(1, "Ada")).unwrap();
        Roster::append(&path, &entry(2, "Grace Hopper")).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "1,Ada\n2,Grace Hopper\n");

        let roster = Roster::load(&path).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.lookup(2).unwrap().name, "Grace Hopper");
        assert!(roster.lookup(3).is_none());
    }

    #[test]
    fn test_duplicate_ids_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        Roster::append(&path, &entry(5, "First")).unwrap();
        Roster::append(&path, &entry(5, "Second")).unwrap();

        let roster = Roster::load(&path).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.lookup(5).unwrap().name, "First");
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Roster::load(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, RosterError::NotFound(_)));
    }

    #[test]
    fn test_load_tolerates_header_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "Id,Name\n3,Alan\n\n").unwrap();

        let roster = Roster::load(&path).unwrap();
        assert_eq!(roster.entries(), &[entry(3, "Alan")]);
    }

    #[test]
    fn test_load_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "1,Ada\n2\n").unwrap();

        let err = Roster::load(&path).unwrap_err();
        assert!(matches!(err, RosterError::Malformed { line: 2, .. }), "{err}");
    }

    #[test]
    fn test_load_non_numeric_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "1,Ada\nx7,Bob\n").unwrap();

        let err = Roster::load(&path).unwrap_err();
        assert!(matches!(err, RosterError::Malformed { line: 2, .. }), "{err}");
    }
}
