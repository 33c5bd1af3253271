use std::path::{Path, PathBuf};

use crate::models::Record;
use crate::utils::date::DayStamp;

/// Snapshot read or write failure other than "no snapshot for that day".
#[derive(Debug)]
pub struct StorageError {
    pub path: PathBuf,
    pub detail: String,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "snapshot storage failed at {}: {}", self.path.display(), self.detail)
    }
}

impl std::error::Error for StorageError {}

/// One JSON file per (report, day) under the data directory. Snapshots are
/// written once at the end of a run and read-only afterwards; re-saving the
/// same key clobbers the previous file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Deterministic location for a (report, day) snapshot. The file is not
    /// guaranteed to exist.
    #[must_use]
    pub fn snapshot_path(&self, report: &str, day: DayStamp) -> PathBuf {
        self.data_dir.join(format!("{report}_{}.json", day.yyyymmdd()))
    }

    pub fn save(&self, report: &str, day: DayStamp, records: &[Record]) -> Result<(), StorageError> {
        let path = self.snapshot_path(report, day);
        std::fs::create_dir_all(&self.data_dir).map_err(|error| StorageError {
            path: self.data_dir.clone(),
            detail: format!("cannot create data directory ({error})"),
        })?;
        let encoded = serde_json::to_vec_pretty(records).map_err(|error| StorageError {
            path: path.clone(),
            detail: format!("cannot encode snapshot ({error})"),
        })?;
        std::fs::write(&path, encoded).map_err(|error| StorageError {
            path,
            detail: format!("cannot write snapshot ({error})"),
        })
    }

    /// `Ok(None)` when no snapshot exists for the key; errors are reserved
    /// for present-but-unreadable or corrupt files.
    pub fn load(&self, report: &str, day: DayStamp) -> Result<Option<Vec<Record>>, StorageError> {
        let path = self.snapshot_path(report, day);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(StorageError {
                    path,
                    detail: format!("cannot read snapshot ({error})"),
                });
            }
        };
        let records = serde_json::from_str(&raw).map_err(|error| StorageError {
            path,
            detail: format!("snapshot is corrupt ({error})"),
        })?;
        Ok(Some(records))
    }
}
