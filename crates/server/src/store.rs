//! Per-day NDJSON report store
//!
//! One file per UTC calendar day: `<storage_dir>/csp-<YYYY-MM-DD>.ndjson`.
//! Files are created on the first accepted write of the day and only ever
//! grow by append.
//!
//! Writers for the same day are serialized by a per-date lock and each batch
//! goes out in a single append-mode write, so concurrent submissions never
//! lose or interleave lines. Readers open the file without the lock and see
//! whatever was complete when they got there.

use chrono::NaiveDate;
use csp_core::CanonicalReport;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

const LOG_FILE_PREFIX: &str = "csp-";

const LOG_FILE_EXT: &str = ".ndjson";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot create report directory {path}: {source}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

// ============================================================================
// Report Store
// ============================================================================

pub struct ReportStore {
    storage_dir: PathBuf,
    /// Writer locks, one per date with an append in flight
    day_locks: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
}

impl ReportStore {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            day_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Log file for a UTC date. Pure: same date, same path.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.storage_dir.join(format!(
            "{}{}{}",
            LOG_FILE_PREFIX,
            date.format("%Y-%m-%d"),
            LOG_FILE_EXT
        ))
    }

    /// Create the storage directory if needed. Safe to call repeatedly.
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.storage_dir).map_err(|source| {
            StoreError::DirectoryCreationFailed {
                path: self.storage_dir.display().to_string(),
                source,
            }
        })
    }

    /// Append records to the day's log, one compact JSON line each.
    ///
    /// All lines are serialized before the file is touched and written in one
    /// call; on a failed write the file is cut back to its previous length.
    /// Returns the number of lines written.
    pub fn append(&self, date: NaiveDate, records: &[CanonicalReport]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        self.ensure_dir()?;
        let path = self.path_for(date);

        let lock = self.day_lock(date);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;

        let prior_len = file
            .metadata()
            .map_err(|e| StoreError::io(&path, e))?
            .len();

        if let Err(e) = file.write_all(buf.as_bytes()).and_then(|_| file.flush()) {
            if let Err(trunc) = file.set_len(prior_len) {
                tracing::error!(
                    "Failed to roll back partial append to {}: {}",
                    path.display(),
                    trunc
                );
            }
            return Err(StoreError::io(&path, e));
        }

        tracing::debug!(
            path = %path.display(),
            lines = records.len(),
            "appended CSP reports"
        );
        Ok(records.len())
    }

    /// Open the day's log for reading. `None` if nothing was written that day.
    pub fn open_log(&self, date: NaiveDate) -> Result<Option<File>, StoreError> {
        let path = self.path_for(date);
        match File::open(&path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Size of the day's log in bytes, if it exists
    pub fn log_size(&self, date: NaiveDate) -> Option<u64> {
        fs::metadata(self.path_for(date)).ok().map(|m| m.len())
    }

    fn day_lock(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self
            .day_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = locks.get(&date) {
            return Arc::clone(lock);
        }

        // Only the map holds idle locks; drop them before adding a new day.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(date, Arc::clone(&lock));
        lock
    }
}

// ============================================================================
// Tests
// ============================================================================
