//! Scan history log.
//!
//! Append-only JSON-lines file, one `ScanOutcome` per line. Appends
//! serialize through a lock so concurrent scans never interleave partial
//! entries. There is no update-in-place.

use crate::core::error::{Error, Result};
use crate::core::types::ScanOutcome;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Aggregate counts over the whole log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_scans: u64,
    pub total_detections: u64,
}

pub struct HistoryRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryRecorder {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::DirectoryAccess {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Append one outcome. The line is written in a single `write_all` under
    /// the lock, so readers never observe a torn entry.
    pub fn append(&self, outcome: &ScanOutcome) -> Result<()> {
        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::lock_poisoned("history log"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::file_write(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| Error::file_write(&self.path, e))
    }

    /// Most recent entries, newest first, optionally detections only.
    ///
    /// Unparseable lines (e.g. a torn final line from a crash) are skipped
    /// with a warning rather than failing the whole read.
    pub fn list(&self, limit: usize, detected_only: bool) -> Result<Vec<ScanOutcome>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| Error::file_read(&self.path, e))?;

        let mut entries: Vec<ScanOutcome> = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ScanOutcome>(line) {
                Ok(outcome) => {
                    if !detected_only || outcome.detected {
                        entries.push(outcome);
                    }
                }
                Err(e) => log::warn!("Skipping malformed history line: {}", e),
            }
        }

        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    /// Aggregate counts over every entry in the log.
    pub fn stats(&self) -> Result<HistoryStats> {
        let entries = self.list(usize::MAX, false)?;
        Ok(HistoryStats {
            total_scans: entries.len() as u64,
            total_detections: entries.iter().filter(|e| e.detected).count() as u64,
        })
    }

    /// Drop the entire log.
    pub fn clear(&self) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::lock_poisoned("history log"))?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::FileDelete {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}
