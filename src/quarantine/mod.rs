//! Quarantine vault.
//!
//! Detected content is moved into an isolated directory and tracked in a
//! JSON manifest keyed by `digest:original_name`. The composite key lets
//! distinct files that share a digest under different names be tracked
//! separately. Records are immutable once written; they leave the manifest
//! only through restore or delete.

use crate::core::error::{Error, Result};
use crate::core::types::Severity;
use crate::utils::hash::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const MANIFEST_NAME: &str = "manifest.json";

/// One quarantined item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// SHA-256 digest of the quarantined content
    pub digest: String,
    /// Name the content had before isolation
    pub original_name: String,
    /// Name of the signature or rule that triggered isolation
    pub malware_name: String,
    /// Severity at detection time
    pub severity: Severity,
    /// When the item entered quarantine
    pub quarantined_on: DateTime<Utc>,
    /// Where the content lived before isolation, if it was a file on disk
    pub original_path: Option<PathBuf>,
    /// Where the content is held inside the vault
    pub storage_path: PathBuf,
}

impl QuarantineRecord {
    /// Manifest key: `digest:original_name`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.digest, self.original_name)
    }
}

/// Vault over an isolation directory and its manifest.
///
/// All operations serialize through one lock; the manifest file is rewritten
/// atomically (temp file then rename) after every mutation.
pub struct QuarantineManager {
    root: PathBuf,
    inner: Mutex<BTreeMap<String, QuarantineRecord>>,
}

impl QuarantineManager {
    /// Open the vault at `root`, creating it if needed.
    ///
    /// Content files present in the vault but missing from the manifest are
    /// re-registered under the name `recovered`: a crash between the content
    /// move and the manifest write leaves the file isolated, and on the next
    /// open it becomes visible again instead of silently orphaned.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| Error::DirectoryAccess {
            path: root.to_path_buf(),
            source: e,
        })?;

        let manifest_path = root.join(MANIFEST_NAME);
        let mut records: BTreeMap<String, QuarantineRecord> = if manifest_path.exists() {
            let contents = std::fs::read_to_string(&manifest_path)
                .map_err(|e| Error::file_read(&manifest_path, e))?;
            serde_json::from_str(&contents)?
        } else {
            BTreeMap::new()
        };

        let recovered = Self::sweep_orphans(root, &mut records)?;
        let manager = Self {
            root: root.to_path_buf(),
            inner: Mutex::new(records),
        };
        if recovered > 0 {
            log::warn!("Recovered {} orphaned quarantine file(s)", recovered);
            let guard = manager.lock()?;
            manager.persist(&guard)?;
        }
        Ok(manager)
    }

    /// Register vault files that no manifest record points to.
    fn sweep_orphans(
        root: &Path,
        records: &mut BTreeMap<String, QuarantineRecord>,
    ) -> Result<usize> {
        let known: Vec<PathBuf> = records.values().map(|r| r.storage_path.clone()).collect();
        let mut recovered = 0;

        let entries = std::fs::read_dir(root).map_err(|e| Error::DirectoryAccess {
            path: root.to_path_buf(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::DirectoryAccess {
                path: root.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name == MANIFEST_NAME || name.ends_with(".tmp") || known.contains(&path) {
                continue;
            }

            let digest = Hasher::sha256_file(&path)?;
            let record = QuarantineRecord {
                digest,
                original_name: "recovered".to_string(),
                malware_name: "Unknown.Recovered".to_string(),
                severity: Severity::Medium,
                quarantined_on: Utc::now(),
                original_path: None,
                storage_path: path,
            };
            records.insert(record.key(), record);
            recovered += 1;
        }
        Ok(recovered)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, QuarantineRecord>>> {
        self.inner
            .lock()
            .map_err(|_| Error::lock_poisoned("quarantine manifest"))
    }

    fn persist(&self, records: &BTreeMap<String, QuarantineRecord>) -> Result<()> {
        let manifest_path = self.root.join(MANIFEST_NAME);
        let contents = serde_json::to_string_pretty(records)?;
        let tmp = manifest_path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(|e| Error::file_write(&tmp, e))?;
        std::fs::rename(&tmp, &manifest_path)
            .map_err(|e| Error::file_write(&manifest_path, e))?;
        Ok(())
    }

    fn storage_path_for(&self, digest: &str) -> PathBuf {
        self.root
            .join(format!("{}_{}.quar", &digest[..16.min(digest.len())], uuid::Uuid::new_v4()))
    }

    /// Isolate a file on disk: moves (never copies) the content into the
    /// vault, then records the move.
    pub fn quarantine_file(
        &self,
        source: &Path,
        digest: &str,
        malware_name: &str,
        severity: Severity,
    ) -> Result<QuarantineRecord> {
        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        let storage_path = self.storage_path_for(digest);

        move_file(source, &storage_path).map_err(|e| Error::QuarantineFailed {
            path: source.to_path_buf(),
            source: e,
        })?;

        self.register(QuarantineRecord {
            digest: digest.to_lowercase(),
            original_name,
            malware_name: malware_name.to_string(),
            severity,
            quarantined_on: Utc::now(),
            original_path: Some(source.to_path_buf()),
            storage_path,
        })
    }

    /// Isolate in-memory content, e.g. an archive member that never existed
    /// as its own file on disk.
    pub fn quarantine_bytes(
        &self,
        bytes: &[u8],
        original_name: &str,
        digest: &str,
        malware_name: &str,
        severity: Severity,
    ) -> Result<QuarantineRecord> {
        let storage_path = self.storage_path_for(digest);
        std::fs::write(&storage_path, bytes).map_err(|e| Error::QuarantineFailed {
            path: storage_path.clone(),
            source: e,
        })?;

        self.register(QuarantineRecord {
            digest: digest.to_lowercase(),
            original_name: original_name.to_string(),
            malware_name: malware_name.to_string(),
            severity,
            quarantined_on: Utc::now(),
            original_path: None,
            storage_path,
        })
    }

    fn register(&self, record: QuarantineRecord) -> Result<QuarantineRecord> {
        let mut guard = self.lock()?;
        let key = record.key();
        guard.insert(key.clone(), record.clone());
        if let Err(e) = self.persist(&guard) {
            guard.remove(&key);
            return Err(e);
        }
        log::info!(
            "Quarantined '{}' as {} ({})",
            record.original_name,
            record.malware_name,
            record.severity
        );
        Ok(record)
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<QuarantineRecord>> {
        let guard = self.lock()?;
        let mut records: Vec<QuarantineRecord> = guard.values().cloned().collect();
        records.sort_by(|a, b| b.quarantined_on.cmp(&a.quarantined_on));
        Ok(records)
    }

    /// Look up a record by exact key.
    pub fn get(&self, key: &str) -> Result<Option<QuarantineRecord>> {
        Ok(self.lock()?.get(key).cloned())
    }

    /// Resolve a digest prefix to exactly one record.
    ///
    /// Fails with `QuarantineItemNotFound` on zero matches and
    /// `AmbiguousMatch` on more than one.
    pub fn find_by_digest_prefix(&self, prefix: &str) -> Result<QuarantineRecord> {
        let prefix = prefix.to_lowercase();
        let guard = self.lock()?;
        let matches: Vec<&QuarantineRecord> = guard
            .values()
            .filter(|r| r.digest.starts_with(&prefix))
            .collect();
        match matches.len() {
            0 => Err(Error::QuarantineItemNotFound(prefix)),
            1 => Ok(matches[0].clone()),
            n => Err(Error::AmbiguousMatch {
                query: prefix,
                candidates: n,
            }),
        }
    }

    /// Move content back out of the vault.
    ///
    /// The target defaults to the record's original path; records without one
    /// (recovered items, archive members) require an explicit target. The
    /// manifest entry is removed only after the content move succeeds.
    pub fn restore(&self, key: &str, target: Option<&Path>) -> Result<PathBuf> {
        let mut guard = self.lock()?;
        let record = guard
            .get(key)
            .cloned()
            .ok_or_else(|| Error::QuarantineItemNotFound(key.to_string()))?;

        let destination = match (target, &record.original_path) {
            (Some(t), _) => t.to_path_buf(),
            (None, Some(original)) => original.clone(),
            (None, None) => {
                return Err(Error::RestoreFailed {
                    key: key.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "record has no original path; a target is required",
                    ),
                })
            }
        };

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::RestoreFailed {
                key: key.to_string(),
                source: e,
            })?;
        }
        move_file(&record.storage_path, &destination).map_err(|e| Error::RestoreFailed {
            key: key.to_string(),
            source: e,
        })?;

        guard.remove(key);
        self.persist(&guard)?;
        log::info!("Restored '{}' to {}", record.original_name, destination.display());
        Ok(destination)
    }

    /// Permanently delete a quarantined item.
    ///
    /// Content removal and manifest removal are attempted independently: a
    /// failure deleting the backing file is reported but never leaves the
    /// manifest entry behind.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut guard = self.lock()?;
        let record = guard
            .remove(key)
            .ok_or_else(|| Error::QuarantineItemNotFound(key.to_string()))?;
        self.persist(&guard)?;
        drop(guard);

        if let Err(e) = std::fs::remove_file(&record.storage_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::error!(
                    "Manifest entry removed but content at {} could not be deleted: {}",
                    record.storage_path.display(),
                    e
                );
                return Err(Error::FileDelete {
                    path: record.storage_path,
                    source: e,
                });
            }
        }
        Ok(())
    }

    /// Delete every quarantined item. Returns the number of records removed;
    /// content files that fail to delete are logged, not fatal.
    pub fn clear_all(&self) -> Result<usize> {
        let mut guard = self.lock()?;
        let records = std::mem::take(&mut *guard);
        self.persist(&guard)?;
        drop(guard);

        for record in records.values() {
            if let Err(e) = std::fs::remove_file(&record.storage_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::error!(
                        "Failed to delete quarantined content {}: {}",
                        record.storage_path.display(),
                        e
                    );
                }
            }
        }
        Ok(records.len())
    }

    /// Number of quarantined items.
    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

/// Move a file, falling back to copy+remove across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}
