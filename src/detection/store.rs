//! Tamper-evident signature store.
//!
//! Signatures are kept as a digest-keyed map and persisted as a single JSON
//! snapshot signed with HMAC-SHA256. The MAC is computed over the canonical
//! (sorted-key, compact) serialization of the map; the key lives in process
//! configuration, never beside the snapshot. A MAC mismatch on load is fatal
//! to the store instance: it refuses to serve unauthenticated data.

use crate::core::error::{Error, Result};
use crate::core::types::Severity;
use crate::utils::hash::is_valid_digest;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum results returned by a text search.
const SEARCH_LIMIT: usize = 50;

/// Metadata stored per registered digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Malware name, e.g. "Trojan.GenericKD"
    pub name: String,
    /// Threat level
    pub severity: Severity,
    /// Where this signature came from
    pub source: String,
    /// When it was registered
    pub added_on: DateTime<Utc>,
}

/// A signature paired with its digest key, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// SHA-256 hex digest, lowercase
    pub digest: String,
    #[serde(flatten)]
    pub record: SignatureRecord,
}

impl Signature {
    /// Create a signature registered now.
    pub fn new(
        digest: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
        source: impl Into<String>,
    ) -> Self {
        Self {
            digest: digest.into().to_lowercase(),
            record: SignatureRecord {
                name: name.into(),
                severity,
                source: source.into(),
                added_on: Utc::now(),
            },
        }
    }
}

/// On-disk snapshot: MAC value beside the signed data.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignatureSnapshot {
    /// HMAC-SHA256 over the canonical serialization of `data`, hex-encoded
    pub mac: String,
    /// Digest -> record mapping
    pub data: BTreeMap<String, SignatureRecord>,
}

/// Report of a bulk import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Signatures newly registered
    pub added: usize,
    /// Signatures skipped because their digest was already present
    pub skipped: usize,
}

/// Tamper-evident mapping from content digest to signature metadata.
///
/// Mutations serialize through the write lock and persist the snapshot
/// atomically (temp file then rename) before the in-memory change is
/// considered committed. Reads may run concurrently.
#[derive(Debug)]
pub struct SignatureStore {
    path: PathBuf,
    key: Vec<u8>,
    inner: RwLock<BTreeMap<String, SignatureRecord>>,
}

impl SignatureStore {
    /// Open a store backed by `path`, verifying the snapshot MAC if the file
    /// exists. Fails with `Error::Integrity` on a MAC mismatch.
    pub fn open(path: &Path, key: &[u8]) -> Result<Self> {
        let data = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
            let snapshot: SignatureSnapshot = serde_json::from_str(&contents)
                .map_err(|e| Error::Integrity(format!("snapshot is not valid JSON: {}", e)))?;
            Self::verify_snapshot(&snapshot, key)?;
            snapshot.data
        } else {
            BTreeMap::new()
        };

        log::debug!("Signature store opened with {} entries", data.len());

        Ok(Self {
            path: path.to_path_buf(),
            key: key.to_vec(),
            inner: RwLock::new(data),
        })
    }

    /// Recompute the MAC over a snapshot's data and compare it to the stored
    /// value in constant time.
    fn verify_snapshot(snapshot: &SignatureSnapshot, key: &[u8]) -> Result<()> {
        let expected = Self::compute_mac(&snapshot.data, key)?;
        let stored = hex::decode(&snapshot.mac)
            .map_err(|_| Error::Integrity("stored MAC is not valid hex".to_string()))?;
        let expected_raw = hex::decode(&expected)
            .map_err(|_| Error::Internal("computed MAC is not valid hex".to_string()))?;

        if stored.len() != expected_raw.len()
            || stored.ct_eq(&expected_raw).unwrap_u8() != 1
        {
            return Err(Error::Integrity(
                "snapshot MAC mismatch - the signature database was modified outside MalGuard"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// HMAC-SHA256 over the canonical serialization of the map. BTreeMap
    /// serialization is key-sorted, so the byte stream is canonical.
    fn compute_mac(data: &BTreeMap<String, SignatureRecord>, key: &[u8]) -> Result<String> {
        let canonical = serde_json::to_vec(data)?;
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| Error::Internal(format!("invalid MAC key: {}", e)))?;
        mac.update(&canonical);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Persist the given map as a fresh snapshot: content and MAC written in
    /// one atomic rename, so a stale MAC is never observable.
    fn persist(&self, data: &BTreeMap<String, SignatureRecord>) -> Result<()> {
        let snapshot = SignatureSnapshot {
            mac: Self::compute_mac(data, &self.key)?,
            data: data.clone(),
        };
        let contents = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::DirectoryAccess {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(|e| Error::file_write(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Error::file_write(&self.path, e))?;
        Ok(())
    }

    fn read_guard(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, SignatureRecord>>> {
        self.inner
            .read()
            .map_err(|_| Error::lock_poisoned("signature store (read)"))
    }

    fn write_guard(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, SignatureRecord>>> {
        self.inner
            .write()
            .map_err(|_| Error::lock_poisoned("signature store (write)"))
    }

    /// Look up a signature by digest.
    pub fn get(&self, digest: &str) -> Result<Option<Signature>> {
        let digest = digest.to_lowercase();
        let guard = self.read_guard()?;
        Ok(guard.get(&digest).map(|record| Signature {
            digest,
            record: record.clone(),
        }))
    }

    /// Register a new signature. Fails with `SignatureConflict` if the digest
    /// is already registered; delete first to replace.
    pub fn put(&self, signature: Signature) -> Result<()> {
        let digest = signature.digest.to_lowercase();
        if !is_valid_digest(&digest) {
            return Err(Error::InvalidDigest(signature.digest));
        }

        let mut guard = self.write_guard()?;
        if guard.contains_key(&digest) {
            return Err(Error::SignatureConflict(digest));
        }

        guard.insert(digest.clone(), signature.record);
        if let Err(e) = self.persist(&guard) {
            guard.remove(&digest);
            return Err(e);
        }
        log::info!("Registered signature for {}...", &digest[..16]);
        Ok(())
    }

    /// Remove a signature. Fails with `SignatureNotFound` if absent.
    pub fn delete(&self, digest: &str) -> Result<SignatureRecord> {
        let digest = digest.to_lowercase();
        let mut guard = self.write_guard()?;

        let record = guard
            .remove(&digest)
            .ok_or_else(|| Error::SignatureNotFound(digest.clone()))?;

        if let Err(e) = self.persist(&guard) {
            guard.insert(digest, record);
            return Err(e);
        }
        Ok(record)
    }

    /// List signatures ordered by registration time, newest first.
    pub fn list(&self, offset: usize, limit: usize) -> Result<Vec<Signature>> {
        let guard = self.read_guard()?;
        let mut all: Vec<Signature> = guard
            .iter()
            .map(|(digest, record)| Signature {
                digest: digest.clone(),
                record: record.clone(),
            })
            .collect();
        all.sort_by(|a, b| b.record.added_on.cmp(&a.record.added_on));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    /// Case-insensitive substring search over names and digests.
    ///
    /// Returns at most `SEARCH_LIMIT` (50) results; broader queries should
    /// go through `list` pagination.
    pub fn search(&self, text: &str) -> Result<Vec<Signature>> {
        let needle = text.to_lowercase();
        let guard = self.read_guard()?;
        Ok(guard
            .iter()
            .filter(|(digest, record)| {
                digest.contains(&needle) || record.name.to_lowercase().contains(&needle)
            })
            .take(SEARCH_LIMIT)
            .map(|(digest, record)| Signature {
                digest: digest.clone(),
                record: record.clone(),
            })
            .collect())
    }

    /// All signatures at a given severity, newest first.
    pub fn filter_by_severity(&self, level: Severity) -> Result<Vec<Signature>> {
        let guard = self.read_guard()?;
        let mut hits: Vec<Signature> = guard
            .iter()
            .filter(|(_, record)| record.severity == level)
            .map(|(digest, record)| Signature {
                digest: digest.clone(),
                record: record.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.record.added_on.cmp(&a.record.added_on));
        Ok(hits)
    }

    /// Import many signatures in one persisted mutation.
    ///
    /// With `skip_existing`, colliding digests are counted as skipped; without
    /// it, the first collision fails the whole import with `SignatureConflict`
    /// and nothing is persisted.
    pub fn bulk_import(&self, signatures: Vec<Signature>, skip_existing: bool) -> Result<ImportReport> {
        let mut guard = self.write_guard()?;
        let before = guard.clone();

        let mut report = ImportReport { added: 0, skipped: 0 };
        for signature in signatures {
            let digest = signature.digest.to_lowercase();
            if !is_valid_digest(&digest) {
                *guard = before;
                return Err(Error::InvalidDigest(signature.digest));
            }
            if guard.contains_key(&digest) {
                if skip_existing {
                    report.skipped += 1;
                    continue;
                }
                *guard = before;
                return Err(Error::SignatureConflict(digest));
            }
            guard.insert(digest, signature.record);
            report.added += 1;
        }

        if report.added > 0 {
            if let Err(e) = self.persist(&guard) {
                *guard = before;
                return Err(e);
            }
        }
        log::info!(
            "Imported {} signature(s), skipped {}",
            report.added,
            report.skipped
        );
        Ok(report)
    }

    /// Export a full snapshot of the store, MAC included. The result can be
    /// written to disk and opened by a fresh store with the same key.
    pub fn export_all(&self) -> Result<SignatureSnapshot> {
        let guard = self.read_guard()?;
        Ok(SignatureSnapshot {
            mac: Self::compute_mac(&guard, &self.key)?,
            data: guard.clone(),
        })
    }

    /// Number of registered signatures.
    pub fn count(&self) -> Result<usize> {
        Ok(self.read_guard()?.len())
    }

    /// Remove every signature.
    pub fn clear(&self) -> Result<usize> {
        let mut guard = self.write_guard()?;
        let before = std::mem::take(&mut *guard);
        if let Err(e) = self.persist(&guard) {
            *guard = before;
            return Err(e);
        }
        Ok(before.len())
    }
}
