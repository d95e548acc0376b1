//! Scan orchestration.
//!
//! Drives each unit of content through a fixed pipeline: extension filter,
//! archive expansion, digest lookup, pattern match, then a terminal outcome
//! that is appended to history and, on detection, quarantined. Archive
//! members re-enter the pipeline independently, so one corrupt or detected
//! member never affects its siblings.

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{extension_of, BatchSummary, ScanOutcome, ScanReason, ScanUnit};
use crate::detection::{PatternMatcher, SignatureStore};
use crate::history::HistoryRecorder;
use crate::quarantine::QuarantineManager;
use crate::scanner::archive::{is_archive, ArchiveExpander, Expanded, ExtractionBudget};
use crate::utils::hash::Hasher;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Composes the detection pipeline over shared stores.
///
/// Cheap to clone-share via `Arc`; batch workers hold one reference each.
pub struct ScanOrchestrator {
    config: Arc<Config>,
    store: Arc<SignatureStore>,
    matcher: Option<Arc<PatternMatcher>>,
    quarantine: Arc<QuarantineManager>,
    history: Arc<HistoryRecorder>,
    cancelled: Arc<AtomicBool>,
}

impl ScanOrchestrator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<SignatureStore>,
        matcher: Option<Arc<PatternMatcher>>,
        quarantine: Arc<QuarantineManager>,
        history: Arc<HistoryRecorder>,
    ) -> Self {
        if matcher.is_none() {
            log::debug!("Pattern matching unavailable; digest lookup only");
        }
        Self {
            config,
            store,
            matcher,
            quarantine,
            history,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Takes effect at unit boundaries; outcomes
    /// already recorded are never rolled back.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Scan one file on disk, returning every outcome it produced: one for
    /// the file itself plus one per archive member if it was a container.
    ///
    /// The extension filter runs against the path before any content is
    /// read, and inputs that need only a digest (no pattern engine, not a
    /// container) are hashed in chunks without loading the file.
    pub fn scan_file(&self, path: &Path) -> Result<Vec<ScanOutcome>> {
        if self.is_cancelled() {
            return Err(Error::ScanCancelled);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let extension = extension_of(&name);

        let mut outcomes = Vec::new();

        if !self.config.scan.extension_allowed(&extension) {
            let outcome = ScanOutcome::skipped(name, size);
            self.history.append(&outcome)?;
            outcomes.push(outcome);
            return Ok(outcomes);
        }

        let expandable = self.config.scan.scan_archives && is_archive(&extension);

        // Digest-only path: stream the file through the hasher instead of
        // holding its content in memory.
        if self.matcher.is_none() && !expandable {
            let digest = match Hasher::sha256_file(path) {
                Ok(digest) => digest,
                Err(e) => {
                    // Unreadable input is a per-unit error, still recorded.
                    let outcome = ScanOutcome::error(name, size, e.to_string());
                    self.history.append(&outcome)?;
                    outcomes.push(outcome);
                    return Ok(outcomes);
                }
            };
            let outcome = match self.store.get(&digest)? {
                Some(signature) => ScanOutcome::detected(
                    name.clone(),
                    size,
                    digest,
                    signature.record.name,
                    signature.record.severity,
                    ScanReason::SignatureMatch,
                ),
                None => ScanOutcome::clean(name.clone(), size, digest),
            };
            let unit = ScanUnit::new(name, Vec::new());
            self.finish(outcome, &unit, Some(path), &mut outcomes)?;
            return Ok(outcomes);
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                let outcome = ScanOutcome::error(name, size, e.to_string());
                self.history.append(&outcome)?;
                outcomes.push(outcome);
                return Ok(outcomes);
            }
        };

        let unit = ScanUnit::new(name, bytes);
        let mut budget = ExtractionBudget::new(
            self.config.scan.max_member_bytes,
            self.config.scan.max_extracted_bytes,
        );

        self.scan_unit(unit, Some(path), &mut budget, &mut outcomes)?;
        Ok(outcomes)
    }

    /// Lookup-only check: is this digest registered?
    pub fn check_hash(&self, digest: &str) -> Result<Option<crate::detection::Signature>> {
        self.store.get(digest)
    }

    /// Scan in-memory content that has no backing file.
    pub fn scan_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<ScanOutcome>> {
        let unit = ScanUnit::new(name, bytes);
        let mut budget = ExtractionBudget::new(
            self.config.scan.max_member_bytes,
            self.config.scan.max_extracted_bytes,
        );
        let mut outcomes = Vec::new();
        self.scan_unit(unit, None, &mut budget, &mut outcomes)?;
        Ok(outcomes)
    }

    /// Run one unit through the pipeline, recursing into archive members.
    ///
    /// `source_path` is set only for the top-level on-disk file; detections
    /// of that unit move the file itself into quarantine, while nested
    /// detections isolate the extracted bytes.
    fn scan_unit(
        &self,
        unit: ScanUnit,
        source_path: Option<&Path>,
        budget: &mut ExtractionBudget,
        outcomes: &mut Vec<ScanOutcome>,
    ) -> Result<()> {
        let display_name = unit.display_name();
        let size = unit.bytes.len() as u64;
        let extension = unit.extension();

        // Extension filter.
        if !self.config.scan.extension_allowed(&extension) {
            return self.finish(ScanOutcome::skipped(display_name, size), &unit, None, outcomes);
        }

        // Archive expansion: members re-enter the pipeline, then the
        // container itself continues to digest lookup. At the depth limit
        // the container is not expanded, only matched as-is.
        if self.config.scan.scan_archives
            && is_archive(&extension)
            && unit.depth() < self.config.scan.max_archive_depth
        {
            match ArchiveExpander::expand(&unit, budget) {
                Ok(members) => {
                    for member in members {
                        // Cancellation takes effect at unit boundaries.
                        if self.is_cancelled() {
                            break;
                        }
                        match member {
                            Expanded::Member(child) => {
                                self.scan_unit(child, None, budget, outcomes)?;
                            }
                            Expanded::Failed { name, reason } => {
                                let child_name = format!("{}/{}", display_name, name);
                                let outcome = ScanOutcome::error(child_name, 0, reason);
                                self.history.append(&outcome)?;
                                outcomes.push(outcome);
                            }
                        }
                    }
                }
                Err(e) => {
                    // Corrupt container: terminal error for this unit only.
                    return self.finish(
                        ScanOutcome::error(display_name, size, e.to_string()),
                        &unit,
                        None,
                        outcomes,
                    );
                }
            }
        }

        // Digest lookup. A signature hit is authoritative and skips
        // pattern matching.
        let digest = Hasher::sha256_bytes(&unit.bytes);
        if let Some(signature) = self.store.get(&digest)? {
            let outcome = ScanOutcome::detected(
                display_name,
                size,
                digest,
                signature.record.name,
                signature.record.severity,
                ScanReason::SignatureMatch,
            );
            return self.finish(outcome, &unit, source_path, outcomes);
        }

        // Pattern match, only when the capability is present.
        if let Some(matcher) = &self.matcher {
            if let Some(hit) = matcher.match_bytes(&unit.bytes).into_iter().next() {
                let outcome = ScanOutcome::detected(
                    display_name,
                    size,
                    digest,
                    hit.rule_name,
                    hit.severity,
                    ScanReason::PatternMatch,
                );
                return self.finish(outcome, &unit, source_path, outcomes);
            }
        }

        self.finish(ScanOutcome::clean(display_name, size, digest), &unit, None, outcomes)
    }

    /// Commit a terminal outcome: history append, quarantine on detection.
    ///
    /// A failed quarantine is recorded in the outcome's `detail` so the
    /// history shows the detected content was never isolated.
    fn finish(
        &self,
        mut outcome: ScanOutcome,
        unit: &ScanUnit,
        source_path: Option<&Path>,
        outcomes: &mut Vec<ScanOutcome>,
    ) -> Result<()> {
        if outcome.detected {
            let digest = outcome.digest.as_deref().unwrap_or_default();
            let malware_name = outcome.malware_name.as_deref().unwrap_or("Unknown");
            let severity = outcome.severity.unwrap_or(crate::core::types::Severity::Medium);

            let quarantined = match source_path {
                Some(path) => self
                    .quarantine
                    .quarantine_file(path, digest, malware_name, severity),
                None => self.quarantine.quarantine_bytes(
                    &unit.bytes,
                    &unit.logical_name,
                    digest,
                    malware_name,
                    severity,
                ),
            };
            if let Err(e) = &quarantined {
                log::error!("Failed to quarantine '{}': {}", outcome.file_name, e);
                outcome.detail = Some(format!("quarantine failed, content not isolated: {}", e));
            }
        }

        self.history.append(&outcome)?;
        outcomes.push(outcome);
        Ok(())
    }

    /// Scan many paths concurrently. Directories are walked recursively;
    /// each file runs its full pipeline independently, and one file's error
    /// never aborts the batch.
    pub async fn scan_batch(self: Arc<Self>, paths: Vec<PathBuf>) -> Result<BatchSummary> {
        let mut summary = BatchSummary::new();
        log::info!("Batch {} started over {} path(s)", summary.scan_id, paths.len());

        let queue = Arc::new(Mutex::new(VecDeque::new()));
        for path in &paths {
            if path.is_dir() {
                for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
                    if entry.file_type().is_file() {
                        queue
                            .lock()
                            .map_err(|_| Error::lock_poisoned("batch queue"))?
                            .push_back(entry.into_path());
                    }
                }
            } else {
                queue
                    .lock()
                    .map_err(|_| Error::lock_poisoned("batch queue"))?
                    .push_back(path.clone());
            }
        }

        let (tx, mut rx) = mpsc::channel::<Vec<ScanOutcome>>(1000);
        let num_workers = self.config.scan.scan_threads.clamp(1, 8);
        let mut handles = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            let queue = Arc::clone(&queue);
            let orchestrator = Arc::clone(&self);
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let path = {
                        match queue.lock() {
                            Ok(mut q) => q.pop_front(),
                            Err(_) => {
                                log::error!("Batch queue lock poisoned in worker");
                                break;
                            }
                        }
                    };
                    let path = match path {
                        Some(path) => path,
                        None => break,
                    };
                    if orchestrator.is_cancelled() {
                        break;
                    }

                    let outcomes = match orchestrator.scan_file(&path) {
                        Ok(outcomes) => outcomes,
                        Err(e) if e.is_cancelled() => break,
                        Err(e) => {
                            // Infrastructure failure for this input; report
                            // it as a per-unit error outcome.
                            log::error!("Scan of {} failed: {}", path.display(), e);
                            vec![ScanOutcome::error(
                                path.display().to_string(),
                                0,
                                e.to_string(),
                            )]
                        }
                    };
                    if tx.send(outcomes).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        while let Some(outcomes) = rx.recv().await {
            for outcome in outcomes {
                summary.record(outcome);
            }
        }
        for handle in handles {
            let _ = handle.await;
        }

        summary.cancelled = self.is_cancelled();
        summary.complete();
        log::info!(
            "Batch {} finished: {} scanned, {} detected, {} clean, {} skipped, {} errors",
            summary.scan_id,
            summary.total,
            summary.detected,
            summary.clean,
            summary.skipped,
            summary.errors
        );
        Ok(summary)
    }
}
