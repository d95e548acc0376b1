//! Core type definitions used throughout MalGuard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity level of a registered threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low risk - potentially unwanted but not necessarily malicious
    Low,
    /// Medium risk - suspicious content
    Medium,
    /// High risk - likely malicious
    High,
    /// Critical risk - confirmed malware
    Critical,
}

impl Severity {
    /// Get string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Terminal reason recorded for every scanned unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanReason {
    /// No signature or pattern matched
    Clean,
    /// Digest matched a registered signature
    SignatureMatch,
    /// A pattern rule matched
    PatternMatch,
    /// Extension filter excluded the unit
    Skipped,
    /// The unit could not be read or extracted
    Error,
}

impl ScanReason {
    /// Get string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanReason::Clean => "clean",
            ScanReason::SignatureMatch => "signature_match",
            ScanReason::PatternMatch => "pattern_match",
            ScanReason::Skipped => "skipped",
            ScanReason::Error => "error",
        }
    }
}

impl std::fmt::Display for ScanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of content flowing through the scan pipeline.
///
/// Produced either directly from an input file or by archive expansion.
/// Ephemeral: consumed once by the orchestrator, never persisted.
#[derive(Debug, Clone)]
pub struct ScanUnit {
    /// Name of the unit itself (no container prefix)
    pub logical_name: String,
    /// Raw content
    pub bytes: Vec<u8>,
    /// Chain of container names this unit was extracted from, outermost first.
    /// Empty for top-level inputs.
    pub container_path: Vec<String>,
}

impl ScanUnit {
    /// Create a top-level unit from raw bytes.
    pub fn new(logical_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            logical_name: logical_name.into(),
            bytes,
            container_path: Vec::new(),
        }
    }

    /// Create a unit extracted from a container chain.
    pub fn nested(
        logical_name: impl Into<String>,
        bytes: Vec<u8>,
        container_path: Vec<String>,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            bytes,
            container_path,
        }
    }

    /// Nesting depth: 0 for top-level inputs.
    pub fn depth(&self) -> usize {
        self.container_path.len()
    }

    /// Lowercase extension without the leading dot, empty if none.
    pub fn extension(&self) -> String {
        extension_of(&self.logical_name)
    }

    /// Full display name including the container chain,
    /// e.g. `outer.zip/inner.zip/payload.exe`.
    pub fn display_name(&self) -> String {
        if self.container_path.is_empty() {
            self.logical_name.clone()
        } else {
            format!("{}/{}", self.container_path.join("/"), self.logical_name)
        }
    }
}

/// Lowercase extension of a file name, without the leading dot.
pub fn extension_of(name: &str) -> String {
    std::path::Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Outcome of scanning a single unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Full unit name including any container chain
    pub file_name: String,
    /// Content length in bytes
    pub file_size: u64,
    /// Lowercase extension without the leading dot
    pub extension: String,
    /// SHA-256 digest, absent for skipped/unreadable units
    pub digest: Option<String>,
    /// Whether the unit was detected as malicious
    pub detected: bool,
    /// Name of the matched signature or pattern rule
    pub malware_name: Option<String>,
    /// Severity of the match
    pub severity: Option<Severity>,
    /// Terminal reason
    pub reason: ScanReason,
    /// Extra context for error outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the outcome was produced
    pub timestamp: DateTime<Utc>,
}

impl ScanOutcome {
    fn base(unit_name: String, file_size: u64) -> Self {
        let extension = extension_of(&unit_name);
        Self {
            file_name: unit_name,
            file_size,
            extension,
            digest: None,
            detected: false,
            malware_name: None,
            severity: None,
            reason: ScanReason::Clean,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// A clean outcome.
    pub fn clean(unit_name: String, file_size: u64, digest: String) -> Self {
        let mut o = Self::base(unit_name, file_size);
        o.digest = Some(digest);
        o
    }

    /// A skipped outcome (extension filter).
    pub fn skipped(unit_name: String, file_size: u64) -> Self {
        let mut o = Self::base(unit_name, file_size);
        o.reason = ScanReason::Skipped;
        o
    }

    /// An error outcome scoped to this unit only.
    pub fn error(unit_name: String, file_size: u64, detail: impl Into<String>) -> Self {
        let mut o = Self::base(unit_name, file_size);
        o.reason = ScanReason::Error;
        o.detail = Some(detail.into());
        o
    }

    /// A detection outcome.
    pub fn detected(
        unit_name: String,
        file_size: u64,
        digest: String,
        malware_name: String,
        severity: Severity,
        reason: ScanReason,
    ) -> Self {
        let mut o = Self::base(unit_name, file_size);
        o.digest = Some(digest);
        o.detected = true;
        o.malware_name = Some(malware_name);
        o.severity = Some(severity);
        o.reason = reason;
        o
    }
}

/// Aggregate result of a batch scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Unique batch identifier
    pub scan_id: String,
    /// When the batch started
    pub started: DateTime<Utc>,
    /// When the batch finished
    pub finished: Option<DateTime<Utc>>,
    /// Total units scanned
    pub total: u64,
    /// Units detected as malicious
    pub detected: u64,
    /// Clean units
    pub clean: u64,
    /// Units skipped by the extension filter
    pub skipped: u64,
    /// Units that failed with a per-unit error
    pub errors: u64,
    /// Whether the batch was cancelled before completion
    pub cancelled: bool,
    /// Per-unit outcomes
    pub outcomes: Vec<ScanOutcome>,
}

impl BatchSummary {
    /// Create a new, empty batch summary.
    pub fn new() -> Self {
        Self {
            scan_id: uuid::Uuid::new_v4().to_string(),
            started: Utc::now(),
            finished: None,
            total: 0,
            detected: 0,
            clean: 0,
            skipped: 0,
            errors: 0,
            cancelled: false,
            outcomes: Vec::new(),
        }
    }

    /// Fold one outcome into the counters.
    pub fn record(&mut self, outcome: ScanOutcome) {
        self.total += 1;
        if outcome.detected {
            self.detected += 1;
        } else {
            match outcome.reason {
                ScanReason::Skipped => self.skipped += 1,
                ScanReason::Error => self.errors += 1,
                _ => self.clean += 1,
            }
        }
        self.outcomes.push(outcome);
    }

    /// Mark the batch as finished.
    pub fn complete(&mut self) {
        self.finished = Some(Utc::now());
    }
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse("low"), Some(Severity::Low));
        assert_eq!(Severity::parse("bogus"), None);
    }

    #[test]
    fn test_unit_display_name() {
        let top = ScanUnit::new("payload.exe", vec![1, 2, 3]);
        assert_eq!(top.display_name(), "payload.exe");
        assert_eq!(top.depth(), 0);
        assert_eq!(top.extension(), "exe");

        let nested = ScanUnit::nested(
            "payload.exe",
            vec![],
            vec!["outer.zip".to_string(), "inner.zip".to_string()],
        );
        assert_eq!(nested.display_name(), "outer.zip/inner.zip/payload.exe");
        assert_eq!(nested.depth(), 2);
    }

    #[test]
    fn test_batch_counters() {
        let mut summary = BatchSummary::new();
        summary.record(ScanOutcome::clean("a.exe".into(), 10, "d1".into()));
        summary.record(ScanOutcome::skipped("b.txt".into(), 5));
        summary.record(ScanOutcome::error("c.zip".into(), 0, "corrupt"));
        summary.record(ScanOutcome::detected(
            "d.exe".into(),
            20,
            "d2".into(),
            "Test.Mal".into(),
            Severity::High,
            ScanReason::SignatureMatch,
        ));

        assert_eq!(summary.total, 4);
        assert_eq!(summary.clean, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.detected, 1);
    }

    #[test]
    fn test_outcome_serialization_reason() {
        let outcome = ScanOutcome::detected(
            "x.exe".into(),
            1,
            "abc".into(),
            "Mal".into(),
            Severity::Low,
            ScanReason::SignatureMatch,
        );
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"signature_match\""));
        assert!(json.contains("\"low\""));
    }
}
