//! Error types and result handling for MalGuard.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for MalGuard operations.
#[derive(Error, Debug)]
pub enum Error {
    // ===== I/O Errors =====
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete file: {path}")]
    FileDelete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to access directory: {path}")]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // ===== Configuration Errors =====
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSave(String),

    #[error("Invalid configuration value: {field} - {message}")]
    ConfigInvalid { field: String, message: String },

    // ===== Signature Store Errors =====
    #[error("Signature store integrity check failed: {0}")]
    Integrity(String),

    #[error("Signature already registered for digest: {0}")]
    SignatureConflict(String),

    #[error("Signature not found: {0}")]
    SignatureNotFound(String),

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    // ===== Scanning Errors =====
    #[error("Scan was cancelled")]
    ScanCancelled,

    #[error("Failed to scan: {name} - {reason}")]
    ScanError { name: String, reason: String },

    #[error("Archive extraction failed: {name}")]
    ArchiveError {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ===== Detection Errors =====
    #[error("Pattern rule compilation failed: {0}")]
    RuleCompilation(String),

    // ===== Quarantine Errors =====
    #[error("Failed to quarantine file: {path}")]
    QuarantineFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to restore quarantined item: {key}")]
    RestoreFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Quarantine item not found: {0}")]
    QuarantineItemNotFound(String),

    #[error("Ambiguous match for '{query}': {candidates} records match")]
    AmbiguousMatch { query: String, candidates: usize },

    // ===== Concurrency Errors =====
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    // ===== Serialization Errors =====
    #[error("JSON serialization error")]
    JsonSerialize(#[from] serde_json::Error),

    // ===== Generic Errors =====
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a file read error.
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Create a file write error.
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a scan error.
    pub fn scan_error(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ScanError {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an archive extraction error.
    pub fn archive_error(
        name: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ArchiveError {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Create a lock poisoned error.
    pub fn lock_poisoned(context: impl Into<String>) -> Self {
        Self::LockPoisoned {
            context: context.into(),
        }
    }

    /// Check if this error is recoverable (scan can continue with other units).
    ///
    /// Integrity errors are deliberately excluded: a store that fails its MAC
    /// check must not keep serving data.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::FileRead { .. }
                | Error::PathNotFound(_)
                | Error::ScanError { .. }
                | Error::ArchiveError { .. }
                | Error::QuarantineFailed { .. }
        )
    }

    /// Check if this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::ScanCancelled)
    }
}
