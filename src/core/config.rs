//! Configuration for MalGuard.
//!
//! Every component takes its paths, keys, and limits from an injected
//! `Config` value. There is no process-global state; tests construct
//! configurations over temporary roots.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted for the snapshot MAC key when the
/// configuration does not carry one.
pub const MAC_KEY_ENV: &str = "MALGUARD_HMAC_KEY";

/// Default extension allow-list: executable-leaning formats worth hashing.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "sys", "scr", "pif", "com", "bat", "cmd", "ps1", "vbs", "vbe", "js", "jse",
    "wsf", "wsh", "jar", "py", "pyw", "sh", "bash", "msi", "msp", "msu", "elf", "bin", "run",
    "deb", "rpm", "dmg", "app", "pkg", "apk", "ipa", "docm", "xlsm", "pptm", "zip",
];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the MAC-protected signature snapshot
    pub signature_db_path: PathBuf,
    /// Root directory for quarantined content and its manifest
    pub quarantine_dir: PathBuf,
    /// Path to the scan history log
    pub history_path: PathBuf,
    /// Directory of pattern rule sources (JSON), if any
    pub rules_dir: Option<PathBuf>,
    /// Secret key for the snapshot MAC. Held in configuration, never
    /// co-located with the snapshot itself. Falls back to `MALGUARD_HMAC_KEY`.
    #[serde(default)]
    pub mac_key: Option<String>,
    /// Scan tuning
    pub scan: ScanConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Build a configuration rooted at a single data directory.
    pub fn rooted_at(data_dir: &Path) -> Self {
        Self {
            signature_db_path: data_dir.join("signatures.json"),
            quarantine_dir: data_dir.join("quarantine"),
            history_path: data_dir.join("history.jsonl"),
            rules_dir: None,
            mac_key: None,
            scan: ScanConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from the default location, or create it if absent.
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            match Self::load(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config, using defaults: {}", e);
                }
            }
        }

        let config = Self::rooted_at(&Self::data_dir());
        if let Err(e) = config.save(&config_path) {
            log::warn!("Failed to save default config: {}", e);
        }
        config
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// Get the application data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("malguard")
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("Failed to read config file: {}", e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::ConfigSave(format!("Failed to create config dir: {}", e)))?;
        }
        std::fs::write(path, contents)
            .map_err(|e| Error::ConfigSave(format!("Failed to write config file: {}", e)))
    }

    /// Resolve the effective MAC key: configuration first, then environment.
    pub fn resolve_mac_key(&self) -> Result<Vec<u8>> {
        if let Some(key) = &self.mac_key {
            if !key.is_empty() {
                return Ok(key.as_bytes().to_vec());
            }
        }
        match std::env::var(MAC_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(key.into_bytes()),
            _ => Err(Error::ConfigInvalid {
                field: "mac_key".to_string(),
                message: format!("no MAC key configured and {} is unset", MAC_KEY_ENV),
            }),
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.scan.max_archive_depth == 0 || self.scan.max_archive_depth > 10 {
            return Err(Error::ConfigInvalid {
                field: "scan.max_archive_depth".to_string(),
                message: "Must be between 1 and 10".to_string(),
            });
        }
        if self.scan.max_member_bytes == 0 {
            return Err(Error::ConfigInvalid {
                field: "scan.max_member_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if self.scan.max_extracted_bytes < self.scan.max_member_bytes {
            return Err(Error::ConfigInvalid {
                field: "scan.max_extracted_bytes".to_string(),
                message: "Must be at least scan.max_member_bytes".to_string(),
            });
        }
        Ok(())
    }
}

/// Scan-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Scan every extension instead of the allow-list
    pub scan_all_extensions: bool,
    /// Extensions worth scanning when the filter is active (no leading dot)
    pub allowed_extensions: Vec<String>,
    /// Whether to expand archive contents
    pub scan_archives: bool,
    /// Maximum archive nesting depth
    pub max_archive_depth: usize,
    /// Per-member extraction ceiling in bytes
    pub max_member_bytes: u64,
    /// Total extracted bytes allowed per top-level input. Guards against
    /// decompression-bomb containers.
    pub max_extracted_bytes: u64,
    /// Number of parallel scan workers for batch scans
    pub scan_threads: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_all_extensions: false,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scan_archives: true,
            max_archive_depth: 3,
            max_member_bytes: 100 * 1024 * 1024,
            max_extracted_bytes: 256 * 1024 * 1024,
            scan_threads: num_cpus(),
        }
    }
}

impl ScanConfig {
    /// Check whether an extension passes the allow-list filter.
    pub fn extension_allowed(&self, ext: &str) -> bool {
        if self.scan_all_extensions {
            return true;
        }
        let ext = ext.to_lowercase();
        self.allowed_extensions.iter().any(|a| *a == ext)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable verbose console output
    pub verbose_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            verbose_console: false,
        }
    }
}

/// Get the number of CPUs, with a reasonable default.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let dir = tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        assert!(config.validate().is_ok());
        assert!(config.scan.extension_allowed("exe"));
        assert!(config.scan.extension_allowed("EXE"));
        assert!(!config.scan.extension_allowed("txt"));
    }

    #[test]
    fn test_scan_all_overrides_filter() {
        let mut scan = ScanConfig::default();
        scan.scan_all_extensions = true;
        assert!(scan.extension_allowed("txt"));
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::rooted_at(dir.path());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.scan.max_archive_depth, config.scan.max_archive_depth);
        assert_eq!(loaded.signature_db_path, config.signature_db_path);
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path());
        config.scan.max_archive_depth = 0;
        assert!(config.validate().is_err());

        config.scan.max_archive_depth = 3;
        config.scan.max_extracted_bytes = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mac_key_resolution() {
        let dir = tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path());
        config.mac_key = Some("secret".to_string());
        assert_eq!(config.resolve_mac_key().unwrap(), b"secret".to_vec());
    }
}
