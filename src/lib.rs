//! MalGuard: signature-based malware detection and quarantine
//!
//! This crate provides digest-based signature matching over a tamper-evident
//! store, optional pattern rule matching, bounded archive recursion, a
//! quarantine vault, and an append-only scan history.

pub mod core;
pub mod detection;
pub mod history;
pub mod quarantine;
pub mod scanner;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
pub use crate::core::types::*;
