//! Scan pipeline: archive expansion and orchestration.

pub mod archive;
pub mod orchestrator;

pub use archive::{is_archive, ArchiveExpander, Expanded, ExtractionBudget};
pub use orchestrator::ScanOrchestrator;
