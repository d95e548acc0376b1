//! Detection: signature store and pattern rule engine.

pub mod engine;
pub mod rules;
pub mod store;

pub use engine::{PatternMatcher, RuleHit};
pub use rules::{Pattern, PatternKind, PatternRule};
pub use store::{ImportReport, Signature, SignatureRecord, SignatureSnapshot, SignatureStore};
