//! Pattern matching engine.
//!
//! Loads rule files from a directory and matches scanned bytes against the
//! compiled set. The engine is an optional capability: when no rules
//! directory is configured the orchestrator runs without it and scans
//! produce signature outcomes only.

use crate::core::error::{Error, Result};
use crate::core::types::Severity;
use crate::detection::rules::PatternRule;
use std::path::Path;

/// A rule that fired on some content.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    /// The matched rule's name
    pub rule_name: String,
    /// The matched rule's severity
    pub severity: Severity,
}

/// Compiled set of pattern rules.
#[derive(Debug)]
pub struct PatternMatcher {
    rules: Vec<PatternRule>,
}

impl PatternMatcher {
    /// Compile the built-in rule set.
    pub fn with_default_rules() -> Result<Self> {
        Self::compile(default_rules())
    }

    /// Compile a matcher from rule values. Fails on the first malformed rule.
    pub fn compile(mut rules: Vec<PatternRule>) -> Result<Self> {
        for rule in &mut rules {
            rule.compile()?;
        }
        log::debug!("Compiled {} pattern rule(s)", rules.len());
        Ok(Self { rules })
    }

    /// Compile a matcher from every `.json` rule file in a directory.
    ///
    /// A rule file holds either a single rule object or an array of rules.
    /// Any malformed file fails the whole load; a half-compiled rule set is
    /// worse than none.
    pub fn from_rules_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| Error::DirectoryAccess {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut rules = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::DirectoryAccess {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let contents =
                std::fs::read_to_string(&path).map_err(|e| Error::file_read(&path, e))?;
            let parsed = parse_rule_source(&contents).map_err(|e| {
                Error::RuleCompilation(format!("{}: {}", path.display(), e))
            })?;
            rules.extend(parsed);
        }

        log::info!("Loaded {} pattern rule(s) from {}", rules.len(), dir.display());
        Self::compile(rules)
    }

    /// Match data against every rule, returning all hits.
    pub fn match_bytes(&self, data: &[u8]) -> Vec<RuleHit> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(data))
            .map(|rule| RuleHit {
                rule_name: rule.name.clone(),
                severity: rule.severity,
            })
            .collect()
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Built-in rules, always available even without a rules directory.
fn default_rules() -> Vec<PatternRule> {
    use crate::detection::rules::Pattern;

    vec![
        PatternRule::new("Eicar.TestFile", Severity::High).with_pattern(Pattern::text(
            "X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*",
        )),
        PatternRule::new("Ransomware.Note.Generic", Severity::Critical)
            .with_pattern(Pattern::text_nocase("your files have been encrypted"))
            .with_pattern(Pattern::text_nocase("decrypt your files"))
            .with_pattern(Pattern::text_nocase("pay the ransom"))
            .with_min_matches(2),
    ]
}

/// Parse a rule source: one rule object or an array of them.
fn parse_rule_source(contents: &str) -> std::result::Result<Vec<PatternRule>, String> {
    if let Ok(rules) = serde_json::from_str::<Vec<PatternRule>>(contents) {
        return Ok(rules);
    }
    serde_json::from_str::<PatternRule>(contents)
        .map(|rule| vec![rule])
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::rules::Pattern;
    use tempfile::tempdir;

    #[test]
    fn test_match_returns_all_hits() {
        let matcher = PatternMatcher::compile(vec![
            PatternRule::new("Rule.A", Severity::High).with_pattern(Pattern::text("alpha")),
            PatternRule::new("Rule.B", Severity::Low).with_pattern(Pattern::text("beta")),
        ])
        .unwrap();

        let hits = matcher.match_bytes(b"alpha and beta");
        assert_eq!(hits.len(), 2);

        let hits = matcher.match_bytes(b"only beta");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule_name, "Rule.B");

        assert!(matcher.match_bytes(b"neither").is_empty());
    }

    #[test]
    fn test_load_from_rules_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("single.json"),
            r#"{"name": "File.Single", "severity": "high",
                "patterns": [{"pattern": "marker-one", "kind": "text"}]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("many.json"),
            r#"[{"name": "File.A", "severity": "low",
                 "patterns": [{"pattern": "marker-two", "kind": "text"}]},
                {"name": "File.B", "severity": "critical",
                 "patterns": [{"pattern": "4D5A", "kind": "hex"}]}]"#,
        )
        .unwrap();
        // Non-JSON files are ignored.
        std::fs::write(dir.path().join("notes.txt"), "not a rule").unwrap();

        let matcher = PatternMatcher::from_rules_dir(dir.path()).unwrap();
        assert_eq!(matcher.rule_count(), 3);

        let hits = matcher.match_bytes(b"\x4D\x5Amarker-one");
        let names: Vec<&str> = hits.iter().map(|h| h.rule_name.as_str()).collect();
        assert!(names.contains(&"File.Single"));
        assert!(names.contains(&"File.B"));
    }

    #[test]
    fn test_default_rules_detect_eicar() {
        let matcher = PatternMatcher::with_default_rules().unwrap();
        let eicar =
            b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";
        let hits = matcher.match_bytes(eicar);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule_name, "Eicar.TestFile");

        assert!(matcher.match_bytes(b"ordinary content").is_empty());
    }

    #[test]
    fn test_malformed_rule_file_fails_load() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let err = PatternMatcher::from_rules_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::RuleCompilation(_)));
    }
}
