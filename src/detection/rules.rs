//! Pattern rule definitions.
//!
//! Rules are JSON documents: a name, a severity, a set of byte/string
//! patterns, and a minimum match count. A rule fires when at least
//! `min_matches` of its patterns occur in the scanned bytes.

use crate::core::error::{Error, Result};
use crate::core::types::Severity;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

/// Pattern type for string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Plain text (case-sensitive)
    Text,
    /// Plain text (case-insensitive)
    TextNocase,
    /// Hex byte sequence
    Hex,
    /// Regular expression over raw bytes
    Regex,
}

/// One pattern within a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// The pattern content
    pub pattern: String,
    /// How to interpret the content
    pub kind: PatternKind,
    /// Compiled matcher, built once by `compile`
    #[serde(skip)]
    compiled: Option<Regex>,
}

impl Pattern {
    pub fn text(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::Text,
            compiled: None,
        }
    }

    pub fn text_nocase(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::TextNocase,
            compiled: None,
        }
    }

    pub fn hex(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::Hex,
            compiled: None,
        }
    }

    pub fn regex(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::Regex,
            compiled: None,
        }
    }

    /// Compile the pattern. Every kind lowers to a bytes regex so matching
    /// works on non-UTF-8 content.
    pub fn compile(&mut self) -> Result<()> {
        let source = match self.kind {
            PatternKind::Text => regex::escape(&self.pattern),
            PatternKind::TextNocase => format!("(?i){}", regex::escape(&self.pattern)),
            PatternKind::Regex => self.pattern.clone(),
            PatternKind::Hex => {
                // `(?-u)` so high-bit escapes match single raw bytes.
                let bytes = parse_hex(&self.pattern)?;
                let escapes: String = bytes.iter().map(|b| format!("\\x{:02x}", b)).collect();
                format!("(?-u){}", escapes)
            }
        };
        self.compiled = Some(Regex::new(&source).map_err(|e| {
            Error::RuleCompilation(format!("pattern '{}': {}", self.pattern, e))
        })?);
        Ok(())
    }

    /// Whether the pattern occurs in the data. An uncompiled pattern never
    /// matches; `PatternRule::compile` runs before any matching.
    fn matches(&self, data: &[u8]) -> bool {
        self.compiled
            .as_ref()
            .map(|re| re.is_match(data))
            .unwrap_or(false)
    }
}

/// A detection rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    /// Rule identifier, reported as the malware name on a match
    pub name: String,
    /// Severity assigned to matches
    pub severity: Severity,
    /// What the rule looks for
    #[serde(default)]
    pub description: String,
    /// Patterns to search for
    pub patterns: Vec<Pattern>,
    /// Minimum number of distinct patterns that must occur
    #[serde(default = "default_min_matches")]
    pub min_matches: usize,
}

fn default_min_matches() -> usize {
    1
}

impl PatternRule {
    pub fn new(name: &str, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            severity,
            description: String::new(),
            patterns: Vec::new(),
            min_matches: 1,
        }
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_min_matches(mut self, n: usize) -> Self {
        self.min_matches = n;
        self
    }

    /// Compile all patterns and validate the rule shape.
    pub fn compile(&mut self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(Error::RuleCompilation(format!(
                "rule '{}' has no patterns",
                self.name
            )));
        }
        if self.min_matches == 0 || self.min_matches > self.patterns.len() {
            return Err(Error::RuleCompilation(format!(
                "rule '{}': min_matches {} out of range for {} pattern(s)",
                self.name,
                self.min_matches,
                self.patterns.len()
            )));
        }
        for pattern in &mut self.patterns {
            pattern.compile()?;
        }
        Ok(())
    }

    /// Whether the rule fires on the given data.
    pub fn matches(&self, data: &[u8]) -> bool {
        let mut hits = 0;
        for pattern in &self.patterns {
            if pattern.matches(data) {
                hits += 1;
                if hits >= self.min_matches {
                    return true;
                }
            }
        }
        false
    }
}

/// Parse a hex string like "4D5A90" (whitespace tolerated) into bytes.
fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() || cleaned.len() % 2 != 0 {
        return Err(Error::RuleCompilation(format!(
            "hex pattern '{}' has odd length",
            s
        )));
    }
    hex::decode(&cleaned)
        .map_err(|_| Error::RuleCompilation(format!("hex pattern '{}' is not valid hex", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_pattern() {
        let mut rule = PatternRule::new("Test.Text", Severity::Medium)
            .with_pattern(Pattern::text("evil_marker"));
        rule.compile().unwrap();
        assert!(rule.matches(b"prefix evil_marker suffix"));
        assert!(!rule.matches(b"EVIL_MARKER"));
    }

    #[test]
    fn test_nocase_pattern() {
        let mut rule = PatternRule::new("Test.Nocase", Severity::Low)
            .with_pattern(Pattern::text_nocase("Ransom"));
        rule.compile().unwrap();
        assert!(rule.matches(b"PAY THE RANSOM"));
    }

    #[test]
    fn test_hex_pattern() {
        let mut rule =
            PatternRule::new("Test.Hex", Severity::High).with_pattern(Pattern::hex("4D 5A 90"));
        rule.compile().unwrap();
        assert!(rule.matches(&[0x00, 0x4D, 0x5A, 0x90, 0xFF]));
        assert!(!rule.matches(&[0x4D, 0x5A]));
    }

    #[test]
    fn test_min_matches() {
        let mut rule = PatternRule::new("Test.Multi", Severity::High)
            .with_pattern(Pattern::text("VirtualAllocEx"))
            .with_pattern(Pattern::text("WriteProcessMemory"))
            .with_pattern(Pattern::text("CreateRemoteThread"))
            .with_min_matches(2);
        rule.compile().unwrap();

        assert!(!rule.matches(b"only VirtualAllocEx here"));
        assert!(rule.matches(b"VirtualAllocEx then WriteProcessMemory"));
    }

    #[test]
    fn test_matches_non_utf8_data() {
        let mut rule =
            PatternRule::new("Test.Binary", Severity::Low).with_pattern(Pattern::text("marker"));
        rule.compile().unwrap();

        let mut data = vec![0xFF, 0xFE, 0x80];
        data.extend_from_slice(b"marker");
        assert!(rule.matches(&data));
    }

    #[test]
    fn test_uncompiled_rule_never_matches() {
        let rule =
            PatternRule::new("Test.Uncompiled", Severity::Low).with_pattern(Pattern::text("x"));
        assert!(!rule.matches(b"x"));
    }

    #[test]
    fn test_bad_rules_rejected() {
        let mut empty = PatternRule::new("Empty", Severity::Low);
        assert!(matches!(
            empty.compile().unwrap_err(),
            Error::RuleCompilation(_)
        ));

        let mut bad_hex =
            PatternRule::new("BadHex", Severity::Low).with_pattern(Pattern::hex("4D5"));
        assert!(bad_hex.compile().is_err());

        let mut bad_regex =
            PatternRule::new("BadRegex", Severity::Low).with_pattern(Pattern::regex("[unclosed"));
        assert!(bad_regex.compile().is_err());

        let mut bad_min = PatternRule::new("BadMin", Severity::Low)
            .with_pattern(Pattern::text("x"))
            .with_min_matches(5);
        assert!(bad_min.compile().is_err());
    }
}
