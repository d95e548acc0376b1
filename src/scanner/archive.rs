//! Archive expansion.
//!
//! Expands one container unit into its member units, in memory. Recursion
//! across nesting levels is driven by the orchestrator, which re-enters each
//! member through the scan pipeline; this module only ever opens a single
//! archive. Extraction is budgeted per member and per top-level input so a
//! crafted container cannot exhaust memory.

use crate::core::error::{Error, Result};
use crate::core::types::ScanUnit;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Container extensions this expander recognizes.
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "jar", "apk", "docx", "xlsx", "pptx"];

/// Ceiling on members examined per container.
const MAX_ARCHIVE_MEMBERS: usize = 10_000;

/// Whether a unit looks like an archive this expander can open.
pub fn is_archive(extension: &str) -> bool {
    ARCHIVE_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}

/// Mutable byte budget shared by every expansion under one top-level input.
#[derive(Debug)]
pub struct ExtractionBudget {
    /// Per-member ceiling
    pub max_member_bytes: u64,
    /// Bytes still available across all members
    remaining: u64,
}

impl ExtractionBudget {
    pub fn new(max_member_bytes: u64, max_total_bytes: u64) -> Self {
        Self {
            max_member_bytes,
            remaining: max_total_bytes,
        }
    }

    /// Reserve space for one member. Fails when the member alone exceeds the
    /// per-member ceiling or the shared budget is spent.
    fn reserve(&mut self, size: u64) -> std::result::Result<(), String> {
        if size > self.max_member_bytes {
            return Err(format!(
                "member size {} exceeds per-member limit {}",
                size, self.max_member_bytes
            ));
        }
        if size > self.remaining {
            return Err(format!(
                "extraction budget exhausted ({} bytes remaining)",
                self.remaining
            ));
        }
        self.remaining -= size;
        Ok(())
    }

    /// Bytes still available in the shared budget.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

/// How one member fared during expansion.
#[derive(Debug)]
pub enum Expanded {
    /// Member extracted successfully
    Member(ScanUnit),
    /// Member could not be extracted; siblings are unaffected
    Failed { name: String, reason: String },
}

/// Single-level archive expander.
pub struct ArchiveExpander;

impl ArchiveExpander {
    /// Expand a container unit into its members.
    ///
    /// Each member carries the parent's container chain extended by the
    /// parent's own name. Directory entries are dropped. A member that is
    /// encrypted, corrupt, or over budget becomes `Expanded::Failed` without
    /// aborting its siblings. An unreadable central directory fails the whole
    /// container with `ArchiveError`.
    pub fn expand(unit: &ScanUnit, budget: &mut ExtractionBudget) -> Result<Vec<Expanded>> {
        let cursor = Cursor::new(&unit.bytes);
        let mut archive = ZipArchive::new(cursor)
            .map_err(|e| Error::archive_error(unit.display_name(), e))?;

        let mut child_path = unit.container_path.clone();
        child_path.push(unit.logical_name.clone());

        let member_count = archive.len();
        if member_count > MAX_ARCHIVE_MEMBERS {
            log::warn!(
                "{} declares {} members; examining the first {}",
                unit.display_name(),
                member_count,
                MAX_ARCHIVE_MEMBERS
            );
        }

        let mut members = Vec::with_capacity(member_count.min(MAX_ARCHIVE_MEMBERS));
        for index in 0..member_count.min(MAX_ARCHIVE_MEMBERS) {
            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    members.push(Expanded::Failed {
                        name: format!("member #{}", index),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if entry.is_dir() {
                continue;
            }

            // Member names may contain paths; keep the final component as
            // the logical name.
            let full_name = entry.name().to_string();
            let logical_name = full_name
                .rsplit('/')
                .next()
                .unwrap_or(&full_name)
                .to_string();

            if let Err(reason) = budget.reserve(entry.size()) {
                log::warn!("Skipping {}: {}", full_name, reason);
                members.push(Expanded::Failed {
                    name: full_name,
                    reason,
                });
                continue;
            }

            // The budget was charged with the declared size, so the read
            // must not yield more than that.
            let declared_size = entry.size();
            match read_declared(entry.by_ref(), declared_size) {
                Ok(bytes) => {
                    members.push(Expanded::Member(ScanUnit::nested(
                        logical_name,
                        bytes,
                        child_path.clone(),
                    )));
                }
                Err(reason) => {
                    members.push(Expanded::Failed {
                        name: full_name,
                        reason,
                    });
                }
            }
        }

        log::debug!(
            "Expanded {} into {} member(s)",
            unit.display_name(),
            members.len()
        );
        Ok(members)
    }
}

/// Read a member whose header declares `declared` bytes.
///
/// The read is capped at the declared size plus one byte, and a member that
/// decompresses past its declaration is rejected: the extraction budget was
/// charged with the declared size, so anything beyond it would be
/// unaccounted.
fn read_declared(reader: impl Read, declared: u64) -> std::result::Result<Vec<u8>, String> {
    let mut bytes = Vec::with_capacity(declared as usize);
    reader
        .take(declared + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| e.to_string())?;
    if bytes.len() as u64 > declared {
        return Err("member decompresses past its declared size".to_string());
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(&mut cursor);
        for (name, data) in entries {
            writer
                .start_file(*name, FileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        drop(writer);
        cursor.into_inner()
    }

    fn unlimited() -> ExtractionBudget {
        ExtractionBudget::new(u64::MAX, u64::MAX)
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive("zip"));
        assert!(is_archive("ZIP"));
        assert!(is_archive("jar"));
        assert!(!is_archive("exe"));
        assert!(!is_archive(""));
    }

    #[test]
    fn test_expand_members() {
        let zip = build_zip(&[("a.exe", b"alpha"), ("docs/b.dll", b"beta")]);
        let unit = ScanUnit::new("outer.zip", zip);

        let members = ArchiveExpander::expand(&unit, &mut unlimited()).unwrap();
        assert_eq!(members.len(), 2);

        match &members[0] {
            Expanded::Member(m) => {
                assert_eq!(m.logical_name, "a.exe");
                assert_eq!(m.bytes, b"alpha");
                assert_eq!(m.container_path, vec!["outer.zip".to_string()]);
                assert_eq!(m.depth(), 1);
            }
            other => panic!("expected member, got {:?}", other),
        }
        match &members[1] {
            Expanded::Member(m) => {
                // Path components in member names are stripped.
                assert_eq!(m.logical_name, "b.dll");
                assert_eq!(m.display_name(), "outer.zip/b.dll");
            }
            other => panic!("expected member, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_container_chain() {
        let inner = build_zip(&[("payload.exe", b"x")]);
        let unit = ScanUnit::nested("inner.zip", inner, vec!["outer.zip".to_string()]);

        let members = ArchiveExpander::expand(&unit, &mut unlimited()).unwrap();
        match &members[0] {
            Expanded::Member(m) => {
                assert_eq!(m.display_name(), "outer.zip/inner.zip/payload.exe");
                assert_eq!(m.depth(), 2);
            }
            other => panic!("expected member, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_archive_fails_container_only() {
        let unit = ScanUnit::new("broken.zip", b"this is not a zip".to_vec());
        let err = ArchiveExpander::expand(&unit, &mut unlimited()).unwrap_err();
        assert!(matches!(err, Error::ArchiveError { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_member_over_budget_skips_sibling_survives() {
        let zip = build_zip(&[("big.bin", &[0u8; 1024]), ("small.bin", b"ok")]);
        let unit = ScanUnit::new("mixed.zip", zip);

        let mut budget = ExtractionBudget::new(100, u64::MAX);
        let members = ArchiveExpander::expand(&unit, &mut budget).unwrap();
        assert_eq!(members.len(), 2);
        assert!(matches!(&members[0], Expanded::Failed { .. }));
        assert!(matches!(&members[1], Expanded::Member(_)));
    }

    #[test]
    fn test_member_past_declared_size_rejected() {
        // A header may understate the member size; the budget was charged
        // with the declaration, so extra bytes must not materialize.
        let data = [0xAAu8; 64];
        let err = read_declared(&data[..], 10).unwrap_err();
        assert!(err.contains("declared size"));

        // Exactly the declared size is fine.
        let bytes = read_declared(&data[..], 64).unwrap();
        assert_eq!(bytes.len(), 64);

        // Fewer bytes than declared is fine too (trailing truncation).
        let bytes = read_declared(&data[..32], 64).unwrap();
        assert_eq!(bytes.len(), 32);
    }

    #[test]
    fn test_budget_charged_with_extracted_bytes() {
        let zip = build_zip(&[("a.bin", &[1u8; 40])]);
        let unit = ScanUnit::new("one.zip", zip);

        let mut budget = ExtractionBudget::new(1000, 100);
        let members = ArchiveExpander::expand(&unit, &mut budget).unwrap();
        assert!(matches!(&members[0], Expanded::Member(_)));
        assert_eq!(budget.remaining(), 60);
    }

    #[test]
    fn test_total_budget_exhaustion() {
        let zip = build_zip(&[("a.bin", &[1u8; 60]), ("b.bin", &[2u8; 60])]);
        let unit = ScanUnit::new("two.zip", zip);

        // Budget covers the first member but not both.
        let mut budget = ExtractionBudget::new(1000, 100);
        let members = ArchiveExpander::expand(&unit, &mut budget).unwrap();
        assert!(matches!(&members[0], Expanded::Member(_)));
        assert!(matches!(&members[1], Expanded::Failed { .. }));
    }

    #[test]
    fn test_directory_entries_dropped() {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(&mut cursor);
        writer.add_directory("empty/", FileOptions::default()).unwrap();
        writer.start_file("file.txt", FileOptions::default()).unwrap();
        writer.write_all(b"data").unwrap();
        writer.finish().unwrap();
        drop(writer);

        let unit = ScanUnit::new("dirs.zip", cursor.into_inner());
        let members = ArchiveExpander::expand(&unit, &mut unlimited()).unwrap();
        assert_eq!(members.len(), 1);
    }
}
