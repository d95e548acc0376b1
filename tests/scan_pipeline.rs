//! End-to-end pipeline tests: import signatures, scan, detect, quarantine,
//! restore, and verify the history trail, through the public crate API only.

use malguard::core::config::Config;
use malguard::core::types::{ScanReason, Severity};
use malguard::detection::{Signature, SignatureStore};
use malguard::history::HistoryRecorder;
use malguard::quarantine::QuarantineManager;
use malguard::scanner::ScanOrchestrator;
use malguard::utils::hash::Hasher;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;
use zip::write::FileOptions;
use zip::ZipWriter;

const MAC_KEY: &[u8] = b"integration-test-key";

struct App {
    config: Arc<Config>,
    store: Arc<SignatureStore>,
    quarantine: Arc<QuarantineManager>,
    history: Arc<HistoryRecorder>,
    orchestrator: Arc<ScanOrchestrator>,
}

fn build_app(data_dir: &Path) -> App {
    let mut config = Config::rooted_at(data_dir);
    config.scan.scan_all_extensions = true;
    let config = Arc::new(config);

    let store = Arc::new(SignatureStore::open(&config.signature_db_path, MAC_KEY).unwrap());
    let quarantine = Arc::new(QuarantineManager::open(&config.quarantine_dir).unwrap());
    let history = Arc::new(HistoryRecorder::open(&config.history_path).unwrap());
    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::clone(&config),
        Arc::clone(&store),
        None,
        Arc::clone(&quarantine),
        Arc::clone(&history),
    ));

    App {
        config,
        store,
        quarantine,
        history,
        orchestrator,
    }
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = ZipWriter::new(&mut cursor);
    for (name, data) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
    drop(writer);
    cursor.into_inner()
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn import_scan_detect_quarantine_restore() {
    let data = tempdir().unwrap();
    let work = tempdir().unwrap();
    let app = build_app(data.path());

    let payload = b"known malicious bytes";
    let digest = Hasher::sha256_bytes(payload);

    // Bulk import with one duplicate: skip_existing reports it skipped.
    app.store
        .put(Signature::new(&digest, "Pipeline.Mal", Severity::Critical, "feed"))
        .unwrap();
    let report = app
        .store
        .bulk_import(
            vec![
                Signature::new(&digest, "Pipeline.Mal.Dup", Severity::Low, "feed"),
                Signature::new(
                    &Hasher::sha256_bytes(b"other"),
                    "Other.Mal",
                    Severity::Low,
                    "feed",
                ),
            ],
            true,
        )
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.skipped, 1);

    // Scan: the infected file is detected and moved into quarantine.
    let infected = write_file(work.path(), "infected.exe", payload);
    let outcomes = app.orchestrator.scan_file(&infected).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].detected);
    assert_eq!(outcomes[0].reason, ScanReason::SignatureMatch);
    assert_eq!(outcomes[0].malware_name.as_deref(), Some("Pipeline.Mal"));
    assert!(!infected.exists());

    // Exactly one record, keyed by (digest, original name).
    let records = app.quarantine.list().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key(), format!("{}:infected.exe", digest));

    // Restore by digest prefix puts the identical bytes back.
    let found = app.quarantine.find_by_digest_prefix(&digest[..8]).unwrap();
    let restored = app.quarantine.restore(&found.key(), None).unwrap();
    assert_eq!(restored, infected);
    assert_eq!(std::fs::read(&infected).unwrap(), payload.to_vec());
    assert_eq!(app.quarantine.count().unwrap(), 0);

    // Both the detection and nothing else landed in history.
    let detections = app.history.list(10, true).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].file_name, "infected.exe");
}

#[test]
fn snapshot_survives_restart_and_rejects_tampering() {
    let data = tempdir().unwrap();
    let digest = Hasher::sha256_bytes(b"persisted");

    {
        let app = build_app(data.path());
        app.store
            .put(Signature::new(&digest, "Persist.Mal", Severity::High, "test"))
            .unwrap();
    }

    // Reopen: the signature is still served.
    let app = build_app(data.path());
    assert_eq!(app.store.count().unwrap(), 1);

    // One flipped byte in the snapshot fails the next load outright.
    let path = &app.config.signature_db_path;
    let mut raw = std::fs::read(path).unwrap();
    let pos = raw
        .iter()
        .position(|b| *b == b'P')
        .expect("snapshot contains the signature name");
    raw[pos] = b'Q';
    std::fs::write(path, raw).unwrap();

    let err = SignatureStore::open(path, MAC_KEY).unwrap_err();
    assert!(matches!(err, malguard::Error::Integrity(_)));
}

#[test]
fn nested_archives_detected_to_depth_three_only() {
    let data = tempdir().unwrap();
    let work = tempdir().unwrap();
    let app = build_app(data.path());

    let payload = b"nested payload";
    let digest = Hasher::sha256_bytes(payload);
    app.store
        .put(Signature::new(&digest, "Nested.Mal", Severity::High, "test"))
        .unwrap();

    let l3 = build_zip(&[("payload.exe", &payload[..])]);
    let l2 = build_zip(&[("l3.zip", &l3[..])]);
    let l1 = build_zip(&[("l2.zip", &l2[..])]);

    // Member at depth 3: reachable.
    let three_deep = write_file(work.path(), "l1.zip", &l1);
    let outcomes = app.orchestrator.scan_file(&three_deep).unwrap();
    assert!(outcomes.iter().any(|o| o.detected));

    // One wrapper more: the innermost container is matched opaque, the
    // payload inside it never surfaces.
    let l0 = build_zip(&[("l1.zip", &l1[..])]);
    let four_deep = write_file(work.path(), "l0.zip", &l0);
    let outcomes = app.orchestrator.scan_file(&four_deep).unwrap();
    assert!(outcomes.iter().all(|o| !o.detected));
    assert!(!outcomes.iter().any(|o| o.file_name.ends_with("payload.exe")));
}

#[test]
fn rescan_appends_history_each_time() {
    let data = tempdir().unwrap();
    let work = tempdir().unwrap();
    let app = build_app(data.path());

    let file = write_file(work.path(), "stable.exe", b"unchanging");
    let first = app.orchestrator.scan_file(&file).unwrap();
    let second = app.orchestrator.scan_file(&file).unwrap();

    assert_eq!(first[0].digest, second[0].digest);
    assert_eq!(first[0].reason, ScanReason::Clean);
    assert_eq!(second[0].reason, ScanReason::Clean);

    let entries = app.history.list(10, false).unwrap();
    assert_eq!(entries.len(), 2);

    let stats = app.history.stats().unwrap();
    assert_eq!(stats.total_scans, 2);
    assert_eq!(stats.total_detections, 0);
}

#[tokio::test]
async fn batch_scan_reports_aggregate_counts() {
    let data = tempdir().unwrap();
    let work = tempdir().unwrap();
    let app = build_app(data.path());

    let payload = b"batch payload";
    let digest = Hasher::sha256_bytes(payload);
    app.store
        .put(Signature::new(&digest, "Batch.Mal", Severity::High, "test"))
        .unwrap();

    write_file(work.path(), "bad.exe", payload);
    write_file(work.path(), "clean_a.exe", b"aaa");
    write_file(work.path(), "clean_b.exe", b"bbb");
    write_file(work.path(), "broken.zip", b"not a zip");

    let summary = Arc::clone(&app.orchestrator)
        .scan_batch(vec![work.path().to_path_buf()])
        .await
        .unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.detected, 1);
    assert_eq!(summary.clean, 2);
    assert_eq!(summary.errors, 1);
    assert!(!summary.cancelled);

    // Every outcome from the batch is also in history.
    assert_eq!(
        app.history.list(100, false).unwrap().len() as u64,
        summary.total
    );
}
