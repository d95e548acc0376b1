//! MalGuard command-line entry point.

use malguard::core::config::Config;
use malguard::core::error::{Error, Result};
use malguard::core::types::Severity;
use malguard::detection::{PatternMatcher, Signature, SignatureStore};
use malguard::history::HistoryRecorder;
use malguard::quarantine::QuarantineManager;
use malguard::scanner::ScanOrchestrator;
use malguard::ui::cli::{Cli, Commands, OutputFormat, QuarantineAction, SignatureAction};
use malguard::utils::hash::Hasher;
use malguard::utils::logging::{init_logging, LogConfig};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    init_logging(log_config);

    log::debug!("MalGuard v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    config.validate()?;

    match cli.command {
        Some(Commands::Scan {
            paths,
            all_types,
            no_archives,
        }) => run_scan(config, paths, all_types, no_archives, cli.format).await,
        Some(Commands::Signature { action }) => run_signature(&config, action, cli.format),
        Some(Commands::Quarantine { action }) => run_quarantine(&config, action, cli.format),
        Some(Commands::History {
            limit,
            detected,
            clear,
        }) => run_history(&config, limit, detected, clear, cli.format),
        Some(Commands::Info) => run_info(&config),
        None => {
            println!("MalGuard - Malware Detection and Quarantine");
            println!();
            println!("Use --help for usage information");
            println!();
            println!("Quick start:");
            println!("  malguard scan <path>            Scan a file or directory");
            println!("  malguard signature list         View registered signatures");
            println!("  malguard quarantine list        View quarantined items");
            println!("  malguard history                View recent scan outcomes");
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<SignatureStore>> {
    let key = config.resolve_mac_key()?;
    Ok(Arc::new(SignatureStore::open(
        &config.signature_db_path,
        &key,
    )?))
}

/// Build the pattern engine: configured rules directory if present, the
/// built-in rule set otherwise. A failure to compile is not fatal; scanning
/// continues with digest lookup only.
fn open_matcher(config: &Config) -> Option<Arc<PatternMatcher>> {
    let result = match &config.rules_dir {
        Some(dir) if dir.exists() => PatternMatcher::from_rules_dir(dir),
        Some(dir) => {
            log::warn!(
                "Rules directory {} does not exist; using built-in rules",
                dir.display()
            );
            PatternMatcher::with_default_rules()
        }
        None => PatternMatcher::with_default_rules(),
    };
    match result {
        Ok(matcher) => Some(Arc::new(matcher)),
        Err(e) => {
            log::warn!("Pattern rules unavailable, scanning by digest only: {}", e);
            None
        }
    }
}

async fn run_scan(
    mut config: Config,
    paths: Vec<PathBuf>,
    all_types: bool,
    no_archives: bool,
    format: OutputFormat,
) -> Result<()> {
    if all_types {
        config.scan.scan_all_extensions = true;
    }
    if no_archives {
        config.scan.scan_archives = false;
    }
    let config = Arc::new(config);

    let store = open_store(&config)?;
    let matcher = open_matcher(&config);
    let quarantine = Arc::new(QuarantineManager::open(&config.quarantine_dir)?);
    let history = Arc::new(HistoryRecorder::open(&config.history_path)?);

    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::clone(&config),
        store,
        matcher,
        quarantine,
        history,
    ));

    let summary = orchestrator.scan_batch(paths).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            for outcome in &summary.outcomes {
                if outcome.detected {
                    println!(
                        "DETECTED  {}  {}  [{}]",
                        outcome.file_name,
                        outcome.malware_name.as_deref().unwrap_or("?"),
                        outcome
                            .severity
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "?".to_string()),
                    );
                }
            }
            println!();
            println!("Scan {} complete:", summary.scan_id);
            println!("  Scanned:  {}", summary.total);
            println!("  Detected: {}", summary.detected);
            println!("  Clean:    {}", summary.clean);
            println!("  Skipped:  {}", summary.skipped);
            println!("  Errors:   {}", summary.errors);
            if summary.cancelled {
                println!("  (cancelled before completion)");
            }
        }
    }
    Ok(())
}

fn run_signature(config: &Config, action: SignatureAction, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;

    match action {
        SignatureAction::Add {
            target,
            from_file,
            name,
            severity,
            source,
        } => {
            let severity = Severity::parse(&severity).ok_or_else(|| Error::ConfigInvalid {
                field: "severity".to_string(),
                message: format!("unknown severity '{}'", severity),
            })?;
            let digest = if from_file {
                Hasher::sha256_file(&PathBuf::from(&target))?
            } else {
                target
            };
            store.put(Signature::new(&digest, &name, severity, &source))?;
            println!("Registered '{}' for {}", name, digest);
        }
        SignatureAction::Remove { digest } => {
            let record = store.delete(&digest)?;
            println!("Removed '{}' ({})", record.name, digest);
        }
        SignatureAction::List { offset, limit } => {
            let signatures = store.list(offset, limit)?;
            print_signatures(&signatures, format)?;
        }
        SignatureAction::Search { text } => {
            let signatures = store.search(&text)?;
            print_signatures(&signatures, format)?;
        }
        SignatureAction::Import {
            path,
            skip_existing,
        } => {
            let key = config.resolve_mac_key()?;
            let imported = SignatureStore::open(&path, &key)?;
            let signatures = imported.list(0, usize::MAX)?;
            let report = store.bulk_import(signatures, skip_existing)?;
            println!("Imported {} signature(s), skipped {}", report.added, report.skipped);
        }
        SignatureAction::Export { path } => {
            let snapshot = store.export_all()?;
            std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)
                .map_err(|e| Error::file_write(&path, e))?;
            println!("Exported {} signature(s) to {}", snapshot.data.len(), path.display());
        }
    }
    Ok(())
}

fn print_signatures(signatures: &[Signature], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(signatures)?),
        OutputFormat::Text => {
            if signatures.is_empty() {
                println!("No signatures found");
                return Ok(());
            }
            for sig in signatures {
                println!(
                    "{}  [{}]  {}  (source: {}, added {})",
                    sig.digest,
                    sig.record.severity,
                    sig.record.name,
                    sig.record.source,
                    sig.record.added_on.format("%Y-%m-%d"),
                );
            }
        }
    }
    Ok(())
}

fn run_quarantine(config: &Config, action: QuarantineAction, format: OutputFormat) -> Result<()> {
    let manager = QuarantineManager::open(&config.quarantine_dir)?;

    match action {
        QuarantineAction::List => {
            let records = manager.list()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Text => {
                    if records.is_empty() {
                        println!("Quarantine is empty");
                        return Ok(());
                    }
                    for record in records {
                        println!(
                            "{}  {}  [{}]  {}  ({})",
                            &record.digest[..16],
                            record.original_name,
                            record.severity,
                            record.malware_name,
                            record.quarantined_on.format("%Y-%m-%d %H:%M"),
                        );
                    }
                }
            }
        }
        QuarantineAction::Restore { digest, to } => {
            let record = manager.find_by_digest_prefix(&digest)?;
            let destination = manager.restore(&record.key(), to.as_deref())?;
            println!("Restored '{}' to {}", record.original_name, destination.display());
        }
        QuarantineAction::Delete { digest } => {
            let record = manager.find_by_digest_prefix(&digest)?;
            manager.delete(&record.key())?;
            println!("Deleted '{}' permanently", record.original_name);
        }
        QuarantineAction::Clear { yes } => {
            let count = manager.count()?;
            if count == 0 {
                println!("Quarantine is empty");
                return Ok(());
            }
            if !yes && !confirm(&format!("Permanently delete {} quarantined item(s)?", count))? {
                println!("Aborted");
                return Ok(());
            }
            let removed = manager.clear_all()?;
            println!("Deleted {} item(s)", removed);
        }
    }
    Ok(())
}

fn run_history(
    config: &Config,
    limit: usize,
    detected: bool,
    clear: bool,
    format: OutputFormat,
) -> Result<()> {
    let history = HistoryRecorder::open(&config.history_path)?;

    if clear {
        history.clear()?;
        println!("History cleared");
        return Ok(());
    }

    let entries = history.list(limit, detected)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No history entries");
                return Ok(());
            }
            for entry in entries {
                let status = if entry.detected {
                    format!("DETECTED ({})", entry.malware_name.as_deref().unwrap_or("?"))
                } else {
                    entry.reason.to_string()
                };
                println!(
                    "{}  {}  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.file_name,
                    status,
                );
            }
        }
    }
    Ok(())
}

fn run_info(config: &Config) -> Result<()> {
    println!("MalGuard v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Signature database: {}", config.signature_db_path.display());
    println!("Quarantine vault:   {}", config.quarantine_dir.display());
    println!("History log:        {}", config.history_path.display());
    match &config.rules_dir {
        Some(dir) => println!("Pattern rules:      {}", dir.display()),
        None => println!("Pattern rules:      (not configured)"),
    }

    if let Ok(store) = open_store(config) {
        println!();
        println!("Registered signatures: {}", store.count()?);
    }
    let quarantine = QuarantineManager::open(&config.quarantine_dir)?;
    println!("Quarantined items:     {}", quarantine.count()?);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout()
        .flush()
        .map_err(|e| Error::Io(e.to_string()))?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .map_err(|e| Error::Io(e.to_string()))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
