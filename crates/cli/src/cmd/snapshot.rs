//! Take a snapshot

use crate::config::Config;
use crate::locks::TargetLock;
use crate::progress::ProgressNotifier;
use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use platform::NativeLinker;
use snapshot::{run_snapshot, SnapshotOptions, SnapshotReport};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn run(
    source: &Path,
    target: &Path,
    name: Option<String>,
    config: &Config,
    show_progress: bool,
) -> Result<()> {
    let name = name.unwrap_or_else(util::default_snapshot_name);

    std::fs::create_dir_all(target)
        .with_context(|| format!("Failed to create target {}", target.display()))?;
    let _lock = TargetLock::acquire(target, "snapshot")?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("Failed to install Ctrl-C handler")?;

    let provider = std::fs::canonicalize(source)
        .ok()
        .and_then(|root| platform::provider_for(&root));

    let options = SnapshotOptions {
        source: source.to_path_buf(),
        target: target.to_path_buf(),
        name: name.clone(),
        use_journal: config.snapshot.use_journal,
        reuse_directories: config.snapshot.reuse_directories,
        copy_chunk_bytes: config.snapshot.copy_chunk_bytes,
    };

    let notifier = ProgressNotifier::new(show_progress);
    let result = run_snapshot(
        &options,
        provider.as_deref(),
        &NativeLinker,
        &notifier,
        &cancel,
    );
    notifier.finish();

    let report = result.with_context(|| format!("Snapshot {} failed", name))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SnapshotReport) {
    let stats = &report.stats;

    println!(
        "{} {}",
        "Snapshot".bold(),
        report.name.green().bold()
    );
    println!("  Location:    {}", report.snapshot_dir.display().to_string().cyan());
    match &report.baseline {
        Some(previous) => println!("  Linked to:   {}", previous),
        None => println!("  Linked to:   {}", "nothing (full copy)".dimmed()),
    }
    println!("  Journal:     {}", report.journal);
    println!(
        "  Copied:      {} files ({})",
        stats.files_copied,
        util::format_size(stats.bytes_copied)
    );
    println!(
        "  Linked:      {} files, {} directories",
        stats.files_linked, stats.dirs_linked
    );
    println!("  Directories: {} created", stats.dirs_created);
    if stats.excluded > 0 {
        println!("  Excluded:    {}", stats.excluded);
    }
    if stats.skipped > 0 || stats.warnings > 0 {
        println!(
            "  {}",
            format!("{} skipped, {} warnings", stats.skipped, stats.warnings).yellow()
        );
    }
}
