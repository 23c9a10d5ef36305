//! Show the index of a target directory

use crate::locks::{LockHolder, TargetLock};
use crate::util;
use anyhow::{Context, Result};
use lb_core::store::TargetLayout;
use owo_colors::OwoColorize;
use serde::Serialize;
use snapshot::{ExclusionSet, SnapshotIndex};
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct TargetStatus {
    pub target: String,
    pub previous: Option<String>,
    pub journal_id: Option<u64>,
    pub last_usn: Option<u64>,
    pub frn_entries: usize,
    pub exclusions: Vec<String>,
    pub snapshots: Vec<String>,
    /// Process recorded in the lock file, live or left behind
    pub locked_by: Option<LockHolder>,
}

impl TargetStatus {
    pub fn load(target: &Path) -> Result<Self> {
        if !target.is_dir() {
            anyhow::bail!("Target directory not found: {}", target.display());
        }

        let layout = TargetLayout::new(target);
        let index = SnapshotIndex::load(&layout)
            .with_context(|| format!("Failed to read index in {}", target.display()))?;
        // Only what is on disk, without the target itself
        let exclusions = ExclusionSet::load(&layout.exclusions_file())?;
        let snapshots = layout.snapshot_names()?;

        Ok(Self {
            target: target.display().to_string(),
            previous: index.previous,
            journal_id: index.journal.journal_id,
            last_usn: index.journal.last_usn,
            frn_entries: index.journal.frn_map.len(),
            exclusions: exclusions.iter().map(str::to_string).collect(),
            snapshots,
            locked_by: TargetLock::holder(target),
        })
    }
}

pub fn run(target: &Path, json: bool) -> Result<()> {
    let target = util::absolute_path(target)?;
    let status = TargetStatus::load(&target)?;

    if json {
        let text = serde_json::to_string_pretty(&status).context("Failed to serialize status")?;
        println!("{}", text);
        return Ok(());
    }

    println!("{}", "Target Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("Target:        {}", status.target.cyan());

    match &status.previous {
        Some(previous) => println!("Previous:      {}", previous.green()),
        None => println!("Previous:      {}", "none".dimmed()),
    }

    if let Some(holder) = &status.locked_by {
        println!("Lock:          {}", holder.describe().yellow());
    }

    match (status.journal_id, status.last_usn) {
        (Some(id), Some(usn)) => {
            println!("Journal:       {:#x} at USN {}", id, usn);
            println!("  Directories: {} mapped", status.frn_entries);
        }
        _ => println!("Journal:       {}", "no cursor (next run copies everything)".dimmed()),
    }
    println!();

    println!("Snapshots ({}):", status.snapshots.len());
    if status.snapshots.is_empty() {
        println!("  {}", "No snapshots yet".dimmed());
    }
    for name in &status.snapshots {
        if status.previous.as_deref() == Some(name.as_str()) {
            println!("  {} {}", name, "(previous)".dimmed());
        } else {
            println!("  {}", name);
        }
    }
    println!();

    println!("Exclusions ({}):", status.exclusions.len());
    for path in &status.exclusions {
        println!("  {}", path);
    }

    Ok(())
}
