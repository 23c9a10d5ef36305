//! Edit the exclusion list of a target directory

use crate::locks::TargetLock;
use crate::util;
use anyhow::{Context, Result};
use lb_core::normalize_path;
use lb_core::store::TargetLayout;
use owo_colors::OwoColorize;
use snapshot::ExclusionSet;
use std::path::Path;

#[derive(Debug, Clone)]
pub enum ExcludeAction<'a> {
    Add(&'a Path),
    Remove(&'a Path),
    List,
}

pub fn run(target: &Path, action: ExcludeAction<'_>) -> Result<()> {
    if !target.is_dir() {
        anyhow::bail!("Target directory not found: {}", target.display());
    }
    let layout = TargetLayout::new(target);
    let file = layout.exclusions_file();

    let (path, adding) = match action {
        ExcludeAction::List => {
            let set = ExclusionSet::load(&file)?;
            if set.is_empty() {
                println!("{}", "No exclusions".dimmed());
            }
            for path in set.iter() {
                println!("{}", path);
            }
            return Ok(());
        }
        ExcludeAction::Add(path) => (path, true),
        ExcludeAction::Remove(path) => (path, false),
    };

    let _lock = TargetLock::acquire(target, "exclude")?;
    let mut set = ExclusionSet::load(&file)?;
    let key = normalize_path(&util::absolute_path(path)?);

    let changed = if adding {
        set.insert(&key)
    } else {
        set.remove(&key)
    };

    if !changed {
        let state = if adding { "already excluded" } else { "not excluded" };
        println!("{} {}", key, state.dimmed());
        return Ok(());
    }

    set.save(&file)
        .with_context(|| format!("Failed to write {}", file.display()))?;

    if adding {
        println!("{} {}", "Excluded".green(), key);
    } else {
        println!("{} {}", "Included".green(), key);
    }
    Ok(())
}
