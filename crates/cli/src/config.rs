//! Configuration for linkback
//!
//! Settings come from TOML files layered in this order, later layers
//! overriding earlier ones key by key:
//! 1. Built-in defaults
//! 2. User config (`<config dir>/linkback/config.toml`)
//! 3. Target config (`<target>/linkback.toml`)
//! 4. An explicit `--config` file
//!
//! Command-line flags are applied on top by the caller.

use anyhow::{Context, Result};
use lb_core::store::TargetLayout;
use serde::{Deserialize, Serialize};
use snapshot::walker::DEFAULT_COPY_CHUNK_BYTES;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;

pub const MIN_COPY_CHUNK_BYTES: usize = 4 * 1024;
pub const MAX_COPY_CHUNK_BYTES: usize = 64 * 1024 * 1024;

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub snapshot: SnapshotConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotConfig {
    /// Consult the change journal to link unchanged entries
    pub use_journal: bool,

    /// Link unchanged directories, not just files
    pub reuse_directories: bool,

    /// Buffer size for file copies
    pub copy_chunk_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogConfig {
    /// Default log level (trace, debug, info, warn, error, off)
    pub level: String,

    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot: SnapshotConfig {
                use_journal: true,
                reuse_directories: false,
                copy_chunk_bytes: DEFAULT_COPY_CHUNK_BYTES,
            },
            log: LogConfig {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

/// One config file; absent keys leave the lower layer alone
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigLayer {
    snapshot: SnapshotLayer,
    log: LogLayer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SnapshotLayer {
    use_journal: Option<bool>,
    reuse_directories: Option<bool>,
    copy_chunk_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogLayer {
    level: Option<String>,
    file: Option<PathBuf>,
}

impl Config {
    /// Layer the user, target and explicit config files over the defaults
    ///
    /// Missing user and target files are skipped; a missing explicit file
    /// is an error.
    pub fn resolve(target: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = user_config_path() {
            config.apply_file_if_exists(&path)?;
        }
        if let Some(target) = target {
            config.apply_file_if_exists(&TargetLayout::new(target).config_file())?;
        }
        if let Some(path) = explicit {
            config.apply_file(path)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document as a layer over `self`
    pub fn apply_str(&mut self, text: &str) -> Result<()> {
        let layer: ConfigLayer = toml::from_str(text).context("Invalid configuration")?;

        let snapshot = layer.snapshot;
        if let Some(value) = snapshot.use_journal {
            self.snapshot.use_journal = value;
        }
        if let Some(value) = snapshot.reuse_directories {
            self.snapshot.reuse_directories = value;
        }
        if let Some(value) = snapshot.copy_chunk_bytes {
            self.snapshot.copy_chunk_bytes = value;
        }

        if let Some(level) = layer.log.level {
            self.log.level = level;
        }
        if let Some(file) = layer.log.file {
            self.log.file = Some(file);
        }
        Ok(())
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        self.apply_str(&text)
            .with_context(|| format!("Failed to load config file {}", path.display()))?;
        tracing::debug!("Applied config {}", path.display());
        Ok(())
    }

    fn apply_file_if_exists(&mut self, path: &Path) -> Result<()> {
        if path.is_file() {
            self.apply_file(path)?;
        }
        Ok(())
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        let chunk = self.snapshot.copy_chunk_bytes;
        if !(MIN_COPY_CHUNK_BYTES..=MAX_COPY_CHUNK_BYTES).contains(&chunk) {
            anyhow::bail!(
                "snapshot.copy_chunk_bytes must be between {} and {} (got {})",
                MIN_COPY_CHUNK_BYTES,
                MAX_COPY_CHUNK_BYTES,
                chunk
            );
        }

        if self.log.level.parse::<LevelFilter>().is_err() {
            anyhow::bail!(
                "log.level must be one of trace, debug, info, warn, error, off (got {:?})",
                self.log.level
            );
        }

        Ok(())
    }
}

/// `<config dir>/linkback/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("linkback").join("config.toml"))
}
