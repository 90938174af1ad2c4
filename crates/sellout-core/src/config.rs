//! Runtime configuration.
//!
//! Tuning knobs live in plain structs with builder-style setters. Locations of
//! the crawler output and of the watermark file come from `sellout.toml`,
//! which the CLI may override flag by flag.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SyncError;

// =============================================================================
// Runtime settings
// =============================================================================

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        // One writer at a time; a small pool covers the stats queries too.
        Self { max_connections: 5 }
    }
}

/// Sync run configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Prefix under the snapshot root that holds page files.
    pub location: String,
    /// Refresh format and category dictionaries before applying snapshots.
    pub refresh_dictionaries: bool,
    /// Stop after this many pending snapshots. `None` drains the backlog.
    pub max_snapshots: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            refresh_dictionaries: true,
            max_snapshots: None,
        }
    }
}

impl SyncConfig {
    /// Creates a new SyncConfig reading snapshots from `location`.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Creates a new SyncConfig that leaves dictionaries alone.
    pub fn without_dictionary_refresh(mut self) -> Self {
        self.refresh_dictionaries = false;
        self
    }

    /// Creates a new SyncConfig that applies at most `limit` snapshots per run.
    pub fn with_max_snapshots(mut self, limit: usize) -> Self {
        self.max_snapshots = Some(limit.max(1));
        self
    }
}

/// Default snapshot prefix written by the crawler.
pub const DEFAULT_LOCATION: &str = "raw";

// =============================================================================
// Source configuration file (sellout.toml)
// =============================================================================

pub const CONFIG_FILE_NAME: &str = "sellout.toml";

/// Where the crawler output and the watermark live.
///
/// ```toml
/// snapshot_dir = "/srv/crawler"
/// location = "raw"
/// watermark_path = "/srv/crawler/watermark"
/// dictionary_dir = "/srv/crawler/dictionaries"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Root directory of the crawler output.
    pub snapshot_dir: Option<PathBuf>,
    /// Prefix under `snapshot_dir` holding the page files.
    #[serde(default)]
    pub location: Option<String>,
    /// File holding the watermark.
    pub watermark_path: Option<PathBuf>,
    /// Directory holding `formats.json` and `subcategories.json`.
    #[serde(default)]
    pub dictionary_dir: Option<PathBuf>,
}

impl SourceConfig {
    /// Fills unset fields from `other`. Values already set win.
    pub fn or(self, other: SourceConfig) -> SourceConfig {
        SourceConfig {
            snapshot_dir: self.snapshot_dir.or(other.snapshot_dir),
            location: self.location.or(other.location),
            watermark_path: self.watermark_path.or(other.watermark_path),
            dictionary_dir: self.dictionary_dir.or(other.dictionary_dir),
        }
    }

    pub fn require_snapshot_dir(&self) -> Result<&Path, SyncError> {
        self.snapshot_dir.as_deref().ok_or_else(|| {
            SyncError::ConfigError(
                "snapshot_dir is not set (use --snapshot-dir or sellout.toml)".to_string(),
            )
        })
    }

    /// Watermark file, defaulting to `<snapshot_dir>/watermark`.
    pub fn resolve_watermark_path(&self) -> Result<PathBuf, SyncError> {
        match &self.watermark_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.require_snapshot_dir()?.join("watermark")),
        }
    }
}

/// Returns the default configuration directory path.
///
/// Uses XDG Base Directory specification: `~/.config/sellout/`
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sellout"))
}

/// Returns the default configuration file path.
///
/// Path: `~/.config/sellout/sellout.toml`
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

/// Load source configuration from a TOML file.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No file at the default path
/// * `Err(e)` - An explicit path is missing, or the file is invalid
pub fn load_source_config(path: Option<PathBuf>) -> Result<Option<SourceConfig>, SyncError> {
    let using_default_path = path.is_none();
    let config_path = match path.or_else(default_config_path) {
        Some(p) => p,
        None => return Ok(None),
    };

    if !config_path.exists() {
        if using_default_path {
            return Ok(None);
        }
        return Err(SyncError::ConfigError(format!(
            "Config file not found: {}",
            config_path.display()
        )));
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        SyncError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let config: SourceConfig = toml::from_str(&content).map_err(|e| {
        SyncError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    tracing::debug!(path = %config_path.display(), "Loaded source configuration");
    Ok(Some(config))
}
