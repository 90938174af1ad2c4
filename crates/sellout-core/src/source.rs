//! Filesystem-backed snapshot and dictionary sources.
//!
//! The crawler writes one JSON page per request under
//! `raw/<year>/<month>/<day>/<hour>_<minute>_<second>_<page>.json`, without zero
//! padding, and dumps the format and category dictionaries as `formats.json`
//! and `subcategories.json`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::models::NamedRow;
use crate::raw::{RawCategories, RawFormats};
use crate::timestamp::{self, Timestamp};
use crate::traits::{DictionarySource, SnapshotRef, SnapshotSource};

/// Extracts the crawl time encoded in a snapshot key.
///
/// Only the last four path segments are considered, so the key may carry any
/// prefix. Returns `None` when they do not spell a valid date-time.
///
/// # Examples
///
/// ```
/// use sellout_core::source::timestamp_from_key;
///
/// let ts = timestamp_from_key("raw/2019/4/1/9_5_0_3.json").unwrap();
/// assert_eq!(ts.to_string(), "2019-04-01 09:05:00");
/// assert!(timestamp_from_key("raw/misc/notes.json").is_none());
/// ```
pub fn timestamp_from_key(key: &str) -> Option<Timestamp> {
    let mut segments = key.rsplit(['/', '\\']);
    let file = segments.next()?;
    let day: u32 = segments.next()?.parse().ok()?;
    let month: u32 = segments.next()?.parse().ok()?;
    let year: i32 = segments.next()?.parse().ok()?;

    let stem = file.strip_suffix(".json").unwrap_or(file);
    let mut clock = stem.split('_');
    let hour: u32 = clock.next()?.parse().ok()?;
    let minute: u32 = clock.next()?.parse().ok()?;
    let second: u32 = clock.next()?.parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Snapshot source over a local directory tree.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every `.json` file below `dir`, as keys relative to the root, in
    /// lexical order.
    async fn walk(&self, dir: &Path) -> Result<Vec<String>, SyncError> {
        let mut keys = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current)
                .await
                .map_err(|e| SyncError::Source(format!("{}: {}", current.display(), e)))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "json") {
                    keys.push(self.key_for(&path));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn key_for(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl SnapshotSource for DirectorySource {
    async fn list(&self, location: &str) -> Result<Vec<SnapshotRef>, SyncError> {
        let dir = self.root.join(location);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(SyncError::Source(format!(
                "snapshot location {} does not exist",
                dir.display()
            )));
        }

        let listed_at = timestamp::now();
        let keys = self.walk(&dir).await?;
        debug!(location, count = keys.len(), "Listed snapshot files");

        Ok(keys
            .into_iter()
            .map(|key| match timestamp_from_key(&key) {
                Some(ts) => SnapshotRef {
                    location: key,
                    timestamp: ts,
                    inferred: false,
                },
                None => {
                    warn!(
                        snapshot = %key,
                        "Snapshot path carries no crawl time, using listing time"
                    );
                    SnapshotRef {
                        location: key,
                        timestamp: listed_at,
                        inferred: true,
                    }
                }
            })
            .collect())
    }

    async fn read(&self, snapshot: &SnapshotRef) -> Result<Vec<u8>, SyncError> {
        let path = self.root.join(&snapshot.location);
        tokio::fs::read(&path)
            .await
            .map_err(|e| SyncError::Source(format!("{}: {}", path.display(), e)))
    }
}

/// File name of the format dictionary dump.
pub const FORMATS_FILE: &str = "formats.json";

/// File name of the category dictionary dump.
pub const CATEGORIES_FILE: &str = "subcategories.json";

/// Dictionary source reading the crawler's JSON dumps from one directory.
#[derive(Debug, Clone)]
pub struct DirectoryDictionarySource {
    dir: PathBuf,
}

impl DirectoryDictionarySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, SyncError> {
        let path = self.dir.join(name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| SyncError::Source(format!("{}: {}", path.display(), e)))
    }
}

impl DictionarySource for DirectoryDictionarySource {
    async fn formats(&self) -> Result<Vec<NamedRow>, SyncError> {
        let body = self.read_file(FORMATS_FILE).await?;
        let dump: RawFormats = serde_json::from_slice(&body)?;
        Ok(dump.formats.into_iter().map(NamedRow::from).collect())
    }

    async fn categories(&self) -> Result<Vec<NamedRow>, SyncError> {
        let body = self.read_file(CATEGORIES_FILE).await?;
        let dump: RawCategories = serde_json::from_slice(&body)?;
        Ok(dump.subcategories.into_iter().map(NamedRow::from).collect())
    }
}
