//! File-backed watermark.
//!
//! The watermark is a single `YY-MM-DD-HH-MM-SS` line. Writes go to a sibling
//! temporary file that is renamed over the target, so readers see either the
//! old or the new value.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SyncError;
use crate::timestamp::{self, Timestamp};
use crate::traits::WatermarkStore;

/// Watermark persisted in one small file.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "watermark".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl WatermarkStore for FileWatermarkStore {
    async fn read(&self) -> Result<Timestamp, SyncError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No watermark yet, starting from epoch");
                return Ok(timestamp::epoch());
            }
            Err(e) => return Err(e.into()),
        };

        timestamp::parse_pull_time(&content).map_err(|e| SyncError::Watermark {
            path: self.path.display().to_string(),
            reason: format!("{:?}: {}", content.trim(), e),
        })
    }

    async fn advance(&self, ts: Timestamp) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, timestamp::format_pull_time(ts)).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(path = %self.path.display(), watermark = %ts, "Watermark advanced");
        Ok(())
    }
}
