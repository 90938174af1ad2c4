use thiserror::Error;

/// Errors produced while synchronizing snapshots into the entity store.
///
/// The variants follow the way a failure affects a run:
///
/// - source failures (`Source`, `Io`) stop the run and leave the watermark untouched;
/// - `MalformedSnapshot` skips one snapshot, which is reported in the run summary;
/// - `MalformedRecord` skips one raw event inside an otherwise valid snapshot;
/// - store failures (`DatabaseError`) roll back the open snapshot transaction and
///   stop the run.
///
/// Conversions from `sqlx::Error`, `serde_json::Error` and `std::io::Error` are
/// provided through `#[from]`.
///
/// # Examples
///
/// ```
/// use sellout_core::error::SyncError;
///
/// let err = SyncError::Source("bucket listing failed".to_string());
/// assert!(err.is_retryable());
/// ```
#[derive(Error, Debug)]
pub enum SyncError {
    /// Database operation failed.
    ///
    /// Wraps every SQLx failure: connection loss, query errors and constraint
    /// violations. The snapshot being applied is rolled back.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Listing or reading snapshot blobs failed.
    #[error("Snapshot source error: {0}")]
    Source(String),

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed outside of snapshot parsing.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A snapshot blob is empty or is not a crawler page.
    ///
    /// The snapshot is skipped and does not advance the watermark.
    #[error("Malformed snapshot {snapshot}: {reason}")]
    MalformedSnapshot { snapshot: String, reason: String },

    /// A single raw event could not be parsed or projected.
    #[error("Malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    /// The persisted watermark exists but cannot be read as a pull time.
    ///
    /// Never reset silently: the operator has to fix or remove the file.
    #[error("Invalid watermark in {path}: {reason}")]
    Watermark { path: String, reason: String },

    /// Configuration file error.
    ///
    /// Reading or parsing `sellout.toml` failed, or a required setting is missing.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SyncError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Check DATABASE_URL and try again.".to_string()
                } else {
                    format!(
                        "Database error: {}\n   The snapshot was rolled back; rerun to resume from the watermark.",
                        e
                    )
                }
            }
            SyncError::Source(msg) => {
                format!(
                    "Cannot read snapshots: {}\n   Check the snapshot directory and rerun.",
                    msg
                )
            }
            SyncError::Io(e) => format!("File access failed: {}", e),
            SyncError::MalformedSnapshot { snapshot, reason } => {
                format!("Skipped snapshot {}: {}", snapshot, reason)
            }
            SyncError::Watermark { path, reason } => {
                format!(
                    "Watermark file {} is invalid: {}\n   Expected a single YY-MM-DD-HH-MM-SS value.",
                    path, reason
                )
            }
            SyncError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your configuration file.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if rerunning the synchronizer may succeed.
    ///
    /// Source and store failures are transient: nothing from the failed snapshot
    /// was persisted and the watermark still points before it.
    ///
    /// # Examples
    ///
    /// ```
    /// use sellout_core::error::SyncError;
    ///
    /// let err = SyncError::ConfigError("snapshot_dir missing".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::DatabaseError(_) | SyncError::Source(_) | SyncError::Io(_)
        )
    }

    /// Returns true if the error only invalidates one snapshot.
    pub fn is_snapshot_local(&self) -> bool {
        matches!(self, SyncError::MalformedSnapshot { .. })
    }
}
