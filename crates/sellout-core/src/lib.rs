//! Sellout Core - Domain types, diffing rules, and the sync engine.
//!
//! This crate turns the crawler's time-stamped snapshot pages into a
//! deduplicated, current view of events, venues, formats and categories:
//!
//! - **Domain models**: [`EventRow`], [`VenueRow`], [`NamedRow`]
//! - **Business logic**: field-level diffing ([`diff`]), the sold-out state
//!   machine ([`sold_out`]), run statistics ([`sync`])
//! - **Services**: [`SyncService`] for incremental snapshot application
//! - **Traits**: [`EntityStore`], [`SnapshotSource`], [`WatermarkStore`],
//!   [`DictionarySource`] for dependency injection
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging
//!
//! # Example
//!
//! ```ignore
//! use sellout_core::{DirectorySource, FileWatermarkStore, SyncService, TracingReporter};
//!
//! let service = SyncService::new(
//!     store,
//!     DirectorySource::new("/srv/crawler"),
//!     FileWatermarkStore::new("/srv/crawler/watermark"),
//! );
//! let summary = service.run_with_progress(&TracingReporter).await?;
//! println!("applied {} snapshots", summary.applied);
//! ```

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod models;
pub mod progress;
pub mod raw;
pub mod sold_out;
pub mod source;
pub mod sync;
pub mod timestamp;
pub mod traits;
pub mod watermark;

// Configuration
pub use config::{
    DbConfig, SourceConfig, SyncConfig, default_config_path, load_source_config,
};

// Error handling
pub use error::SyncError;

// Domain models
pub use models::{DatabaseStats, EntityKind, EventRow, NamedRow, VenueRow};
pub use timestamp::Timestamp;

// Diffing and availability
pub use diff::{Decision, EventChange, VenueChange};
pub use sold_out::{AvailabilityState, Transition};

// Sync types
pub use sync::{
    DictionaryStats, SkippedSnapshot, SnapshotOutcome, SyncOutcome, SyncStats, SyncStatus,
    SyncSummary,
};

// Progress reporting
pub use progress::{ProgressReporter, SilentReporter, SyncEvent, TracingReporter};

// Traits for dependency injection
pub use traits::{
    DictionarySource, EntityStore, EntityTransaction, SnapshotRef, SnapshotSource, WatermarkStore,
};

// Collaborators backed by the local filesystem
pub use source::{DirectoryDictionarySource, DirectorySource};
pub use watermark::FileWatermarkStore;

// Services
pub use engine::{SyncService, plan_snapshots, refresh_dictionaries};
