//! Progress reporting for synchronization runs.
//!
//! The engine emits [`SyncEvent`]s; callers decide what to do with them. The
//! CLI logs them with [`TracingReporter`], tests and library users that do not
//! care pass [`SilentReporter`].

use tracing::{info, warn};

use crate::sync::{DictionaryStats, SnapshotOutcome, SyncSummary};
use crate::timestamp::Timestamp;
use crate::traits::SnapshotRef;

// =============================================================================
// Sync Events
// =============================================================================

/// Events emitted by the sync engine during a run.
#[derive(Debug, Clone)]
pub enum SyncEvent<'a> {
    /// Run started from this watermark.
    Started { watermark: Timestamp },
    /// Listing filtered against the watermark.
    SnapshotsPlanned { listed: usize, pending: usize },
    /// A snapshot was committed.
    SnapshotApplied {
        snapshot: &'a SnapshotRef,
        outcome: &'a SnapshotOutcome,
        watermark: Timestamp,
    },
    /// A snapshot blob was unusable and left out.
    SnapshotSkipped {
        snapshot: &'a SnapshotRef,
        reason: &'a str,
    },
    /// Run stopped on request before these many snapshots.
    Cancelled { remaining: usize },
    /// Run finished.
    Completed { summary: &'a SyncSummary },
    /// Format and category dictionaries were refreshed.
    DictionariesRefreshed { stats: &'a DictionaryStats },
}

// =============================================================================
// Progress Reporter Trait
// =============================================================================

/// Trait for reporting sync progress.
pub trait ProgressReporter: Send + Sync {
    /// Called when a sync event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: SyncEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Reporter that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: SyncEvent<'_>) {
        match event {
            SyncEvent::Started { watermark } => {
                info!(%watermark, "Sync started");
            }
            SyncEvent::SnapshotsPlanned { listed, pending } => {
                info!(listed, pending, "Snapshots planned");
            }
            SyncEvent::SnapshotApplied {
                snapshot,
                outcome,
                watermark,
            } => {
                info!(
                    snapshot = %snapshot.location,
                    events_created = outcome.events.created,
                    events_updated = outcome.events.updated,
                    venues_created = outcome.venues.created,
                    venues_updated = outcome.venues.updated,
                    %watermark,
                    "Snapshot applied"
                );
            }
            SyncEvent::SnapshotSkipped { snapshot, reason } => {
                warn!(
                    snapshot = %snapshot.location,
                    time = %snapshot.timestamp,
                    reason,
                    "Snapshot skipped"
                );
            }
            SyncEvent::Cancelled { remaining } => {
                info!(remaining, "Sync cancelled");
            }
            SyncEvent::Completed { summary } => {
                info!(
                    applied = summary.applied,
                    skipped = summary.skipped.len(),
                    watermark = %summary.watermark_after,
                    "Sync completed"
                );
            }
            SyncEvent::DictionariesRefreshed { stats } => {
                info!(
                    formats_created = stats.formats.created,
                    formats_updated = stats.formats.updated,
                    categories_created = stats.categories.created,
                    categories_updated = stats.categories.updated,
                    "Dictionaries refreshed"
                );
            }
        }
    }
}
