//! Outcome bookkeeping for synchronization runs.
//!
//! Pure counters and summaries, decoupled from I/O, so the CLI can report a
//! run and tests can assert on it.

use serde::Serialize;

use crate::timestamp::Timestamp;

/// Outcome of processing a single record during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Stored row already matches the record
    Unchanged,
    /// Some columns of the stored row were written
    Updated,
    /// New id - row inserted
    Created,
    /// Record could not be parsed and was skipped
    Failed,
}

/// Per-entity counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub unchanged: usize,
    pub updated: usize,
    pub created: usize,
    pub failed: usize,
}

impl SyncStats {
    /// Creates a new empty stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Unchanged => self.unchanged += 1,
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::Created => self.created += 1,
            SyncOutcome::Failed => self.failed += 1,
        }
    }

    /// Adds another tracker's counters to this one.
    pub fn merge(&mut self, other: &SyncStats) {
        self.unchanged += other.unchanged;
        self.updated += other.updated;
        self.created += other.created;
        self.failed += other.failed;
    }

    /// Returns the total number of processed records.
    pub fn total(&self) -> usize {
        self.unchanged + self.updated + self.created + self.failed
    }

    /// Returns the number of successfully processed records.
    pub fn successful(&self) -> usize {
        self.unchanged + self.updated + self.created
    }

    /// Returns the number of records that wrote something.
    pub fn changed(&self) -> usize {
        self.updated + self.created
    }
}

/// Counters for one applied snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotOutcome {
    pub events: SyncStats,
    pub venues: SyncStats,
}

impl SnapshotOutcome {
    /// True when the snapshot wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.events.changed() == 0 && self.venues.changed() == 0
    }
}

/// A snapshot left out of a run because its blob was unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSnapshot {
    pub location: String,
    pub timestamp: Timestamp,
    pub reason: String,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    /// Every pending snapshot was applied or skipped.
    Completed,
    /// The run stopped early on request; the watermark reflects exactly the
    /// committed snapshots.
    Cancelled,
}

impl SyncStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncStatus::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncStatus::Cancelled)
    }
}

/// Summary of one synchronization run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub status: SyncStatus,
    /// Snapshots returned by the listing.
    pub listed: usize,
    /// Snapshots at or after the starting watermark.
    pub pending: usize,
    /// Snapshots committed during the run.
    pub applied: usize,
    pub skipped: Vec<SkippedSnapshot>,
    pub events: SyncStats,
    pub venues: SyncStats,
    pub watermark_before: Timestamp,
    pub watermark_after: Timestamp,
}

impl SyncSummary {
    pub fn new(watermark: Timestamp) -> Self {
        Self {
            status: SyncStatus::Completed,
            listed: 0,
            pending: 0,
            applied: 0,
            skipped: Vec::new(),
            events: SyncStats::new(),
            venues: SyncStats::new(),
            watermark_before: watermark,
            watermark_after: watermark,
        }
    }

    /// Adds the counters of a committed snapshot.
    pub fn record_applied(&mut self, outcome: &SnapshotOutcome) {
        self.applied += 1;
        self.events.merge(&outcome.events);
        self.venues.merge(&outcome.venues);
    }

    pub fn record_skipped(&mut self, skipped: SkippedSnapshot) {
        self.skipped.push(skipped);
    }

    /// Snapshots not reached because the run was cancelled.
    pub fn remaining(&self) -> usize {
        self.pending
            .saturating_sub(self.applied + self.skipped.len())
    }
}

/// Result of a format/category dictionary refresh.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DictionaryStats {
    pub formats: SyncStats,
    pub categories: SyncStats,
}
