//! Incremental snapshot synchronization.
//!
//! # Architecture
//!
//! [`SyncService`] is generic over its three collaborators:
//! - [`EntityStore`] - the relational store of current entities
//! - [`SnapshotSource`] - listing and reading crawler pages
//! - [`WatermarkStore`] - the time of the newest applied snapshot
//!
//! # Run
//!
//! 1. Read the watermark and list every snapshot.
//! 2. Drop snapshots older than the watermark, stable-sort the rest by time.
//! 3. For each snapshot: parse, open a transaction, run the event pass then
//!    the venue pass, batch-insert new rows, commit, advance the watermark.
//!
//! A store or source failure rolls the open snapshot back and ends the run
//! with an error; the watermark still points before the failed snapshot, so
//! the next run resumes there. Unusable blobs are skipped and listed in the
//! [`SyncSummary`]. Later snapshots are still applied, but the watermark
//! stops at the first skipped one, so a rewritten blob is picked up next run.
//!
//! # Cancellation
//!
//! [`SyncService::run_cancellable`] checks its token between snapshots. A
//! cancelled run returns a summary with [`SyncStatus::Cancelled`].

use std::collections::HashMap;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::SyncConfig;
use crate::diff::{self, Decision};
use crate::error::SyncError;
use crate::models::{EntityKind, EventRow, NamedRow, VenueRow};
use crate::progress::{ProgressReporter, SilentReporter, SyncEvent};
use crate::raw::{self, RawEvent, RawSnapshot};
use crate::sync::{
    DictionaryStats, SkippedSnapshot, SnapshotOutcome, SyncOutcome, SyncStats, SyncStatus,
    SyncSummary,
};
use crate::timestamp::Timestamp;
use crate::traits::{
    DictionarySource, EntityStore, EntityTransaction, SnapshotRef, SnapshotSource, WatermarkStore,
};

/// Orders a listing for application.
///
/// Snapshots strictly older than `watermark` are dropped; snapshots at the
/// watermark are kept because pages of one crawl share a second. The sort is
/// stable, so ties keep listing order, and inferred timestamps go last.
pub fn plan_snapshots(listing: Vec<SnapshotRef>, watermark: Timestamp) -> Vec<SnapshotRef> {
    let mut plan: Vec<SnapshotRef> = listing
        .into_iter()
        .filter(|s| s.timestamp >= watermark)
        .collect();
    plan.sort_by_key(|s| (s.inferred, s.timestamp));
    plan
}

/// A raw event projected into row shape.
struct ProjectedRecord {
    event: EventRow,
    venue: Option<VenueRow>,
}

/// Applies crawler snapshots to the entity store.
pub struct SyncService<S, Src, W>
where
    S: EntityStore,
    Src: SnapshotSource,
    W: WatermarkStore,
{
    store: S,
    source: Src,
    watermark: W,
    config: SyncConfig,
}

impl<S, Src, W> SyncService<S, Src, W>
where
    S: EntityStore,
    Src: SnapshotSource,
    W: WatermarkStore,
{
    pub fn new(store: S, source: Src, watermark: W) -> Self {
        Self::with_config(store, source, watermark, SyncConfig::default())
    }

    pub fn with_config(store: S, source: Src, watermark: W, config: SyncConfig) -> Self {
        Self {
            store,
            source,
            watermark,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Applies every pending snapshot.
    pub async fn run(&self) -> Result<SyncSummary, SyncError> {
        self.run_with_progress(&SilentReporter).await
    }

    pub async fn run_with_progress<R: ProgressReporter>(
        &self,
        reporter: &R,
    ) -> Result<SyncSummary, SyncError> {
        self.run_cancellable(reporter, CancellationToken::new()).await
    }

    /// Applies pending snapshots until done or until `cancel` fires.
    pub async fn run_cancellable<R: ProgressReporter>(
        &self,
        reporter: &R,
        cancel: CancellationToken,
    ) -> Result<SyncSummary, SyncError> {
        let watermark = self.watermark.read().await?;
        let mut summary = SyncSummary::new(watermark);
        reporter.report(SyncEvent::Started { watermark });

        let listing = self.source.list(&self.config.location).await?;
        summary.listed = listing.len();

        let mut plan = plan_snapshots(listing, watermark);
        if let Some(limit) = self.config.max_snapshots {
            plan.truncate(limit);
        }
        summary.pending = plan.len();
        reporter.report(SyncEvent::SnapshotsPlanned {
            listed: summary.listed,
            pending: summary.pending,
        });

        // Time of the first skipped snapshot. The watermark never moves past
        // it, so the next run reads the blob again.
        let mut held_at: Option<Timestamp> = None;

        for snapshot in &plan {
            if cancel.is_cancelled() {
                summary.status = SyncStatus::Cancelled;
                reporter.report(SyncEvent::Cancelled {
                    remaining: summary.remaining(),
                });
                return Ok(summary);
            }

            let body = self.source.read(snapshot).await.inspect_err(|e| {
                error!(
                    snapshot = %snapshot.location,
                    time = %snapshot.timestamp,
                    error = %e,
                    "Failed to read snapshot"
                );
            })?;

            match self.apply_snapshot(snapshot, &body).await {
                Ok(outcome) => {
                    let target = match held_at {
                        Some(held) => snapshot.timestamp.min(held),
                        None => snapshot.timestamp,
                    };
                    if !snapshot.inferred && target > summary.watermark_after {
                        self.watermark.advance(target).await?;
                        summary.watermark_after = target;
                    }
                    summary.record_applied(&outcome);
                    reporter.report(SyncEvent::SnapshotApplied {
                        snapshot,
                        outcome: &outcome,
                        watermark: summary.watermark_after,
                    });
                }
                Err(SyncError::MalformedSnapshot { reason, .. }) => {
                    if !snapshot.inferred && held_at.is_none() {
                        warn!(
                            snapshot = %snapshot.location,
                            time = %snapshot.timestamp,
                            "Holding watermark at skipped snapshot"
                        );
                        held_at = Some(snapshot.timestamp);
                    }
                    reporter.report(SyncEvent::SnapshotSkipped {
                        snapshot,
                        reason: &reason,
                    });
                    summary.record_skipped(SkippedSnapshot {
                        location: snapshot.location.clone(),
                        timestamp: snapshot.timestamp,
                        reason,
                    });
                }
                Err(e) => {
                    error!(
                        snapshot = %snapshot.location,
                        time = %snapshot.timestamp,
                        error = %e,
                        "Snapshot rolled back, stopping run"
                    );
                    return Err(e);
                }
            }
        }

        reporter.report(SyncEvent::Completed { summary: &summary });
        Ok(summary)
    }

    /// Applies one snapshot body in a single transaction.
    ///
    /// Does not touch the watermark. Applying the same snapshot twice writes
    /// nothing the second time.
    pub async fn apply_snapshot(
        &self,
        snapshot: &SnapshotRef,
        body: &[u8],
    ) -> Result<SnapshotOutcome, SyncError> {
        let page = RawSnapshot::parse(&snapshot.location, body)?;
        let info_date = match page.pull_time() {
            Some(pull_time) => pull_time,
            None => {
                if page.pull_time.is_some() {
                    warn!(snapshot = %snapshot.location, "Unreadable PullTime, using listing time");
                }
                snapshot.timestamp
            }
        };

        let mut outcome = SnapshotOutcome::default();
        let records = project_records(snapshot, info_date, &page.events, &mut outcome);

        let mut tx = self.store.begin().await?;
        match apply_records(&mut tx, &records, info_date, &mut outcome).await {
            Ok(()) => {
                tx.commit().await?;
                debug!(
                    snapshot = %snapshot.location,
                    time = %info_date,
                    events = records.len(),
                    "Snapshot committed"
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(snapshot = %snapshot.location, error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Replaces the format and category dictionaries with the source's lists.
    ///
    /// Ignores the watermark.
    pub async fn refresh_dictionaries<D, R>(
        &self,
        dictionaries: &D,
        reporter: &R,
    ) -> Result<DictionaryStats, SyncError>
    where
        D: DictionarySource,
        R: ProgressReporter,
    {
        refresh_dictionaries(&self.store, dictionaries, reporter).await
    }
}

/// Replaces the format and category dictionaries in `store`.
///
/// Both dictionaries are written in one transaction. Entries missing from the
/// source are left alone.
pub async fn refresh_dictionaries<S, D, R>(
    store: &S,
    dictionaries: &D,
    reporter: &R,
) -> Result<DictionaryStats, SyncError>
where
    S: EntityStore,
    D: DictionarySource,
    R: ProgressReporter,
{
    let (formats, categories) =
        futures::try_join!(dictionaries.formats(), dictionaries.categories())?;

    let mut tx = store.begin().await?;
    let mut stats = DictionaryStats::default();
    let result = async {
        stats.formats = apply_named(&mut tx, EntityKind::Format, &formats).await?;
        stats.categories = apply_named(&mut tx, EntityKind::Category, &categories).await?;
        Ok::<(), SyncError>(())
    }
    .await;

    match result {
        Ok(()) => {
            tx.commit().await?;
            reporter.report(SyncEvent::DictionariesRefreshed { stats: &stats });
            Ok(stats)
        }
        Err(e) => {
            error!(error = %e, "Dictionary refresh rolled back");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Parses and projects the page's events. Broken records are logged, counted
/// as failed and left out.
fn project_records(
    snapshot: &SnapshotRef,
    info_date: Timestamp,
    events: &[serde_json::Value],
    outcome: &mut SnapshotOutcome,
) -> Vec<ProjectedRecord> {
    let mut records = Vec::with_capacity(events.len());

    for value in events {
        let projected = RawEvent::deserialize(value)
            .map_err(|e| SyncError::MalformedRecord {
                id: raw::record_id(value),
                reason: e.to_string(),
            })
            .and_then(|raw_event| {
                let event = raw_event.project(info_date)?;
                Ok((raw_event, event))
            });

        let (raw_event, event) = match projected {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    snapshot = %snapshot.location,
                    time = %info_date,
                    event_id = %raw::record_id(value),
                    error = %e,
                    "Skipping malformed event"
                );
                outcome.events.record(SyncOutcome::Failed);
                continue;
            }
        };

        let venue = match raw_event.project_venue() {
            Ok(venue) => venue,
            Err(e) => {
                warn!(
                    snapshot = %snapshot.location,
                    time = %info_date,
                    venue_id = raw_event.venue_id,
                    error = %e,
                    "Skipping malformed venue"
                );
                outcome.venues.record(SyncOutcome::Failed);
                None
            }
        };

        records.push(ProjectedRecord { event, venue });
    }

    records
}

/// Event pass then venue pass, inside an open transaction.
async fn apply_records<T: EntityTransaction>(
    tx: &mut T,
    records: &[ProjectedRecord],
    info_date: Timestamp,
    outcome: &mut SnapshotOutcome,
) -> Result<(), SyncError> {
    outcome
        .events
        .merge(&apply_events(tx, records, info_date).await?);
    outcome.venues.merge(&apply_venues(tx, records).await?);
    Ok(())
}

async fn apply_events<T: EntityTransaction>(
    tx: &mut T,
    records: &[ProjectedRecord],
    info_date: Timestamp,
) -> Result<SyncStats, SyncError> {
    let existing = tx.existing_ids(EntityKind::Event).await?;
    let mut stats = SyncStats::new();
    let mut pending: Vec<EventRow> = Vec::new();
    let mut pending_index: HashMap<i64, usize> = HashMap::new();

    for record in records {
        let projected = &record.event;

        // Repeated new id: fold into the row that will be inserted.
        if let Some(&idx) = pending_index.get(&projected.id) {
            let merged = &mut pending[idx];
            if let Decision::Update(changes) =
                diff::decide_event(projected, Some(&*merged), info_date)
            {
                for change in &changes {
                    change.apply(merged);
                }
            }
            // Still one created row; repeats are not updates.
            stats.record(SyncOutcome::Unchanged);
            continue;
        }

        let stored = if existing.contains(&projected.id) {
            tx.get_event(projected.id).await?
        } else {
            None
        };

        match diff::decide_event(projected, stored.as_ref(), info_date) {
            Decision::Create => {
                pending_index.insert(projected.id, pending.len());
                pending.push(projected.clone());
                stats.record(SyncOutcome::Created);
            }
            Decision::Update(changes) => {
                debug!(
                    event_id = projected.id,
                    columns = ?changes.iter().map(|c| c.column()).collect::<Vec<_>>(),
                    "Updating event"
                );
                tx.update_event(projected.id, &changes).await?;
                stats.record(SyncOutcome::Updated);
            }
            Decision::Noop => stats.record(SyncOutcome::Unchanged),
        }
    }

    if !pending.is_empty() {
        tx.insert_events(&pending).await?;
    }
    Ok(stats)
}

async fn apply_venues<T: EntityTransaction>(
    tx: &mut T,
    records: &[ProjectedRecord],
) -> Result<SyncStats, SyncError> {
    let existing = tx.existing_ids(EntityKind::Venue).await?;
    let mut stats = SyncStats::new();
    let mut pending: Vec<VenueRow> = Vec::new();
    let mut pending_index: HashMap<i64, usize> = HashMap::new();

    for projected in records.iter().filter_map(|r| r.venue.as_ref()) {
        if let Some(&idx) = pending_index.get(&projected.id) {
            let merged = &mut pending[idx];
            if let Decision::Update(changes) = diff::decide_venue(projected, Some(&*merged)) {
                for change in &changes {
                    change.apply(merged);
                }
            }
            stats.record(SyncOutcome::Unchanged);
            continue;
        }

        let stored = if existing.contains(&projected.id) {
            tx.get_venue(projected.id).await?
        } else {
            None
        };

        match diff::decide_venue(projected, stored.as_ref()) {
            Decision::Create => {
                pending_index.insert(projected.id, pending.len());
                pending.push(projected.clone());
                stats.record(SyncOutcome::Created);
            }
            Decision::Update(changes) => {
                debug!(venue_id = projected.id, changes = changes.len(), "Updating venue");
                tx.update_venue(projected.id, &changes).await?;
                stats.record(SyncOutcome::Updated);
            }
            Decision::Noop => stats.record(SyncOutcome::Unchanged),
        }
    }

    if !pending.is_empty() {
        tx.insert_venues(&pending).await?;
    }
    Ok(stats)
}

async fn apply_named<T: EntityTransaction>(
    tx: &mut T,
    kind: EntityKind,
    rows: &[NamedRow],
) -> Result<SyncStats, SyncError> {
    let existing = tx.existing_ids(kind).await?;
    let mut stats = SyncStats::new();
    let mut pending: Vec<NamedRow> = Vec::new();
    let mut pending_index: HashMap<i64, usize> = HashMap::new();

    for row in rows {
        if let Some(&idx) = pending_index.get(&row.id) {
            // Last entry of a duplicated id wins.
            pending[idx].name = row.name.clone();
            stats.record(SyncOutcome::Unchanged);
            continue;
        }

        let stored = if existing.contains(&row.id) {
            tx.get_named(kind, row.id).await?
        } else {
            None
        };

        match diff::decide_named(row, stored.as_ref()) {
            Decision::Create => {
                pending_index.insert(row.id, pending.len());
                pending.push(row.clone());
                stats.record(SyncOutcome::Created);
            }
            Decision::Update(names) => {
                for name in &names {
                    tx.update_named(kind, row.id, name).await?;
                }
                stats.record(SyncOutcome::Updated);
            }
            Decision::Noop => stats.record(SyncOutcome::Unchanged),
        }
    }

    if !pending.is_empty() {
        tx.insert_named(kind, &pending).await?;
    }
    debug!(%kind, created = stats.created, updated = stats.updated, "Dictionary applied");
    Ok(stats)
}
