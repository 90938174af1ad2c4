//! Trait definitions for the engine's collaborators.
//!
//! The sync engine never touches a filesystem, a bucket or a database
//! directly. It works against these traits, so the PostgreSQL repository, the
//! directory-backed snapshot source and the file watermark can be swapped for
//! in-memory versions in tests.
//!
//! # Example
//!
//! ```
//! use sellout_core::error::SyncError;
//! use sellout_core::models::EntityKind;
//! use sellout_core::traits::{EntityStore, EntityTransaction};
//!
//! async fn count_events<S: EntityStore>(store: &S) -> Result<usize, SyncError> {
//!     let mut tx = store.begin().await?;
//!     let ids = tx.existing_ids(EntityKind::Event).await?;
//!     tx.rollback().await?;
//!     Ok(ids.len())
//! }
//! ```

use std::collections::HashSet;
use std::future::Future;

use crate::diff::{EventChange, VenueChange};
use crate::error::SyncError;
use crate::models::{EntityKind, EventRow, NamedRow, VenueRow};
use crate::timestamp::Timestamp;

/// Reference to one snapshot blob as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    /// Path or object key of the blob.
    pub location: String,
    /// Crawl time derived from the location.
    pub timestamp: Timestamp,
    /// True when the location carried no usable time and `timestamp` is the
    /// listing time instead. Inferred snapshots never advance the watermark.
    pub inferred: bool,
}

/// Storage holding the crawler's snapshot blobs.
pub trait SnapshotSource: Send + Sync {
    /// Lists every snapshot under `location`, in enumeration order.
    ///
    /// Ordering and watermark filtering are the engine's job.
    fn list(
        &self,
        location: &str,
    ) -> impl Future<Output = Result<Vec<SnapshotRef>, SyncError>> + Send;

    /// Reads the body of one snapshot.
    fn read(
        &self,
        snapshot: &SnapshotRef,
    ) -> impl Future<Output = Result<Vec<u8>, SyncError>> + Send;
}

/// Durable record of the newest applied snapshot time.
pub trait WatermarkStore: Send + Sync {
    /// Returns the persisted watermark, or [`crate::timestamp::epoch`] when none exists.
    fn read(&self) -> impl Future<Output = Result<Timestamp, SyncError>> + Send;

    /// Persists `ts` unconditionally. Callers only move it forward, and only
    /// after the snapshot transaction committed.
    fn advance(&self, ts: Timestamp) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// Authoritative full lists of formats and categories.
pub trait DictionarySource: Send + Sync {
    fn formats(&self) -> impl Future<Output = Result<Vec<NamedRow>, SyncError>> + Send;

    fn categories(&self) -> impl Future<Output = Result<Vec<NamedRow>, SyncError>> + Send;
}

/// Relational store for current entities.
pub trait EntityStore: Send + Sync + Clone {
    type Transaction: EntityTransaction;

    /// Opens a transaction. Every snapshot is applied inside exactly one.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, SyncError>> + Send;
}

/// An open unit of work on the entity store.
///
/// Dropping a transaction without calling [`EntityTransaction::commit`]
/// discards its writes.
pub trait EntityTransaction: Send {
    /// All ids currently stored for `kind`.
    fn existing_ids(
        &mut self,
        kind: EntityKind,
    ) -> impl Future<Output = Result<HashSet<i64>, SyncError>> + Send;

    fn get_event(
        &mut self,
        id: i64,
    ) -> impl Future<Output = Result<Option<EventRow>, SyncError>> + Send;

    fn get_venue(
        &mut self,
        id: i64,
    ) -> impl Future<Output = Result<Option<VenueRow>, SyncError>> + Send;

    /// Looks up a format or category.
    fn get_named(
        &mut self,
        kind: EntityKind,
        id: i64,
    ) -> impl Future<Output = Result<Option<NamedRow>, SyncError>> + Send;

    /// Inserts new events in one batch. Returns the number of rows written.
    fn insert_events(
        &mut self,
        rows: &[EventRow],
    ) -> impl Future<Output = Result<u64, SyncError>> + Send;

    fn insert_venues(
        &mut self,
        rows: &[VenueRow],
    ) -> impl Future<Output = Result<u64, SyncError>> + Send;

    fn insert_named(
        &mut self,
        kind: EntityKind,
        rows: &[NamedRow],
    ) -> impl Future<Output = Result<u64, SyncError>> + Send;

    /// Writes the given columns of one event.
    fn update_event(
        &mut self,
        id: i64,
        changes: &[EventChange],
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn update_venue(
        &mut self,
        id: i64,
        changes: &[VenueChange],
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn update_named(
        &mut self,
        kind: EntityKind,
        id: i64,
        name: &str,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), SyncError>> + Send;
}
