//! Test utilities and in-memory implementations of the engine's traits.
//!
//! `MemoryEntityStore` keeps committed state behind a shared mutex and gives
//! every transaction a private working copy, so rollback and failed commits
//! leave the shared state untouched, like a database would.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use sellout_core::diff::{EventChange, VenueChange};
use sellout_core::traits::{
    DictionarySource, EntityStore, EntityTransaction, SnapshotRef, SnapshotSource, WatermarkStore,
};
use sellout_core::{EntityKind, EventRow, NamedRow, SyncError, Timestamp, VenueRow, timestamp};
use serde_json::{Value, json};

// =============================================================================
// Time helpers
// =============================================================================

/// 2019-06-`day` `hour`:`minute`:00
pub fn at(day: u32, hour: u32, minute: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(2019, 6, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// Crawler key for a page taken at `ts`.
pub fn key(ts: Timestamp, page: u32) -> String {
    use chrono::{Datelike, Timelike};
    format!(
        "raw/{}/{}/{}/{}_{}_{}_{}.json",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        page
    )
}

// =============================================================================
// Snapshot fixtures
// =============================================================================

/// A raw event as the ticketing API returns it, with an embedded venue.
pub fn event_json(id: i64, venue_id: i64, sold_out: bool) -> Value {
    json!({
        "id": id.to_string(),
        "name": {"text": format!("Event {}", id)},
        "start": {"local": "2019-07-01T20:00:00"},
        "end": {"local": "2019-07-01T23:00:00"},
        "published": "2019-05-01T12:00:00Z",
        "venue_id": venue_id.to_string(),
        "subcategory_id": "3008",
        "format_id": "6",
        "inventory_type": "limited",
        "is_free": false,
        "is_reserved_seating": false,
        "capacity": "300",
        "online_event": false,
        "url": format!("https://tickets.example/e/{}", id),
        "ticket_availability": {
            "has_available_tickets": !sold_out,
            "is_sold_out": sold_out,
            "start_sales_date": {"local": "2019-05-02T10:00:00"},
            "waitlist_available": false,
            "minimum_ticket_price": {"major_value": "20.00"},
            "maximum_ticket_price": {"major_value": "35.00"}
        },
        "music_properties": {"age_restriction": "18+"},
        "venue": {
            "name": format!("Venue {}", venue_id),
            "address": {"city": "Austin"},
            "capacity": 800
        }
    })
}

/// A crawler page stamped with `pull_time`.
pub fn page(pull_time: Timestamp, events: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "events": events,
        "pagination": {"page_number": 1, "has_more_items": false},
        "PullTime": timestamp::format_pull_time(pull_time),
    }))
    .unwrap()
}

// =============================================================================
// MemoryEntityStore
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub events: BTreeMap<i64, EventRow>,
    pub venues: BTreeMap<i64, VenueRow>,
    pub formats: BTreeMap<i64, String>,
    pub categories: BTreeMap<i64, String>,
}

impl MemoryState {
    fn named(&self, kind: EntityKind) -> &BTreeMap<i64, String> {
        match kind {
            EntityKind::Format => &self.formats,
            _ => &self.categories,
        }
    }

    fn named_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<i64, String> {
        match kind {
            EntityKind::Format => &mut self.formats,
            _ => &mut self.categories,
        }
    }
}

/// Operation at which the store should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertEvents,
    InsertVenues,
    UpdateEvent,
    Commit,
}

fn injected(point: FailPoint) -> SyncError {
    SyncError::DatabaseError(sqlx::Error::Protocol(format!("injected failure at {:?}", point)))
}

/// In-memory entity store with failure injection.
#[derive(Clone, Default)]
pub struct MemoryEntityStore {
    state: Arc<Mutex<MemoryState>>,
    fail: Arc<Mutex<Option<FailPoint>>>,
    commits: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later transaction fail at `point`.
    pub fn fail_on(&self, point: FailPoint) {
        *self.fail.lock().unwrap() = Some(point);
    }

    pub fn clear_failure(&self) {
        *self.fail.lock().unwrap() = None;
    }

    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().unwrap().clone()
    }

    pub fn event(&self, id: i64) -> Option<EventRow> {
        self.state.lock().unwrap().events.get(&id).cloned()
    }

    pub fn venue(&self, id: i64) -> Option<VenueRow> {
        self.state.lock().unwrap().venues.get(&id).cloned()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Row inserts and updates issued, committed or not.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl EntityStore for MemoryEntityStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, SyncError> {
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.state),
            working: self.state.lock().unwrap().clone(),
            fail: *self.fail.lock().unwrap(),
            commits: Arc::clone(&self.commits),
            writes: Arc::clone(&self.writes),
        })
    }
}

pub struct MemoryTransaction {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
    fail: Option<FailPoint>,
    commits: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryTransaction {
    fn check(&self, point: FailPoint) -> Result<(), SyncError> {
        if self.fail == Some(point) {
            return Err(injected(point));
        }
        Ok(())
    }

    fn wrote(&self, rows: usize) {
        self.writes.fetch_add(rows, Ordering::SeqCst);
    }
}

fn duplicate(kind: EntityKind, id: i64) -> SyncError {
    SyncError::DatabaseError(sqlx::Error::Protocol(format!(
        "duplicate key in {}: {}",
        kind.table(),
        id
    )))
}

impl EntityTransaction for MemoryTransaction {
    async fn existing_ids(&mut self, kind: EntityKind) -> Result<HashSet<i64>, SyncError> {
        Ok(match kind {
            EntityKind::Event => self.working.events.keys().copied().collect(),
            EntityKind::Venue => self.working.venues.keys().copied().collect(),
            EntityKind::Format | EntityKind::Category => {
                self.working.named(kind).keys().copied().collect()
            }
        })
    }

    async fn get_event(&mut self, id: i64) -> Result<Option<EventRow>, SyncError> {
        Ok(self.working.events.get(&id).cloned())
    }

    async fn get_venue(&mut self, id: i64) -> Result<Option<VenueRow>, SyncError> {
        Ok(self.working.venues.get(&id).cloned())
    }

    async fn get_named(
        &mut self,
        kind: EntityKind,
        id: i64,
    ) -> Result<Option<NamedRow>, SyncError> {
        Ok(self
            .working
            .named(kind)
            .get(&id)
            .map(|name| NamedRow::new(id, name.clone())))
    }

    async fn insert_events(&mut self, rows: &[EventRow]) -> Result<u64, SyncError> {
        self.check(FailPoint::InsertEvents)?;
        for row in rows {
            if self.working.events.insert(row.id, row.clone()).is_some() {
                return Err(duplicate(EntityKind::Event, row.id));
            }
        }
        self.wrote(rows.len());
        Ok(rows.len() as u64)
    }

    async fn insert_venues(&mut self, rows: &[VenueRow]) -> Result<u64, SyncError> {
        self.check(FailPoint::InsertVenues)?;
        for row in rows {
            if self.working.venues.insert(row.id, row.clone()).is_some() {
                return Err(duplicate(EntityKind::Venue, row.id));
            }
        }
        self.wrote(rows.len());
        Ok(rows.len() as u64)
    }

    async fn insert_named(
        &mut self,
        kind: EntityKind,
        rows: &[NamedRow],
    ) -> Result<u64, SyncError> {
        for row in rows {
            if self
                .working
                .named_mut(kind)
                .insert(row.id, row.name.clone())
                .is_some()
            {
                return Err(duplicate(kind, row.id));
            }
        }
        self.wrote(rows.len());
        Ok(rows.len() as u64)
    }

    async fn update_event(&mut self, id: i64, changes: &[EventChange]) -> Result<(), SyncError> {
        self.check(FailPoint::UpdateEvent)?;
        let row = self
            .working
            .events
            .get_mut(&id)
            .ok_or(SyncError::DatabaseError(sqlx::Error::RowNotFound))?;
        for change in changes {
            change.apply(row);
        }
        self.wrote(1);
        Ok(())
    }

    async fn update_venue(&mut self, id: i64, changes: &[VenueChange]) -> Result<(), SyncError> {
        let row = self
            .working
            .venues
            .get_mut(&id)
            .ok_or(SyncError::DatabaseError(sqlx::Error::RowNotFound))?;
        for change in changes {
            change.apply(row);
        }
        self.wrote(1);
        Ok(())
    }

    async fn update_named(
        &mut self,
        kind: EntityKind,
        id: i64,
        name: &str,
    ) -> Result<(), SyncError> {
        let entry = self
            .working
            .named_mut(kind)
            .get_mut(&id)
            .ok_or(SyncError::DatabaseError(sqlx::Error::RowNotFound))?;
        *entry = name.to_string();
        self.wrote(1);
        Ok(())
    }

    async fn commit(self) -> Result<(), SyncError> {
        self.check(FailPoint::Commit)?;
        *self.shared.lock().unwrap() = self.working;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), SyncError> {
        Ok(())
    }
}

// =============================================================================
// MemorySource
// =============================================================================

/// Snapshot source over an in-memory list, recording every read.
#[derive(Clone, Default)]
pub struct MemorySource {
    snapshots: Arc<Mutex<Vec<(SnapshotRef, Vec<u8>)>>>,
    reads: Arc<Mutex<Vec<String>>>,
    fail_read: Arc<Mutex<Option<String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a page whose key encodes `ts`.
    pub fn add_page(&self, ts: Timestamp, page_no: u32, body: Vec<u8>) -> SnapshotRef {
        let snapshot = SnapshotRef {
            location: key(ts, page_no),
            timestamp: ts,
            inferred: false,
        };
        self.add(snapshot, body)
    }

    pub fn add(&self, snapshot: SnapshotRef, body: Vec<u8>) -> SnapshotRef {
        self.snapshots
            .lock()
            .unwrap()
            .push((snapshot.clone(), body));
        snapshot
    }

    /// Swaps the body stored under `location`, as a crawler rewrite would.
    pub fn replace(&self, location: &str, body: Vec<u8>) {
        let mut snapshots = self.snapshots.lock().unwrap();
        for (snapshot, stored) in snapshots.iter_mut() {
            if snapshot.location == location {
                *stored = body.clone();
            }
        }
    }

    /// Makes reads of `location` fail.
    pub fn fail_read(&self, location: &str) {
        *self.fail_read.lock().unwrap() = Some(location.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_read.lock().unwrap() = None;
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

impl SnapshotSource for MemorySource {
    async fn list(&self, location: &str) -> Result<Vec<SnapshotRef>, SyncError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s.location.starts_with(location))
            .map(|(s, _)| s.clone())
            .collect())
    }

    async fn read(&self, snapshot: &SnapshotRef) -> Result<Vec<u8>, SyncError> {
        if self.fail_read.lock().unwrap().as_deref() == Some(snapshot.location.as_str()) {
            return Err(SyncError::Source(format!(
                "injected read failure for {}",
                snapshot.location
            )));
        }
        self.reads.lock().unwrap().push(snapshot.location.clone());
        self.snapshots
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| s.location == snapshot.location)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| SyncError::Source(format!("no such snapshot {}", snapshot.location)))
    }
}

// =============================================================================
// MemoryWatermark
// =============================================================================

#[derive(Clone, Default)]
pub struct MemoryWatermark {
    value: Arc<Mutex<Option<Timestamp>>>,
    history: Arc<Mutex<Vec<Timestamp>>>,
}

impl MemoryWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ts: Timestamp) -> Self {
        let watermark = Self::default();
        *watermark.value.lock().unwrap() = Some(ts);
        watermark
    }

    pub fn get(&self) -> Option<Timestamp> {
        *self.value.lock().unwrap()
    }

    /// Every value passed to `advance`, in order.
    pub fn history(&self) -> Vec<Timestamp> {
        self.history.lock().unwrap().clone()
    }
}

impl WatermarkStore for MemoryWatermark {
    async fn read(&self) -> Result<Timestamp, SyncError> {
        Ok(self.get().unwrap_or_else(timestamp::epoch))
    }

    async fn advance(&self, ts: Timestamp) -> Result<(), SyncError> {
        *self.value.lock().unwrap() = Some(ts);
        self.history.lock().unwrap().push(ts);
        Ok(())
    }
}

// =============================================================================
// MemoryDictionaries
// =============================================================================

#[derive(Clone, Default)]
pub struct MemoryDictionaries {
    pub formats: Vec<NamedRow>,
    pub categories: Vec<NamedRow>,
}

impl DictionarySource for MemoryDictionaries {
    async fn formats(&self) -> Result<Vec<NamedRow>, SyncError> {
        Ok(self.formats.clone())
    }

    async fn categories(&self) -> Result<Vec<NamedRow>, SyncError> {
        Ok(self.categories.clone())
    }
}
