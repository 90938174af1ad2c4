//! Stored entity rows.
//!
//! Rows mirror the relational schema column for column. Raw crawler records are
//! projected into these shapes (see [`crate::raw`]) before they are compared
//! with what is stored, so creates and diffs always see the same defaults.

use serde::Serialize;

use crate::timestamp::Timestamp;

/// Category used when a raw event has no subcategory ("music other").
pub const DEFAULT_CATEGORY_ID: i64 = 3999;

/// Format used when a raw event has no format ("other").
pub const DEFAULT_FORMAT_ID: i64 = 100;

/// Capacity used when neither the event nor the venue reports one.
pub const DEFAULT_CAPACITY: i32 = 10_000;

/// Entity tables maintained by the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Event,
    Venue,
    Format,
    Category,
}

impl EntityKind {
    /// Name of the backing table.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Event => "events",
            EntityKind::Venue => "venues",
            EntityKind::Format => "formats",
            EntityKind::Category => "categories",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Event => "event",
            EntityKind::Venue => "venue",
            EntityKind::Format => "format",
            EntityKind::Category => "category",
        };
        f.write_str(name)
    }
}

/// Current state of one event.
///
/// `sold_out_date` holds [`crate::timestamp::never_sold_out`] while
/// `is_sold_out` is false. `last_info_date` is the pull time of the newest
/// snapshot whose data was written to this row.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct EventRow {
    pub id: i64,
    pub name: String,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub published_date: Timestamp,
    pub on_sale_date: Timestamp,
    pub venue_id: i64,
    pub category_id: i64,
    pub format_id: i64,
    pub inventory_type: Option<String>,
    pub is_free: bool,
    pub is_reserved_seating: bool,
    pub is_available: bool,
    pub has_wait_list: bool,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub capacity: i32,
    pub age_restriction: Option<String>,
    pub door_time: Option<String>,
    pub presented_by: Option<String>,
    pub is_online: bool,
    pub url: Option<String>,
    pub is_sold_out: bool,
    pub sold_out_date: Timestamp,
    pub last_info_date: Timestamp,
}

/// Current state of one venue. Venues carry no provenance time.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct VenueRow {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
    pub capacity: i32,
    pub age_restriction: Option<String>,
}

/// A format or category dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct NamedRow {
    pub id: i64,
    pub name: String,
}

impl NamedRow {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Row counts reported by `sellout stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseStats {
    pub events: i64,
    pub venues: i64,
    pub formats: i64,
    pub categories: i64,
    pub sold_out_events: i64,
    /// Newest `last_info_date` across all events.
    pub latest_info_date: Option<Timestamp>,
}
