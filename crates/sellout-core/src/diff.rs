//! Field-level differencing between projected records and stored rows.
//!
//! Comparisons are made on typed values, never on the raw JSON, so `"15"` and
//! `15.0` are the same price and two spellings of one date are the same date.
//! The availability group and `last_info_date` are excluded from
//! [`diff_event`]; [`decide_event`] combines it with [`crate::sold_out`].

use crate::models::{EventRow, NamedRow, VenueRow};
use crate::sold_out;
use crate::timestamp::Timestamp;

/// A single column update on an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventChange {
    Name(String),
    StartDate(Timestamp),
    EndDate(Timestamp),
    PublishedDate(Timestamp),
    OnSaleDate(Timestamp),
    VenueId(i64),
    CategoryId(i64),
    FormatId(i64),
    InventoryType(Option<String>),
    IsFree(bool),
    IsReservedSeating(bool),
    IsAvailable(bool),
    HasWaitList(bool),
    MinPrice(Option<f64>),
    MaxPrice(Option<f64>),
    Capacity(i32),
    AgeRestriction(Option<String>),
    DoorTime(Option<String>),
    PresentedBy(Option<String>),
    IsOnline(bool),
    Url(Option<String>),
    IsSoldOut(bool),
    SoldOutDate(Timestamp),
    LastInfoDate(Timestamp),
}

impl EventChange {
    /// Column written by this change.
    pub fn column(&self) -> &'static str {
        match self {
            EventChange::Name(_) => "name",
            EventChange::StartDate(_) => "start_date",
            EventChange::EndDate(_) => "end_date",
            EventChange::PublishedDate(_) => "published_date",
            EventChange::OnSaleDate(_) => "on_sale_date",
            EventChange::VenueId(_) => "venue_id",
            EventChange::CategoryId(_) => "category_id",
            EventChange::FormatId(_) => "format_id",
            EventChange::InventoryType(_) => "inventory_type",
            EventChange::IsFree(_) => "is_free",
            EventChange::IsReservedSeating(_) => "is_reserved_seating",
            EventChange::IsAvailable(_) => "is_available",
            EventChange::HasWaitList(_) => "has_wait_list",
            EventChange::MinPrice(_) => "min_price",
            EventChange::MaxPrice(_) => "max_price",
            EventChange::Capacity(_) => "capacity",
            EventChange::AgeRestriction(_) => "age_restriction",
            EventChange::DoorTime(_) => "door_time",
            EventChange::PresentedBy(_) => "presented_by",
            EventChange::IsOnline(_) => "is_online",
            EventChange::Url(_) => "url",
            EventChange::IsSoldOut(_) => "is_sold_out",
            EventChange::SoldOutDate(_) => "sold_out_date",
            EventChange::LastInfoDate(_) => "last_info_date",
        }
    }

    /// Writes the change into an in-memory row.
    pub fn apply(&self, row: &mut EventRow) {
        match self {
            EventChange::Name(v) => row.name = v.clone(),
            EventChange::StartDate(v) => row.start_date = *v,
            EventChange::EndDate(v) => row.end_date = *v,
            EventChange::PublishedDate(v) => row.published_date = *v,
            EventChange::OnSaleDate(v) => row.on_sale_date = *v,
            EventChange::VenueId(v) => row.venue_id = *v,
            EventChange::CategoryId(v) => row.category_id = *v,
            EventChange::FormatId(v) => row.format_id = *v,
            EventChange::InventoryType(v) => row.inventory_type = v.clone(),
            EventChange::IsFree(v) => row.is_free = *v,
            EventChange::IsReservedSeating(v) => row.is_reserved_seating = *v,
            EventChange::IsAvailable(v) => row.is_available = *v,
            EventChange::HasWaitList(v) => row.has_wait_list = *v,
            EventChange::MinPrice(v) => row.min_price = *v,
            EventChange::MaxPrice(v) => row.max_price = *v,
            EventChange::Capacity(v) => row.capacity = *v,
            EventChange::AgeRestriction(v) => row.age_restriction = v.clone(),
            EventChange::DoorTime(v) => row.door_time = v.clone(),
            EventChange::PresentedBy(v) => row.presented_by = v.clone(),
            EventChange::IsOnline(v) => row.is_online = *v,
            EventChange::Url(v) => row.url = v.clone(),
            EventChange::IsSoldOut(v) => row.is_sold_out = *v,
            EventChange::SoldOutDate(v) => row.sold_out_date = *v,
            EventChange::LastInfoDate(v) => row.last_info_date = *v,
        }
    }
}

/// A single column update on a venue.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueChange {
    Name(String),
    City(Option<String>),
    Capacity(i32),
    AgeRestriction(Option<String>),
}

impl VenueChange {
    pub fn column(&self) -> &'static str {
        match self {
            VenueChange::Name(_) => "name",
            VenueChange::City(_) => "city",
            VenueChange::Capacity(_) => "capacity",
            VenueChange::AgeRestriction(_) => "age_restriction",
        }
    }

    pub fn apply(&self, row: &mut VenueRow) {
        match self {
            VenueChange::Name(v) => row.name = v.clone(),
            VenueChange::City(v) => row.city = v.clone(),
            VenueChange::Capacity(v) => row.capacity = *v,
            VenueChange::AgeRestriction(v) => row.age_restriction = v.clone(),
        }
    }
}

/// What to do with one incoming record.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<C> {
    /// The id is unknown: insert the projected row.
    Create,
    /// Write these columns.
    Update(Vec<C>),
    /// Nothing changed.
    Noop,
}

impl<C> Decision<C> {
    fn from_changes(changes: Vec<C>) -> Self {
        if changes.is_empty() {
            Decision::Noop
        } else {
            Decision::Update(changes)
        }
    }
}

macro_rules! push_if_changed {
    ($changes:ident, $projected:ident, $stored:ident, $field:ident, $variant:path) => {
        if $projected.$field != $stored.$field {
            $changes.push($variant($projected.$field.clone()));
        }
    };
}

/// Changed event fields, excluding the availability group and `last_info_date`.
pub fn diff_event(projected: &EventRow, stored: &EventRow) -> Vec<EventChange> {
    let mut changes = Vec::new();
    push_if_changed!(changes, projected, stored, name, EventChange::Name);
    push_if_changed!(changes, projected, stored, start_date, EventChange::StartDate);
    push_if_changed!(changes, projected, stored, end_date, EventChange::EndDate);
    push_if_changed!(changes, projected, stored, published_date, EventChange::PublishedDate);
    push_if_changed!(changes, projected, stored, on_sale_date, EventChange::OnSaleDate);
    push_if_changed!(changes, projected, stored, venue_id, EventChange::VenueId);
    push_if_changed!(changes, projected, stored, category_id, EventChange::CategoryId);
    push_if_changed!(changes, projected, stored, format_id, EventChange::FormatId);
    push_if_changed!(changes, projected, stored, inventory_type, EventChange::InventoryType);
    push_if_changed!(changes, projected, stored, is_free, EventChange::IsFree);
    push_if_changed!(
        changes,
        projected,
        stored,
        is_reserved_seating,
        EventChange::IsReservedSeating
    );
    push_if_changed!(changes, projected, stored, is_available, EventChange::IsAvailable);
    push_if_changed!(changes, projected, stored, has_wait_list, EventChange::HasWaitList);
    push_if_changed!(changes, projected, stored, min_price, EventChange::MinPrice);
    push_if_changed!(changes, projected, stored, max_price, EventChange::MaxPrice);
    push_if_changed!(changes, projected, stored, capacity, EventChange::Capacity);
    push_if_changed!(changes, projected, stored, age_restriction, EventChange::AgeRestriction);
    push_if_changed!(changes, projected, stored, door_time, EventChange::DoorTime);
    push_if_changed!(changes, projected, stored, presented_by, EventChange::PresentedBy);
    push_if_changed!(changes, projected, stored, is_online, EventChange::IsOnline);
    push_if_changed!(changes, projected, stored, url, EventChange::Url);
    changes
}

/// Changed venue fields. Venues are last-write-wins.
pub fn diff_venue(projected: &VenueRow, stored: &VenueRow) -> Vec<VenueChange> {
    let mut changes = Vec::new();
    push_if_changed!(changes, projected, stored, name, VenueChange::Name);
    push_if_changed!(changes, projected, stored, city, VenueChange::City);
    push_if_changed!(changes, projected, stored, capacity, VenueChange::Capacity);
    push_if_changed!(changes, projected, stored, age_restriction, VenueChange::AgeRestriction);
    changes
}

/// The new name of a dictionary entry, if it changed.
pub fn diff_named(projected: &NamedRow, stored: &NamedRow) -> Option<String> {
    (projected.name != stored.name).then(|| projected.name.clone())
}

/// Decides how a projected event observed at `info_date` is written.
///
/// Snapshots older than the row's `last_info_date` contribute at most an
/// earlier `sold_out_date`. Otherwise every changed field is written and
/// `last_info_date` moves to `info_date`; an unchanged record stays untouched.
pub fn decide_event(
    projected: &EventRow,
    stored: Option<&EventRow>,
    info_date: Timestamp,
) -> Decision<EventChange> {
    let Some(stored) = stored else {
        return Decision::Create;
    };

    let transition = sold_out::resolve(stored, projected.is_sold_out, info_date);
    let is_current = info_date >= stored.last_info_date;

    let mut changes = if is_current {
        diff_event(projected, stored)
    } else {
        Vec::new()
    };
    changes.extend(transition.changes());

    if is_current && !changes.is_empty() && info_date != stored.last_info_date {
        changes.push(EventChange::LastInfoDate(info_date));
    }
    Decision::from_changes(changes)
}

/// Decides how a projected venue is written.
pub fn decide_venue(projected: &VenueRow, stored: Option<&VenueRow>) -> Decision<VenueChange> {
    match stored {
        None => Decision::Create,
        Some(stored) => Decision::from_changes(diff_venue(projected, stored)),
    }
}

/// Decides how a dictionary entry is written.
pub fn decide_named(projected: &NamedRow, stored: Option<&NamedRow>) -> Decision<String> {
    match stored {
        None => Decision::Create,
        Some(stored) => Decision::from_changes(diff_named(projected, stored).into_iter().collect()),
    }
}
