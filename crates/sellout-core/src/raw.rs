//! Crawler page format and projection of raw records into rows.
//!
//! A snapshot blob is one page of the ticketing API's event search, saved as
//! returned and stamped with the crawl time:
//!
//! ```json
//! {"events": [...], "pagination": {...}, "PullTime": "19-04-01-10-00-00"}
//! ```
//!
//! Events are kept as untyped JSON values at page level so one broken record
//! does not invalidate its page.

use serde::{Deserialize, Deserializer, de};

use crate::error::SyncError;
use crate::models::{
    DEFAULT_CAPACITY, DEFAULT_CATEGORY_ID, DEFAULT_FORMAT_ID, EventRow, NamedRow, VenueRow,
};
use crate::timestamp::{self, Timestamp};

/// One crawler page.
#[derive(Debug, Deserialize)]
pub struct RawSnapshot {
    pub events: Vec<serde_json::Value>,
    #[serde(rename = "PullTime", default)]
    pub pull_time: Option<String>,
}

impl RawSnapshot {
    /// Parses a snapshot blob. Empty and non-page blobs are reported as
    /// [`SyncError::MalformedSnapshot`].
    pub fn parse(location: &str, body: &[u8]) -> Result<Self, SyncError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(SyncError::MalformedSnapshot {
                snapshot: location.to_string(),
                reason: "empty blob".to_string(),
            });
        }
        serde_json::from_slice(body).map_err(|e| SyncError::MalformedSnapshot {
            snapshot: location.to_string(),
            reason: e.to_string(),
        })
    }

    /// The embedded pull time, if present and well formed.
    pub fn pull_time(&self) -> Option<Timestamp> {
        self.pull_time
            .as_deref()
            .and_then(|value| timestamp::parse_pull_time(value).ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawText {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLocalTime {
    pub local: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPrice {
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub major_value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTicketAvailability {
    #[serde(default)]
    pub has_available_tickets: bool,
    pub is_sold_out: bool,
    #[serde(default)]
    pub start_sales_date: Option<RawLocalTime>,
    #[serde(default)]
    pub waitlist_available: bool,
    #[serde(default)]
    pub minimum_ticket_price: Option<RawPrice>,
    #[serde(default)]
    pub maximum_ticket_price: Option<RawPrice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMusicProperties {
    #[serde(default)]
    pub age_restriction: Option<String>,
    #[serde(default)]
    pub door_time: Option<String>,
    #[serde(default)]
    pub presented_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAddress {
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVenue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<RawAddress>,
    #[serde(default)]
    pub age_restriction: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub capacity: Option<i64>,
}

/// One event as returned by the ticketing API, with its embedded venue.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(deserialize_with = "de_i64")]
    pub id: i64,
    pub name: RawText,
    pub start: RawLocalTime,
    pub end: RawLocalTime,
    pub published: String,
    #[serde(deserialize_with = "de_i64")]
    pub venue_id: i64,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub subcategory_id: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub format_id: Option<i64>,
    #[serde(default)]
    pub inventory_type: Option<String>,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub is_reserved_seating: bool,
    pub ticket_availability: RawTicketAvailability,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub music_properties: Option<RawMusicProperties>,
    #[serde(default)]
    pub online_event: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub venue: Option<RawVenue>,
}

impl RawEvent {
    /// Projects the record into an [`EventRow`] observed at `info_date`.
    ///
    /// The availability group reflects the record alone: `sold_out_date` is
    /// `info_date` when the record reports sold out and the never-sold-out
    /// sentinel otherwise. Stored history is reconciled by [`crate::sold_out`].
    pub fn project(&self, info_date: Timestamp) -> Result<EventRow, SyncError> {
        let availability = &self.ticket_availability;
        let published_date =
            self.parse_date("published", timestamp::parse_published(&self.published))?;
        let on_sale_date = match &availability.start_sales_date {
            Some(start) => {
                self.parse_date("start_sales_date", timestamp::parse_local(&start.local))?
            }
            None => published_date,
        };
        let music = self.music_properties.clone().unwrap_or_default();

        Ok(EventRow {
            id: self.id,
            name: self.name.text.clone().unwrap_or_default(),
            start_date: self.parse_date("start", timestamp::parse_local(&self.start.local))?,
            end_date: self.parse_date("end", timestamp::parse_local(&self.end.local))?,
            published_date,
            on_sale_date,
            venue_id: self.venue_id,
            category_id: self.subcategory_id.unwrap_or(DEFAULT_CATEGORY_ID),
            format_id: self.format_id.unwrap_or(DEFAULT_FORMAT_ID),
            inventory_type: self.inventory_type.clone(),
            is_free: self.is_free,
            is_reserved_seating: self.is_reserved_seating,
            is_available: availability.has_available_tickets,
            has_wait_list: availability.waitlist_available,
            min_price: availability
                .minimum_ticket_price
                .as_ref()
                .and_then(|p| p.major_value),
            max_price: availability
                .maximum_ticket_price
                .as_ref()
                .and_then(|p| p.major_value),
            capacity: self.capacity_or_default("capacity", self.capacity)?,
            age_restriction: music.age_restriction,
            door_time: music.door_time,
            presented_by: music.presented_by,
            is_online: self.online_event,
            url: self.url.clone(),
            is_sold_out: availability.is_sold_out,
            sold_out_date: if availability.is_sold_out {
                info_date
            } else {
                timestamp::never_sold_out()
            },
            last_info_date: info_date,
        })
    }

    /// Projects the embedded venue, if the record carries one.
    pub fn project_venue(&self) -> Result<Option<VenueRow>, SyncError> {
        let Some(venue) = &self.venue else {
            return Ok(None);
        };
        Ok(Some(VenueRow {
            id: self.venue_id,
            name: venue.name.clone().unwrap_or_default(),
            city: venue.address.as_ref().and_then(|a| a.city.clone()),
            capacity: self.capacity_or_default("venue.capacity", venue.capacity)?,
            age_restriction: venue.age_restriction.clone(),
        }))
    }

    fn parse_date(
        &self,
        field: &str,
        parsed: Result<Timestamp, chrono::ParseError>,
    ) -> Result<Timestamp, SyncError> {
        parsed.map_err(|e| SyncError::MalformedRecord {
            id: self.id.to_string(),
            reason: format!("invalid {}: {}", field, e),
        })
    }

    fn capacity_or_default(&self, field: &str, value: Option<i64>) -> Result<i32, SyncError> {
        match value {
            None => Ok(DEFAULT_CAPACITY),
            Some(v) => i32::try_from(v).map_err(|_| SyncError::MalformedRecord {
                id: self.id.to_string(),
                reason: format!("{} out of range: {}", field, v),
            }),
        }
    }
}

/// Best-effort id of an unparseable record, for logging.
pub fn record_id(value: &serde_json::Value) -> String {
    match value.get("id") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => "<unknown>".to_string(),
    }
}

/// Dictionary entry as dumped by the crawler.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNamed {
    #[serde(deserialize_with = "de_i64")]
    pub id: i64,
    pub name: String,
}

impl From<RawNamed> for NamedRow {
    fn from(raw: RawNamed) -> Self {
        NamedRow::new(raw.id, raw.name)
    }
}

/// Contents of `formats.json`.
#[derive(Debug, Deserialize)]
pub struct RawFormats {
    pub formats: Vec<RawNamed>,
}

/// Contents of `subcategories.json`.
#[derive(Debug, Deserialize)]
pub struct RawCategories {
    pub subcategories: Vec<RawNamed>,
}

// =============================================================================
// Lenient numeric fields
// =============================================================================

// The API sends ids and capacities as strings, prices as decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Numeric {
    fn to_i64<E: de::Error>(&self) -> Result<i64, E> {
        match self {
            Numeric::Int(v) => Ok(*v),
            // `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
            Numeric::Float(v)
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 =>
            {
                Ok(*v as i64)
            }
            Numeric::Float(v) if v.fract() == 0.0 => {
                Err(E::custom(format!("integer {} is out of range", v)))
            }
            Numeric::Float(v) => Err(E::custom(format!("expected an integer, got {}", v))),
            Numeric::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected an integer, got {:?}", s))),
        }
    }

    fn to_f64<E: de::Error>(&self) -> Result<f64, E> {
        match self {
            Numeric::Int(v) => Ok(*v as f64),
            Numeric::Float(v) => Ok(*v),
            Numeric::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a number, got {:?}", s))),
        }
    }
}

fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Numeric::deserialize(deserializer)?.to_i64()
}

fn de_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Option::<Numeric>::deserialize(deserializer)? {
        Some(Numeric::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(n) => n.to_i64().map(Some),
        None => Ok(None),
    }
}

fn de_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<Numeric>::deserialize(deserializer)? {
        Some(Numeric::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(n) => n.to_f64().map(Some),
        None => Ok(None),
    }
}
