//! Availability state machine for events.
//!
//! `is_sold_out` and `sold_out_date` are not diffed like ordinary fields.
//! The first snapshot that shows an event sold out fixes `sold_out_date`; a later
//! snapshot showing tickets again resets it; a late-arriving snapshot may only
//! move an existing `sold_out_date` earlier.
//!
//! | stored    | incoming | T vs last_info_date | result                                   |
//! |-----------|----------|---------------------|------------------------------------------|
//! | Available | false    | T >=                | no change                                |
//! | Available | true     | T >=                | SoldOut, `sold_out_date = T`             |
//! | SoldOut   | true     | T >=                | no change                                |
//! | SoldOut   | false    | T >=                | Available, `sold_out_date = NEVER`       |
//! | SoldOut   | true     | T <                 | `sold_out_date = T` when T is earlier     |
//! | any       | any      | T <, otherwise      | no change                                |

use crate::diff::EventChange;
use crate::models::EventRow;
use crate::timestamp::{self, Timestamp};

/// Availability of an event as far as the sold-out history is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityState {
    Available,
    SoldOut,
}

impl AvailabilityState {
    pub fn from_flag(is_sold_out: bool) -> Self {
        if is_sold_out {
            AvailabilityState::SoldOut
        } else {
            AvailabilityState::Available
        }
    }

    pub fn of(row: &EventRow) -> Self {
        Self::from_flag(row.is_sold_out)
    }
}

/// What a snapshot does to the availability group of a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to write.
    None,
    /// Available -> SoldOut, observed at `at`.
    SoldOut { at: Timestamp },
    /// SoldOut -> Available.
    Restocked,
    /// A stale snapshot proves the event sold out before the stored date.
    EarlierSellOut { at: Timestamp },
}

impl Transition {
    /// Field changes for this transition. `last_info_date` is handled by the caller.
    pub fn changes(&self) -> Vec<EventChange> {
        match *self {
            Transition::None => Vec::new(),
            Transition::SoldOut { at } => {
                vec![EventChange::IsSoldOut(true), EventChange::SoldOutDate(at)]
            }
            Transition::Restocked => vec![
                EventChange::IsSoldOut(false),
                EventChange::SoldOutDate(timestamp::never_sold_out()),
            ],
            Transition::EarlierSellOut { at } => vec![EventChange::SoldOutDate(at)],
        }
    }

    /// Whether the transition moves the event forward in time (sets `last_info_date`).
    pub fn is_forward(&self) -> bool {
        matches!(self, Transition::SoldOut { .. } | Transition::Restocked)
    }
}

/// Resolves the availability transition for `stored` given a snapshot taken at
/// `info_date` that reports `incoming_sold_out`.
pub fn resolve(stored: &EventRow, incoming_sold_out: bool, info_date: Timestamp) -> Transition {
    let stored_state = AvailabilityState::of(stored);
    let incoming = AvailabilityState::from_flag(incoming_sold_out);

    if info_date >= stored.last_info_date {
        return match (stored_state, incoming) {
            (AvailabilityState::Available, AvailabilityState::SoldOut) => {
                Transition::SoldOut { at: info_date }
            }
            (AvailabilityState::SoldOut, AvailabilityState::Available) => Transition::Restocked,
            _ => Transition::None,
        };
    }

    // Stale snapshot: only an earlier sell-out can be learned from it.
    match (stored_state, incoming) {
        (AvailabilityState::SoldOut, AvailabilityState::SoldOut)
            if info_date < stored.sold_out_date =>
        {
            Transition::EarlierSellOut { at: info_date }
        }
        _ => Transition::None,
    }
}
