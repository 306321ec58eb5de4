use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity cell text for a free block.
pub const EMPTY_ACTIVITY: &str = "Empty";

/// What currently occupies a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum Activity {
    Empty,
    Booked,
    /// Any other programme item, e.g. `Announcement`. The label is preserved verbatim.
    Other(String),
}

impl Activity {
    /// Reads an activity cell. A blank cell means the activity is missing.
    pub fn from_cell(raw: &str, booking_label: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed == EMPTY_ACTIVITY {
            Some(Self::Empty)
        } else if trimmed == booking_label {
            Some(Self::Booked)
        } else {
            Some(Self::Other(trimmed.to_string()))
        }
    }

    pub fn to_cell(&self, booking_label: &str) -> String {
        match self {
            Self::Empty => EMPTY_ACTIVITY.to_string(),
            Self::Booked => booking_label.to_string(),
            Self::Other(label) => label.clone(),
        }
    }
}

/// Notification status kept per booking in the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerFlag {
    Pending,
    Sent,
    Error,
}

impl LedgerFlag {
    pub fn from_cell(raw: &str) -> Self {
        match raw.trim() {
            "Yes" => Self::Sent,
            "Error" => Self::Error,
            _ => Self::Pending,
        }
    }

    pub const fn as_cell(self) -> &'static str {
        match self {
            Self::Pending => "No",
            Self::Sent => "Yes",
            Self::Error => "Error",
        }
    }

    /// Sent and Error are both final; neither is retried automatically.
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Opaque requester details carried alongside a booking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub attachment: String,
}

impl Requester {
    /// Contact and name are required to address any message to the requester.
    pub fn has_critical_data(&self) -> bool {
        !self.contact.trim().is_empty() && !self.name.trim().is_empty()
    }

    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            "there"
        } else {
            name
        }
    }

    pub fn display_subject(&self) -> &str {
        let subject = self.subject.trim();
        if subject.is_empty() {
            "your topic"
        } else {
            subject
        }
    }
}

/// A validated request ready for allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub requester: Requester,
    pub duration_minutes: u32,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is asking the allocator for a new booking id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOrigin {
    Submission,
    Rebooking,
}

static BOOKING_SEQUENCE: AtomicU64 = AtomicU64::new(1);

impl BookingId {
    /// Combines the contact, a microsecond timestamp, and a process-wide
    /// sequence so identical payloads in the same instant never collide.
    pub fn generate(contact: &str, origin: IdOrigin) -> Self {
        let micros = Utc::now().timestamp_micros();
        let sequence = BOOKING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let suffix = match origin {
            IdOrigin::Submission => "",
            IdOrigin::Rebooking => "_R",
        };
        Self(format!("BK_{}_{micros}-{sequence:06}{suffix}", contact.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A contiguous run of blocks reserved for one requester on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: BookingId,
    pub date: NaiveDate,
    /// Start of the first block.
    pub start: NaiveDateTime,
    /// End of the last block.
    pub end: NaiveDateTime,
    /// Schedule row positions, ascending and consecutive.
    pub rows: Vec<usize>,
    pub request: BookingRequest,
}
