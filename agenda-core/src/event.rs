//! Event and identity types.
//!
//! Events are fetched from the backend and never mutated afterwards. Identity
//! is the server-assigned id: a cached copy and a freshly fetched copy of the
//! same event compare equal even when other fields differ.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Server-assigned event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl EventId {
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Value persisted when nobody is logged in.
    pub const NONE: i64 = -1;

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }

    /// Interpret a persisted raw id, treating the `-1` sentinel (or any
    /// non-positive value) as "no authenticated user".
    pub fn from_stored(raw: i64) -> Option<UserId> {
        let id = UserId(raw);
        id.is_valid().then_some(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two user/event relations the client keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// "Liked" / favorite.
    Like,
    /// Confirmed attendance.
    Confirm,
}

impl RelationKind {
    pub fn name(self) -> &'static str {
        match self {
            RelationKind::Like => "like",
            RelationKind::Confirm => "confirm",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A community event as served by `GET /events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Missing while the server has not assigned one yet.
    #[serde(default)]
    pub id: Option<EventId>,
    pub title: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub image_ref: Option<String>,
    /// Free-form time of day, e.g. "19:30".
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Event {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Event {
            id: Some(EventId(id)),
            title: title.into(),
            date: None,
            description: None,
            price: None,
            image_ref: None,
            schedule: None,
            address: None,
        }
    }

    /// Field-by-field comparison, unlike `==` which only looks at `id`.
    pub fn is_identical(&self, other: &Event) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.date == other.date
            && self.description == other.description
            && self.price == other.price
            && self.image_ref == other.image_ref
            && self.schedule == other.schedule
            && self.address == other.address
    }

    /// Case-insensitive substring match on title and description.
    /// `needle` must already be lowercase.
    pub(crate) fn matches_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}
