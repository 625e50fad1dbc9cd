//! Endpoints and JSON payloads of the events backend.

use serde::{Deserialize, Serialize};

use crate::event::{EventId, RelationKind, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// Every backend call the client makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Profile(UserId),
    Events,
    AttendanceCount(EventId),
    /// `liked-events` or `confirmed-events` of a user.
    Related(RelationKind, UserId),
    /// Add (`member = true`) or remove a relation.
    SetRelated {
        kind: RelationKind,
        user: UserId,
        event: EventId,
        member: bool,
    },
}

impl Route {
    pub fn method(&self) -> Method {
        match self {
            Route::Login => Method::Post,
            Route::SetRelated { member: true, .. } => Method::Post,
            Route::SetRelated { member: false, .. } => Method::Delete,
            _ => Method::Get,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => "/auth/login".to_string(),
            Route::Profile(user) => format!("/users/{}", user),
            Route::Events => "/events".to_string(),
            Route::AttendanceCount(event) => format!("/events/{}/attendance-count", event),
            Route::Related(RelationKind::Like, user) => format!("/users/{}/liked-events", user),
            Route::Related(RelationKind::Confirm, user) => {
                format!("/users/{}/confirmed-events", user)
            }
            Route::SetRelated {
                kind, user, event, ..
            } => format!("/users/{}/events/{}/{}", user, event, kind.name()),
        }
    }

    /// Login is the only call made without a bearer token.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Route::Login)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
}

/// User profile; fields the client does not model are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A relation listing entry: either a bare id or a full event object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RelatedEntry {
    Id(EventId),
    Event { id: EventId },
}

impl RelatedEntry {
    pub fn event_id(&self) -> EventId {
        match self {
            RelatedEntry::Id(id) | RelatedEntry::Event { id } => *id,
        }
    }
}

/// Attendance count, served either bare or wrapped.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CountResponse {
    Bare(u64),
    Wrapped { count: u64 },
}

impl CountResponse {
    pub fn count(&self) -> u64 {
        match self {
            CountResponse::Bare(n) | CountResponse::Wrapped { count: n } => *n,
        }
    }
}
