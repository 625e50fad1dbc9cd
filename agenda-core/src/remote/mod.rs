//! Backend access.
//!
//! The stores only talk to the backend through [`AgendaApi`], so they can be
//! exercised against [`mock::MockApi`] in tests and against [`HttpApi`] in
//! the application.

mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod protocol;

pub use http::HttpApi;

use async_trait::async_trait;

use crate::error::AgendaResult;
use crate::event::{Event, EventId, RelationKind, UserId};
use crate::remote::protocol::{LoginResponse, Profile};

/// Logical operations of the events backend.
#[async_trait]
pub trait AgendaApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> AgendaResult<LoginResponse>;

    async fn fetch_profile(&self, user: UserId) -> AgendaResult<Profile>;

    async fn list_events(&self) -> AgendaResult<Vec<Event>>;

    async fn attendance_count(&self, event: EventId) -> AgendaResult<u64>;

    /// Authoritative ids of `kind` for `user`.
    async fn list_related(&self, kind: RelationKind, user: UserId) -> AgendaResult<Vec<EventId>>;

    /// Add (`member = true`) or remove one relation.
    async fn set_related(
        &self,
        kind: RelationKind,
        user: UserId,
        event: EventId,
        member: bool,
    ) -> AgendaResult<()>;
}
