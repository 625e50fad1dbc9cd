//! Client-side state for the community events agenda.
//!
//! This crate keeps the event catalog and the signed-in user's relations in
//! sync with the backend:
//! - `catalog` for the shared list of events and its search filters
//! - `relation` for liked events and confirmed attendance, with optimistic toggles
//! - `session` for the persisted login
//! - `agenda` for the container that wires them together

pub mod agenda;
pub mod catalog;
pub mod config;
pub mod date_range;
pub mod error;
pub mod event;
pub mod headcount;
pub mod notify;
pub mod relation;
pub mod remote;
pub mod session;

// Re-export the common types at crate root for convenience
pub use agenda::{Agenda, EventCard, SyncReport};
pub use config::AgendaConfig;
pub use date_range::DateWindow;
pub use error::{AgendaError, AgendaResult};
pub use event::{Event, EventId, RelationKind, UserId};
pub use headcount::Headcount;
pub use notify::{StoreEvent, Subscription};
pub use relation::{PendingToggle, ToggleOutcome};
