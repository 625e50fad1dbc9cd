//! Attendance headcounts shown on event cards.
//!
//! Counts are display-only: a failed fetch degrades to [`Headcount::Unknown`]
//! and never blocks the rest of the screen.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use futures::stream;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::{EventId, RelationKind};
use crate::notify::{Notifier, StoreEvent, Subscription};
use crate::remote::AgendaApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Headcount {
    Known(u64),
    #[default]
    Unknown,
}

impl Headcount {
    /// Value to render; unknown counts show as zero.
    pub fn display_value(self) -> u64 {
        match self {
            Headcount::Known(n) => n,
            Headcount::Unknown => 0,
        }
    }
}

impl fmt::Display for Headcount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Headcount::Known(n) => write!(f, "{}", n),
            Headcount::Unknown => f.write_str("?"),
        }
    }
}

/// Cached attendance counts. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HeadcountBoard {
    api: Arc<dyn AgendaApi>,
    counts: Arc<Mutex<HashMap<EventId, Headcount>>>,
    notifier: Notifier,
    concurrency: usize,
}

impl HeadcountBoard {
    pub fn new(api: Arc<dyn AgendaApi>, notifier: Notifier, concurrency: usize) -> Self {
        HeadcountBoard {
            api,
            counts: Arc::new(Mutex::new(HashMap::new())),
            notifier,
            concurrency: concurrency.max(1),
        }
    }

    /// Last fetched value, `Unknown` if never fetched.
    pub fn get(&self, event_id: EventId) -> Headcount {
        self.lock().get(&event_id).copied().unwrap_or_default()
    }

    /// Fetch one count from the backend.
    pub async fn refresh(&self, event_id: EventId) -> Headcount {
        let headcount = match self.api.attendance_count(event_id).await {
            Ok(n) => Headcount::Known(n),
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Attendance count unavailable");
                Headcount::Unknown
            }
        };

        let previous = self.lock().insert(event_id, headcount);
        if previous != Some(headcount) {
            self.notifier.send(StoreEvent::HeadcountUpdated {
                event_id,
                headcount,
            });
        }
        headcount
    }

    /// Refresh a batch of cards with at most `concurrency` requests in flight.
    pub async fn refresh_many(&self, event_ids: impl IntoIterator<Item = EventId>) {
        stream::iter(event_ids)
            .map(|id| self.refresh(id))
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Refresh an event's count whenever an attendance toggle commits.
    pub fn spawn_listener(&self, mut subscription: Subscription) -> JoinHandle<()> {
        let board = self.clone();
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if let StoreEvent::ToggleCommitted {
                    kind: RelationKind::Confirm,
                    event_id,
                    ..
                } = event
                {
                    debug!(event_id = %event_id, "Attendance changed, refreshing headcount");
                    board.refresh(event_id).await;
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventId, Headcount>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
