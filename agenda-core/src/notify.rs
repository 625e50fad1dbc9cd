//! Change notifications shared by every store of a session.
//!
//! Screens hold a [`Subscription`]; dropping it stops delivery to that screen
//! without affecting any mutation still in flight.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

use crate::event::{EventId, RelationKind};
use crate::headcount::Headcount;

/// Something observable changed in one of the session stores.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The catalog content was replaced by a load that changed it.
    CatalogReloaded { count: usize },
    /// A catalog load failed; the previous content is still served.
    CatalogLoadFailed { message: String },
    /// One event's membership flipped (optimistic apply, rollback or reload overlay).
    MembershipChanged {
        kind: RelationKind,
        event_id: EventId,
        member: bool,
    },
    /// A relation set was replaced by a load that changed it.
    RelationReloaded { kind: RelationKind, count: usize },
    /// A relation load failed; the previous set is still served.
    RelationLoadFailed { kind: RelationKind, message: String },
    /// A relation set was emptied by logout or a user switch.
    RelationCleared { kind: RelationKind },
    /// The backend accepted a toggle.
    ToggleCommitted {
        kind: RelationKind,
        event_id: EventId,
        member: bool,
    },
    /// A toggle failed and was rolled back. Shown to the user as a dismissible error.
    ToggleFailed {
        kind: RelationKind,
        event_id: EventId,
        message: String,
    },
    HeadcountUpdated {
        event_id: EventId,
        headcount: Headcount,
    },
}

/// Sending half, cloned into each store.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<StoreEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Notifier { sender }
    }

    pub fn send(&self, event: StoreEvent) {
        // No receivers just means no screen is mounted.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving half held by one screen.
pub struct Subscription {
    receiver: broadcast::Receiver<StoreEvent>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once every store is gone.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, skipping notifications");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-buffered event, if any.
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, skipping notifications");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain everything buffered so far.
    pub fn drain(&mut self) -> Vec<StoreEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
