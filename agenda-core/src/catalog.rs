//! The event catalog: the single local copy of every event the backend serves.
//!
//! Loads replace the whole catalog (the backend has no delta endpoint).
//! Readers get an immutable snapshot, so a filter that is being iterated
//! is never affected by a load completing in the meantime.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Local, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::date_range::DateWindow;
use crate::error::AgendaResult;
use crate::event::{Event, EventId};
use crate::notify::{Notifier, StoreEvent};
use crate::remote::AgendaApi;

/// Immutable catalog content.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    events: Vec<Arc<Event>>,
    index: HashMap<EventId, usize>,
}

impl CatalogSnapshot {
    /// Build from a server response. A repeated id keeps its first occurrence.
    fn build(fetched: Vec<Event>) -> Self {
        let mut events = Vec::with_capacity(fetched.len());
        let mut index = HashMap::with_capacity(fetched.len());

        for event in fetched {
            if let Some(id) = event.id {
                if index.contains_key(&id) {
                    debug!(event_id = %id, "Dropping duplicate event in catalog response");
                    continue;
                }
                index.insert(id, events.len());
            }
            events.push(Arc::new(event));
        }

        CatalogSnapshot { events, index }
    }

    fn same_content(&self, other: &CatalogSnapshot) -> bool {
        self.events.len() == other.events.len()
            && self
                .events
                .iter()
                .zip(&other.events)
                .all(|(a, b)| a.is_identical(b))
    }

    pub fn events(&self) -> &[Arc<Event>] {
        &self.events
    }

    pub fn get(&self, id: EventId) -> Option<&Arc<Event>> {
        self.index.get(&id).map(|&i| &self.events[i])
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

struct CatalogState {
    snapshot: Arc<CatalogSnapshot>,
    loads_in_flight: usize,
    loaded_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Shared event catalog. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EventCatalog {
    api: Arc<dyn AgendaApi>,
    state: Arc<RwLock<CatalogState>>,
    notifier: Notifier,
}

/// Decrements the in-flight counter even if the load future is dropped.
struct LoadGuard<'a> {
    catalog: &'a EventCatalog,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.catalog.write();
        state.loads_in_flight = state.loads_in_flight.saturating_sub(1);
    }
}

impl EventCatalog {
    pub fn new(api: Arc<dyn AgendaApi>, notifier: Notifier) -> Self {
        EventCatalog {
            api,
            state: Arc::new(RwLock::new(CatalogState {
                snapshot: Arc::new(CatalogSnapshot::default()),
                loads_in_flight: 0,
                loaded_at: None,
                last_error: None,
            })),
            notifier,
        }
    }

    /// Fetch every event and replace the catalog.
    ///
    /// On failure the previous content is kept and the error is recorded in
    /// [`EventCatalog::last_error`]. Concurrent loads each swap in a complete
    /// snapshot, so whichever finishes last wins.
    pub async fn load(&self) -> AgendaResult<Vec<Arc<Event>>> {
        self.write().loads_in_flight += 1;
        let guard = LoadGuard { catalog: self };

        let result = self.api.list_events().await;

        let mut state = self.write();
        match result {
            Ok(fetched) => {
                let snapshot = CatalogSnapshot::build(fetched);
                let changed = !state.snapshot.same_content(&snapshot);
                if changed {
                    state.snapshot = Arc::new(snapshot);
                }
                state.loaded_at = Some(Utc::now());
                state.last_error = None;

                let events = state.snapshot.events.clone();
                drop(state);
                drop(guard);

                if changed {
                    info!(count = events.len(), "Catalog reloaded");
                    self.notifier
                        .send(StoreEvent::CatalogReloaded { count: events.len() });
                } else {
                    debug!(count = events.len(), "Catalog unchanged");
                }
                Ok(events)
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                drop(state);
                drop(guard);

                warn!(error = %e, "Catalog load failed, keeping previous events");
                self.notifier.send(StoreEvent::CatalogLoadFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Events matching `text` (case-insensitive, title or description) inside
    /// `window`, evaluated lazily against the current snapshot.
    pub fn filter(&self, text: Option<&str>, window: DateWindow) -> FilteredEvents {
        self.filter_at(text, window, Local::now().date_naive())
    }

    /// Same as [`EventCatalog::filter`] with an explicit "today".
    pub fn filter_at(&self, text: Option<&str>, window: DateWindow, today: NaiveDate) -> FilteredEvents {
        let needle = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        FilteredEvents {
            snapshot: self.snapshot(),
            position: 0,
            needle,
            window,
            today,
        }
    }

    pub fn find_by_id(&self, id: EventId) -> Option<Arc<Event>> {
        self.read().snapshot.get(id).cloned()
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.read().snapshot.clone()
    }

    pub fn ids(&self) -> HashSet<EventId> {
        self.read().snapshot.index.keys().copied().collect()
    }

    pub fn is_loaded(&self) -> bool {
        self.read().loaded_at.is_some()
    }

    /// Only the very first load shows a spinner.
    pub fn needs_spinner(&self) -> bool {
        let state = self.read();
        state.loads_in_flight > 0 && state.loaded_at.is_none()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.read().loaded_at
    }

    pub fn last_error(&self) -> Option<String> {
        self.read().last_error.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lazy filtered view over one catalog snapshot.
pub struct FilteredEvents {
    snapshot: Arc<CatalogSnapshot>,
    position: usize,
    needle: Option<String>,
    window: DateWindow,
    today: NaiveDate,
}

impl Iterator for FilteredEvents {
    type Item = Arc<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(event) = self.snapshot.events.get(self.position) {
            self.position += 1;

            let text_ok = self.needle.as_deref().is_none_or(|n| event.matches_text(n));
            if text_ok && self.window.contains(event.date, self.today) {
                return Some(event.clone());
            }
        }
        None
    }
}
