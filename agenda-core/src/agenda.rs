//! Session-scoped container: one instance of every store, wired to one
//! backend and one notification stream.

use std::cmp::Ordering;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::catalog::EventCatalog;
use crate::config::AgendaConfig;
use crate::date_range::DateWindow;
use crate::error::{AgendaError, AgendaResult};
use crate::event::{Event, EventId, RelationKind, UserId};
use crate::headcount::{Headcount, HeadcountBoard};
use crate::notify::{Notifier, Subscription};
use crate::relation::{AttendanceState, FavoriteState, PendingToggle, RelationState};
use crate::remote::protocol::Profile;
use crate::remote::{AgendaApi, HttpApi};
use crate::session::{Credentials, SessionStore, TomlFileStore};

/// Everything an event card shows, joined at render time.
#[derive(Debug, Clone)]
pub struct EventCard {
    pub event: Arc<Event>,
    pub liked: bool,
    pub confirmed: bool,
    pub headcount: Headcount,
}

/// What a start, login or relation refresh managed to load.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub user: Option<UserId>,
    /// Relation sets that could not be loaded. They keep their previous
    /// content and their `last_error`.
    pub failures: Vec<(RelationKind, AgendaError)>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Agenda {
    session: SessionStore,
    api: Arc<dyn AgendaApi>,
    catalog: EventCatalog,
    favorites: FavoriteState,
    attendance: AttendanceState,
    headcounts: HeadcountBoard,
    notifier: Notifier,
    listener: JoinHandle<()>,
}

impl Agenda {
    /// Must be called from within a tokio runtime.
    pub fn new(
        session: SessionStore,
        api: Arc<dyn AgendaApi>,
        notification_capacity: usize,
        headcount_concurrency: usize,
    ) -> Self {
        let notifier = Notifier::new(notification_capacity);
        let catalog = EventCatalog::new(api.clone(), notifier.clone());
        let favorites = RelationState::favorites(api.clone(), notifier.clone());
        let attendance = RelationState::attendance(api.clone(), notifier.clone());
        let headcounts = HeadcountBoard::new(api.clone(), notifier.clone(), headcount_concurrency);
        let listener = headcounts.spawn_listener(notifier.subscribe());

        Agenda {
            session,
            api,
            catalog,
            favorites,
            attendance,
            headcounts,
            notifier,
            listener,
        }
    }

    /// Wire the stores to the HTTP backend and session file from `config`.
    pub fn connect(config: &AgendaConfig) -> AgendaResult<Self> {
        let session = SessionStore::new(Arc::new(TomlFileStore::new(config.session_path())));
        let api = HttpApi::from_config(config, session.clone())?;
        Ok(Self::new(
            session,
            Arc::new(api),
            config.notification_capacity,
            config.headcount_concurrency,
        ))
    }

    /// Restore the persisted session and load the catalog together with the
    /// user's relation sets.
    ///
    /// Only a catalog failure is an error. A relation set that fails to load
    /// keeps its previous content and is listed in the report.
    pub async fn start(&self) -> AgendaResult<SyncReport> {
        let user = self.session.restore()?;

        let failures = match user {
            Some(user) => {
                let (catalog, failures) =
                    tokio::join!(self.catalog.load(), self.load_relations(user));
                catalog?;
                self.prune();
                failures
            }
            None => {
                self.catalog.load().await?;
                Vec::new()
            }
        };
        Ok(SyncReport { user, failures })
    }

    pub async fn login(&self, email: &str, password: &str) -> AgendaResult<SyncReport> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AgendaError::Validation(
                "Email and password are required".into(),
            ));
        }

        let response = self.api.login(email, password).await?;
        let user = response.user_id;
        self.session.save(Credentials {
            user_id: user,
            token: response.token,
        })?;

        let failures = self.load_relations(user).await;
        self.prune();
        Ok(SyncReport {
            user: Some(user),
            failures,
        })
    }

    /// Forget the signed-in user and everything loaded for them.
    pub fn logout(&self) -> AgendaResult<()> {
        self.favorites.reset();
        self.attendance.reset();
        self.headcounts.clear();
        self.session.clear()
    }

    /// Reload the catalog and drop relation members it no longer lists.
    pub async fn refresh_catalog(&self) -> AgendaResult<usize> {
        let events = self.catalog.load().await?;
        self.prune();
        Ok(events.len())
    }

    /// Reload both relation sets of the signed-in user.
    pub async fn refresh_relations(&self) -> AgendaResult<SyncReport> {
        let user = self.require_user()?;
        let failures = self.load_relations(user).await;
        self.prune();
        Ok(SyncReport {
            user: Some(user),
            failures,
        })
    }

    pub async fn refresh_headcounts(&self, event_ids: impl IntoIterator<Item = EventId>) {
        self.headcounts.refresh_many(event_ids).await;
    }

    pub async fn profile(&self) -> AgendaResult<Profile> {
        let user = self.require_user()?;
        self.api.fetch_profile(user).await
    }

    pub fn toggle_like(&self, event_id: EventId) -> AgendaResult<PendingToggle> {
        let user = self.require_user()?;
        self.require_known(event_id)?;
        self.favorites.toggle(user, event_id)
    }

    pub fn toggle_attendance(&self, event_id: EventId) -> AgendaResult<PendingToggle> {
        let user = self.require_user()?;
        self.require_known(event_id)?;
        self.attendance.toggle(user, event_id)
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.session.user_id()
    }

    pub fn card(&self, event_id: EventId) -> Option<EventCard> {
        self.catalog
            .find_by_id(event_id)
            .map(|event| self.card_for(event))
    }

    /// Cards for the catalog events matching `text` within `window`.
    pub fn cards(&self, text: Option<&str>, window: DateWindow) -> Vec<EventCard> {
        self.catalog
            .filter(text, window)
            .map(|event| self.card_for(event))
            .collect()
    }

    /// Confirmed events, soonest first. Undated events go last.
    pub fn my_agenda(&self) -> Vec<Arc<Event>> {
        let mut events = self.members_of(&self.attendance);
        events.sort_by(|a, b| match (a.date, b.date) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.title.cmp(&b.title)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.title.cmp(&b.title),
        });
        events
    }

    /// Liked events in catalog order.
    pub fn liked_events(&self) -> Vec<Arc<Event>> {
        self.members_of(&self.favorites)
    }

    pub fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    pub fn favorites(&self) -> &FavoriteState {
        &self.favorites
    }

    pub fn attendance(&self) -> &AttendanceState {
        &self.attendance
    }

    pub fn headcounts(&self) -> &HeadcountBoard {
        &self.headcounts
    }

    fn card_for(&self, event: Arc<Event>) -> EventCard {
        let (liked, confirmed, headcount) = match event.id {
            Some(id) => (
                self.favorites.contains(id),
                self.attendance.contains(id),
                self.headcounts.get(id),
            ),
            None => (false, false, Headcount::Unknown),
        };
        EventCard {
            event,
            liked,
            confirmed,
            headcount,
        }
    }

    fn members_of(&self, relation: &RelationState) -> Vec<Arc<Event>> {
        let members = relation.snapshot();
        self.catalog
            .snapshot()
            .events()
            .iter()
            .filter(|event| event.id.is_some_and(|id| members.contains(&id)))
            .cloned()
            .collect()
    }

    async fn load_relations(&self, user: UserId) -> Vec<(RelationKind, AgendaError)> {
        let (likes, confirms) =
            tokio::join!(self.favorites.load(user), self.attendance.load(user));
        [(RelationKind::Like, likes), (RelationKind::Confirm, confirms)]
            .into_iter()
            .filter_map(|(kind, result)| result.err().map(|e| (kind, e)))
            .collect()
    }

    fn require_user(&self) -> AgendaResult<UserId> {
        self.session
            .user_id()
            .ok_or_else(|| AgendaError::Auth("Not logged in".into()))
    }

    /// Once the catalog is loaded, only events it lists can be toggled.
    fn require_known(&self, event_id: EventId) -> AgendaResult<()> {
        if self.catalog.is_loaded() && self.catalog.find_by_id(event_id).is_none() {
            return Err(AgendaError::NotFound(format!("Event {}", event_id)));
        }
        Ok(())
    }

    fn prune(&self) {
        if !self.catalog.is_loaded() {
            return;
        }
        let known = self.catalog.ids();
        self.favorites.prune(&known);
        self.attendance.prune(&known);
        info!(
            events = known.len(),
            liked = self.favorites.len(),
            confirmed = self.attendance.len(),
            "Session state synced"
        );
    }
}

impl Drop for Agenda {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
