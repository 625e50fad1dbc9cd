//! Scriptable in-memory backend for store tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{AgendaError, AgendaResult};
use crate::event::{Event, EventId, RelationKind, UserId};
use crate::remote::AgendaApi;
use crate::remote::protocol::{LoginResponse, Profile};

pub(crate) const PASSWORD: &str = "pw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApiCall {
    Login(String),
    Profile(UserId),
    ListEvents,
    AttendanceCount(EventId),
    ListRelated(RelationKind, UserId),
    SetRelated {
        kind: RelationKind,
        user: UserId,
        event: EventId,
        member: bool,
    },
}

type Held<T> = Mutex<Vec<Option<oneshot::Sender<AgendaResult<T>>>>>;

#[derive(Default)]
pub(crate) struct MockApi {
    events: Mutex<Vec<Event>>,
    related: Mutex<HashMap<(RelationKind, UserId), BTreeSet<EventId>>>,
    counts: Mutex<HashMap<EventId, u64>>,
    accounts: Mutex<HashMap<String, UserId>>,
    calls: Mutex<Vec<ApiCall>>,

    event_failures: Mutex<VecDeque<AgendaError>>,
    related_failures: Mutex<VecDeque<AgendaError>>,
    mutation_failures: Mutex<VecDeque<AgendaError>>,
    count_failures: Mutex<VecDeque<AgendaError>>,

    hold_mutations: AtomicBool,
    held_mutations: Held<()>,
    hold_loads: AtomicBool,
    held_loads: Held<Vec<Event>>,
    hold_related: AtomicBool,
    held_related: Held<Vec<EventId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

impl MockApi {
    pub(crate) fn with_events(events: Vec<Event>) -> Self {
        let api = MockApi::default();
        *lock(&api.events) = events;
        api
    }

    pub(crate) fn set_events(&self, events: Vec<Event>) {
        *lock(&self.events) = events;
    }

    pub(crate) fn set_related_ids(&self, kind: RelationKind, user: UserId, ids: &[i64]) {
        lock(&self.related).insert((kind, user), ids.iter().map(|&i| EventId(i)).collect());
    }

    pub(crate) fn related_ids(&self, kind: RelationKind, user: UserId) -> Vec<EventId> {
        lock(&self.related)
            .get(&(kind, user))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn set_count(&self, event: i64, count: u64) {
        lock(&self.counts).insert(EventId(event), count);
    }

    pub(crate) fn add_account(&self, email: &str, user: i64) {
        lock(&self.accounts).insert(email.to_string(), UserId(user));
    }

    pub(crate) fn calls(&self) -> Vec<ApiCall> {
        lock(&self.calls).clone()
    }

    pub(crate) fn mutation_calls(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::SetRelated { .. }))
            .collect()
    }

    pub(crate) fn fail_next_load(&self, err: AgendaError) {
        lock(&self.event_failures).push_back(err);
    }

    pub(crate) fn fail_next_related(&self, err: AgendaError) {
        lock(&self.related_failures).push_back(err);
    }

    pub(crate) fn fail_next_mutation(&self, err: AgendaError) {
        lock(&self.mutation_failures).push_back(err);
    }

    pub(crate) fn fail_next_count(&self, err: AgendaError) {
        lock(&self.count_failures).push_back(err);
    }

    /// Park relation mutations until released with [`MockApi::release_mutation`].
    pub(crate) fn hold_mutations(&self) {
        self.hold_mutations.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release_mutation(&self, index: usize, result: AgendaResult<()>) {
        let sender = lock(&self.held_mutations)[index]
            .take()
            .expect("mutation already released");
        let _ = sender.send(result);
    }

    /// Park catalog loads until released with [`MockApi::release_load`].
    pub(crate) fn hold_loads(&self) {
        self.hold_loads.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release_load(&self, index: usize, result: AgendaResult<Vec<Event>>) {
        let sender = lock(&self.held_loads)[index]
            .take()
            .expect("load already released");
        let _ = sender.send(result);
    }

    /// Park relation listings until released with [`MockApi::release_related`].
    pub(crate) fn hold_related(&self) {
        self.hold_related.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release_related(&self, index: usize, result: AgendaResult<Vec<EventId>>) {
        let sender = lock(&self.held_related)[index]
            .take()
            .expect("listing already released");
        let _ = sender.send(result);
    }

    pub(crate) async fn wait_for_held_related(&self, count: usize) {
        for _ in 0..10_000 {
            if lock(&self.held_related).len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} held listings");
    }

    /// Yield until `count` mutations are parked.
    pub(crate) async fn wait_for_held_mutations(&self, count: usize) {
        for _ in 0..10_000 {
            if lock(&self.held_mutations).len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} held mutations");
    }

    pub(crate) async fn wait_for_held_loads(&self, count: usize) {
        for _ in 0..10_000 {
            if lock(&self.held_loads).len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} held loads");
    }

    fn record(&self, call: ApiCall) {
        lock(&self.calls).push(call);
    }

    fn scripted(queue: &Mutex<VecDeque<AgendaError>>) -> AgendaResult<()> {
        match lock(queue).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn park<T>(held: &Held<T>) -> oneshot::Receiver<AgendaResult<T>> {
        let (tx, rx) = oneshot::channel();
        lock(held).push(Some(tx));
        rx
    }
}

fn dropped() -> AgendaError {
    AgendaError::Network("held request dropped".into())
}

#[async_trait]
impl AgendaApi for MockApi {
    async fn login(&self, email: &str, password: &str) -> AgendaResult<LoginResponse> {
        self.record(ApiCall::Login(email.to_string()));
        let user = lock(&self.accounts).get(email).copied();
        match user {
            Some(user_id) if password == PASSWORD => Ok(LoginResponse {
                token: format!("token-{}", user_id),
                user_id,
            }),
            _ => Err(AgendaError::Auth("Invalid email or password".into())),
        }
    }

    async fn fetch_profile(&self, user: UserId) -> AgendaResult<Profile> {
        self.record(ApiCall::Profile(user));
        Ok(Profile {
            id: user,
            name: Some(format!("User {}", user)),
            email: None,
            extra: serde_json::Map::new(),
        })
    }

    async fn list_events(&self) -> AgendaResult<Vec<Event>> {
        self.record(ApiCall::ListEvents);
        Self::scripted(&self.event_failures)?;

        if self.hold_loads.load(Ordering::SeqCst) {
            let rx = Self::park(&self.held_loads);
            return rx.await.unwrap_or_else(|_| Err(dropped()));
        }
        Ok(lock(&self.events).clone())
    }

    async fn attendance_count(&self, event: EventId) -> AgendaResult<u64> {
        self.record(ApiCall::AttendanceCount(event));
        Self::scripted(&self.count_failures)?;
        Ok(lock(&self.counts).get(&event).copied().unwrap_or(0))
    }

    async fn list_related(&self, kind: RelationKind, user: UserId) -> AgendaResult<Vec<EventId>> {
        self.record(ApiCall::ListRelated(kind, user));
        Self::scripted(&self.related_failures)?;

        if self.hold_related.load(Ordering::SeqCst) {
            let rx = Self::park(&self.held_related);
            return rx.await.unwrap_or_else(|_| Err(dropped()));
        }
        Ok(self.related_ids(kind, user))
    }

    async fn set_related(
        &self,
        kind: RelationKind,
        user: UserId,
        event: EventId,
        member: bool,
    ) -> AgendaResult<()> {
        self.record(ApiCall::SetRelated {
            kind,
            user,
            event,
            member,
        });

        let result = if self.hold_mutations.load(Ordering::SeqCst) {
            let rx = Self::park(&self.held_mutations);
            rx.await.unwrap_or_else(|_| Err(dropped()))
        } else {
            Self::scripted(&self.mutation_failures)
        };
        result?;

        let mut related = lock(&self.related);
        let ids = related.entry((kind, user)).or_default();
        if member {
            ids.insert(event);
        } else {
            ids.remove(&event);
        }
        Ok(())
    }
}
