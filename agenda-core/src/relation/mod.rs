//! Per-user relation sets: liked events and confirmed attendance.
//!
//! Both relations have the same shape and differ only in [`RelationKind`]
//! and backend endpoints. One [`RelationState`] per relation is shared by
//! every screen of a session. Only its own methods mutate it.
//!
//! Toggles are optimistic: the set flips immediately, the backend call runs
//! in the background, and a failure rolls the flip back. See [`pending`] for
//! how overlapping toggles of the same event are reconciled.

mod pending;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AgendaError, AgendaResult};
use crate::event::{EventId, RelationKind, UserId};
use crate::notify::{Notifier, StoreEvent};
use crate::remote::AgendaApi;
use pending::{PendingLedger, Ticket};

/// Liked events of the signed-in user.
pub type FavoriteState = RelationState;
/// Confirmed attendance of the signed-in user.
pub type AttendanceState = RelationState;

/// How a toggle ended once the backend answered.
#[derive(Debug)]
pub enum ToggleOutcome {
    /// The backend holds the requested membership.
    Committed,
    /// The backend call failed and the optimistic flip was undone.
    RolledBack(AgendaError),
    /// The backend call failed but a newer toggle of the same event had
    /// already taken over; nothing was undone.
    Superseded,
    /// The store was reset (logout or user switch) before the answer arrived.
    Discarded,
}

impl ToggleOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, ToggleOutcome::Committed)
    }
}

/// A toggle whose backend call is still running. Dropping it is fine: the
/// call keeps running and its result still reaches the store.
pub struct PendingToggle {
    event_id: EventId,
    member: bool,
    handle: JoinHandle<ToggleOutcome>,
}

impl PendingToggle {
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Membership applied optimistically.
    pub fn optimistic_member(&self) -> bool {
        self.member
    }

    pub async fn settled(self) -> ToggleOutcome {
        self.handle.await.unwrap_or(ToggleOutcome::Discarded)
    }
}

struct RelationInner {
    owner: Option<UserId>,
    /// Bumped on every reset so answers for a previous user are dropped.
    epoch: u64,
    members: HashSet<EventId>,
    pending: PendingLedger,
    synced_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Shared relation set. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RelationState {
    kind: RelationKind,
    api: Arc<dyn AgendaApi>,
    inner: Arc<Mutex<RelationInner>>,
    notifier: Notifier,
}

fn validate(user: UserId, event_id: Option<EventId>) -> AgendaResult<()> {
    if !user.is_valid() {
        return Err(AgendaError::Validation(format!("Invalid user id {}", user)));
    }
    if let Some(event_id) = event_id.filter(|id| !id.is_valid()) {
        return Err(AgendaError::Validation(format!(
            "Invalid event id {}",
            event_id
        )));
    }
    Ok(())
}

fn apply(members: &mut HashSet<EventId>, event_id: EventId, member: bool) {
    if member {
        members.insert(event_id);
    } else {
        members.remove(&event_id);
    }
}

impl RelationState {
    pub fn new(kind: RelationKind, api: Arc<dyn AgendaApi>, notifier: Notifier) -> Self {
        RelationState {
            kind,
            api,
            inner: Arc::new(Mutex::new(RelationInner {
                owner: None,
                epoch: 0,
                members: HashSet::new(),
                pending: PendingLedger::default(),
                synced_at: None,
                last_error: None,
            })),
            notifier,
        }
    }

    pub fn favorites(api: Arc<dyn AgendaApi>, notifier: Notifier) -> FavoriteState {
        Self::new(RelationKind::Like, api, notifier)
    }

    pub fn attendance(api: Arc<dyn AgendaApi>, notifier: Notifier) -> AttendanceState {
        Self::new(RelationKind::Confirm, api, notifier)
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// User this set belongs to, if any.
    pub fn owner(&self) -> Option<UserId> {
        self.lock().owner
    }

    /// Membership including optimistic, not yet confirmed toggles.
    pub fn contains(&self, event_id: EventId) -> bool {
        self.lock().members.contains(&event_id)
    }

    pub fn snapshot(&self) -> HashSet<EventId> {
        self.lock().members.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().members.is_empty()
    }

    /// Whether a toggle of `event_id` is still waiting on the backend.
    pub fn is_pending(&self, event_id: EventId) -> bool {
        self.lock().pending.contains(event_id)
    }

    /// A set is stale until it has been loaded for its current owner.
    pub fn is_stale(&self) -> bool {
        self.lock().synced_at.is_none()
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.lock().synced_at
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Replace the set with the backend's for `user`.
    ///
    /// Loading for a different user than the current owner resets the set
    /// first. Events with a toggle still in flight keep their optimistic
    /// value, and events whose toggle settled while the request was out keep
    /// the settled value. Subscribers are only notified if the set changed.
    pub async fn load(&self, user: UserId) -> AgendaResult<()> {
        validate(user, None)?;

        let (epoch, mark, cleared) = {
            let mut inner = self.lock();
            let cleared = inner.owner != Some(user) && Self::reset_locked(&mut inner, Some(user));
            let mark = inner.pending.begin_load();
            (inner.epoch, mark, cleared)
        };
        if cleared {
            self.notifier.send(StoreEvent::RelationCleared { kind: self.kind });
        }

        let result = self.api.list_related(self.kind, user).await;

        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!(kind = %self.kind, user_id = %user, "Dropping relation load for previous session");
            return Ok(());
        }

        let fetched: HashSet<EventId> = match result {
            Ok(ids) => ids.into_iter().filter(|id| id.is_valid()).collect(),
            Err(e) => {
                inner.pending.finish_load(mark);
                inner.last_error = Some(e.to_string());
                drop(inner);
                warn!(kind = %self.kind, user_id = %user, error = %e, "Relation load failed, keeping current set");
                self.notifier.send(StoreEvent::RelationLoadFailed {
                    kind: self.kind,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut next = fetched.clone();
        for event_id in inner.pending.event_ids() {
            if let Some(display) = inner.pending.rebase(event_id, fetched.contains(&event_id)) {
                apply(&mut next, event_id, display);
            }
        }
        // The answer may predate toggles that settled meanwhile.
        for event_id in inner.pending.settled_since(mark) {
            if !inner.pending.contains(event_id) {
                let member = inner.members.contains(&event_id);
                debug!(kind = %self.kind, event_id = %event_id, member, "Keeping toggle settled during reload");
                apply(&mut next, event_id, member);
            }
        }
        inner.pending.finish_load(mark);

        let changed = next != inner.members;
        if changed {
            inner.members = next;
        }
        inner.synced_at = Some(Utc::now());
        inner.last_error = None;
        let count = inner.members.len();
        drop(inner);

        if changed {
            info!(kind = %self.kind, user_id = %user, count, "Relation set reloaded");
            self.notifier.send(StoreEvent::RelationReloaded {
                kind: self.kind,
                count,
            });
        }
        Ok(())
    }

    /// Flip membership of `event_id` for `user`.
    ///
    /// The flip is applied and announced before this returns; the backend
    /// call runs on a spawned task. Invalid ids, or a user other than the
    /// set's owner, are rejected before anything changes.
    pub fn toggle(&self, user: UserId, event_id: EventId) -> AgendaResult<PendingToggle> {
        validate(user, Some(event_id))?;

        let (ticket, epoch) = {
            let mut inner = self.lock();
            match inner.owner {
                Some(owner) if owner != user => {
                    return Err(AgendaError::Validation(format!(
                        "{} set belongs to user {}, not {}",
                        self.kind, owner, user
                    )));
                }
                Some(_) => {}
                None => inner.owner = Some(user),
            }

            let current = inner.members.contains(&event_id);
            let ticket = inner.pending.begin(event_id, current);
            apply(&mut inner.members, event_id, ticket.target);
            (ticket, inner.epoch)
        };

        debug!(kind = %self.kind, event_id = %event_id, member = ticket.target, "Optimistic toggle");
        self.notifier.send(StoreEvent::MembershipChanged {
            kind: self.kind,
            event_id,
            member: ticket.target,
        });

        let store = self.clone();
        let handle = tokio::spawn(async move {
            let result = store
                .api
                .set_related(store.kind, user, event_id, ticket.target)
                .await;
            store.settle(epoch, ticket, result)
        });

        Ok(PendingToggle {
            event_id,
            member: ticket.target,
            handle,
        })
    }

    fn settle(&self, epoch: u64, ticket: Ticket, result: AgendaResult<()>) -> ToggleOutcome {
        let failure = match result {
            Ok(()) => None,
            Err(e) if e.is_already_applied() => None,
            Err(e) => Some(e),
        };

        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!(kind = %self.kind, event_id = %ticket.event_id, "Dropping toggle result for previous session");
            return ToggleOutcome::Discarded;
        }
        let Some(settlement) = inner.pending.settle(&ticket, failure.is_none()) else {
            return ToggleOutcome::Discarded;
        };

        let changed = inner.members.contains(&ticket.event_id) != settlement.display;
        apply(&mut inner.members, ticket.event_id, settlement.display);
        drop(inner);

        if changed {
            self.notifier.send(StoreEvent::MembershipChanged {
                kind: self.kind,
                event_id: ticket.event_id,
                member: settlement.display,
            });
        }

        match failure {
            None => {
                info!(kind = %self.kind, event_id = %ticket.event_id, member = ticket.target, "Toggle committed");
                self.notifier.send(StoreEvent::ToggleCommitted {
                    kind: self.kind,
                    event_id: ticket.event_id,
                    member: ticket.target,
                });
                ToggleOutcome::Committed
            }
            Some(e) if settlement.is_head => {
                warn!(kind = %self.kind, event_id = %ticket.event_id, error = %e, "Toggle failed, rolled back");
                self.notifier.send(StoreEvent::ToggleFailed {
                    kind: self.kind,
                    event_id: ticket.event_id,
                    message: e.to_string(),
                });
                ToggleOutcome::RolledBack(e)
            }
            Some(e) => {
                debug!(kind = %self.kind, event_id = %ticket.event_id, error = %e, "Ignoring failure of superseded toggle");
                ToggleOutcome::Superseded
            }
        }
    }

    /// Drop members the catalog no longer knows about. Events with a toggle
    /// in flight are kept until it settles.
    pub fn prune(&self, known: &HashSet<EventId>) {
        let mut inner = self.lock();
        let before = inner.members.len();
        let RelationInner {
            members, pending, ..
        } = &mut *inner;
        members.retain(|id| known.contains(id) || pending.contains(*id));
        let count = inner.members.len();
        drop(inner);

        if count != before {
            debug!(kind = %self.kind, removed = before - count, "Pruned events missing from catalog");
            self.notifier.send(StoreEvent::RelationReloaded {
                kind: self.kind,
                count,
            });
        }
    }

    /// Forget the owner and everything held for them. Toggle answers still in
    /// flight are discarded when they arrive.
    pub fn reset(&self) {
        let cleared = Self::reset_locked(&mut self.lock(), None);
        if cleared {
            self.notifier.send(StoreEvent::RelationCleared { kind: self.kind });
        }
    }

    /// Returns whether there was anything to clear.
    fn reset_locked(inner: &mut RelationInner, owner: Option<UserId>) -> bool {
        let had_state = inner.owner.is_some() || !inner.members.is_empty();
        inner.epoch += 1;
        inner.owner = owner;
        inner.members.clear();
        inner.pending.clear();
        inner.synced_at = None;
        inner.last_error = None;
        had_state
    }

    fn lock(&self) -> MutexGuard<'_, RelationInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::{ApiCall, MockApi};

    const USER: UserId = UserId(1);

    fn attendance() -> (AttendanceState, Arc<MockApi>, Notifier) {
        let api = Arc::new(MockApi::default());
        let notifier = Notifier::new(64);
        (
            RelationState::attendance(api.clone(), notifier.clone()),
            api,
            notifier,
        )
    }

    fn failed_toggles(events: &[StoreEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, StoreEvent::ToggleFailed { .. }))
            .count()
    }

    #[tokio::test]
    async fn load_replaces_set_and_marks_synced() {
        let (state, api, _) = attendance();
        api.set_related_ids(RelationKind::Confirm, USER, &[3, 4]);
        assert!(state.is_stale());

        state.load(USER).await.unwrap();

        assert!(state.contains(EventId(3)));
        assert!(!state.contains(EventId(5)));
        assert_eq!(state.owner(), Some(USER));
        assert!(!state.is_stale());
    }

    #[tokio::test]
    async fn reloading_unchanged_set_does_not_notify() {
        let (state, api, notifier) = attendance();
        api.set_related_ids(RelationKind::Confirm, USER, &[3]);
        state.load(USER).await.unwrap();
        let mut screen = notifier.subscribe();

        state.load(USER).await.unwrap();
        state.load(USER).await.unwrap();

        assert!(screen.drain().is_empty());
    }

    #[tokio::test]
    async fn failed_load_keeps_current_set() {
        let (state, api, _) = attendance();
        api.set_related_ids(RelationKind::Confirm, USER, &[3]);
        state.load(USER).await.unwrap();

        api.fail_next_related(AgendaError::Network("offline".into()));
        assert!(state.load(USER).await.is_err());

        assert!(state.contains(EventId(3)));
        assert!(state.last_error().is_some());
    }

    #[tokio::test]
    async fn toggle_twice_returns_to_original_membership() {
        let (state, api, _) = attendance();
        state.load(USER).await.unwrap();

        let first = state.toggle(USER, EventId(8)).unwrap();
        assert!(first.optimistic_member());
        assert!(first.settled().await.is_committed());
        assert!(state.contains(EventId(8)));

        let second = state.toggle(USER, EventId(8)).unwrap();
        assert!(second.settled().await.is_committed());
        assert!(!state.contains(EventId(8)));

        let mutations = api.mutation_calls();
        assert_eq!(
            mutations,
            vec![
                ApiCall::SetRelated {
                    kind: RelationKind::Confirm,
                    user: USER,
                    event: EventId(8),
                    member: true,
                },
                ApiCall::SetRelated {
                    kind: RelationKind::Confirm,
                    user: USER,
                    event: EventId(8),
                    member: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn failed_toggle_rolls_back_with_one_error() {
        let (state, api, notifier) = attendance();
        state.load(USER).await.unwrap();
        let mut screen = notifier.subscribe();
        api.fail_next_mutation(AgendaError::Network("timeout".into()));

        let pending = state.toggle(USER, EventId(8)).unwrap();
        assert!(state.contains(EventId(8)));

        let outcome = pending.settled().await;
        assert!(matches!(outcome, ToggleOutcome::RolledBack(AgendaError::Network(_))));
        assert!(!state.contains(EventId(8)));

        let events = screen.drain();
        assert_eq!(failed_toggles(&events), 1);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, StoreEvent::MembershipChanged { .. }))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn stale_failure_does_not_undo_newer_toggle() {
        let (state, api, notifier) = attendance();
        state.load(USER).await.unwrap();
        api.hold_mutations();
        let mut screen = notifier.subscribe();

        let t1 = state.toggle(USER, EventId(8)).unwrap();
        let t2 = state.toggle(USER, EventId(8)).unwrap();
        assert!(!state.contains(EventId(8)));
        api.wait_for_held_mutations(2).await;

        api.release_mutation(0, Err(AgendaError::Network("timeout".into())));
        assert!(matches!(t1.settled().await, ToggleOutcome::Superseded));
        assert!(!state.contains(EventId(8)));
        assert!(state.is_pending(EventId(8)));

        api.release_mutation(1, Ok(()));
        assert!(t2.settled().await.is_committed());
        assert!(!state.contains(EventId(8)));
        assert!(!state.is_pending(EventId(8)));
        assert_eq!(failed_toggles(&screen.drain()), 0);
    }

    #[tokio::test]
    async fn newer_failure_rolls_back_to_server_state() {
        let (state, api, _) = attendance();
        state.load(USER).await.unwrap();
        api.hold_mutations();

        let t1 = state.toggle(USER, EventId(8)).unwrap();
        let t2 = state.toggle(USER, EventId(8)).unwrap();
        api.wait_for_held_mutations(2).await;

        api.release_mutation(0, Err(AgendaError::Network("timeout".into())));
        t1.settled().await;
        api.release_mutation(1, Err(AgendaError::Network("timeout".into())));
        assert!(matches!(t2.settled().await, ToggleOutcome::RolledBack(_)));

        assert!(!state.contains(EventId(8)));
        assert!(api.related_ids(RelationKind::Confirm, USER).is_empty());
    }

    #[tokio::test]
    async fn conflict_response_counts_as_success() {
        let (state, api, notifier) = attendance();
        state.load(USER).await.unwrap();
        let mut screen = notifier.subscribe();
        api.fail_next_mutation(AgendaError::Server {
            status: 409,
            body: "already confirmed".into(),
        });

        let outcome = state.toggle(USER, EventId(2)).unwrap().settled().await;

        assert!(outcome.is_committed());
        assert!(state.contains(EventId(2)));
        assert!(screen.drain().contains(&StoreEvent::ToggleCommitted {
            kind: RelationKind::Confirm,
            event_id: EventId(2),
            member: true,
        }));
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected_before_any_call() {
        let (state, api, _) = attendance();

        assert!(matches!(
            state.toggle(USER, EventId(0)),
            Err(AgendaError::Validation(_))
        ));
        assert!(matches!(
            state.toggle(UserId(-1), EventId(3)),
            Err(AgendaError::Validation(_))
        ));
        assert!(matches!(
            state.load(UserId(0)).await,
            Err(AgendaError::Validation(_))
        ));
        assert!(api.calls().is_empty());
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn toggle_for_another_user_is_rejected() {
        let (state, api, _) = attendance();
        state.load(USER).await.unwrap();

        let result = state.toggle(UserId(2), EventId(3));

        assert!(matches!(result, Err(AgendaError::Validation(_))));
        assert!(api.mutation_calls().is_empty());
    }

    #[tokio::test]
    async fn switching_users_does_not_leak_previous_set() {
        let (state, api, notifier) = attendance();
        api.set_related_ids(RelationKind::Confirm, UserId(1), &[1, 2]);
        api.set_related_ids(RelationKind::Confirm, UserId(2), &[3]);
        state.load(UserId(1)).await.unwrap();
        let mut screen = notifier.subscribe();

        state.load(UserId(2)).await.unwrap();

        assert_eq!(state.snapshot(), HashSet::from([EventId(3)]));
        assert_eq!(state.owner(), Some(UserId(2)));
        assert_eq!(
            screen.try_recv(),
            Some(StoreEvent::RelationCleared {
                kind: RelationKind::Confirm
            })
        );
    }

    #[tokio::test]
    async fn reset_discards_answers_still_in_flight() {
        let (state, api, _) = attendance();
        state.load(USER).await.unwrap();
        api.hold_mutations();

        let pending = state.toggle(USER, EventId(5)).unwrap();
        api.wait_for_held_mutations(1).await;
        state.reset();
        api.release_mutation(0, Err(AgendaError::Network("timeout".into())));

        assert!(matches!(pending.settled().await, ToggleOutcome::Discarded));
        assert!(state.is_empty());
        assert_eq!(state.owner(), None);
    }

    #[tokio::test]
    async fn reload_keeps_optimistic_value_of_pending_toggle() {
        let (state, api, _) = attendance();
        api.set_related_ids(RelationKind::Confirm, USER, &[1]);
        state.load(USER).await.unwrap();
        api.hold_mutations();

        let pending = state.toggle(USER, EventId(5)).unwrap();
        api.wait_for_held_mutations(1).await;
        state.load(USER).await.unwrap();

        assert!(state.contains(EventId(1)));
        assert!(state.contains(EventId(5)));

        api.release_mutation(0, Ok(()));
        assert!(pending.settled().await.is_committed());
        assert!(state.contains(EventId(5)));
    }

    #[tokio::test]
    async fn unmounted_screen_does_not_cancel_toggle() {
        let (state, api, notifier) = attendance();
        state.load(USER).await.unwrap();
        let screen = notifier.subscribe();

        let pending = state.toggle(USER, EventId(6)).unwrap();
        drop(screen);

        assert!(pending.settled().await.is_committed());
        assert_eq!(api.related_ids(RelationKind::Confirm, USER), vec![EventId(6)]);
    }

    #[tokio::test]
    async fn slow_reload_does_not_revert_committed_toggle() {
        let (state, api, _) = attendance();
        state.load(USER).await.unwrap();
        api.hold_related();

        let reload = tokio::spawn({
            let state = state.clone();
            async move { state.load(USER).await }
        });
        api.wait_for_held_related(1).await;

        let outcome = state.toggle(USER, EventId(5)).unwrap().settled().await;
        assert!(outcome.is_committed());
        assert_eq!(api.related_ids(RelationKind::Confirm, USER), vec![EventId(5)]);

        // Answer computed before the toggle reached the server.
        api.release_related(0, Ok(vec![]));
        reload.await.unwrap().unwrap();

        assert!(state.contains(EventId(5)));
        assert!(!state.is_stale());
    }

    #[tokio::test]
    async fn slow_reload_still_applies_other_events() {
        let (state, api, _) = attendance();
        state.load(USER).await.unwrap();
        api.hold_related();

        let reload = tokio::spawn({
            let state = state.clone();
            async move { state.load(USER).await }
        });
        api.wait_for_held_related(1).await;
        state
            .toggle(USER, EventId(5))
            .unwrap()
            .settled()
            .await;

        api.release_related(0, Ok(vec![EventId(9)]));
        reload.await.unwrap().unwrap();

        assert_eq!(state.snapshot(), HashSet::from([EventId(5), EventId(9)]));
    }

    #[tokio::test]
    async fn reload_after_settlement_uses_server_answer() {
        let (state, api, _) = attendance();
        state.load(USER).await.unwrap();
        state
            .toggle(USER, EventId(5))
            .unwrap()
            .settled()
            .await;

        // Removed elsewhere, e.g. from another device.
        api.set_related_ids(RelationKind::Confirm, USER, &[]);
        state.load(USER).await.unwrap();

        assert!(!state.contains(EventId(5)));
    }

    #[tokio::test]
    async fn failed_load_is_announced() {
        let (state, api, notifier) = attendance();
        let mut screen = notifier.subscribe();
        api.fail_next_related(AgendaError::NotFound("/users/1/confirmed-events".into()));

        assert!(state.load(USER).await.is_err());

        assert!(screen.drain().iter().any(|e| matches!(
            e,
            StoreEvent::RelationLoadFailed {
                kind: RelationKind::Confirm,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn prune_drops_unknown_settled_members() {
        let (state, api, _) = attendance();
        api.set_related_ids(RelationKind::Confirm, USER, &[1, 2, 9]);
        state.load(USER).await.unwrap();

        state.prune(&HashSet::from([EventId(1), EventId(2)]));

        assert_eq!(state.snapshot(), HashSet::from([EventId(1), EventId(2)]));
    }
}
