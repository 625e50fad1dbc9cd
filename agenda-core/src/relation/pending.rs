//! Bookkeeping for relation toggles that are still waiting on the backend.
//!
//! Every toggle gets a sequence number. Per event the ledger remembers the
//! newest toggle (the user's latest intent), the membership the server is
//! believed to hold, and which toggles are still in flight. A response only
//! decides what the user sees once the newest toggle has settled; before
//! that, the newest optimistic value stays on screen.
//!
//! A rollback lands on the server-believed membership, not on the value just
//! before the failed toggle. If the newest toggle fails while an older one is
//! still in flight, the shown value can flip again when the older one
//! commits, because the server then holds that older target.
//!
//! Reloads register with [`PendingLedger::begin_load`]. Toggles that settle
//! while a reload is outstanding are remembered, so the reload's possibly
//! older answer does not overwrite them.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::event::EventId;

/// Handle for one issued toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub event_id: EventId,
    pub seq: u64,
    /// Membership this toggle asks the backend for.
    pub target: bool,
}

/// What a settled toggle means for the visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Settlement {
    /// Membership to show now.
    pub display: bool,
    /// Whether the settled toggle was the newest one for its event.
    pub is_head: bool,
}

#[derive(Debug)]
struct PendingEntry {
    head: u64,
    head_target: bool,
    /// Server-believed membership and the toggle that established it
    /// (0 = the value before any toggle in this entry).
    baseline: bool,
    baseline_seq: u64,
    in_flight: BTreeMap<u64, bool>,
}

impl PendingEntry {
    fn display(&self) -> bool {
        if self.in_flight.contains_key(&self.head) {
            self.head_target
        } else {
            self.baseline
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PendingLedger {
    next_seq: u64,
    entries: HashMap<EventId, PendingEntry>,
    /// Bumped on every settlement; reloads remember its value at start.
    settle_clock: u64,
    /// Settlement stamp per event, kept only while reloads are outstanding.
    recently_settled: HashMap<EventId, u64>,
    /// Start marks of outstanding reloads, with multiplicity.
    active_loads: BTreeMap<u64, usize>,
}

impl PendingLedger {
    /// Record a toggle of `event_id` whose membership is currently `current`.
    pub fn begin(&mut self, event_id: EventId, current: bool) -> Ticket {
        self.next_seq += 1;
        let seq = self.next_seq;
        let target = !current;

        let entry = self.entries.entry(event_id).or_insert_with(|| PendingEntry {
            head: 0,
            head_target: current,
            baseline: current,
            baseline_seq: 0,
            in_flight: BTreeMap::new(),
        });
        entry.head = seq;
        entry.head_target = target;
        entry.in_flight.insert(seq, target);

        Ticket {
            event_id,
            seq,
            target,
        }
    }

    /// Settle a toggle. `accepted` means the backend now holds `ticket.target`.
    /// Returns `None` if the ticket is unknown (the ledger was cleared).
    pub fn settle(&mut self, ticket: &Ticket, accepted: bool) -> Option<Settlement> {
        let entry = self.entries.get_mut(&ticket.event_id)?;
        entry.in_flight.remove(&ticket.seq)?;

        if accepted && ticket.seq > entry.baseline_seq {
            entry.baseline = ticket.target;
            entry.baseline_seq = ticket.seq;
        }

        let settlement = Settlement {
            display: entry.display(),
            is_head: ticket.seq == entry.head,
        };

        if entry.in_flight.is_empty() {
            self.entries.remove(&ticket.event_id);
        }

        self.settle_clock += 1;
        if !self.active_loads.is_empty() {
            self.recently_settled
                .insert(ticket.event_id, self.settle_clock);
        }
        Some(settlement)
    }

    /// Register a reload. Returns the mark to pass to
    /// [`PendingLedger::settled_since`] and [`PendingLedger::finish_load`].
    pub fn begin_load(&mut self) -> u64 {
        let mark = self.settle_clock;
        *self.active_loads.entry(mark).or_default() += 1;
        mark
    }

    /// Events whose toggles settled after the reload with `mark` started.
    pub fn settled_since(&self, mark: u64) -> HashSet<EventId> {
        self.recently_settled
            .iter()
            .filter(|(_, stamp)| **stamp > mark)
            .map(|(event_id, _)| *event_id)
            .collect()
    }

    pub fn finish_load(&mut self, mark: u64) {
        if let Some(count) = self.active_loads.get_mut(&mark) {
            *count -= 1;
            if *count == 0 {
                self.active_loads.remove(&mark);
            }
        }

        match self.active_loads.keys().next().copied() {
            Some(oldest) => self.recently_settled.retain(|_, stamp| *stamp > oldest),
            None => self.recently_settled.clear(),
        }
    }

    /// A reload reported `fetched` as the server membership of `event_id`.
    /// Returns the membership to show, or `None` if nothing is pending for it.
    pub fn rebase(&mut self, event_id: EventId, fetched: bool) -> Option<bool> {
        let entry = self.entries.get_mut(&event_id)?;
        entry.baseline = fetched;
        Some(entry.display())
    }

    pub fn contains(&self, event_id: EventId) -> bool {
        self.entries.contains_key(&event_id)
    }

    pub fn event_ids(&self) -> Vec<EventId> {
        self.entries.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recently_settled.clear();
        self.active_loads.clear();
    }
}
