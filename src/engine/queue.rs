use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::audit::AuditLog;
use crate::error::ValidationError;
use crate::models::matching::{Match, StatusView};
use crate::models::request::{EntryStatus, NewRideRequest, QueueEntry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("ride request {0} is not being matched")]
    NotMatching(Uuid),

    #[error("partner ride request {0} is no longer queued")]
    PartnerUnavailable(Uuid),
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Matched {
        match_id: Uuid,
        matched_with: Uuid,
        at: DateTime<Utc>,
    },
    TimedOut {
        at: DateTime<Utc>,
    },
}

#[derive(Default)]
struct QueueState {
    // Keyed by arrival sequence so iteration is insertion order.
    entries: BTreeMap<u64, QueueEntry>,
    index: HashMap<Uuid, u64>,
    outcomes: HashMap<Uuid, Outcome>,
    // Oldest first; trimmed to the retention limit.
    outcome_order: VecDeque<Uuid>,
    next_seq: u64,
}

impl QueueState {
    fn get(&self, id: &Uuid) -> Option<&QueueEntry> {
        self.index.get(id).and_then(|seq| self.entries.get(seq))
    }

    fn get_mut(&mut self, id: &Uuid) -> Option<&mut QueueEntry> {
        let seq = self.index.get(id)?;
        self.entries.get_mut(seq)
    }

    fn take(&mut self, id: &Uuid) -> Option<QueueEntry> {
        let seq = self.index.remove(id)?;
        self.entries.remove(&seq)
    }

    fn record_outcome(&mut self, id: Uuid, outcome: Outcome, retention: usize) {
        if self.outcomes.insert(id, outcome).is_none() {
            self.outcome_order.push_back(id);
        }
        while self.outcome_order.len() > retention {
            if let Some(oldest) = self.outcome_order.pop_front() {
                self.outcomes.remove(&oldest);
            }
        }
    }
}

/// Pending ride requests and the lifecycle state of each.
///
/// All mutations go through a single write lock; every method holds it only
/// for the metadata change, never across distance lookups. Terminal outcomes
/// are remembered after removal so callers can keep polling, up to
/// `retention` of them; past that the oldest are forgotten and report
/// `NotFound`.
pub struct RequestQueue {
    state: RwLock<QueueState>,
    audit: Arc<AuditLog>,
    retention: usize,
}

impl RequestQueue {
    pub fn new(audit: Arc<AuditLog>, retention: usize) -> Self {
        Self {
            state: RwLock::new(QueueState::default()),
            audit,
            retention: retention.max(1),
        }
    }

    pub fn enqueue(
        &self,
        request: NewRideRequest,
        now: DateTime<Utc>,
        max_matching: Duration,
    ) -> Result<QueueEntry, ValidationError> {
        let request = request.validate(now, max_matching)?;
        let id = request.id;

        let (entry, queue_size) = {
            let mut state = self.write();
            if state.index.contains_key(&id) || state.outcomes.contains_key(&id) {
                return Err(ValidationError::DuplicateId(id));
            }

            let seq = state.next_seq;
            state.next_seq += 1;

            let entry = QueueEntry::new(request);
            state.index.insert(id, seq);
            state.entries.insert(seq, entry.clone());
            (entry, state.entries.len())
        };

        self.audit.info(
            "ride added to matching queue",
            json!({
                "request_id": id,
                "vehicle_type": entry.request.vehicle_type,
                "pickup": entry.request.pickup.address,
                "dropoff": entry.request.dropoff.address,
                "queue_size": queue_size,
            }),
        );

        Ok(entry)
    }

    pub fn status(&self, id: Uuid, now: DateTime<Utc>) -> StatusView {
        let state = self.read();

        if let Some(entry) = state.get(&id) {
            let requested_at = entry.request.requested_at;
            let attempts = entry.attempts;
            let last_attempt_at = entry.last_attempt_at;
            let remaining_secs = (entry.request.deadline - now).num_seconds().max(0);

            return match entry.status {
                EntryStatus::Matching => StatusView::Matching {
                    requested_at,
                    attempts,
                    last_attempt_at,
                    remaining_secs,
                },
                _ => StatusView::Queued {
                    requested_at,
                    attempts,
                    last_attempt_at,
                    remaining_secs,
                },
            };
        }

        match state.outcomes.get(&id) {
            Some(Outcome::Matched {
                match_id,
                matched_with,
                at,
            }) => StatusView::Matched {
                match_id: *match_id,
                matched_with: *matched_with,
                at: *at,
            },
            Some(Outcome::TimedOut { at }) => StatusView::TimedOut { at: *at },
            None => StatusView::NotFound,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<QueueEntry> {
        self.read().get(&id).cloned()
    }

    /// Drops an entry without recording an outcome. Removing an id that is
    /// not present is a no-op apart from an audit error.
    pub fn remove(&self, id: Uuid) -> Option<QueueEntry> {
        let removed = self.write().take(&id);
        if removed.is_none() {
            self.audit.error(
                "attempted to remove unknown ride request",
                json!({ "request_id": id }),
            );
        }
        removed
    }

    /// `Queued` entries in arrival order, read under one lock acquisition.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.read()
            .entries
            .values()
            .filter(|entry| entry.status == EntryStatus::Queued)
            .cloned()
            .collect()
    }

    /// `Queued -> Matching`. Returns false if the entry is gone or not queued.
    pub fn begin_matching(&self, id: Uuid) -> bool {
        let mut state = self.write();
        match state.get_mut(&id) {
            Some(entry) if entry.status == EntryStatus::Queued => {
                entry.status = EntryStatus::Matching;
                true
            }
            _ => false,
        }
    }

    /// `Matching -> Queued`, counting the failed attempt.
    pub fn requeue(&self, id: Uuid, now: DateTime<Utc>) -> Option<QueueEntry> {
        let mut state = self.write();
        let entry = state.get_mut(&id)?;
        if entry.status != EntryStatus::Matching {
            return None;
        }

        entry.status = EntryStatus::Queued;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_attempt_at = Some(now);
        Some(entry.clone())
    }

    /// Removes both sides of a match in one critical section. `request_a`
    /// must be `Matching` and `request_b` still `Queued`, otherwise nothing
    /// changes.
    pub fn commit_match(&self, record: &Match) -> Result<(QueueEntry, QueueEntry), CommitError> {
        let mut state = self.write();

        match state.get(&record.request_a) {
            Some(entry) if entry.status == EntryStatus::Matching => {}
            _ => return Err(CommitError::NotMatching(record.request_a)),
        }
        match state.get(&record.request_b) {
            Some(entry) if entry.status == EntryStatus::Queued => {}
            _ => return Err(CommitError::PartnerUnavailable(record.request_b)),
        }

        let (Some(mut a), Some(mut b)) = (
            state.take(&record.request_a),
            state.take(&record.request_b),
        ) else {
            return Err(CommitError::NotMatching(record.request_a));
        };

        a.status = EntryStatus::Matched;
        b.status = EntryStatus::Matched;

        state.record_outcome(
            a.id(),
            Outcome::Matched {
                match_id: record.id,
                matched_with: b.id(),
                at: record.created_at,
            },
            self.retention,
        );
        state.record_outcome(
            b.id(),
            Outcome::Matched {
                match_id: record.id,
                matched_with: a.id(),
                at: record.created_at,
            },
            self.retention,
        );

        Ok((a, b))
    }

    /// Reaps a live entry to `TimedOut`. Returns `None` if it already left the
    /// queue.
    pub fn expire(&self, id: Uuid, now: DateTime<Utc>) -> Option<QueueEntry> {
        let mut state = self.write();
        let status = state.get(&id)?.status;
        if status.is_terminal() {
            return None;
        }

        let mut entry = state.take(&id)?;
        entry.status = EntryStatus::TimedOut;
        state.record_outcome(id, Outcome::TimedOut { at: now }, self.retention);
        Some(entry)
    }

    /// Ids of live entries whose deadline has passed, in arrival order.
    pub fn expired_ids(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.read()
            .entries
            .values()
            .filter(|entry| !entry.status.is_terminal() && entry.is_expired(now))
            .map(QueueEntry::id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, QueueState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
