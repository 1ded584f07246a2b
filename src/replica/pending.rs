use crate::actor::Callback;
use crate::api::{OperationAck, OperationError};
use crate::replicator::ReplicatorId;
use std::collections::{HashMap, HashSet};
use tokio::time::Instant;

/// One in-flight mutation on the primary: what still has to happen before
/// the client is acknowledged, and when to give up.
pub(crate) struct PendingAck {
    id: i64,
    /// Absent when nothing is waiting on the outcome.
    reply_to: Option<Callback<OperationAck, OperationError>>,
    persisted: bool,
    awaiting_replicators: HashSet<ReplicatorId>,
    deadline: Instant,
}

impl PendingAck {
    pub(crate) fn new(
        id: i64,
        reply_to: Option<Callback<OperationAck, OperationError>>,
        awaiting_replicators: HashSet<ReplicatorId>,
        deadline: Instant,
    ) -> Self {
        PendingAck {
            id,
            reply_to,
            persisted: false,
            awaiting_replicators,
            deadline,
        }
    }

    pub(crate) fn id(&self) -> i64 {
        self.id
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    pub(crate) fn clear_replicator(&mut self, replicator_id: ReplicatorId) {
        self.awaiting_replicators.remove(&replicator_id);
    }

    pub(crate) fn await_replicator(&mut self, replicator_id: ReplicatorId) {
        self.awaiting_replicators.insert(replicator_id);
    }

    /// Both halves are done: the local write is durable and no replicator
    /// confirmation is outstanding.
    pub(crate) fn is_satisfied(&self) -> bool {
        self.persisted && self.awaiting_replicators.is_empty()
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub(crate) fn complete(self) {
        if let Some(reply_to) = self.reply_to {
            reply_to.send(Ok(OperationAck { id: self.id }));
        }
    }

    pub(crate) fn fail(self, error: OperationError) {
        if let Some(reply_to) = self.reply_to {
            reply_to.send(Err(error));
        }
    }
}

/// The primary's table of in-flight mutations, at most one per key.
pub(crate) struct PendingAckTable {
    entries: HashMap<String, PendingAck>,
}

impl PendingAckTable {
    pub(crate) fn new() -> Self {
        PendingAckTable {
            entries: HashMap::new(),
        }
    }

    /// Opens a pending entry for `key`. Returns the superseded entry if one
    /// was still in flight.
    pub(crate) fn open(&mut self, key: String, entry: PendingAck) -> Option<PendingAck> {
        self.entries.insert(key, entry)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut PendingAck> {
        self.entries.get_mut(key)
    }

    /// Removes and returns `key`'s entry iff it is satisfied.
    pub(crate) fn take_satisfied(&mut self, key: &str) -> Option<PendingAck> {
        let satisfied = self.entries.get(key).map(PendingAck::is_satisfied).unwrap_or(false);
        if satisfied {
            self.entries.remove(key)
        } else {
            None
        }
    }

    /// Removes and returns every satisfied entry.
    pub(crate) fn drain_satisfied(&mut self) -> Vec<(String, PendingAck)> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_satisfied())
            .map(|(key, _)| key.clone())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|entry| (key, entry)))
            .collect()
    }

    /// Removes and returns every entry whose deadline has passed.
    pub(crate) fn drain_expired(&mut self, now: Instant) -> Vec<(String, PendingAck)> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|entry| (key, entry)))
            .collect()
    }

    /// Stops waiting on the given replicators across all entries. Used when
    /// their secondaries depart; the entries' deadlines are left untouched.
    pub(crate) fn discharge_replicators(&mut self, departed: &HashSet<ReplicatorId>) {
        for entry in self.entries.values_mut() {
            for replicator_id in departed {
                entry.awaiting_replicators.remove(replicator_id);
            }
        }
    }
}
