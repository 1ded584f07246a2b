use crate::actor::{Callback, Event};
use crate::api::{GetError, GetOutput, OperationError};
use crate::persistence::PersistenceClient;
use crate::replicator::{SnapshotAckHandle, SnapshotRequest};
use std::collections::HashMap;

/// A snapshot that is applied to the local map but not yet locally durable.
/// The ack is withheld until persistence answers; the replicator keeps
/// retransmitting in the meantime.
struct InFlightSnapshot {
    key: String,
    value: Option<String>,
    seq: u64,
    ack_to: SnapshotAckHandle,
}

/// A secondary consumes its replicator's snapshot stream in strict seq
/// order and serves reads from whatever prefix it has applied.
pub(crate) struct SecondaryReplica {
    logger: slog::Logger,
    store: HashMap<String, String>,
    persistence: PersistenceClient,
    expected_seq: u64,
    in_flight: Option<InFlightSnapshot>,
}

impl SecondaryReplica {
    pub(crate) fn new(logger: slog::Logger, persistence: PersistenceClient) -> Self {
        SecondaryReplica {
            logger,
            store: HashMap::new(),
            persistence,
            expected_seq: 0,
            in_flight: None,
        }
    }

    pub(crate) fn handle_event(&mut self, event: Event) {
        match event {
            Event::Insert { id, cb, .. } | Event::Remove { id, cb, .. } => {
                slog::debug!(self.logger, "Rejecting mutation {}: not the primary", id);
                cb.send(Err(OperationError::NotPrimary));
            }
            Event::Get { key, id, cb } => self.handle_get(key, id, cb),
            Event::Snapshot(request) => self.handle_snapshot(request),
            Event::Persisted { key, token } => self.handle_persisted(key, token),
            Event::Tick => self.handle_tick(),
            Event::ReplicaSetChanged { .. } => {
                slog::debug!(self.logger, "Discarding replica-set update: not the primary");
            }
            Event::Replicated { key, id, .. } => {
                slog::debug!(self.logger, "Discarding Replicated for key '{}' (operation {})", key, id);
            }
        }
    }

    fn handle_get(&self, key: String, id: i64, cb: Callback<GetOutput, GetError>) {
        let value = self.store.get(&key).cloned();
        cb.send(Ok(GetOutput { key, value, id }));
    }

    fn handle_snapshot(&mut self, request: SnapshotRequest) {
        if self.in_flight.is_some() {
            // Busy persisting the current seq. The replicator's retransmission
            // will deliver this one again once we have moved on.
            slog::trace!(self.logger, "Ignoring snapshot seq {} while persisting", request.seq);
            return;
        }

        if request.seq < self.expected_seq {
            // Already applied; the ack was lost or is still in flight.
            request.ack_to.ack(request.key, request.seq);
            return;
        }

        if request.seq > self.expected_seq {
            // Never apply out of order. The missing seq is retransmitted by
            // its replicator until it lands.
            slog::trace!(
                self.logger,
                "Ignoring out-of-order snapshot seq {} (expecting {})",
                request.seq,
                self.expected_seq
            );
            return;
        }

        match &request.value {
            Some(value) => {
                self.store.insert(request.key.clone(), value.clone());
            }
            None => {
                self.store.remove(&request.key);
            }
        }

        self.persistence
            .persist(request.key.clone(), request.value.clone(), request.seq as i64);
        self.in_flight = Some(InFlightSnapshot {
            key: request.key,
            value: request.value,
            seq: request.seq,
            ack_to: request.ack_to,
        });
    }

    fn handle_persisted(&mut self, key: String, token: i64) {
        match self.in_flight.take() {
            Some(snapshot) if snapshot.key == key && snapshot.seq as i64 == token => {
                snapshot.ack_to.ack(snapshot.key, snapshot.seq);
                self.expected_seq = snapshot.seq + 1;
            }
            other => {
                slog::trace!(self.logger, "Ignoring Persisted for key '{}' (token {})", key, token);
                self.in_flight = other;
            }
        }
    }

    fn handle_tick(&mut self) {
        // Unbounded retry: a snapshot is a sequence point, not a deadline
        // point.
        if let Some(snapshot) = &self.in_flight {
            self.persistence
                .persist(snapshot.key.clone(), snapshot.value.clone(), snapshot.seq as i64);
        }
    }
}
