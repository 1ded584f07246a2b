use crate::actor::{Callback, Event, WeakActorClient};
use crate::api::{GetError, GetOutput, MemberInfo, OperationAck, OperationError};
use crate::persistence::PersistenceClient;
use crate::replica::peers::{NodeId, SecondaryTracker};
use crate::replica::pending::{PendingAck, PendingAckTable};
use crate::replicator::{ReplicateRequest, Replicator, ReplicatorId, SYNTHETIC_OPERATION_ID};
use std::collections::{HashMap, HashSet};
use tokio::time::{Duration, Instant};

pub(crate) struct PrimaryConfig {
    pub logger: slog::Logger,
    pub my_node_id: NodeId,
    pub persistence: PersistenceClient,
    pub actor_client: WeakActorClient,
    pub operation_timeout: Duration,
    pub replication_retry_interval: Duration,
}

/// The primary owns the authoritative map. Every mutation is written to the
/// local map immediately, then held open in the pending table until local
/// persistence and every current replicator have confirmed, or the deadline
/// passes.
pub(crate) struct PrimaryReplica {
    logger: slog::Logger,
    my_node_id: NodeId,
    store: HashMap<String, String>,
    persistence: PersistenceClient,
    actor_client: WeakActorClient,
    secondaries: SecondaryTracker,
    pending: PendingAckTable,
    operation_timeout: Duration,
    replication_retry_interval: Duration,
    next_replicator_id: u64,
}

impl PrimaryReplica {
    pub(crate) fn new(config: PrimaryConfig) -> Self {
        PrimaryReplica {
            logger: config.logger,
            my_node_id: config.my_node_id,
            store: HashMap::new(),
            persistence: config.persistence,
            actor_client: config.actor_client,
            secondaries: SecondaryTracker::new(),
            pending: PendingAckTable::new(),
            operation_timeout: config.operation_timeout,
            replication_retry_interval: config.replication_retry_interval,
            next_replicator_id: 0,
        }
    }

    pub(crate) fn handle_event(&mut self, event: Event) {
        match event {
            Event::Insert { key, value, id, cb } => self.handle_update(key, Some(value), id, cb),
            Event::Remove { key, id, cb } => self.handle_update(key, None, id, cb),
            Event::Get { key, id, cb } => self.handle_get(key, id, cb),
            Event::ReplicaSetChanged { members } => self.handle_replica_set_changed(members),
            Event::Persisted { key, token } => self.handle_persisted(key, token),
            Event::Replicated { key, id, replicator_id } => self.handle_replicated(key, id, replicator_id),
            Event::Snapshot(request) => {
                slog::warn!(self.logger, "Discarding snapshot addressed to the primary: {:?}", request);
            }
            Event::Tick => {}
        }

        // Deadlines are enforced on every event, not only on ticks.
        self.sweep_deadlines();
    }

    fn handle_update(&mut self, key: String, value: Option<String>, id: i64, cb: Callback<OperationAck, OperationError>) {
        match &value {
            Some(value) => {
                self.store.insert(key.clone(), value.clone());
            }
            None => {
                self.store.remove(&key);
            }
        }

        let entry = PendingAck::new(
            id,
            Some(cb),
            self.secondaries.replicator_ids(),
            Instant::now() + self.operation_timeout,
        );
        if let Some(superseded) = self.pending.open(key.clone(), entry) {
            let superseded_id = superseded.id();
            slog::debug!(
                self.logger,
                "Operation {} on key '{}' supersedes still-pending operation {}",
                id,
                key,
                superseded_id
            );
            superseded.fail(OperationError::Superseded { id: superseded_id });
        }

        for replicator in self.secondaries.iter_replicators() {
            replicator.replicate(ReplicateRequest {
                key: key.clone(),
                value: value.clone(),
                id,
            });
        }

        self.persistence.persist(key, value, id);
        // With no secondaries the entry still waits for local persistence.
    }

    fn handle_get(&self, key: String, id: i64, cb: Callback<GetOutput, GetError>) {
        let value = self.store.get(&key).cloned();
        cb.send(Ok(GetOutput { key, value, id }));
    }

    fn handle_persisted(&mut self, key: String, token: i64) {
        match self.pending.get_mut(&key) {
            Some(entry) => entry.mark_persisted(),
            None => {
                // Late ack for an already-settled or superseded operation.
                slog::trace!(self.logger, "Ignoring Persisted for key '{}' (token {})", key, token);
                return;
            }
        }

        self.try_complete(&key);
    }

    fn handle_replicated(&mut self, key: String, id: i64, replicator_id: ReplicatorId) {
        match self.pending.get_mut(&key) {
            Some(entry) => entry.clear_replicator(replicator_id),
            None => {
                slog::trace!(
                    self.logger,
                    "Ignoring Replicated for key '{}' (operation {}) from {:?}",
                    key,
                    id,
                    replicator_id
                );
                return;
            }
        }

        self.try_complete(&key);
    }

    fn handle_replica_set_changed(&mut self, members: Vec<MemberInfo>) {
        let new_set: HashMap<NodeId, MemberInfo> = members
            .into_iter()
            .map(|member| (NodeId::new(&member.node_id), member))
            .filter(|(node_id, _)| *node_id != self.my_node_id)
            .collect();

        // Departures first: pending operations must never block on a replica
        // that no longer exists.
        let departed: Vec<NodeId> = self
            .secondaries
            .node_ids()
            .into_iter()
            .filter(|node_id| !new_set.contains_key(node_id))
            .collect();

        let mut departed_replicators = HashSet::new();
        for node_id in departed {
            if let Some(replicator) = self.secondaries.remove(&node_id) {
                slog::info!(self.logger, "Secondary {:?} departed, stopping {:?}", node_id, replicator.id());
                departed_replicators.insert(replicator.id());
                replicator.stop();
            }
        }

        if !departed_replicators.is_empty() {
            self.pending.discharge_replicators(&departed_replicators);
            for (key, entry) in self.pending.drain_satisfied() {
                slog::debug!(self.logger, "Operation {} on key '{}' acknowledged", entry.id(), key);
                entry.complete();
            }
        }

        for (node_id, member) in new_set {
            if self.secondaries.contains(&node_id) {
                continue;
            }
            self.handle_joined_secondary(node_id, member);
        }
    }

    fn handle_joined_secondary(&mut self, node_id: NodeId, member: MemberInfo) {
        let replicator_id = ReplicatorId::new(self.next_replicator_id);
        self.next_replicator_id += 1;

        slog::info!(self.logger, "Secondary {:?} joined, spawning {:?}", node_id, replicator_id);
        let replicator_logger = self.logger.new(slog::o!(
            "ReplicatorId" => replicator_id.as_u64(),
            "SecondaryId" => node_id.as_str().to_string(),
        ));
        let replicator = Replicator::spawn(
            replicator_logger,
            replicator_id,
            self.actor_client.clone(),
            member.link.client.clone(),
            self.replication_retry_interval,
        );

        // Bring the joiner up to date with the whole current map. Entries
        // with an operation still pending ride under that operation's id and
        // extend its wait to the new replicator; the rest are fire-and-forget.
        for (key, value) in &self.store {
            let id = match self.pending.get_mut(key) {
                Some(entry) => {
                    entry.await_replicator(replicator_id);
                    entry.id()
                }
                None => SYNTHETIC_OPERATION_ID,
            };
            replicator.replicate(ReplicateRequest {
                key: key.clone(),
                value: Some(value.clone()),
                id,
            });
        }

        self.secondaries.insert(node_id, replicator);
    }

    fn try_complete(&mut self, key: &str) {
        if let Some(entry) = self.pending.take_satisfied(key) {
            slog::debug!(self.logger, "Operation {} on key '{}' acknowledged", entry.id(), key);
            entry.complete();
        }
    }

    fn sweep_deadlines(&mut self) {
        for (key, entry) in self.pending.drain_expired(Instant::now()) {
            let id = entry.id();
            slog::warn!(self.logger, "Operation {} on key '{}' missed its deadline", id, key);
            entry.fail(OperationError::Timeout { id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::api::ReplicaLink;
    use crate::persistence::PersistRequest;
    use crate::replicator::SnapshotRequest;
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::timeout;

    type ReplyReceiver = oneshot::Receiver<Result<OperationAck, OperationError>>;

    const RECV_WINDOW: Duration = Duration::from_secs(1);

    struct Harness {
        primary: PrimaryReplica,
        primary_rx: mpsc::Receiver<Event>,
        persist_rx: mpsc::UnboundedReceiver<PersistRequest>,
        // Keeps the primary's weak self-reference upgradable.
        _primary_client: ActorClient,
    }

    impl Harness {
        fn new() -> Self {
            let logger = slog::Logger::root(slog::Discard, slog::o!());
            let (primary_client, primary_rx) = ActorClient::new(32);
            let (persistence, persist_rx) = PersistenceClient::test_channel();

            let primary = PrimaryReplica::new(PrimaryConfig {
                logger,
                my_node_id: NodeId::new("primary"),
                persistence,
                actor_client: primary_client.weak(),
                operation_timeout: Duration::from_millis(1000),
                replication_retry_interval: Duration::from_millis(100),
            });

            Harness {
                primary,
                primary_rx,
                persist_rx,
                _primary_client: primary_client,
            }
        }

        fn insert(&mut self, key: &str, value: &str, id: i64) -> ReplyReceiver {
            let (tx, rx) = oneshot::channel();
            self.primary.handle_event(Event::Insert {
                key: key.to_string(),
                value: value.to_string(),
                id,
                cb: Callback::new(tx),
            });
            rx
        }

        fn remove(&mut self, key: &str, id: i64) -> ReplyReceiver {
            let (tx, rx) = oneshot::channel();
            self.primary.handle_event(Event::Remove {
                key: key.to_string(),
                id,
                cb: Callback::new(tx),
            });
            rx
        }

        fn get(&mut self, key: &str, id: i64) -> oneshot::Receiver<Result<GetOutput, GetError>> {
            let (tx, rx) = oneshot::channel();
            self.primary.handle_event(Event::Get {
                key: key.to_string(),
                id,
                cb: Callback::new(tx),
            });
            rx
        }

        fn set_members(&mut self, members: Vec<MemberInfo>) {
            self.primary.handle_event(Event::ReplicaSetChanged { members });
        }

        /// Confirms the next local persist request back into the primary.
        async fn ack_local_persist(&mut self) {
            let request = timeout(RECV_WINDOW, self.persist_rx.recv())
                .await
                .expect("expected a persist request")
                .expect("persistence channel open");
            self.primary.handle_event(Event::Persisted {
                key: request.key,
                token: request.token,
            });
        }

        /// Waits for one replicator-originated event and feeds it to the
        /// primary, returning a copy of what it was.
        async fn pump_replicator_event(&mut self) -> (String, i64) {
            let event = timeout(RECV_WINDOW, self.primary_rx.recv())
                .await
                .expect("expected a replicator event")
                .expect("primary channel open");
            match &event {
                Event::Replicated { key, id, .. } => {
                    let observed = (key.clone(), *id);
                    self.primary.handle_event(event);
                    observed
                }
                unexpected => panic!("unexpected event: {:?}", unexpected),
            }
        }
    }

    fn member(node_id: &str) -> (MemberInfo, mpsc::Receiver<Event>) {
        let (client, rx) = ActorClient::new(32);
        (
            MemberInfo {
                node_id: node_id.to_string(),
                link: ReplicaLink { client },
            },
            rx,
        )
    }

    fn self_member(harness: &Harness) -> MemberInfo {
        MemberInfo {
            node_id: "primary".to_string(),
            link: ReplicaLink {
                client: harness._primary_client.clone(),
            },
        }
    }

    async fn expect_snapshot(rx: &mut mpsc::Receiver<Event>) -> SnapshotRequest {
        match timeout(RECV_WINDOW, rx.recv()).await {
            Ok(Some(Event::Snapshot(request))) => request,
            other => panic!("expected a snapshot, got {:?}", other),
        }
    }

    fn assert_unresolved(rx: &mut ReplyReceiver) {
        assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn acks_only_after_persist_and_replication() {
        let mut harness = Harness::new();
        let (s1, mut s1_rx) = member("s1");
        harness.set_members(vec![self_member(&harness), s1]);

        let mut reply = harness.insert("k", "v", 10);

        harness.ack_local_persist().await;
        assert_unresolved(&mut reply);

        let snapshot = expect_snapshot(&mut s1_rx).await;
        assert_eq!(snapshot.seq, 0);
        snapshot.ack_to.ack(snapshot.key, snapshot.seq);
        let (key, id) = harness.pump_replicator_event().await;
        assert_eq!((key.as_str(), id), ("k", 10));

        assert_eq!(reply.await.unwrap(), Ok(OperationAck { id: 10 }));
    }

    #[tokio::test(start_paused = true)]
    async fn acks_after_persist_alone_without_secondaries() {
        let mut harness = Harness::new();

        let reply = harness.insert("a", "1", 1);
        harness.ack_local_persist().await;

        assert_eq!(reply.await.unwrap(), Ok(OperationAck { id: 1 }));

        let lookup = harness.get("a", 2).await.unwrap().unwrap();
        assert_eq!(lookup.value, Some("1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_applies_locally_before_acknowledgement() {
        let mut harness = Harness::new();

        let insert_reply = harness.insert("a", "1", 1);
        harness.ack_local_persist().await;
        insert_reply.await.unwrap().unwrap();

        let remove_reply = harness.remove("a", 2);
        // Not yet acknowledged, but the authoritative map already dropped it.
        let lookup = harness.get("a", 3).await.unwrap().unwrap();
        assert_eq!(lookup.value, None);

        harness.ack_local_persist().await;
        assert_eq!(remove_reply.await.unwrap(), Ok(OperationAck { id: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn second_mutation_supersedes_first() {
        let mut harness = Harness::new();

        let first = harness.insert("k", "v1", 1);
        let second = harness.insert("k", "v2", 2);

        assert_eq!(first.await.unwrap(), Err(OperationError::Superseded { id: 1 }));

        // Two persist requests were issued; confirming by key settles the
        // surviving entry.
        harness.ack_local_persist().await;
        assert_eq!(second.await.unwrap(), Ok(OperationAck { id: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_fails_the_operation() {
        let mut harness = Harness::new();

        let reply = harness.insert("x", "y", 20);
        // Local persistence never answers.
        tokio::time::advance(Duration::from_millis(1100)).await;

        // Any event triggers the sweep; a read is enough.
        let lookup = harness.get("x", 21).await.unwrap().unwrap();

        assert_eq!(reply.await.unwrap(), Err(OperationError::Timeout { id: 20 }));
        // The local mutation is not rolled back.
        assert_eq!(lookup.value, Some("y".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn departed_replica_stops_blocking_acknowledgement() {
        let mut harness = Harness::new();
        let (s1, mut s1_rx) = member("s1");
        let (s2, _s2_rx) = member("s2");
        let s1_for_reconfig = s1.clone();
        harness.set_members(vec![self_member(&harness), s1, s2]);

        let mut reply = harness.insert("k", "v", 30);
        harness.ack_local_persist().await;

        let snapshot = expect_snapshot(&mut s1_rx).await;
        snapshot.ack_to.ack(snapshot.key, snapshot.seq);
        harness.pump_replicator_event().await;

        // Still waiting on s2, which will never answer.
        assert_unresolved(&mut reply);

        harness.set_members(vec![self_member(&harness), s1_for_reconfig]);

        assert_eq!(reply.await.unwrap(), Ok(OperationAck { id: 30 }));
    }

    #[tokio::test(start_paused = true)]
    async fn new_secondary_receives_full_state_transfer() {
        let mut harness = Harness::new();

        for (key, value, id) in [("a", "1", 1), ("b", "2", 2)] {
            let reply = harness.insert(key, value, id);
            harness.ack_local_persist().await;
            reply.await.unwrap().unwrap();
        }

        let (s3, mut s3_rx) = member("s3");
        harness.set_members(vec![self_member(&harness), s3]);

        let mut transferred = Vec::new();
        for _ in 0..2 {
            let snapshot = expect_snapshot(&mut s3_rx).await;
            transferred.push((snapshot.key.clone(), snapshot.value.clone()));
            snapshot.ack_to.ack(snapshot.key, snapshot.seq);
        }
        transferred.sort();
        assert_eq!(
            transferred,
            vec![
                ("a".to_string(), Some("1".to_string())),
                ("b".to_string(), Some("2".to_string())),
            ]
        );

        // Nothing awaits these; they ride the synthetic id.
        for _ in 0..2 {
            let (_, id) = harness.pump_replicator_event().await;
            assert_eq!(id, SYNTHETIC_OPERATION_ID);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn state_transfer_of_pending_key_extends_the_wait() {
        let mut harness = Harness::new();

        let mut reply = harness.insert("c", "3", 77);

        let (s3, mut s3_rx) = member("s3");
        harness.set_members(vec![self_member(&harness), s3]);

        let snapshot = expect_snapshot(&mut s3_rx).await;
        snapshot.ack_to.ack(snapshot.key, snapshot.seq);
        let (key, id) = harness.pump_replicator_event().await;
        assert_eq!((key.as_str(), id), ("c", 77));

        // Replicated alone is not enough; local persistence is still owed.
        assert_unresolved(&mut reply);
        harness.ack_local_persist().await;

        assert_eq!(reply.await.unwrap(), Ok(OperationAck { id: 77 }));
    }
}
