use crate::actor::{ActorClient, WeakActorClient};
use crate::tick;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Identity of a single replicator incarnation. A secondary that leaves and
/// re-joins gets a fresh replicator with a fresh id, so completions from the
/// old incarnation can never satisfy waits opened against the new one.
#[derive(Copy, Clone, Hash, Eq, PartialEq)]
pub(crate) struct ReplicatorId(u64);

impl ReplicatorId {
    pub(crate) fn new(id: u64) -> Self {
        ReplicatorId(id)
    }

    pub(crate) fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ReplicatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replicator-{}", self.0)
    }
}

/// Operation id used for state-transfer replication of entries that have no
/// client waiting on them.
pub(crate) const SYNTHETIC_OPERATION_ID: i64 = -1;

/// A single mutation the primary wants pushed to this replicator's secondary.
/// `value` of `None` replicates a removal.
#[derive(Debug, Clone)]
pub(crate) struct ReplicateRequest {
    pub key: String,
    pub value: Option<String>,
    pub id: i64,
}

/// A sequenced mutation on the wire to a secondary. The secondary answers on
/// `ack_to` once the snapshot is applied and locally persisted.
#[derive(Debug)]
pub(crate) struct SnapshotRequest {
    pub key: String,
    pub value: Option<String>,
    pub seq: u64,
    pub ack_to: SnapshotAckHandle,
}

/// Where a secondary sends `SnapshotAck`. Holds only a weak reference so a
/// secondary sitting on an old handle cannot keep a dead replicator alive.
#[derive(Clone)]
pub(crate) struct SnapshotAckHandle {
    replicator_id: ReplicatorId,
    sender: mpsc::WeakUnboundedSender<ReplicatorEvent>,
}

impl SnapshotAckHandle {
    #[cfg(test)]
    pub(crate) fn for_test(
        replicator_id: ReplicatorId,
        sender: mpsc::WeakUnboundedSender<ReplicatorEvent>,
    ) -> Self {
        SnapshotAckHandle { replicator_id, sender }
    }

    pub(crate) fn ack(&self, key: String, seq: u64) {
        if let Some(sender) = self.sender.upgrade() {
            let _ = sender.send(ReplicatorEvent::SnapshotAck { key, seq });
        }
    }
}

impl fmt::Debug for SnapshotAckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotAckHandle({:?})", self.replicator_id)
    }
}

#[derive(Debug)]
pub(crate) enum ReplicatorEvent {
    /// From the primary: assign the next seq, record in the outbox, push a
    /// snapshot to the secondary.
    Replicate(ReplicateRequest),

    /// From the secondary: the snapshot with this seq is applied and
    /// persisted. Drop it from the outbox and tell the primary.
    SnapshotAck { key: String, seq: u64 },

    /// Periodic: retransmit every outbox entry.
    RetryTick,

    /// From the primary on reconfiguration: exit after the current message.
    /// Outbox remnants are dropped; the primary has already stopped waiting
    /// on this replicator.
    Stop,
}

/// The primary's handle to one replicator. Dropping it (after `stop`) lets
/// the replicator task wind down.
pub(crate) struct ReplicatorHandle {
    id: ReplicatorId,
    sender: mpsc::UnboundedSender<ReplicatorEvent>,
}

impl ReplicatorHandle {
    pub(crate) fn id(&self) -> ReplicatorId {
        self.id
    }

    pub(crate) fn replicate(&self, request: ReplicateRequest) {
        // A dead replicator means its secondary already departed; the pending
        // table no longer waits on it.
        let _ = self.sender.send(ReplicatorEvent::Replicate(request));
    }

    pub(crate) fn stop(self) {
        let _ = self.sender.send(ReplicatorEvent::Stop);
    }
}

/// Replicator converts the primary's per-key mutations into an ordered,
/// retried snapshot stream for one secondary.
pub(crate) struct Replicator {
    logger: slog::Logger,
    id: ReplicatorId,
    receiver: mpsc::UnboundedReceiver<ReplicatorEvent>,
    self_sender: mpsc::WeakUnboundedSender<ReplicatorEvent>,
    primary: WeakActorClient,
    secondary: ActorClient,
    next_seq: u64,
    outbox: BTreeMap<u64, ReplicateRequest>,
}

impl Replicator {
    pub(crate) fn spawn(
        logger: slog::Logger,
        id: ReplicatorId,
        primary: WeakActorClient,
        secondary: ActorClient,
        retry_interval: Duration,
    ) -> ReplicatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let replicator = Replicator {
            logger,
            id,
            receiver: rx,
            self_sender: tx.downgrade(),
            primary,
            secondary,
            next_seq: 0,
            outbox: BTreeMap::new(),
        };
        tokio::task::spawn(replicator.run_event_loop());
        tick::spawn_replicator_ticker(retry_interval, tx.downgrade());

        ReplicatorHandle { id, sender: tx }
    }

    async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            match event {
                ReplicatorEvent::Replicate(request) => self.handle_replicate(request).await,
                ReplicatorEvent::SnapshotAck { key, seq } => self.handle_snapshot_ack(key, seq).await,
                ReplicatorEvent::RetryTick => self.handle_retry_tick().await,
                ReplicatorEvent::Stop => {
                    if !self.outbox.is_empty() {
                        slog::info!(
                            self.logger,
                            "Stopping with {} unacknowledged snapshot(s); dropping them.",
                            self.outbox.len()
                        );
                    }
                    return;
                }
            }
        }

        slog::debug!(self.logger, "Replicator channel closed, exiting.");
    }

    async fn handle_replicate(&mut self, request: ReplicateRequest) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.send_snapshot(seq, &request).await;
        self.outbox.insert(seq, request);
    }

    async fn handle_snapshot_ack(&mut self, key: String, seq: u64) {
        match self.outbox.remove(&seq) {
            Some(entry) => {
                self.primary.notify_replicated(entry.key, entry.id, self.id).await;
            }
            None => {
                // Retransmission produced a duplicate ack. Already handled.
                slog::trace!(self.logger, "Duplicate SnapshotAck for key '{}' seq {}", key, seq);
            }
        }
    }

    async fn handle_retry_tick(&mut self) {
        // The secondary applies strictly in seq order, so retransmitting the
        // whole outbox is harmless; everything but the next expected seq is
        // ignored over there.
        for (seq, request) in &self.outbox {
            self.send_snapshot(*seq, request).await;
        }
    }

    async fn send_snapshot(&self, seq: u64, request: &ReplicateRequest) {
        let snapshot = SnapshotRequest {
            key: request.key.clone(),
            value: request.value.clone(),
            seq,
            ack_to: SnapshotAckHandle {
                replicator_id: self.id,
                sender: self.self_sender.clone(),
            },
        };

        if self.secondary.snapshot(snapshot).await.is_err() {
            slog::debug!(self.logger, "Secondary is unreachable for seq {}", seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Event;
    use tokio::time::Duration;

    const RETRY: Duration = Duration::from_millis(100);

    struct Harness {
        handle: ReplicatorHandle,
        primary_rx: mpsc::Receiver<Event>,
        secondary_rx: mpsc::Receiver<Event>,
        // Keeps the replicator's weak primary reference upgradable.
        _primary_client: ActorClient,
    }

    fn spawn_replicator() -> Harness {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let (primary_client, primary_rx) = ActorClient::new(16);
        let (secondary_client, secondary_rx) = ActorClient::new(16);

        let handle = Replicator::spawn(
            logger,
            ReplicatorId::new(1),
            primary_client.weak(),
            secondary_client,
            RETRY,
        );

        Harness {
            handle,
            primary_rx,
            secondary_rx,
            _primary_client: primary_client,
        }
    }

    async fn expect_snapshot(rx: &mut mpsc::Receiver<Event>) -> SnapshotRequest {
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(Event::Snapshot(request))) => request,
            other => panic!("expected a snapshot, got {:?}", other),
        }
    }

    async fn expect_no_event(rx: &mut mpsc::Receiver<Event>, window: Duration) {
        if let Ok(event) = tokio::time::timeout(window, rx.recv()).await {
            panic!("expected silence, got {:?}", event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn assigns_contiguous_seqs_and_pipelines() {
        let mut harness = spawn_replicator();

        harness.handle.replicate(ReplicateRequest {
            key: "a".to_string(),
            value: Some("1".to_string()),
            id: 10,
        });
        harness.handle.replicate(ReplicateRequest {
            key: "a".to_string(),
            value: None,
            id: 11,
        });

        let first = expect_snapshot(&mut harness.secondary_rx).await;
        let second = expect_snapshot(&mut harness.secondary_rx).await;
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert_eq!(second.value, None);
    }

    #[tokio::test(start_paused = true)]
    async fn retransmits_until_acknowledged() {
        let mut harness = spawn_replicator();

        harness.handle.replicate(ReplicateRequest {
            key: "k".to_string(),
            value: Some("v".to_string()),
            id: 42,
        });

        // Initial send plus at least one retry.
        let initial = expect_snapshot(&mut harness.secondary_rx).await;
        let retry = expect_snapshot(&mut harness.secondary_rx).await;
        assert_eq!(initial.seq, retry.seq);

        retry.ack_to.ack("k".to_string(), retry.seq);

        match tokio::time::timeout(Duration::from_secs(1), harness.primary_rx.recv()).await {
            Ok(Some(Event::Replicated { key, id, replicator_id })) => {
                assert_eq!(key, "k");
                assert_eq!(id, 42);
                assert_eq!(replicator_id, ReplicatorId::new(1));
            }
            other => panic!("expected Replicated, got {:?}", other),
        }

        // Outbox is empty now; retries stop.
        while let Ok(Some(_)) = tokio::time::timeout(RETRY * 3, harness.secondary_rx.recv()).await {
            // Drain retransmissions that were already in flight before the ack.
        }
        expect_no_event(&mut harness.secondary_rx, RETRY * 3).await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_ack_reports_replicated_once() {
        let mut harness = spawn_replicator();

        harness.handle.replicate(ReplicateRequest {
            key: "k".to_string(),
            value: Some("v".to_string()),
            id: 7,
        });

        let snapshot = expect_snapshot(&mut harness.secondary_rx).await;
        snapshot.ack_to.ack("k".to_string(), snapshot.seq);
        snapshot.ack_to.ack("k".to_string(), snapshot.seq);

        match tokio::time::timeout(Duration::from_secs(1), harness.primary_rx.recv()).await {
            Ok(Some(Event::Replicated { id, .. })) => assert_eq!(id, 7),
            other => panic!("expected Replicated, got {:?}", other),
        }
        if let Ok(Some(event)) = tokio::time::timeout(RETRY * 2, harness.primary_rx.recv()).await {
            panic!("expected a single Replicated, got extra {:?}", event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drops_outbox_and_ends_retries() {
        let mut harness = spawn_replicator();

        harness.handle.replicate(ReplicateRequest {
            key: "k".to_string(),
            value: Some("v".to_string()),
            id: 1,
        });
        expect_snapshot(&mut harness.secondary_rx).await;

        harness.handle.stop();

        // Give any in-flight retransmission a chance to drain, then expect
        // sustained silence.
        while let Ok(Some(_)) = tokio::time::timeout(RETRY * 2, harness.secondary_rx.recv()).await {}
        expect_no_event(&mut harness.secondary_rx, RETRY * 5).await;
        expect_no_event(&mut harness.primary_rx, RETRY).await;
    }
}
