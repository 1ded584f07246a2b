use crate::api::{GetError, GetOutput, MemberInfo, OperationAck, OperationError};
use crate::replica::Replica;
use crate::replicator::{ReplicatorId, SnapshotRequest};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Formatter};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub(crate) enum Event {
    // Primary: update local map, open a pending entry, fan out to all
    //          replicators, start local persistence. Ack after both complete.
    // Secondary: reject, clients must mutate via the primary.
    Insert {
        key: String,
        value: String,
        id: i64,
        cb: Callback<OperationAck, OperationError>,
    },

    // Primary: delete from local map; otherwise exactly like Insert.
    // Secondary: reject.
    Remove {
        key: String,
        id: i64,
        cb: Callback<OperationAck, OperationError>,
    },

    // Primary: immediate lookup against the local map. No persistence wait.
    // Secondary: same; serves whatever the snapshot stream has applied.
    Get {
        key: String,
        id: i64,
        cb: Callback<GetOutput, GetError>,
    },

    // Primary: reconfigure the secondary set: stop departed replicators and
    //          discharge their waits, spawn replicators + state transfer for
    //          joiners. The set always includes this node itself.
    // Secondary: discard.
    ReplicaSetChanged { members: Vec<MemberInfo> },

    // Primary: mark the key's pending entry persisted; attempt ack.
    // Secondary: completes the in-flight snapshot: ack it and advance the
    //            expected seq.
    Persisted { key: String, token: i64 },

    // Primary: clear the sending replicator from the key's pending entry;
    //          attempt ack.
    // Secondary: discard.
    Replicated {
        key: String,
        id: i64,
        replicator_id: ReplicatorId,
    },

    // Primary: discard, replicators never target the primary.
    // Secondary: sequenced snapshot intake.
    Snapshot(SnapshotRequest),

    // Primary: sweep pending entries past their deadline.
    // Secondary: re-issue the in-flight persist request.
    Tick,
}

pub(crate) struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Debug for Callback<O, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish()
    }
}

impl<O: Debug, E: Error> Callback<O, E> {
    pub(crate) fn new(sender: oneshot::Sender<Result<O, E>>) -> Self {
        Callback(sender)
    }

    pub(crate) fn send(self, message: Result<O, E>) {
        // The caller may have stopped waiting; that is its business.
        let _ = self.0.send(message);
    }
}

#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub(crate) fn new(queue_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(queue_size);
        (ActorClient { sender: tx }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn insert(&self, key: String, value: String, id: i64) -> Result<OperationAck, OperationError> {
        let (tx, rx) = oneshot::channel();
        self.send_to_actor(Event::Insert {
            key,
            value,
            id,
            cb: Callback::new(tx),
        })
        .await
        .map_err(|_| OperationError::ActorExited)?;

        rx.await.map_err(|_| OperationError::ActorExited)?
    }

    pub(crate) async fn remove(&self, key: String, id: i64) -> Result<OperationAck, OperationError> {
        let (tx, rx) = oneshot::channel();
        self.send_to_actor(Event::Remove {
            key,
            id,
            cb: Callback::new(tx),
        })
        .await
        .map_err(|_| OperationError::ActorExited)?;

        rx.await.map_err(|_| OperationError::ActorExited)?
    }

    pub(crate) async fn get(&self, key: String, id: i64) -> Result<GetOutput, GetError> {
        let (tx, rx) = oneshot::channel();
        self.send_to_actor(Event::Get {
            key,
            id,
            cb: Callback::new(tx),
        })
        .await
        .map_err(|_| GetError::ActorExited)?;

        rx.await.map_err(|_| GetError::ActorExited)?
    }

    pub(crate) async fn update_replica_set(&self, members: Vec<MemberInfo>) {
        // A dead replica has no membership left to maintain.
        let _ = self.send_to_actor(Event::ReplicaSetChanged { members }).await;
    }

    /// Snapshot delivery from a replicator into this (secondary) replica.
    pub(crate) async fn snapshot(&self, request: SnapshotRequest) -> Result<(), ()> {
        self.send_to_actor(Event::Snapshot(request)).await
    }

    async fn send_to_actor(&self, event: Event) -> Result<(), ()> {
        self.sender.send(event).await.map_err(|_| ())
    }
}

/// Back-reference into a replica held by components the replica itself owns
/// (replicators, the persistence proxy, tickers). Weak, so those components
/// never keep a replica alive after the application dropped its handles.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl WeakActorClient {
    pub(crate) async fn notify_persisted(&self, key: String, token: i64) -> bool {
        self.send(Event::Persisted { key, token }).await
    }

    pub(crate) async fn notify_replicated(&self, key: String, id: i64, replicator_id: ReplicatorId) -> bool {
        self.send(Event::Replicated { key, id, replicator_id }).await
    }

    pub(crate) async fn tick(&self) -> bool {
        self.send(Event::Tick).await
    }

    async fn send(&self, event: Event) -> bool {
        match self.sender.upgrade() {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }
}

/// ReplicaActor is the replica role logic in actor model.
pub(crate) struct ReplicaActor {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    replica: Replica,
}

impl ReplicaActor {
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, replica: Replica) -> Self {
        ReplicaActor {
            logger,
            receiver,
            replica,
        }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            slog::trace!(self.logger, "Received: {:?}", event);
            // Handlers must NOT block. Any long running work happens on
            // another task and comes back to this loop as an event.
            self.replica.handle_event(event);
        }

        slog::info!(self.logger, "Replica event loop has exited.");
    }
}
