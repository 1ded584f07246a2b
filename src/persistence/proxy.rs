use crate::actor::WeakActorClient;
use crate::persistence::api::{PersistOutcome, PersistenceEngine, PersistenceFactory};
use tokio::sync::mpsc;

/// A single write handed to the persistence layer. `token` is echoed back in
/// the `Persisted` notification: the primary passes the operation id, a
/// secondary passes the snapshot sequence number.
#[derive(Debug)]
pub(crate) struct PersistRequest {
    pub key: String,
    pub value: Option<String>,
    pub token: i64,
}

/// Stable address of a node's persistence layer. The proxy behind it restarts
/// the actual device child on fault, so this handle never goes stale while
/// the node is alive.
#[derive(Clone)]
pub(crate) struct PersistenceClient {
    sender: mpsc::UnboundedSender<PersistRequest>,
}

impl PersistenceClient {
    pub(crate) fn persist(&self, key: String, value: Option<String>, token: i64) {
        // If the proxy is gone the whole node is shutting down; nothing to do.
        let _ = self.sender.send(PersistRequest { key, value, token });
    }

    #[cfg(test)]
    pub(crate) fn test_channel() -> (PersistenceClient, mpsc::UnboundedReceiver<PersistRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PersistenceClient { sender: tx }, rx)
    }
}

/// PersistenceProxy supervises the persistence child: it forwards every
/// request unchanged and recreates the child (same upstream address) whenever
/// the child dies of an engine fault. Requests sitting in a dead child's
/// queue are lost; the senders' retry timers re-drive them.
pub(crate) struct PersistenceProxy<F: PersistenceFactory> {
    logger: slog::Logger,
    factory: F,
    receiver: mpsc::UnboundedReceiver<PersistRequest>,
    replica: WeakActorClient,
    child: mpsc::UnboundedSender<PersistRequest>,
}

impl<F: PersistenceFactory> PersistenceProxy<F> {
    pub(crate) fn spawn(logger: slog::Logger, factory: F, replica: WeakActorClient) -> PersistenceClient {
        let (tx, rx) = mpsc::unbounded_channel();
        let child = Self::spawn_child(&logger, &factory, &replica);

        let proxy = PersistenceProxy {
            logger,
            factory,
            receiver: rx,
            replica,
            child,
        };
        tokio::task::spawn(proxy.run_forward_loop());

        PersistenceClient { sender: tx }
    }

    async fn run_forward_loop(mut self) {
        while let Some(request) = self.receiver.recv().await {
            let mut request = request;
            // A failed forward means the child died since the last request.
            // Recreate it under the same proxy address and re-forward.
            while let Err(mpsc::error::SendError(returned)) = self.child.send(request) {
                slog::info!(self.logger, "Persistence child is dead, restarting it");
                self.child = Self::spawn_child(&self.logger, &self.factory, &self.replica);
                request = returned;
            }
        }

        slog::debug!(self.logger, "Persistence proxy channel closed, exiting.");
    }

    fn spawn_child(
        logger: &slog::Logger,
        factory: &F,
        replica: &WeakActorClient,
    ) -> mpsc::UnboundedSender<PersistRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = factory.create_engine();
        tokio::task::spawn(run_child(logger.clone(), engine, rx, replica.clone()));

        tx
    }
}

async fn run_child<E: PersistenceEngine>(
    logger: slog::Logger,
    mut engine: E,
    mut receiver: mpsc::UnboundedReceiver<PersistRequest>,
    replica: WeakActorClient,
) {
    while let Some(request) = receiver.recv().await {
        match engine.persist(&request.key, request.value.as_deref()) {
            Ok(PersistOutcome::Acknowledged) => {
                replica.notify_persisted(request.key, request.token).await;
            }
            Ok(PersistOutcome::Dropped) => {
                slog::trace!(logger, "Device dropped persist request for key '{}'", request.key);
            }
            Err(fault) => {
                slog::warn!(logger, "Persistence child crashing: {}", fault);
                return;
            }
        }
    }
}
