use crate::actor::WeakActorClient;
use crate::replicator::ReplicatorEvent;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};

/// Feeds `Tick` into a replica's queue until the replica is gone. Drives the
/// primary's deadline sweep and a secondary's persistence retry.
pub(crate) fn spawn_replica_ticker(period: Duration, client: WeakActorClient) {
    tokio::task::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if !client.tick().await {
                return;
            }
        }
    });
}

/// Feeds `RetryTick` into a replicator's queue until the replicator is gone.
pub(crate) fn spawn_replicator_ticker(period: Duration, sender: mpsc::WeakUnboundedSender<ReplicatorEvent>) {
    tokio::task::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let alive = match sender.upgrade() {
                Some(sender) => sender.send(ReplicatorEvent::RetryTick).is_ok(),
                None => false,
            };
            if !alive {
                return;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorClient, Event};
    use tokio::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn replica_ticker_ticks_and_stops_with_its_target() {
        let (client, mut rx) = ActorClient::new(8);
        spawn_replica_ticker(Duration::from_millis(100), client.weak());

        for _ in 0..3 {
            match rx.recv().await {
                Some(Event::Tick) => {}
                other => panic!("expected a tick, got {:?}", other),
            }
        }

        // Dropping both ends makes the next upgrade fail and the ticker exit.
        drop(client);
        drop(rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
