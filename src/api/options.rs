use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Default)]
pub struct KvNodeOptions {
    /// How long a mutation may stay unacknowledged before it fails.
    pub operation_timeout: Option<Duration>,
    /// Cadence of the replica's housekeeping tick: the primary's deadline
    /// sweep and a secondary's persistence retry.
    pub tick_interval: Option<Duration>,
    /// Cadence at which a replicator retransmits unacknowledged snapshots.
    pub replication_retry_interval: Option<Duration>,
}

pub(super) struct KvNodeOptionsValidated {
    pub operation_timeout: Duration,
    pub tick_interval: Duration,
    pub replication_retry_interval: Duration,
}

impl KvNodeOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.operation_timeout.is_zero() {
            return Err("Operation timeout must be non-zero");
        }
        if self.tick_interval.is_zero() || self.replication_retry_interval.is_zero() {
            return Err("Tick intervals must be non-zero");
        }
        if self.tick_interval >= self.operation_timeout {
            return Err("Tick interval must be less than the operation timeout");
        }
        if self.replication_retry_interval >= self.operation_timeout {
            return Err("Replication retry interval must be less than the operation timeout");
        }

        Ok(())
    }
}

impl TryFrom<KvNodeOptions> for KvNodeOptionsValidated {
    type Error = &'static str;

    fn try_from(options: KvNodeOptions) -> Result<Self, Self::Error> {
        let values = KvNodeOptionsValidated {
            operation_timeout: options.operation_timeout.unwrap_or(Duration::from_millis(1000)),
            tick_interval: options.tick_interval.unwrap_or(Duration::from_millis(100)),
            replication_retry_interval: options
                .replication_retry_interval
                .unwrap_or(Duration::from_millis(100)),
        };

        values.validate()?;
        Ok(values)
    }
}
