mod replicator;

pub(crate) use replicator::ReplicateRequest;
pub(crate) use replicator::Replicator;
pub(crate) use replicator::ReplicatorEvent;
pub(crate) use replicator::ReplicatorHandle;
pub(crate) use replicator::ReplicatorId;
pub(crate) use replicator::SnapshotAckHandle;
pub(crate) use replicator::SnapshotRequest;
pub(crate) use replicator::SYNTHETIC_OPERATION_ID;
