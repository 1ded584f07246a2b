use crate::replicator::{ReplicatorHandle, ReplicatorId};
use std::collections::hash_map::Values;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// NodeId is the identity of a replica participating in the cluster. The
/// membership authority speaks in these.
#[derive(Clone, Hash, Eq, PartialEq)]
pub(crate) struct NodeId(String);

impl NodeId {
    pub(crate) fn new(node_id: impl Into<String>) -> Self {
        NodeId(node_id.into())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SecondaryTracker is the primary's view of the current secondaries: one
/// live replicator per secondary node. Its domain is always the current
/// replica set minus the primary itself.
pub(crate) struct SecondaryTracker {
    replicators: HashMap<NodeId, ReplicatorHandle>,
}

impl SecondaryTracker {
    pub(crate) fn new() -> Self {
        SecondaryTracker {
            replicators: HashMap::new(),
        }
    }

    pub(crate) fn contains(&self, node_id: &NodeId) -> bool {
        self.replicators.contains_key(node_id)
    }

    pub(crate) fn node_ids(&self) -> HashSet<NodeId> {
        self.replicators.keys().cloned().collect()
    }

    pub(crate) fn replicator_ids(&self) -> HashSet<ReplicatorId> {
        self.replicators.values().map(ReplicatorHandle::id).collect()
    }

    pub(crate) fn insert(&mut self, node_id: NodeId, replicator: ReplicatorHandle) {
        self.replicators.insert(node_id, replicator);
    }

    pub(crate) fn remove(&mut self, node_id: &NodeId) -> Option<ReplicatorHandle> {
        self.replicators.remove(node_id)
    }

    pub(crate) fn iter_replicators(&self) -> Values<'_, NodeId, ReplicatorHandle> {
        self.replicators.values()
    }
}
