use crate::actor::ActorClient;
use std::fmt;

/// Positive acknowledgement of a mutation: both the local write and
/// replication to every then-current secondary completed in time.
#[derive(Debug, Eq, PartialEq)]
pub struct OperationAck {
    pub id: i64,
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum OperationError {
    /// Local persistence and replication did not both complete within the
    /// acknowledgement deadline. The local map mutation is NOT rolled back.
    #[error("operation {id} missed its acknowledgement deadline")]
    Timeout { id: i64 },

    /// A later mutation on the same key arrived before this one settled.
    #[error("operation {id} was superseded by a later mutation on the same key")]
    Superseded { id: i64 },

    /// Mutations go to the primary; this node is a secondary.
    #[error("I'm not the primary")]
    NotPrimary,

    #[error("replica event loop task has exited")]
    ActorExited,
}

/// Reads never fail logically: a missing key comes back as `value: None`.
#[derive(Debug, Eq, PartialEq)]
pub struct GetOutput {
    pub key: String,
    pub value: Option<String>,
    pub id: i64,
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum GetError {
    #[error("replica event loop task has exited")]
    ActorExited,
}

/// MemberInfo is how one node is referred to in membership traffic: its
/// identity plus the in-process address other replicas use to reach it.
/// Obtained from `KvNode`, passed around by the membership authority.
#[derive(Clone)]
pub struct MemberInfo {
    pub node_id: String,
    pub(crate) link: ReplicaLink,
}

impl fmt::Debug for MemberInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberInfo({})", self.node_id)
    }
}

/// The channel address of a replica. Snapshots and membership updates travel
/// through this.
#[derive(Clone)]
pub(crate) struct ReplicaLink {
    pub(crate) client: ActorClient,
}
