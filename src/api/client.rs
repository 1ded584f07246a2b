use crate::actor::ActorClient;
use crate::api::membership::JoinedRole;
use crate::api::types::{GetError, GetOutput, MemberInfo, OperationAck, OperationError};

/// KvClient is the application's handle to one replica.
///
/// Mutations are only meaningful against the primary; a secondary rejects
/// them with `OperationError::NotPrimary`. Reads work against any replica
/// and reflect that replica's local map only.
#[derive(Clone)]
pub struct KvClient {
    pub(crate) actor_client: ActorClient,
}

impl KvClient {
    /// Stores `value` under `key`. Resolves with `OperationAck` once the
    /// write is locally durable and replicated to every current secondary,
    /// or with `OperationError` on timeout/supersession.
    pub async fn insert(&self, key: String, value: String, id: i64) -> Result<OperationAck, OperationError> {
        self.actor_client.insert(key, value, id).await
    }

    /// Deletes `key`. Same acknowledgement contract as `insert`.
    pub async fn remove(&self, key: String, id: i64) -> Result<OperationAck, OperationError> {
        self.actor_client.remove(key, id).await
    }

    /// Immediate local lookup. Never waits on persistence or replication.
    pub async fn get(&self, key: String, id: i64) -> Result<GetOutput, GetError> {
        self.actor_client.get(key, id).await
    }

    /// Delivers the membership authority's current replica set. Only the
    /// primary acts on it; the set must include the primary itself.
    pub async fn update_replica_set(&self, members: Vec<MemberInfo>) {
        self.actor_client.update_replica_set(members).await
    }
}

/// One running replica, as handed back by `try_create_kv_node`.
pub struct KvNode {
    pub kv: KvClient,
    /// This node's entry for membership traffic; hand it to the authority
    /// and include it in `update_replica_set` calls.
    pub member_info: MemberInfo,
    /// The role the membership authority assigned at join time.
    pub role: JoinedRole,
}
