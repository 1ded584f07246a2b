use crate::actor::{ActorClient, ReplicaActor};
use crate::api::client::{KvClient, KvNode};
use crate::api::membership::{JoinedRole, MembershipAuthority};
use crate::api::options::{KvNodeOptions, KvNodeOptionsValidated};
use crate::api::types::{MemberInfo, ReplicaLink};
use crate::persistence::{PersistenceFactory, PersistenceProxy};
use crate::replica::{NodeId, PrimaryConfig, PrimaryReplica, Replica, SecondaryReplica};
use crate::tick;
use std::convert::TryFrom;

const REPLICA_QUEUE_SIZE: usize = 64;

pub struct KvNodeConfig<F: PersistenceFactory> {
    pub my_node_id: String,
    /// Creates this node's persistence engine; also re-invoked whenever the
    /// persistence child is restarted after a fault.
    pub persistence: F,
    pub info_logger: slog::Logger,
    pub options: KvNodeOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeCreationError {
    #[error("Illegal options for configuring node: {0}")]
    IllegalNodeOptions(String),
    #[error("Node id must be non-empty")]
    EmptyNodeId,
}

/// Assembles one replica: joins the membership authority to learn the role,
/// then spawns the persistence proxy, the replica event loop, and the
/// housekeeping ticker.
pub async fn try_create_kv_node<F: PersistenceFactory>(
    config: KvNodeConfig<F>,
    membership: &dyn MembershipAuthority,
) -> Result<KvNode, NodeCreationError> {
    if config.my_node_id.is_empty() {
        return Err(NodeCreationError::EmptyNodeId);
    }
    let options = KvNodeOptionsValidated::try_from(config.options)
        .map_err(|e| NodeCreationError::IllegalNodeOptions(e.to_string()))?;

    let (actor_client, actor_queue_rx) = ActorClient::new(REPLICA_QUEUE_SIZE);
    let member_info = MemberInfo {
        node_id: config.my_node_id.clone(),
        link: ReplicaLink {
            client: actor_client.clone(),
        },
    };

    let role = membership.join(member_info.clone()).await;

    let logger = config.info_logger.new(slog::o!(
        "NodeId" => config.my_node_id.clone(),
        "Role" => role_name(role),
    ));

    let persistence = PersistenceProxy::spawn(
        logger.new(slog::o!("Component" => "persistence")),
        config.persistence,
        actor_client.weak(),
    );

    let replica = match role {
        JoinedRole::Primary => Replica::Primary(PrimaryReplica::new(PrimaryConfig {
            logger: logger.clone(),
            my_node_id: NodeId::new(&config.my_node_id),
            persistence,
            actor_client: actor_client.weak(),
            operation_timeout: options.operation_timeout,
            replication_retry_interval: options.replication_retry_interval,
        })),
        JoinedRole::Secondary => Replica::Secondary(SecondaryReplica::new(logger.clone(), persistence)),
    };

    let replica_actor = ReplicaActor::new(logger, actor_queue_rx, replica);
    tokio::task::spawn(replica_actor.run_event_loop());
    tick::spawn_replica_ticker(options.tick_interval, actor_client.weak());

    Ok(KvNode {
        kv: KvClient { actor_client },
        member_info,
        role,
    })
}

fn role_name(role: JoinedRole) -> &'static str {
    match role {
        JoinedRole::Primary => "primary",
        JoinedRole::Secondary => "secondary",
    }
}
