mod actor;
mod api;
mod persistence;
mod replica;
mod replicator;
mod tick;

pub use api::create_root_logger_for_stdout;
pub use api::try_create_kv_node;
pub use api::try_create_root_logger_for_file;
pub use api::GetError;
pub use api::GetOutput;
pub use api::JoinedRole;
pub use api::KvClient;
pub use api::KvNode;
pub use api::KvNodeConfig;
pub use api::KvNodeOptions;
pub use api::MemberInfo;
pub use api::MembershipAuthority;
pub use api::NodeCreationError;
pub use api::OperationAck;
pub use api::OperationError;
pub use persistence::FlakyPersistence;
pub use persistence::InMemoryPersistence;
pub use persistence::PersistOutcome;
pub use persistence::PersistenceEngine;
pub use persistence::PersistenceFactory;
pub use persistence::PersistenceFault;
