//! This mod holds the library's client-facing API.
mod client;
mod logging;
mod membership;
mod options;
mod types;
mod wiring;

pub use client::KvClient;
pub use client::KvNode;
pub use logging::create_root_logger_for_stdout;
pub use logging::try_create_root_logger_for_file;
pub use membership::JoinedRole;
pub use membership::MembershipAuthority;
pub use options::KvNodeOptions;
pub use types::GetError;
pub use types::GetOutput;
pub use types::MemberInfo;
pub use types::OperationAck;
pub use types::OperationError;
pub use wiring::try_create_kv_node;
pub use wiring::KvNodeConfig;
pub use wiring::NodeCreationError;

pub(crate) use types::ReplicaLink;
