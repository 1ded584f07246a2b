use crate::api::types::MemberInfo;

/// Role handed out by the membership authority at join time. Exactly one
/// primary per cluster; the assignment never changes for a node's lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinedRole {
    Primary,
    Secondary,
}

/// The external membership authority. It answers a node's join request with
/// a role, and from then on may push the current replica set to the primary
/// at any time via `KvClient::update_replica_set` (the set always includes
/// the primary itself).
///
/// The authority's decision logic lives outside this crate; only the
/// contract is defined here.
#[async_trait::async_trait]
pub trait MembershipAuthority: Send + Sync {
    async fn join(&self, member: MemberInfo) -> JoinedRole;
}
