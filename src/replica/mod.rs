mod peers;
mod pending;
mod primary;
mod replica;
mod secondary;

pub(crate) use peers::NodeId;
pub(crate) use primary::PrimaryConfig;
pub(crate) use primary::PrimaryReplica;
pub(crate) use replica::Replica;
pub(crate) use secondary::SecondaryReplica;
