use crate::actor::Event;
use crate::replica::primary::PrimaryReplica;
use crate::replica::secondary::SecondaryReplica;

/// Replica is one node of the store. The membership authority assigns the
/// role exactly once, at join time; it never changes afterwards.
pub(crate) enum Replica {
    Primary(PrimaryReplica),
    Secondary(SecondaryReplica),
}

impl Replica {
    pub(crate) fn handle_event(&mut self, event: Event) {
        match self {
            Replica::Primary(primary) => primary.handle_event(event),
            Replica::Secondary(secondary) => secondary.handle_event(event),
        }
    }
}
