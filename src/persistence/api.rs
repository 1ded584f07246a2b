/// Outcome of handing a single key/value pair to the persistence device.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PersistOutcome {
    /// The device accepted the write. The caller will be sent `Persisted`.
    Acknowledged,
    /// The device silently lost the request. No reply will ever arrive; the
    /// caller's retry timer is the only recovery path.
    Dropped,
}

/// The device failed hard. The persistence child task exits and its
/// supervisor recreates it.
#[derive(Debug, thiserror::Error)]
#[error("persistence device fault: {0}")]
pub struct PersistenceFault(pub String);

/// PersistenceEngine models the external persistence collaborator. It is
/// unreliable by contract: any call may be dropped or may fault.
///
/// `value` of `None` records a deletion.
pub trait PersistenceEngine: Send + 'static {
    fn persist(&mut self, key: &str, value: Option<&str>) -> Result<PersistOutcome, PersistenceFault>;
}

/// Creates a fresh engine for each incarnation of the persistence child. A
/// restarted child gets a new engine from the same factory.
pub trait PersistenceFactory: Send + 'static {
    type Engine: PersistenceEngine;

    fn create_engine(&self) -> Self::Engine;
}

impl<E, F> PersistenceFactory for F
where
    E: PersistenceEngine,
    F: Fn() -> E + Send + 'static,
{
    type Engine = E;

    fn create_engine(&self) -> E {
        self()
    }
}
