use crate::persistence::api::{PersistOutcome, PersistenceEngine, PersistenceFault};
use std::collections::HashMap;

// The replication protocol only cares that the device eventually answers, not
// where the bytes land. We theoretically model the device here by keeping the
// accepted writes in a map.
pub struct InMemoryPersistence {
    entries: HashMap<String, String>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        InMemoryPersistence {
            entries: HashMap::new(),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceEngine for InMemoryPersistence {
    fn persist(&mut self, key: &str, value: Option<&str>) -> Result<PersistOutcome, PersistenceFault> {
        match value {
            Some(value) => {
                self.entries.insert(key.to_string(), value.to_string());
            }
            None => {
                self.entries.remove(key);
            }
        }

        Ok(PersistOutcome::Acknowledged)
    }
}
