use crate::persistence::api::{PersistOutcome, PersistenceEngine, PersistenceFault};
use rand::Rng;
use std::collections::HashMap;

/// A persistence device that misbehaves on purpose: a `drop_rate` fraction of
/// requests is silently lost and a `fault_rate` fraction crashes the device.
/// Upstream retry and supervision must absorb both.
pub struct FlakyPersistence {
    entries: HashMap<String, String>,
    drop_rate: f64,
    fault_rate: f64,
}

impl FlakyPersistence {
    /// Rates are probabilities in `[0, 1]`; their sum must not exceed 1.
    pub fn new(drop_rate: f64, fault_rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&drop_rate), "drop_rate out of range");
        assert!((0.0..=1.0).contains(&fault_rate), "fault_rate out of range");
        assert!(drop_rate + fault_rate <= 1.0, "rates sum to more than 1");

        FlakyPersistence {
            entries: HashMap::new(),
            drop_rate,
            fault_rate,
        }
    }
}

impl PersistenceEngine for FlakyPersistence {
    fn persist(&mut self, key: &str, value: Option<&str>) -> Result<PersistOutcome, PersistenceFault> {
        let roll: f64 = rand::thread_rng().gen();

        if roll < self.fault_rate {
            return Err(PersistenceFault("simulated device crash".to_string()));
        }
        if roll < self.fault_rate + self.drop_rate {
            return Ok(PersistOutcome::Dropped);
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rates_behave_like_in_memory() {
        let mut engine = FlakyPersistence::new(0.0, 0.0);

        for i in 0..50 {
            let outcome = engine.persist(&format!("k{}", i), Some("v")).unwrap();
            assert_eq!(outcome, PersistOutcome::Acknowledged);
        }
    }

    #[test]
    fn full_drop_rate_never_acknowledges() {
        let mut engine = FlakyPersistence::new(1.0, 0.0);

        for _ in 0..50 {
            let outcome = engine.persist("k", Some("v")).unwrap();
            assert_eq!(outcome, PersistOutcome::Dropped);
        }
        assert!(engine.entries.is_empty());
    }

    #[test]
    fn full_fault_rate_always_crashes() {
        let mut engine = FlakyPersistence::new(0.0, 1.0);

        assert!(engine.persist("k", Some("v")).is_err());
    }
}
