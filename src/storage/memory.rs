use dashmap::DashMap;

use super::CircuitStateStore;
use crate::resilience::CircuitRecord;
use crate::types::Result;

/// Process-local store; state is lost on exit
#[derive(Debug, Default)]
pub struct InMemoryCircuitStore {
    records: DashMap<String, CircuitRecord>,
}

impl InMemoryCircuitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CircuitStateStore for InMemoryCircuitStore {
    fn get_state(&self, model_id: &str) -> Result<CircuitRecord> {
        Ok(self
            .records
            .get(model_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| CircuitRecord::closed(model_id)))
    }

    fn put_state(&self, record: &CircuitRecord) -> Result<()> {
        self.records.insert(record.model_id.clone(), record.clone());
        Ok(())
    }

    fn list_states(&self) -> Result<Vec<CircuitRecord>> {
        let mut records: Vec<CircuitRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(records)
    }
}
