//! In-memory step store.
//!
//! Nothing survives the process, so this backend is only durable for
//! the lifetime of one engine. Tests use it to simulate restarts by
//! building a new context over the same store.

use std::collections::HashMap;
use std::sync::RwLock;

use log::debug;

use super::{sort_by_ordinal, DurableStore, Result, StepRecord, StepStatus, StoreError};

type RecordKey = (String, String);

/// Thread-safe map of step records keyed by `(workflow_id, step_key)`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, StepRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all workflows.
    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn transition(
        &self,
        workflow_id: &str,
        step_key: &str,
        next: StepStatus,
        output: Option<String>,
    ) -> Result<()> {
        let mut records = self.records.write().map_err(lock_poisoned)?;

        let record = records
            .get_mut(&(workflow_id.to_string(), step_key.to_string()))
            .ok_or_else(|| StoreError::StepNotFound {
                workflow_id: workflow_id.to_string(),
                step_key: step_key.to_string(),
            })?;

        record.transition(next, output)?;
        debug!("{}/{} -> {}", workflow_id, step_key, next);
        Ok(())
    }
}

fn lock_poisoned<T>(_: T) -> StoreError {
    StoreError::Database("memory store lock poisoned".to_string())
}

impl DurableStore for MemoryStore {
    fn get_step(&self, workflow_id: &str, step_key: &str) -> Result<Option<StepRecord>> {
        let records = self.records.read().map_err(lock_poisoned)?;
        Ok(records
            .get(&(workflow_id.to_string(), step_key.to_string()))
            .cloned())
    }

    fn insert_running_step(&self, workflow_id: &str, step_key: &str) -> Result<()> {
        let mut records = self.records.write().map_err(lock_poisoned)?;
        let key = (workflow_id.to_string(), step_key.to_string());

        if records.contains_key(&key) {
            return Err(StoreError::DuplicateStep {
                workflow_id: workflow_id.to_string(),
                step_key: step_key.to_string(),
            });
        }

        records.insert(key, StepRecord::running(workflow_id, step_key));
        debug!("{}/{} -> RUNNING", workflow_id, step_key);
        Ok(())
    }

    fn mark_step_completed(&self, workflow_id: &str, step_key: &str, output: &str) -> Result<()> {
        self.transition(
            workflow_id,
            step_key,
            StepStatus::Completed,
            Some(output.to_string()),
        )
    }

    fn mark_step_failed(&self, workflow_id: &str, step_key: &str) -> Result<()> {
        self.transition(workflow_id, step_key, StepStatus::Failed, None)
    }

    fn list_steps(&self, workflow_id: &str) -> Result<Vec<StepRecord>> {
        let records = self.records.read().map_err(lock_poisoned)?;

        let mut steps: Vec<StepRecord> = records
            .values()
            .filter(|record| record.workflow_id == workflow_id)
            .cloned()
            .collect();
        sort_by_ordinal(&mut steps);

        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_memory_store_contract() {
        contract::run_all(|| Box::new(MemoryStore::new()));
    }

    #[test]
    fn test_memory_store_len() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.insert_running_step("wf", "a-1").unwrap();
        store.insert_running_step("wf", "b-2").unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_memory_store_concurrent_inserts() {
        let store = Arc::new(MemoryStore::new());

        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .insert_running_step("wf", &format!("step-{}", i))
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.list_steps("wf").unwrap().len(), 8);
        assert_eq!(store.max_sequence_for_workflow("wf").unwrap(), 8);
    }
}
