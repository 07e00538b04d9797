//! ReDB step store
//!
//! Persistent storage using the ReDB embedded database. Each store
//! operation runs in its own transaction, so a committed write is on
//! disk before the call returns.
//!
//! ## Table Structure
//!
//! ```text
//! steps : (workflow_id, step_key) -> StepRecord (JSON)
//! ```

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{sort_by_ordinal, DurableStore, Result, StepRecord, StepStatus, StoreError};

const STEPS: TableDefinition<(&str, &str), &str> = TableDefinition::new("steps_v1");

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

/// ReDB storage backend for step records.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a ReDB database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)
            .map_err(|e| StoreError::Database(format!("failed to open database: {}", e)))?;

        // Create the table on first open
        let write_txn = db.begin_write().map_err(db_err)?;
        write_txn
            .open_table(STEPS)
            .map_err(|e| StoreError::Database(format!("failed to create steps table: {}", e)))?;
        write_txn.commit().map_err(db_err)?;

        info!("Opened step store at {}", path.display());
        Ok(Self { db: Arc::new(db) })
    }

    fn to_json(record: &StepRecord) -> Result<String> {
        serde_json::to_string(record).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn from_json(json: &str) -> Result<StepRecord> {
        serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn transition(
        &self,
        workflow_id: &str,
        step_key: &str,
        next: StepStatus,
        output: Option<String>,
    ) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(STEPS).map_err(db_err)?;

            let existing = match table.get((workflow_id, step_key)).map_err(db_err)? {
                Some(access) => Self::from_json(access.value())?,
                None => {
                    return Err(StoreError::StepNotFound {
                        workflow_id: workflow_id.to_string(),
                        step_key: step_key.to_string(),
                    })
                }
            };

            let mut record = existing;
            record.transition(next, output)?;

            let json = Self::to_json(&record)?;
            table
                .insert((workflow_id, step_key), json.as_str())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        debug!("{}/{} -> {}", workflow_id, step_key, next);
        Ok(())
    }
}

impl DurableStore for RedbStore {
    fn get_step(&self, workflow_id: &str, step_key: &str) -> Result<Option<StepRecord>> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(STEPS).map_err(db_err)?;

        match table.get((workflow_id, step_key)).map_err(db_err)? {
            Some(access) => Ok(Some(Self::from_json(access.value())?)),
            None => Ok(None),
        }
    }

    fn insert_running_step(&self, workflow_id: &str, step_key: &str) -> Result<()> {
        let record = StepRecord::running(workflow_id, step_key);
        let json = Self::to_json(&record)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(STEPS).map_err(db_err)?;

            let exists = table
                .get((workflow_id, step_key))
                .map_err(db_err)?
                .is_some();
            if exists {
                return Err(StoreError::DuplicateStep {
                    workflow_id: workflow_id.to_string(),
                    step_key: step_key.to_string(),
                });
            }

            table
                .insert((workflow_id, step_key), json.as_str())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

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
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(STEPS).map_err(db_err)?;

        let mut steps = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (key, value) = entry.map_err(db_err)?;
            let (owner, _) = key.value();
            if owner != workflow_id {
                continue;
            }
            steps.push(Self::from_json(value.value())?);
        }
        sort_by_ordinal(&mut steps);

        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use tempfile::tempdir;

    fn with_store(test: impl FnOnce(&dyn DurableStore)) {
        let temp_dir = tempdir().unwrap();
        let store = RedbStore::open(temp_dir.path().join("engine.redb")).unwrap();
        test(&store);
    }

    #[test]
    fn test_redb_store_contract() {
        with_store(contract::insert_and_get);
        with_store(contract::rejects_duplicate_insert);
        with_store(contract::completes_and_fails);
        with_store(contract::rejects_invalid_transitions);
        with_store(contract::max_sequence_is_numeric);
        with_store(contract::lists_in_ordinal_order);
        with_store(contract::latest_status_uses_numeric_ordinal);
    }

    #[test]
    fn test_redb_store_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("engine.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            store.insert_running_step("wf", "createEmployee-1").unwrap();
            store
                .mark_step_completed("wf", "createEmployee-1", "\"EMP-1\"")
                .unwrap();
            store.insert_running_step("wf", "provisionLaptop-2").unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        let steps = store.list_steps("wf").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[0].output.as_deref(), Some("\"EMP-1\""));
        assert_eq!(steps[1].status, StepStatus::Running);
    }

    #[test]
    fn test_redb_store_separates_workflows() {
        with_store(|store| {
            store.insert_running_step("wf-1", "a-1").unwrap();
            store.insert_running_step("wf-2", "a-1").unwrap();
            store.mark_step_failed("wf-2", "a-1").unwrap();

            let first = store.get_step("wf-1", "a-1").unwrap().unwrap();
            let second = store.get_step("wf-2", "a-1").unwrap().unwrap();
            assert_eq!(first.status, StepStatus::Running);
            assert_eq!(second.status, StepStatus::Failed);
        });
    }
}
