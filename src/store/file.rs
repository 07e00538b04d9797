//! JSON File Store
//!
//! Keeps every step record of every workflow in a single JSON
//! document. The document is loaded once on open and rewritten after
//! each mutation: first to a sibling `.tmp` file, then renamed over the
//! original, so a crash mid-write leaves the previous version intact.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{sort_by_ordinal, DurableStore, Result, StepRecord, StepStatus, StoreError};

/// On-disk layout of the store file.
#[derive(Serialize, Deserialize, Default, Debug)]
struct StoreDocument {
    /// Records grouped by workflow, then keyed by step key
    workflows: BTreeMap<String, BTreeMap<String, StepRecord>>,
}

/// Step store persisted as a pretty-printed JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<StoreDocument>,
}

impl JsonFileStore {
    /// Opens the store at `path`, creating an empty one if the file
    /// does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let document = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let document: StoreDocument = serde_json::from_str(&content)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            let total: usize = document.workflows.values().map(|w| w.len()).sum();
            info!("Loaded {} step records from {}", total, path.display());
            document
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            info!("Creating step store at {}", path.display());
            StoreDocument::default()
        };

        let store = Self {
            path,
            document: Mutex::new(document),
        };
        Ok(store)
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, document: &StoreDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &self.path)?;

        debug!("Saved step store to {}", self.path.display());
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreDocument>> {
        self.document
            .lock()
            .map_err(|_| StoreError::Database("file store lock poisoned".to_string()))
    }

    fn transition(
        &self,
        workflow_id: &str,
        step_key: &str,
        next: StepStatus,
        output: Option<String>,
    ) -> Result<()> {
        let mut document = self.lock()?;

        let record = document
            .workflows
            .get_mut(workflow_id)
            .and_then(|steps| steps.get_mut(step_key))
            .ok_or_else(|| StoreError::StepNotFound {
                workflow_id: workflow_id.to_string(),
                step_key: step_key.to_string(),
            })?;

        let previous = record.clone();
        record.transition(next, output)?;

        if let Err(e) = self.save(&document) {
            // Keep memory in step with what is actually on disk
            if let Some(steps) = document.workflows.get_mut(workflow_id) {
                steps.insert(step_key.to_string(), previous);
            }
            return Err(e);
        }
        Ok(())
    }
}

impl DurableStore for JsonFileStore {
    fn get_step(&self, workflow_id: &str, step_key: &str) -> Result<Option<StepRecord>> {
        let document = self.lock()?;
        Ok(document
            .workflows
            .get(workflow_id)
            .and_then(|steps| steps.get(step_key))
            .cloned())
    }

    fn insert_running_step(&self, workflow_id: &str, step_key: &str) -> Result<()> {
        let mut document = self.lock()?;

        let steps = document.workflows.entry(workflow_id.to_string()).or_default();
        if steps.contains_key(step_key) {
            return Err(StoreError::DuplicateStep {
                workflow_id: workflow_id.to_string(),
                step_key: step_key.to_string(),
            });
        }
        steps.insert(
            step_key.to_string(),
            StepRecord::running(workflow_id, step_key),
        );

        if let Err(e) = self.save(&document) {
            if let Some(steps) = document.workflows.get_mut(workflow_id) {
                steps.remove(step_key);
            }
            return Err(e);
        }
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
        let document = self.lock()?;

        let mut steps: Vec<StepRecord> = document
            .workflows
            .get(workflow_id)
            .map(|steps| steps.values().cloned().collect())
            .unwrap_or_default();
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
        let store = JsonFileStore::open(temp_dir.path().join("engine.json")).unwrap();
        test(&store);
    }

    #[test]
    fn test_file_store_contract() {
        with_store(contract::insert_and_get);
        with_store(contract::rejects_duplicate_insert);
        with_store(contract::completes_and_fails);
        with_store(contract::rejects_invalid_transitions);
        with_store(contract::max_sequence_is_numeric);
        with_store(contract::lists_in_ordinal_order);
        with_store(contract::latest_status_uses_numeric_ordinal);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("engine.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.insert_running_step("wf", "a-1").unwrap();
            store.mark_step_completed("wf", "a-1", "\"EMP-1\"").unwrap();
            store.insert_running_step("wf", "b-2").unwrap();
        }

        let store = JsonFileStore::open(&path).unwrap();
        let a = store.get_step("wf", "a-1").unwrap().unwrap();
        assert_eq!(a.status, StepStatus::Completed);
        assert_eq!(a.output.as_deref(), Some("\"EMP-1\""));

        let b = store.get_step("wf", "b-2").unwrap().unwrap();
        assert_eq!(b.status, StepStatus::Running);
        assert_eq!(store.max_sequence_for_workflow("wf").unwrap(), 2);
    }

    #[test]
    fn test_file_store_creates_parent_dir() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("state").join("engine.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.insert_running_step("wf", "a-1").unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_store_each_write_is_complete_on_disk() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("engine.json");
        let store = JsonFileStore::open(&path).unwrap();

        for ordinal in 1..=3 {
            let key = format!("step-{}", ordinal);
            store.insert_running_step("wf", &key).unwrap();
            store.mark_step_completed("wf", &key, "null").unwrap();

            // Another reader sees every committed record
            let reader = JsonFileStore::open(&path).unwrap();
            assert_eq!(reader.list_steps("wf").unwrap().len(), ordinal);
            assert!(!path.with_extension("tmp").exists());
        }
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("engine.json");
        fs::write(&path, "not json").unwrap();

        let result = JsonFileStore::open(&path);
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
