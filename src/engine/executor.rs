//! Step Execution
//!
//! Brackets one attempt of a step's side effect between two durable
//! writes: `RUNNING` before the side effect, then `COMPLETED` with the
//! encoded output or `FAILED`. Retrying is the context's job.

use std::sync::Arc;

use log::{debug, error};
use serde::Serialize;

use crate::store::{DurableStore, StepKey};

use super::error::{BoxError, EngineError, Result};
use super::fault::FaultInjector;

/// Records exactly one attempt of a step.
pub struct StepExecutor {
    store: Arc<dyn DurableStore>,
    fault: Option<FaultInjector>,
}

impl StepExecutor {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store, fault: None }
    }

    /// Arms a simulated crash for one step name.
    pub fn set_fault_injector(&mut self, fault: Option<FaultInjector>) {
        self.fault = fault;
    }

    /// Executes one attempt of a step.
    ///
    /// # Arguments
    ///
    /// * `workflow_id` - Workflow the attempt belongs to
    /// * `key` - Fresh step key that has never been recorded
    /// * `f` - The side effect
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - Side effect succeeded and its output is recorded
    /// * `Err(EngineError::StepFailed)` - Side effect failed; recorded as `FAILED`
    /// * `Err(EngineError::Encode)` - Output not encodable; recorded as `FAILED`
    /// * `Err(EngineError::Store)` - A durable write failed
    pub fn execute<T, F, E>(&self, workflow_id: &str, key: &StepKey, f: F) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        let step_key = key.to_string();

        // Evidence of the attempt must be durable before the side effect
        self.store.insert_running_step(workflow_id, &step_key)?;

        if let Some(ref fault) = self.fault {
            fault.check(key.name(), &step_key);
        }

        let value = match f() {
            Ok(value) => value,
            Err(e) => {
                let source: BoxError = e.into();
                error!("Step '{}' failed: {}", step_key, source);
                self.store.mark_step_failed(workflow_id, &step_key)?;
                return Err(EngineError::StepFailed { step_key, source });
            }
        };

        let output = match serde_json::to_string(&value) {
            Ok(output) => output,
            Err(source) => {
                error!("Step '{}' output could not be encoded: {}", step_key, source);
                self.store.mark_step_failed(workflow_id, &step_key)?;
                return Err(EngineError::Encode { step_key, source });
            }
        };

        self.store
            .mark_step_completed(workflow_id, &step_key, &output)?;
        debug!("Step '{}' recorded output {}", step_key, output);

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StepStatus};
    use std::collections::HashMap;
    use std::panic::{self, AssertUnwindSafe};

    fn executor() -> (Arc<MemoryStore>, StepExecutor) {
        let store = Arc::new(MemoryStore::new());
        let executor = StepExecutor::new(store.clone());
        (store, executor)
    }

    #[test]
    fn test_execute_records_completed_output() {
        let (store, executor) = executor();
        let key = StepKey::new("createEmployee", 1);

        let value: String = executor
            .execute("wf", &key, || Ok::<_, BoxError>("EMP-7".to_string()))
            .unwrap();
        assert_eq!(value, "EMP-7");

        let record = store.get_step("wf", "createEmployee-1").unwrap().unwrap();
        assert_eq!(record.status, StepStatus::Completed);
        assert_eq!(record.output.as_deref(), Some("\"EMP-7\""));
    }

    #[test]
    fn test_execute_unit_output() {
        let (store, executor) = executor();
        let key = StepKey::new("sendWelcomeEmail", 4);

        executor
            .execute("wf", &key, || Ok::<_, BoxError>(()))
            .unwrap();

        let record = store.get_step("wf", "sendWelcomeEmail-4").unwrap().unwrap();
        assert_eq!(record.status, StepStatus::Completed);
        assert_eq!(record.output.as_deref(), Some("null"));
    }

    #[test]
    fn test_execute_failure_is_recorded_and_wrapped() {
        let (store, executor) = executor();
        let key = StepKey::new("provisionLaptop", 2);

        let err = executor
            .execute("wf", &key, || Err::<(), _>("warehouse offline"))
            .unwrap_err();

        assert!(matches!(err, EngineError::StepFailed { .. }));
        assert_eq!(err.step_key(), Some("provisionLaptop-2"));
        assert!(err.to_string().contains("warehouse offline"));

        let record = store.get_step("wf", "provisionLaptop-2").unwrap().unwrap();
        assert_eq!(record.status, StepStatus::Failed);
        assert!(record.output.is_none());
    }

    #[test]
    fn test_execute_encode_failure_is_recorded() {
        let (store, executor) = executor();
        let key = StepKey::new("mapStep", 1);

        // JSON object keys must be strings
        let err = executor
            .execute("wf", &key, || {
                let mut map = HashMap::new();
                map.insert(vec![1u8], 1u8);
                Ok::<_, BoxError>(map)
            })
            .unwrap_err();

        assert!(matches!(err, EngineError::Encode { .. }));
        let record = store.get_step("wf", "mapStep-1").unwrap().unwrap();
        assert_eq!(record.status, StepStatus::Failed);
    }

    #[test]
    fn test_execute_rejects_recorded_key() {
        let (store, executor) = executor();
        store.insert_running_step("wf", "a-1").unwrap();

        let mut ran = false;
        let err = executor
            .execute("wf", &StepKey::new("a", 1), || {
                ran = true;
                Ok::<_, BoxError>(())
            })
            .unwrap_err();

        assert!(matches!(err, EngineError::Store(_)));
        assert!(!ran);
    }

    #[test]
    fn test_fault_leaves_running_record() {
        let (store, mut executor) = executor();
        executor.set_fault_injector(Some(FaultInjector::panic_at("provisionLaptop")));

        let mut ran = false;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            executor.execute("wf", &StepKey::new("provisionLaptop", 2), || {
                ran = true;
                Ok::<_, BoxError>(())
            })
        }));

        assert!(result.is_err());
        assert!(!ran);
        let record = store.get_step("wf", "provisionLaptop-2").unwrap().unwrap();
        assert_eq!(record.status, StepStatus::Running);
    }
}
