//! Durable Store Module
//!
//! The persistence contract for step records and its implementations.
//!
//! # Backends
//!
//! - [`memory`]: In-process map, for tests and throwaway runs
//! - [`file`]: Single JSON document rewritten atomically on each write
//! - [`redb_store`]: Embedded transactional database (default)

pub mod file;
pub mod memory;
pub mod record;
pub mod redb_store;

use thiserror::Error;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use record::{sort_by_ordinal, StepKey, StepRecord, StepStatus};
pub use redb_store::RedbStore;

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("step '{step_key}' is already recorded for workflow '{workflow_id}'")]
    DuplicateStep {
        workflow_id: String,
        step_key: String,
    },

    #[error("no record of step '{step_key}' in workflow '{workflow_id}'")]
    StepNotFound {
        workflow_id: String,
        step_key: String,
    },

    #[error("step '{step_key}' cannot move from {from} to {to}")]
    InvalidTransition {
        step_key: String,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("malformed step key '{0}'")]
    InvalidStepKey(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence contract for step records.
///
/// Every method is a point lookup or write keyed by
/// `(workflow_id, step_key)`, except the two per-workflow scans used
/// for ordinal recovery and status inspection. Implementations must
/// serialize their own operations; callers share one store across
/// worker threads.
pub trait DurableStore: Send + Sync {
    /// Fetches the record for a step attempt, if one exists.
    fn get_step(&self, workflow_id: &str, step_key: &str) -> Result<Option<StepRecord>>;

    /// Records that an attempt has started.
    ///
    /// Fails with [`StoreError::DuplicateStep`] rather than overwriting
    /// an existing record.
    fn insert_running_step(&self, workflow_id: &str, step_key: &str) -> Result<()>;

    /// Moves a running attempt to `COMPLETED` with its JSON output.
    fn mark_step_completed(&self, workflow_id: &str, step_key: &str, output: &str) -> Result<()>;

    /// Moves a running attempt to `FAILED`.
    fn mark_step_failed(&self, workflow_id: &str, step_key: &str) -> Result<()>;

    /// Lists every record of a workflow, ordered by numeric ordinal.
    fn list_steps(&self, workflow_id: &str) -> Result<Vec<StepRecord>>;

    /// Highest ordinal recorded for a workflow, or 0 if none.
    ///
    /// Ordinals are compared numerically, so `a-10` beats `a-9`.
    fn max_sequence_for_workflow(&self, workflow_id: &str) -> Result<u64> {
        let records = self.list_steps(workflow_id)?;
        max_ordinal(&records)
    }

    /// Status of the most recent attempt of a step name.
    fn latest_status(&self, workflow_id: &str, step_name: &str) -> Result<Option<StepStatus>> {
        let mut latest: Option<(u64, StepStatus)> = None;

        for record in self.list_steps(workflow_id)? {
            let key = record.key()?;
            if key.name() != step_name {
                continue;
            }
            if latest.map_or(true, |(ordinal, _)| key.ordinal() > ordinal) {
                latest = Some((key.ordinal(), record.status));
            }
        }

        Ok(latest.map(|(_, status)| status))
    }
}

/// Highest numeric ordinal among a set of records.
pub fn max_ordinal(records: &[StepRecord]) -> Result<u64> {
    records
        .iter()
        .map(|record| record.key().map(|key| key.ordinal()))
        .try_fold(0, |max, ordinal| ordinal.map(|o| max.max(o)))
}
