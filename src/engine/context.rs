//! Durable Context
//!
//! The façade workflow code calls [`DurableContext::step`] on. For every
//! call it resolves the step's durable identity, consults the store and
//! decides whether to return a recorded result, retry a stale attempt,
//! or run the side effect for the first time.
//!
//! # Identity and replay
//!
//! A step attempt is identified by `name-ordinal`. When a context is
//! created it loads the workflow's existing records into a replay
//! journal: a call to step `N` first revisits the lowest recorded
//! ordinal for `N` not yet visited in this run, and only then draws a
//! fresh ordinal from the sequence generator, which starts after the
//! highest recorded ordinal. Sequential workflows therefore land on
//! the same keys run after run, and concurrently launched steps with
//! distinct names do too, whatever order the scheduler runs them in.
//! Two concurrent calls sharing one name may still swap ordinals
//! between runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::monitoring::{EventType, ExecutionTimeline};
use crate::store::{DurableStore, StepKey, StepRecord, StepStatus};

use super::error::{BoxError, EngineError, Result};
use super::executor::StepExecutor;
use super::fault::FaultInjector;
use super::retry::RetryPolicy;
use super::sequence::{ReplayJournal, SequenceGenerator};

/// Orchestration handle for one workflow run.
///
/// `DurableContext` is `Sync`: share it by reference with worker
/// threads to run independent steps in parallel.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use durable_runner::engine::{BoxError, DurableContext};
/// use durable_runner::store::RedbStore;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = Arc::new(RedbStore::open("engine.redb")?);
///     let ctx = DurableContext::new("order-42", store)?;
///
///     let total: u64 = ctx.step("chargeCard", || Ok::<_, BoxError>(1999))?;
///     ctx.step("shipOrder", || {
///         println!("shipping order worth {}", total);
///         Ok::<_, BoxError>(())
///     })?;
///     Ok(())
/// }
/// ```
pub struct DurableContext {
    workflow_id: String,
    store: Arc<dyn DurableStore>,
    sequence: SequenceGenerator,
    journal: ReplayJournal,
    executor: StepExecutor,
    retry_policy: RetryPolicy,
    calls: AtomicU64,
    timeline: Mutex<ExecutionTimeline>,
}

impl DurableContext {
    /// Creates a context for `workflow_id`, recovering ordinal state
    /// from whatever the store already holds for it.
    pub fn new(workflow_id: impl Into<String>, store: Arc<dyn DurableStore>) -> Result<Self> {
        let workflow_id = workflow_id.into();

        let records = store.list_steps(&workflow_id)?;
        let journal = ReplayJournal::from_records(&records)?;
        let last_ordinal = store.max_sequence_for_workflow(&workflow_id)?;

        if records.is_empty() {
            info!("Workflow {}: no recorded steps, starting fresh", workflow_id);
        } else {
            info!(
                "Workflow {}: {} recorded attempts, last ordinal {}",
                workflow_id,
                records.len(),
                last_ordinal
            );
            log_recorded(&records);
        }

        Ok(Self {
            workflow_id,
            executor: StepExecutor::new(Arc::clone(&store)),
            store,
            sequence: SequenceGenerator::new(last_ordinal),
            journal,
            retry_policy: RetryPolicy::default(),
            calls: AtomicU64::new(0),
            timeline: Mutex::new(ExecutionTimeline::new()),
        })
    }

    /// Sets the bound on stale attempts per step call.
    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry_policy = policy;
    }

    /// Arms (or disarms) a simulated crash.
    pub fn set_fault_injector(&mut self, fault: Option<FaultInjector>) {
        if let Some(ref fault) = fault {
            warn!("Crash armed at step '{}'", fault.step_name());
        }
        self.executor.set_fault_injector(fault);
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Snapshot of the events recorded so far in this run.
    pub fn timeline(&self) -> ExecutionTimeline {
        self.timeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Runs a step durably.
    ///
    /// If an attempt of this call's identity already completed, `f` is
    /// not invoked and the recorded output is decoded and returned.
    /// Stale attempts (`FAILED`, or `RUNNING` left by a crash) are
    /// passed over. Those replayed from earlier runs always are; the
    /// retry policy bounds the ones met under fresh ordinals. Otherwise
    /// `f` runs once and its outcome is recorded.
    ///
    /// # Errors
    ///
    /// * [`EngineError::StepFailed`] - `f` returned an error
    /// * [`EngineError::Encode`] / [`EngineError::Decode`] - output
    ///   could not be encoded, or the recorded one decoded
    /// * [`EngineError::RetryLimitExceeded`] - too many stale attempts
    /// * [`EngineError::EmptyStepName`] - `step_name` is empty
    /// * [`EngineError::Store`] - the store failed
    pub fn step<T, F, E>(&self, step_name: &str, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        if step_name.is_empty() {
            return Err(EngineError::EmptyStepName);
        }

        let call_no = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Stale attempts passed over, and those among them that were
        // reached under fresh ordinals rather than replayed
        let mut stale = 0u32;
        let mut collisions = 0u32;

        loop {
            let (key, replayed) = self.allocate(step_name);
            let step_key = key.to_string();

            let Some(record) = self.store.get_step(&self.workflow_id, &step_key)? else {
                let delay = self.retry_policy.backoff(stale);
                if !delay.is_zero() {
                    debug!("Backing off {:?} before retrying '{}'", delay, step_name);
                    thread::sleep(delay);
                }

                info!("STEP {}: {} [{}]", call_no, humanize(step_name), step_key);
                self.record(&step_key, EventType::Started);

                let result = self.executor.execute(&self.workflow_id, &key, f);
                match result {
                    Ok(_) => {
                        info!("STEP {} COMPLETED", call_no);
                        self.record(&step_key, EventType::Completed);
                    }
                    Err(_) => self.record(&step_key, EventType::Failed),
                }
                return result;
            };

            match record.status {
                StepStatus::Completed => {
                    info!(
                        "STEP {}: {} (already completed, skipping)",
                        call_no,
                        humanize(step_name)
                    );
                    self.record(&step_key, EventType::Skipped);
                    return decode(&record);
                }
                StepStatus::Running => {
                    warn!(
                        "STEP {}: {} (zombie '{}' detected, retrying)",
                        call_no,
                        humanize(step_name),
                        step_key
                    );
                    self.store.mark_step_failed(&self.workflow_id, &step_key)?;
                    self.record(&step_key, EventType::Recovered);
                }
                StepStatus::Failed => {
                    debug!("Attempt '{}' failed previously, retrying", step_key);
                }
            }

            stale += 1;
            if replayed {
                // The journal is finite; only fresh ordinals need a bound
                continue;
            }

            collisions += 1;
            if !self.retry_policy.allows(collisions) {
                return Err(EngineError::RetryLimitExceeded {
                    step_name: step_name.to_string(),
                    attempts: collisions,
                });
            }
        }
    }

    /// Picks the identity for the next attempt of `step_name`, and
    /// whether it revisits an ordinal recorded by an earlier run.
    fn allocate(&self, step_name: &str) -> (StepKey, bool) {
        match self.journal.take(step_name) {
            Some(recorded) => (StepKey::new(step_name, recorded), true),
            None => (StepKey::new(step_name, self.sequence.next()), false),
        }
    }

    fn record(&self, step_key: &str, event_type: EventType) {
        self.timeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add_event(step_key, event_type);
    }
}

fn decode<T: DeserializeOwned>(record: &StepRecord) -> Result<T> {
    let payload = record.output.as_deref().unwrap_or("null");
    serde_json::from_str(payload).map_err(|source| EngineError::Decode {
        step_key: record.step_key.clone(),
        source,
    })
}

fn log_recorded(records: &[StepRecord]) {
    for record in records {
        debug!("  {} : {}", record.step_key, record.status);
    }
}

/// `provisionLaptop` -> `PROVISION LAPTOP`.
fn humanize(step_name: &str) -> String {
    let mut out = String::with_capacity(step_name.len() + 4);
    let mut prev_lower = false;

    for c in step_name.chars() {
        if c.is_uppercase() && prev_lower {
            out.push(' ');
        }
        prev_lower = c.is_lowercase();
        out.extend(c.to_uppercase());
    }
    out
}
