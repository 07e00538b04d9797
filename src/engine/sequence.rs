//! Ordinal allocation.
//!
//! Step identity is `name-ordinal`. Fresh ordinals come from one
//! atomic counter per context; ordinals already recorded by an earlier
//! run are handed back out by name through the [`ReplayJournal`] so a
//! restarted workflow lands on the same keys.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::store::{Result, StepRecord};

/// Run-scoped monotonically increasing counter.
///
/// Seeded with the highest ordinal already recorded for the workflow,
/// so the first fresh ordinal is always past anything on disk.
#[derive(Debug)]
pub struct SequenceGenerator {
    counter: AtomicU64,
}

impl SequenceGenerator {
    pub fn new(initial: u64) -> Self {
        Self {
            counter: AtomicU64::new(initial),
        }
    }

    /// Atomically increments and returns the next ordinal.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last ordinal handed out (or the seed if none yet).
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// Ordinals recorded by previous runs, queued per step name in
/// ascending numeric order.
///
/// Each recorded ordinal is handed out at most once per context.
#[derive(Debug, Default)]
pub struct ReplayJournal {
    pending: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl ReplayJournal {
    /// Builds the journal from a workflow's records.
    pub fn from_records(records: &[StepRecord]) -> Result<Self> {
        let mut keys = records
            .iter()
            .map(|record| record.key())
            .collect::<Result<Vec<_>>>()?;
        keys.sort_by_key(|key| key.ordinal());

        let mut pending: HashMap<String, VecDeque<u64>> = HashMap::new();
        for key in keys {
            pending
                .entry(key.name().to_string())
                .or_default()
                .push_back(key.ordinal());
        }

        Ok(Self {
            pending: Mutex::new(pending),
        })
    }

    /// Takes the lowest unconsumed recorded ordinal for a step name.
    pub fn take(&self, step_name: &str) -> Option<u64> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.get_mut(step_name).and_then(|queue| queue.pop_front())
    }

    /// Number of recorded attempts not yet revisited.
    pub fn remaining(&self) -> usize {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.values().map(|queue| queue.len()).sum()
    }
}
