//! Durable Execution Module
//!
//! Runs named steps so that a crash never loses a recorded result and
//! never silently re-runs a completed side effect.
//!
//! # Architecture
//!
//! - [`context`]: The `step(name, fn)` façade and the retry protocol
//! - [`executor`]: The `RUNNING` -> side effect -> `COMPLETED`/`FAILED` bracket
//! - [`sequence`]: Ordinal allocation and replay of recorded ordinals
//! - [`retry`]: Bounds on stale attempts per call
//! - [`pool`]: Fan-out of independent steps onto worker threads
//! - [`fault`]: Crash simulation at a chosen step

pub mod context;
pub mod error;
pub mod executor;
pub mod fault;
pub mod pool;
pub mod retry;
pub mod sequence;

pub use context::DurableContext;
pub use error::{BoxError, EngineError, Result};
pub use executor::StepExecutor;
pub use fault::{FaultInjector, FaultMode};
pub use pool::{Task, WorkerPool};
pub use retry::RetryPolicy;
pub use sequence::{ReplayJournal, SequenceGenerator};
