//! Crash simulation.
//!
//! A [`FaultInjector`] is handed to a context explicitly and fires once
//! a targeted step has written its `RUNNING` record but before its side
//! effect runs, leaving a zombie record behind.

use log::error;

/// How an injected fault brings the attempt down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Terminate the process immediately with the given exit code
    Exit(i32),
    /// Unwind the calling thread
    Panic,
}

/// Simulates a crash at a named step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultInjector {
    step_name: String,
    mode: FaultMode,
}

impl FaultInjector {
    pub fn new(step_name: impl Into<String>, mode: FaultMode) -> Self {
        Self {
            step_name: step_name.into(),
            mode,
        }
    }

    /// Crash the process with exit code 1 at `step_name`.
    pub fn exit_at(step_name: impl Into<String>) -> Self {
        Self::new(step_name, FaultMode::Exit(1))
    }

    /// Panic the calling thread at `step_name`.
    pub fn panic_at(step_name: impl Into<String>) -> Self {
        Self::new(step_name, FaultMode::Panic)
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    pub fn mode(&self) -> FaultMode {
        self.mode
    }

    pub fn targets(&self, step_name: &str) -> bool {
        self.step_name == step_name
    }

    /// Fires the fault if `step_name` is the target.
    pub fn check(&self, step_name: &str, step_key: &str) {
        if !self.targets(step_name) {
            return;
        }

        error!("Simulated crash at step '{}'", step_key);
        match self.mode {
            FaultMode::Exit(code) => std::process::exit(code),
            FaultMode::Panic => panic!("simulated crash at step '{}'", step_key),
        }
    }
}
