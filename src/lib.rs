//! DurableRunner - Durable Workflow Execution Engine
//!
//! Runs workflows as sequences of named steps whose outcomes are recorded
//! in a persistent store. After a crash, re-running the same workflow
//! skips every step that already completed and returns its recorded
//! output, so side effects happen once.
//!
//! # Architecture
//!
//! The library is organized into five main modules:
//!
//! - [`engine`]: Durable context, step executor, retry and fan-out
//! - [`store`]: Step records and the storage backends behind them
//! - [`workflow`]: Workflow identity and the onboarding workflow
//! - [`monitoring`]: Execution timeline
//! - [`config`]: Engine settings loaded from YAML
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use durable_runner::store::RedbStore;
//! use durable_runner::DurableContext;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(RedbStore::open("engine.redb")?);
//!     let ctx = DurableContext::new("order-1001", store)?;
//!
//!     // Runs once; later runs return the recorded value
//!     let invoice: String = ctx.step("createInvoice", || {
//!         Ok::<_, std::io::Error>("INV-1001".to_string())
//!     })?;
//!
//!     ctx.step("sendInvoice", || {
//!         println!("sending {}", invoice);
//!         Ok::<_, std::io::Error>(())
//!     })?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod monitoring;
pub mod store;
pub mod workflow;

// Re-export commonly used types
pub use config::{Backend, EngineConfig};
pub use engine::{DurableContext, EngineError, FaultInjector, RetryPolicy, WorkerPool};
pub use store::{DurableStore, StepKey, StepRecord, StepStatus, StoreError};
pub use workflow::WorkflowId;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "DurableRunner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "DurableRunner");
    }

    #[test]
    fn test_module_exports_step_key() {
        let key = StepKey::new("createEmployee", 1);
        assert_eq!(key.to_string(), "createEmployee-1");
    }

    #[test]
    fn test_module_exports_config() {
        let config = EngineConfig::default();
        assert_eq!(config.backend, Backend::Redb);
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
