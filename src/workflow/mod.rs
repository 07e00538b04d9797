//! Workflow Module
//!
//! Workflow identity and the workflows built on the durable context.
//!
//! # Structure
//!
//! - [`identity`]: Workflow id persisted across restarts
//! - [`onboarding`]: Employee onboarding demo workflow

pub mod identity;
pub mod onboarding;

pub use identity::WorkflowId;
pub use onboarding::{OnboardingActions, OnboardingWorkflow, SimulatedActions, STEP_NAMES};
