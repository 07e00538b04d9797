//! Run Monitoring Module
//!
//! Tracks what happened to each step attempt during a workflow run.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Per-attempt events and an ASCII Gantt chart

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
