//! Run Monitoring Module
//!
//! Records the execution timeline of a run.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Step timing and outcome for summaries and Gantt charts

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
