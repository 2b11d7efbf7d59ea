//! Stepchain - In-Process Step Chain Engine
//!
//! Runs ordered chains of steps that share one mutable execution context
//! per step, with per-step error handlers, runtime re-routing of the next
//! step, deferred failure aggregation and cooperative cancellation.
//!
//! # Architecture
//!
//! The library is organized into three main modules:
//!
//! - [`workflow`]: Steps, chains, contexts, builders, resolvers and YAML definitions
//! - [`execution`]: The lazy traversal engine, commands, functions and synchronization
//! - [`monitoring`]: Execution timeline of each run
//!
//! # Example
//!
//! ```rust
//! use stepchain::workflow::{ConfigurableWorkflow, Step};
//! use stepchain::Workflow;
//!
//! fn main() -> Result<(), stepchain::Error> {
//!     let mut workflow = ConfigurableWorkflow::new();
//!     workflow
//!         .start_with(Step::new("parse", |ctx| {
//!             let length = ctx.argument(0).and_then(|v| v.as_str()).map_or(0, str::len);
//!             ctx.set_next_value(length);
//!             Ok(())
//!         }))?
//!         .continue_with(Step::new("report", |ctx| {
//!             let length = ctx.previous_value().cloned().unwrap_or_default();
//!             ctx.set_result(length);
//!             Ok(())
//!         }))?;
//!
//!     let result = workflow.execute_list(vec!["hello".into()])?;
//!     assert_eq!(result, Some(5.into()));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use error::{BoxError, Error, Result, StepFailure, StepResult};
pub use execution::engine::{RunReport, Workflow};
pub use execution::sync::SyncRoot;
pub use workflow::builder::ConfigurableWorkflow;
pub use workflow::context::ExecutionContext;
pub use workflow::model::Step;
pub use workflow::parser::load_definition;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Stepchain";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "Stepchain");
    }

    #[test]
    fn test_module_exports_step() {
        let step = Step::new("test", |_| Ok(()));
        assert_eq!(step.name(), "test");
    }

    #[test]
    fn test_module_exports_workflow() {
        let workflow = ConfigurableWorkflow::new();
        assert!(workflow.chain().is_empty());
        assert_eq!(workflow.execute(&[]).unwrap(), None);
    }

    #[test]
    fn test_workflow_as_trait_object() {
        let mut workflow = ConfigurableWorkflow::new();
        workflow
            .start_with(Step::new("answer", |ctx| {
                ctx.set_result(42);
                Ok(())
            }))
            .unwrap();

        let boxed: Box<dyn Workflow> = Box::new(workflow);
        assert_eq!(boxed.execute(&[]).unwrap(), Some(json!(42)));
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
