//! Simple Workflows
//!
//! A fixed two-step template: a start step, a default next step, and one
//! error handler shared by both.
//!
//! ```text
//!   start_workflow ──next──▶ execute_next_step
//!          │                       │
//!       on_error                on_error
//!          ▼                       ▼
//!     handle_error            handle_error
//! ```
//!
//! Implementors only write [`SimpleWorkflow::first_step`]. The default
//! [`SimpleWorkflow::handle_error`] clears `continue_on_error` and rethrows
//! the failure, so the run aborts with the original [`StepFailure`].
//!
//! [`StepFailure`]: crate::error::StepFailure

use std::sync::Arc;

use log::debug;

use crate::error::{Result, StepResult};
use crate::execution::engine::{Traversal, Workflow};
use crate::workflow::context::ExecutionContext;
use crate::workflow::model::Step;
use crate::workflow::resolver::{ResolvedWorkflow, StepRegistry};

/// Member name of the start step.
pub const START_STEP: &str = "start_workflow";
/// Member name of the default next step.
pub const NEXT_STEP: &str = "execute_next_step";
/// Member name of the shared error handler.
pub const ERROR_HANDLER: &str = "handle_error";

/// Template for a workflow made of a first step and an optional next step.
pub trait SimpleWorkflow: Send + Sync + 'static {
    /// Work of the start step.
    fn first_step(&self, ctx: &mut ExecutionContext) -> StepResult;

    /// Work run after a successful first step; does nothing by default.
    fn next_step(&self, _ctx: &mut ExecutionContext) -> StepResult {
        Ok(())
    }

    /// Handles a failure of either step.
    ///
    /// Clears `continue_on_error` and rethrows the failure.
    fn handle_error(&self, ctx: &mut ExecutionContext) -> StepResult {
        ctx.set_continue_on_error(false);
        match ctx.last_error() {
            Some(failure) => Err(Box::new(failure.clone())),
            None => Ok(()),
        }
    }

    /// Wires the template into a runnable workflow.
    fn into_workflow(self) -> Result<SimpleChain<Self>>
    where
        Self: Sized,
    {
        SimpleChain::new(self)
    }
}

/// Runnable form of a [`SimpleWorkflow`].
pub struct SimpleChain<W> {
    template: Arc<W>,
    workflow: ResolvedWorkflow<StepRegistry>,
}

impl<W: SimpleWorkflow> SimpleChain<W> {
    /// Registers the template's steps and their links.
    pub fn new(template: W) -> Result<Self> {
        let template = Arc::new(template);
        let mut registry = StepRegistry::new();

        let inner = Arc::clone(&template);
        registry
            .register(Step::new(START_STEP, move |ctx| inner.first_step(ctx)))?
            .start(None)
            .next(NEXT_STEP, None)?
            .on_error(ERROR_HANDLER, None)?;

        let inner = Arc::clone(&template);
        registry
            .register(Step::new(NEXT_STEP, move |ctx| inner.next_step(ctx)))?
            .on_error(ERROR_HANDLER, None)?;

        let inner = Arc::clone(&template);
        registry.register(Step::new(ERROR_HANDLER, move |ctx| inner.handle_error(ctx)))?;

        registry.validate(None)?;
        debug!("Simple workflow wired with {} steps", registry.len());

        Ok(Self {
            template,
            workflow: ResolvedWorkflow::new(registry, None),
        })
    }

    /// The wrapped template.
    pub fn template(&self) -> &W {
        &self.template
    }
}

impl<W: SimpleWorkflow> Workflow for SimpleChain<W> {
    fn traverse(&self) -> Box<dyn Traversal + '_> {
        self.workflow.traverse()
    }
}
