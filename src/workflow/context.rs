//! Execution Context
//!
//! Mutable state handed to exactly one step invocation. The engine seeds
//! a fresh context before every step from the values the previous step
//! left behind, and reads the carry-over fields back once the step
//! returns.

use std::fmt;

use serde_json::Value;

use crate::error::{StepFailure, StepResult};
use crate::workflow::model::Step;

/// Runtime override of the statically linked successor.
#[derive(Debug, Clone)]
pub enum NextStep {
    /// Run an ad-hoc step that has no links of its own.
    Step(Step),
    /// Jump to an existing node (or registered member) by step name.
    Goto(String),
}

/// Per-invocation state threaded through one run.
pub struct ExecutionContext {
    arguments: Vec<Value>,
    step_name: String,
    value: Option<Value>,
    previous_value: Option<Value>,
    next_value: Option<Value>,
    result: Option<Value>,
    last_error: Option<StepFailure>,
    step_failure: Option<StepFailure>,
    continue_on_error: bool,
    next: Option<NextStep>,
    cancel: bool,
    has_been_canceled: bool,
    throw_errors: bool,
}

/// Carry-over values used to seed the next context.
#[derive(Debug, Clone)]
pub(crate) struct Carry {
    pub value: Option<Value>,
    pub previous_value: Option<Value>,
    pub result: Option<Value>,
    pub last_error: Option<StepFailure>,
    pub throw_errors: bool,
}

impl Default for Carry {
    fn default() -> Self {
        Self {
            value: None,
            previous_value: None,
            result: None,
            last_error: None,
            throw_errors: true,
        }
    }
}

impl ExecutionContext {
    pub(crate) fn seeded(arguments: &[Value], step_name: &str, carry: &Carry) -> Self {
        Self {
            arguments: arguments.to_vec(),
            step_name: step_name.to_string(),
            value: carry.value.clone(),
            previous_value: carry.previous_value.clone(),
            next_value: None,
            result: carry.result.clone(),
            last_error: carry.last_error.clone(),
            step_failure: None,
            continue_on_error: false,
            next: None,
            cancel: false,
            has_been_canceled: false,
            throw_errors: carry.throw_errors,
        }
    }

    /// Values supplied to `execute`; fixed for the whole run.
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Returns the positional argument at `index`.
    pub fn argument(&self, index: usize) -> Option<&Value> {
        self.arguments.get(index)
    }

    /// Name of the step receiving this context.
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Run-scoped variable, persisted across the whole chain.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = Some(value.into());
    }

    pub fn clear_value(&mut self) {
        self.value = None;
    }

    /// Value the previous step handed over through `set_next_value`.
    pub fn previous_value(&self) -> Option<&Value> {
        self.previous_value.as_ref()
    }

    pub fn next_value(&self) -> Option<&Value> {
        self.next_value.as_ref()
    }

    /// Hands a value to the following step only.
    pub fn set_next_value(&mut self, value: impl Into<Value>) {
        self.next_value = Some(value.into());
    }

    /// Current return value of the chain.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: impl Into<Value>) {
        self.result = Some(result.into());
    }

    pub fn clear_result(&mut self) {
        self.result = None;
    }

    /// Last captured failure; empty if the prior step succeeded.
    pub fn last_error(&self) -> Option<&StepFailure> {
        self.last_error.as_ref()
    }

    /// Failure raised by this context's own step, once it has run.
    pub fn step_failure(&self) -> Option<&StepFailure> {
        self.step_failure.as_ref()
    }

    pub fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }

    /// Suppresses re-raising when this step fails.
    pub fn set_continue_on_error(&mut self, continue_on_error: bool) {
        self.continue_on_error = continue_on_error;
    }

    pub fn next(&self) -> Option<&NextStep> {
        self.next.as_ref()
    }

    /// Runs `step` next instead of the linked successor.
    pub fn set_next(&mut self, step: Step) {
        self.next = Some(NextStep::Step(step));
    }

    /// Runs a context-less action next instead of the linked successor.
    pub fn set_next_action<F>(&mut self, name: impl AsRef<str>, action: F)
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        self.set_next(Step::from_action(name, action));
    }

    /// Continues with the node or member named `name`.
    pub fn goto(&mut self, name: impl Into<String>) {
        self.next = Some(NextStep::Goto(name.into()));
    }

    pub fn clear_next(&mut self) {
        self.next = None;
    }

    /// Stops the chain once this step returns.
    pub fn cancel(&mut self) {
        self.cancel = true;
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel
    }

    /// True on the context of the step that canceled the run.
    pub fn has_been_canceled(&self) -> bool {
        self.has_been_canceled
    }

    pub fn throw_errors(&self) -> bool {
        self.throw_errors
    }

    /// Controls whether deferred failures are raised when the run ends.
    pub fn set_throw_errors(&mut self, throw_errors: bool) {
        self.throw_errors = throw_errors;
    }

    pub(crate) fn record_failure(&mut self, failure: StepFailure) {
        self.last_error = Some(failure.clone());
        self.step_failure = Some(failure);
    }

    pub(crate) fn mark_canceled(&mut self) {
        self.has_been_canceled = true;
    }

    /// Values that seed the following context.
    pub(crate) fn carry(&self) -> Carry {
        Carry {
            value: self.value.clone(),
            previous_value: self.next_value.clone(),
            result: self.result.clone(),
            last_error: self.step_failure.clone(),
            throw_errors: self.throw_errors,
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::seeded(&[], "", &Carry::default())
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("step_name", &self.step_name)
            .field("arguments", &self.arguments)
            .field("value", &self.value)
            .field("previous_value", &self.previous_value)
            .field("next_value", &self.next_value)
            .field("result", &self.result)
            .field("last_error", &self.last_error)
            .field("continue_on_error", &self.continue_on_error)
            .field("next", &self.next)
            .field("cancel", &self.cancel)
            .field("has_been_canceled", &self.has_been_canceled)
            .field("throw_errors", &self.throw_errors)
            .finish()
    }
}
