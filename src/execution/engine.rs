//! Chain Execution Engine
//!
//! The state machine that walks a chain one step per pull:
//! - Seeds a fresh [`ExecutionContext`] for every step
//! - Follows success links, error redirects and runtime overrides
//! - Collects failures and raises them together once the run ends
//! - Stops after a step requests cancellation
//!
//! A run is consumed through the two-phase [`Traversal`] API: `advance`
//! reports whether a unit is left, `invoke` runs it. [`Workflow::run`]
//! drives that loop to completion.

use std::fmt;
use std::time::Instant;

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::error::{Error, Result, StepFailure};
use crate::execution::state::{Cursor, RunState};
use crate::execution::sync::{SyncRoot, SynchronizedWorkflow};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::context::{ExecutionContext, NextStep};
use crate::workflow::model::{Chain, NodeId, Step};

/// Node-resolution strategy of a chain.
///
/// The engine does not care whether links come from a prebuilt arena or
/// from a resolver looking up registered members; it only asks for the
/// start node, a node's step and a node's links.
pub trait Topology: Send + Sync {
    type Node: Clone + fmt::Debug;

    /// First node of the chain, if any.
    fn first(&self) -> Result<Option<Self::Node>>;

    /// Step carried by `node`.
    fn step(&self, node: &Self::Node) -> Result<Step>;

    /// Successor of `node` on success.
    fn next(&self, node: &Self::Node) -> Result<Option<Self::Node>>;

    /// Error handler of `node`.
    fn on_error(&self, node: &Self::Node) -> Result<Option<Self::Node>>;

    /// Node whose step is named `name`, used by `goto`.
    fn find(&self, name: &str) -> Result<Option<Self::Node>>;
}

impl Topology for Chain {
    type Node = NodeId;

    fn first(&self) -> Result<Option<NodeId>> {
        Ok(self.head())
    }

    fn step(&self, node: &NodeId) -> Result<Step> {
        Chain::step(self, *node)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("unknown node {}", node.index())))
    }

    fn next(&self, node: &NodeId) -> Result<Option<NodeId>> {
        Ok(Chain::next(self, *node))
    }

    fn on_error(&self, node: &NodeId) -> Result<Option<NodeId>> {
        Ok(Chain::on_error(self, *node))
    }

    fn find(&self, name: &str) -> Result<Option<NodeId>> {
        Chain::find(self, name)
    }
}

/// Lazy, single-pass sequence of runnable steps.
///
/// Calling `advance` without `invoke` in between reports the same unit
/// again. Once `advance` returns `Ok(false)` (or the aggregate failure)
/// the traversal is exhausted.
pub trait Traversal {
    /// Moves to the next runnable unit.
    ///
    /// Returns `Ok(false)` when the sequence is exhausted. If failures were
    /// deferred and `throw_errors` is still set, the call that reaches the
    /// end returns [`Error::AggregateFailure`] instead.
    fn advance(&mut self) -> Result<bool>;

    /// Runs the current unit with the call arguments and returns its context.
    fn invoke(&mut self, args: &[Value]) -> Result<ExecutionContext>;
}

impl<T: Traversal + ?Sized> Traversal for Box<T> {
    fn advance(&mut self) -> Result<bool> {
        (**self).advance()
    }

    fn invoke(&mut self, args: &[Value]) -> Result<ExecutionContext> {
        (**self).invoke(args)
    }
}

/// Traversal over any [`Topology`].
pub struct ChainTraversal<'t, T: Topology> {
    topology: &'t T,
    state: RunState<T::Node>,
    started: bool,
}

impl<'t, T: Topology> ChainTraversal<'t, T> {
    /// Creates a traversal with fresh run state.
    pub fn new(topology: &'t T) -> Self {
        Self {
            topology,
            state: RunState::new(),
            started: false,
        }
    }

    /// Number of steps invoked so far.
    pub fn steps_run(&self) -> usize {
        self.state.steps_run
    }

    /// Failures recorded so far, in order.
    pub fn failures(&self) -> &[StepFailure] {
        &self.state.failures
    }

    /// True once a step requested cancellation.
    pub fn has_been_canceled(&self) -> bool {
        self.state.has_been_canceled
    }

    /// True once `advance` reported the end of the sequence.
    pub fn is_exhausted(&self) -> bool {
        self.state.is_finished()
    }

    fn successor(&self, node: Option<&T::Node>) -> Result<Option<Cursor<T::Node>>> {
        match node {
            Some(node) => Ok(self.topology.next(node)?.map(Cursor::Linked)),
            None => Ok(None),
        }
    }

    fn resolve_override(&self, next: NextStep) -> Result<Cursor<T::Node>> {
        match next {
            NextStep::Step(step) => {
                step.ensure_named("next step")?;
                Ok(Cursor::Detached(step))
            }
            NextStep::Goto(name) => match self.topology.find(&name)? {
                Some(node) => Ok(Cursor::Linked(node)),
                None => Err(Error::InvalidArgument(format!(
                    "no step named '{}' to continue with",
                    name
                ))),
            },
        }
    }
}

impl<'t, T: Topology> Traversal for ChainTraversal<'t, T> {
    fn advance(&mut self) -> Result<bool> {
        if !self.started {
            self.started = true;
            self.state.current = self.topology.first()?.map(Cursor::Linked);
        }

        if self.state.has_work_remaining() {
            return Ok(true);
        }

        if let Some(failures) = self.state.finish() {
            error!(
                "Run finished with {} unhandled failure(s)",
                failures.len()
            );
            return Err(Error::AggregateFailure(failures));
        }

        Ok(false)
    }

    fn invoke(&mut self, args: &[Value]) -> Result<ExecutionContext> {
        let cursor = match self.state.current.take() {
            Some(cursor) if self.started && !self.state.has_been_canceled => cursor,
            other => {
                self.state.current = other;
                return Err(Error::InvalidArgument(
                    "no step to invoke; advance the traversal first".to_string(),
                ));
            }
        };

        let (step, node) = match cursor {
            Cursor::Linked(node) => (self.topology.step(&node)?, Some(node)),
            Cursor::Detached(step) => (step, None),
        };
        let handling_error = std::mem::take(&mut self.state.handling_error);

        let mut ctx = ExecutionContext::seeded(args, step.name(), &self.state.carry);
        self.state.steps_run += 1;
        debug!("Running step '{}'", step.name());

        let mut next = match step.run(&mut ctx) {
            Ok(()) => self.successor(node.as_ref())?,
            Err(cause) => {
                let failure = StepFailure::from_cause(step.name(), cause);
                ctx.record_failure(failure.clone());
                self.state.mark_failed(failure.clone());

                let handler = match (&node, handling_error) {
                    (Some(node), false) => self.topology.on_error(node)?,
                    _ => None,
                };

                if handling_error {
                    error!("Error handler '{}' failed: {}", step.name(), failure.cause());
                    return Err(Error::StepFailure(failure));
                } else if let Some(handler) = handler {
                    info!(
                        "Step '{}' failed, redirecting to its error handler: {}",
                        step.name(),
                        failure.cause()
                    );
                    self.state.handling_error = true;
                    Some(Cursor::Linked(handler))
                } else if ctx.continue_on_error() {
                    warn!("Step '{}' failed, continuing: {}", step.name(), failure.cause());
                    self.successor(node.as_ref())?
                } else {
                    error!("Step '{}' failed: {}", step.name(), failure.cause());
                    return Err(Error::StepFailure(failure));
                }
            }
        };

        if let Some(over) = ctx.next().cloned() {
            let cursor = self.resolve_override(over)?;
            debug!("Step '{}' overrides its successor", step.name());
            self.state.handling_error = false;
            next = Some(cursor);
        }

        if ctx.is_cancel_requested() {
            info!("Run canceled by step '{}'", step.name());
            self.state.has_been_canceled = true;
            ctx.mark_canceled();
        }

        self.state.carry = ctx.carry();
        self.state.current = next;
        Ok(ctx)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Result left by the last step
    pub result: Option<Value>,
    /// True if a step canceled the run
    pub canceled: bool,
    /// Number of steps invoked
    pub steps: usize,
    /// Per-step timing and outcome
    pub timeline: ExecutionTimeline,
}

/// Drives a traversal to completion.
///
/// Failures that abort the run propagate immediately; deferred failures
/// surface when the end of the sequence is reached.
pub fn drive(traversal: &mut dyn Traversal, args: &[Value]) -> Result<RunReport> {
    let mut timeline = ExecutionTimeline::new();
    let mut result = None;
    let mut canceled = false;
    let mut steps = 0;

    while traversal.advance()? {
        let started = Instant::now();
        let ctx = traversal.invoke(args)?;

        let event_type = if ctx.step_failure().is_some() {
            EventType::Failed
        } else if ctx.has_been_canceled() {
            EventType::Canceled
        } else {
            EventType::Completed
        };
        timeline.add_event(ctx.step_name(), event_type, started);

        steps += 1;
        canceled = ctx.has_been_canceled();
        result = ctx.result().cloned();
    }

    debug!("Run finished after {} step(s)", steps);

    Ok(RunReport {
        result,
        canceled,
        steps,
        timeline,
    })
}

/// An executable chain of steps.
///
/// Only the topology is shared between calls; every call gets its own
/// traversal and run state, so a workflow can be executed repeatedly.
pub trait Workflow: Send + Sync {
    /// Starts a new traversal of the chain.
    fn traverse(&self) -> Box<dyn Traversal + '_>;

    /// Runs the chain to completion and reports how it went.
    fn run(&self, args: &[Value]) -> Result<RunReport> {
        let mut traversal = self.traverse();
        drive(&mut traversal, args)
    }

    /// Runs the chain to completion and returns its final result.
    fn execute(&self, args: &[Value]) -> Result<Option<Value>> {
        Ok(self.run(args)?.result)
    }

    /// Same as [`Workflow::execute`] for an arbitrary sequence of arguments.
    fn execute_list<I>(&self, args: I) -> Result<Option<Value>>
    where
        I: IntoIterator<Item = Value>,
        Self: Sized,
    {
        let args: Vec<Value> = args.into_iter().collect();
        self.execute(&args)
    }

    /// Wraps the workflow so every pull and every step runs under a lock.
    fn synchronized(self, sync_root: Option<SyncRoot>) -> SynchronizedWorkflow<Self>
    where
        Self: Sized,
    {
        SynchronizedWorkflow::new(self, sync_root)
    }
}

impl<W: Workflow + ?Sized> Workflow for std::sync::Arc<W> {
    fn traverse(&self) -> Box<dyn Traversal + '_> {
        (**self).traverse()
    }
}

impl<W: Workflow + ?Sized> Workflow for Box<W> {
    fn traverse(&self) -> Box<dyn Traversal + '_> {
        (**self).traverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Minimal workflow over a raw chain.
    struct ChainWorkflow(Chain);

    impl Workflow for ChainWorkflow {
        fn traverse(&self) -> Box<dyn Traversal + '_> {
            Box::new(ChainTraversal::new(&self.0))
        }
    }

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn logged(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Step {
        let log = Arc::clone(log);
        let label = name.to_string();
        Step::new(name, move |_| {
            log.lock().unwrap().push(label.clone());
            Ok(())
        })
    }

    fn failing(name: &str, continue_on_error: bool) -> Step {
        Step::new(name, move |ctx| {
            ctx.set_continue_on_error(continue_on_error);
            Err("boom".into())
        })
    }

    #[test]
    fn test_empty_chain_yields_nothing() {
        let chain = Chain::new();
        let mut traversal = ChainTraversal::new(&chain);
        assert!(!traversal.advance().unwrap());
        assert!(traversal.invoke(&[]).is_err());
    }

    #[test]
    fn test_linear_chain_visits_in_order() {
        let log = recorder();
        let mut chain = Chain::new();
        let a = chain.start(logged("a", &log)).unwrap();
        let b = chain.continue_with(a, logged("b", &log)).unwrap();
        chain
            .continue_with(
                b,
                Step::new("c", |ctx| {
                    ctx.set_result("done");
                    Ok(())
                }),
            )
            .unwrap();

        let report = ChainWorkflow(chain).run(&[]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(report.steps, 3);
        assert_eq!(report.result, Some(json!("done")));
        assert!(!report.canceled);
        assert_eq!(report.timeline.step_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_result_carries_forward() {
        let mut chain = Chain::new();
        let a = chain
            .start(Step::new("a", |ctx| {
                ctx.set_result(1);
                Ok(())
            }))
            .unwrap();
        chain.continue_with(a, Step::new("b", |_| Ok(()))).unwrap();

        let result = ChainWorkflow(chain).execute(&[]).unwrap();
        assert_eq!(result, Some(json!(1)));
    }

    #[test]
    fn test_no_result_is_empty() {
        let mut chain = Chain::new();
        chain.start(Step::new("a", |_| Ok(()))).unwrap();
        assert_eq!(ChainWorkflow(chain).execute(&[]).unwrap(), None);
    }

    #[test]
    fn test_arguments_visible_to_every_step() {
        let mut chain = Chain::new();
        let a = chain
            .start(Step::new("a", |ctx| {
                assert_eq!(ctx.arguments(), &[json!(1), json!("two")]);
                Ok(())
            }))
            .unwrap();
        chain
            .continue_with(
                a,
                Step::new("b", |ctx| {
                    let sum = ctx.argument(0).and_then(Value::as_i64).unwrap_or(0);
                    ctx.set_result(sum + 1);
                    Ok(())
                }),
            )
            .unwrap();

        let workflow = ChainWorkflow(chain);
        let result = workflow.execute_list(vec![json!(1), json!("two")]).unwrap();
        assert_eq!(result, Some(json!(2)));
    }

    #[test]
    fn test_next_value_visible_to_following_step_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Chain::new();
        let a = chain
            .start(Step::new("a", |ctx| {
                ctx.set_next_value("from-a");
                Ok(())
            }))
            .unwrap();

        let seen_b = Arc::clone(&seen);
        let b = chain
            .continue_with(
                a,
                Step::new("b", move |ctx| {
                    seen_b.lock().unwrap().push(ctx.previous_value().cloned());
                    Ok(())
                }),
            )
            .unwrap();

        let seen_c = Arc::clone(&seen);
        chain
            .continue_with(
                b,
                Step::new("c", move |ctx| {
                    seen_c.lock().unwrap().push(ctx.previous_value().cloned());
                    Ok(())
                }),
            )
            .unwrap();

        ChainWorkflow(chain).execute(&[]).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Some(json!("from-a")), None]);
    }

    #[test]
    fn test_value_persists_across_chain() {
        let mut chain = Chain::new();
        let a = chain
            .start(Step::new("a", |ctx| {
                ctx.set_value("x");
                Ok(())
            }))
            .unwrap();
        let b = chain.continue_with(a, Step::new("b", |_| Ok(()))).unwrap();
        chain
            .continue_with(
                b,
                Step::new("c", |ctx| {
                    let value = ctx.value().cloned().unwrap_or(Value::Null);
                    ctx.set_result(value);
                    Ok(())
                }),
            )
            .unwrap();

        assert_eq!(ChainWorkflow(chain).execute(&[]).unwrap(), Some(json!("x")));
    }

    #[test]
    fn test_error_handler_runs_next_and_receives_failure() {
        let mut chain = Chain::new();
        let a = chain
            .start(Step::new("a", |ctx| {
                ctx.set_value("x");
                Ok(())
            }))
            .unwrap();
        let b = chain.continue_with(a, failing("b", false)).unwrap();
        chain
            .if_fails(
                b,
                Step::new("e", |ctx| {
                    let failed = ctx.last_error().map(|f| f.step().to_string());
                    ctx.set_result(failed.unwrap_or_default());
                    ctx.set_throw_errors(false);
                    Ok(())
                }),
            )
            .unwrap();

        let report = ChainWorkflow(chain).run(&[]).unwrap();
        assert_eq!(report.timeline.step_ids(), vec!["a", "b", "e"]);
        assert_eq!(report.result, Some(json!("b")));
        assert_eq!(report.timeline.failure_count(), 1);
    }

    #[test]
    fn test_handled_failure_still_aggregated() {
        let mut chain = Chain::new();
        let a = chain.start(failing("a", false)).unwrap();
        chain.if_fails(a, Step::new("e", |_| Ok(()))).unwrap();

        let err = ChainWorkflow(chain).execute(&[]).unwrap_err();
        match err {
            Error::AggregateFailure(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].step(), "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unhandled_failure_aborts_immediately() {
        let log = recorder();
        let mut chain = Chain::new();
        let a = chain.start(failing("a", false)).unwrap();
        chain.continue_with(a, logged("b", &log)).unwrap();

        let err = ChainWorkflow(chain).execute(&[]).unwrap_err();
        assert!(matches!(&err, Error::StepFailure(f) if f.step() == "a"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unhandled_failure_aborts_regardless_of_throw_errors() {
        let mut chain = Chain::new();
        chain
            .start(Step::new("a", |ctx| {
                ctx.set_throw_errors(false);
                Err("boom".into())
            }))
            .unwrap();

        let err = ChainWorkflow(chain).execute(&[]).unwrap_err();
        assert!(matches!(err, Error::StepFailure(_)));
    }

    #[test]
    fn test_continue_on_error_aggregates_in_order() {
        let log = recorder();
        let mut chain = Chain::new();
        let a = chain.start(failing("first", true)).unwrap();
        let b = chain.continue_with(a, logged("middle", &log)).unwrap();
        chain.continue_with(b, failing("second", true)).unwrap();

        let err = ChainWorkflow(chain).execute(&[]).unwrap_err();
        assert_eq!(*log.lock().unwrap(), vec!["middle"]);
        match err {
            Error::AggregateFailure(failures) => {
                let names: Vec<&str> = failures.iter().map(|f| f.step()).collect();
                assert_eq!(names, vec!["first", "second"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_throw_errors_false_suppresses_aggregate() {
        let mut chain = Chain::new();
        let a = chain.start(failing("a", true)).unwrap();
        chain
            .continue_with(
                a,
                Step::new("b", |ctx| {
                    ctx.set_throw_errors(false);
                    ctx.set_result("recovered");
                    Ok(())
                }),
            )
            .unwrap();

        let result = ChainWorkflow(chain).execute(&[]).unwrap();
        assert_eq!(result, Some(json!("recovered")));
    }

    #[test]
    fn test_last_error_cleared_after_success() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Chain::new();
        let a = chain.start(failing("a", true)).unwrap();

        let seen_b = Arc::clone(&seen);
        let b = chain
            .continue_with(
                a,
                Step::new("b", move |ctx| {
                    seen_b.lock().unwrap().push(ctx.last_error().is_some());
                    Ok(())
                }),
            )
            .unwrap();

        let seen_c = Arc::clone(&seen);
        chain
            .continue_with(
                b,
                Step::new("c", move |ctx| {
                    seen_c.lock().unwrap().push(ctx.last_error().is_some());
                    ctx.set_throw_errors(false);
                    Ok(())
                }),
            )
            .unwrap();

        ChainWorkflow(chain).execute(&[]).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_failing_error_handler_aborts() {
        let log = recorder();
        let mut chain = Chain::new();
        let a = chain.start(failing("a", false)).unwrap();
        let e = chain.if_fails(a, failing("e", true)).unwrap();
        chain.if_fails(e, logged("never", &log)).unwrap();
        chain.continue_with(e, logged("after", &log)).unwrap();

        let err = ChainWorkflow(chain).execute(&[]).unwrap_err();
        assert!(matches!(&err, Error::StepFailure(f) if f.step() == "e"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_error_handler_continues_along_its_links() {
        let log = recorder();
        let mut chain = Chain::new();
        let a = chain.start(failing("a", false)).unwrap();
        let e = chain
            .if_fails(
                a,
                Step::new("e", |ctx| {
                    ctx.set_throw_errors(false);
                    Ok(())
                }),
            )
            .unwrap();
        chain.continue_with(e, logged("after", &log)).unwrap();

        ChainWorkflow(chain).execute(&[]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_goto_overrides_once_then_links_resume() {
        let log = recorder();
        let mut chain = Chain::new();
        let a = chain
            .start(Step::new("a", |ctx| {
                ctx.goto("c");
                Ok(())
            }))
            .unwrap();
        let b = chain.continue_with(a, logged("b", &log)).unwrap();
        let c = chain.continue_with(b, logged("c", &log)).unwrap();
        chain.continue_with(c, logged("d", &log)).unwrap();

        let report = ChainWorkflow(chain).run(&[]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["c", "d"]);
        assert_eq!(report.timeline.step_ids(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_goto_takes_precedence_over_error_link() {
        let log = recorder();
        let mut chain = Chain::new();
        let a = chain
            .start(Step::new("a", |ctx| {
                ctx.goto("target");
                ctx.set_throw_errors(false);
                Err("boom".into())
            }))
            .unwrap();
        chain.if_fails(a, logged("handler", &log)).unwrap();
        let t = chain.stop(a);
        chain.continue_with(t, logged("target", &log)).unwrap();

        ChainWorkflow(chain).execute(&[]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["target"]);
    }

    #[test]
    fn test_goto_unknown_step_fails() {
        let mut chain = Chain::new();
        chain
            .start(Step::new("a", |ctx| {
                ctx.goto("nowhere");
                Ok(())
            }))
            .unwrap();

        let err = ChainWorkflow(chain).execute(&[]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_loop_through_goto() {
        let mut chain = Chain::new();
        chain
            .start(Step::new("count", |ctx| {
                let n = ctx.value().and_then(Value::as_i64).unwrap_or(0) + 1;
                ctx.set_value(n);
                ctx.set_result(n);
                if n < 5 {
                    ctx.goto("count");
                }
                Ok(())
            }))
            .unwrap();

        let report = ChainWorkflow(chain).run(&[]).unwrap();
        assert_eq!(report.steps, 5);
        assert_eq!(report.result, Some(json!(5)));
    }

    #[test]
    fn test_detached_next_step_ends_chain() {
        let log = recorder();
        let mut chain = Chain::new();
        let extra = logged("extra", &log);
        let a = chain
            .start(Step::new("a", move |ctx| {
                ctx.set_next(extra.clone());
                Ok(())
            }))
            .unwrap();
        chain.continue_with(a, logged("b", &log)).unwrap();

        let report = ChainWorkflow(chain).run(&[]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["extra"]);
        assert_eq!(report.steps, 2);
    }

    #[test]
    fn test_next_action_runs_without_context() {
        let log = recorder();
        let mut chain = Chain::new();
        let log_action = Arc::clone(&log);
        chain
            .start(Step::new("a", move |ctx| {
                let log = Arc::clone(&log_action);
                ctx.set_next_action("action", move || {
                    log.lock().unwrap().push("action".to_string());
                    Ok(())
                });
                Ok(())
            }))
            .unwrap();

        ChainWorkflow(chain).execute(&[]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["action"]);
    }

    #[test]
    fn test_cancel_stops_after_current_step() {
        let log = recorder();
        let mut chain = Chain::new();
        let a = chain
            .start(Step::new("a", |ctx| {
                ctx.set_result("partial");
                ctx.cancel();
                Ok(())
            }))
            .unwrap();
        chain.continue_with(a, logged("b", &log)).unwrap();

        let report = ChainWorkflow(chain).run(&[]).unwrap();
        assert!(report.canceled);
        assert_eq!(report.steps, 1);
        assert_eq!(report.result, Some(json!("partial")));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(report.timeline.get_events()[0].event_type, EventType::Canceled);
    }

    #[test]
    fn test_cancel_still_raises_deferred_failures() {
        let mut chain = Chain::new();
        let a = chain.start(failing("a", true)).unwrap();
        chain
            .continue_with(
                a,
                Step::new("b", |ctx| {
                    ctx.cancel();
                    Ok(())
                }),
            )
            .unwrap();

        let err = ChainWorkflow(chain).execute(&[]).unwrap_err();
        assert!(matches!(err, Error::AggregateFailure(ref f) if f.len() == 1));
    }

    #[test]
    fn test_manual_pull_loop() {
        let mut chain = Chain::new();
        let a = chain
            .start(Step::new("a", |ctx| {
                ctx.set_next_value(10);
                Ok(())
            }))
            .unwrap();
        chain.continue_with(a, Step::new("b", |_| Ok(()))).unwrap();

        let mut traversal = ChainTraversal::new(&chain);
        assert!(traversal.advance().unwrap());
        let first = traversal.invoke(&[]).unwrap();
        assert_eq!(first.step_name(), "a");

        assert!(traversal.advance().unwrap());
        let second = traversal.invoke(&[]).unwrap();
        assert_eq!(second.step_name(), "b");
        assert_eq!(second.previous_value(), Some(&json!(10)));

        assert!(!traversal.advance().unwrap());
        assert!(!traversal.advance().unwrap());
        assert_eq!(traversal.steps_run(), 2);
    }

    #[test]
    fn test_aggregate_raised_at_end_of_pull_loop() {
        let mut chain = Chain::new();
        chain.start(failing("a", true)).unwrap();

        let mut traversal = ChainTraversal::new(&chain);
        assert!(traversal.advance().unwrap());
        let ctx = traversal.invoke(&[]).unwrap();
        assert_eq!(ctx.step_failure().unwrap().step(), "a");
        assert_eq!(traversal.failures().len(), 1);

        assert!(!traversal.is_exhausted());
        assert!(matches!(traversal.advance(), Err(Error::AggregateFailure(_))));
        assert!(traversal.is_exhausted());
        assert!(!traversal.advance().unwrap());
    }

    #[test]
    fn test_workflow_is_reusable() {
        let mut chain = Chain::new();
        chain
            .start(Step::new("echo", |ctx| {
                let arg = ctx.argument(0).cloned().unwrap_or(Value::Null);
                ctx.set_result(arg);
                Ok(())
            }))
            .unwrap();

        let workflow = ChainWorkflow(chain);
        assert_eq!(workflow.execute(&[json!(1)]).unwrap(), Some(json!(1)));
        assert_eq!(workflow.execute(&[json!(2)]).unwrap(), Some(json!(2)));
    }
}
