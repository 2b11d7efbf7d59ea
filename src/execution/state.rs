//! Run State
//!
//! Engine state threaded between successive pulls of one traversal. A
//! fresh state is created for every run, so the chain topology is the
//! only thing shared between runs.

use log::debug;

use crate::error::StepFailure;
use crate::workflow::context::Carry;
use crate::workflow::model::Step;

/// Position of the engine in the chain.
#[derive(Debug, Clone)]
pub(crate) enum Cursor<N> {
    /// A node of the topology, with its own links.
    Linked(N),
    /// An ad-hoc step installed through `set_next`; it has no links.
    Detached(Step),
}

/// State of one in-flight run.
#[derive(Debug, Clone)]
pub(crate) struct RunState<N> {
    /// Unit to run on the next pull
    pub(crate) current: Option<Cursor<N>>,

    /// True when `current` was reached through an error redirect
    pub(crate) handling_error: bool,

    /// Set once a step requested cancellation
    pub(crate) has_been_canceled: bool,

    /// Values seeding the next context
    pub(crate) carry: Carry,

    /// Every failure recorded during the run, in order
    pub(crate) failures: Vec<StepFailure>,

    /// Number of steps invoked so far
    pub(crate) steps_run: usize,

    finished: bool,
}

impl<N> RunState<N> {
    /// Creates the state for a new run.
    pub(crate) fn new() -> Self {
        Self {
            current: None,
            handling_error: false,
            has_been_canceled: false,
            carry: Carry::default(),
            failures: Vec::new(),
            steps_run: 0,
            finished: false,
        }
    }

    /// Returns true while there is a unit left to run.
    pub(crate) fn has_work_remaining(&self) -> bool {
        !self.has_been_canceled && self.current.is_some()
    }

    /// Records a failure in the run's accumulator.
    pub(crate) fn mark_failed(&mut self, failure: StepFailure) {
        debug!("Recorded failure #{}: {}", self.failures.len() + 1, failure);
        self.failures.push(failure);
    }

    /// Marks the sequence as exhausted.
    ///
    /// Returns the deferred failures to raise, exactly once, when
    /// `throw_errors` is still set and anything was recorded.
    pub(crate) fn finish(&mut self) -> Option<Vec<StepFailure>> {
        if self.finished {
            return None;
        }
        self.finished = true;

        if self.carry.throw_errors && !self.failures.is_empty() {
            Some(self.failures.clone())
        } else {
            None
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<N> Default for RunState<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_creation() {
        let state: RunState<usize> = RunState::new();
        assert!(!state.has_work_remaining());
        assert!(state.failures.is_empty());
        assert!(state.carry.throw_errors);
        assert_eq!(state.steps_run, 0);
    }

    #[test]
    fn test_has_work_remaining() {
        let mut state: RunState<usize> = RunState::new();
        state.current = Some(Cursor::Linked(0));
        assert!(state.has_work_remaining());

        state.has_been_canceled = true;
        assert!(!state.has_work_remaining());
    }

    #[test]
    fn test_finish_without_failures() {
        let mut state: RunState<usize> = RunState::new();
        assert!(state.finish().is_none());
        assert!(state.is_finished());
    }

    #[test]
    fn test_finish_raises_once() {
        let mut state: RunState<usize> = RunState::new();
        state.mark_failed(StepFailure::new("a", "x".into()));
        state.mark_failed(StepFailure::new("b", "y".into()));

        let failures = state.finish().unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].step(), "a");
        assert!(state.finish().is_none());
    }

    #[test]
    fn test_finish_respects_throw_errors() {
        let mut state: RunState<usize> = RunState::new();
        state.mark_failed(StepFailure::new("a", "x".into()));
        state.carry.throw_errors = false;

        assert!(state.finish().is_none());
    }
}
