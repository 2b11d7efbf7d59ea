//! Chain Data Model
//!
//! Core data structures representing steps and the links between them.
//!
//! A [`Chain`] is an arena: nodes are stored in a vector and refer to
//! their successor, their error handler and their parent by [`NodeId`].
//!
//! ```text
//!   fetch ──next──▶ parse ──next──▶ store
//!                     │
//!                  on_error
//!                     ▼
//!                   report
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result, StepResult};
use crate::workflow::context::ExecutionContext;

type StepFn = dyn Fn(&mut ExecutionContext) -> StepResult + Send + Sync;

/// A named unit of chain work.
///
/// Steps are cheap to clone; clones share the same function.
#[derive(Clone)]
pub struct Step {
    name: Arc<str>,
    action: Arc<StepFn>,
}

impl Step {
    /// Creates a step from a function receiving the execution context.
    ///
    /// # Example
    ///
    /// ```
    /// use stepchain::workflow::Step;
    ///
    /// let step = Step::new("greet", |ctx| {
    ///     ctx.set_result("hello");
    ///     Ok(())
    /// });
    /// assert_eq!(step.name(), "greet");
    /// ```
    pub fn new<F>(name: impl AsRef<str>, action: F) -> Self
    where
        F: Fn(&mut ExecutionContext) -> StepResult + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.as_ref().trim()),
            action: Arc::new(action),
        }
    }

    /// Creates a step from a function that ignores the context.
    pub fn from_action<F>(name: impl AsRef<str>, action: F) -> Self
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        Self::new(name, move |_| action())
    }

    /// Name of the step (trimmed).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the step against a context.
    pub fn run(&self, ctx: &mut ExecutionContext) -> StepResult {
        (self.action)(ctx)
    }

    /// Rejects unnamed steps, the equivalent of a missing step.
    pub(crate) fn ensure_named(&self, argument: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{} must be a named step",
                argument
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

/// Index of a node inside a [`Chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Node {
    step: Step,
    next: Option<NodeId>,
    on_error: Option<NodeId>,
    parent: Option<NodeId>,
}

/// Linked graph of steps with success and error links.
///
/// Links are populated once. Extending a node whose link is already set
/// attaches the new node at the end of the success path that starts at
/// the existing link instead of replacing it.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    nodes: Vec<Node>,
    head: Option<NodeId>,
}

impl Chain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards all nodes and creates a new head node.
    pub fn start(&mut self, step: Step) -> Result<NodeId> {
        step.ensure_named("start step")?;
        self.nodes.clear();
        let id = self.push(step, None);
        self.head = Some(id);
        Ok(id)
    }

    /// Attaches a successor to `at`.
    pub fn continue_with(&mut self, at: NodeId, step: Step) -> Result<NodeId> {
        step.ensure_named("next step")?;
        self.check(at)?;

        match self.nodes[at.0].next {
            None => {
                let id = self.push(step, Some(at));
                self.nodes[at.0].next = Some(id);
                Ok(id)
            }
            Some(existing) => Ok(self.append_to_tail(existing, step)),
        }
    }

    /// Attaches an error handler to `at`.
    pub fn if_fails(&mut self, at: NodeId, step: Step) -> Result<NodeId> {
        step.ensure_named("error step")?;
        self.check(at)?;

        match self.nodes[at.0].on_error {
            None => {
                let id = self.push(step, Some(at));
                self.nodes[at.0].on_error = Some(id);
                Ok(id)
            }
            Some(existing) => Ok(self.append_to_tail(existing, step)),
        }
    }

    /// Returns the parent of `at`, or `at` itself for the root.
    pub fn stop(&self, at: NodeId) -> NodeId {
        self.parent(at).unwrap_or(at)
    }

    /// Head of the chain, if one was started.
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub fn step(&self, at: NodeId) -> Option<&Step> {
        self.nodes.get(at.0).map(|node| &node.step)
    }

    pub fn next(&self, at: NodeId) -> Option<NodeId> {
        self.nodes.get(at.0).and_then(|node| node.next)
    }

    pub fn on_error(&self, at: NodeId) -> Option<NodeId> {
        self.nodes.get(at.0).and_then(|node| node.on_error)
    }

    pub fn parent(&self, at: NodeId) -> Option<NodeId> {
        self.nodes.get(at.0).and_then(|node| node.parent)
    }

    /// Finds the single node whose step carries `name`.
    pub fn find(&self, name: &str) -> Result<Option<NodeId>> {
        let name = name.trim();
        let matches: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.step.name() == name)
            .map(|(index, _)| NodeId(index))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0])),
            candidates => Err(Error::AmbiguousResolution {
                role: format!("member '{}'", name),
                candidates,
            }),
        }
    }

    /// Returns the number of nodes in the chain.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no head was started.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, step: Step, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            step,
            next: None,
            on_error: None,
            parent,
        });
        id
    }

    fn append_to_tail(&mut self, from: NodeId, step: Step) -> NodeId {
        // New nodes are always leaves, so the success path is finite.
        let mut tail = from;
        while let Some(next) = self.nodes[tail.0].next {
            tail = next;
        }
        let id = self.push(step, Some(tail));
        self.nodes[tail.0].next = Some(id);
        id
    }

    fn check(&self, at: NodeId) -> Result<()> {
        if at.0 >= self.nodes.len() {
            return Err(Error::InvalidArgument(format!(
                "node {} does not belong to this chain",
                at.0
            )));
        }
        Ok(())
    }
}
