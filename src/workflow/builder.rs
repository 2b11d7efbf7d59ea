//! Chain Builder
//!
//! Fluent construction of a [`Chain`] owned by a [`ConfigurableWorkflow`].
//!
//! # Example
//!
//! ```
//! use stepchain::workflow::ConfigurableWorkflow;
//! use stepchain::Workflow;
//!
//! let mut workflow = ConfigurableWorkflow::new();
//! workflow
//!     .start_with_action("prepare", || Ok(()))?
//!     .continue_with_action("compute", || Ok(()))?
//!     .if_fails_action("cleanup", || Ok(()))?;
//!
//! assert_eq!(workflow.execute(&[])?, None);
//! # Ok::<(), stepchain::Error>(())
//! ```

use serde_json::Value;

use crate::error::{Result, StepResult};
use crate::execution::engine::{ChainTraversal, Traversal, Workflow};
use crate::workflow::model::{Chain, NodeId, Step};

/// Workflow backed by a chain built at runtime.
#[derive(Debug, Clone, Default)]
pub struct ConfigurableWorkflow {
    chain: Chain,
}

impl ConfigurableWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new chain with `step` as its head.
    ///
    /// Any previously built chain is discarded.
    pub fn start_with(&mut self, step: Step) -> Result<NodeHandle<'_>> {
        let id = self.chain.start(step)?;
        Ok(NodeHandle { workflow: self, id })
    }

    /// Same as [`ConfigurableWorkflow::start_with`] for a context-less action.
    pub fn start_with_action<F>(&mut self, name: &str, action: F) -> Result<NodeHandle<'_>>
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        self.start_with(Step::from_action(name, action))
    }

    /// Returns a handle to an existing node, e.g. to extend it later.
    pub fn node(&mut self, id: NodeId) -> Option<NodeHandle<'_>> {
        self.chain.step(id)?;
        Some(NodeHandle { workflow: self, id })
    }

    /// The chain topology.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }
}

impl Workflow for ConfigurableWorkflow {
    fn traverse(&self) -> Box<dyn Traversal + '_> {
        Box::new(ChainTraversal::new(&self.chain))
    }
}

/// Fluent handle to one node of a [`ConfigurableWorkflow`].
pub struct NodeHandle<'w> {
    workflow: &'w mut ConfigurableWorkflow,
    id: NodeId,
}

impl<'w> NodeHandle<'w> {
    /// Node this handle points at.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Step carried by the node.
    pub fn step(&self) -> Option<&Step> {
        self.workflow.chain.step(self.id)
    }

    /// Attaches `step` as the successor and moves to it.
    pub fn continue_with(self, step: Step) -> Result<Self> {
        let id = self.workflow.chain.continue_with(self.id, step)?;
        Ok(Self {
            workflow: self.workflow,
            id,
        })
    }

    pub fn continue_with_action<F>(self, name: &str, action: F) -> Result<Self>
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        self.continue_with(Step::from_action(name, action))
    }

    /// Attaches `step` as the error handler and moves to it.
    pub fn if_fails(self, step: Step) -> Result<Self> {
        let id = self.workflow.chain.if_fails(self.id, step)?;
        Ok(Self {
            workflow: self.workflow,
            id,
        })
    }

    pub fn if_fails_action<F>(self, name: &str, action: F) -> Result<Self>
    where
        F: Fn() -> StepResult + Send + Sync + 'static,
    {
        self.if_fails(Step::from_action(name, action))
    }

    /// Moves to the parent node, or stays on the root.
    pub fn stop(self) -> Self {
        let id = self.workflow.chain.stop(self.id);
        Self {
            workflow: self.workflow,
            id,
        }
    }

    /// Runs the whole workflow the node belongs to.
    pub fn execute(&self, args: &[Value]) -> Result<Option<Value>> {
        self.workflow.execute(args)
    }
}
