//! Chain Definitions
//!
//! Declarative, serializable description of a chain of shell steps.
//!
//! Steps inherit the definition's `contract` unless they name their own,
//! so one file can hold several independent chains.
//!
//! ```yaml
//! contract: import
//! steps:
//!   - id: fetch
//!     command: curl -sf {arg0}
//!     start: true
//!     next: count
//!     on_error: report
//!   - id: count
//!     command: echo '{previous}' | wc -l
//!   - id: report
//!     command: echo "fetch failed: {error}"
//!     throw_errors: false
//!   - id: nightly
//!     contract: nightly
//!     command: echo "nightly run"
//!     start: true
//! ```

use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::execution::shell::shell_step;
use crate::workflow::resolver::{normalize_contract, StepRegistry};

/// One step of a chain definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique step identifier
    pub id: String,

    /// Shell command, with placeholders
    pub command: String,

    /// Contract of this step's markers; the definition's contract when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,

    /// Opens the chain
    #[serde(default, skip_serializing_if = "is_false")]
    pub start: bool,

    /// Step to run after this one succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    /// Step to run when this one fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,

    /// Keep going along `next` when this step fails without a handler
    #[serde(default, skip_serializing_if = "is_false")]
    pub continue_on_error: bool,

    /// Stop the run after this step succeeds
    #[serde(default, skip_serializing_if = "is_false")]
    pub cancel: bool,

    /// Overrides whether deferred failures are raised at the end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throw_errors: Option<bool>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl StepDefinition {
    /// Creates a step definition with default flags.
    pub fn new(id: &str, command: &str) -> Self {
        Self {
            id: id.to_string(),
            command: command.to_string(),
            ..Self::default()
        }
    }

    /// Builder: marks this step as the chain start.
    pub fn starting(mut self) -> Self {
        self.start = true;
        self
    }

    /// Builder: sets the success successor.
    pub fn then(mut self, next: &str) -> Self {
        self.next = Some(next.to_string());
        self
    }

    /// Builder: sets the error handler.
    pub fn or_else(mut self, on_error: &str) -> Self {
        self.on_error = Some(on_error.to_string());
        self
    }

    /// Builder: places the step's markers in `contract`.
    pub fn in_contract(mut self, contract: &str) -> Self {
        self.contract = Some(contract.to_string());
        self
    }
}

/// A complete chain definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinition {
    /// Contract the markers belong to; empty for the default chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,

    /// Steps in declaration order
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl ChainDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a definition from a list of steps.
    pub fn from_steps(steps: Vec<StepDefinition>) -> Self {
        Self {
            contract: None,
            steps,
        }
    }

    /// Returns the step with the given id.
    pub fn get_step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id.trim() == id.trim())
    }

    /// Normalized contract the markers of `step` belong to.
    pub fn contract_of(&self, step: &StepDefinition) -> Option<String> {
        normalize_contract(step.contract.as_deref().or(self.contract.as_deref()))
    }

    /// Distinct contracts that have a start step, in declaration order.
    pub fn contracts(&self) -> Vec<Option<String>> {
        let mut contracts = Vec::new();
        for step in self.steps.iter().filter(|s| s.start) {
            let contract = self.contract_of(step);
            if !contracts.contains(&contract) {
                contracts.push(contract);
            }
        }
        contracts
    }

    /// Returns the start step of the definition's own contract.
    pub fn start_step(&self) -> Option<&StepDefinition> {
        self.start_step_for(self.contract.as_deref())
    }

    /// Returns the first step marked as start within `contract`.
    pub fn start_step_for(&self, contract: Option<&str>) -> Option<&StepDefinition> {
        let contract = normalize_contract(contract);
        self.steps
            .iter()
            .find(|s| s.start && self.contract_of(s) == contract)
    }

    /// Picks the contract to run: `requested`, or the definition's own.
    ///
    /// Fails with [`Error::InvalidArgument`] when no step starts that chain.
    pub fn select_contract(&self, requested: Option<&str>) -> Result<Option<String>> {
        let contract = normalize_contract(requested.or(self.contract.as_deref()));
        if self.start_step_for(contract.as_deref()).is_some() {
            return Ok(contract);
        }

        let available: Vec<String> = self
            .contracts()
            .into_iter()
            .map(|c| c.unwrap_or_else(|| "<default>".to_string()))
            .collect();
        Err(Error::InvalidArgument(format!(
            "no chain starts in contract {} (available: {})",
            contract.as_deref().unwrap_or("<default>"),
            available.join(", ")
        )))
    }

    /// Success path from the start step of `contract`, stopping at the first revisit.
    pub fn main_path(&self, contract: Option<&str>) -> Vec<&StepDefinition> {
        let mut path: Vec<&StepDefinition> = Vec::new();
        let mut current = self.start_step_for(contract);

        while let Some(step) = current {
            if path.iter().any(|seen| seen.id == step.id) {
                break;
            }
            path.push(step);
            current = step.next.as_deref().and_then(|next| self.get_step(next));
        }

        path
    }

    /// Builds a registry of shell steps carrying this definition's markers.
    ///
    /// Commands run in `working_dir` when given.
    pub fn to_registry(&self, working_dir: Option<&Path>) -> Result<StepRegistry> {
        let mut registry = StepRegistry::new();

        for definition in &self.steps {
            let contract = self.contract_of(definition);
            let contract = contract.as_deref();
            let mut member = registry.register(shell_step(definition, working_dir))?;
            if definition.start {
                member = member.start(contract);
            }
            if let Some(next) = &definition.next {
                member = member.next(next, contract)?;
            }
            if let Some(on_error) = &definition.on_error {
                member.on_error(on_error, contract)?;
            }
        }

        debug!("Built registry with {} member(s)", registry.len());
        Ok(registry)
    }
}
