//! Definition Validation
//!
//! Structural checks for chain definitions:
//! - Step field validation
//! - Unique identifiers
//! - Reference integrity for `next` and `on_error`
//! - Exactly one start step per contract

use std::collections::HashSet;

use indexmap::IndexMap;
use log::{info, warn};

use crate::error::{Error, Result};
use crate::workflow::definition::{ChainDefinition, StepDefinition};

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyChain,
    EmptyStepId,
    DuplicateStepId(String),
    EmptyCommand(String),
    InvalidReference { step: String, reference: String },
    MissingStart,
    MultipleStarts(Vec<String>),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyChain => write!(f, "Chain has no steps"),
            Self::EmptyStepId => write!(f, "Step has empty or whitespace-only ID"),
            Self::DuplicateStepId(id) => write!(f, "Duplicate step ID: '{}'", id),
            Self::EmptyCommand(step) => write!(f, "Step '{}' has no command specified", step),
            Self::InvalidReference { step, reference } => {
                write!(f, "Step '{}' references unknown step '{}'", step, reference)
            }
            Self::MissingStart => write!(f, "No step is marked as start"),
            Self::MultipleStarts(ids) => {
                write!(f, "Several steps are marked as start: {}", ids.join(", "))
            }
        }
    }
}

/// Validates a single step's fields.
fn validate_step(step: &StepDefinition) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if step.id.trim().is_empty() {
        errors.push(ValidationError::EmptyStepId);
        return errors;
    }

    if step.command.trim().is_empty() {
        errors.push(ValidationError::EmptyCommand(step.id.clone()));
    }

    if step.next.is_some() && step.cancel {
        warn!(
            "Step '{}': 'next' is never followed because the step cancels the run",
            step.id
        );
    }

    errors
}

/// Collects every structural problem of a definition.
pub fn collect_errors(definition: &ChainDefinition) -> Vec<ValidationError> {
    if definition.steps.is_empty() {
        return vec![ValidationError::EmptyChain];
    }

    let mut errors = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();

    for step in &definition.steps {
        errors.extend(validate_step(step));

        let id = step.id.trim();
        if !id.is_empty() && !seen_ids.insert(id) {
            errors.push(ValidationError::DuplicateStepId(id.to_string()));
        }
    }

    for step in &definition.steps {
        for reference in [&step.next, &step.on_error].into_iter().flatten() {
            if !seen_ids.contains(reference.trim()) {
                errors.push(ValidationError::InvalidReference {
                    step: step.id.clone(),
                    reference: reference.clone(),
                });
            }
        }
    }

    let mut starts: IndexMap<Option<String>, Vec<String>> = IndexMap::new();
    for step in definition.steps.iter().filter(|s| s.start) {
        starts
            .entry(definition.contract_of(step))
            .or_default()
            .push(step.id.clone());
    }

    if starts.is_empty() {
        errors.push(ValidationError::MissingStart);
    }
    for (_, ids) in starts {
        if ids.len() > 1 {
            errors.push(ValidationError::MultipleStarts(ids));
        }
    }

    errors
}

/// Validates the entire definition.
///
/// All problems are reported together in one [`Error::Validation`].
pub fn validate_definition(definition: &ChainDefinition) -> Result<()> {
    info!("Validating chain with {} steps", definition.steps.len());

    let errors = collect_errors(definition);
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(Error::Validation(messages.join("\n")));
    }

    info!("Chain validated: {} steps", definition.steps.len());
    Ok(())
}

/// Quick validation that returns a list of error messages.
pub fn quick_validate(definition: &ChainDefinition) -> Vec<String> {
    collect_errors(definition)
        .iter()
        .map(|e| e.to_string())
        .collect()
}
