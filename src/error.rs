//! Error Types
//!
//! Every fallible operation in the crate returns [`Result`]. User code
//! inside steps, commands and functions reports failures as [`BoxError`],
//! which the engine wraps into a [`StepFailure`] naming the unit that
//! raised it.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error type returned by user-supplied step, command and function code.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Outcome of running one step.
pub type StepResult = std::result::Result<(), BoxError>;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by chain building, resolution and execution.
#[derive(Debug, Error)]
pub enum Error {
    /// A required input was missing or empty (e.g. an unnamed step).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A parameter map received the same key twice.
    #[error("duplicate key: '{0}'")]
    DuplicateKey(String),

    /// More than one registered member matched a resolution request.
    #[error("ambiguous resolution for {role}: {candidates} candidates match")]
    AmbiguousResolution { role: String, candidates: usize },

    /// A single step failed and the failure was not handled.
    #[error(transparent)]
    StepFailure(#[from] StepFailure),

    /// Every deferred step failure collected during one run.
    #[error("{} step failure(s) occurred during the run", .0.len())]
    AggregateFailure(Vec<StepFailure>),

    /// A chain definition file could not be read or written.
    #[error("failed to access chain definition '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A chain definition could not be (de)serialized.
    #[error("failed to parse chain definition: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A chain definition is structurally invalid.
    #[error("invalid chain definition:\n{0}")]
    Validation(String),
}

impl Error {
    /// Returns the step failures carried by this error, if any.
    pub fn step_failures(&self) -> &[StepFailure] {
        match self {
            Self::StepFailure(failure) => std::slice::from_ref(failure),
            Self::AggregateFailure(failures) => failures,
            _ => &[],
        }
    }
}

/// A failure raised by one step (or command/function) invocation.
///
/// The underlying cause is shared so the same failure can be handed to the
/// next step's context, kept in the run's accumulator and surfaced to the
/// caller.
#[derive(Clone)]
pub struct StepFailure {
    step: String,
    cause: Arc<dyn StdError + Send + Sync>,
}

impl StepFailure {
    /// Wraps a cause raised by the named unit.
    pub fn new(step: impl Into<String>, cause: BoxError) -> Self {
        Self {
            step: step.into(),
            cause: Arc::from(cause),
        }
    }

    /// Wraps `cause` unless it already is a [`StepFailure`], which is
    /// passed through unchanged so a rethrown failure keeps its origin.
    pub fn from_cause(step: impl Into<String>, cause: BoxError) -> Self {
        match cause.downcast::<StepFailure>() {
            Ok(failure) => *failure,
            Err(cause) => Self::new(step, cause),
        }
    }

    /// Name of the step that raised the failure.
    pub fn step(&self) -> &str {
        &self.step
    }

    /// The underlying cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

impl fmt::Debug for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepFailure")
            .field("step", &self.step)
            .field("cause", &self.cause.to_string())
            .finish()
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed: {}", self.step, self.cause)
    }
}

impl StdError for StepFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause.as_ref())
    }
}
