//! Chain Definition Module
//!
//! Provides the data structures for steps, chains and execution contexts,
//! the two ways of wiring a chain (fluent builder and member registry),
//! and declarative YAML definitions.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Step, Chain)
//! - [`context`]: Per-step execution context
//! - [`builder`]: Fluent chain construction
//! - [`resolver`]: Registration-table chains resolved per contract
//! - [`simple`]: First-step / next-step workflow template
//! - [`definition`]: Serializable chain definitions
//! - [`parser`]: YAML loading and saving
//! - [`validator`]: Structural validation of definitions

pub mod builder;
pub mod context;
pub mod definition;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod simple;
pub mod validator;

pub use builder::{ConfigurableWorkflow, NodeHandle};
pub use context::{ExecutionContext, NextStep};
pub use definition::{ChainDefinition, StepDefinition};
pub use model::{Chain, NodeId, Step};
pub use parser::{load_definition, parse_definition, save_definition};
pub use resolver::{normalize_contract, ResolvedWorkflow, Role, StepRegistry, StepResolver};
pub use simple::{SimpleChain, SimpleWorkflow};
pub use validator::{quick_validate, validate_definition, ValidationError};
