//! Chain Execution Module
//!
//! Provides the engine that runs chains one step per pull, plus the
//! command and function units and their synchronization wrappers.
//!
//! # Architecture
//!
//! - [`engine`]: Lazy traversal state machine and the [`Workflow`] trait
//! - [`sync`]: Shared lock handle and the synchronized workflow wrapper
//! - [`command`]: Guarded, parameterized actions
//! - [`function`]: Named parameters-in, parameters-out units
//! - [`shell`]: Steps that run shell commands

pub mod command;
pub mod engine;
pub mod function;
pub mod shell;
pub(crate) mod state;
pub mod sync;

pub use command::{Command, DelegateCommand, SynchronizedCommand};
pub use engine::{drive, ChainTraversal, RunReport, Topology, Traversal, Workflow};
pub use function::{DelegateFunction, Function, Params, SynchronizedFunction};
pub use shell::{render_command, shell_step};
pub use sync::{SyncRoot, SynchronizedWorkflow};
