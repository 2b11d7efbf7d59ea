//! Step Resolution
//!
//! The registration-table variant of a chain. Instead of prebuilt links,
//! every step is registered as a named member carrying markers:
//!
//! - `start(contract)` - the member opens the chain of `contract`
//! - `next(member, contract)` - `member` runs after this one on success
//! - `on_error(member, contract)` - `member` handles this one's failure
//!
//! A [`ResolvedWorkflow`] asks a [`StepResolver`] for each node while the
//! run progresses, so several independent chains (one per contract) can
//! live in one registry.
//!
//! # Example
//!
//! ```
//! use stepchain::workflow::{ResolvedWorkflow, Step, StepRegistry};
//! use stepchain::Workflow;
//!
//! let mut registry = StepRegistry::new();
//! registry
//!     .register(Step::new("load", |ctx| { ctx.set_value(2); Ok(()) }))?
//!     .start(None)
//!     .next("double", None)?;
//! registry.register(Step::new("double", |ctx| {
//!     let n = ctx.value().and_then(|v| v.as_i64()).unwrap_or(0);
//!     ctx.set_result(n * 2);
//!     Ok(())
//! }))?;
//!
//! let workflow = ResolvedWorkflow::new(registry, None);
//! assert_eq!(workflow.execute(&[])?, Some(4.into()));
//! # Ok::<(), stepchain::Error>(())
//! ```

use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::execution::engine::{ChainTraversal, Topology, Traversal, Workflow};
use crate::workflow::model::Step;

/// What a resolution request is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role<'a> {
    /// The first step of the chain
    Start,
    /// The successor of the named member
    Next(&'a str),
    /// The error handler of the named member
    OnError(&'a str),
    /// The member itself, used by `goto`
    Member(&'a str),
}

impl Role<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Start => "start step".to_string(),
            Self::Next(member) => format!("next step of '{}'", member),
            Self::OnError(member) => format!("error handler of '{}'", member),
            Self::Member(member) => format!("member '{}'", member),
        }
    }
}

/// Maps a contract and a role to zero or one step.
pub trait StepResolver: Send + Sync {
    /// Resolves `role` within `contract` (already normalized).
    ///
    /// Fails with [`Error::AmbiguousResolution`] if more than one candidate
    /// matches.
    fn resolve(&self, contract: Option<&str>, role: Role<'_>) -> Result<Option<Step>>;
}

impl<R: StepResolver + ?Sized> StepResolver for Arc<R> {
    fn resolve(&self, contract: Option<&str>, role: Role<'_>) -> Result<Option<Step>> {
        (**self).resolve(contract, role)
    }
}

/// Trims and upper-cases a contract name; blank names mean "no contract".
pub fn normalize_contract(contract: Option<&str>) -> Option<String> {
    contract
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
}

#[derive(Debug, Clone)]
enum Marker {
    Start {
        contract: Option<String>,
    },
    Next {
        member: String,
        contract: Option<String>,
    },
    OnError {
        member: String,
        contract: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct Member {
    step: Step,
    markers: Vec<Marker>,
}

/// Explicit registration table of members and their markers.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    members: Vec<Member>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `step` as a member and returns a handle to mark it.
    ///
    /// Several members may share a name; resolving such a name fails with
    /// [`Error::AmbiguousResolution`].
    pub fn register(&mut self, step: Step) -> Result<MemberHandle<'_>> {
        step.ensure_named("member step")?;
        debug!("Registered member '{}'", step.name());

        self.members.push(Member {
            step,
            markers: Vec::new(),
        });
        let index = self.members.len() - 1;
        Ok(MemberHandle {
            registry: self,
            index,
        })
    }

    /// Number of registered members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Names of all registered members, in registration order.
    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.step.name()).collect()
    }

    /// Checks that the chain of `contract` resolves without errors.
    ///
    /// Reports a missing start, ambiguous markers or members, and markers
    /// pointing at members that were never registered.
    pub fn validate(&self, contract: Option<&str>) -> Result<()> {
        let contract = normalize_contract(contract);
        let contract = contract.as_deref();

        if self.resolve(contract, Role::Start)?.is_none() {
            return Err(Error::InvalidArgument(format!(
                "no start step registered for contract {}",
                contract.unwrap_or("<default>")
            )));
        }

        for member in &self.members {
            let name = member.step.name();
            let linked = member.markers.iter().any(|marker| match marker {
                Marker::Start { .. } => false,
                Marker::Next { contract: c, .. } | Marker::OnError { contract: c, .. } => {
                    c.as_deref() == contract
                }
            });
            if linked {
                self.resolve(contract, Role::Next(name))?;
                self.resolve(contract, Role::OnError(name))?;
            }
        }

        Ok(())
    }

    fn find_member(&self, name: &str) -> Result<Option<&Member>> {
        let name = name.trim();
        let candidates: Vec<&Member> = self
            .members
            .iter()
            .filter(|m| m.step.name() == name)
            .collect();

        match candidates.len() {
            0 => Ok(None),
            1 => Ok(Some(candidates[0])),
            n => Err(Error::AmbiguousResolution {
                role: Role::Member(name).describe(),
                candidates: n,
            }),
        }
    }

    fn linked(&self, contract: Option<&str>, role: Role<'_>) -> Result<Option<Step>> {
        let (Role::Next(source) | Role::OnError(source)) = role else {
            return Ok(None);
        };
        let origin = self.find_member(source)?.ok_or_else(|| {
            Error::InvalidArgument(format!("no member named '{}' is registered", source))
        })?;

        let targets: Vec<&str> = origin
            .markers
            .iter()
            .filter_map(|marker| match (marker, role) {
                (Marker::Next { member, contract: c }, Role::Next(_))
                | (Marker::OnError { member, contract: c }, Role::OnError(_))
                    if c.as_deref() == contract =>
                {
                    Some(member.as_str())
                }
                _ => None,
            })
            .collect();

        let target = match targets.as_slice() {
            [] => return Ok(None),
            [target] => *target,
            _ => {
                return Err(Error::AmbiguousResolution {
                    role: role.describe(),
                    candidates: targets.len(),
                })
            }
        };

        match self.find_member(target)? {
            Some(found) => Ok(Some(found.step.clone())),
            None => Err(Error::InvalidArgument(format!(
                "{} points at unregistered member '{}'",
                role.describe(),
                target
            ))),
        }
    }
}

impl StepResolver for StepRegistry {
    fn resolve(&self, contract: Option<&str>, role: Role<'_>) -> Result<Option<Step>> {
        match role {
            Role::Start => {
                let starts: Vec<&Member> = self
                    .members
                    .iter()
                    .filter(|m| {
                        m.markers.iter().any(|marker| {
                            matches!(marker, Marker::Start { contract: c } if c.as_deref() == contract)
                        })
                    })
                    .collect();

                match starts.as_slice() {
                    [] => Ok(None),
                    [start] => Ok(Some(start.step.clone())),
                    _ => Err(Error::AmbiguousResolution {
                        role: role.describe(),
                        candidates: starts.len(),
                    }),
                }
            }
            Role::Member(name) => Ok(self.find_member(name)?.map(|m| m.step.clone())),
            Role::Next(_) | Role::OnError(_) => self.linked(contract, role),
        }
    }
}

/// Handle to a freshly registered member.
pub struct MemberHandle<'r> {
    registry: &'r mut StepRegistry,
    index: usize,
}

impl<'r> MemberHandle<'r> {
    /// Marks the member as the start of `contract`.
    pub fn start(self, contract: Option<&str>) -> Self {
        let contract = normalize_contract(contract);
        self.push(Marker::Start { contract })
    }

    /// Makes `member` the successor of this member within `contract`.
    pub fn next(self, member: &str, contract: Option<&str>) -> Result<Self> {
        let member = marker_member(member, "next")?;
        let contract = normalize_contract(contract);
        Ok(self.push(Marker::Next { member, contract }))
    }

    /// Makes `member` the error handler of this member within `contract`.
    pub fn on_error(self, member: &str, contract: Option<&str>) -> Result<Self> {
        let member = marker_member(member, "on_error")?;
        let contract = normalize_contract(contract);
        Ok(self.push(Marker::OnError { member, contract }))
    }

    /// Name of the member.
    pub fn name(&self) -> &str {
        self.registry.members[self.index].step.name()
    }

    fn push(self, marker: Marker) -> Self {
        self.registry.members[self.index].markers.push(marker);
        self
    }
}

fn marker_member(member: &str, marker: &str) -> Result<String> {
    let member = member.trim();
    if member.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "{} marker requires a member name",
            marker
        )));
    }
    Ok(member.to_string())
}

/// Workflow whose nodes are resolved on demand.
#[derive(Debug)]
pub struct ResolvedWorkflow<R> {
    resolver: R,
    contract: Option<String>,
}

impl<R: StepResolver> ResolvedWorkflow<R> {
    /// Creates a workflow over `resolver` for `contract`.
    pub fn new(resolver: R, contract: Option<&str>) -> Self {
        Self {
            resolver,
            contract: normalize_contract(contract),
        }
    }

    /// Normalized contract this workflow runs.
    pub fn contract(&self) -> Option<&str> {
        self.contract.as_deref()
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

impl<R: StepResolver> Topology for ResolvedWorkflow<R> {
    type Node = Step;

    fn first(&self) -> Result<Option<Step>> {
        self.resolver.resolve(self.contract(), Role::Start)
    }

    fn step(&self, node: &Step) -> Result<Step> {
        Ok(node.clone())
    }

    fn next(&self, node: &Step) -> Result<Option<Step>> {
        self.resolver.resolve(self.contract(), Role::Next(node.name()))
    }

    fn on_error(&self, node: &Step) -> Result<Option<Step>> {
        self.resolver.resolve(self.contract(), Role::OnError(node.name()))
    }

    fn find(&self, name: &str) -> Result<Option<Step>> {
        self.resolver.resolve(self.contract(), Role::Member(name))
    }
}

impl<R: StepResolver> Workflow for ResolvedWorkflow<R> {
    fn traverse(&self) -> Box<dyn Traversal + '_> {
        Box::new(ChainTraversal::new(self))
    }
}
