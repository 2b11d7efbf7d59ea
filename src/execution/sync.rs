//! Synchronized Execution
//!
//! Serializes pulls and step invocations of any number of concurrent runs
//! behind one shared lock. The lock is taken separately for every
//! `advance` and every `invoke`, so steps of two runs sharing a root never
//! overlap while the runs themselves interleave.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::error::Result;
use crate::execution::engine::{Traversal, Workflow};
use crate::workflow::context::ExecutionContext;

/// Shared mutual-exclusion token.
///
/// Clones refer to the same lock. The lock is not reentrant: a step must
/// not execute another workflow synchronized on the same root.
#[derive(Debug, Clone, Default)]
pub struct SyncRoot(Arc<Mutex<()>>);

impl SyncRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock; a poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True when both handles guard the same lock.
    pub fn same_as(&self, other: &SyncRoot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Workflow whose steps run under a [`SyncRoot`].
pub struct SynchronizedWorkflow<W> {
    inner: W,
    sync_root: SyncRoot,
}

impl<W: Workflow> SynchronizedWorkflow<W> {
    /// Wraps `inner`; a fresh root is created when none is supplied.
    pub fn new(inner: W, sync_root: Option<SyncRoot>) -> Self {
        Self {
            inner,
            sync_root: sync_root.unwrap_or_default(),
        }
    }

    pub fn sync_root(&self) -> &SyncRoot {
        &self.sync_root
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }
}

impl<W: Workflow> Workflow for SynchronizedWorkflow<W> {
    fn traverse(&self) -> Box<dyn Traversal + '_> {
        Box::new(SynchronizedTraversal {
            inner: self.inner.traverse(),
            sync_root: &self.sync_root,
        })
    }
}

struct SynchronizedTraversal<'w> {
    inner: Box<dyn Traversal + 'w>,
    sync_root: &'w SyncRoot,
}

impl Traversal for SynchronizedTraversal<'_> {
    fn advance(&mut self) -> Result<bool> {
        let _guard = self.sync_root.lock();
        self.inner.advance()
    }

    fn invoke(&mut self, args: &[Value]) -> Result<ExecutionContext> {
        let _guard = self.sync_root.lock();
        self.inner.invoke(args)
    }
}
