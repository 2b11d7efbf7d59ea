//! Commands
//!
//! A command is a guarded action: `execute` runs the action only when
//! `can_execute` accepts the parameter, and is a no-op otherwise.

use std::fmt;

use log::debug;

use crate::error::{BoxError, Error, Result, StepFailure};
use crate::execution::sync::SyncRoot;

/// A parameterized, guarded action.
pub trait Command: Send + Sync {
    type Param;

    /// Name used when reporting failures.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Returns true if the command may run with `param`.
    fn can_execute(&self, param: &Self::Param) -> bool;

    /// The action itself; only called after `can_execute` accepted `param`.
    fn on_execute(&self, param: &Self::Param) -> std::result::Result<(), BoxError>;

    /// Runs the action if `can_execute` allows it.
    ///
    /// Returns `Ok(false)` when the guard rejected the parameter.
    fn execute(&self, param: &Self::Param) -> Result<bool> {
        if !self.can_execute(param) {
            debug!("Command '{}' skipped: guard rejected parameter", self.name());
            return Ok(false);
        }

        self.on_execute(param)
            .map_err(|cause| Error::StepFailure(StepFailure::new(self.name(), cause)))?;
        Ok(true)
    }

    /// Wraps the command so guard and action run under a lock.
    fn synchronized(self, sync_root: Option<SyncRoot>) -> SynchronizedCommand<Self>
    where
        Self: Sized,
    {
        SynchronizedCommand::new(self, sync_root)
    }
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

type Predicate<P> = dyn Fn(&P) -> bool + Send + Sync;
type Action<P> = dyn Fn(&P) -> std::result::Result<(), BoxError> + Send + Sync;

/// Command built from closures.
pub struct DelegateCommand<P> {
    name: String,
    predicate: Option<Box<Predicate<P>>>,
    action: Box<Action<P>>,
}

impl<P> DelegateCommand<P> {
    /// Creates a command that can always execute.
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&P) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: None,
            action: Box::new(action),
        }
    }

    /// Sets the guard consulted before every execution.
    pub fn with_predicate<G>(mut self, predicate: G) -> Self
    where
        G: Fn(&P) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }
}

impl<P> Command for DelegateCommand<P> {
    type Param = P;

    fn name(&self) -> &str {
        &self.name
    }

    fn can_execute(&self, param: &P) -> bool {
        self.predicate.as_ref().map_or(true, |predicate| predicate(param))
    }

    fn on_execute(&self, param: &P) -> std::result::Result<(), BoxError> {
        (self.action)(param)
    }
}

impl<P> fmt::Debug for DelegateCommand<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateCommand")
            .field("name", &self.name)
            .field("guarded", &self.predicate.is_some())
            .finish()
    }
}

/// Command whose guard and action run under a [`SyncRoot`].
///
/// `execute` holds the lock across both the guard and the action, so the
/// guard's answer is still valid when the action runs.
pub struct SynchronizedCommand<C> {
    inner: C,
    sync_root: SyncRoot,
}

impl<C: Command> SynchronizedCommand<C> {
    pub fn new(inner: C, sync_root: Option<SyncRoot>) -> Self {
        Self {
            inner,
            sync_root: sync_root.unwrap_or_default(),
        }
    }

    pub fn sync_root(&self) -> &SyncRoot {
        &self.sync_root
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Command> Command for SynchronizedCommand<C> {
    type Param = C::Param;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn can_execute(&self, param: &C::Param) -> bool {
        let _guard = self.sync_root.lock();
        self.inner.can_execute(param)
    }

    fn on_execute(&self, param: &C::Param) -> std::result::Result<(), BoxError> {
        let _guard = self.sync_root.lock();
        self.inner.on_execute(param)
    }

    fn execute(&self, param: &C::Param) -> Result<bool> {
        let _guard = self.sync_root.lock();
        self.inner.execute(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct Doubler;

    impl Command for Doubler {
        type Param = i64;

        fn can_execute(&self, param: &i64) -> bool {
            *param >= 0
        }

        fn on_execute(&self, param: &i64) -> std::result::Result<(), BoxError> {
            if *param > 100 {
                return Err(format!("{} is too large", param).into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert_eq!(Doubler.name(), "Doubler");
        assert_eq!(short_type_name::<DelegateCommand<u8>>(), "DelegateCommand");
    }

    #[test]
    fn test_execute_skips_when_guard_rejects() {
        assert!(!Doubler.execute(&-1).unwrap());
        assert!(Doubler.execute(&5).unwrap());
    }

    #[test]
    fn test_failure_names_command() {
        let err = Doubler.execute(&500).unwrap_err();
        match err {
            Error::StepFailure(failure) => {
                assert_eq!(failure.step(), "Doubler");
                assert_eq!(failure.cause().to_string(), "500 is too large");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_delegate_command_without_predicate() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let command = DelegateCommand::new("count", move |step: &usize| {
            counter.fetch_add(*step, Ordering::SeqCst);
            Ok(())
        });

        assert!(command.can_execute(&3));
        assert!(command.execute(&3).unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delegate_command_with_predicate() {
        let command = DelegateCommand::new("even-only", |_: &u32| Ok(()))
            .with_predicate(|n| n % 2 == 0);

        assert!(command.execute(&2).unwrap());
        assert!(!command.execute(&3).unwrap());
        assert_eq!(command.name(), "even-only");
    }

    #[test]
    fn test_synchronized_command_serializes_actions() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let (current, peak) = (Arc::clone(&in_flight), Arc::clone(&max_seen));
        let command = DelegateCommand::new("guarded", move |_: &()| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(2));
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
        let command = Arc::new(command.synchronized(None));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let command = Arc::clone(&command);
                thread::spawn(move || command.execute(&()))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().unwrap());
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_synchronized_command_shares_root() {
        let root = SyncRoot::new();
        let command = Doubler.synchronized(Some(root.clone()));
        assert!(command.sync_root().same_as(&root));
        assert_eq!(command.name(), "Doubler");
        assert!(command.can_execute(&1));
        assert!(command.inner().can_execute(&1));
    }
}
