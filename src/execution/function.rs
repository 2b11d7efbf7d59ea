//! Functions
//!
//! A function is a named unit mapping an input parameter map to an output
//! parameter map. Parameter maps keep insertion order and reject duplicate
//! keys. Functions are identified by their [`Function::id`]: two function
//! objects are equal exactly when their ids are.

use std::fmt;

use indexmap::map::Entry;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{BoxError, Error, Result, StepFailure};
use crate::execution::command::short_type_name;
use crate::execution::sync::SyncRoot;

/// Insertion-ordered parameter map with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(IndexMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from ordered pairs, failing on the first repeated key.
    pub fn from_pairs<I, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.insert(key, value)?;
        }
        Ok(params)
    }

    /// Adds a new key; an existing key fails with [`Error::DuplicateKey`].
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        match self.0.entry(key.into()) {
            Entry::Occupied(entry) => Err(Error::DuplicateKey(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(value.into());
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl IntoIterator for Params {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A named parameters-in, parameters-out unit.
pub trait Function: Send + Sync {
    /// Identity of the function.
    fn id(&self) -> Uuid;

    /// Short name; defaults to the implementing type's name.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Optional namespace prefixed to [`Function::full_name`].
    fn namespace(&self) -> Option<&str> {
        None
    }

    /// `namespace.name`, or just the name when no namespace is set.
    fn full_name(&self) -> String {
        let name = self.name().trim();
        match self.namespace().map(str::trim).filter(|ns| !ns.is_empty()) {
            Some(ns) => format!("{}.{}", ns, name),
            None => name.to_string(),
        }
    }

    /// Fills `output` from `input`.
    fn on_execute(&self, input: &Params, output: &mut Params) -> std::result::Result<(), BoxError>;

    /// Runs the function and returns its output map.
    ///
    /// A duplicate output key surfaces as [`Error::DuplicateKey`]; any other
    /// failure becomes a [`StepFailure`] named after the function.
    fn execute(&self, input: Params) -> Result<Params> {
        let mut output = Params::new();
        debug!("Executing function '{}' with {} input(s)", self.full_name(), input.len());
        self.on_execute(&input, &mut output)
            .map_err(|cause| match cause.downcast::<Error>() {
                Ok(error) if matches!(*error, Error::DuplicateKey(_)) => *error,
                Ok(error) => Error::StepFailure(StepFailure::new(self.full_name(), error)),
                Err(cause) => Error::StepFailure(StepFailure::new(self.full_name(), cause)),
            })?;
        Ok(output)
    }

    /// Same as [`Function::execute`] from ordered key/value pairs.
    fn execute_pairs<I, K>(&self, pairs: I) -> Result<Params>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
        Self: Sized,
    {
        self.execute(Params::from_pairs(pairs)?)
    }

    /// Wraps the function so its body runs under a lock.
    fn synchronized(self, sync_root: Option<SyncRoot>) -> SynchronizedFunction<Self>
    where
        Self: Sized,
    {
        SynchronizedFunction::new(self, sync_root)
    }
}

impl PartialEq for dyn Function + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for dyn Function + '_ {}

type Body = dyn Fn(&Params, &mut Params) -> std::result::Result<(), BoxError> + Send + Sync;

/// Function built from a closure.
pub struct DelegateFunction {
    id: Uuid,
    name: String,
    namespace: Option<String>,
    body: Box<Body>,
}

impl DelegateFunction {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Params, &mut Params) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            namespace: None,
            body: Box::new(body),
        }
    }

    /// Replaces the generated id, e.g. to give a known identity.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl Function for DelegateFunction {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn on_execute(&self, input: &Params, output: &mut Params) -> std::result::Result<(), BoxError> {
        (self.body)(input, output)
    }
}

impl fmt::Debug for DelegateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateFunction")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Function whose body runs under a [`SyncRoot`].
pub struct SynchronizedFunction<F> {
    inner: F,
    sync_root: SyncRoot,
}

impl<F: Function> SynchronizedFunction<F> {
    pub fn new(inner: F, sync_root: Option<SyncRoot>) -> Self {
        Self {
            inner,
            sync_root: sync_root.unwrap_or_default(),
        }
    }

    pub fn sync_root(&self) -> &SyncRoot {
        &self.sync_root
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: Function> Function for SynchronizedFunction<F> {
    fn id(&self) -> Uuid {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn namespace(&self) -> Option<&str> {
        self.inner.namespace()
    }

    fn on_execute(&self, input: &Params, output: &mut Params) -> std::result::Result<(), BoxError> {
        let _guard = self.sync_root.lock();
        self.inner.on_execute(input, output)
    }
}
