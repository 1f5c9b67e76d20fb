//! Host collaborators: turning source into executors
//!
//! The engine does not parse or compile code. A [`Host`] loads an object's raw
//! source into an [`Executor`], and provides the fallback used when code requires
//! an object the engine does not manage.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::RwLock;

use super::environment::Environment;
use super::task::BoxFuture;
use super::value::Value;
use crate::tree::{Instance, InstanceId};

/// Loaded code of one unit.
///
/// The environment is passed on every invocation; this is how a unit's scope
/// (its own object and its `require` hook) is bound to the code.
pub type Executor =
    Arc<dyn Fn(Environment) -> BoxFuture<'static, anyhow::Result<Option<Value>>> + Send + Sync>;

/// Build an [`Executor`] from an async closure
pub fn executor<F, Fut>(f: F) -> Executor
where
    F: Fn(Environment) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    Arc::new(move |env| Box::pin(f(env)))
}

/// Code-loading mechanism of the embedding program
pub trait Host: Send + Sync {
    /// Load `source` into an executor. `chunk_name` identifies it in diagnostics.
    fn load_chunk(
        &self,
        source: &str,
        chunk_name: &str,
    ) -> anyhow::Result<Executor>;

    /// Require an object the engine does not manage.
    fn require_native(
        &self,
        instance: &Instance,
    ) -> BoxFuture<'static, anyhow::Result<Value>> {
        let name = instance.full_name();
        Box::pin(async move { Err(anyhow!("'{}' is not a module managed by this engine", name)) })
    }
}

/// Host whose chunks are Rust executors registered by name.
///
/// An object's source is the chunk name to look up. Objects can also be given a
/// fixed native value returned when they are required without being managed.
#[derive(Clone, Default)]
pub struct StaticHost {
    chunks: Arc<RwLock<HashMap<String, Executor>>>,
    natives: Arc<RwLock<HashMap<InstanceId, Value>>>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the chunk `name`
    pub fn define<F, Fut>(
        &self,
        name: impl Into<String>,
        f: F,
    ) -> &Self
    where
        F: Fn(Environment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.chunks.write().insert(name.into(), executor(f));
        self
    }

    /// Value returned when `instance` is required through the native fallback
    pub fn define_native(
        &self,
        instance: &Instance,
        value: Value,
    ) -> &Self {
        self.natives.write().insert(instance.id(), value);
        self
    }

    pub fn has_chunk(
        &self,
        name: &str,
    ) -> bool {
        self.chunks.read().contains_key(name)
    }
}

impl Host for StaticHost {
    fn load_chunk(
        &self,
        source: &str,
        chunk_name: &str,
    ) -> anyhow::Result<Executor> {
        self.chunks
            .read()
            .get(source.trim())
            .cloned()
            .ok_or_else(|| anyhow!("{}: no chunk named '{}'", chunk_name, source.trim()))
    }

    fn require_native(
        &self,
        instance: &Instance,
    ) -> BoxFuture<'static, anyhow::Result<Value>> {
        let value = self.natives.read().get(&instance.id()).cloned();
        let name = instance.full_name();
        Box::pin(async move {
            value.ok_or_else(|| anyhow!("'{}' is not a module managed by this engine", name))
        })
    }
}

impl fmt::Debug for StaticHost {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut chunks: Vec<String> = self.chunks.read().keys().cloned().collect();
        chunks.sort();
        f.debug_struct("StaticHost")
            .field("chunks", &chunks)
            .field("natives", &self.natives.read().len())
            .finish()
    }
}
