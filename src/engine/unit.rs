//! Executable units
//!
//! A unit wraps one loadable code object. Two variants exist and the choice is
//! made once, when the object is discovered:
//!
//! - [`ModuleUnit`]: requirable, runs at most once, every requester gets the
//!   cached result
//! - [`ScriptUnit`]: a top-level entry point, never requirable
//!
//! [`Unit`] is the closed sum over both; [`Executable`] is the contract they share.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::context::Engine;
use super::environment::Environment;
use super::error::EngineError;
use super::host::Executor;
use super::module::ModuleUnit;
use super::script::ScriptUnit;
use super::task::BoxFuture;
use super::value::Value;
use crate::tree::Instance;

/// Contract shared by modules and scripts
pub trait Executable {
    /// The wrapped object
    fn instance(&self) -> &Instance;

    /// Stable name for diagnostics: the object's full path
    fn identify(&self) -> String {
        self.instance().full_name()
    }

    /// Replace the code to run. Fails once the unit has executed.
    fn set_executor(
        &self,
        executor: Executor,
    ) -> Result<(), EngineError>;

    /// Whether the code was invoked at least once
    fn has_executed(&self) -> bool;
}

/// State common to both unit variants
pub(crate) struct UnitCore {
    instance: Instance,
    executor: RwLock<Executor>,
    environment: Environment,
    executed: AtomicBool,
}

impl UnitCore {
    pub(crate) fn new(
        instance: Instance,
        executor: Executor,
        engine: Engine,
    ) -> Self {
        let environment = Environment::new(instance.clone(), engine);
        Self {
            instance,
            executor: RwLock::new(executor),
            environment,
            executed: AtomicBool::new(false),
        }
    }

    pub(crate) fn instance(&self) -> &Instance {
        &self.instance
    }

    pub(crate) fn engine(&self) -> &Engine {
        self.environment.engine()
    }

    pub(crate) fn set_executor(
        &self,
        executor: Executor,
    ) -> Result<(), EngineError> {
        let mut current = self.executor.write();
        if self.executed.load(Ordering::SeqCst) {
            return Err(EngineError::ExecutorLocked {
                unit: self.instance.full_name(),
            });
        }
        *current = executor;
        Ok(())
    }

    pub(crate) fn has_executed(&self) -> bool {
        self.executed.load(Ordering::SeqCst)
    }

    /// Invoke the executor with this unit's environment
    pub(crate) fn invoke(&self) -> BoxFuture<'static, anyhow::Result<Option<Value>>> {
        let executor = {
            let executor = self.executor.read();
            self.executed.store(true, Ordering::SeqCst);
            executor.clone()
        };
        executor(self.environment.clone())
    }
}

/// A module or a script
#[derive(Clone)]
pub enum Unit {
    Module(Arc<ModuleUnit>),
    Script(Arc<ScriptUnit>),
}

impl Unit {
    /// Load and register a unit for `instance`
    pub fn from_instance(
        instance: &Instance,
        engine: &Engine,
    ) -> Result<Unit, EngineError> {
        engine.create_unit(instance)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Unit::Module(_) => "module",
            Unit::Script(_) => "script",
        }
    }

    pub fn is_module(&self) -> bool {
        matches!(self, Unit::Module(_))
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Unit::Script(_))
    }

    pub fn as_module(&self) -> Option<&Arc<ModuleUnit>> {
        match self {
            Unit::Module(module) => Some(module),
            Unit::Script(_) => None,
        }
    }

    pub fn as_script(&self) -> Option<&Arc<ScriptUnit>> {
        match self {
            Unit::Script(script) => Some(script),
            Unit::Module(_) => None,
        }
    }

    /// Whether both handles point at the same unit
    pub fn ptr_eq(
        &self,
        other: &Unit,
    ) -> bool {
        match (self, other) {
            (Unit::Module(a), Unit::Module(b)) => Arc::ptr_eq(a, b),
            (Unit::Script(a), Unit::Script(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Run the unit. Modules always yield `Some`.
    pub async fn execute(&self) -> Result<Option<Value>, EngineError> {
        match self {
            Unit::Module(module) => module.execute().await.map(Some),
            Unit::Script(script) => script.execute().await,
        }
    }

    /// Run the unit on its own task and wait at most `timeout` for it.
    ///
    /// On timeout only the wait is abandoned: the execution keeps running and a
    /// module still caches its result when it eventually finishes.
    pub async fn deferred_execute(
        &self,
        timeout: Duration,
    ) -> Result<Option<Value>, EngineError> {
        let identity = self.identify();
        let unit = self.clone();
        let handle = tokio::spawn(async move { unit.execute().await });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!("Execution of '{}' panicked: {}", identity, err);
                Err(EngineError::Aborted { unit: identity })
            }
            Err(_) => {
                warn!("'{}' did not finish within {:?}", identity, timeout);
                Err(EngineError::Timeout {
                    kind: self.kind(),
                    unit: identity,
                    timeout,
                })
            }
        }
    }

    /// Require this unit on behalf of `caller`
    pub(crate) async fn require_as_dependency(
        &self,
        caller: &Instance,
    ) -> Result<Value, EngineError> {
        debug!("'{}' requires '{}'", caller.full_name(), self.identify());
        match self {
            Unit::Module(module) => module.require_as_dependency(caller).await,
            Unit::Script(script) => script.require_as_dependency(caller).await,
        }
    }
}

impl Executable for Unit {
    fn instance(&self) -> &Instance {
        match self {
            Unit::Module(module) => module.instance(),
            Unit::Script(script) => script.instance(),
        }
    }

    fn set_executor(
        &self,
        executor: Executor,
    ) -> Result<(), EngineError> {
        match self {
            Unit::Module(module) => module.set_executor(executor),
            Unit::Script(script) => script.set_executor(executor),
        }
    }

    fn has_executed(&self) -> bool {
        match self {
            Unit::Module(module) => module.has_executed(),
            Unit::Script(script) => script.has_executed(),
        }
    }
}

impl std::fmt::Debug for Unit {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Unit::{}({})", self.kind(), self.identify())
    }
}
