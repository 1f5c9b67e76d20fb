//! Runnable scripts

use tracing::debug;

use super::context::Engine;
use super::error::EngineError;
use super::host::Executor;
use super::unit::{Executable, UnitCore};
use super::value::Value;
use crate::tree::Instance;

/// A top-level entry point.
///
/// Scripts have no return-value contract and can never be required. Running
/// them once per project is latched by [`Project::start`](super::Project::start).
pub struct ScriptUnit {
    core: UnitCore,
}

impl ScriptUnit {
    pub(crate) fn new(
        instance: Instance,
        executor: Executor,
        engine: Engine,
    ) -> Self {
        Self {
            core: UnitCore::new(instance, executor, engine),
        }
    }

    /// Run the code. Every call invokes it again.
    pub async fn execute(&self) -> Result<Option<Value>, EngineError> {
        let identity = self.identify();
        debug!("Running script '{}'", identity);

        self.core
            .invoke()
            .await
            .map_err(|err| EngineError::from_executor(&identity, err))
    }

    /// Scripts cannot be required.
    pub(crate) async fn require_as_dependency(
        &self,
        _caller: &Instance,
    ) -> Result<Value, EngineError> {
        Err(EngineError::NotRequirable {
            script: self.identify(),
        })
    }
}

impl Executable for ScriptUnit {
    fn instance(&self) -> &Instance {
        self.core.instance()
    }

    fn set_executor(
        &self,
        executor: Executor,
    ) -> Result<(), EngineError> {
        self.core.set_executor(executor)
    }

    fn has_executed(&self) -> bool {
        self.core.has_executed()
    }
}

impl std::fmt::Debug for ScriptUnit {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ScriptUnit")
            .field("instance", &self.identify())
            .field("executed", &self.has_executed())
            .finish()
    }
}
