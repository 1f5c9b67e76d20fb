//! Requirable modules

use std::sync::Arc;

use tracing::debug;

use super::context::Engine;
use super::error::EngineError;
use super::host::Executor;
use super::task::SharedTask;
use super::unit::{Executable, UnitCore};
use super::value::Value;
use crate::tree::Instance;

/// A requirable unit.
///
/// Its code runs at most once; the result (or the failure) is cached and handed
/// to every requester. Concurrent first requesters wait on the same execution.
pub struct ModuleUnit {
    core: UnitCore,
    /// The single execution, shared by all callers
    run: SharedTask<Result<Value, EngineError>>,
}

impl ModuleUnit {
    pub(crate) fn new(
        instance: Instance,
        executor: Executor,
        engine: Engine,
    ) -> Self {
        Self {
            core: UnitCore::new(instance, executor, engine),
            run: SharedTask::new(),
        }
    }

    /// Run the code if it has not run yet and return its result.
    ///
    /// A module must produce a value; an empty result fails with
    /// [`EngineError::EmptyModuleResult`]. Failures are cached like results.
    pub async fn execute(&self) -> Result<Value, EngineError> {
        let identity = self.identify();

        let outcome = self
            .run
            .run(|| {
                debug!("Executing module '{}'", identity);
                let body = self.core.invoke();
                let identity = identity.clone();
                async move {
                    match body.await {
                        Ok(Some(value)) => Ok(value),
                        Ok(None) => Err(EngineError::EmptyModuleResult { module: identity }),
                        Err(err) => Err(EngineError::from_executor(&identity, err)),
                    }
                }
            })
            .await;

        outcome.unwrap_or(Err(EngineError::Aborted { unit: identity }))
    }

    /// The cached result, if execution has finished
    pub fn result(&self) -> Option<Result<Value, EngineError>> {
        self.run.peek()
    }

    /// Require this module on behalf of `caller`.
    ///
    /// Records the edge `caller -> self`, fails fast if that closes a cycle, then
    /// executes. The edge is released on every exit path.
    pub(crate) async fn require_as_dependency(
        self: &Arc<Self>,
        caller: &Instance,
    ) -> Result<Value, EngineError> {
        let engine = self.core.engine();
        if !engine.config().validate_dependencies {
            return self.execute().await;
        }

        let validator = engine.validator();
        let _edge = validator.track(caller, self);
        validator.traceback(self)?;

        self.execute().await
    }
}

impl Executable for ModuleUnit {
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

impl std::fmt::Debug for ModuleUnit {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ModuleUnit")
            .field("instance", &self.identify())
            .field("executed", &self.has_executed())
            .finish()
    }
}
