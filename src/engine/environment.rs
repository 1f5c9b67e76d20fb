//! Scope exposed to a unit's code

use std::fmt;

use tracing::debug;

use super::context::Engine;
use super::error::EngineError;
use super::value::Value;
use crate::tree::Instance;

/// What a unit's code can see: its own object and a `require` hook.
///
/// The hook resolves other objects through the identity registry, so code that
/// requires a sibling module goes through the engine's memoization and cycle
/// detection without knowing about the engine.
#[derive(Clone)]
pub struct Environment {
    script: Instance,
    engine: Engine,
}

impl Environment {
    pub(crate) fn new(
        script: Instance,
        engine: Engine,
    ) -> Self {
        Self { script, engine }
    }

    /// The object the running code was loaded from
    pub fn script(&self) -> &Instance {
        &self.script
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Require `module` on behalf of this unit.
    ///
    /// Managed objects go through the unit's dependency path; anything else falls
    /// through to the host's native require.
    pub async fn require(
        &self,
        module: &Instance,
    ) -> Result<Value, EngineError> {
        match self.engine.registry().get(module) {
            Some(unit) => unit.require_as_dependency(&self.script).await,
            None => {
                debug!(
                    "'{}' requires unmanaged '{}'",
                    self.script.full_name(),
                    module.full_name()
                );
                self.engine
                    .host()
                    .require_native(module)
                    .await
                    .map_err(|err| EngineError::NativeRequireFailed {
                        instance: module.full_name(),
                        message: format!("{:#}", err),
                    })
            }
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Environment")
            .field("script", &self.script)
            .finish()
    }
}
