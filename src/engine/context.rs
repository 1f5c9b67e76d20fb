//! Shared engine state handed to every unit

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::error::EngineError;
use super::host::{Executor, Host};
use super::module::ModuleUnit;
use super::registry::UnitRegistry;
use super::script::ScriptUnit;
use super::unit::Unit;
use super::validator::DependencyValidator;
use crate::store::StoreSpace;
use crate::tree::{ClassKind, Instance};
use crate::util::config::EngineConfig;

struct EngineInner {
    registry: UnitRegistry,
    validator: DependencyValidator,
    host: Arc<dyn Host>,
    config: EngineConfig,
}

/// Registry, validator, host and configuration of one engine.
///
/// The registry and edge table live in a [`StoreSpace`] under the ids from the
/// configuration, so engines built over the same space share them.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(
        space: &StoreSpace,
        host: Arc<dyn Host>,
        config: EngineConfig,
    ) -> Self {
        let registry = UnitRegistry::new(space, &config.registry_id);
        let validator = DependencyValidator::new(space, &config.dependency_store_id);

        Self {
            inner: Arc::new(EngineInner {
                registry,
                validator,
                host,
                config,
            }),
        }
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.inner.registry
    }

    pub fn validator(&self) -> &DependencyValidator {
        &self.inner.validator
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.inner.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Load `instance`'s source through the host and wrap it.
    pub fn create_unit(
        &self,
        instance: &Instance,
    ) -> Result<Unit, EngineError> {
        let identity = instance.full_name();
        let source = instance.source().unwrap_or_default();
        let executor = self
            .host()
            .load_chunk(&source, &format!("={}", identity))
            .map_err(|err| EngineError::LoadFailed {
                unit: identity,
                message: format!("{:#}", err),
            })?;

        self.wrap(instance, executor)
    }

    /// Wrap `instance` with an explicit executor and register it.
    ///
    /// Re-wrapping an object replaces its previous unit in the registry.
    pub fn wrap(
        &self,
        instance: &Instance,
        executor: Executor,
    ) -> Result<Unit, EngineError> {
        let unit = match instance.class() {
            ClassKind::Script => Unit::Script(Arc::new(ScriptUnit::new(
                instance.clone(),
                executor,
                self.clone(),
            ))),
            ClassKind::Module => Unit::Module(Arc::new(ModuleUnit::new(
                instance.clone(),
                executor,
                self.clone(),
            ))),
            ClassKind::Other(class) => {
                return Err(EngineError::UnsupportedInstance {
                    instance: instance.full_name(),
                    class: class.clone(),
                })
            }
        };

        self.registry().set(instance, unit.clone());
        debug!("Registered {} '{}'", unit.kind(), instance.full_name());
        Ok(unit)
    }
}

impl fmt::Debug for Engine {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish()
    }
}
