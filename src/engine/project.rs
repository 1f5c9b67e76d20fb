//! Project: the units of one loaded object tree

use std::iter;
use std::sync::Arc;

use tracing::{debug, info};

use super::context::Engine;
use super::error::EngineError;
use super::host::Host;
use super::module::ModuleUnit;
use super::script::ScriptUnit;
use super::task::SharedTask;
use super::unit::{Executable, Unit};
use super::value::Value;
use crate::store::StoreSpace;
use crate::tree::Instance;
use crate::util::config::EngineConfig;

/// Outcome of one script during [`Project::start`]
#[derive(Debug, Clone)]
pub struct ScriptRun {
    /// The script object
    pub script: Instance,
    /// What the script returned, or its timeout
    pub result: Result<Option<Value>, EngineError>,
}

/// Result of the one-time run of all scripts
pub type RunReport = Result<Arc<[ScriptRun]>, EngineError>;

/// Builds and manages the units of an object tree.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> Result<(), bundle_engine::EngineError> {
/// use std::sync::Arc;
/// use bundle_engine::{Instance, Project, StaticHost, Value};
///
/// let host = StaticHost::new();
/// host.define("thread", |_| async { Ok(Some(Value::new("thread lib"))) });
///
/// let root = Instance::folder("Roact");
/// let thread = Instance::module("Thread", "thread");
/// root.add_child(thread.clone());
///
/// let project = Project::new(vec![root], Arc::new(host))?;
/// project.start().await?;
/// let value = project.require(&thread).await?;
/// # Ok(())
/// # }
/// ```
pub struct Project {
    /// The root object
    instance: Instance,
    engine: Engine,
    /// Every unit discovered under the root
    units: Vec<Unit>,
    /// One-time execution of all scripts
    runtime_job: SharedTask<RunReport>,
}

impl Project {
    /// Build a project over the process-wide stores with default configuration.
    ///
    /// `models` are the objects produced by the tree builder; exactly one is required.
    pub fn new(
        models: Vec<Instance>,
        host: Arc<dyn Host>,
    ) -> Result<Self, EngineError> {
        Self::with_config(models, host, EngineConfig::default())
    }

    /// Build a project over the process-wide stores
    pub fn with_config(
        models: Vec<Instance>,
        host: Arc<dyn Host>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        Self::with_space(models, host, config, &StoreSpace::global())
    }

    /// Build a project whose registry and edge table live in `space`
    pub fn with_space(
        models: Vec<Instance>,
        host: Arc<dyn Host>,
        config: EngineConfig,
        space: &StoreSpace,
    ) -> Result<Self, EngineError> {
        Self::from_engine(models, Engine::new(space, host, config))
    }

    /// Build a project with an existing engine
    pub fn from_engine(
        models: Vec<Instance>,
        engine: Engine,
    ) -> Result<Self, EngineError> {
        let instance = match <[Instance; 1]>::try_from(models) {
            Ok([root]) => root,
            Err(models) => return Err(EngineError::InvalidTree { found: models.len() }),
        };

        let units = iter::once(instance.clone())
            .chain(instance.descendants())
            .filter(Instance::is_code)
            .map(|object| engine.create_unit(&object))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Built project '{}' with {} units",
            instance.full_name(),
            units.len()
        );

        Ok(Self {
            instance,
            engine,
            units,
            runtime_job: SharedTask::new(),
        })
    }

    /// The root object
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<ModuleUnit>> + '_ {
        self.units.iter().filter_map(Unit::as_module)
    }

    pub fn scripts(&self) -> impl Iterator<Item = &Arc<ScriptUnit>> + '_ {
        self.units.iter().filter_map(Unit::as_script)
    }

    /// Execute every script **once**, concurrently, each bounded by the configured
    /// timeout. All later calls return the same report.
    ///
    /// A timeout is reported in that script's [`ScriptRun`]; any other script
    /// failure fails the whole run once every script has finished.
    pub async fn start(&self) -> RunReport {
        let outcome = self
            .runtime_job
            .run(|| {
                let scripts: Vec<Unit> = self
                    .units
                    .iter()
                    .filter(|unit| unit.is_script())
                    .cloned()
                    .collect();
                let timeout = self.engine.config().script_timeout();
                debug!(
                    "Starting {} scripts of '{}'",
                    scripts.len(),
                    self.instance.full_name()
                );
                run_scripts(scripts, timeout)
            })
            .await;

        outcome.unwrap_or_else(|| {
            Err(EngineError::Aborted {
                unit: self.instance.full_name(),
            })
        })
    }

    /// Require a module object and return its result.
    ///
    /// The object must be a module registered by any project sharing this
    /// project's registry. This entry point records no dependency edge.
    pub async fn require(
        &self,
        object: &Instance,
    ) -> Result<Value, EngineError> {
        let module = self
            .engine
            .registry()
            .get_module(object)
            .ok_or_else(|| EngineError::NotAModule {
                instance: object.full_name(),
            })?;

        module.execute().await
    }
}

async fn run_scripts(
    scripts: Vec<Unit>,
    timeout: std::time::Duration,
) -> RunReport {
    let jobs: Vec<_> = scripts
        .into_iter()
        .map(|unit| {
            let script = unit.instance().clone();
            let handle = tokio::spawn(async move { unit.deferred_execute(timeout).await });
            (script, handle)
        })
        .collect();

    let mut runs = Vec::with_capacity(jobs.len());
    for (script, handle) in jobs {
        let result = handle.await.unwrap_or_else(|_| {
            Err(EngineError::Aborted {
                unit: script.full_name(),
            })
        });
        runs.push(ScriptRun { script, result });
    }

    let failure = runs.iter().find_map(|run| match &run.result {
        Err(err) if !err.is_timeout() => Some(err.clone()),
        _ => None,
    });
    if let Some(err) = failure {
        return Err(err);
    }

    Ok(runs.into())
}

impl std::fmt::Debug for Project {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("instance", &self.instance.full_name())
            .field("units", &self.units)
            .field("started", &self.runtime_job.is_started())
            .finish()
    }
}
