//! Bundle Engine
//!
//! Runs the scripts and modules of a loaded object tree with module-system
//! semantics: each module executes at most once and every requester receives
//! the cached result, scripts run concurrently with a timeout each, and cyclic
//! require chains are rejected with a full traceback instead of deadlocking.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bundle_engine::{Instance, Project, StaticHost, Value};
//!
//! # async fn demo() -> bundle_engine::Result<()> {
//! let host = StaticHost::new();
//! host.define("util", |_| async { Ok(Some(Value::new(42i64))) });
//! host.define("main", |env| async move {
//!     let util = env.script().parent().and_then(|p| p.find_first_child("Util"));
//!     if let Some(util) = util {
//!         env.require(&util).await?;
//!     }
//!     Ok(None)
//! });
//!
//! let root = Instance::folder("Package");
//! root.add_child(Instance::module("Util", "util"));
//! root.add_child(Instance::script("Main", "main"));
//!
//! let project = Project::new(vec![root], Arc::new(host))?;
//! project.start().await?;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]

pub mod engine;
pub mod store;
pub mod tree;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

pub use engine::{
    executor, DependencyValidator, Engine, EngineError, Environment, Executable, Executor, Host,
    ModuleUnit, Project, ScriptRun, ScriptUnit, StaticHost, Unit, UnitRegistry, Value,
};
pub use store::{JsonStore, Store, StoreChange, StoreSpace};
pub use tree::{ClassKind, Instance, InstanceId, TreeError};
pub use util::config::EngineConfig;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name
pub const NAME: &str = "Bundle Engine";
