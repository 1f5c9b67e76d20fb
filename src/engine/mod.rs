//! Execution and dependency engine
//!
//! Wraps the code objects of a loaded tree into units and runs them with
//! module-system semantics.
//!
//! # Structure
//!
//! - [`registry`] - object -> unit lookup, process-wide
//! - [`unit`] - the shared unit contract and the [`Unit`] sum type
//! - [`module`] - requirable units, executed at most once
//! - [`script`] - top-level units, never requirable
//! - [`validator`] - active require chains and cycle detection
//! - [`project`] - discovers units in a tree, drives `start` / `require`
//!
//! # Flow
//!
//! ```text
//! Project::new ─ discover ─> Unit (Module | Script) ─> UnitRegistry
//!
//! Project::start ──> ScriptUnit::deferred_execute (concurrent, timeout each)
//!
//! Environment::require(obj)
//!   └─ UnitRegistry::get(obj)
//!        ├─ Module: track(caller -> module), traceback, execute (cached), untrack
//!        ├─ Script: NotRequirable
//!        └─ None:   Host::require_native
//! ```

pub mod context;
pub mod environment;
pub mod error;
pub mod host;
pub mod module;
pub mod project;
pub mod registry;
pub mod script;
pub mod task;
pub mod unit;
pub mod validator;
pub mod value;

pub use context::Engine;
pub use environment::Environment;
pub use error::{EngineError, EngineResult};
pub use host::{executor, Executor, Host, StaticHost};
pub use module::ModuleUnit;
pub use project::{Project, RunReport, ScriptRun};
pub use registry::UnitRegistry;
pub use script::ScriptUnit;
pub use task::{BoxFuture, SharedTask};
pub use unit::{Executable, Unit};
pub use validator::{DependencyValidator, EdgeGuard};
pub use value::Value;

#[cfg(test)]
mod tests;
