//! Engine error types

use std::time::Duration;

use thiserror::Error;

/// Errors raised while building, running or requiring units.
///
/// `Clone` so that one memoized failure can be handed to every waiter of a
/// module's single execution.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A module's code completed without producing a value
    #[error("Module '{module}' did not return any value")]
    EmptyModuleResult { module: String },

    /// A require chain re-entered a module that is still loading
    #[error(
        "Requested module '{module}' contains a cyclic reference\n\nTraceback: {}",
        .chain.join("\n\t⇒ ")
    )]
    CyclicDependency { module: String, chain: Vec<String> },

    /// A script (or other non-module unit) was passed to a require path
    #[error("No require implementation ({script})")]
    NotRequirable { script: String },

    /// Project-level require target is not a registered module
    #[error("Instance '{instance}' must be a module created by Project")]
    NotAModule { instance: String },

    /// A deferred execution did not finish in time; the execution keeps running
    #[error(
        "{} '{unit}' reached execution timeout after {}s! Try not to block the thread in {kind}s.",
        capitalize(.kind),
        .timeout.as_secs_f64()
    )]
    Timeout {
        /// `"module"` or `"script"`
        kind: &'static str,
        unit: String,
        timeout: Duration,
    },

    /// The object tree did not yield exactly one root
    #[error("Failed to build project; models without exactly one root instance are not supported (found {found})")]
    InvalidTree { found: usize },

    /// Only scripts and modules can be wrapped
    #[error("Instance '{instance}' ({class}) must be a script or a module")]
    UnsupportedInstance { instance: String, class: String },

    /// The host could not turn source into an executor
    #[error("Failed to load '{unit}': {message}")]
    LoadFailed { unit: String, message: String },

    /// The wrapped code returned an error
    #[error("'{unit}' failed: {message}")]
    ExecutorFailed { unit: String, message: String },

    /// Fallback require of an object the engine does not manage failed
    #[error("Failed to require '{instance}': {message}")]
    NativeRequireFailed { instance: String, message: String },

    /// The task driving an execution went away before producing a result
    #[error("Execution of '{unit}' was aborted before it produced a result")]
    Aborted { unit: String },

    /// Executors cannot be replaced once they ran
    #[error("Cannot replace the executor of '{unit}' after it has executed")]
    ExecutorLocked { unit: String },
}

impl EngineError {
    /// Convert an error returned by a unit's code.
    ///
    /// Engine errors raised further down a require chain pass through untouched,
    /// so the outermost caller still sees e.g. the full cyclic traceback.
    pub fn from_executor(
        unit: &str,
        err: anyhow::Error,
    ) -> Self {
        match err.downcast::<EngineError>() {
            Ok(engine_err) => engine_err,
            Err(err) => EngineError::ExecutorFailed {
                unit: unit.to_string(),
                message: format!("{:#}", err),
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }

    pub fn is_cyclic(&self) -> bool {
        matches!(self, EngineError::CyclicDependency { .. })
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
