//! Engine logging
//!
//! Go-style simple logging: `[LEVEL] message`
//!
//! The engine only emits `tracing` events; installing a subscriber is left to
//! the embedding program. What each level shows:
//!
//! | Level | Events |
//! |-------|--------|
//! | `debug` | unit registration, executions, require edges, store creation |
//! | `info` | project construction |
//! | `warn` | script timeouts, cyclic requires, store type clashes |
//!
//! # Usage
//!
//! ```rust
//! use bundle_engine::util::logger::{self, LogLevel};
//!
//! // BUNDLE_ENGINE_LOG=debug enables require tracing
//! logger::init_from_env(LogLevel::Warn);
//! tracing::warn!("Script '{}' reached execution timeout", "Package.Main");
//! ```

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

/// Environment variable selecting the log level for [`init_from_env`]
pub const ENV_LOG: &str = "BUNDLE_ENGINE_LOG";

/// Verbosity of engine logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Every require edge and execution
    Debug,
    /// Project lifecycle
    Info,
    /// Timeouts and cycles only
    Warn,
    Error,
}

/// Unknown log level name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level '{0}' (expected debug, info, warn or error)")]
pub struct ParseLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Initialize logger at INFO level
pub fn init() {
    init_with_level(LogLevel::Info);
}

/// Initialize logger at the level named by `BUNDLE_ENGINE_LOG`, or `fallback`
/// when it is unset or not a level name.
pub fn init_from_env(fallback: LogLevel) {
    init_with_level(level_from(std::env::var(ENV_LOG).ok().as_deref(), fallback));
}

fn level_from(
    value: Option<&str>,
    fallback: LogLevel,
) -> LogLevel {
    value
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

/// Initialize logger with custom level (Go style: `[LEVEL] message`).
///
/// Does nothing if a global subscriber is already installed.
pub fn init_with_level(level: LogLevel) {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level.into());

    // 不显示时间、不显示模块路径、无颜色
    let layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false)
        .with_level(true)
        .with_ansi(false)
        .compact()
        .with_filter(filter);

    let _ = Registry::default().with(layer).try_init();
}

/// Initialize logger at DEBUG level, tracing every require
pub fn init_debug() {
    init_with_level(LogLevel::Debug);
}
