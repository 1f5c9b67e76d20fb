//! Engine configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Environment variables (BUNDLE_ENGINE_*)
//! 2. Config file (bundle-engine.toml)
//! 3. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use bundle_engine::util::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str("script_timeout_secs = 5").unwrap();
//! assert_eq!(config.script_timeout().as_secs(), 5);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`EngineConfig::script_timeout_secs`]
pub const ENV_SCRIPT_TIMEOUT: &str = "BUNDLE_ENGINE_SCRIPT_TIMEOUT";

/// Environment variable disabling dependency validation when set to `1`/`true`
pub const ENV_UNSAFE: &str = "BUNDLE_ENGINE_UNSAFE";

/// Configuration of one engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-script timeout used by `Project::start`, in seconds
    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
    /// Track require chains and reject cycles.
    ///
    /// With validation off a cyclic require waits on itself forever.
    #[serde(default = "default_validate_dependencies")]
    pub validate_dependencies: bool,
    /// Store id of the unit registry
    #[serde(default = "default_registry_id")]
    pub registry_id: String,
    /// Store id of the dependency edge table
    #[serde(default = "default_dependency_store_id")]
    pub dependency_store_id: String,
}

fn default_script_timeout_secs() -> u64 {
    30
}

fn default_validate_dependencies() -> bool {
    true
}

fn default_registry_id() -> String {
    "AbstractScriptStore".to_string()
}

fn default_dependency_store_id() -> String {
    "AbstractScriptDependencyStore".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            script_timeout_secs: default_script_timeout_secs(),
            validate_dependencies: default_validate_dependencies(),
            registry_id: default_registry_id(),
            dependency_store_id: default_dependency_store_id(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::ParseError)
    }

    /// Load configuration from a file.
    /// Returns default config if file doesn't exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(
        &self,
        path: &Path,
    ) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(ConfigError::IoError)?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;
        fs::write(path, content).map_err(ConfigError::IoError)?;

        Ok(())
    }

    /// Apply `BUNDLE_ENGINE_*` environment variables
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        if let Some(secs) = lookup(ENV_SCRIPT_TIMEOUT).and_then(|v| v.trim().parse().ok()) {
            self.script_timeout_secs = secs;
        }
        if let Some(flag) = lookup(ENV_UNSAFE) {
            let flag = flag.trim().to_ascii_lowercase();
            self.validate_dependencies = !(flag == "1" || flag == "true");
        }
        self
    }

    /// Per-script timeout as a [`Duration`]
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    SerializeError(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "Config serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
