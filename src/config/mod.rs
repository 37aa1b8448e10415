//! Control plane configuration.
//!
//! Loaded from an optional YAML file and `SIMFLEET__`-prefixed environment
//! variables (`SIMFLEET__TIMEOUTS__TRANSITION_MS=20000`).

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::logging::Severity;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "simfleet.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SIMFLEET_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SIMFLEET";

/// Default timeout for participant RPC calls, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 500;
/// Default timeout for state transitions, in milliseconds.
pub const DEFAULT_TRANSITION_TIMEOUT_MS: u64 = 10_000;
/// Default timeout for discovery, in milliseconds.
pub const DEFAULT_DISCOVER_TIMEOUT_MS: u64 = 1_000;
/// Default timeout of calls made by participant proxies, in milliseconds.
pub const DEFAULT_PARTICIPANT_TIMEOUT_MS: u64 = 1_000;

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimfleetConfig {
    pub timeouts: TimeoutConfig,
    pub plugins: PluginConfig,
    pub logging: LoggingConfig,
}

/// Timeouts, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// State queries and other short calls.
    pub default_ms: u64,
    /// One fleet-wide transition step.
    pub transition_ms: u64,
    /// Participant discovery.
    pub discover_ms: u64,
    /// Calls issued by participant proxies on their own (discovery,
    /// configuration, log sink registration).
    pub participant_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_ms: DEFAULT_TIMEOUT_MS,
            transition_ms: DEFAULT_TRANSITION_TIMEOUT_MS,
            discover_ms: DEFAULT_DISCOVER_TIMEOUT_MS,
            participant_ms: DEFAULT_PARTICIPANT_TIMEOUT_MS,
        }
    }
}

impl TimeoutConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_ms)
    }

    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }

    pub fn discover(&self) -> Duration {
        Duration::from_millis(self.discover_ms)
    }

    pub fn participant(&self) -> Duration {
        Duration::from_millis(self.participant_ms)
    }
}

/// Transport plugin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Plugin manifest. Without one, only in-process factories are available.
    pub manifest: Option<PathBuf>,
}

/// Monitor logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum severity delivered to a system's monitor.
    pub severity: Severity,
}

impl SimfleetConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `simfleet.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
