//! Configuration for primitives that carry tunable parameters.
//!
//! [`LockstepConfig`] groups the defaults used by [`Throttle::from_config`],
//! [`Semaphore::from_config`] and the naming of background threads. It can be
//! built in code, parsed from TOML (feature `config-file`), and adjusted from
//! `LOCKSTEP_*` environment variables.
//!
//! ```toml
//! [throttle]
//! limit = 5
//! window_ms = 1000
//!
//! [semaphore]
//! permits = 4
//!
//! [threads]
//! name_prefix = "lockstep"
//! ```
//!
//! [`Throttle::from_config`]: crate::combinator::Throttle::from_config
//! [`Semaphore::from_config`]: crate::sync::Semaphore::from_config

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding [`ThrottleConfig::limit`].
pub const ENV_THROTTLE_LIMIT: &str = "LOCKSTEP_THROTTLE_LIMIT";
/// Environment variable overriding [`ThrottleConfig::window_ms`].
pub const ENV_THROTTLE_WINDOW_MS: &str = "LOCKSTEP_THROTTLE_WINDOW_MS";
/// Environment variable overriding [`SemaphoreConfig::permits`].
pub const ENV_SEMAPHORE_PERMITS: &str = "LOCKSTEP_SEMAPHORE_PERMITS";
/// Environment variable overriding [`ThreadConfig::name_prefix`].
pub const ENV_THREAD_PREFIX: &str = "LOCKSTEP_THREAD_PREFIX";

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("invalid config document: {0}")]
    Parse(String),
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// An environment override was not a valid value.
    #[error("invalid value {value:?} for {key}")]
    InvalidOverride {
        /// Variable name.
        key: &'static str,
        /// Raw value that failed to parse.
        value: String,
    },
    /// A field holds a value no primitive can work with.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Rate limiter parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Accepted calls per window.
    pub limit: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl ThrottleConfig {
    /// Window length as a [`Duration`].
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Rejects a zero limit or a zero window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::Invalid {
                field: "throttle.limit",
                reason: "must be at least 1",
            });
        }
        if self.window_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "throttle.window_ms",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            window_ms: 1000,
        }
    }
}

/// Semaphore parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SemaphoreConfig {
    /// Capacity.
    pub permits: usize,
}

impl SemaphoreConfig {
    /// Rejects a semaphore with no permits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.permits == 0 {
            return Err(ConfigError::Invalid {
                field: "semaphore.permits",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self { permits: 4 }
    }
}

/// Background thread parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Prefix for the names of spawned threads.
    pub name_prefix: String,
}

impl ThreadConfig {
    /// Builds a thread name such as `lockstep-throttle`.
    #[must_use]
    pub fn thread_name(&self, role: &str) -> String {
        format!("{}-{role}", self.name_prefix)
    }

    /// Rejects an empty prefix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "threads.name_prefix",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            name_prefix: "lockstep".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockstepConfig {
    /// Rate limiter defaults.
    pub throttle: ThrottleConfig,
    /// Semaphore defaults.
    pub semaphore: SemaphoreConfig,
    /// Thread naming.
    pub threads: ThreadConfig,
}

impl LockstepConfig {
    /// Checks that every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.throttle.validate()?;
        self.semaphore.validate()?;
        self.threads.validate()
    }
}

/// Builds a [`LockstepConfig`] from layered sources.
///
/// Later layers win: defaults, then a TOML document, then overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config: LockstepConfig,
}

impl ConfigLoader {
    /// Starts from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current layer with a parsed TOML document.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(mut self, document: &str) -> Result<Self, ConfigError> {
        self.config = toml::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(self)
    }

    /// Reads and parses a TOML file.
    #[cfg(feature = "config-file")]
    pub fn from_path(self, path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path)?;
        self.from_toml_str(&document)
    }

    /// Applies `LOCKSTEP_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_THROTTLE_LIMIT) {
            self.config.throttle.limit = parse_override(ENV_THROTTLE_LIMIT, raw)?;
        }
        if let Some(raw) = lookup(ENV_THROTTLE_WINDOW_MS) {
            self.config.throttle.window_ms = parse_override(ENV_THROTTLE_WINDOW_MS, raw)?;
        }
        if let Some(raw) = lookup(ENV_SEMAPHORE_PERMITS) {
            self.config.semaphore.permits = parse_override(ENV_SEMAPHORE_PERMITS, raw)?;
        }
        if let Some(raw) = lookup(ENV_THREAD_PREFIX) {
            self.config.threads.name_prefix = raw;
        }
        Ok(self)
    }

    /// Applies overrides from the process environment.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<LockstepConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn parse_override<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { key, value: raw })
}
