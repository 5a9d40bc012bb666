//! Run configuration via `nestrun.toml`
//!
//! A run reads its settings from a config file next to the suite, then
//! applies environment overrides on top. A missing file means defaults.

use nestrun_core::{ExecuteAllTests, StringListTestFilter, TestFilter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Config file name looked up next to the suite.
pub const CONFIG_FILE_NAME: &str = "nestrun.toml";

/// Errors raised while loading or saving a [`RunConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("failed to access config file '{path}': {source}")]
    Io {
        /// The file
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for a run config
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// The file
        path: String,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// The config could not be serialized
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An environment override carries an unusable value
    #[error("invalid value '{value}' for {key}")]
    InvalidValue {
        /// The variable
        key: String,
        /// Its value
        value: String,
    },
}

fn default_timeout_ms() -> u64 {
    40_000
}

fn default_verify_replay() -> bool {
    cfg!(debug_assertions)
}

/// Settings of one suite run.
///
/// # Example
///
/// ```toml
/// timeout_ms = 40000
/// lazy = false
/// # parallelism = 8
/// # only_tag = "slow"
/// # filter = "root > child > test 4"
/// # watchdog_ms = 600000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Per-test timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum number of tests running at once. Defaults to the number of cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,
    /// Run each test on its first await instead of right away.
    #[serde(default)]
    pub lazy: bool,
    /// Only run tests carrying this tag, or inside a context carrying it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_tag: Option<String>,
    /// Only run the test or context at this path, e.g. `root > child > test`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Abort the whole run after this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchdog_ms: Option<u64>,
    /// Check that replayed context bodies declare the same children.
    #[serde(default = "default_verify_replay")]
    pub verify_replay: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            parallelism: None,
            lazy: false,
            only_tag: None,
            filter: None,
            watchdog_ms: None,
            verify_replay: default_verify_replay(),
        }
    }
}

impl RunConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# nestrun run configuration
#
# Per-test timeout in milliseconds (default: 40000)
timeout_ms = 40000

# Run tests on first await instead of as soon as they are discovered
lazy = false

# Maximum number of tests running at once (default: number of cores)
# parallelism = 8

# Only run tests tagged with this tag
# only_tag = "slow"

# Only run one test or context, names separated by '>'
# filter = "root > child > test"

# Abort the whole run after this many milliseconds
# watchdog_ms = 600000
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read `nestrun.toml` from `dir` if present, defaults otherwise.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply the `NESTRUN_*` environment variables.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("NESTRUN_TIMEOUT") {
            self.timeout_ms = parse_value("NESTRUN_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("NESTRUN_PARALLELISM") {
            let parallelism: usize = parse_value("NESTRUN_PARALLELISM", &value)?;
            if parallelism == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "NESTRUN_PARALLELISM".to_string(),
                    value,
                });
            }
            self.parallelism = Some(parallelism);
        }
        if let Some(value) = lookup("NESTRUN_TAG") {
            self.only_tag = Some(value);
        }
        if let Some(value) = lookup("NESTRUN_FILTER") {
            self.filter = Some(value);
        }
        if let Some(value) = lookup("NESTRUN_WATCHDOG_MILLIS") {
            self.watchdog_ms = Some(parse_value("NESTRUN_WATCHDOG_MILLIS", &value)?);
        }
        if let Some(value) = lookup("NESTRUN_LAZY") {
            self.lazy = parse_value("NESTRUN_LAZY", &value)?;
        }
        Ok(self)
    }

    /// Per-test timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Number of tests allowed to run at once
    pub fn parallelism(&self) -> usize {
        self.parallelism.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Suite watchdog timeout, if any
    pub fn watchdog(&self) -> Option<Duration> {
        self.watchdog_ms.map(Duration::from_millis)
    }

    /// The path filter selected by `filter`.
    pub fn test_filter(&self) -> Arc<dyn TestFilter> {
        match self.filter.as_deref().map(StringListTestFilter::parse) {
            Some(filter) if !filter.names().is_empty() => Arc::new(filter),
            _ => Arc::new(ExecuteAllTests),
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
