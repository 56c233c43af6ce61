//! Configuration management for jobarch
//!
//! Configuration is layered with the `config` crate: built-in defaults, then
//! a YAML/JSON/TOML file, then `JOBARCH__*` environment variables.

use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "JOBARCH_CONFIG";

/// Prefix for environment overrides, e.g. `JOBARCH__OBSERVABILITY__LOG_LEVEL`
pub const ENV_PREFIX: &str = "JOBARCH";

const DEFAULT_CONFIG_FILE: &str = "./jobarch.yaml";

/// Load `T` from defaults, an optional file and the environment.
///
/// With `file = None` the path in `JOBARCH_CONFIG` is used, falling back to
/// `./jobarch.yaml`; a missing fallback file is not an error.
pub fn load_layered<T>(file: Option<&Path>) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&T::default())?);

    builder = match file {
        Some(path) => builder.add_source(config::File::from(path.to_path_buf())),
        None => match std::env::var(CONFIG_ENV) {
            Ok(path) => builder.add_source(config::File::with_name(&path)),
            Err(_) => {
                builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
            }
        },
    };

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

/// Top-level configuration shared by jobarch front ends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the archive is read from
    pub archive: ArchiveConfig,

    /// Logging configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load and validate from the default layers
    pub fn load() -> Result<Self> {
        let parsed: Self = load_layered(None)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Load and validate with a specific file layer
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let parsed: Self = load_layered(Some(path.as_ref()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        self.archive.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

/// Archive file locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// JSON array of job records
    pub jobs_file: PathBuf,

    /// JSON array of cluster definitions
    pub clusters_file: PathBuf,

    /// Optional JSON array of metric samples (`jobId`, `metric`, `value`)
    pub metrics_file: Option<PathBuf>,
}

impl ArchiveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.jobs_file.as_os_str().is_empty() {
            return Err(crate::Error::config("archive.jobs_file cannot be empty"));
        }
        if self.clusters_file.as_os_str().is_empty() {
            return Err(crate::Error::config("archive.clusters_file cannot be empty"));
        }
        Ok(())
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            jobs_file: PathBuf::from("./archive/jobs.json"),
            clusters_file: PathBuf::from("./archive/clusters.json"),
            metrics_file: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log format
    pub log_format: LogFormat,
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<()> {
        self.log_level
            .parse::<tracing::Level>()
            .map_err(|_| crate::Error::config(format!("Invalid log level: {}", self.log_level)))?;
        Ok(())
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}
