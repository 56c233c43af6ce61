//! Configuration management for the jobarch CLI

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use jobarch_core::config::load_layered;
use jobarch_core::{ArchiveConfig, ObservabilityConfig};
use jobarch_query::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration: the shared core sections plus engine and output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Archive file locations
    pub archive: ArchiveConfig,

    /// Logging configuration
    pub observability: ObservabilityConfig,

    /// Query engine tuning
    pub engine: EngineConfig,

    /// Output defaults
    pub output: OutputConfig,

    /// Configuration source path
    #[serde(skip)]
    source: Option<PathBuf>,
}

/// Output defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format (table, json, yaml, text)
    pub format: String,

    /// Default page size of `jobs`
    pub items_per_page: i64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "table".to_string(),
            items_per_page: 25,
        }
    }
}

impl CliConfig {
    /// Load configuration from the given file, the per-user config file if it
    /// exists, or the default layers
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_config_path().filter(|path| path.exists()),
        };

        let mut config: Self = load_layered(path.as_deref()).with_context(|| match &path {
            Some(path) => format!("Failed to load config file: {}", path.display()),
            None => "Failed to load configuration".to_string(),
        })?;
        config.validate()?;
        config.source = path;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.archive.validate()?;
        self.observability.validate()?;
        self.engine
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid engine configuration: {}", e))?;
        self.output_format()?;
        if self.output.items_per_page < 1 {
            anyhow::bail!("output.items_per_page must be at least 1");
        }
        Ok(())
    }

    /// Per-user configuration file, e.g. `~/.config/jobarch/config.yaml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("jobarch").join("config.yaml"))
    }

    /// Get the configuration source path
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        <OutputFormat as clap::ValueEnum>::from_str(&self.output.format, true)
            .map_err(|e| anyhow::anyhow!("Invalid output.format '{}': {}", self.output.format, e))
    }
}
