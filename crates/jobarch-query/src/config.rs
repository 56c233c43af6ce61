//! Configuration for the query engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the query engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-request limits
    pub query: QueryConfig,

    /// Statistics constants
    pub statistics: StatisticsConfig,

    /// Footprint and heatmap analysis
    pub analysis: AnalysisConfig,
}

/// Configuration for query execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Deadline applied to a request that does not carry its own, in milliseconds
    pub timeout_ms: u64,
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Constants used by the statistics aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Jobs shorter than this many seconds count as short jobs
    pub short_job_threshold_secs: i64,

    /// Bucket width of the walltime histogram, in seconds
    pub walltime_bucket_secs: i64,
}

/// Axis scale of the roofline heatmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapScale {
    Linear,
    /// Bin on log10 of both coordinates; bounds must be positive
    Log10,
}

/// Configuration for footprint and heatmap analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Upper bound on the population a single analysis may touch
    pub max_jobs: usize,

    /// Metric providing the flop rate (heatmap y axis)
    pub flops_metric: String,

    /// Metric providing memory bandwidth (divides flops for the x axis)
    pub mem_bw_metric: String,

    pub heatmap_scale: HeatmapScale,

    /// Metric loads in flight per request
    pub load_concurrency: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            short_job_threshold_secs: 120,
            walltime_bucket_secs: 3600,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_jobs: 500,
            flops_metric: "flops_any".to_string(),
            mem_bw_metric: "mem_bw".to_string(),
            heatmap_scale: HeatmapScale::Linear,
            load_concurrency: 16,
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.query.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_short_job_threshold(mut self, seconds: i64) -> Self {
        self.statistics.short_job_threshold_secs = seconds;
        self
    }

    /// Set the analysis population cap
    pub fn with_max_jobs_for_analysis(mut self, max_jobs: usize) -> Self {
        self.analysis.max_jobs = max_jobs;
        self
    }

    /// Set the metric names used for roofline coordinates
    pub fn with_roofline_metrics(
        mut self,
        flops: impl Into<String>,
        mem_bw: impl Into<String>,
    ) -> Self {
        self.analysis.flops_metric = flops.into();
        self.analysis.mem_bw_metric = mem_bw.into();
        self
    }

    pub fn with_heatmap_scale(mut self, scale: HeatmapScale) -> Self {
        self.analysis.heatmap_scale = scale;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.query.timeout_ms == 0 {
            return Err("query timeout must be greater than zero".to_string());
        }

        if self.statistics.short_job_threshold_secs < 0 {
            return Err("short job threshold cannot be negative".to_string());
        }

        if self.statistics.walltime_bucket_secs <= 0 {
            return Err("walltime bucket must be greater than zero".to_string());
        }

        if self.analysis.max_jobs == 0 {
            return Err("analysis max_jobs must be greater than zero".to_string());
        }

        if self.analysis.flops_metric.is_empty() || self.analysis.mem_bw_metric.is_empty() {
            return Err("roofline metric names cannot be empty".to_string());
        }

        if self.analysis.load_concurrency == 0 {
            return Err("analysis load_concurrency must be greater than zero".to_string());
        }

        Ok(())
    }
}
