//! Command implementations for the jobarch CLI

pub mod analysis;
pub mod generate;
pub mod jobs;
pub mod metadata;

use crate::output::OutputFormatter;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use jobarch_core::{IntRange, JobFilter, StringInput, TimeRange};
use jobarch_query::{QueryEngine, QueryError, RequestContext};
use std::path::PathBuf;
use tracing::debug;

/// Everything a query command needs
pub struct Session {
    pub engine: QueryEngine,
    pub ctx: RequestContext,
    pub formatter: OutputFormatter,
}

/// Map an engine error to a user-facing error without internal detail
pub fn query_error(err: QueryError) -> anyhow::Error {
    debug!(error = %err, "Query failed");
    anyhow::anyhow!(err.public_message())
}

/// Job filter flags shared by the query commands
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Read the filter list from a JSON or YAML file
    #[arg(long, value_name = "FILE")]
    pub filter_file: Option<PathBuf>,

    /// Cluster name
    #[arg(long)]
    pub cluster: Option<String>,

    /// Username (exact match)
    #[arg(long = "job-user", value_name = "USER")]
    pub job_user: Option<String>,

    /// Project name (exact match)
    #[arg(long)]
    pub project: Option<String>,

    /// Partition name
    #[arg(long)]
    pub partition: Option<String>,

    /// Job states (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub state: Vec<String>,

    /// Tag names; jobs carrying any of them match (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tag: Vec<String>,

    /// Minimum duration in seconds
    #[arg(long)]
    pub min_duration: Option<i64>,

    /// Maximum duration in seconds
    #[arg(long)]
    pub max_duration: Option<i64>,

    /// Minimum node count
    #[arg(long)]
    pub min_nodes: Option<i64>,

    /// Maximum node count
    #[arg(long)]
    pub max_nodes: Option<i64>,

    /// Jobs started at or after this time (RFC 3339)
    #[arg(long)]
    pub started_after: Option<DateTime<Utc>>,

    /// Jobs started at or before this time (RFC 3339)
    #[arg(long)]
    pub started_before: Option<DateTime<Utc>>,

    /// Running jobs only if running for at least this many seconds
    #[arg(long)]
    pub min_running_for: Option<i64>,
}

impl FilterArgs {
    /// The filter list: entries from `--filter-file`, plus one entry built
    /// from the flags if any is set
    pub fn to_filters(&self) -> Result<Vec<JobFilter>> {
        let mut filters = match &self.filter_file {
            Some(path) => read_filter_file(path)?,
            None => Vec::new(),
        };

        let from_flags = self.flag_filter();
        if from_flags != JobFilter::default() {
            filters.push(from_flags);
        }
        Ok(filters)
    }

    fn flag_filter(&self) -> JobFilter {
        let range = |from: Option<i64>, to: Option<i64>| match (from, to) {
            (None, None) => None,
            (from, to) => Some(IntRange::new(from.unwrap_or(0), to.unwrap_or(i64::MAX))),
        };

        JobFilter {
            cluster: self.cluster.clone().map(StringInput::eq),
            user: self.job_user.clone().map(StringInput::eq),
            project: self.project.clone().map(StringInput::eq),
            partition: self.partition.clone().map(StringInput::eq),
            state: (!self.state.is_empty()).then(|| self.state.clone()),
            tags: (!self.tag.is_empty()).then(|| self.tag.clone()),
            duration: range(self.min_duration, self.max_duration),
            num_nodes: range(self.min_nodes, self.max_nodes),
            start_time: (self.started_after.is_some() || self.started_before.is_some()).then(|| {
                TimeRange {
                    from: self.started_after,
                    to: self.started_before,
                }
            }),
            min_running_for: self.min_running_for,
            ..JobFilter::default()
        }
    }
}

fn read_filter_file(path: &std::path::Path) -> Result<Vec<JobFilter>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read filter file: {}", path.display()))?;
    let filters = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON filter file: {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML filter file: {}", path.display()))?
    };
    Ok(filters)
}
