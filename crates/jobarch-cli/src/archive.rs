//! Loading an archive from JSON files into the in-memory collaborators

use anyhow::{Context, Result};
use jobarch_core::{ArchiveConfig, Cluster, JobRecord};
use jobarch_query::{
    EngineConfig, MemoryJobStore, MemoryMetricLoader, MetricSample, QueryEngine, StaticRegistry,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read archive file: {}", path.display()))?;
    serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse archive file: {}", path.display()))
}

/// Build a query engine over the archive files named in `archive`.
///
/// Metrics without an explicit sample fall back to the averages stored on
/// the job record.
pub fn open_engine(archive: &ArchiveConfig, config: EngineConfig) -> Result<QueryEngine> {
    let jobs: Vec<JobRecord> = read_json(&archive.jobs_file)?;
    let clusters: Vec<Cluster> = read_json(&archive.clusters_file)?;
    let samples: Vec<MetricSample> = match &archive.metrics_file {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    debug!(samples = samples.len(), "Read metric samples");

    let store = MemoryJobStore::from_jobs(jobs);
    let metrics = MemoryMetricLoader::from_samples(samples).with_record_fallback();
    let registry = StaticRegistry::from_clusters(clusters);

    info!(
        jobs = store.len(),
        jobs_file = %archive.jobs_file.display(),
        "Archive loaded"
    );
    Ok(QueryEngine::with_config(
        Arc::new(store),
        Arc::new(metrics),
        Arc::new(registry),
        config,
    ))
}
