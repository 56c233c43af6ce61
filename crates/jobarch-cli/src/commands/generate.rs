//! Synthetic archive generation

use crate::output::OutputFormatter;
use anyhow::{Context, Result};
use clap::Args;
use jobarch_dev::{ArchiveGenerator, GeneratorConfig};
use std::path::PathBuf;
use tracing::info;

/// Arguments of `generate`
#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    /// Directory to write jobs.json, clusters.json and metrics.json into
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Number of jobs
    #[arg(long, default_value = "500")]
    pub jobs: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of clusters (1-4)
    #[arg(long, default_value = "2")]
    pub clusters: usize,
}

impl GenerateArgs {
    fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig::default()
            .with_seed(self.seed)
            .with_job_count(self.jobs)
            .with_cluster_count(self.clusters)
    }
}

/// Write a synthetic archive to disk
pub fn generate_archive(args: GenerateArgs, formatter: &OutputFormatter) -> Result<()> {
    let mut generator =
        ArchiveGenerator::new(args.generator_config()).context("Invalid generator settings")?;
    let archive = generator.generate();
    let files = archive
        .write_to_dir(&args.out)
        .with_context(|| format!("Failed to write archive to {}", args.out.display()))?;
    info!(seed = args.seed, jobs = archive.jobs.len(), "Generated archive");

    formatter.print_success(&format!(
        "Wrote {} jobs on {} clusters to {} (jobs_file: {}, clusters_file: {}, metrics_file: {})",
        archive.jobs.len(),
        archive.clusters.len(),
        args.out.display(),
        files.jobs.display(),
        files.clusters.display(),
        files.metrics.display(),
    ))
}
