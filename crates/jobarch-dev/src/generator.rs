//! Seeded synthetic job archives
//!
//! The same [`GeneratorConfig`] always produces the same archive, so property
//! tests can report a failing seed and the CLI can regenerate a fixture.

use crate::{DevError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jobarch_core::{Cluster, JobRecord, JobState, MetricConfig, SubCluster, Tag};
use jobarch_query::{MemoryJobStore, MemoryMetricLoader, MetricSample, StaticRegistry};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CLUSTER_NAMES: [&str; 4] = ["alpha", "beta", "gamma", "delta"];
const NODE_COUNTS: [i32; 8] = [1, 1, 1, 1, 2, 4, 8, 16];
const TAG_NAMES: [&str; 4] = ["io-heavy", "memory-bound", "benchmark", "debug"];
const FINISHED_STATES: [JobState; 6] = [
    JobState::Completed,
    JobState::Completed,
    JobState::Completed,
    JobState::Failed,
    JobState::Cancelled,
    JobState::Timeout,
];

/// Shape of a synthetic archive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// RNG seed
    pub seed: u64,

    pub job_count: usize,

    /// Number of clusters, at most four
    pub cluster_count: usize,

    pub user_count: usize,
    pub project_count: usize,

    /// Nodes in each cluster's CPU subcluster
    pub nodes_per_cluster: usize,

    /// Fraction of jobs still running (0.0 to 1.0)
    pub running_fraction: f64,

    /// Fraction of jobs with no metric samples (0.0 to 1.0)
    pub missing_metrics_fraction: f64,

    /// Start times are spread over this many days before `epoch`
    pub span_days: i64,

    pub epoch: DateTime<Utc>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            job_count: 500,
            cluster_count: 2,
            user_count: 12,
            project_count: 4,
            nodes_per_cluster: 64,
            running_fraction: 0.1,
            missing_metrics_fraction: 0.05,
            span_days: 30,
            epoch: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().unwrap_or_default(),
        }
    }
}

impl GeneratorConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_job_count(mut self, job_count: usize) -> Self {
        self.job_count = job_count;
        self
    }

    pub fn with_cluster_count(mut self, cluster_count: usize) -> Self {
        self.cluster_count = cluster_count;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.cluster_count == 0 || self.cluster_count > CLUSTER_NAMES.len() {
            return Err(format!(
                "cluster_count must be between 1 and {}",
                CLUSTER_NAMES.len()
            ));
        }
        if self.user_count == 0 || self.project_count == 0 {
            return Err("user_count and project_count must be greater than zero".to_string());
        }
        if self.nodes_per_cluster < 16 {
            return Err("nodes_per_cluster must be at least 16".to_string());
        }
        for (name, fraction) in [
            ("running_fraction", self.running_fraction),
            ("missing_metrics_fraction", self.missing_metrics_fraction),
        ] {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(format!("{} must be between 0.0 and 1.0", name));
            }
        }
        if self.span_days < 1 {
            return Err("span_days must be at least 1".to_string());
        }
        Ok(())
    }
}

/// A complete archive: cluster metadata, jobs, and metric scalars
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntheticArchive {
    pub clusters: Vec<Cluster>,
    pub jobs: Vec<JobRecord>,
    pub metrics: Vec<MetricSample>,
}

/// File locations of a written archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFiles {
    pub jobs: PathBuf,
    pub clusters: PathBuf,
    pub metrics: PathBuf,
}

impl SyntheticArchive {
    pub fn job_store(&self) -> MemoryJobStore {
        MemoryJobStore::from_jobs(self.jobs.iter().cloned())
    }

    pub fn metric_loader(&self) -> MemoryMetricLoader {
        MemoryMetricLoader::from_samples(self.metrics.iter().cloned())
    }

    pub fn registry(&self) -> StaticRegistry {
        StaticRegistry::from_clusters(self.clusters.iter().cloned())
    }

    /// Write `jobs.json`, `clusters.json` and `metrics.json` into `dir`
    pub fn write_to_dir(&self, dir: &Path) -> Result<ArchiveFiles> {
        std::fs::create_dir_all(dir)?;
        let files = ArchiveFiles {
            jobs: dir.join("jobs.json"),
            clusters: dir.join("clusters.json"),
            metrics: dir.join("metrics.json"),
        };

        std::fs::write(&files.jobs, serde_json::to_vec_pretty(&self.jobs)?)?;
        std::fs::write(&files.clusters, serde_json::to_vec_pretty(&self.clusters)?)?;
        std::fs::write(&files.metrics, serde_json::to_vec_pretty(&self.metrics)?)?;

        info!(
            dir = %dir.display(),
            jobs = self.jobs.len(),
            samples = self.metrics.len(),
            "Wrote synthetic archive"
        );
        Ok(files)
    }
}

/// Generator of synthetic archives
pub struct ArchiveGenerator {
    config: GeneratorConfig,
    rng: StdRng,
}

impl ArchiveGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate().map_err(DevError::Config)?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn generate(&mut self) -> SyntheticArchive {
        let clusters: Vec<Cluster> = CLUSTER_NAMES[..self.config.cluster_count]
            .iter()
            .map(|name| build_cluster(name, self.config.nodes_per_cluster))
            .collect();

        let mut archive = SyntheticArchive {
            clusters,
            ..SyntheticArchive::default()
        };

        for id in 1..=self.config.job_count as i64 {
            let cluster = archive.clusters[self.rng.gen_range(0..archive.clusters.len())].clone();
            let mut job = self.random_job(id, &cluster);
            if self.rng.gen_bool(self.config.missing_metrics_fraction) {
                job.flops_any_avg = None;
                job.mem_bw_avg = None;
                job.load_avg = None;
                job.mem_used_max = None;
            } else {
                archive.metrics.extend(samples_of(&job));
            }
            archive.jobs.push(job);
        }

        debug!(
            seed = self.config.seed,
            jobs = archive.jobs.len(),
            "Generated synthetic archive"
        );
        archive
    }

    fn random_job(&mut self, id: i64, cluster: &Cluster) -> JobRecord {
        let gpu = self.rng.gen_bool(0.2);
        let sub_cluster = &cluster.sub_clusters[usize::from(gpu)];
        let hosts = host_names(cluster, sub_cluster.name.as_str(), self.config.nodes_per_cluster);

        let num_nodes = if gpu {
            self.rng.gen_range(1..=4)
        } else {
            *NODE_COUNTS.choose(&mut self.rng).unwrap_or(&1)
        };
        let allocated: Vec<String> = hosts
            .choose_multiple(&mut self.rng, num_nodes as usize)
            .cloned()
            .collect();

        let span = Duration::days(self.config.span_days);
        let offset = Duration::seconds(self.rng.gen_range(0..span.num_seconds()));
        let start = self.config.epoch - span + offset;
        let running = self.rng.gen_bool(self.config.running_fraction);
        let state = if running {
            JobState::Running
        } else {
            *FINISHED_STATES.choose(&mut self.rng).unwrap_or(&JobState::Completed)
        };
        // mostly short and medium jobs with a long tail
        let duration = match self.rng.gen_range(0..10) {
            0 => self.rng.gen_range(10..120),
            1..=6 => self.rng.gen_range(600..4 * 3600),
            _ => self.rng.gen_range(4 * 3600..24 * 3600),
        };

        let user = self.rng.gen_range(0..self.config.user_count);
        let project = user % self.config.project_count;

        let mut job = JobRecord::new(
            id,
            format!("user{:02}", user),
            format!("proj{:02}", project),
            cluster.name.as_str(),
            start,
        )
        .with_sub_cluster(sub_cluster.name.as_str())
        .with_partition(if gpu { "gpu" } else { "batch" })
        .with_state(state)
        .with_duration(duration)
        .with_nodes(num_nodes)
        .with_hosts(allocated);

        job.job_id = (100_000 + id).to_string();
        let threads = (sub_cluster.sockets_per_node
            * sub_cluster.cores_per_socket
            * sub_cluster.threads_per_core) as i32;
        job.num_hwthreads = threads * num_nodes;
        job.num_accelerators = if gpu { 4 * num_nodes } else { 0 };

        job.flops_any_avg = Some(self.rng.gen_range(0.0..sub_cluster.flop_rate_peak));
        job.mem_bw_avg = Some(self.rng.gen_range(1.0..sub_cluster.memory_bandwidth_peak));
        job.load_avg = Some(self.rng.gen_range(0.0..threads.max(1) as f64));
        job.mem_used_max = Some(self.rng.gen_range(1.0..256.0));

        if self.rng.gen_bool(0.2) {
            let index = self.rng.gen_range(0..TAG_NAMES.len());
            job = job.with_tag(Tag {
                id: index as i64 + 1,
                tag_type: "class".to_string(),
                name: TAG_NAMES[index].to_string(),
            });
        }
        job
    }
}

fn build_cluster(name: &str, nodes: usize) -> Cluster {
    let prefix = &name[..1];
    let mut main = SubCluster::new("main", format!("{}[001-{:03}]", prefix, nodes));
    main.processor_type = "x86_64".to_string();
    main.sockets_per_node = 2;
    main.cores_per_socket = 36;
    main.threads_per_core = 1;
    main.flop_rate_peak = 4_000.0;
    main.memory_bandwidth_peak = 350.0;

    let mut gpu = SubCluster::new("gpu", format!("{}g[01-08]", prefix));
    gpu.processor_type = "x86_64".to_string();
    gpu.sockets_per_node = 2;
    gpu.cores_per_socket = 32;
    gpu.threads_per_core = 2;
    gpu.flop_rate_peak = 40_000.0;
    gpu.memory_bandwidth_peak = 6_000.0;

    let mut flops = MetricConfig::new("flops_any", "GF/s");
    flops.peak = 4_000.0;
    let mut mem_bw = MetricConfig::new("mem_bw", "GB/s");
    mem_bw.peak = 350.0;

    Cluster::new(name)
        .with_metric(flops)
        .with_metric(mem_bw)
        .with_metric(MetricConfig::new("cpu_load", ""))
        .with_metric(MetricConfig::new("mem_used", "GB"))
        .with_sub_cluster(main)
        .with_sub_cluster(gpu)
}

fn host_names(cluster: &Cluster, sub_cluster: &str, nodes: usize) -> Vec<String> {
    let prefix = &cluster.name[..1];
    match sub_cluster {
        "gpu" => (1..=8).map(|i| format!("{}g{:02}", prefix, i)).collect(),
        _ => (1..=nodes).map(|i| format!("{}{:03}", prefix, i)).collect(),
    }
}

fn samples_of(job: &JobRecord) -> Vec<MetricSample> {
    [
        ("flops_any", job.flops_any_avg),
        ("mem_bw", job.mem_bw_avg),
        ("cpu_load", job.load_avg),
        ("mem_used", job.mem_used_max),
    ]
    .into_iter()
    .filter_map(|(metric, value)| {
        value.map(|value| MetricSample {
            job_id: job.id,
            metric: metric.to_string(),
            value,
        })
    })
    .collect()
}
