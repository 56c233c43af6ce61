//! In-memory reference collaborators
//!
//! [`MemoryJobStore`] evaluates predicates directly against the records it
//! holds. It gives no cross-call snapshot: under concurrent inserts a page and
//! the count of the same request may disagree momentarily.

use async_trait::async_trait;
use dashmap::DashMap;
use jobarch_core::{
    JobRecord, JobStore, MetricLoader, OrderClause, Predicate, SortDirection, SortField, Tag,
    Window,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::debug;

/// Job store backed by a concurrent map keyed by archive id
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<DashMap<i64, JobRecord>>,
    stats: Arc<StoreStats>,
}

/// Call counters
#[derive(Debug, Default)]
pub struct StoreStats {
    pub list_calls: AtomicU64,
    pub count_calls: AtomicU64,
    pub fetch_calls: AtomicU64,
    /// `tags` and `partitions`
    pub metadata_calls: AtomicU64,
    pub jobs_scanned: AtomicU64,
}

/// Point-in-time copy of [`StoreStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    pub list_calls: u64,
    pub count_calls: u64,
    pub fetch_calls: u64,
    pub metadata_calls: u64,
    pub jobs_scanned: u64,
}

impl StoreStatsSnapshot {
    pub fn total_calls(&self) -> u64 {
        self.list_calls + self.count_calls + self.fetch_calls + self.metadata_calls
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jobs(jobs: impl IntoIterator<Item = JobRecord>) -> Self {
        let store = Self::new();
        for job in jobs {
            store.insert(job);
        }
        store
    }

    /// Insert or replace a job by archive id
    pub fn insert(&self, job: JobRecord) {
        self.jobs.insert(job.id, job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            list_calls: self.stats.list_calls.load(AtomicOrdering::Relaxed),
            count_calls: self.stats.count_calls.load(AtomicOrdering::Relaxed),
            fetch_calls: self.stats.fetch_calls.load(AtomicOrdering::Relaxed),
            metadata_calls: self.stats.metadata_calls.load(AtomicOrdering::Relaxed),
            jobs_scanned: self.stats.jobs_scanned.load(AtomicOrdering::Relaxed),
        }
    }

    fn matching(&self, predicate: &Predicate) -> Vec<JobRecord> {
        self.stats
            .jobs_scanned
            .fetch_add(self.jobs.len() as u64, AtomicOrdering::Relaxed);
        self.jobs
            .iter()
            .filter(|entry| predicate.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn list(
        &self,
        predicate: &Predicate,
        window: Option<Window>,
        order: Option<&OrderClause>,
    ) -> jobarch_core::Result<Vec<JobRecord>> {
        self.stats.list_calls.fetch_add(1, AtomicOrdering::Relaxed);

        let mut jobs = self.matching(predicate);
        match order {
            Some(order) => jobs.sort_by(|a, b| compare_jobs(a, b, order)),
            None => jobs.sort_by_key(|job| job.id),
        }

        let jobs: Vec<JobRecord> = match window {
            Some(window) => jobs
                .into_iter()
                .skip(window.offset)
                .take(window.limit)
                .collect(),
            None => jobs,
        };

        debug!(returned = jobs.len(), "Listed jobs from memory store");
        Ok(jobs)
    }

    async fn count(&self, predicate: &Predicate) -> jobarch_core::Result<u64> {
        self.stats.count_calls.fetch_add(1, AtomicOrdering::Relaxed);
        self.stats
            .jobs_scanned
            .fetch_add(self.jobs.len() as u64, AtomicOrdering::Relaxed);

        let count = self
            .jobs
            .iter()
            .filter(|entry| predicate.matches(entry.value()))
            .count();
        Ok(count as u64)
    }

    async fn fetch_by_id(&self, id: i64) -> jobarch_core::Result<Option<JobRecord>> {
        self.stats.fetch_calls.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn tags(&self) -> jobarch_core::Result<Vec<Tag>> {
        self.stats.metadata_calls.fetch_add(1, AtomicOrdering::Relaxed);
        let mut tags: BTreeMap<i64, Tag> = BTreeMap::new();
        for entry in self.jobs.iter() {
            for tag in &entry.value().tags {
                tags.entry(tag.id).or_insert_with(|| tag.clone());
            }
        }
        Ok(tags.into_values().collect())
    }

    async fn partitions(&self, cluster: &str) -> jobarch_core::Result<Vec<String>> {
        self.stats.metadata_calls.fetch_add(1, AtomicOrdering::Relaxed);
        let partitions: BTreeSet<String> = self
            .jobs
            .iter()
            .filter(|entry| {
                let job = entry.value();
                job.cluster == cluster && !job.partition.is_empty()
            })
            .map(|entry| entry.value().partition.clone())
            .collect();
        Ok(partitions.into_iter().collect())
    }
}

/// Order by the clause's field, then by ascending id
fn compare_jobs(a: &JobRecord, b: &JobRecord, order: &OrderClause) -> Ordering {
    let primary = match order.field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::JobId => a.job_id.cmp(&b.job_id),
        SortField::User => a.user.cmp(&b.user),
        SortField::Project => a.project.cmp(&b.project),
        SortField::Cluster => a.cluster.cmp(&b.cluster),
        SortField::SubCluster => a.sub_cluster.cmp(&b.sub_cluster),
        SortField::Partition => a.partition.cmp(&b.partition),
        SortField::StartTime => a.start_time.cmp(&b.start_time),
        SortField::Duration => a.duration.cmp(&b.duration),
        SortField::NumNodes => a.num_nodes.cmp(&b.num_nodes),
        SortField::NumHwThreads => a.num_hwthreads.cmp(&b.num_hwthreads),
        SortField::NumAccelerators => a.num_accelerators.cmp(&b.num_accelerators),
        SortField::State => a.state.as_str().cmp(b.state.as_str()),
        SortField::FlopsAnyAvg => compare_averages(a.flops_any_avg, b.flops_any_avg),
        SortField::MemBwAvg => compare_averages(a.mem_bw_avg, b.mem_bw_avg),
        SortField::LoadAvg => compare_averages(a.load_avg, b.load_avg),
        SortField::MemUsedMax => compare_averages(a.mem_used_max, b.mem_used_max),
    };
    let primary = match order.direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

/// Unrecorded averages sort before every recorded value
fn compare_averages(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

/// One stored metric scalar, as kept in an archive's metrics file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub job_id: i64,
    pub metric: String,
    pub value: f64,
}

/// Metric loader over explicitly inserted scalars.
///
/// With record fallback enabled, metrics without an explicit value are read
/// from the averages stored on the job record (`flops_any`, `mem_bw`,
/// `cpu_load`, `mem_used`).
#[derive(Debug, Clone, Default)]
pub struct MemoryMetricLoader {
    values: Arc<DashMap<(i64, String), f64>>,
    record_fallback: bool,
}

impl MemoryMetricLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record_fallback(mut self) -> Self {
        self.record_fallback = true;
        self
    }

    pub fn from_samples(samples: impl IntoIterator<Item = MetricSample>) -> Self {
        let loader = Self::new();
        for sample in samples {
            loader.insert(sample.job_id, sample.metric, sample.value);
        }
        loader
    }

    pub fn insert(&self, job_id: i64, metric: impl Into<String>, value: f64) {
        self.values.insert((job_id, metric.into()), value);
    }

    /// Number of stored scalars
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn record_value(job: &JobRecord, metric: &str) -> Option<f64> {
        let value = match metric {
            "flops_any" => job.flops_any_avg,
            "mem_bw" => job.mem_bw_avg,
            "cpu_load" => job.load_avg,
            "mem_used" => job.mem_used_max,
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }
}

#[async_trait]
impl MetricLoader for MemoryMetricLoader {
    async fn load_scalar(
        &self,
        job: &JobRecord,
        metric: &str,
    ) -> jobarch_core::Result<Option<f64>> {
        if let Some(value) = self.values.get(&(job.id, metric.to_string())) {
            return Ok(Some(*value));
        }
        if self.record_fallback {
            return Ok(Self::record_value(job, metric));
        }
        Ok(None)
    }
}
