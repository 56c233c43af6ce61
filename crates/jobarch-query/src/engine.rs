//! Query engine façade
//!
//! Every public operation validates its input, applies the access policy and
//! only then talks to collaborators. Each collaborator call runs under the
//! request's cancellation token and deadline; a cancelled request yields
//! [`QueryError::Cancelled`] and never a partial result.

use crate::access;
use crate::compiler::compile_at;
use crate::config::EngineConfig;
use crate::footprints::Footprints;
use crate::grouped::count_grouped;
use crate::heatmap::{HeatmapGrid, HeatmapSpec};
use crate::pagination;
use crate::statistics::{JobsStatistics, StatisticsAggregator, ALL_JOBS};
use crate::{QueryError, Result};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use futures::{stream, StreamExt, TryStreamExt};
use jobarch_core::{
    Aggregate, ArchiveRegistry, Cluster, Condition, Count, Field, Identity, JobFilter, JobRecord,
    JobState, JobStore, MetricLoader, OrderBy, PageRequest, Predicate, Tag, Value, Weight,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Label for hosts that belong to no configured subcluster
const UNKNOWN_SUB_CLUSTER: &str = "unknown";

/// Per-request context supplied by the caller
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Identity of the caller, from the identity provider
    pub identity: Identity,

    /// Cancelling this token aborts the request
    pub cancel: CancellationToken,

    /// Absolute deadline; the engine's configured timeout applies when unset
    pub deadline: Option<Instant>,

    /// Reference time for running-for filters and elapsed node-hours
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            cancel: CancellationToken::new(),
            deadline: None,
            now: Utc::now(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Pin the reference time
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// One page of a job listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPage {
    pub items: Vec<JobRecord>,
    pub offset: usize,
    pub limit: usize,

    /// Size of the whole filtered population
    pub count: u64,
}

/// A metric value of a single job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetricValue {
    pub name: String,
    pub value: Option<f64>,
}

/// Wraps collaborator futures with cancellation and the request deadline
struct CallGuard<'a> {
    cancel: &'a CancellationToken,
    deadline: Instant,
}

impl CallGuard<'_> {
    async fn run<T, F>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = jobarch_core::Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Cancelled("request cancelled".to_string()));
        }

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(op, "Collaborator call cancelled");
                return Err(QueryError::Cancelled("request cancelled".to_string()));
            }
            _ = tokio::time::sleep_until(self.deadline) => {
                debug!(op, "Collaborator call hit the request deadline");
                return Err(QueryError::Cancelled("request deadline exceeded".to_string()));
            }
            result = call => result,
        };

        debug!(
            op,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Collaborator call finished"
        );
        result.map_err(|err| {
            warn!(op, category = err.category(), "Collaborator call failed");
            QueryError::from(err)
        })
    }
}

/// Query and analytics engine over injected collaborators
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn JobStore>,
    metrics: Arc<dyn MetricLoader>,
    registry: Arc<dyn ArchiveRegistry>,
    config: EngineConfig,
    statistics: StatisticsAggregator,
}

impl fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// Create a new query engine
    pub fn new(
        store: Arc<dyn JobStore>,
        metrics: Arc<dyn MetricLoader>,
        registry: Arc<dyn ArchiveRegistry>,
    ) -> Self {
        Self::with_config(store, metrics, registry, EngineConfig::default())
    }

    /// Create a new query engine with configuration
    pub fn with_config(
        store: Arc<dyn JobStore>,
        metrics: Arc<dyn MetricLoader>,
        registry: Arc<dyn ArchiveRegistry>,
        config: EngineConfig,
    ) -> Self {
        info!(
            timeout_ms = config.query.timeout_ms,
            max_jobs_for_analysis = config.analysis.max_jobs,
            "Query engine created"
        );
        Self {
            store,
            metrics,
            registry,
            statistics: StatisticsAggregator::new(config.statistics.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One page of the jobs matching `filters`, plus the population size
    pub async fn jobs(
        &self,
        ctx: &RequestContext,
        filters: &[JobFilter],
        page: Option<&PageRequest>,
        order: Option<&OrderBy>,
    ) -> Result<ResultPage> {
        let predicate = self.plan(ctx, filters)?;
        let resolved = pagination::resolve(page, order)?;
        let guard = self.guard(ctx);

        let items = guard
            .run(
                "list",
                self.store
                    .list(&predicate, Some(resolved.window), Some(&resolved.order)),
            )
            .await?;
        let count = guard.run("count", self.store.count(&predicate)).await?;

        Ok(ResultPage {
            items,
            offset: resolved.window.offset,
            limit: resolved.window.limit,
            count,
        })
    }

    /// A single job, if the caller may see it
    pub async fn job(&self, ctx: &RequestContext, id: i64) -> Result<JobRecord> {
        access::require_identity(&ctx.identity)?;
        let guard = self.guard(ctx);
        self.fetch_authorized(&guard, ctx, id).await
    }

    /// Scalar values of `metrics` for one job; all metrics configured for
    /// the job's cluster when `metrics` is empty
    pub async fn job_metrics(
        &self,
        ctx: &RequestContext,
        id: i64,
        metrics: &[String],
    ) -> Result<Vec<JobMetricValue>> {
        access::require_identity(&ctx.identity)?;
        let guard = self.guard(ctx);
        let job = self.fetch_authorized(&guard, ctx, id).await?;

        let names = if metrics.is_empty() {
            self.require_cluster(&guard, &job.cluster).await?.metric_names()
        } else {
            metrics.to_vec()
        };

        let values = self.load_for_job(&guard, &job, &names).await?;
        Ok(names
            .into_iter()
            .zip(values)
            .map(|(name, value)| JobMetricValue { name, value })
            .collect())
    }

    /// Statistics of the filtered population, optionally one record per group
    pub async fn jobs_statistics(
        &self,
        ctx: &RequestContext,
        filters: &[JobFilter],
        group_by: Option<Aggregate>,
    ) -> Result<Vec<JobsStatistics>> {
        let predicate = self.plan(ctx, filters)?;
        let guard = self.guard(ctx);
        let jobs = guard
            .run("list", self.store.list(&predicate, None, None))
            .await?;

        let stats = match group_by {
            None => vec![self.statistics.aggregate(ALL_JOBS, &jobs)],
            Some(dimension) => self.statistics.aggregate_grouped(&jobs, dimension),
        };
        debug!(population = jobs.len(), groups = stats.len(), "Computed job statistics");
        Ok(stats)
    }

    /// Jobs per group of `dimension`, optionally weighted, top `limit` groups
    pub async fn jobs_count(
        &self,
        ctx: &RequestContext,
        filters: &[JobFilter],
        dimension: Aggregate,
        weight: Option<Weight>,
        limit: Option<usize>,
    ) -> Result<Vec<Count>> {
        let predicate = self.plan(ctx, filters)?;
        let guard = self.guard(ctx);
        let jobs = guard
            .run("list", self.store.list(&predicate, None, None))
            .await?;

        Ok(count_grouped(&jobs, dimension, weight, limit, ctx.now))
    }

    /// Per-job metric scalars and node-hours of the filtered population.
    ///
    /// With no metric names, the metrics of the single cluster pinned by the
    /// filter are used.
    pub async fn jobs_footprints(
        &self,
        ctx: &RequestContext,
        filters: &[JobFilter],
        metrics: &[String],
    ) -> Result<Footprints> {
        let predicate = self.plan(ctx, filters)?;
        let pinned = if metrics.is_empty() {
            Some(pinned_cluster(filters)?)
        } else {
            None
        };
        let guard = self.guard(ctx);

        let names = match pinned {
            Some(cluster) => self.require_cluster(&guard, cluster).await?.metric_names(),
            None => metrics.to_vec(),
        };

        let jobs = self.analysis_population(&guard, &predicate).await?;
        let rows = self.load_rows(&guard, &jobs, &names).await?;

        let mut footprints = Footprints::new(&names);
        let mut missing = 0usize;
        for (job, values) in jobs.iter().zip(rows) {
            missing += values.iter().filter(|v| v.is_none()).count();
            footprints.push(job, values);
        }
        if missing > 0 {
            warn!(missing, jobs = jobs.len(), "Footprint values missing for some jobs");
        }
        Ok(footprints)
    }

    /// Roofline heatmap of the filtered population: x is operational
    /// intensity (flops / memory bandwidth), y the flop rate
    pub async fn roofline_heatmap(
        &self,
        ctx: &RequestContext,
        filters: &[JobFilter],
        spec: HeatmapSpec,
    ) -> Result<HeatmapGrid> {
        let mut grid = HeatmapGrid::new(spec, self.config.analysis.heatmap_scale)?;
        let predicate = self.plan(ctx, filters)?;
        let guard = self.guard(ctx);

        let names = vec![
            self.config.analysis.flops_metric.clone(),
            self.config.analysis.mem_bw_metric.clone(),
        ];
        let jobs = self.analysis_population(&guard, &predicate).await?;
        let rows = self.load_rows(&guard, &jobs, &names).await?;

        let mut skipped = 0usize;
        for values in rows {
            let binned = match (values[0], values[1]) {
                (Some(flops), Some(mem_bw)) if mem_bw != 0.0 => {
                    grid.add(flops / mem_bw, flops, 1.0)
                }
                _ => false,
            };
            if !binned {
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(skipped, jobs = jobs.len(), "Jobs left out of roofline heatmap");
        }
        Ok(grid)
    }

    /// Distinct hosts used by running jobs of `cluster`, per subcluster
    pub async fn allocated_nodes(&self, ctx: &RequestContext, cluster: &str) -> Result<Vec<Count>> {
        access::require_identity(&ctx.identity)?;
        let guard = self.guard(ctx);
        let cluster = self.require_cluster(&guard, cluster).await?;

        let predicate = Predicate::all()
            .and(Condition::Equals {
                field: Field::Cluster,
                value: Value::Text(cluster.name.clone()),
            })
            .and(Condition::StateIn(vec![JobState::Running]));
        let jobs = guard
            .run("list", self.store.list(&predicate, None, None))
            .await?;

        let mut hosts: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        for job in &jobs {
            for resource in &job.resources {
                let sub_cluster = if job.sub_cluster.is_empty() {
                    cluster
                        .sub_cluster_of_host(&resource.hostname)
                        .map(|sc| sc.name.clone())
                        .unwrap_or_else(|| UNKNOWN_SUB_CLUSTER.to_string())
                } else {
                    job.sub_cluster.clone()
                };
                hosts.entry(sub_cluster).or_default().insert(&resource.hostname);
            }
        }

        Ok(hosts
            .into_iter()
            .map(|(name, hosts)| Count::new(name, hosts.len() as u64))
            .collect())
    }

    pub async fn clusters(&self, ctx: &RequestContext) -> Result<Vec<Cluster>> {
        access::require_identity(&ctx.identity)?;
        let guard = self.guard(ctx);
        guard.run("clusters", self.registry.clusters()).await
    }

    pub async fn tags(&self, ctx: &RequestContext) -> Result<Vec<Tag>> {
        access::require_identity(&ctx.identity)?;
        let guard = self.guard(ctx);
        guard.run("tags", self.store.tags()).await
    }

    pub async fn partitions(&self, ctx: &RequestContext, cluster: &str) -> Result<Vec<String>> {
        access::require_identity(&ctx.identity)?;
        let guard = self.guard(ctx);
        guard.run("partitions", self.store.partitions(cluster)).await
    }

    /// Host count of a subcluster, from its node-list expression
    pub async fn number_of_nodes(
        &self,
        ctx: &RequestContext,
        cluster: &str,
        sub_cluster: &str,
    ) -> Result<usize> {
        access::require_identity(&ctx.identity)?;
        let guard = self.guard(ctx);
        let found = guard
            .run("sub_cluster", self.registry.sub_cluster(cluster, sub_cluster))
            .await?
            .ok_or_else(|| {
                QueryError::not_found(format!("subcluster {}/{}", cluster, sub_cluster))
            })?;
        Ok(found.node_list()?.len())
    }

    fn guard<'a>(&self, ctx: &'a RequestContext) -> CallGuard<'a> {
        CallGuard {
            cancel: &ctx.cancel,
            deadline: ctx
                .deadline
                .unwrap_or_else(|| Instant::now() + self.config.query.timeout()),
        }
    }

    /// Compile `filters` and restrict them to what the caller may see
    fn plan(&self, ctx: &RequestContext, filters: &[JobFilter]) -> Result<Predicate> {
        access::require_identity(&ctx.identity)?;
        let predicate = compile_at(filters, ctx.now)?;
        access::scope(&ctx.identity, predicate)
    }

    async fn fetch_authorized(
        &self,
        guard: &CallGuard<'_>,
        ctx: &RequestContext,
        id: i64,
    ) -> Result<JobRecord> {
        let job = guard
            .run("fetch_by_id", self.store.fetch_by_id(id))
            .await?
            .ok_or_else(|| QueryError::not_found(format!("job {}", id)))?;
        access::authorize(&ctx.identity, &job)?;
        Ok(job)
    }

    async fn require_cluster(&self, guard: &CallGuard<'_>, name: &str) -> Result<Cluster> {
        guard
            .run("cluster", self.registry.cluster(name))
            .await?
            .ok_or_else(|| QueryError::not_found(format!("cluster {}", name)))
    }

    /// The unpaginated population, refused above the analysis cap
    async fn analysis_population(
        &self,
        guard: &CallGuard<'_>,
        predicate: &Predicate,
    ) -> Result<Vec<JobRecord>> {
        let limit = self.config.analysis.max_jobs;
        let found = guard.run("count", self.store.count(predicate)).await?;
        if found > limit as u64 {
            return Err(QueryError::TooManyJobs { found, limit });
        }
        guard.run("list", self.store.list(predicate, None, None)).await
    }

    async fn load_for_job(
        &self,
        guard: &CallGuard<'_>,
        job: &JobRecord,
        metrics: &[String],
    ) -> Result<Vec<Option<f64>>> {
        try_join_all(
            metrics
                .iter()
                .map(|metric| guard.run("load_scalar", self.metrics.load_scalar(job, metric))),
        )
        .await
    }

    /// Metric values for every job, in job order
    async fn load_rows(
        &self,
        guard: &CallGuard<'_>,
        jobs: &[JobRecord],
        metrics: &[String],
    ) -> Result<Vec<Vec<Option<f64>>>> {
        stream::iter(jobs.iter().map(|job| self.load_for_job(guard, job, metrics)))
            .buffered(self.config.analysis.load_concurrency)
            .try_collect()
            .await
    }
}

/// The one cluster pinned by equality across all filter entries
fn pinned_cluster(filters: &[JobFilter]) -> Result<&str> {
    let pinned: BTreeSet<&str> = filters.iter().filter_map(JobFilter::pinned_cluster).collect();
    let mut iter = pinned.into_iter();
    match (iter.next(), iter.next()) {
        (Some(cluster), None) => Ok(cluster),
        _ => Err(QueryError::invalid_filter(
            "metric names are required unless the filter selects exactly one cluster",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeatmapScale;
    use crate::registry::StaticRegistry;
    use crate::store::{MemoryJobStore, MemoryMetricLoader};
    use crate::ErrorKind;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use jobarch_core::{MetricConfig, Role, SubCluster};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn job(id: i64, user: &str, cluster: &str, duration: i64, nodes: i32) -> JobRecord {
        JobRecord::new(id, user, "proj", cluster, t0() + chrono::Duration::minutes(id))
            .with_duration(duration)
            .with_nodes(nodes)
    }

    fn admin() -> RequestContext {
        RequestContext::new(Identity::user("root").with_role(Role::Admin)).at(t0())
    }

    fn registry() -> StaticRegistry {
        StaticRegistry::new().with_cluster(
            Cluster::new("alpha")
                .with_metric(MetricConfig::new("flops_any", "GF/s"))
                .with_metric(MetricConfig::new("mem_bw", "GB/s"))
                .with_sub_cluster(SubCluster::new("main", "a[01-16]"))
                .with_sub_cluster(SubCluster::new("gpu", "g[1-4]")),
        )
    }

    fn engine_with(store: MemoryJobStore, metrics: MemoryMetricLoader) -> QueryEngine {
        QueryEngine::new(Arc::new(store), Arc::new(metrics), Arc::new(registry()))
    }

    fn population() -> MemoryJobStore {
        let mut jobs = Vec::new();
        for id in 1..=5 {
            jobs.push(job(id, "alice", "alpha", 3600 + id * 100, 1));
        }
        for id in 6..=12 {
            jobs.push(job(id, "bob", "alpha", 60 * id, 2));
        }
        for id in 13..=20 {
            jobs.push(job(id, "carol", "beta", 7200 + id, 4));
        }
        MemoryJobStore::from_jobs(jobs)
    }

    #[tokio::test]
    async fn test_empty_filter_count_equals_store_size() {
        let store = population();
        let engine = engine_with(store.clone(), MemoryMetricLoader::new());

        let page = engine.jobs(&admin(), &[], None, None).await.unwrap();
        assert_eq!(page.count, store.len() as u64);
        assert_eq!(page.limit, crate::DEFAULT_ITEMS_PER_PAGE);
    }

    #[tokio::test]
    async fn test_cluster_duration_page_scenario() {
        let engine = engine_with(population(), MemoryMetricLoader::new());
        let filters = vec![JobFilter::cluster("alpha").with_duration(3600, 7200)];

        let page = engine
            .jobs(&admin(), &filters, Some(&PageRequest::new(2, 1)), None)
            .await
            .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.count, 5);
        assert_eq!(page.offset, 0);
        assert_eq!(page.items[0].id, 1);
    }

    #[tokio::test]
    async fn test_pages_have_no_gaps_or_duplicates() {
        let engine = engine_with(population(), MemoryMetricLoader::new());
        let order = OrderBy::new("duration", "DESC");

        let mut seen = Vec::new();
        let mut page_no = 1;
        loop {
            let page = engine
                .jobs(&admin(), &[], Some(&PageRequest::new(3, page_no)), Some(&order))
                .await
                .unwrap();
            if page.items.is_empty() {
                assert_eq!(seen.len() as u64, page.count);
                break;
            }
            seen.extend(page.items.iter().map(|j| j.id));
            page_no += 1;
        }

        let mut unique = seen.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seen.len());
        assert_eq!(unique, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_injection_sort_field_makes_no_collaborator_call() {
        let store = population();
        let engine = engine_with(store.clone(), MemoryMetricLoader::new());

        let err = engine
            .jobs(&admin(), &[], None, Some(&OrderBy::new("; DROP TABLE jobs", "ASC")))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidSortField);
        assert_eq!(store.stats().total_calls(), 0);
    }

    #[tokio::test]
    async fn test_regular_user_sees_only_own_jobs() {
        let engine = engine_with(population(), MemoryMetricLoader::new());
        let ctx = RequestContext::new(Identity::user("bob").with_role(Role::User)).at(t0());

        let page = engine.jobs(&ctx, &[], None, None).await.unwrap();
        assert_eq!(page.count, 7);
        assert!(page.items.iter().all(|j| j.user == "bob"));

        assert!(engine.job(&ctx, 6).await.is_ok());
        let err = engine.job(&ctx, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        let err = engine.job(&ctx, 999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_anonymous_is_denied_before_store_calls() {
        let store = population();
        let engine = engine_with(store.clone(), MemoryMetricLoader::new());
        let anon = RequestContext::new(Identity::anonymous());

        assert_eq!(
            engine.jobs(&anon, &[], None, None).await.unwrap_err().kind(),
            ErrorKind::AccessDenied
        );
        assert_eq!(engine.job(&anon, 1).await.unwrap_err().kind(), ErrorKind::AccessDenied);
        assert_eq!(engine.tags(&anon).await.unwrap_err().kind(), ErrorKind::AccessDenied);
        assert_eq!(store.stats().total_calls(), 0);
    }

    #[tokio::test]
    async fn test_statistics_invariants() {
        let engine = engine_with(population(), MemoryMetricLoader::new());

        let all = engine.jobs_statistics(&admin(), &[], None).await.unwrap();
        assert_eq!(all.len(), 1);
        let stats = &all[0];
        assert_eq!(stats.id, "ALL");
        assert_eq!(stats.total_jobs, 20);
        assert!(stats.short_jobs <= stats.total_jobs);
        assert_eq!(stats.short_jobs, 0);
        assert_eq!(stats.hist_num_nodes.iter().map(|p| p.count).sum::<u64>(), 20);
        assert_eq!(stats.hist_walltime.iter().map(|p| p.count).sum::<u64>(), 20);

        let grouped = engine
            .jobs_statistics(&admin(), &[], Some(Aggregate::Cluster))
            .await
            .unwrap();
        let ids: Vec<_> = grouped.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(grouped.iter().map(|s| s.total_jobs).sum::<u64>(), 20);
    }

    #[tokio::test]
    async fn test_weighted_user_count_scenario() {
        let store = MemoryJobStore::from_jobs([
            job(1, "a", "alpha", 10, 4),
            job(2, "a", "alpha", 10, 2),
            job(3, "b", "alpha", 10, 8),
        ]);
        let engine = engine_with(store, MemoryMetricLoader::new());

        let mut counts = engine
            .jobs_count(&admin(), &[], Aggregate::User, Some(Weight::NodeCount), None)
            .await
            .unwrap();
        counts.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(counts, vec![Count::new("a", 6), Count::new("b", 8)]);
    }

    #[tokio::test]
    async fn test_unweighted_count_sum_equals_population() {
        let engine = engine_with(population(), MemoryMetricLoader::new());
        let filters = vec![JobFilter::cluster("alpha")];

        let counts = engine
            .jobs_count(&admin(), &filters, Aggregate::User, None, None)
            .await
            .unwrap();
        let page = engine.jobs(&admin(), &filters, None, None).await.unwrap();
        assert_eq!(counts.iter().map(|c| c.count).sum::<u64>(), page.count);
    }

    #[tokio::test]
    async fn test_footprints_alignment_and_cluster_default() {
        let store = population();
        let metrics = MemoryMetricLoader::new();
        metrics.insert(1, "flops_any", 100.0);
        metrics.insert(2, "mem_bw", 20.0);
        let engine = engine_with(store, metrics);

        let footprints = engine
            .jobs_footprints(&admin(), &[JobFilter::cluster("alpha")], &[])
            .await
            .unwrap();

        assert_eq!(footprints.len(), 12);
        assert!(footprints.is_aligned());
        assert_eq!(footprints.metrics.len(), 2);
        assert_eq!(footprints.metric("flops_any").unwrap().data[0], Some(100.0));
        assert_eq!(footprints.metric("mem_bw").unwrap().data[0], None);
        assert_eq!(footprints.metric("mem_bw").unwrap().data[1], Some(20.0));
    }

    #[tokio::test]
    async fn test_footprints_need_metrics_or_pinned_cluster() {
        let store = population();
        let engine = engine_with(store.clone(), MemoryMetricLoader::new());

        let err = engine.jobs_footprints(&admin(), &[], &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);
        assert_eq!(store.stats().total_calls(), 0);

        let names = vec!["cpu_load".to_string()];
        let footprints = engine.jobs_footprints(&admin(), &[], &names).await.unwrap();
        assert_eq!(footprints.len(), 20);
        assert!(footprints.is_aligned());
    }

    #[tokio::test]
    async fn test_analysis_cap() {
        let store = population();
        let engine = QueryEngine::with_config(
            Arc::new(store),
            Arc::new(MemoryMetricLoader::new()),
            Arc::new(registry()),
            EngineConfig::default().with_max_jobs_for_analysis(10),
        );

        let names = vec!["flops_any".to_string()];
        let err = engine.jobs_footprints(&admin(), &[], &names).await.unwrap_err();
        assert!(matches!(err, QueryError::TooManyJobs { found: 20, limit: 10 }));
    }

    #[tokio::test]
    async fn test_heatmap_single_job_scenario() {
        let store = MemoryJobStore::from_jobs([job(1, "a", "alpha", 10, 1)]);
        let metrics = MemoryMetricLoader::new();
        metrics.insert(1, "flops_any", 9.0);
        metrics.insert(1, "mem_bw", 1.0);
        let engine = engine_with(store, metrics);

        let grid = engine
            .roofline_heatmap(&admin(), &[], HeatmapSpec::new(2, 2, 0.0, 0.0, 10.0, 10.0))
            .await
            .unwrap();
        assert_eq!(grid.tiles, vec![vec![0.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_heatmap_mass_and_max_edge() {
        let store = MemoryJobStore::from_jobs((1..=4).map(|id| job(id, "a", "alpha", 10, 1)));
        let metrics = MemoryMetricLoader::new();
        // (x, y): (10, 10) at the max edge, (5, 5), out of domain (20, 20), no bandwidth
        for (id, flops, bw) in [(1, 10.0, 1.0), (2, 5.0, 1.0), (3, 20.0, 1.0), (4, 5.0, 0.0)] {
            metrics.insert(id, "flops_any", flops);
            metrics.insert(id, "mem_bw", bw);
        }
        let engine = engine_with(store, metrics);

        let grid = engine
            .roofline_heatmap(&admin(), &[], HeatmapSpec::new(4, 4, 0.0, 0.0, 10.0, 10.0))
            .await
            .unwrap();
        assert_eq!(grid.total(), 2.0);
        assert_eq!(grid.get(3, 3), Some(1.0));
        assert_eq!(grid.get(2, 2), Some(1.0));
    }

    #[tokio::test]
    async fn test_heatmap_invalid_range_before_collaborators() {
        let store = population();
        let engine = engine_with(store.clone(), MemoryMetricLoader::new());

        let err = engine
            .roofline_heatmap(&admin(), &[], HeatmapSpec::new(2, 2, 5.0, 0.0, 5.0, 10.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
        assert_eq!(store.stats().total_calls(), 0);
    }

    #[tokio::test]
    async fn test_heatmap_log_scale_from_config() {
        let engine = QueryEngine::with_config(
            Arc::new(population()),
            Arc::new(MemoryMetricLoader::new()),
            Arc::new(registry()),
            EngineConfig::default().with_heatmap_scale(HeatmapScale::Log10),
        );
        let err = engine
            .roofline_heatmap(&admin(), &[], HeatmapSpec::new(2, 2, 0.0, 0.0, 10.0, 10.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }

    #[tokio::test]
    async fn test_job_metrics_defaults_to_cluster_metrics() {
        let metrics = MemoryMetricLoader::new();
        metrics.insert(1, "mem_bw", 42.0);
        let engine = engine_with(population(), metrics);

        let values = engine.job_metrics(&admin(), 1, &[]).await.unwrap();
        assert_eq!(
            values,
            vec![
                JobMetricValue { name: "flops_any".into(), value: None },
                JobMetricValue { name: "mem_bw".into(), value: Some(42.0) },
            ]
        );

        // beta is not registered
        let err = engine.job_metrics(&admin(), 13, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_allocated_nodes() {
        let store = MemoryJobStore::from_jobs([
            job(1, "a", "alpha", 0, 2)
                .with_state(JobState::Running)
                .with_hosts(["a01", "a02"]),
            job(2, "b", "alpha", 0, 2)
                .with_state(JobState::Running)
                .with_hosts(["a02", "g1"]),
            job(3, "b", "alpha", 100, 1).with_hosts(["a05"]),
            job(4, "c", "alpha", 0, 1)
                .with_state(JobState::Running)
                .with_sub_cluster("gpu")
                .with_hosts(["g2"]),
        ]);
        let engine = engine_with(store, MemoryMetricLoader::new());

        let counts = engine.allocated_nodes(&admin(), "alpha").await.unwrap();
        assert_eq!(counts, vec![Count::new("gpu", 2), Count::new("main", 2)]);

        let err = engine.allocated_nodes(&admin(), "nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_metadata_lookups() {
        let engine = engine_with(
            MemoryJobStore::from_jobs([job(1, "a", "alpha", 1, 1).with_partition("batch")]),
            MemoryMetricLoader::new(),
        );
        let ctx = RequestContext::new(Identity::user("a")).at(t0());

        assert_eq!(engine.clusters(&ctx).await.unwrap().len(), 1);
        assert_eq!(engine.partitions(&ctx, "alpha").await.unwrap(), vec!["batch"]);
        assert!(engine.tags(&ctx).await.unwrap().is_empty());
        assert_eq!(engine.number_of_nodes(&ctx, "alpha", "main").await.unwrap(), 16);
        assert_eq!(
            engine.number_of_nodes(&ctx, "alpha", "none").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    struct StalledStore;

    #[async_trait]
    impl JobStore for StalledStore {
        async fn list(
            &self,
            _: &Predicate,
            _: Option<jobarch_core::Window>,
            _: Option<&jobarch_core::OrderClause>,
        ) -> jobarch_core::Result<Vec<JobRecord>> {
            std::future::pending().await
        }

        async fn count(&self, _: &Predicate) -> jobarch_core::Result<u64> {
            std::future::pending().await
        }

        async fn fetch_by_id(&self, _: i64) -> jobarch_core::Result<Option<JobRecord>> {
            std::future::pending().await
        }

        async fn tags(&self) -> jobarch_core::Result<Vec<Tag>> {
            Err(jobarch_core::Error::store("tag table missing"))
        }

        async fn partitions(&self, _: &str) -> jobarch_core::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn stalled_engine() -> QueryEngine {
        QueryEngine::new(
            Arc::new(StalledStore),
            Arc::new(MemoryMetricLoader::new()),
            Arc::new(registry()),
        )
    }

    #[tokio::test]
    async fn test_deadline_yields_cancelled() {
        let engine = stalled_engine();
        let ctx = admin().with_timeout(Duration::from_millis(20));

        let err = engine.jobs(&ctx, &[], None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_token_yields_cancelled() {
        let engine = stalled_engine();
        let token = CancellationToken::new();
        let ctx = admin().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let err = engine.job(&ctx, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_collaborator_failure_is_wrapped() {
        let err = stalled_engine().tags(&admin()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorFailure);
        assert!(!err.public_message().contains("tag table"));
    }
}
