//! Test archive harness
//!
//! Wires a synthetic (or hand-written) archive into a [`QueryEngine`] through
//! the mock collaborators, so tests can inspect both results and calls.

use crate::generator::{ArchiveGenerator, GeneratorConfig, SyntheticArchive};
use crate::mock_adapters::{MockConfig, MockJobStore, MockMetricLoader};
use crate::Result;
use chrono::{DateTime, Utc};
use jobarch_core::{Cluster, JobRecord};
use jobarch_query::{EngineConfig, MetricSample, QueryEngine};
use std::sync::Arc;
use tracing::info;

/// A query engine over a known archive
pub struct TestArchive {
    archive: SyntheticArchive,
    store: MockJobStore,
    metrics: MockMetricLoader,
    engine: QueryEngine,
    now: DateTime<Utc>,
}

impl TestArchive {
    pub fn builder() -> TestArchiveBuilder {
        TestArchiveBuilder::default()
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn archive(&self) -> &SyntheticArchive {
        &self.archive
    }

    pub fn jobs(&self) -> &[JobRecord] {
        &self.archive.jobs
    }

    pub fn store(&self) -> &MockJobStore {
        &self.store
    }

    pub fn metrics(&self) -> &MockMetricLoader {
        &self.metrics
    }

    /// Reference time matching the archive's epoch
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.archive.clusters.iter().map(|c| c.name.clone()).collect()
    }
}

/// Builder for [`TestArchive`]
#[derive(Debug, Clone, Default)]
pub struct TestArchiveBuilder {
    generator: Option<GeneratorConfig>,
    clusters: Vec<Cluster>,
    jobs: Vec<JobRecord>,
    samples: Vec<MetricSample>,
    engine: Option<EngineConfig>,
    store_mock: MockConfig,
    metrics_mock: MockConfig,
    now: Option<DateTime<Utc>>,
}

impl TestArchiveBuilder {
    /// Start from a generated archive
    pub fn generated(mut self, config: GeneratorConfig) -> Self {
        self.generator = Some(config);
        self
    }

    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.clusters.push(cluster);
        self
    }

    pub fn with_job(mut self, job: JobRecord) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn with_jobs(mut self, jobs: impl IntoIterator<Item = JobRecord>) -> Self {
        self.jobs.extend(jobs);
        self
    }

    pub fn with_metric(mut self, job_id: i64, metric: impl Into<String>, value: f64) -> Self {
        self.samples.push(MetricSample {
            job_id,
            metric: metric.into(),
            value,
        });
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = Some(config);
        self
    }

    pub fn with_store_mock(mut self, config: MockConfig) -> Self {
        self.store_mock = config;
        self
    }

    pub fn with_metrics_mock(mut self, config: MockConfig) -> Self {
        self.metrics_mock = config;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn build(self) -> Result<TestArchive> {
        let mut archive = match &self.generator {
            Some(config) => ArchiveGenerator::new(config.clone())?.generate(),
            None => SyntheticArchive::default(),
        };
        let now = self
            .now
            .or_else(|| self.generator.as_ref().map(|config| config.epoch))
            .unwrap_or_else(Utc::now);

        archive.clusters.extend(self.clusters);
        archive.jobs.extend(self.jobs);
        archive.metrics.extend(self.samples);

        let store = MockJobStore::new(archive.job_store(), self.store_mock);
        let metrics = MockMetricLoader::new(archive.metric_loader(), self.metrics_mock);
        let engine = QueryEngine::with_config(
            Arc::new(store.clone()),
            Arc::new(metrics.clone()),
            Arc::new(archive.registry()),
            self.engine.unwrap_or_else(crate::create_test_engine_config),
        );

        info!(
            jobs = archive.jobs.len(),
            clusters = archive.clusters.len(),
            "Test archive ready"
        );
        Ok(TestArchive {
            archive,
            store,
            metrics,
            engine,
            now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::admin_context;
    use jobarch_core::JobFilter;
    use jobarch_query::{ErrorKind, HeatmapSpec};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_generated_archive_engine() {
        let harness = TestArchive::builder()
            .generated(GeneratorConfig::default().with_job_count(120))
            .build()
            .unwrap();
        let ctx = admin_context(harness.now());

        let page = harness.engine().jobs(&ctx, &[], None, None).await.unwrap();
        assert_eq!(page.count, 120);
        assert_eq!(harness.store().calls().list.load(Ordering::SeqCst), 1);
        assert_eq!(harness.store().calls().count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hand_written_archive() {
        let harness = TestArchive::builder()
            .with_cluster(Cluster::new("alpha"))
            .with_job(JobRecord::new(1, "a", "p", "alpha", Utc::now()).with_duration(3600))
            .with_metric(1, "flops_any", 10.0)
            .build()
            .unwrap();
        let ctx = admin_context(harness.now());

        let names = vec!["flops_any".to_string()];
        let footprints = harness
            .engine()
            .jobs_footprints(&ctx, &[JobFilter::cluster("alpha")], &names)
            .await
            .unwrap();
        assert_eq!(footprints.metrics[0].data, vec![Some(10.0)]);
        assert_eq!(harness.metrics().calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_store_surfaces_collaborator_failure() {
        let harness = TestArchive::builder()
            .generated(GeneratorConfig::default().with_job_count(10))
            .build()
            .unwrap();
        harness.store().set_failing(true);

        let err = harness
            .engine()
            .jobs(&admin_context(harness.now()), &[], None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorFailure);
    }

    #[tokio::test]
    async fn test_slow_store_hits_deadline() {
        let harness = TestArchive::builder()
            .generated(GeneratorConfig::default().with_job_count(10))
            .with_store_mock(MockConfig::default().with_latency(Duration::from_millis(200)))
            .build()
            .unwrap();
        let ctx = admin_context(harness.now()).with_timeout(Duration::from_millis(20));

        let err = harness.engine().jobs(&ctx, &[], None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_metric_loads_respect_concurrency_limit() {
        let mut config = crate::create_test_engine_config();
        config.analysis.load_concurrency = 3;
        let harness = TestArchive::builder()
            .generated(GeneratorConfig::default().with_job_count(40))
            .with_engine_config(config)
            .with_metrics_mock(MockConfig::default().with_latency(Duration::from_millis(2)))
            .build()
            .unwrap();
        let ctx = admin_context(harness.now());

        let names = vec!["flops_any".to_string()];
        let footprints = harness
            .engine()
            .jobs_footprints(&ctx, &[], &names)
            .await
            .unwrap();
        assert_eq!(footprints.len(), 40);
        assert!(harness.metrics().max_in_flight() <= 3);
    }

    #[tokio::test]
    async fn test_cancel_during_footprint_loads() {
        let mut config = crate::create_test_engine_config();
        config.analysis.load_concurrency = 4;
        let harness = TestArchive::builder()
            .generated(GeneratorConfig::default().with_job_count(40))
            .with_engine_config(config)
            .with_metrics_mock(MockConfig::default().with_latency(Duration::from_millis(20)))
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        let ctx = admin_context(harness.now()).with_cancellation(cancel.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        });

        let names = vec!["flops_any".to_string()];
        let err = harness
            .engine()
            .jobs_footprints(&ctx, &[], &names)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(harness.metrics().calls() > 0);
        assert!(harness.metrics().calls() < 40);
    }

    #[tokio::test]
    async fn test_failing_metric_loader_fails_heatmap() {
        let harness = TestArchive::builder()
            .generated(GeneratorConfig::default().with_job_count(10))
            .build()
            .unwrap();
        harness.metrics().set_failing(true);

        let spec = HeatmapSpec::new(4, 4, 0.01, 1.0, 1000.0, 100_000.0);
        let err = harness
            .engine()
            .roofline_heatmap(&admin_context(harness.now()), &[], spec)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CollaboratorFailure);
        assert!(harness.metrics().calls() > 0);
    }

    #[tokio::test]
    async fn test_deadline_expires_during_metric_loads() {
        let harness = TestArchive::builder()
            .generated(GeneratorConfig::default().with_job_count(10))
            .with_metrics_mock(MockConfig::default().with_latency(Duration::from_millis(200)))
            .build()
            .unwrap();
        let ctx = admin_context(harness.now()).with_timeout(Duration::from_millis(50));

        let names = vec!["flops_any".to_string(), "mem_bw".to_string()];
        let err = harness
            .engine()
            .jobs_footprints(&ctx, &[], &names)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(harness.store().calls().list.load(Ordering::SeqCst), 1);
        assert!(harness.metrics().calls() > 0);
    }
}
