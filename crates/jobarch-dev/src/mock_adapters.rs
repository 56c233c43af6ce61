//! Mock collaborators for testing the query engine
//!
//! Both mocks wrap the in-memory reference collaborators and add latency,
//! random or forced failures, and call counters.

use async_trait::async_trait;
use jobarch_core::{JobRecord, JobStore, MetricLoader, OrderClause, Predicate, Tag, Window};
use jobarch_query::{MemoryJobStore, MemoryMetricLoader};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Behaviour shared by the mocks
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Delay added to every call
    pub latency: Duration,

    /// Probability of a call failing (0.0 to 1.0)
    pub failure_rate: f64,

    /// Seed for the failure RNG
    pub seed: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            failure_rate: 0.0,
            seed: 0,
        }
    }
}

impl MockConfig {
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }
}

#[derive(Debug)]
struct Injector {
    config: MockConfig,
    rng: Mutex<StdRng>,
    forced: AtomicBool,
}

impl Injector {
    fn new(config: MockConfig) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            config,
            forced: AtomicBool::new(false),
        }
    }

    /// Apply latency, then decide whether this call fails
    async fn before_call(&self, op: &str) -> jobarch_core::Result<()> {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        let fail = self.forced.load(Ordering::SeqCst)
            || (self.config.failure_rate > 0.0
                && self.rng.lock().await.gen_bool(self.config.failure_rate));
        if fail {
            debug!(op, "Injecting mock failure");
            return Err(jobarch_core::Error::unavailable(format!("mock {} failed", op)));
        }
        Ok(())
    }
}

/// Per-operation call counts of [`MockJobStore`]
#[derive(Debug, Default)]
pub struct StoreCalls {
    pub list: AtomicU64,
    pub count: AtomicU64,
    pub fetch_by_id: AtomicU64,
    pub tags: AtomicU64,
    pub partitions: AtomicU64,
}

impl StoreCalls {
    pub fn total(&self) -> u64 {
        [
            &self.list,
            &self.count,
            &self.fetch_by_id,
            &self.tags,
            &self.partitions,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }
}

/// Job store with injected latency and failures
#[derive(Debug, Clone)]
pub struct MockJobStore {
    inner: MemoryJobStore,
    injector: Arc<Injector>,
    calls: Arc<StoreCalls>,
}

impl MockJobStore {
    pub fn new(inner: MemoryJobStore, config: MockConfig) -> Self {
        Self {
            inner,
            injector: Arc::new(Injector::new(config)),
            calls: Arc::new(StoreCalls::default()),
        }
    }

    /// A store whose every call fails
    pub fn failing(inner: MemoryJobStore) -> Self {
        let store = Self::new(inner, MockConfig::default());
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.injector.forced.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> &StoreCalls {
        &self.calls
    }

    pub fn inner(&self) -> &MemoryJobStore {
        &self.inner
    }
}

#[async_trait]
impl JobStore for MockJobStore {
    async fn list(
        &self,
        predicate: &Predicate,
        window: Option<Window>,
        order: Option<&OrderClause>,
    ) -> jobarch_core::Result<Vec<JobRecord>> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.injector.before_call("list").await?;
        self.inner.list(predicate, window, order).await
    }

    async fn count(&self, predicate: &Predicate) -> jobarch_core::Result<u64> {
        self.calls.count.fetch_add(1, Ordering::SeqCst);
        self.injector.before_call("count").await?;
        self.inner.count(predicate).await
    }

    async fn fetch_by_id(&self, id: i64) -> jobarch_core::Result<Option<JobRecord>> {
        self.calls.fetch_by_id.fetch_add(1, Ordering::SeqCst);
        self.injector.before_call("fetch_by_id").await?;
        self.inner.fetch_by_id(id).await
    }

    async fn tags(&self) -> jobarch_core::Result<Vec<Tag>> {
        self.calls.tags.fetch_add(1, Ordering::SeqCst);
        self.injector.before_call("tags").await?;
        self.inner.tags().await
    }

    async fn partitions(&self, cluster: &str) -> jobarch_core::Result<Vec<String>> {
        self.calls.partitions.fetch_add(1, Ordering::SeqCst);
        self.injector.before_call("partitions").await?;
        self.inner.partitions(cluster).await
    }
}

/// Metric loader that tracks how many loads run at once
#[derive(Debug, Clone)]
pub struct MockMetricLoader {
    inner: MemoryMetricLoader,
    injector: Arc<Injector>,
    calls: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockMetricLoader {
    pub fn new(inner: MemoryMetricLoader, config: MockConfig) -> Self {
        Self {
            inner,
            injector: Arc::new(Injector::new(config)),
            calls: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.injector.forced.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `load_scalar` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricLoader for MockMetricLoader {
    async fn load_scalar(
        &self,
        job: &JobRecord,
        metric: &str,
    ) -> jobarch_core::Result<Option<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = match self.injector.before_call("load_scalar").await {
            Ok(()) => self.inner.load_scalar(job, metric).await,
            Err(err) => Err(err),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
