//! Collaborator traits consumed by the query engine
//!
//! The engine never talks to storage directly. A job store, a metric loader
//! and an archive registry are injected at construction; reference
//! implementations live in `jobarch-query`, mocks in `jobarch-dev`.

use crate::cluster::{Cluster, SubCluster};
use crate::job::{JobRecord, Tag};
use crate::predicate::Predicate;
use crate::types::{OrderClause, Window};
use crate::Result;
use async_trait::async_trait;

/// Gateway to the job archive
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Jobs matching `predicate`. Without a window every match is returned;
    /// without an order the store returns jobs by ascending id.
    async fn list(
        &self,
        predicate: &Predicate,
        window: Option<Window>,
        order: Option<&OrderClause>,
    ) -> Result<Vec<JobRecord>>;

    /// Size of the population matching `predicate`
    async fn count(&self, predicate: &Predicate) -> Result<u64>;

    /// Look up a job by archive id
    async fn fetch_by_id(&self, id: i64) -> Result<Option<JobRecord>>;

    /// Every tag known to the archive
    async fn tags(&self) -> Result<Vec<Tag>>;

    /// Distinct partitions seen on a cluster, sorted
    async fn partitions(&self, cluster: &str) -> Result<Vec<String>>;
}

/// Source of per-job metric summaries
#[async_trait]
pub trait MetricLoader: Send + Sync {
    /// Scalar summary (job-wide average) of `metric` for `job`.
    ///
    /// `Ok(None)` means the metric was not recorded for this job.
    async fn load_scalar(&self, job: &JobRecord, metric: &str) -> Result<Option<f64>>;
}

/// Cluster metadata of the archive
#[async_trait]
pub trait ArchiveRegistry: Send + Sync {
    /// All clusters, sorted by name
    async fn clusters(&self) -> Result<Vec<Cluster>>;

    async fn cluster(&self, name: &str) -> Result<Option<Cluster>> {
        Ok(self
            .clusters()
            .await?
            .into_iter()
            .find(|cluster| cluster.name == name))
    }

    async fn sub_cluster(&self, cluster: &str, sub_cluster: &str) -> Result<Option<SubCluster>> {
        Ok(self
            .cluster(cluster)
            .await?
            .and_then(|c| c.sub_cluster(sub_cluster).cloned()))
    }
}
