//! Static archive registry

use async_trait::async_trait;
use jobarch_core::{ArchiveRegistry, Cluster};
use std::collections::BTreeMap;

/// Registry over a fixed set of clusters
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    clusters: BTreeMap<String, Cluster>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_clusters(clusters: impl IntoIterator<Item = Cluster>) -> Self {
        Self {
            clusters: clusters
                .into_iter()
                .map(|cluster| (cluster.name.clone(), cluster))
                .collect(),
        }
    }

    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.clusters.insert(cluster.name.clone(), cluster);
        self
    }
}

#[async_trait]
impl ArchiveRegistry for StaticRegistry {
    async fn clusters(&self) -> jobarch_core::Result<Vec<Cluster>> {
        Ok(self.clusters.values().cloned().collect())
    }

    async fn cluster(&self, name: &str) -> jobarch_core::Result<Option<Cluster>> {
        Ok(self.clusters.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobarch_core::SubCluster;

    #[tokio::test]
    async fn test_lookups() {
        let gamma = Cluster::new("gamma").with_sub_cluster(SubCluster::new("main", "g[1-4]"));
        let registry = StaticRegistry::from_clusters([Cluster::new("beta"), Cluster::new("alpha")])
            .with_cluster(gamma);

        let names: Vec<_> = registry
            .clusters()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert!(registry.cluster("delta").await.unwrap().is_none());
        assert!(registry.sub_cluster("gamma", "main").await.unwrap().is_some());
        assert!(registry.sub_cluster("gamma", "gpu").await.unwrap().is_none());
    }
}
