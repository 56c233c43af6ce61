//! Statistics aggregation over a filtered job population

use crate::config::StatisticsConfig;
use jobarch_core::{Aggregate, HistoPoint, JobRecord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group key of an ungrouped aggregation
pub const ALL_JOBS: &str = "ALL";

/// Totals and histograms for one job population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsStatistics {
    /// Group value, or `ALL`
    pub id: String,

    pub total_jobs: u64,

    /// Jobs shorter than the configured threshold
    pub short_jobs: u64,

    /// Sum of durations in hours, rounded
    pub total_walltime: i64,

    /// Sum of duration times node count in hours, rounded
    pub total_core_hours: i64,

    /// Jobs per walltime bucket, ascending by bucket
    pub hist_walltime: Vec<HistoPoint>,

    /// Jobs per node count, ascending by node count
    pub hist_num_nodes: Vec<HistoPoint>,
}

/// Computes [`JobsStatistics`] from job records
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    config: StatisticsConfig,
}

impl StatisticsAggregator {
    pub fn new(config: StatisticsConfig) -> Self {
        Self { config }
    }

    /// Statistics of the whole population under `id`
    pub fn aggregate<'a, I>(&self, id: impl Into<String>, jobs: I) -> JobsStatistics
    where
        I: IntoIterator<Item = &'a JobRecord>,
    {
        let mut total_jobs = 0u64;
        let mut short_jobs = 0u64;
        let mut walltime_secs = 0i128;
        let mut node_secs = 0i128;
        let mut walltime_hist: BTreeMap<i64, u64> = BTreeMap::new();
        let mut nodes_hist: BTreeMap<i64, u64> = BTreeMap::new();

        for job in jobs {
            total_jobs += 1;
            if job.duration < self.config.short_job_threshold_secs {
                short_jobs += 1;
            }
            walltime_secs += job.duration as i128;
            node_secs += job.duration as i128 * job.num_nodes as i128;

            let bucket = job.duration.div_euclid(self.config.walltime_bucket_secs);
            *walltime_hist.entry(bucket).or_default() += 1;
            *nodes_hist.entry(job.num_nodes as i64).or_default() += 1;
        }

        JobsStatistics {
            id: id.into(),
            total_jobs,
            short_jobs,
            total_walltime: secs_to_hours(walltime_secs),
            total_core_hours: secs_to_hours(node_secs),
            hist_walltime: into_points(walltime_hist),
            hist_num_nodes: into_points(nodes_hist),
        }
    }

    /// One record per distinct value of `dimension`, ordered by that value.
    /// Groups are aggregated in parallel.
    pub fn aggregate_grouped(
        &self,
        jobs: &[JobRecord],
        dimension: Aggregate,
    ) -> Vec<JobsStatistics> {
        let mut groups: BTreeMap<&str, Vec<&JobRecord>> = BTreeMap::new();
        for job in jobs {
            groups.entry(job.group_key(dimension)).or_default().push(job);
        }

        groups
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(key, members)| self.aggregate(key, members))
            .collect()
    }
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new(StatisticsConfig::default())
    }
}

fn secs_to_hours(secs: i128) -> i64 {
    (secs as f64 / 3600.0).round() as i64
}

fn into_points(hist: BTreeMap<i64, u64>) -> Vec<HistoPoint> {
    hist.into_iter()
        .map(|(value, count)| HistoPoint { value, count })
        .collect()
}
