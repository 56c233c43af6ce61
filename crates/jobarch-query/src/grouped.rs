//! Grouped job counts

use chrono::{DateTime, Utc};
use jobarch_core::{Aggregate, Count, JobRecord, Weight};
use std::collections::HashMap;

/// Count jobs per group of `dimension`.
///
/// Without a weight every job counts 1. `NodeCount` counts allocated nodes.
/// `NodeHours` sums node-seconds per group (elapsed time at `now` for
/// running jobs) and rounds the group total to whole hours. The result is
/// ordered by count descending, then group key ascending, and cut to `limit`.
pub fn count_grouped(
    jobs: &[JobRecord],
    dimension: Aggregate,
    weight: Option<Weight>,
    limit: Option<usize>,
    now: DateTime<Utc>,
) -> Vec<Count> {
    let mut totals: HashMap<&str, u64> = HashMap::new();
    for job in jobs {
        let contribution = match weight {
            None => 1,
            Some(Weight::NodeCount) => job.num_nodes.max(0) as u64,
            Some(Weight::NodeHours) => {
                job.num_nodes.max(0) as u64 * job.elapsed_seconds(now).max(0) as u64
            }
        };
        *totals.entry(job.group_key(dimension)).or_default() += contribution;
    }

    let mut counts: Vec<Count> = totals
        .into_iter()
        .map(|(name, total)| {
            let count = match weight {
                Some(Weight::NodeHours) => (total as f64 / 3600.0).round() as u64,
                _ => total,
            };
            Count::new(name, count)
        })
        .collect();

    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    if let Some(limit) = limit {
        counts.truncate(limit);
    }
    counts
}
