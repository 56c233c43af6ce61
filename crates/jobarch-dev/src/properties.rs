//! Property checks over many seeded archives and random requests

use crate::generator::GeneratorConfig;
use crate::harness::TestArchive;
use crate::utils::{admin_context, setup_test_logging, user_context, FilterGenerator};
use jobarch_core::{Aggregate, PageRequest};
use jobarch_query::{HeatmapSpec, QueryError};
use std::collections::HashSet;

const SEEDS: [u64; 6] = [1, 2, 3, 5, 8, 13];

fn archive(seed: u64) -> TestArchive {
    TestArchive::builder()
        .generated(
            GeneratorConfig::default()
                .with_seed(seed)
                .with_job_count(150)
                .with_cluster_count(3),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_empty_filter_counts_whole_archive() {
    setup_test_logging();
    for seed in SEEDS {
        let harness = archive(seed);
        let ctx = admin_context(harness.now());
        let page = harness.engine().jobs(&ctx, &[], None, None).await.unwrap();
        assert_eq!(page.count, harness.jobs().len() as u64, "seed {}", seed);
    }
}

#[tokio::test]
async fn test_pages_partition_the_population() {
    for seed in SEEDS {
        let harness = archive(seed);
        let ctx = admin_context(harness.now());
        let mut requests = FilterGenerator::new(seed, harness.cluster_names(), harness.now());

        for _ in 0..5 {
            let filters = requests.random_filters();
            let order = requests.random_order();
            let size = requests.random_page().items_per_page;

            let mut seen = Vec::new();
            let mut count = None;
            for page_no in 1.. {
                let page = harness
                    .engine()
                    .jobs(&ctx, &filters, Some(&PageRequest::new(size, page_no)), Some(&order))
                    .await
                    .unwrap();
                count = Some(page.count);
                if page.items.is_empty() {
                    break;
                }
                seen.extend(page.items.into_iter().map(|job| job.id));
            }

            let unique: HashSet<_> = seen.iter().copied().collect();
            assert_eq!(unique.len(), seen.len(), "seed {} duplicates", seed);
            assert_eq!(Some(seen.len() as u64), count, "seed {} gaps", seed);
        }
    }
}

#[tokio::test]
async fn test_statistics_invariants_hold() {
    for seed in SEEDS {
        let harness = archive(seed);
        let ctx = admin_context(harness.now());
        let mut requests = FilterGenerator::new(seed + 100, harness.cluster_names(), harness.now());

        for _ in 0..5 {
            let filters = requests.random_filters();
            let count = harness.engine().jobs(&ctx, &filters, None, None).await.unwrap().count;
            let stats = harness.engine().jobs_statistics(&ctx, &filters, None).await.unwrap();
            let stats = &stats[0];

            assert_eq!(stats.total_jobs, count);
            assert!(stats.short_jobs <= stats.total_jobs);
            assert!(stats.total_walltime >= 0 && stats.total_core_hours >= 0);
            assert_eq!(stats.hist_num_nodes.iter().map(|p| p.count).sum::<u64>(), count);
            assert_eq!(stats.hist_walltime.iter().map(|p| p.count).sum::<u64>(), count);

            let grouped = harness
                .engine()
                .jobs_statistics(&ctx, &filters, Some(Aggregate::Project))
                .await
                .unwrap();
            assert_eq!(grouped.iter().map(|s| s.total_jobs).sum::<u64>(), count);
        }
    }
}

#[tokio::test]
async fn test_unweighted_group_counts_sum_to_count() {
    for seed in SEEDS {
        let harness = archive(seed);
        let ctx = admin_context(harness.now());
        let mut requests = FilterGenerator::new(seed + 200, harness.cluster_names(), harness.now());

        for dimension in [Aggregate::User, Aggregate::Project, Aggregate::Cluster] {
            let filters = requests.random_filters();
            let count = harness.engine().jobs(&ctx, &filters, None, None).await.unwrap().count;
            let groups = harness
                .engine()
                .jobs_count(&ctx, &filters, dimension, None, None)
                .await
                .unwrap();
            assert_eq!(groups.iter().map(|g| g.count).sum::<u64>(), count, "seed {}", seed);
        }
    }
}

#[tokio::test]
async fn test_footprints_stay_aligned() {
    for seed in SEEDS {
        let harness = archive(seed);
        let ctx = admin_context(harness.now());
        let mut requests = FilterGenerator::new(seed + 300, harness.cluster_names(), harness.now());

        let names = vec!["flops_any".to_string(), "mem_bw".to_string(), "ipc".to_string()];
        let filters = requests.random_filters();
        let count = harness.engine().jobs(&ctx, &filters, None, None).await.unwrap().count;
        let footprints = harness
            .engine()
            .jobs_footprints(&ctx, &filters, &names)
            .await
            .unwrap();

        assert!(footprints.is_aligned());
        assert_eq!(footprints.len() as u64, count);
        // never recorded
        assert!(footprints.metric("ipc").unwrap().data.iter().all(Option::is_none));
    }
}

#[tokio::test]
async fn test_heatmap_conserves_mass() {
    for seed in SEEDS {
        let harness = archive(seed);
        let ctx = admin_context(harness.now());

        // domain covers every generated point
        let spec = HeatmapSpec::new(8, 8, 0.0, 0.0, 50_000.0, 50_000.0);
        let grid = harness.engine().roofline_heatmap(&ctx, &[], spec).await.unwrap();

        let with_metrics: HashSet<i64> = harness
            .archive()
            .metrics
            .iter()
            .map(|sample| sample.job_id)
            .collect();
        assert_eq!(grid.total(), with_metrics.len() as f64, "seed {}", seed);
    }
}

#[tokio::test]
async fn test_users_only_see_their_jobs() {
    for seed in SEEDS {
        let harness = archive(seed);
        let ctx = user_context("user03", harness.now());

        let page = harness
            .engine()
            .jobs(&ctx, &[], Some(&PageRequest::new(500, 1)), None)
            .await
            .unwrap();
        let own = harness.jobs().iter().filter(|job| job.user == "user03").count();
        assert_eq!(page.count, own as u64);
        assert!(page.items.iter().all(|job| job.user == "user03"));

        if let Some(foreign) = harness.jobs().iter().find(|job| job.user != "user03") {
            let err = harness.engine().job(&ctx, foreign.id).await.unwrap_err();
            assert!(matches!(err, QueryError::AccessDenied(_)));
        }
    }
}
