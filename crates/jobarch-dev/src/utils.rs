//! Utility functions for development and testing

use chrono::{DateTime, Duration, Utc};
use jobarch_core::{
    FloatRange, Identity, IntRange, JobFilter, JobState, OrderBy, PageRequest, Role, StringInput,
    TimeRange,
};
use jobarch_query::RequestContext;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SORTABLE: [&str; 8] = [
    "id",
    "startTime",
    "duration",
    "numNodes",
    "user",
    "cluster",
    "flopsAnyAvg",
    "memBwAvg",
];

/// Setup test logging with appropriate levels
pub fn setup_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "jobarch_dev=debug,jobarch_query=debug,jobarch_core=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Request context for an admin at a fixed reference time
pub fn admin_context(now: DateTime<Utc>) -> RequestContext {
    RequestContext::new(Identity::user("admin").with_role(Role::Admin)).at(now)
}

/// Request context for a regular user at a fixed reference time
pub fn user_context(username: &str, now: DateTime<Utc>) -> RequestContext {
    RequestContext::new(Identity::user(username).with_role(Role::User)).at(now)
}

/// Seeded generator of valid filter, page and sort requests
pub struct FilterGenerator {
    rng: StdRng,
    clusters: Vec<String>,
    epoch: DateTime<Utc>,
}

impl FilterGenerator {
    pub fn new(seed: u64, clusters: Vec<String>, epoch: DateTime<Utc>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            clusters,
            epoch,
        }
    }

    /// A filter list of zero to two entries, each setting a few fields
    pub fn random_filters(&mut self) -> Vec<JobFilter> {
        let entries = self.rng.gen_range(0..=2);
        (0..entries).map(|_| self.random_filter()).collect()
    }

    pub fn random_filter(&mut self) -> JobFilter {
        let mut filter = JobFilter::default();

        if self.rng.gen_bool(0.4) {
            if let Some(cluster) = self.clusters.choose(&mut self.rng) {
                filter.cluster = Some(StringInput::eq(cluster.as_str()));
            }
        }
        if self.rng.gen_bool(0.3) {
            let user = format!("user{:02}", self.rng.gen_range(0..12));
            filter.user = Some(match self.rng.gen_range(0..3) {
                0 => StringInput::eq(user),
                1 => StringInput::starts_with(&user[..5]),
                _ => StringInput::contains(&user[4..]),
            });
        }
        if self.rng.gen_bool(0.3) {
            let from = self.rng.gen_range(0..6 * 3600);
            filter.duration = Some(IntRange::new(from, from + self.rng.gen_range(0..12 * 3600)));
        }
        if self.rng.gen_bool(0.2) {
            let from = self.rng.gen_range(1..4);
            filter.num_nodes = Some(IntRange::new(from, from + self.rng.gen_range(0..8)));
        }
        if self.rng.gen_bool(0.2) {
            let states: Vec<String> = JobState::ALL
                .choose_multiple(&mut self.rng, 2)
                .map(|state| state.as_str().to_string())
                .collect();
            filter.state = Some(states);
        }
        if self.rng.gen_bool(0.2) {
            let days = self.rng.gen_range(1..30);
            filter.start_time = Some(TimeRange {
                from: Some(self.epoch - Duration::days(days)),
                to: None,
            });
        }
        if self.rng.gen_bool(0.1) {
            filter.flops_any_avg = Some(FloatRange::new(0.0, self.rng.gen_range(100.0..4000.0)));
        }
        filter
    }

    pub fn random_page(&mut self) -> PageRequest {
        PageRequest::new(self.rng.gen_range(1..40), self.rng.gen_range(1..4))
    }

    pub fn random_order(&mut self) -> OrderBy {
        let field = SORTABLE.choose(&mut self.rng).copied().unwrap_or("id");
        let direction = if self.rng.gen_bool(0.5) { "ASC" } else { "DESC" };
        OrderBy::new(field, direction)
    }
}
