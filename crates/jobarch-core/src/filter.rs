//! Filter, page, and order requests as received from the query interface
//!
//! These are the caller-facing shapes. Enumerated values (job states, sort
//! direction, sort field) are kept as raw strings here so the filter
//! compiler can reject unknown values with a typed error instead of a
//! decoding failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// String constraint. Every set sub-field applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringInput {
    pub eq: Option<String>,
    pub contains: Option<String>,
    pub starts_with: Option<String>,
    pub ends_with: Option<String>,
}

impl StringInput {
    pub fn eq(value: impl Into<String>) -> Self {
        Self {
            eq: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn starts_with(value: impl Into<String>) -> Self {
        Self {
            starts_with: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self {
            contains: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn ends_with(value: impl Into<String>) -> Self {
        Self {
            ends_with: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.eq.is_none()
            && self.contains.is_none()
            && self.starts_with.is_none()
            && self.ends_with.is_none()
    }
}

/// Inclusive integer range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub from: i64,
    pub to: i64,
}

impl IntRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }
}

/// Inclusive float range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub from: f64,
    pub to: f64,
}

impl FloatRange {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }
}

/// Time range; either bound may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One entry of a filter list. All set fields are AND-combined, and so are
/// all entries of the list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobFilter {
    /// Tag names; a job matches if it carries any of them
    pub tags: Option<Vec<String>>,
    pub job_id: Option<StringInput>,
    pub array_job_id: Option<i64>,
    pub user: Option<StringInput>,
    pub project: Option<StringInput>,
    pub cluster: Option<StringInput>,
    pub partition: Option<StringInput>,
    pub duration: Option<IntRange>,
    /// Running jobs must have been running for at least this many seconds
    pub min_running_for: Option<i64>,
    pub num_nodes: Option<IntRange>,
    #[serde(rename = "numAccelerators")]
    pub num_accelerators: Option<IntRange>,
    #[serde(rename = "numHWThreads")]
    pub num_hwthreads: Option<IntRange>,
    pub start_time: Option<TimeRange>,
    /// Job state names; validated by the compiler
    pub state: Option<Vec<String>>,
    pub flops_any_avg: Option<FloatRange>,
    pub mem_bw_avg: Option<FloatRange>,
    pub load_avg: Option<FloatRange>,
    pub mem_used_max: Option<FloatRange>,
}

impl JobFilter {
    pub fn cluster(value: impl Into<String>) -> Self {
        Self {
            cluster: Some(StringInput::eq(value)),
            ..Self::default()
        }
    }

    pub fn user(value: impl Into<String>) -> Self {
        Self {
            user: Some(StringInput::eq(value)),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, from: i64, to: i64) -> Self {
        self.duration = Some(IntRange::new(from, to));
        self
    }

    pub fn with_num_nodes(mut self, from: i64, to: i64) -> Self {
        self.num_nodes = Some(IntRange::new(from, to));
        self
    }

    pub fn with_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state = Some(states.into_iter().map(Into::into).collect());
        self
    }

    /// The cluster name if this entry pins one by equality
    pub fn pinned_cluster(&self) -> Option<&str> {
        self.cluster.as_ref().and_then(|input| input.eq.as_deref())
    }
}

/// Page request; both fields are 1-based counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub items_per_page: i64,
    pub page: i64,
}

impl PageRequest {
    pub fn new(items_per_page: i64, page: i64) -> Self {
        Self {
            items_per_page,
            page,
        }
    }
}

/// Sort request; validated against the sort-field allow-list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,

    /// `ASC` or `DESC`
    pub order: String,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, order: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: order.into(),
        }
    }
}
