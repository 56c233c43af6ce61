//! Core type definitions for jobarch

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a batch job as recorded by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Cancelled,
    Stopped,
    Timeout,
    Preempted,
    OutOfMemory,
}

impl JobState {
    /// All known job states
    pub const ALL: [JobState; 8] = [
        JobState::Running,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
        JobState::Stopped,
        JobState::Timeout,
        JobState::Preempted,
        JobState::OutOfMemory,
    ];

    /// Name as stored in the archive
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Stopped => "stopped",
            JobState::Timeout => "timeout",
            JobState::Preempted => "preempted",
            JobState::OutOfMemory => "out_of_memory",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("Unknown job state: {}", s))
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles an authenticated identity can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access to every job and node-level data
    Admin,
    /// Read access to every job for support staff
    Support,
    /// Project managers
    Manager,
    /// Regular cluster users
    User,
    /// Machine clients of the query interface
    Api,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "support" => Ok(Role::Support),
            "manager" => Ok(Role::Manager),
            "user" => Ok(Role::User),
            "api" => Ok(Role::Api),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Support => write!(f, "support"),
            Role::Manager => write!(f, "manager"),
            Role::User => write!(f, "user"),
            Role::Api => write!(f, "api"),
        }
    }
}

/// The calling identity, as supplied by the identity provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Username; `None` for unauthenticated callers
    pub username: Option<String>,

    /// Roles held by this identity
    pub roles: Vec<Role>,
}

impl Identity {
    /// An authenticated identity with no roles yet
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            roles: Vec::new(),
        }
    }

    /// An unauthenticated caller
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Role) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Admins and support staff may view any job
    pub fn is_privileged(&self) -> bool {
        self.has_role(Role::Admin) || self.has_role(Role::Support)
    }
}

/// Dimension by which grouped counts and statistics are partitioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregate {
    User,
    Project,
    Cluster,
}

impl std::str::FromStr for Aggregate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Aggregate::User),
            "project" => Ok(Aggregate::Project),
            "cluster" => Ok(Aggregate::Cluster),
            _ => Err(format!("Unknown aggregation dimension: {}", s)),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::User => write!(f, "USER"),
            Aggregate::Project => write!(f, "PROJECT"),
            Aggregate::Cluster => write!(f, "CLUSTER"),
        }
    }
}

/// Per-job weight for grouped counts. Without a weight every job counts 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Weight {
    /// Each job contributes its allocated node count
    NodeCount,
    /// Each job contributes its node-hours, rounded per group
    NodeHours,
}

impl std::str::FromStr for Weight {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "node_count" => Ok(Weight::NodeCount),
            "node_hours" => Ok(Weight::NodeHours),
            _ => Err(format!("Unknown weight: {}", s)),
        }
    }
}

/// Fields a result set may be ordered by.
///
/// This is the complete allow-list: caller-supplied sort names are resolved
/// through [`SortField::from_name`] and anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortField {
    Id,
    JobId,
    User,
    Project,
    Cluster,
    SubCluster,
    Partition,
    StartTime,
    Duration,
    NumNodes,
    NumHwThreads,
    NumAccelerators,
    State,
    FlopsAnyAvg,
    MemBwAvg,
    LoadAvg,
    MemUsedMax,
}

impl SortField {
    const NAMES: [(&'static str, &'static str, SortField); 17] = [
        ("id", "id", SortField::Id),
        ("jobId", "job_id", SortField::JobId),
        ("user", "user", SortField::User),
        ("project", "project", SortField::Project),
        ("cluster", "cluster", SortField::Cluster),
        ("subCluster", "sub_cluster", SortField::SubCluster),
        ("partition", "partition", SortField::Partition),
        ("startTime", "start_time", SortField::StartTime),
        ("duration", "duration", SortField::Duration),
        ("numNodes", "num_nodes", SortField::NumNodes),
        ("numHWThreads", "num_hwthreads", SortField::NumHwThreads),
        ("numAcc", "num_acc", SortField::NumAccelerators),
        ("state", "job_state", SortField::State),
        ("flopsAnyAvg", "flops_any_avg", SortField::FlopsAnyAvg),
        ("memBwAvg", "mem_bw_avg", SortField::MemBwAvg),
        ("loadAvg", "load_avg", SortField::LoadAvg),
        ("memUsedMax", "mem_used_max", SortField::MemUsedMax),
    ];

    /// Resolve an interface-level (camelCase) or column-level (snake_case) name
    pub fn from_name(name: &str) -> Option<SortField> {
        Self::NAMES
            .iter()
            .find(|(api, column, _)| *api == name || *column == name)
            .map(|(_, _, field)| *field)
    }

    /// Qualified column name in the relational archive schema
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "job.id",
            SortField::JobId => "job.job_id",
            SortField::User => "job.user",
            SortField::Project => "job.project",
            SortField::Cluster => "job.cluster",
            SortField::SubCluster => "job.subcluster",
            SortField::Partition => "job.partition",
            SortField::StartTime => "job.start_time",
            SortField::Duration => "job.duration",
            SortField::NumNodes => "job.num_nodes",
            SortField::NumHwThreads => "job.num_hwthreads",
            SortField::NumAccelerators => "job.num_acc",
            SortField::State => "job.job_state",
            SortField::FlopsAnyAvg => "job.flops_any_avg",
            SortField::MemBwAvg => "job.mem_bw_avg",
            SortField::LoadAvg => "job.load_avg",
            SortField::MemUsedMax => "job.mem_used_max",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(format!("Unknown sort direction: {}", s)),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Validated ordering handed to the job store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderClause {
    pub field: SortField,
    pub direction: SortDirection,
}

impl OrderClause {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Render as SQL. Only allow-listed column names reach the output;
    /// `job.id` is appended as a tie-breaker so pages are stable.
    pub fn to_sql(&self) -> String {
        if self.field == SortField::Id {
            format!("ORDER BY job.id {}", self.direction)
        } else {
            format!("ORDER BY {} {}, job.id ASC", self.field.column(), self.direction)
        }
    }
}

/// Limit/offset window of a paginated listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub limit: usize,
    pub offset: usize,
}

impl Window {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

/// A group label and its count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Count {
    pub name: String,
    pub count: u64,
}

impl Count {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// One histogram bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoPoint {
    /// Bucket value (node count, walltime hour, ...)
    pub value: i64,

    /// Number of jobs in the bucket
    pub count: u64,
}
