//! Job records as stored in the archive
//!
//! A [`JobRecord`] is owned by the job store. The query engine reads the
//! fields it filters, sorts, and aggregates on and never mutates a record.

use crate::types::{Aggregate, JobState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One host allocated to a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub hostname: String,

    /// Hardware thread ids used on this host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hwthreads: Vec<u32>,

    /// Accelerator ids used on this host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accelerators: Vec<String>,
}

impl Resource {
    pub fn host(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            hwthreads: Vec::new(),
            accelerators: Vec::new(),
        }
    }
}

/// A free-form tag attached to jobs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,

    #[serde(rename = "type")]
    pub tag_type: String,

    pub name: String,
}

/// A historical batch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Archive primary key
    pub id: i64,

    /// Scheduler job id
    pub job_id: String,

    /// Scheduler array job id, if the job is part of an array
    #[serde(default)]
    pub array_job_id: Option<i64>,

    pub user: String,
    pub project: String,
    pub cluster: String,

    #[serde(default)]
    pub sub_cluster: String,

    #[serde(default)]
    pub partition: String,

    pub start_time: DateTime<Utc>,

    /// Walltime in seconds; for running jobs the value recorded so far
    pub duration: i64,

    pub num_nodes: i32,

    #[serde(rename = "numHWThreads", default)]
    pub num_hwthreads: i32,

    #[serde(rename = "numAcc", default)]
    pub num_accelerators: i32,

    pub state: JobState,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(default)]
    pub tags: Vec<Tag>,

    /// Average flop rate (any precision), GF/s; `None` if never recorded
    #[serde(default)]
    pub flops_any_avg: Option<f64>,

    /// Average memory bandwidth, GB/s
    #[serde(default)]
    pub mem_bw_avg: Option<f64>,

    #[serde(default)]
    pub load_avg: Option<f64>,

    /// Peak memory used, GB
    #[serde(default)]
    pub mem_used_max: Option<f64>,
}

impl JobRecord {
    /// Create a completed single-node job with no recorded metrics
    pub fn new(
        id: i64,
        user: impl Into<String>,
        project: impl Into<String>,
        cluster: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_id: id.to_string(),
            array_job_id: None,
            user: user.into(),
            project: project.into(),
            cluster: cluster.into(),
            sub_cluster: String::new(),
            partition: String::new(),
            start_time,
            duration: 0,
            num_nodes: 1,
            num_hwthreads: 0,
            num_accelerators: 0,
            state: JobState::Completed,
            resources: Vec::new(),
            tags: Vec::new(),
            flops_any_avg: None,
            mem_bw_avg: None,
            load_avg: None,
            mem_used_max: None,
        }
    }

    pub fn with_duration(mut self, seconds: i64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_nodes(mut self, num_nodes: i32) -> Self {
        self.num_nodes = num_nodes;
        self
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = state;
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn with_sub_cluster(mut self, sub_cluster: impl Into<String>) -> Self {
        self.sub_cluster = sub_cluster.into();
        self
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = hosts.into_iter().map(Resource::host).collect();
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    /// Seconds the job has been running at `now` (recorded duration for
    /// finished jobs)
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        if self.is_running() {
            (now - self.start_time).num_seconds().max(0)
        } else {
            self.duration
        }
    }

    /// Node-hours: duration in hours times allocated nodes
    pub fn node_hours(&self) -> f64 {
        self.duration as f64 / 3600.0 * self.num_nodes as f64
    }

    /// Value of an aggregation dimension
    pub fn group_key(&self, dimension: Aggregate) -> &str {
        match dimension {
            Aggregate::User => &self.user,
            Aggregate::Project => &self.project,
            Aggregate::Cluster => &self.cluster,
        }
    }

    pub fn has_tag_named(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_job_builder() {
        let job = JobRecord::new(7, "alice", "p1", "alpha", start())
            .with_duration(7200)
            .with_nodes(4)
            .with_hosts(["a01", "a02"]);

        assert_eq!(job.job_id, "7");
        assert_eq!(job.resources.len(), 2);
        assert_eq!(job.group_key(Aggregate::User), "alice");
        assert_eq!(job.group_key(Aggregate::Cluster), "alpha");
        assert!((job.node_hours() - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_elapsed_seconds() {
        let finished = JobRecord::new(1, "a", "p", "c", start()).with_duration(100);
        let running = JobRecord::new(2, "a", "p", "c", start()).with_state(JobState::Running);
        let now = start() + chrono::Duration::seconds(500);

        assert_eq!(finished.elapsed_seconds(now), 100);
        assert_eq!(running.elapsed_seconds(now), 500);
        assert_eq!(running.elapsed_seconds(start() - chrono::Duration::seconds(5)), 0);
    }

    #[test]
    fn test_job_serialization_names() {
        let job = JobRecord::new(3, "bob", "p", "c", start()).with_nodes(2);
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["jobId"], "3");
        assert_eq!(json["numNodes"], 2);
        assert!(json.get("numHWThreads").is_some());
        assert_eq!(json["state"], "completed");

        let back: JobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }
}
