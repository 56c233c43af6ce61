//! Backend-neutral predicates over job records
//!
//! A [`Predicate`] is a conjunction of typed [`Condition`]s. Literal values
//! are always carried as [`Value`]s next to the condition, never spliced into
//! query text: a store either evaluates the predicate directly
//! ([`Predicate::matches`]) or renders it with bind placeholders
//! ([`Predicate::to_sql`]).

use crate::job::JobRecord;
use crate::types::JobState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Filterable job fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    JobId,
    ArrayJobId,
    User,
    Project,
    Cluster,
    Partition,
    Duration,
    NumNodes,
    NumAccelerators,
    NumHwThreads,
    StartTime,
    FlopsAnyAvg,
    MemBwAvg,
    LoadAvg,
    MemUsedMax,
}

impl Field {
    /// Qualified column name in the relational archive schema
    pub fn column(&self) -> &'static str {
        match self {
            Field::JobId => "job.job_id",
            Field::ArrayJobId => "job.array_job_id",
            Field::User => "job.user",
            Field::Project => "job.project",
            Field::Cluster => "job.cluster",
            Field::Partition => "job.partition",
            Field::Duration => "job.duration",
            Field::NumNodes => "job.num_nodes",
            Field::NumAccelerators => "job.num_acc",
            Field::NumHwThreads => "job.num_hwthreads",
            Field::StartTime => "job.start_time",
            Field::FlopsAnyAvg => "job.flops_any_avg",
            Field::MemBwAvg => "job.mem_bw_avg",
            Field::LoadAvg => "job.load_avg",
            Field::MemUsedMax => "job.mem_used_max",
        }
    }

    fn read<'a>(&self, job: &'a JobRecord) -> FieldRef<'a> {
        match self {
            Field::JobId => FieldRef::Text(&job.job_id),
            Field::ArrayJobId => match job.array_job_id {
                Some(id) => FieldRef::Int(id),
                None => FieldRef::Null,
            },
            Field::User => FieldRef::Text(&job.user),
            Field::Project => FieldRef::Text(&job.project),
            Field::Cluster => FieldRef::Text(&job.cluster),
            Field::Partition => FieldRef::Text(&job.partition),
            Field::Duration => FieldRef::Int(job.duration),
            Field::NumNodes => FieldRef::Int(job.num_nodes as i64),
            Field::NumAccelerators => FieldRef::Int(job.num_accelerators as i64),
            Field::NumHwThreads => FieldRef::Int(job.num_hwthreads as i64),
            Field::StartTime => FieldRef::Time(job.start_time),
            Field::FlopsAnyAvg => FieldRef::float(job.flops_any_avg),
            Field::MemBwAvg => FieldRef::float(job.mem_bw_avg),
            Field::LoadAvg => FieldRef::float(job.load_avg),
            Field::MemUsedMax => FieldRef::float(job.mem_used_max),
        }
    }
}

/// A bound literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    /// Bound as unix seconds in SQL
    Time(DateTime<Utc>),
    State(JobState),
}

#[derive(Debug, Clone, Copy)]
enum FieldRef<'a> {
    Null,
    Text(&'a str),
    Int(i64),
    Float(f64),
    Time(DateTime<Utc>),
}

impl FieldRef<'_> {
    /// Unrecorded values match no comparison
    fn float(value: Option<f64>) -> Self {
        value.map_or(FieldRef::Null, FieldRef::Float)
    }

    fn compare(&self, value: &Value) -> Option<Ordering> {
        match (self, value) {
            (FieldRef::Text(a), Value::Text(b)) => Some((*a).cmp(b.as_str())),
            (FieldRef::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (FieldRef::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (FieldRef::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (FieldRef::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (FieldRef::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            FieldRef::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One atomic predicate term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Equals { field: Field, value: Value },
    StartsWith { field: Field, value: String },
    EndsWith { field: Field, value: String },
    Contains { field: Field, value: String },
    /// Inclusive on both ends
    Between { field: Field, from: Value, to: Value },
    AtLeast { field: Field, value: Value },
    AtMost { field: Field, value: Value },
    StateIn(Vec<JobState>),
    /// Job carries at least one tag with one of these names
    TaggedAny(Vec<String>),
    /// Finished jobs pass; running jobs pass once they have been running
    /// for at least `min_seconds` at `now`
    RunningFor { min_seconds: i64, now: DateTime<Utc> },
}

impl Condition {
    pub fn matches(&self, job: &JobRecord) -> bool {
        match self {
            Condition::Equals { field, value } => {
                field.read(job).compare(value) == Some(Ordering::Equal)
            }
            Condition::StartsWith { field, value } => field
                .read(job)
                .text()
                .map_or(false, |text| text.starts_with(value.as_str())),
            Condition::EndsWith { field, value } => field
                .read(job)
                .text()
                .map_or(false, |text| text.ends_with(value.as_str())),
            Condition::Contains { field, value } => field
                .read(job)
                .text()
                .map_or(false, |text| text.contains(value.as_str())),
            Condition::Between { field, from, to } => {
                let actual = field.read(job);
                matches!(actual.compare(from), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(actual.compare(to), Some(Ordering::Less | Ordering::Equal))
            }
            Condition::AtLeast { field, value } => matches!(
                field.read(job).compare(value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::AtMost { field, value } => matches!(
                field.read(job).compare(value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::StateIn(states) => states.contains(&job.state),
            Condition::TaggedAny(names) => names.iter().any(|name| job.has_tag_named(name)),
            Condition::RunningFor { min_seconds, now } => {
                !job.is_running() || job.elapsed_seconds(*now) >= *min_seconds
            }
        }
    }

    fn render(&self, params: &mut Vec<Value>) -> String {
        match self {
            Condition::Equals { field, value } => {
                params.push(value.clone());
                format!("{} = ?", field.column())
            }
            Condition::StartsWith { field, value } => {
                params.push(Value::Text(format!("{}%", escape_like(value))));
                format!("{} LIKE ? ESCAPE '\\'", field.column())
            }
            Condition::EndsWith { field, value } => {
                params.push(Value::Text(format!("%{}", escape_like(value))));
                format!("{} LIKE ? ESCAPE '\\'", field.column())
            }
            Condition::Contains { field, value } => {
                params.push(Value::Text(format!("%{}%", escape_like(value))));
                format!("{} LIKE ? ESCAPE '\\'", field.column())
            }
            Condition::Between { field, from, to } => {
                params.push(from.clone());
                params.push(to.clone());
                format!("{} BETWEEN ? AND ?", field.column())
            }
            Condition::AtLeast { field, value } => {
                params.push(value.clone());
                format!("{} >= ?", field.column())
            }
            Condition::AtMost { field, value } => {
                params.push(value.clone());
                format!("{} <= ?", field.column())
            }
            Condition::StateIn(states) => {
                if states.is_empty() {
                    return "1 = 0".to_string();
                }
                params.extend(states.iter().copied().map(Value::State));
                format!("job.job_state IN ({})", placeholders(states.len()))
            }
            Condition::TaggedAny(names) => {
                if names.is_empty() {
                    return "1 = 0".to_string();
                }
                params.extend(names.iter().cloned().map(Value::Text));
                format!(
                    "job.id IN (SELECT jobtag.job_id FROM jobtag JOIN tag ON tag.id = jobtag.tag_id WHERE tag.tag_name IN ({}))",
                    placeholders(names.len())
                )
            }
            Condition::RunningFor { min_seconds, now } => {
                params.push(Value::State(JobState::Running));
                params.push(Value::Time(*now));
                params.push(Value::Int(*min_seconds));
                "(job.job_state != ? OR (? - job.start_time) >= ?)".to_string()
            }
        }
    }
}

/// Parameterized SQL fragment
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    /// Conditions joined by `AND`; empty when the predicate matches everything
    pub clause: String,

    /// Bind values, in placeholder order
    pub params: Vec<Value>,
}

impl SqlFragment {
    /// `WHERE <clause>`, or an empty string
    pub fn where_clause(&self) -> String {
        if self.clause.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clause)
        }
    }
}

/// Conjunction of conditions. The empty predicate matches every job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Predicate matching every job
    pub fn all() -> Self {
        Self::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, job: &JobRecord) -> bool {
        self.conditions.iter().all(|condition| condition.matches(job))
    }

    pub fn to_sql(&self) -> SqlFragment {
        let mut params = Vec::new();
        let clause = self
            .conditions
            .iter()
            .map(|condition| condition.render(&mut params))
            .collect::<Vec<_>>()
            .join(" AND ");

        SqlFragment { clause, params }
    }
}

impl FromIterator<Condition> for Predicate {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Self {
            conditions: iter.into_iter().collect(),
        }
    }
}

/// Escape `LIKE` wildcards so the value only ever matches literally
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Tag;
    use chrono::TimeZone;

    fn job() -> JobRecord {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        JobRecord::new(1, "alice", "proj_x", "alpha", start)
            .with_duration(3600)
            .with_nodes(4)
    }

    #[test]
    fn test_empty_predicate_matches_everything() {
        let predicate = Predicate::all();
        assert!(predicate.matches(&job()));
        assert_eq!(predicate.to_sql().where_clause(), "");
    }

    #[test]
    fn test_string_conditions() {
        let job = job();
        let eq = Condition::Equals { field: Field::User, value: Value::Text("alice".into()) };
        let prefix = Condition::StartsWith { field: Field::Project, value: "proj".into() };
        let suffix = Condition::EndsWith { field: Field::Project, value: "_x".into() };
        let contains = Condition::Contains { field: Field::Cluster, value: "lph".into() };
        let miss = Condition::StartsWith { field: Field::User, value: "bob".into() };

        assert!(eq.matches(&job));
        assert!(prefix.matches(&job));
        assert!(suffix.matches(&job));
        assert!(contains.matches(&job));
        assert!(!miss.matches(&job));
    }

    #[test]
    fn test_range_conditions_are_inclusive() {
        let job = job();
        let exact = Condition::Between {
            field: Field::Duration,
            from: Value::Int(3600),
            to: Value::Int(3600),
        };
        let below = Condition::Between {
            field: Field::NumNodes,
            from: Value::Int(5),
            to: Value::Int(10),
        };
        let at_least = Condition::AtLeast {
            field: Field::StartTime,
            value: Value::Time(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        };

        assert!(exact.matches(&job));
        assert!(!below.matches(&job));
        assert!(at_least.matches(&job));
    }

    #[test]
    fn test_unrecorded_average_never_matches() {
        let cond = Condition::Between {
            field: Field::FlopsAnyAvg,
            from: Value::Float(0.0),
            to: Value::Float(100.0),
        };
        let mut job = job();
        assert!(!cond.matches(&job));
        job.flops_any_avg = Some(50.0);
        assert!(cond.matches(&job));
    }

    #[test]
    fn test_array_job_id_null_never_matches() {
        let cond = Condition::Equals { field: Field::ArrayJobId, value: Value::Int(5) };
        let mut job = job();
        assert!(!cond.matches(&job));
        job.array_job_id = Some(5);
        assert!(cond.matches(&job));
    }

    #[test]
    fn test_tag_and_state_conditions() {
        let tagged = job().with_tag(Tag {
            id: 1,
            tag_type: "issue".into(),
            name: "io-heavy".into(),
        });
        let cond = Condition::TaggedAny(vec!["io-heavy".into(), "other".into()]);
        assert!(cond.matches(&tagged));
        assert!(!cond.matches(&job()));

        let states = Condition::StateIn(vec![JobState::Failed, JobState::Completed]);
        assert!(states.matches(&job()));
        assert!(!states.matches(&job().with_state(JobState::Running)));
    }

    #[test]
    fn test_running_for() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cond = Condition::RunningFor {
            min_seconds: 600,
            now: start + chrono::Duration::seconds(300),
        };
        let running = job().with_state(JobState::Running);

        assert!(!cond.matches(&running));
        assert!(cond.matches(&job()));

        let later = Condition::RunningFor {
            min_seconds: 600,
            now: start + chrono::Duration::seconds(900),
        };
        assert!(later.matches(&running));
    }

    #[test]
    fn test_sql_uses_placeholders_only() {
        let hostile = "x' OR '1'='1";
        let predicate = Predicate::all()
            .and(Condition::Equals { field: Field::User, value: Value::Text(hostile.into()) })
            .and(Condition::Contains { field: Field::Project, value: "50%_off".into() })
            .and(Condition::Between {
                field: Field::Duration,
                from: Value::Int(1),
                to: Value::Int(2),
            })
            .and(Condition::StateIn(vec![JobState::Running, JobState::Failed]));

        let sql = predicate.to_sql();
        assert!(!sql.clause.contains(hostile));
        assert_eq!(
            sql.where_clause(),
            "WHERE job.user = ? AND job.project LIKE ? ESCAPE '\\' AND job.duration BETWEEN ? AND ? AND job.job_state IN (?, ?)"
        );
        assert_eq!(sql.params.len(), 6);
        assert_eq!(sql.params[0], Value::Text(hostile.into()));
        assert_eq!(sql.params[1], Value::Text("%50\\%\\_off%".into()));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\d"), "a\\_b\\%c\\\\d");
        assert_eq!(escape_like("plain"), "plain");
    }
}
