//! Filter compiler
//!
//! Turns a list of [`JobFilter`]s into a single [`Predicate`]. Each set
//! sub-constraint becomes one condition; conditions of all entries are
//! AND-combined. Unset constraints contribute nothing, so an empty list
//! compiles to the predicate that matches every job.

use crate::{QueryError, Result};
use chrono::{DateTime, Utc};
use jobarch_core::{
    Condition, Field, FloatRange, IntRange, JobFilter, JobState, Predicate, StringInput,
    TimeRange, Value,
};
use tracing::debug;

/// Compile against the current time
pub fn compile(filters: &[JobFilter]) -> Result<Predicate> {
    compile_at(filters, Utc::now())
}

/// Compile with `now` as the reference time of running-for constraints
pub fn compile_at(filters: &[JobFilter], now: DateTime<Utc>) -> Result<Predicate> {
    let mut predicate = Predicate::all();
    for filter in filters {
        compile_entry(filter, now, &mut predicate)?;
    }

    debug!(
        entries = filters.len(),
        conditions = predicate.len(),
        "Compiled job filter"
    );
    Ok(predicate)
}

fn compile_entry(filter: &JobFilter, now: DateTime<Utc>, out: &mut Predicate) -> Result<()> {
    if let Some(tags) = filter.tags.as_ref().filter(|tags| !tags.is_empty()) {
        out.push(Condition::TaggedAny(tags.clone()));
    }

    if let Some(input) = &filter.job_id {
        string_conditions(Field::JobId, input, out);
    }
    if let Some(array_job_id) = filter.array_job_id {
        out.push(Condition::Equals {
            field: Field::ArrayJobId,
            value: Value::Int(array_job_id),
        });
    }
    if let Some(input) = &filter.user {
        string_conditions(Field::User, input, out);
    }
    if let Some(input) = &filter.project {
        string_conditions(Field::Project, input, out);
    }
    if let Some(input) = &filter.cluster {
        string_conditions(Field::Cluster, input, out);
    }
    if let Some(input) = &filter.partition {
        string_conditions(Field::Partition, input, out);
    }

    if let Some(range) = &filter.duration {
        out.push(int_range(Field::Duration, range)?);
    }
    if let Some(min_seconds) = filter.min_running_for {
        if min_seconds < 0 {
            return Err(QueryError::invalid_filter(
                "minRunningFor cannot be negative",
            ));
        }
        out.push(Condition::RunningFor { min_seconds, now });
    }
    if let Some(range) = &filter.num_nodes {
        out.push(int_range(Field::NumNodes, range)?);
    }
    if let Some(range) = &filter.num_accelerators {
        out.push(int_range(Field::NumAccelerators, range)?);
    }
    if let Some(range) = &filter.num_hwthreads {
        out.push(int_range(Field::NumHwThreads, range)?);
    }
    if let Some(range) = &filter.start_time {
        if let Some(condition) = time_range(range)? {
            out.push(condition);
        }
    }

    if let Some(states) = filter.state.as_ref().filter(|states| !states.is_empty()) {
        out.push(Condition::StateIn(parse_states(states)?));
    }

    for (field, range) in [
        (Field::FlopsAnyAvg, &filter.flops_any_avg),
        (Field::MemBwAvg, &filter.mem_bw_avg),
        (Field::LoadAvg, &filter.load_avg),
        (Field::MemUsedMax, &filter.mem_used_max),
    ] {
        if let Some(range) = range {
            out.push(float_range(field, range)?);
        }
    }

    Ok(())
}

/// Every set sub-field of a string constraint applies
fn string_conditions(field: Field, input: &StringInput, out: &mut Predicate) {
    if let Some(value) = &input.eq {
        out.push(Condition::Equals {
            field,
            value: Value::Text(value.clone()),
        });
    }
    if let Some(value) = &input.starts_with {
        out.push(Condition::StartsWith {
            field,
            value: value.clone(),
        });
    }
    if let Some(value) = &input.contains {
        out.push(Condition::Contains {
            field,
            value: value.clone(),
        });
    }
    if let Some(value) = &input.ends_with {
        out.push(Condition::EndsWith {
            field,
            value: value.clone(),
        });
    }
}

fn int_range(field: Field, range: &IntRange) -> Result<Condition> {
    if range.from > range.to {
        return Err(QueryError::invalid_filter(format!(
            "range on {} has from > to",
            field.column()
        )));
    }
    Ok(Condition::Between {
        field,
        from: Value::Int(range.from),
        to: Value::Int(range.to),
    })
}

fn float_range(field: Field, range: &FloatRange) -> Result<Condition> {
    if !range.from.is_finite() || !range.to.is_finite() {
        return Err(QueryError::invalid_filter(format!(
            "range on {} has a non-finite bound",
            field.column()
        )));
    }
    if range.from > range.to {
        return Err(QueryError::invalid_filter(format!(
            "range on {} has from > to",
            field.column()
        )));
    }
    Ok(Condition::Between {
        field,
        from: Value::Float(range.from),
        to: Value::Float(range.to),
    })
}

fn time_range(range: &TimeRange) -> Result<Option<Condition>> {
    let field = Field::StartTime;
    let condition = match (range.from, range.to) {
        (Some(from), Some(to)) => {
            if from > to {
                return Err(QueryError::invalid_filter("startTime range has from > to"));
            }
            Some(Condition::Between {
                field,
                from: Value::Time(from),
                to: Value::Time(to),
            })
        }
        (Some(from), None) => Some(Condition::AtLeast {
            field,
            value: Value::Time(from),
        }),
        (None, Some(to)) => Some(Condition::AtMost {
            field,
            value: Value::Time(to),
        }),
        (None, None) => None,
    };
    Ok(condition)
}

fn parse_states(names: &[String]) -> Result<Vec<JobState>> {
    let mut states = Vec::with_capacity(names.len());
    for name in names {
        let state: JobState = name
            .parse()
            .map_err(|_| QueryError::invalid_filter(format!("unknown job state '{}'", name)))?;
        if !states.contains(&state) {
            states.push(state);
        }
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use chrono::TimeZone;
    use jobarch_core::{JobRecord, Tag};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn job(id: i64, user: &str, cluster: &str, duration: i64) -> JobRecord {
        JobRecord::new(id, user, "proj", cluster, t0()).with_duration(duration)
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let predicate = compile_at(&[], t0()).unwrap();
        assert!(predicate.is_empty());

        let predicate = compile_at(&[JobFilter::default()], t0()).unwrap();
        assert!(predicate.is_empty());
    }

    #[test]
    fn test_empty_sub_constraints_are_no_ops() {
        let filter = JobFilter {
            user: Some(StringInput::default()),
            tags: Some(vec![]),
            state: Some(vec![]),
            start_time: Some(TimeRange::default()),
            ..JobFilter::default()
        };
        assert!(compile_at(&[filter], t0()).unwrap().is_empty());
    }

    #[test]
    fn test_entries_are_and_combined() {
        let filters = vec![
            JobFilter::cluster("alpha"),
            JobFilter::default().with_duration(3600, 7200),
        ];
        let predicate = compile_at(&filters, t0()).unwrap();

        assert_eq!(predicate.len(), 2);
        assert!(predicate.matches(&job(1, "a", "alpha", 3600)));
        assert!(predicate.matches(&job(2, "a", "alpha", 7200)));
        assert!(!predicate.matches(&job(3, "a", "alpha", 7201)));
        assert!(!predicate.matches(&job(4, "a", "beta", 5000)));
    }

    #[test]
    fn test_multiple_string_sub_fields_are_and_combined() {
        let filter = JobFilter {
            user: Some(StringInput {
                eq: Some("alice".into()),
                starts_with: Some("bo".into()),
                ..StringInput::default()
            }),
            ..JobFilter::default()
        };
        let predicate = compile_at(&[filter], t0()).unwrap();

        assert_eq!(predicate.len(), 2);
        assert!(!predicate.matches(&job(1, "alice", "c", 1)));
        assert!(!predicate.matches(&job(2, "bob", "c", 1)));
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let filter = JobFilter::default().with_states(["running", "exploded"]);
        let err = compile_at(&[filter], t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);
    }

    #[test]
    fn test_states_are_deduplicated() {
        let filter = JobFilter::default().with_states(["failed", "FAILED", "timeout"]);
        let predicate = compile_at(&[filter], t0()).unwrap();
        assert_eq!(
            predicate.conditions(),
            &[Condition::StateIn(vec![JobState::Failed, JobState::Timeout])]
        );
    }

    #[test]
    fn test_inverted_and_non_finite_ranges_are_rejected() {
        let inverted = JobFilter::default().with_num_nodes(8, 2);
        assert_eq!(compile_at(&[inverted], t0()).unwrap_err().kind(), ErrorKind::InvalidFilter);

        let nan = JobFilter {
            load_avg: Some(FloatRange::new(f64::NAN, 1.0)),
            ..JobFilter::default()
        };
        assert_eq!(compile_at(&[nan], t0()).unwrap_err().kind(), ErrorKind::InvalidFilter);

        let time = JobFilter {
            start_time: Some(TimeRange {
                from: Some(t0()),
                to: Some(t0() - chrono::Duration::days(1)),
            }),
            ..JobFilter::default()
        };
        assert_eq!(compile_at(&[time], t0()).unwrap_err().kind(), ErrorKind::InvalidFilter);
    }

    #[test]
    fn test_open_time_range() {
        let filter = JobFilter {
            start_time: Some(TimeRange {
                from: Some(t0()),
                to: None,
            }),
            ..JobFilter::default()
        };
        let predicate = compile_at(&[filter], t0()).unwrap();

        assert!(predicate.matches(&job(1, "a", "c", 1)));
        let earlier = JobRecord::new(2, "a", "p", "c", t0() - chrono::Duration::hours(1));
        assert!(!predicate.matches(&earlier));
    }

    #[test]
    fn test_min_running_for_uses_reference_time() {
        let filter = JobFilter {
            min_running_for: Some(3600),
            ..JobFilter::default()
        };
        let running = job(1, "a", "c", 0).with_state(JobState::Running);

        let early = compile_at(&[filter.clone()], t0() + chrono::Duration::minutes(30)).unwrap();
        assert!(!early.matches(&running));

        let late = compile_at(&[filter.clone()], t0() + chrono::Duration::hours(2)).unwrap();
        assert!(late.matches(&running));

        let negative = JobFilter {
            min_running_for: Some(-1),
            ..JobFilter::default()
        };
        assert!(compile_at(&[negative], t0()).is_err());
    }

    #[test]
    fn test_tags_match_any() {
        let filter = JobFilter {
            tags: Some(vec!["io".into(), "mem".into()]),
            ..JobFilter::default()
        };
        let predicate = compile_at(&[filter], t0()).unwrap();
        let tagged = job(1, "a", "c", 1).with_tag(Tag {
            id: 3,
            tag_type: "perf".into(),
            name: "mem".into(),
        });

        assert!(predicate.matches(&tagged));
        assert!(!predicate.matches(&job(2, "a", "c", 1)));
    }

    #[test]
    fn test_hostile_literal_is_bound_not_spliced() {
        let filter = JobFilter::user("x' OR '1'='1");
        let sql = compile_at(&[filter], t0()).unwrap().to_sql();

        assert_eq!(sql.clause, "job.user = ?");
        assert_eq!(sql.params, vec![Value::Text("x' OR '1'='1".into())]);
    }
}
