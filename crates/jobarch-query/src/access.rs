//! Per-job visibility policy
//!
//! Admin and support identities see every job. Everyone else sees only jobs
//! whose `user` equals their username. A caller with neither a username nor
//! an elevated role is denied everywhere.

use crate::{QueryError, Result};
use jobarch_core::{Condition, Field, Identity, JobRecord, Predicate, Value};

/// Reject callers that carry no identity at all
pub fn require_identity(identity: &Identity) -> Result<()> {
    if identity.is_privileged() || identity.username.is_some() {
        Ok(())
    } else {
        Err(QueryError::access_denied("an authenticated identity is required"))
    }
}

/// Check that `identity` may view `job`
pub fn authorize(identity: &Identity, job: &JobRecord) -> Result<()> {
    if identity.is_privileged() {
        return Ok(());
    }
    match identity.username.as_deref() {
        Some(username) if username == job.user => Ok(()),
        Some(_) => Err(QueryError::access_denied("job belongs to another user")),
        None => Err(QueryError::access_denied("an authenticated identity is required")),
    }
}

/// Restrict `predicate` to the jobs `identity` may view
pub fn scope(identity: &Identity, predicate: Predicate) -> Result<Predicate> {
    if identity.is_privileged() {
        return Ok(predicate);
    }
    match &identity.username {
        Some(username) => Ok(predicate.and(Condition::Equals {
            field: Field::User,
            value: Value::Text(username.clone()),
        })),
        None => Err(QueryError::access_denied("an authenticated identity is required")),
    }
}
