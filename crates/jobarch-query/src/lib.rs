//! # jobarch-query
//!
//! Query and analytics engine over an archive of HPC batch jobs.
//!
//! This crate provides:
//! - Compilation of structured job filters into typed predicates
//! - Pagination and allow-listed ordering
//! - Per-job visibility policy for the requesting identity
//! - Statistics, grouped counts, footprints, and roofline heatmaps
//! - In-memory reference collaborators
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use jobarch_core::{Identity, JobFilter, Role};
//! use jobarch_query::{
//!     MemoryJobStore, MemoryMetricLoader, QueryEngine, RequestContext, StaticRegistry,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = QueryEngine::new(
//!     Arc::new(MemoryJobStore::new()),
//!     Arc::new(MemoryMetricLoader::new()),
//!     Arc::new(StaticRegistry::new()),
//! );
//!
//! let ctx = RequestContext::new(Identity::user("alice").with_role(Role::Admin));
//! let page = engine.jobs(&ctx, &[JobFilter::cluster("alpha")], None, None).await?;
//!
//! println!("{} of {} jobs", page.items.len(), page.count);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use thiserror::Error;

pub mod access;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod footprints;
pub mod grouped;
pub mod heatmap;
pub mod pagination;
pub mod registry;
pub mod statistics;
pub mod store;

// Re-export commonly used types
pub use compiler::{compile, compile_at};
pub use config::{AnalysisConfig, EngineConfig, HeatmapScale, QueryConfig, StatisticsConfig};
pub use engine::{JobMetricValue, QueryEngine, RequestContext, ResultPage};
pub use footprints::{Footprints, MetricFootprints};
pub use heatmap::{HeatmapGrid, HeatmapSpec};
pub use pagination::{resolve, ResolvedPage, DEFAULT_ITEMS_PER_PAGE};
pub use registry::StaticRegistry;
pub use statistics::{JobsStatistics, StatisticsAggregator};
pub use store::{MemoryJobStore, MemoryMetricLoader, MetricSample, StoreStatsSnapshot};

/// Result type for query operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors that can occur while answering a query
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid page request: {0}")]
    InvalidPageRequest(String),

    #[error("Invalid sort field: {0}")]
    InvalidSortField(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Collaborator failure: {0}")]
    CollaboratorFailure(#[from] jobarch_core::Error),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Too many jobs: {found} match, analysis is limited to {limit}")]
    TooManyJobs { found: u64, limit: usize },
}

/// Stable classification of a [`QueryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidFilter,
    InvalidPageRequest,
    InvalidSortField,
    InvalidRange,
    NotFound,
    AccessDenied,
    CollaboratorFailure,
    Cancelled,
    TooManyJobs,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidFilter => "INVALID_FILTER",
            ErrorKind::InvalidPageRequest => "INVALID_PAGE_REQUEST",
            ErrorKind::InvalidSortField => "INVALID_SORT_FIELD",
            ErrorKind::InvalidRange => "INVALID_RANGE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::CollaboratorFailure => "COLLABORATOR_FAILURE",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::TooManyJobs => "TOO_MANY_JOBS",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QueryError {
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::InvalidRange(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::InvalidFilter(_) => ErrorKind::InvalidFilter,
            QueryError::InvalidPageRequest(_) => ErrorKind::InvalidPageRequest,
            QueryError::InvalidSortField(_) => ErrorKind::InvalidSortField,
            QueryError::InvalidRange(_) => ErrorKind::InvalidRange,
            QueryError::NotFound(_) => ErrorKind::NotFound,
            QueryError::AccessDenied(_) => ErrorKind::AccessDenied,
            QueryError::CollaboratorFailure(_) => ErrorKind::CollaboratorFailure,
            QueryError::Cancelled(_) => ErrorKind::Cancelled,
            QueryError::TooManyJobs { .. } => ErrorKind::TooManyJobs,
        }
    }

    /// Message safe to hand to the caller.
    ///
    /// Collaborator errors may carry store-level detail such as query text,
    /// so only their category is exposed. Sort field names are not echoed.
    pub fn public_message(&self) -> String {
        match self {
            QueryError::CollaboratorFailure(err) => {
                format!("{}: {} backend failed", self.kind(), err.category())
            }
            QueryError::InvalidSortField(_) => {
                format!("{}: sort field is not in the allow-list", self.kind())
            }
            other => format!("{}: {}", other.kind(), other.detail()),
        }
    }

    fn detail(&self) -> String {
        match self {
            QueryError::InvalidFilter(msg)
            | QueryError::InvalidPageRequest(msg)
            | QueryError::InvalidSortField(msg)
            | QueryError::InvalidRange(msg)
            | QueryError::NotFound(msg)
            | QueryError::AccessDenied(msg)
            | QueryError::Cancelled(msg) => msg.clone(),
            QueryError::CollaboratorFailure(err) => err.to_string(),
            QueryError::TooManyJobs { found, limit } => {
                format!("{} jobs match, analysis is limited to {}", found, limit)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(QueryError::invalid_filter("x").kind(), ErrorKind::InvalidFilter);
        assert_eq!(
            QueryError::TooManyJobs { found: 600, limit: 500 }.kind(),
            ErrorKind::TooManyJobs
        );
        let core = jobarch_core::Error::store("boom");
        assert_eq!(QueryError::from(core).kind(), ErrorKind::CollaboratorFailure);
    }

    #[test]
    fn test_public_message_hides_collaborator_detail() {
        let err = QueryError::from(jobarch_core::Error::store(
            "near \"DROP\": syntax error in SELECT * FROM job WHERE job.user = ?",
        ));
        let msg = err.public_message();
        assert!(msg.starts_with("COLLABORATOR_FAILURE"));
        assert!(!msg.contains("SELECT"));
        assert!(!msg.contains("job.user"));
    }

    #[test]
    fn test_public_message_does_not_echo_sort_field() {
        let err = QueryError::InvalidSortField("; DROP TABLE jobs".to_string());
        assert!(!err.public_message().contains("DROP"));
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::AccessDenied).unwrap();
        assert_eq!(json, "\"ACCESS_DENIED\"");
        assert_eq!(ErrorKind::TooManyJobs.to_string(), "TOO_MANY_JOBS");
    }
}
