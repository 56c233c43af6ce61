//! # jobarch-core
//!
//! Core types, traits, and utilities for jobarch, a query and analytics
//! engine over an archive of HPC batch jobs.
//!
//! This crate provides the data structures and interfaces shared by the
//! engine, the development utilities, and the CLI:
//!
//! - Job records, filter requests, and typed predicates
//! - Cluster metadata and node-list expressions
//! - Collaborator traits for job stores, metric loaders, and registries
//! - Layered configuration and the collaborator error type

pub mod cluster;
pub mod config;
pub mod error;
pub mod filter;
pub mod job;
pub mod predicate;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use cluster::{Cluster, MetricConfig, NodeList, SubCluster};
pub use config::{ArchiveConfig, Config, LogFormat, ObservabilityConfig};
pub use error::{Error, Result};
pub use filter::{FloatRange, IntRange, JobFilter, OrderBy, PageRequest, StringInput, TimeRange};
pub use job::{JobRecord, Resource, Tag};
pub use predicate::{Condition, Field, Predicate, SqlFragment, Value};
pub use traits::{ArchiveRegistry, JobStore, MetricLoader};
pub use types::{
    Aggregate, Count, HistoPoint, Identity, JobState, OrderClause, Role, SortDirection, SortField,
    Weight, Window,
};
