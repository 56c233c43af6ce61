//! # jobarch-dev
//!
//! Development and testing utilities for jobarch.
//!
//! This crate provides:
//! - A seeded generator for synthetic job archives
//! - Mock collaborators with latency, failure injection, and call counting
//! - A test-archive harness that wires a [`jobarch_query::QueryEngine`]
//! - Random filter generation for property-style tests

pub mod generator;
pub mod harness;
pub mod mock_adapters;
pub mod utils;

#[cfg(test)]
mod properties;

// Re-export commonly used types
pub use generator::{ArchiveGenerator, GeneratorConfig, SyntheticArchive};
pub use harness::{TestArchive, TestArchiveBuilder};
pub use mock_adapters::{MockConfig, MockJobStore, MockMetricLoader};
pub use utils::{admin_context, setup_test_logging, user_context, FilterGenerator};

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum DevError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] jobarch_core::Error),

    #[error("Query error: {0}")]
    Query(#[from] jobarch_query::QueryError),
}

pub type Result<T> = std::result::Result<T, DevError>;

/// Engine configuration suited to tests: short deadline, small analysis cap
pub fn create_test_engine_config() -> jobarch_query::EngineConfig {
    jobarch_query::EngineConfig::new()
        .with_timeout(std::time::Duration::from_secs(5))
        .with_max_jobs_for_analysis(1_000)
}
