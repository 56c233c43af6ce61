//! Error handling for jobarch
//!
//! Collaborators (job stores, metric loaders, registries) and the
//! configuration layer report failures through this type. The query engine
//! wraps it into its own error as a collaborator failure.

/// Result type alias for jobarch core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for jobarch collaborators and configuration
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Job store query failed
    #[error("Job store error: {0}")]
    Store(String),

    /// Malformed input such as a node list expression
    #[error("Parse error: {0}")]
    Parse(String),

    /// Resource temporarily unavailable
    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration parsing errors
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a job store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Check if this error is worth retrying at the collaborator level.
    ///
    /// The engine itself never retries; this is a hint for collaborator
    /// implementations that talk to remote stores.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidConfiguration(_) => "configuration",
            Error::Store(_) => "store",
            Error::Parse(_) => "parse",
            Error::Unavailable(_) => "unavailable",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("invalid setting");
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert_eq!(err.to_string(), "Configuration error: invalid setting");

        let err = Error::store("connection reset");
        assert_eq!(err.to_string(), "Job store error: connection reset");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::config("test").category(), "configuration");
        assert_eq!(Error::store("test").category(), "store");
        assert_eq!(Error::parse("test").category(), "parse");
    }

    #[test]
    fn test_retryable() {
        assert!(Error::unavailable("busy").is_retryable());
        assert!(!Error::store("syntax").is_retryable());
        assert!(!Error::parse("bad").is_retryable());
    }
}
