//! Error types for the failover system
//!
//! This module defines all error types used throughout the crate.
//! The variants follow the failure classes the control loops care about:
//! configuration errors are fatal at startup, everything tagged transient
//! is logged and retried on the next tick or cycle.

use thiserror::Error;

/// Result type alias for failover operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the failover system
#[derive(Error, Debug)]
pub enum Error {
    /// DNS provider-related errors (API failures, subprocess failures)
    #[error("DNS provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// DNS resolution errors (follower and reconciler lease reads)
    #[error("DNS resolution error: {0}")]
    Resolve(String),

    /// Health probe errors
    #[error("Health probe error: {0}")]
    Probe(String),

    /// Workload management errors (spawn, signal, scale)
    #[error("Workload error: {0}")]
    Workload(String),

    /// Datastore errors (query, export, ingest)
    #[error("Datastore error: {0}")]
    Datastore(String),

    /// State file errors
    #[error("State file error: {0}")]
    StateFile(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a DNS provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a DNS resolution error
    pub fn resolve(msg: impl Into<String>) -> Self {
        Self::Resolve(msg.into())
    }

    /// Create a health probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a workload error
    pub fn workload(msg: impl Into<String>) -> Self {
        Self::Workload(msg.into())
    }

    /// Create a datastore error
    pub fn datastore(msg: impl Into<String>) -> Self {
        Self::Datastore(msg.into())
    }

    /// Create a state file error
    pub fn state_file(msg: impl Into<String>) -> Self {
        Self::StateFile(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether a loop should swallow this error and retry on its next tick.
    ///
    /// Only configuration errors and state-file write failures are fatal;
    /// everything else is expected to clear on its own (provider outage,
    /// resolver lag, datastore timeout).
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::StateFile(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::provider("file", "io").is_transient());
        assert!(Error::resolve("timed out").is_transient());
        assert!(Error::datastore("query timeout").is_transient());
        assert!(!Error::config("ROLE missing").is_transient());
        assert!(!Error::state_file("rename failed").is_transient());
    }
}
