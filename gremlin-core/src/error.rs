//! Error types for the Gremlin experiment core.
//!
//! Uses `thiserror` for public API error types, one enum per failure domain:
//! configuration, data sources, upstream services, and trace input.

use std::path::PathBuf;

use crate::experiment::ExperimentState;

/// Top-level error type for the Gremlin core library.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("Upstream service error: {0}")]
    Upstream(#[from] UpstreamServiceError),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    #[error("Experiment was cancelled")]
    Cancelled,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ExperimentState,
        to: ExperimentState,
    },
}

/// Errors from configuration and target selection.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No fault target candidate found: {reason}")]
    NoTarget { reason: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from edge and service-frequency inputs.
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is empty (no header row)")]
    Empty { path: PathBuf },

    #[error("{path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{path}:{line}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Errors from the trace-query and fault-injection services.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamServiceError {
    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} response parse error: {message}")]
    ResponseParse { service: String, message: String },

    #[error("{service} request timed out after {timeout_secs}s")]
    Timeout { service: String, timeout_secs: u64 },
}

impl UpstreamServiceError {
    /// Whether the failure is transient. The controller never retries, but
    /// the classification is surfaced to callers and diagnostics.
    pub fn retryable(&self) -> bool {
        match self {
            UpstreamServiceError::Transport { .. } | UpstreamServiceError::Timeout { .. } => true,
            UpstreamServiceError::Status { status, .. } => *status >= 500 || *status == 429,
            UpstreamServiceError::ResponseParse { .. } => false,
        }
    }
}

/// Errors from malformed trace outcome records.
#[derive(Debug, thiserror::Error)]
pub enum InvalidInputError {
    #[error("Trace outcome #{index} has an empty service identifier")]
    EmptyService { index: usize },
}
