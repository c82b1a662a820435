//! Error types for the radar pipeline.
//!
//! Per-axis faults (a missing metric) are absorbed where they happen and
//! never show up here. Everything below is either surfaced to the
//! immediate caller or rejected when the pipeline is assembled.

use thiserror::Error;

/// Failure reported by a text-analysis collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// The collaborator did not answer within the configured timeout.
    #[error("{provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// The collaborator answered with an error.
    #[error("{provider} failed: {message}")]
    Failed { provider: String, message: String },
}

impl ProviderError {
    pub fn failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Problems found while building or validating an axis catalog.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("axis catalog is empty")]
    Empty,

    #[error("unknown axis '{0}'")]
    UnknownAxis(String),

    #[error("axis '{0}' is defined more than once")]
    DuplicateAxis(String),

    #[error("axis '{axis}' is missing required parameter '{field}'")]
    MissingParameter { axis: String, field: &'static str },

    #[error("axis '{axis}' has an invalid parameter: {message}")]
    InvalidParameter { axis: String, message: String },

    #[error("axis '{axis}' has no entry in the {table} table")]
    MissingMapping { axis: String, table: &'static str },

    #[error("axis '{axis}' has {count} entries in the {table} table")]
    DuplicateMapping {
        axis: String,
        table: &'static str,
        count: usize,
    },
}

/// Errors surfaced by the public snapshot/overlay operations.
#[derive(Debug, Error)]
pub enum RadarError {
    /// A collaborator fault aborted the whole computation. Caches are untouched.
    #[error("metric aggregation failed: {0}")]
    AggregationFailed(#[from] ProviderError),

    /// The caller's cancellation token fired. Not a failure.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A cache lock was poisoned by a panicking holder.
    #[error("{0} cache is unavailable")]
    CacheUnavailable(&'static str),
}

impl RadarError {
    /// True when the operation stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RadarError::Cancelled)
    }
}

pub type RadarResult<T> = std::result::Result<T, RadarError>;
