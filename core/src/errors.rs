use thiserror::Error;

use crate::model::SliType;
use crate::retry::Retryable;
use crate::window::TimeWindow;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("SLI catalog error: {0}")]
    Catalog(#[source] BackendError),

    #[error("SLI {sli_id} is typed {sli_type} but its metric path holds a {query_type} query")]
    QueryMismatch {
        sli_id: i64,
        sli_type: SliType,
        query_type: SliType,
    },

    #[error("SLI {sli_id} has an unusable metric path: {reason}")]
    InvalidMetricPath { sli_id: i64, reason: String },

    #[error("Slice {window} of SLI {sli_id} failed (query: {query}): {source}")]
    Slice {
        sli_id: i64,
        window: TimeWindow,
        query: String,
        #[source]
        source: SliceError,
    },
}

/// Failure of a single slice. Records of a failed slice are never submitted.
#[derive(Error, Debug)]
pub enum SliceError {
    #[error("Metrics source error: {0}")]
    Source(#[from] SourceError),

    #[error("Mapping error: {0}")]
    Map(#[from] MapError),

    #[error("Submit error: {0}")]
    Submit(#[source] SubmitError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Metrics source transport failure (status {status:?}): {reason}")]
    Transport { status: Option<u16>, reason: String },

    #[error("Metrics query rejected with status {status}: {reason}")]
    Query { status: u16, reason: String },

    #[error("Failed to decode metrics response: {reason}")]
    Decode { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend transport failure (status {status:?}): {reason}")]
    Transport { status: Option<u16>, reason: String },

    #[error("Backend rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Backend response could not be decoded: {reason}")]
    Malformed { reason: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
}

/// Errors surfaced by the batch submitter.
pub type SubmitError = BackendError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("Sample value {value:?} at {timestamp} for SLI {sli_id} is not a finite number")]
    ValueParse {
        sli_id: i64,
        timestamp: i64,
        value: String,
    },

    #[error("{0} SLIs cannot be mapped from a single series")]
    UnsupportedType(SliType),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Failed to load configuration from {origin}: {error}")]
    LoadFailed {
        origin: String,
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode {
                reason: err.to_string(),
            }
        } else {
            SourceError::Transport {
                status: err.status().map(|s| s.as_u16()),
                reason: err.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Malformed {
                reason: err.to_string(),
            }
        } else {
            BackendError::Transport {
                status: err.status().map(|s| s.as_u16()),
                reason: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Malformed {
            reason: err.to_string(),
        }
    }
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transport { .. })
    }
}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Transport { .. })
    }
}

impl Retryable for IngestError {
    /// Whether re-running the same work later may succeed. Mapping failures,
    /// rejections and configuration problems will fail the same way again.
    fn is_retryable(&self) -> bool {
        match self {
            IngestError::Catalog(e) => e.is_retryable(),
            IngestError::Slice { source, .. } => match source {
                SliceError::Source(e) => e.is_retryable(),
                SliceError::Submit(e) => e.is_retryable(),
                SliceError::Map(_) => false,
            },
            IngestError::Config(_)
            | IngestError::QueryMismatch { .. }
            | IngestError::InvalidMetricPath { .. } => false,
        }
    }
}
