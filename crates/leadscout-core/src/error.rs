//! Error types for the LeadScout core library.
//!
//! Adapter calls fail with [`AdapterError`]; pipeline stages record at most
//! one terminal [`StageError`] drawn from the closed [`ErrorKind`] set.
//! The library uses `thiserror` for structured, typed errors.

use serde::{Deserialize, Serialize};

/// Errors related to configuration loading, parsing, and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// The configuration file does not exist at the specified path.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// TOML deserialization failed.
    #[error("failed to parse config file: {source}")]
    ParseError {
        /// The underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from a single third-party adapter call.
///
/// Adapter-local retries are invisible to callers: what surfaces here is
/// the terminal outcome of a call after the retry policy has run.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Network or transport failure (including retry exhaustion).
    #[error("transport error: {message}")]
    Transport {
        /// Details of the transport failure.
        message: String,
    },

    /// The service returned HTTP 429.
    #[error("rate limited{}", match .retry_after {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying, if advertised by the service.
        retry_after: Option<u64>,
    },

    /// The service returned a non-retryable 4xx response.
    #[error("bad response (HTTP {status}): {message}")]
    BadResponse {
        /// The HTTP status code.
        status: u16,
        /// The error message from the service.
        message: String,
    },

    /// The service returned data not matching the expected schema.
    #[error("parse error: {0}")]
    Parse(String),

    /// A dataset filter matched more records than the download cap allows.
    #[error("result count {count} exceeds download cap {cap}")]
    Overflow {
        /// The advertised result count.
        count: u64,
        /// The configured hard cap.
        cap: u64,
    },

    /// An adapter-level wait (e.g. snapshot polling) exceeded its bound.
    #[error("timed out after {seconds}s")]
    Timeout {
        /// Seconds waited before giving up.
        seconds: u64,
    },
}

impl AdapterError {
    /// The stage-level error kind this adapter failure maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Transport { .. } => ErrorKind::Transport,
            AdapterError::RateLimited { .. } => ErrorKind::RateLimited,
            AdapterError::BadResponse { .. } => ErrorKind::BadResponse,
            AdapterError::Parse(_) => ErrorKind::ParseError,
            AdapterError::Overflow { .. } => ErrorKind::Overflow,
            AdapterError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

/// The closed set of terminal stage error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network/transport failure after retry exhaustion.
    Transport,
    /// Rate limited and retries exhausted before degradation to transport.
    RateLimited,
    /// Non-retryable 4xx from an adapter.
    BadResponse,
    /// Adapter returned data not matching the expected schema.
    ParseError,
    /// Dataset result count exceeded the download cap.
    Overflow,
    /// The per-run cost ceiling was reached.
    BudgetExhausted,
    /// A stage-level timeout expired.
    Timeout,
    /// The run was cancelled by the operator.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::BadResponse => "bad_response",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::Overflow => "overflow",
            ErrorKind::BudgetExhausted => "budget_exhausted",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The pipeline stage a [`StageError`] is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Account resolution via the CRM reader.
    Resolve,
    /// Stage 1: candidate acquisition.
    Acquire,
    /// Stage 2: validation and enrichment.
    Enrich,
    /// Stage 3: qualification and ranking.
    Rank,
    /// Stage 4: pending-update queueing.
    Sink,
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageName::Resolve => "resolve",
            StageName::Acquire => "acquire",
            StageName::Enrich => "enrich",
            StageName::Rank => "rank",
            StageName::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// The single terminal error a stage may record.
///
/// Never thrown across stage boundaries: stages return their partial
/// output alongside an optional `StageError`, and the orchestrator folds
/// the first one into the run's terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("stage {stage} failed ({kind}): {message}")]
pub struct StageError {
    /// The stage that recorded the error.
    pub stage: StageName,
    /// The error kind, from the closed set.
    pub kind: ErrorKind,
    /// A short human-readable description.
    pub message: String,
}

impl StageError {
    /// Build a stage error from an adapter failure.
    pub fn from_adapter(stage: StageName, err: &AdapterError) -> Self {
        Self {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Build a stage error with an explicit kind and message.
    pub fn new(stage: StageName, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

/// Errors from the pending-update sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink could not be reached; the enqueue may be retried.
    #[error("sink transport error: {message}")]
    Transport {
        /// Details of the transport failure.
        message: String,
    },

    /// The sink rejected the record; retrying will not help.
    #[error("sink rejected update: {message}")]
    Rejected {
        /// The rejection reason reported by the sink.
        message: String,
    },
}
