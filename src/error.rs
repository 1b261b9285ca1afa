//! Error types for litscreen.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::screening::Criterion;

/// Result type alias using litscreen's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while screening papers.
#[derive(Error, Debug)]
pub enum Error {
    /// An assessment set does not cover every rubric criterion
    #[error("Incomplete assessment: missing criteria [{}]", join_criteria(.missing))]
    IncompleteAssessment { missing: Vec<Criterion> },

    /// Engine output could not be parsed into any criterion triple
    #[error("Malformed engine output: {message}")]
    MalformedEngineOutput { message: String },

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Only a subset of the configured engines reported for a paper
    #[error("Cannot reconcile paper {paper_id}: no result from engine(s) {}", .missing.join(", "))]
    ReconciliationImpossible {
        paper_id: String,
        missing: Vec<String>,
    },

    /// No configured engine produced an outcome for a paper
    #[error("All engines failed for paper {paper_id}: {}", .reasons.join("; "))]
    EnginesFailed {
        paper_id: String,
        reasons: Vec<String>,
    },

    /// Follow-up was requested for an assessment with nothing left UNCLEAR
    #[error("Follow-up requires at least one UNCLEAR criterion")]
    NothingToResolve,

    /// LLM API error, with the HTTP status when the provider answered
    #[error("LLM API error: {provider} - {message}")]
    LlmApi {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// LLM error (simple variant)
    #[error("LLM error: {0}")]
    LLM(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint storage error
    #[error("Checkpoint storage error: {0}")]
    Checkpoint(String),

    /// Paper source could not be read
    #[error("Paper source error: {0}")]
    Source(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialisable classification of an [`Error`], stored in per-paper error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    IncompleteAssessment,
    MalformedEngineOutput,
    Timeout,
    ReconciliationImpossible,
    EngineFailure,
    Configuration,
    Storage,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::IncompleteAssessment => "incomplete_assessment",
            Self::MalformedEngineOutput => "malformed_engine_output",
            Self::Timeout => "timeout",
            Self::ReconciliationImpossible => "reconciliation_impossible",
            Self::EngineFailure => "engine_failure",
            Self::Configuration => "configuration",
            Self::Storage => "storage",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Create an incomplete assessment error.
    pub fn incomplete(missing: Vec<Criterion>) -> Self {
        Self::IncompleteAssessment { missing }
    }

    /// Create a malformed engine output error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEngineOutput {
            message: message.into(),
        }
    }

    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Create an LLM API error for a non-success HTTP response.
    pub fn llm_status(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a reconciliation impossible error.
    pub fn reconciliation_impossible(paper_id: impl Into<String>, missing: Vec<String>) -> Self {
        Self::ReconciliationImpossible {
            paper_id: paper_id.into(),
            missing,
        }
    }

    /// Whether sending the same request again may succeed.
    ///
    /// Rate limits, server errors, transport failures and timeouts are
    /// transient. Any other HTTP status (bad key, unknown model) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::LlmApi {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            Self::LlmApi { status: None, .. } | Self::LLM(_) | Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Classify this error for persisted error records.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IncompleteAssessment { .. } => ErrorKind::IncompleteAssessment,
            Self::MalformedEngineOutput { .. } => ErrorKind::MalformedEngineOutput,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ReconciliationImpossible { .. } => ErrorKind::ReconciliationImpossible,
            Self::LlmApi { .. } | Self::LLM(_) | Self::EnginesFailed { .. } => {
                ErrorKind::EngineFailure
            }
            Self::Config(_) | Self::Source(_) => ErrorKind::Configuration,
            Self::Checkpoint(_) | Self::Io(_) => ErrorKind::Storage,
            Self::NothingToResolve | Self::Serialization(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

fn join_criteria(criteria: &[Criterion]) -> String {
    criteria
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
