//! Error types for graft operations.
//!
//! Errors here are reserved for conditions a caller has to act on. Anything
//! the merge pipeline can recover from locally is reported as a
//! [`Diagnostic`](crate::diagnostics::Diagnostic) instead.

use thiserror::Error;

/// Result type alias for graft operations.
pub type GraftResult<T> = Result<T, GraftError>;

/// Main error type for all graft operations.
#[derive(Error, Debug)]
pub enum GraftError {
    /// Input violated a data-model invariant.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// The batch-dedup collaborator failed.
    #[error("Batch dedup error: {message}")]
    Dedup {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM operation failed.
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The merge pass was cancelled before completion.
    #[error("Merge pass cancelled")]
    Cancelled,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValEmptyLabel,
    ValConfidenceRange,
    ValSelfLoop,
    ValMissingEndpoint,

    // Dedup collaborator (DEDUP_xxx)
    DedupCallFailed,
    DedupMalformedResponse,

    // LLM (LLM_xxx)
    LlmGenerationFailed,
    LlmInvalidResponse,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseMissingField,

    // Lifecycle
    Cancelled,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValEmptyLabel => "VAL_002",
            ErrorCode::ValConfidenceRange => "VAL_003",
            ErrorCode::ValSelfLoop => "VAL_004",
            ErrorCode::ValMissingEndpoint => "VAL_005",
            ErrorCode::DedupCallFailed => "DEDUP_001",
            ErrorCode::DedupMalformedResponse => "DEDUP_002",
            ErrorCode::LlmGenerationFailed => "LLM_001",
            ErrorCode::LlmInvalidResponse => "LLM_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseMissingField => "PARSE_002",
            ErrorCode::Cancelled => "LIFE_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl GraftError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: None,
        }
    }

    /// Create a validation error with a specific code.
    pub fn validation_with_code(message: impl Into<String>, code: ErrorCode) -> Self {
        Self::Validation {
            message: message.into(),
            code,
            suggestion: None,
        }
    }

    /// Create a batch-dedup error.
    pub fn dedup(message: impl Into<String>) -> Self {
        Self::Dedup {
            message: message.into(),
            code: ErrorCode::DedupCallFailed,
            source: None,
        }
    }

    /// Create an LLM error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            code: ErrorCode::LlmGenerationFailed,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::Dedup { code, .. } => *code,
            Self::Llm { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            Self::Cancelled => ErrorCode::Cancelled,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::Dedup { .. } => Some("Check the batch-dedup collaborator; entities fall back to distinct"),
            Self::Llm { .. } => Some("Please check your LLM provider configuration"),
            Self::Configuration(_) => Some("Check the graft configuration file or GRAFT_* variables"),
            _ => None,
        }
    }

    /// Whether this error came from an external collaborator rather than
    /// from the caller's input.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::Dedup { .. } | Self::Llm { .. } | Self::Parse { .. }
        )
    }
}
