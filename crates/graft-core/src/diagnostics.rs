//! Non-fatal diagnostics.
//!
//! Nothing the merge pipeline encounters is fatal: a failing collaborator
//! degrades resolution toward "everything is distinct", a broken
//! relationship is dropped. Each such event is recorded as a [`Diagnostic`]
//! and logged at its severity.

use serde::Serialize;
use strum::Display;

/// How loudly a diagnostic is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Warning,
    Error,
}

/// A recoverable event observed during resolution or merging.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The dedup collaborator's answer was unusable or incomplete.
    MalformedDedupResponse { reason: String },
    /// A dedup response entry named an id that was not in the request.
    UnknownDedupId { id: String },
    /// A pending entity received more than one verdict; later ones were ignored.
    DuplicateDedupEntry { id: String },
    /// The dedup collaborator did not answer within its bound.
    DedupTimeout { pending: usize, timeout_ms: u64 },
    /// The dedup collaborator returned an error.
    DedupFailed { message: String },
    /// A relationship endpoint had no entry in the id remap.
    DanglingRelationship {
        relationship_id: String,
        endpoint: String,
    },
    /// A relationship collapsed onto a single entity after remapping.
    SelfLoopDropped { relationship_id: String },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Self::DanglingRelationship { .. } => Severity::Error,
            Self::SelfLoopDropped { .. } => Severity::Debug,
            _ => Severity::Warning,
        }
    }

    /// Whether the diagnostic stems from the batch-dedup layer.
    pub fn is_dedup(&self) -> bool {
        matches!(
            self,
            Self::MalformedDedupResponse { .. }
                | Self::UnknownDedupId { .. }
                | Self::DuplicateDedupEntry { .. }
                | Self::DedupTimeout { .. }
                | Self::DedupFailed { .. }
        )
    }

    /// Log this diagnostic through `tracing` at its severity.
    pub fn emit(&self) {
        match self.severity() {
            Severity::Error => tracing::error!(diagnostic = ?self, "{}", self),
            Severity::Warning => tracing::warn!(diagnostic = ?self, "{}", self),
            Severity::Debug => tracing::debug!(diagnostic = ?self, "{}", self),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedDedupResponse { reason } => {
                write!(f, "malformed dedup response: {}", reason)
            }
            Self::UnknownDedupId { id } => {
                write!(f, "dedup response references unknown id '{}'", id)
            }
            Self::DuplicateDedupEntry { id } => {
                write!(f, "dedup response has more than one entry for '{}'", id)
            }
            Self::DedupTimeout {
                pending,
                timeout_ms,
            } => write!(
                f,
                "dedup call timed out after {}ms; {} pending entities kept distinct",
                timeout_ms, pending
            ),
            Self::DedupFailed { message } => write!(f, "dedup call failed: {}", message),
            Self::DanglingRelationship {
                relationship_id,
                endpoint,
            } => write!(
                f,
                "relationship '{}' dropped: endpoint '{}' not in id remap",
                relationship_id, endpoint
            ),
            Self::SelfLoopDropped { relationship_id } => write!(
                f,
                "relationship '{}' dropped: endpoints merged into one entity",
                relationship_id
            ),
        }
    }
}
