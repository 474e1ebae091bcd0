//! Batch adjudication layer (Layer 3).
//!
//! Everything the cheap layers could not place is sent to the batch-dedup
//! collaborator in a single call per pass. The collaborator is untrusted:
//! a failure, a timeout or a partial answer degrades the affected entities
//! to NEW and is recorded as a diagnostic.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use graft_core::{AdjudicationConfig, BatchDedup, DedupRequest, Diagnostic, GraftError};

/// Result from one adjudication call.
#[derive(Debug, Default)]
pub struct AdjudicationResult {
    /// Accepted verdicts: (pending id, id to merge into).
    pub merges: Vec<(String, String)>,
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the collaborator was called.
    pub called: bool,
    pub elapsed: Option<Duration>,
}

/// Layer 3: one bounded call to a [`BatchDedup`] collaborator.
pub struct AdjudicationLayer {
    dedup: Option<Arc<dyn BatchDedup>>,
    config: AdjudicationConfig,
}

impl AdjudicationLayer {
    pub fn new(dedup: Option<Arc<dyn BatchDedup>>, config: AdjudicationConfig) -> Self {
        Self { dedup, config }
    }

    /// Whether a collaborator is configured and the layer is enabled.
    pub fn is_active(&self) -> bool {
        self.config.enabled && self.dedup.is_some()
    }

    pub fn preview_chars(&self) -> usize {
        self.config.definition_preview_chars
    }

    /// Adjudicate a request.
    ///
    /// Skipped when the layer is inactive, nothing is pending, or the
    /// request holds fewer than two candidates.
    pub async fn adjudicate(&self, request: &DedupRequest) -> AdjudicationResult {
        let dedup = match &self.dedup {
            Some(dedup) if self.config.enabled => dedup,
            _ => return AdjudicationResult::default(),
        };
        if request.pending.is_empty() || request.len() < 2 {
            return AdjudicationResult::default();
        }

        let start = Instant::now();
        let timeout = self.config.timeout();
        let outcome = tokio::time::timeout(timeout, dedup.deduplicate(request)).await;
        let elapsed = start.elapsed();

        let mut result = AdjudicationResult {
            called: true,
            elapsed: Some(elapsed),
            ..Default::default()
        };

        let resolutions = match outcome {
            Ok(Ok(resolutions)) => resolutions,
            Ok(Err(GraftError::Parse { message, .. })) => {
                result.diagnostics.push(Diagnostic::MalformedDedupResponse { reason: message });
                return result;
            }
            Ok(Err(e)) => {
                result.diagnostics.push(Diagnostic::DedupFailed {
                    message: e.to_string(),
                });
                return result;
            }
            Err(_) => {
                result.diagnostics.push(Diagnostic::DedupTimeout {
                    pending: request.pending.len(),
                    timeout_ms: timeout.as_millis() as u64,
                });
                return result;
            }
        };

        tracing::debug!(
            pending = request.pending.len(),
            existing = request.existing.len(),
            verdicts = resolutions.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch dedup answered"
        );

        let mut answered: HashSet<String> = HashSet::new();
        for resolution in resolutions {
            if !request.is_pending(&resolution.id) {
                result.diagnostics.push(Diagnostic::UnknownDedupId { id: resolution.id });
                continue;
            }
            if !answered.insert(resolution.id.clone()) {
                result
                    .diagnostics
                    .push(Diagnostic::DuplicateDedupEntry { id: resolution.id });
                continue;
            }
            match resolution.canonical_id {
                Some(target) if target == resolution.id => {}
                Some(target) if !request.contains(&target) => {
                    result.diagnostics.push(Diagnostic::UnknownDedupId { id: target });
                }
                Some(target) => result.merges.push((resolution.id, target)),
                None => {}
            }
        }

        let missing: Vec<&str> = request
            .pending
            .iter()
            .map(|c| c.id.as_str())
            .filter(|id| !answered.contains(*id))
            .collect();
        if !missing.is_empty() {
            result.diagnostics.push(Diagnostic::MalformedDedupResponse {
                reason: format!("no verdict for {}", missing.join(", ")),
            });
        }

        result
    }
}
