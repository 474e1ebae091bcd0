//! Batch deduplication collaborator.
//!
//! Layer 3 of the cascading resolver hands every entity the cheap layers
//! could not place to an oracle in a single call. The oracle is usually an
//! LLM, but anything that can answer "same as which, or new?" for a batch
//! will do, including deterministic stubs in tests.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::GraftResult;
use crate::types::{Entity, EntityType};

/// The shape every entity takes inside a dedup request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupCandidate {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Definition preview, truncated by the caller.
    pub definition: String,
}

impl DedupCandidate {
    /// Build a candidate from an entity, keeping at most `preview_chars`
    /// characters of its definition.
    pub fn from_entity(entity: &Entity, preview_chars: usize) -> Self {
        Self {
            id: entity.id.clone(),
            label: entity.label.clone(),
            entity_type: entity.entity_type,
            definition: entity.definition.chars().take(preview_chars).collect(),
        }
    }
}

/// One batch of entities awaiting adjudication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupRequest {
    /// Entities that need a verdict.
    pub pending: Vec<DedupCandidate>,
    /// Canonical entities a pending entity may be merged into.
    pub existing: Vec<DedupCandidate>,
}

impl DedupRequest {
    /// Whether `id` names any entity in this request.
    pub fn contains(&self, id: &str) -> bool {
        self.is_pending(id) || self.existing.iter().any(|c| c.id == id)
    }

    /// Whether `id` names a pending entity.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.iter().any(|c| c.id == id)
    }

    /// Total number of candidates in the request.
    pub fn len(&self) -> usize {
        self.pending.len() + self.existing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.existing.is_empty()
    }
}

/// Verdict for one pending entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupResolution {
    /// The pending entity this verdict is about.
    pub id: String,
    /// Entity to merge into, or `None` to register as new.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub canonical_id: Option<String>,
}

impl DedupResolution {
    /// Verdict: `id` is a duplicate of `canonical_id`.
    pub fn merge(id: impl Into<String>, canonical_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            canonical_id: Some(canonical_id.into()),
        }
    }

    /// Verdict: `id` is a new entity.
    pub fn new_entity(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            canonical_id: None,
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Batch deduplication oracle.
///
/// Implementations must answer with one resolution per pending entity.
/// The resolver tolerates anything less: missing, duplicated or unknown
/// entries are reported as diagnostics and the affected entities stay
/// distinct.
#[async_trait]
pub trait BatchDedup: Send + Sync {
    /// Adjudicate a batch of pending entities.
    async fn deduplicate(&self, request: &DedupRequest) -> GraftResult<Vec<DedupResolution>>;
}
