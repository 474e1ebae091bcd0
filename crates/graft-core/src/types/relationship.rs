//! Typed relationships between entities.

use serde::{Deserialize, Serialize};

fn default_confidence() -> f32 {
    1.0
}

/// A directed edge between two entities of the same graph.
///
/// `relation_type` is deliberately an open vocabulary: extractors name the
/// relation in their own words and nothing here restricts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    /// Text supporting the relationship.
    #[serde(default)]
    pub evidence: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl Relationship {
    /// Create a new relationship with full confidence and no evidence.
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type: relation_type.into(),
            evidence: String::new(),
            confidence: default_confidence(),
        }
    }

    /// Add supporting evidence.
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    /// Set the confidence, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Whether both endpoints are the same entity.
    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }

    /// Whether this relationship touches the given entity.
    pub fn touches(&self, entity_id: &str) -> bool {
        self.source_id == entity_id || self.target_id == entity_id
    }
}
