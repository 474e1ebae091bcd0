//! Entity types for chunk and canonical knowledge graphs.
//!
//! - `EntityType`: the closed set of node categories
//! - `SourceRef`: provenance pointer back into a chunk
//! - `Entity`: a provisional (chunk-level) or canonical node

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::error::{ErrorCode, GraftError, GraftResult};

/// Categories an entity can belong to.
///
/// The set is closed: extractor output that names anything else is mapped
/// onto the nearest category by [`EntityType::from_str_flexible`] or
/// rejected upstream.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
pub enum EntityType {
    /// An abstract concept or category (e.g., "Condition Variable").
    Concept,
    /// Something that happens (e.g., "Deadlock", "Context Switch").
    Event,
    /// A conscious actor: a person or an organization.
    Agent,
    /// A proposition that may be true or false.
    Claim,
    /// A verified factual statement.
    Fact,
}

impl EntityType {
    /// Parse entity type from string with flexible matching.
    ///
    /// This handles variations in LLM output like "CONCEPT", "concept",
    /// "person", "organization", "idea", etc.
    pub fn from_str_flexible(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();

        match normalized.as_str() {
            "concept" | "idea" | "topic" | "theory" | "category" | "term" | "technique"
            | "algorithm" | "object" | "thing" => Some(Self::Concept),

            "event" | "evt" | "process" | "occurrence" | "action" | "happening" => {
                Some(Self::Event)
            }

            "agent" | "person" | "people" | "individual" | "organization" | "organisation"
            | "company" | "actor" | "institution" => Some(Self::Agent),

            "claim" | "proposition" | "hypothesis" | "assertion" | "argument" => {
                Some(Self::Claim)
            }

            "fact" | "statement" | "observation" | "finding" => Some(Self::Fact),

            _ => None,
        }
    }

    /// Get all entity type variants.
    pub fn all() -> Vec<EntityType> {
        Self::iter().collect()
    }

    /// Convert to string for prompts and display.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl Default for EntityType {
    fn default() -> Self {
        Self::Concept
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_flexible(s).ok_or_else(|| format!("Unknown entity type: {}", s))
    }
}

/// A span of source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Provenance of an extracted entity: which document and chunk it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Document the chunk was cut from.
    pub document_id: String,
    /// Index of the chunk within the document.
    pub chunk_index: usize,
    /// Exact span, when the extractor reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<TextSpan>,
}

impl SourceRef {
    /// Create a source reference without a text span.
    pub fn new(document_id: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_index,
            span: None,
        }
    }

    /// Attach a text span.
    pub fn with_span(mut self, start: usize, end: usize, text: impl Into<String>) -> Self {
        self.span = Some(TextSpan {
            start,
            end,
            text: text.into(),
        });
        self
    }
}

fn default_confidence() -> f32 {
    1.0
}

/// A knowledge-graph node.
///
/// Chunk-level entities are provisional; once the merge engine folds a group
/// of them into a canonical entity, their ids survive only as keys of the
/// id remap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default)]
    pub definition: String,
    /// Provenance trail. Order matters and duplicates are allowed.
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl Entity {
    /// Create a new entity with full confidence and no provenance.
    pub fn new(id: impl Into<String>, label: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            entity_type,
            aliases: BTreeSet::new(),
            definition: String::new(),
            sources: Vec::new(),
            confidence: default_confidence(),
        }
    }

    /// Add an alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Set the definition.
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = definition.into();
        self
    }

    /// Append a source reference.
    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.sources.push(source);
        self
    }

    /// Set the confidence, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Check the entity-level invariants.
    pub fn validate(&self) -> GraftResult<()> {
        if self.label.trim().is_empty() {
            return Err(GraftError::validation_with_code(
                format!("Entity '{}' has an empty label", self.id),
                ErrorCode::ValEmptyLabel,
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(GraftError::validation_with_code(
                format!(
                    "Entity '{}' confidence {} is outside [0, 1]",
                    self.id, self.confidence
                ),
                ErrorCode::ValConfidenceRange,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_from_str_flexible() {
        assert_eq!(EntityType::from_str_flexible("concept"), Some(EntityType::Concept));
        assert_eq!(EntityType::from_str_flexible("EVENT"), Some(EntityType::Event));
        assert_eq!(EntityType::from_str_flexible("  Person "), Some(EntityType::Agent));
        assert_eq!(EntityType::from_str_flexible("company"), Some(EntityType::Agent));
        assert_eq!(EntityType::from_str_flexible("hypothesis"), Some(EntityType::Claim));
        assert_eq!(EntityType::from_str_flexible("statement"), Some(EntityType::Fact));
        assert_eq!(EntityType::from_str_flexible("spaceship"), None);
        assert_eq!(EntityType::from_str_flexible(""), None);
    }

    #[test]
    fn test_entity_type_display_and_serde() {
        assert_eq!(EntityType::Concept.to_string(), "Concept");
        assert_eq!(EntityType::Agent.as_str(), "Agent");
        assert_eq!(EntityType::all().len(), 5);

        let json = serde_json::to_string(&EntityType::Claim).unwrap();
        assert_eq!(json, "\"Claim\"");
        let parsed: EntityType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EntityType::Claim);
    }

    #[test]
    fn test_entity_builder() {
        let entity = Entity::new("e1", "Condition Variable", EntityType::Concept)
            .with_alias("CV")
            .with_definition("A synchronization primitive")
            .with_source(SourceRef::new("os-book", 3).with_span(10, 28, "condition variable"))
            .with_confidence(1.7);

        assert_eq!(entity.aliases.len(), 1);
        assert_eq!(entity.sources[0].chunk_index, 3);
        assert_eq!(entity.confidence, 1.0);
        assert!(entity.validate().is_ok());
    }

    #[test]
    fn test_entity_validate_rejects_empty_label() {
        let entity = Entity::new("e1", "   ", EntityType::Concept);
        let err = entity.validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValEmptyLabel);
    }

    #[test]
    fn test_entity_deserializes_with_defaults() {
        let entity: Entity =
            serde_json::from_str(r#"{"id": "e1", "label": "Lock", "type": "Concept"}"#).unwrap();
        assert!(entity.aliases.is_empty());
        assert!(entity.definition.is_empty());
        assert_eq!(entity.confidence, 1.0);
    }
}
