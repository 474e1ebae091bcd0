//! Graph containers: per-chunk fragments and the merged knowledge graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use super::{Entity, Relationship};
use crate::error::{ErrorCode, GraftError, GraftResult};

/// Token accounting reported by the extractor for one or more chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ExtractionUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens consumed.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Add another usage record to this one.
    pub fn accumulate(&mut self, other: &ExtractionUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// The output of one extraction call over one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkGraph {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ExtractionUsage>,
}

impl ChunkGraph {
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>) -> Self {
        Self {
            entities,
            relationships,
            usage: None,
        }
    }

    /// Attach extractor token usage.
    pub fn with_usage(mut self, usage: ExtractionUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Check the model invariants and report the first violation.
    ///
    /// The merge pipeline does not require this to pass; it drops what it
    /// cannot place and reports diagnostics instead. Extractors can call it
    /// to reject bad output early.
    pub fn validate(&self) -> GraftResult<()> {
        let mut ids = HashSet::with_capacity(self.entities.len());
        for entity in &self.entities {
            entity.validate()?;
            if !ids.insert(entity.id.as_str()) {
                return Err(GraftError::validation(format!(
                    "Duplicate entity id '{}' in chunk graph",
                    entity.id
                )));
            }
        }

        for rel in &self.relationships {
            if rel.is_self_loop() {
                return Err(GraftError::validation_with_code(
                    format!("Relationship '{}' is a self-loop on '{}'", rel.id, rel.source_id),
                    ErrorCode::ValSelfLoop,
                ));
            }
            for endpoint in [&rel.source_id, &rel.target_id] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(GraftError::validation_with_code(
                        format!(
                            "Relationship '{}' references unknown entity '{}'",
                            rel.id, endpoint
                        ),
                        ErrorCode::ValMissingEndpoint,
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Metadata describing where a merged graph came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Documents referenced by any entity source, sorted and unique.
    pub document_ids: Vec<String>,
    /// Number of chunk graphs merged into this graph.
    pub chunk_count: usize,
    /// Summed extractor usage of all merged chunks.
    pub usage: ExtractionUsage,
}

impl GraphMetadata {
    /// Build metadata from the entities of a graph.
    pub fn collect(entities: &[Entity], chunk_count: usize, usage: ExtractionUsage) -> Self {
        let document_ids: BTreeSet<&str> = entities
            .iter()
            .flat_map(|e| e.sources.iter().map(|s| s.document_id.as_str()))
            .collect();

        Self {
            document_ids: document_ids.into_iter().map(str::to_string).collect(),
            chunk_count,
            usage,
        }
    }
}

/// The merged, canonical knowledge graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub metadata: GraphMetadata,
}

impl KnowledgeGraph {
    /// Get an entity by id.
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Find an entity by its label or one of its aliases (case-insensitive).
    pub fn find_by_label(&self, label: &str) -> Option<&Entity> {
        let wanted = label.trim().to_lowercase();
        self.entities.iter().find(|e| {
            e.label.to_lowercase() == wanted || e.aliases.iter().any(|a| a.to_lowercase() == wanted)
        })
    }

    /// Relationships where the entity is the source.
    pub fn outgoing(&self, id: &str) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|r| r.source_id == id)
            .collect()
    }

    /// Relationships where the entity is the target.
    pub fn incoming(&self, id: &str) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|r| r.target_id == id)
            .collect()
    }

    /// All relationships touching the entity.
    pub fn edges_of(&self, id: &str) -> Vec<&Relationship> {
        self.relationships.iter().filter(|r| r.touches(id)).collect()
    }

    /// Relationships with an endpoint missing from the entity set.
    ///
    /// Empty for every graph produced by the reduction merger.
    pub fn dangling_relationships(&self) -> Vec<&Relationship> {
        let ids: HashSet<&str> = self.entities.iter().map(|e| e.id.as_str()).collect();
        self.relationships
            .iter()
            .filter(|r| !ids.contains(r.source_id.as_str()) || !ids.contains(r.target_id.as_str()))
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "KnowledgeGraph(entities={}, relationships={}, chunks={})",
            self.entities.len(),
            self.relationships.len(),
            self.metadata.chunk_count
        )
    }
}

impl From<KnowledgeGraph> for ChunkGraph {
    /// Feed a merged graph back into the merger as a single fragment.
    fn from(graph: KnowledgeGraph) -> Self {
        Self {
            entities: graph.entities,
            relationships: graph.relationships,
            usage: Some(graph.metadata.usage),
        }
    }
}
