//! Result types for entity resolution.
//!
//! A resolution pass maps every incoming provisional entity onto a
//! canonical entity and records which layer of the cascade made the call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use graft_core::{Diagnostic, Entity};

/// Which layer of the cascade placed an entity.
///
/// Ordered by cost, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionLayer {
    /// Normalized label matched a registry key (Layer 1)
    Exact,
    /// Shingle similarity cleared the threshold (Layer 2)
    Fuzzy,
    /// The batch-dedup collaborator merged it (Layer 3)
    Adjudicated,
    /// No layer matched; the entity is its own canonical
    New,
}

/// Timing information for each layer of one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct LayerTimings {
    /// Time spent in exact lookups
    pub exact_layer: Duration,
    /// Time spent in shingle comparison
    pub fuzzy_layer: Duration,
    /// Time spent waiting on the batch-dedup collaborator, if called
    pub adjudication_layer: Option<Duration>,
    /// Total wall time of the pass
    pub total: Duration,
}

/// Verdict for one input entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionDecision {
    pub entity_id: String,
    pub canonical_id: String,
    pub layer: ResolutionLayer,
    /// Jaccard similarity for fuzzy matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// Mapping from provisional entity ids to canonical entity ids.
///
/// Closed under application: every value maps to itself, so applying the
/// remap twice gives the same result as applying it once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdRemap {
    map: BTreeMap<String, String>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.map.insert(from.into(), to.into());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.map.get(id).map(String::as_str)
    }

    /// Map `id` to its canonical id, or `None` if it is unknown.
    pub fn apply(&self, id: &str) -> Option<String> {
        self.get(id).map(str::to_string)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    /// Whether every target is a fixed point of the remap.
    pub fn is_idempotent(&self) -> bool {
        self.map.values().all(|to| self.get(to) == Some(to.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Output of one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Canonical entities of the registry, in admission order.
    pub entities: Vec<Entity>,
    /// Provisional id to canonical id, for every input entity.
    pub remap: IdRemap,
    /// One decision per input entity, in input order.
    pub decisions: Vec<ResolutionDecision>,
    pub diagnostics: Vec<Diagnostic>,
    pub timings: LayerTimings,
    /// Number of batch-dedup calls made (0 or 1).
    pub adjudication_calls: usize,
}

impl Resolution {
    /// Number of input entities decided by `layer`.
    pub fn count_by_layer(&self, layer: ResolutionLayer) -> usize {
        self.decisions.iter().filter(|d| d.layer == layer).count()
    }
}
