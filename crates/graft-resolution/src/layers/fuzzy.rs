//! Fuzzy match layer (Layer 2).
//!
//! Compares the name's shingle set against every indexed canonical entity.
//! Low-entropy names skip the comparison entirely.

use graft_core::{EntropyGateConfig, FuzzyConfig};

use crate::registry::{FuzzyCandidate, Registry};
use crate::text::{EntropyGate, ShingleSet};

/// Result from the fuzzy layer.
#[derive(Debug, Clone)]
pub struct FuzzyResult {
    /// Matched registry ordinal, if any cleared the threshold.
    pub matched: Option<usize>,
    /// Similarity of the match.
    pub similarity: Option<f64>,
    /// Shingles of the name, when it passed the entropy gate.
    pub shingles: Option<ShingleSet>,
}

impl FuzzyResult {
    fn gated() -> Self {
        Self {
            matched: None,
            similarity: None,
            shingles: None,
        }
    }
}

/// Layer 2: entropy-gated Jaccard similarity.
#[derive(Debug, Clone)]
pub struct FuzzyMatchLayer {
    gate: EntropyGate,
    threshold: f64,
}

impl FuzzyMatchLayer {
    pub fn new(gate: EntropyGateConfig, fuzzy: FuzzyConfig) -> Self {
        Self {
            gate: EntropyGate::new(gate),
            threshold: fuzzy.jaccard_threshold,
        }
    }

    pub fn gate(&self) -> &EntropyGate {
        &self.gate
    }

    pub(crate) fn check(&self, registry: &Registry, label: &str) -> FuzzyResult {
        if !self.gate.is_high_entropy(label) {
            return FuzzyResult::gated();
        }

        let shingles = ShingleSet::from_name(label);
        let best = registry.best_fuzzy_match(&shingles, self.threshold);

        FuzzyResult {
            matched: best.map(|FuzzyCandidate { ordinal, .. }| ordinal),
            similarity: best.map(|c| c.similarity),
            shingles: Some(shingles),
        }
    }
}

impl Default for FuzzyMatchLayer {
    fn default() -> Self {
        Self::new(EntropyGateConfig::default(), FuzzyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::{Entity, EntityType};

    fn indexed(registry: &mut Registry, id: &str, label: &str) -> usize {
        registry.admit(
            Entity::new(id, label, EntityType::Concept),
            Some(ShingleSet::from_name(label)),
        )
    }

    #[test]
    fn test_near_duplicate_matches() {
        let mut registry = Registry::new();
        let ordinal = indexed(&mut registry, "e1", "Bounded Buffer Problem");
        let layer = FuzzyMatchLayer::default();

        let result = layer.check(&registry, "Bounded Buffer Problems");
        assert_eq!(result.matched, Some(ordinal));
        assert!(result.similarity.unwrap() > 0.95);
    }

    #[test]
    fn test_below_threshold_falls_through_with_shingles() {
        let mut registry = Registry::new();
        indexed(&mut registry, "e1", "Bounded Buffer Problem");
        let layer = FuzzyMatchLayer::default();

        let result = layer.check(&registry, "Bounded Buffer");
        assert_eq!(result.matched, None);
        assert!(result.shingles.is_some());
    }

    #[test]
    fn test_low_entropy_is_never_compared() {
        let mut registry = Registry::new();
        indexed(&mut registry, "e1", "Mutexes");
        let layer = FuzzyMatchLayer::new(
            EntropyGateConfig::default(),
            FuzzyConfig {
                jaccard_threshold: 0.0,
            },
        );

        let result = layer.check(&registry, "Mutex");
        assert!(result.matched.is_none());
        assert!(result.shingles.is_none());
    }
}
