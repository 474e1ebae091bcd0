//! Exact match layer (Layer 1).

use crate::registry::Registry;
use crate::text::normalize;

/// Layer 1: normalized label lookup.
///
/// Two entities whose labels normalize to the same key always meet here,
/// whatever their entropy.
#[derive(Debug, Clone, Default)]
pub struct ExactMatchLayer;

impl ExactMatchLayer {
    pub fn new() -> Self {
        Self
    }

    /// Registry ordinal already holding the normalized form of `label`.
    pub(crate) fn check(&self, registry: &Registry, label: &str) -> Option<usize> {
        registry.lookup_exact(&normalize(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::{Entity, EntityType};

    #[test]
    fn test_exact_ignores_case_spacing_and_edge_punctuation() {
        let mut registry = Registry::new();
        let ordinal = registry.admit(Entity::new("e1", "Condition Variable", EntityType::Concept), None);
        let layer = ExactMatchLayer::new();

        assert_eq!(layer.check(&registry, "condition   variable."), Some(ordinal));
        assert_eq!(layer.check(&registry, "Condition-Variable"), None);
    }
}
