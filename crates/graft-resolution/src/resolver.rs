//! Cascading resolver - places each incoming entity with the cheapest
//! layer that can decide.
//!
//! Layer cascade:
//! 1. Exact: normalized label lookup
//! 2. Fuzzy: 3-gram Jaccard, only for high-entropy names
//! 3. Adjudication: one batch-dedup call for every head left pending
//!
//! Entities no layer merges become canonical heads of their own.

use petgraph::unionfind::UnionFind;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use graft_core::{BatchDedup, DedupCandidate, DedupRequest, Entity, GraftConfig};

use crate::canonical::MergeEngine;
use crate::layers::{AdjudicationLayer, AdjudicationResult, ExactMatchLayer, FuzzyMatchLayer};
use crate::registry::Registry;
use crate::text::normalize;
use crate::types::{IdRemap, LayerTimings, Resolution, ResolutionDecision, ResolutionLayer};

/// Where one input entity landed during the cascade.
struct Placement {
    entity_id: String,
    ordinal: usize,
    layer: ResolutionLayer,
    similarity: Option<f64>,
}

/// Cascading entity resolver.
///
/// Stateless apart from configuration; all accumulated state lives in the
/// [`Registry`] passed to [`resolve`](Self::resolve).
pub struct CascadingResolver {
    exact: ExactMatchLayer,
    fuzzy: FuzzyMatchLayer,
    adjudication: AdjudicationLayer,
    engine: MergeEngine,
    index_aliases: bool,
}

impl CascadingResolver {
    /// Create a resolver. Without a collaborator, Layer 3 never runs and
    /// every unmatched entity is NEW.
    pub fn new(config: &GraftConfig, dedup: Option<Arc<dyn BatchDedup>>) -> Self {
        Self {
            exact: ExactMatchLayer::new(),
            fuzzy: FuzzyMatchLayer::new(config.gate.clone(), config.fuzzy.clone()),
            adjudication: AdjudicationLayer::new(dedup, config.adjudication.clone()),
            engine: MergeEngine::new(config.canonical.clone()),
            index_aliases: config.index_aliases,
        }
    }

    /// Resolve a batch of provisional entities against `registry`.
    ///
    /// Never fails: collaborator trouble is reported in
    /// [`Resolution::diagnostics`] and the affected entities stay distinct.
    pub async fn resolve(&self, entities: Vec<Entity>, registry: &mut Registry) -> Resolution {
        let total_start = Instant::now();
        let mut timings = LayerTimings::default();
        let mut placements = Vec::with_capacity(entities.len());

        for entity in entities {
            placements.push(self.place(entity, registry, &mut timings));
        }

        // Layer 3: one call for everything still pending
        let request = self.build_request(registry);
        let adjudicated = self.adjudication.adjudicate(&request).await;
        timings.adjudication_layer = adjudicated.elapsed;
        for diagnostic in &adjudicated.diagnostics {
            diagnostic.emit();
        }
        let folded = self.apply_merges(&adjudicated, registry);

        // Canonical ids are final once merges are applied; members are
        // consumed when the pass closes.
        let mut remap = IdRemap::new();
        let decisions: Vec<ResolutionDecision> = placements
            .into_iter()
            .map(|p| {
                let canonical_id = registry.id_of(p.ordinal).to_string();
                remap.insert(p.entity_id.clone(), canonical_id.clone());
                let layer = if p.layer == ResolutionLayer::New && folded.contains(&p.ordinal) {
                    ResolutionLayer::Adjudicated
                } else {
                    p.layer
                };
                ResolutionDecision {
                    entity_id: p.entity_id,
                    canonical_id,
                    layer,
                    similarity: p.similarity,
                }
            })
            .collect();

        registry.finish_pass(&self.engine, self.fuzzy.gate(), self.index_aliases);

        let canonical = registry.entities();
        for entity in &canonical {
            remap.insert(entity.id.clone(), entity.id.clone());
        }

        timings.total = total_start.elapsed();
        let resolution = Resolution {
            entities: canonical,
            remap,
            decisions,
            diagnostics: adjudicated.diagnostics,
            timings,
            adjudication_calls: usize::from(adjudicated.called),
        };

        tracing::debug!(
            exact = resolution.count_by_layer(ResolutionLayer::Exact),
            fuzzy = resolution.count_by_layer(ResolutionLayer::Fuzzy),
            adjudicated = resolution.count_by_layer(ResolutionLayer::Adjudicated),
            new = resolution.count_by_layer(ResolutionLayer::New),
            canonical = resolution.entities.len(),
            total_ms = resolution.timings.total.as_millis() as u64,
            "Resolution pass complete"
        );

        resolution
    }

    /// Run Layers 1 and 2 for one entity, admitting it as a head if
    /// neither matches.
    fn place(&self, entity: Entity, registry: &mut Registry, timings: &mut LayerTimings) -> Placement {
        let entity_id = entity.id.clone();

        // An id the registry already knows joins its entry.
        if let Some(ordinal) = registry.ordinal_of(&entity_id) {
            tracing::warn!(id = %entity_id, "Entity id already registered; attaching to its entry");
            registry.claim_key(&normalize(&entity.label), ordinal);
            self.claim_aliases(registry, &entity, ordinal);
            registry.attach(ordinal, entity);
            return Placement {
                entity_id,
                ordinal,
                layer: ResolutionLayer::Exact,
                similarity: None,
            };
        }

        // Layer 1: exact
        let start = Instant::now();
        let exact = self.exact.check(registry, &entity.label);
        timings.exact_layer += start.elapsed();

        if let Some(ordinal) = exact {
            tracing::debug!(id = %entity_id, canonical = registry.id_of(ordinal), "Exact match");
            self.claim_aliases(registry, &entity, ordinal);
            registry.attach(ordinal, entity);
            return Placement {
                entity_id,
                ordinal,
                layer: ResolutionLayer::Exact,
                similarity: None,
            };
        }

        // Layer 2: fuzzy
        let start = Instant::now();
        let fuzzy = self.fuzzy.check(registry, &entity.label);
        timings.fuzzy_layer += start.elapsed();

        if let Some(ordinal) = fuzzy.matched {
            tracing::debug!(
                id = %entity_id,
                canonical = registry.id_of(ordinal),
                similarity = fuzzy.similarity.unwrap_or_default(),
                "Fuzzy match"
            );
            // The label's own key is always claimed so that a later entity
            // with the same normalized label meets this entry at Layer 1.
            registry.claim_key(&normalize(&entity.label), ordinal);
            self.claim_aliases(registry, &entity, ordinal);
            registry.attach(ordinal, entity);
            return Placement {
                entity_id,
                ordinal,
                layer: ResolutionLayer::Fuzzy,
                similarity: fuzzy.similarity,
            };
        }

        // Pending: a provisional head, visible to the rest of the batch
        let aliases: Vec<String> = entity.aliases.iter().cloned().collect();
        let high_entropy = fuzzy.shingles.is_some();
        let ordinal = registry.admit(entity, fuzzy.shingles);
        if self.index_aliases {
            for alias in &aliases {
                registry.claim_alias(alias, ordinal);
            }
        }
        tracing::debug!(id = %entity_id, high_entropy, "Admitted as pending head");

        Placement {
            entity_id,
            ordinal,
            layer: ResolutionLayer::New,
            similarity: None,
        }
    }

    fn claim_aliases(&self, registry: &mut Registry, entity: &Entity, ordinal: usize) {
        if self.index_aliases {
            for alias in &entity.aliases {
                registry.claim_alias(alias, ordinal);
            }
        }
    }

    fn build_request(&self, registry: &Registry) -> DedupRequest {
        let preview = self.adjudication.preview_chars();
        let candidates = |ordinals: &[usize]| -> Vec<DedupCandidate> {
            ordinals
                .iter()
                .filter_map(|&o| registry.head_entity(o))
                .map(|e| DedupCandidate::from_entity(e, preview))
                .collect()
        };

        DedupRequest {
            pending: candidates(registry.pending()),
            existing: candidates(&registry.existing()),
        }
    }

    /// Fold batch-dedup verdicts into the registry.
    ///
    /// Verdicts form an undirected graph over entries; each connected
    /// component collapses into its earliest-admitted member. Returns the
    /// ordinals that were folded away.
    fn apply_merges(&self, result: &AdjudicationResult, registry: &mut Registry) -> HashSet<usize> {
        let mut folded = HashSet::new();
        if result.merges.is_empty() {
            return folded;
        }

        let mut sets: UnionFind<usize> = UnionFind::new(registry.capacity());
        for (pending, target) in &result.merges {
            if let (Some(a), Some(b)) = (registry.ordinal_of(pending), registry.ordinal_of(target)) {
                sets.union(a, b);
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (pending, target) in &result.merges {
            for id in [pending, target] {
                if let Some(ordinal) = registry.ordinal_of(id) {
                    components.entry(sets.find(ordinal)).or_default().push(ordinal);
                }
            }
        }

        for mut members in components.into_values() {
            members.sort_unstable();
            members.dedup();
            let anchor = members[0];
            for &ordinal in &members[1..] {
                tracing::debug!(
                    id = registry.id_of(ordinal),
                    canonical = registry.id_of(anchor),
                    "Adjudicated merge"
                );
                registry.retire(ordinal, anchor);
                folded.insert(ordinal);
            }
        }

        folded
    }
}
