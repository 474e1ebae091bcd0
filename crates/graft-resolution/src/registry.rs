//! Per-merge accumulator of canonical entities.
//!
//! A registry is created empty for one merge invocation, filled by the
//! resolver and dropped afterwards. It is never shared between merges.

use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::HashMap;

use graft_core::Entity;

use crate::canonical::{EntityGroup, MergeEngine};
use crate::text::{normalize, EntropyGate, ShingleSet};

/// One canonical entity and the entities attached to it this pass.
#[derive(Debug, Clone)]
struct CanonicalEntry {
    id: String,
    /// Canonical form as of the last completed pass.
    snapshot: Option<Entity>,
    /// Entities attached during the current pass, first seen first.
    members: Vec<Entity>,
    source_count: usize,
    /// Set when a batch-dedup merge folded this entry into another.
    merged_into: Option<usize>,
}

impl CanonicalEntry {
    fn is_live(&self) -> bool {
        self.merged_into.is_none()
    }

    fn is_touched(&self) -> bool {
        !self.members.is_empty()
    }
}

/// Best fuzzy candidate for a name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FuzzyCandidate {
    pub ordinal: usize,
    pub similarity: f64,
}

/// Scoped registry of canonical entities.
///
/// Entries are addressed by admission ordinal; ordinals never change and
/// entries are never removed, only folded into another entry.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<CanonicalEntry>,
    by_id: HashMap<String, usize>,
    by_exact_key: HashMap<String, usize>,
    high_entropy_index: Vec<(usize, ShingleSet)>,
    low_entropy_pool: Vec<usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live canonical entities.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical id registered under a normalized key.
    pub fn canonical_id_for_key(&self, key: &str) -> Option<&str> {
        self.by_exact_key
            .get(key)
            .map(|&o| self.entries[self.live(o)].id.as_str())
    }

    /// Canonical id that a known entity id resolves to.
    pub fn canonical_id_for(&self, id: &str) -> Option<&str> {
        self.by_id
            .get(id)
            .map(|&o| self.entries[self.live(o)].id.as_str())
    }

    /// Canonical entity by id, as of the last completed pass.
    pub fn canonical(&self, id: &str) -> Option<&Entity> {
        let &ordinal = self.by_id.get(id)?;
        self.entries[self.live(ordinal)].snapshot.as_ref()
    }

    /// Live canonical entities in admission order.
    pub fn entities(&self) -> Vec<Entity> {
        self.entries
            .iter()
            .filter(|e| e.is_live())
            .filter_map(|e| e.snapshot.clone())
            .collect()
    }

    /// Ids of the heads waiting for batch adjudication.
    pub fn low_entropy_pool(&self) -> Vec<&str> {
        self.low_entropy_pool
            .iter()
            .map(|&o| self.entries[o].id.as_str())
            .collect()
    }

    /// Number of entries in the shingle index.
    pub fn high_entropy_index_len(&self) -> usize {
        self.high_entropy_index.len()
    }

    /// Number of entries ever admitted, live or folded.
    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn ordinal_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).map(|&o| self.live(o))
    }

    pub(crate) fn id_of(&self, ordinal: usize) -> &str {
        &self.entries[self.live(ordinal)].id
    }

    /// Entries in the pending pool, in admission order.
    pub(crate) fn pending(&self) -> &[usize] {
        &self.low_entropy_pool
    }

    /// The head entity of an entry: its snapshot or first member.
    pub(crate) fn head_entity(&self, ordinal: usize) -> Option<&Entity> {
        let entry = &self.entries[ordinal];
        entry.snapshot.as_ref().or_else(|| entry.members.first())
    }

    /// Live entries carried over from earlier passes.
    pub(crate) fn existing(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_live() && e.snapshot.is_some())
            .map(|(o, _)| o)
            .collect()
    }

    /// Follow merge links to the live entry.
    fn live(&self, mut ordinal: usize) -> usize {
        while let Some(next) = self.entries[ordinal].merged_into {
            ordinal = next;
        }
        ordinal
    }

    pub(crate) fn lookup_exact(&self, key: &str) -> Option<usize> {
        self.by_exact_key.get(key).map(|&o| self.live(o))
    }

    /// Best shingle match at or above `threshold`.
    ///
    /// Ties on similarity prefer the entry with more accumulated sources,
    /// then the earliest admitted.
    pub(crate) fn best_fuzzy_match(
        &self,
        shingles: &ShingleSet,
        threshold: f64,
    ) -> Option<FuzzyCandidate> {
        self.high_entropy_index
            .iter()
            .map(|(ordinal, set)| (*ordinal, shingles.jaccard(set)))
            .filter(|(_, sim)| *sim >= threshold)
            .max_by_key(|&(ordinal, sim)| {
                (
                    OrderedFloat(sim),
                    self.entries[ordinal].source_count,
                    Reverse(ordinal),
                )
            })
            .map(|(ordinal, similarity)| FuzzyCandidate {
                ordinal,
                similarity,
            })
    }

    /// Register `entity` as a new provisional head and queue it for
    /// adjudication.
    pub(crate) fn admit(&mut self, entity: Entity, shingles: Option<ShingleSet>) -> usize {
        let ordinal = self.entries.len();
        self.claim_key(&normalize(&entity.label), ordinal);
        if let Some(set) = shingles {
            self.high_entropy_index.push((ordinal, set));
        }
        self.by_id.insert(entity.id.clone(), ordinal);
        self.entries.push(CanonicalEntry {
            id: entity.id.clone(),
            snapshot: None,
            source_count: entity.sources.len(),
            members: vec![entity],
            merged_into: None,
        });
        self.low_entropy_pool.push(ordinal);
        ordinal
    }

    /// Register a finished canonical entity from an earlier pass.
    ///
    /// Aliases claim exact keys only when `index_aliases` is set.
    pub fn seed(&mut self, entity: Entity, gate: &EntropyGate, index_aliases: bool) -> usize {
        let ordinal = self.entries.len();
        self.claim_key(&normalize(&entity.label), ordinal);
        if index_aliases {
            for alias in &entity.aliases {
                self.claim_alias(alias, ordinal);
            }
        }
        if gate.is_high_entropy(&entity.label) {
            self.high_entropy_index
                .push((ordinal, ShingleSet::from_name(&entity.label)));
        }
        self.by_id.insert(entity.id.clone(), ordinal);
        self.entries.push(CanonicalEntry {
            id: entity.id.clone(),
            source_count: entity.sources.len(),
            snapshot: Some(entity),
            members: Vec::new(),
            merged_into: None,
        });
        ordinal
    }

    /// Attach `entity` to a live entry.
    pub(crate) fn attach(&mut self, ordinal: usize, entity: Entity) {
        let ordinal = self.live(ordinal);
        self.by_id.entry(entity.id.clone()).or_insert(ordinal);
        let entry = &mut self.entries[ordinal];
        entry.source_count += entity.sources.len();
        entry.members.push(entity);
    }

    /// Point an unclaimed normalized key at `ordinal`. First claim wins.
    pub(crate) fn claim_key(&mut self, key: &str, ordinal: usize) {
        if !self.by_exact_key.contains_key(key) {
            self.by_exact_key.insert(key.to_string(), ordinal);
        }
    }

    /// Claim the key of an alias. Aliases that normalize to nothing are
    /// skipped.
    pub(crate) fn claim_alias(&mut self, alias: &str, ordinal: usize) {
        let key = normalize(alias);
        if !key.is_empty() {
            self.claim_key(&key, ordinal);
        }
    }

    /// Fold entry `from` into entry `into`.
    ///
    /// Members move over, exact keys are repointed and the shingle entry of
    /// `from` is dropped.
    pub(crate) fn retire(&mut self, from: usize, into: usize) {
        let (from, into) = (self.live(from), self.live(into));
        if from == into {
            return;
        }

        let mut moved = std::mem::take(&mut self.entries[from].members);
        if let Some(snapshot) = self.entries[from].snapshot.take() {
            moved.insert(0, snapshot);
        }
        let moved_sources = self.entries[from].source_count;
        self.entries[from].merged_into = Some(into);

        let target = &mut self.entries[into];
        target.members.extend(moved);
        target.source_count += moved_sources;

        for ordinal in self.by_exact_key.values_mut() {
            if *ordinal == from {
                *ordinal = into;
            }
        }
        self.high_entropy_index.retain(|(o, _)| *o != from);
    }

    /// Close the current pass: rebuild the snapshot of every touched entry
    /// and clear the pending pool.
    ///
    /// Returns the ordinals that were rebuilt.
    pub(crate) fn finish_pass(
        &mut self,
        engine: &MergeEngine,
        gate: &EntropyGate,
        index_aliases: bool,
    ) -> Vec<usize> {
        let touched: Vec<usize> = (0..self.entries.len())
            .filter(|&o| self.entries[o].is_live() && self.entries[o].is_touched())
            .collect();

        for &ordinal in &touched {
            let entry = &mut self.entries[ordinal];
            let members = std::mem::take(&mut entry.members);
            let group = match entry.snapshot.take() {
                Some(snapshot) => {
                    let mut group = EntityGroup::new(snapshot);
                    members.into_iter().for_each(|m| group.push(m));
                    Some(group)
                }
                None => EntityGroup::from_vec(members),
            };
            let Some(group) = group else { continue };

            let canonical = engine.merge_group(&group);

            self.claim_key(&normalize(&canonical.label), ordinal);
            if index_aliases {
                for alias in &canonical.aliases {
                    self.claim_alias(alias, ordinal);
                }
            }
            if gate.is_high_entropy(&canonical.label) {
                let set = ShingleSet::from_name(&canonical.label);
                match self.high_entropy_index.iter_mut().find(|(o, _)| *o == ordinal) {
                    Some((_, existing)) => *existing = set,
                    None => self.high_entropy_index.push((ordinal, set)),
                }
            }

            self.entries[ordinal].snapshot = Some(canonical);
        }

        self.low_entropy_pool.clear();
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::{EntityType, SourceRef};

    fn concept(id: &str, label: &str) -> Entity {
        Entity::new(id, label, EntityType::Concept)
    }

    #[test]
    fn test_admit_claims_key_and_queues() {
        let mut registry = Registry::new();
        let ordinal = registry.admit(concept("e1", "Mutex"), None);

        assert_eq!(registry.lookup_exact("mutex"), Some(ordinal));
        assert_eq!(registry.low_entropy_pool(), vec!["e1"]);
        assert_eq!(registry.high_entropy_index_len(), 0);
        // Not visible as canonical until the pass closes.
        assert!(registry.entities().is_empty());
    }

    #[test]
    fn test_first_claim_wins() {
        let mut registry = Registry::new();
        let a = registry.admit(concept("a", "Lock"), None);
        let b = registry.admit(concept("b", "Latch"), None);
        registry.claim_key("lock", b);
        assert_eq!(registry.lookup_exact("lock"), Some(a));
    }

    #[test]
    fn test_fuzzy_tie_break_prefers_sources_then_ordinal() {
        let mut registry = Registry::new();
        let name = "Dining Philosophers";
        let first = registry.admit(concept("a", name), Some(ShingleSet::from_name(name)));
        let second = registry.admit(
            concept("b", name).with_source(SourceRef::new("doc", 0)),
            Some(ShingleSet::from_name(name)),
        );

        let probe = ShingleSet::from_name(name);
        let best = registry.best_fuzzy_match(&probe, 0.9).unwrap();
        assert_eq!(best.ordinal, second);

        registry.attach(first, concept("c", name).with_source(SourceRef::new("doc", 1)));
        registry.attach(first, concept("d", name).with_source(SourceRef::new("doc", 2)));
        let best = registry.best_fuzzy_match(&probe, 0.9).unwrap();
        assert_eq!(best.ordinal, first);
        assert_eq!(best.similarity, 1.0);
    }

    #[test]
    fn test_retire_repoints_keys_and_members() {
        let mut registry = Registry::new();
        let lock = registry.admit(concept("lock", "Lock"), None);
        let mutex = registry.admit(concept("mutex", "Mutex"), None);
        registry.retire(mutex, lock);

        assert_eq!(registry.lookup_exact("mutex"), Some(lock));
        assert_eq!(registry.canonical_id_for("mutex"), Some("lock"));

        let rebuilt = registry.finish_pass(&MergeEngine::default(), &EntropyGate::default(), true);
        assert_eq!(rebuilt, vec![lock]);
        let entities = registry.entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id, "lock");
        assert_eq!(entities[0].label, "Mutex");
        assert!(entities[0].aliases.contains("Lock"));
        assert!(registry.low_entropy_pool().is_empty());
    }

    #[test]
    fn test_seed_and_extend_across_passes() {
        let gate = EntropyGate::default();
        let engine = MergeEngine::default();
        let mut registry = Registry::new();
        let ordinal = registry.seed(
            concept("x", "Condition Variable").with_alias("condvar"),
            &gate,
            true,
        );

        assert_eq!(registry.lookup_exact("condvar"), Some(ordinal));
        assert_eq!(registry.existing(), vec![ordinal]);

        registry.attach(ordinal, concept("y", "condition variable"));
        registry.finish_pass(&engine, &gate, true);

        let canonical = registry.canonical("x").unwrap();
        assert!(canonical.aliases.contains("condition variable"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_seed_without_alias_indexing() {
        let mut registry = Registry::new();
        let ordinal = registry.seed(
            concept("x", "Condition Variable").with_alias("condvar"),
            &EntropyGate::default(),
            false,
        );

        assert_eq!(registry.lookup_exact("condition variable"), Some(ordinal));
        assert_eq!(registry.lookup_exact("condvar"), None);
    }
}
