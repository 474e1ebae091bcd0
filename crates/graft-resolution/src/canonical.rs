//! Canonical entity construction.
//!
//! Folds a group of entities judged to be the same thing into one. Each
//! field has its own rule and the rules are applied independently.

use std::collections::{BTreeSet, HashSet};

use graft_core::{CanonicalConfig, Entity, EntityType};

/// Marker appended to a definition cut at the cap.
pub const TRUNCATION_MARKER: char = '…';

/// A non-empty group of entities in first-seen order.
///
/// The head's id becomes the canonical id.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityGroup {
    head: Entity,
    members: Vec<Entity>,
}

impl EntityGroup {
    pub fn new(head: Entity) -> Self {
        Self {
            head,
            members: Vec::new(),
        }
    }

    /// Build a group from a list; `None` if the list is empty.
    pub fn from_vec(entities: Vec<Entity>) -> Option<Self> {
        let mut iter = entities.into_iter();
        let head = iter.next()?;
        Some(Self {
            head,
            members: iter.collect(),
        })
    }

    pub fn push(&mut self, entity: Entity) {
        self.members.push(entity);
    }

    pub fn head(&self) -> &Entity {
        &self.head
    }

    pub fn len(&self) -> usize {
        1 + self.members.len()
    }

    /// Always false.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All entities, head first.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        std::iter::once(&self.head).chain(self.members.iter())
    }
}

/// Builds canonical entities from groups.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    config: CanonicalConfig,
}

impl MergeEngine {
    pub fn new(config: CanonicalConfig) -> Self {
        Self { config }
    }

    /// Merge a group into a single canonical entity.
    pub fn merge_group(&self, group: &EntityGroup) -> Entity {
        let label = choose_label(group);
        let entity_type = choose_type(group);

        let mut aliases: BTreeSet<String> = BTreeSet::new();
        for entity in group.iter() {
            aliases.extend(entity.aliases.iter().cloned());
            aliases.insert(entity.label.clone());
        }
        aliases.retain(|a| a != &label && !a.trim().is_empty());

        Entity {
            id: group.head().id.clone(),
            label,
            entity_type,
            aliases,
            definition: self.merge_definitions(group),
            sources: group.iter().flat_map(|e| e.sources.iter().cloned()).collect(),
            confidence: group
                .iter()
                .map(|e| e.confidence)
                .fold(f32::MIN, f32::max),
        }
    }

    fn merge_definitions(&self, group: &EntityGroup) -> String {
        let mut seen = HashSet::new();
        let distinct: Vec<&str> = group
            .iter()
            .map(|e| e.definition.trim())
            .filter(|d| !d.is_empty() && seen.insert(*d))
            .collect();

        let joined = distinct.join(&self.config.definition_separator);
        cap_chars(joined, self.config.definition_cap)
    }
}

/// Longest label by character count; ties go to the first seen.
fn choose_label(group: &EntityGroup) -> String {
    let mut best = group.head();
    for entity in group.iter().skip(1) {
        if entity.label.chars().count() > best.label.chars().count() {
            best = entity;
        }
    }
    best.label.clone()
}

/// Most frequent type; ties go to the first seen.
fn choose_type(group: &EntityGroup) -> EntityType {
    let mut counts: Vec<(EntityType, usize)> = Vec::new();
    for entity in group.iter() {
        match counts.iter_mut().find(|(t, _)| *t == entity.entity_type) {
            Some((_, n)) => *n += 1,
            None => counts.push((entity.entity_type, 1)),
        }
    }

    let mut best = counts[0];
    for &(entity_type, n) in &counts[1..] {
        if n > best.1 {
            best = (entity_type, n);
        }
    }
    best.0
}

/// Cut `text` to at most `cap` characters, ending in the truncation marker
/// when anything was removed.
fn cap_chars(text: String, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text;
    }
    if cap == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(cap.saturating_sub(1)).collect();
    out.truncate(out.trim_end().len());
    out.push(TRUNCATION_MARKER);
    out
}
