//! Parallel reduction merger.
//!
//! Combines N chunk graphs into one in ⌈log2 N⌉ rounds. Within a round,
//! disjoint pairs are merged concurrently on a bounded worker pool; rounds
//! run strictly one after another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use graft_core::{
    BatchDedup, ChunkGraph, Diagnostic, ExtractionUsage, GraftConfig, GraftError, GraftResult,
    GraphMetadata, KnowledgeGraph, Relationship,
};

use crate::registry::Registry;
use crate::resolver::CascadingResolver;
use crate::text::normalize;
use crate::types::IdRemap;

/// Statistics of one merge pass.
#[derive(Debug, Clone, Default)]
pub struct ReductionReport {
    pub rounds: usize,
    /// Pairwise merges scheduled in each round.
    pub merges_per_round: Vec<usize>,
    /// Highest number of merges running at once in each round.
    pub peak_concurrency_per_round: Vec<usize>,
    /// Batch-dedup calls across all merges.
    pub adjudication_calls: usize,
    /// Diagnostics in round order, then pair order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Merged graph plus pass statistics.
#[derive(Debug, Clone, Default)]
pub struct ReductionOutcome {
    pub graph: KnowledgeGraph,
    pub report: ReductionReport,
}

/// Result of merging two graphs.
#[derive(Debug, Clone, Default)]
pub struct PairMerge {
    pub graph: KnowledgeGraph,
    pub diagnostics: Vec<Diagnostic>,
    pub adjudication_calls: usize,
}

/// Parallel reduction merger.
///
/// Cheap to clone; clones share the resolver and its collaborator.
#[derive(Clone)]
pub struct ReductionMerger {
    resolver: Arc<CascadingResolver>,
    max_workers: usize,
}

impl ReductionMerger {
    /// Create a merger. `dedup` backs Layer 3 of every pairwise merge.
    ///
    /// Fails if `config` does not validate.
    pub fn new(config: GraftConfig, dedup: Option<Arc<dyn BatchDedup>>) -> GraftResult<Self> {
        config.validate()?;
        Ok(Self {
            resolver: Arc::new(CascadingResolver::new(&config, dedup)),
            max_workers: config.reduction.max_workers,
        })
    }

    /// Merge all chunk graphs into one knowledge graph.
    pub async fn merge_all(&self, chunk_graphs: Vec<ChunkGraph>) -> GraftResult<ReductionOutcome> {
        self.merge_all_with_cancel(chunk_graphs, CancellationToken::new())
            .await
    }

    /// Merge all chunk graphs, giving up as soon as `cancel` fires.
    ///
    /// On cancellation every in-flight merge is aborted and no partial graph
    /// is returned.
    pub async fn merge_all_with_cancel(
        &self,
        chunk_graphs: Vec<ChunkGraph>,
        cancel: CancellationToken,
    ) -> GraftResult<ReductionOutcome> {
        if cancel.is_cancelled() {
            return Err(GraftError::Cancelled);
        }

        let start = Instant::now();
        let chunk_count = chunk_graphs.len();
        let mut report = ReductionReport::default();
        let mut level: Vec<KnowledgeGraph> = chunk_graphs
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| prefix_chunk(index, chunk))
            .collect();

        let graph = match level.len() {
            0 => KnowledgeGraph::default(),
            1 => {
                let graph = level.remove(0);
                let remap = identity_remap(&graph);
                let relationships =
                    rewrite_relationships(graph.relationships, &remap, &mut report.diagnostics);
                KnowledgeGraph {
                    relationships,
                    ..graph
                }
            }
            _ => {
                let semaphore = Arc::new(Semaphore::new(self.max_workers));
                while level.len() > 1 {
                    level = self
                        .run_round(level, &semaphore, &cancel, &mut report)
                        .await?;
                }
                level.pop().unwrap_or_default()
            }
        };

        let graph = finalize(graph);
        tracing::info!(
            chunks = chunk_count,
            rounds = report.rounds,
            entities = graph.entity_count(),
            relationships = graph.relationship_count(),
            diagnostics = report.diagnostics.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Merge pass complete"
        );

        Ok(ReductionOutcome { graph, report })
    }

    /// Run one round: pair up the level, merge pairs concurrently and
    /// return the next level in pair order with any leftover last.
    async fn run_round(
        &self,
        level: Vec<KnowledgeGraph>,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
        report: &mut ReductionReport,
    ) -> GraftResult<Vec<KnowledgeGraph>> {
        let round = report.rounds + 1;
        let round_start = Instant::now();

        let mut pairs = Vec::with_capacity(level.len() / 2);
        let mut carried = None;
        let mut iter = level.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => pairs.push((left, right)),
                None => carried = Some(left),
            }
        }
        let merges = pairs.len();

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for (slot, (left, right)) in pairs.into_iter().enumerate() {
            let merger = self.clone();
            let semaphore = Arc::clone(semaphore);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(GraftError::internal("Worker pool closed")),
                };
                let running = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(running, Ordering::SeqCst);

                let merged = merger.merge_pair(left, right).await;

                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, GraftError>((slot, merged))
            });
        }

        let mut results: Vec<Option<PairMerge>> = (0..merges).map(|_| None).collect();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    tracing::info!(round, "Merge pass cancelled");
                    return Err(GraftError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok((slot, merged)))) => results[slot] = Some(merged),
                    Some(Ok(Err(e))) => {
                        tasks.abort_all();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        tasks.abort_all();
                        return Err(GraftError::internal(format!("Merge task failed: {}", e)));
                    }
                }
            }
        }

        let mut next = Vec::with_capacity(merges + 1);
        for merged in results.into_iter().flatten() {
            report.adjudication_calls += merged.adjudication_calls;
            report.diagnostics.extend(merged.diagnostics);
            next.push(merged.graph);
        }
        if next.len() != merges {
            return Err(GraftError::internal(format!(
                "Round {} finished with {} of {} merges",
                round,
                next.len(),
                merges
            )));
        }
        next.extend(carried);

        let peak = peak.load(Ordering::SeqCst);
        report.rounds = round;
        report.merges_per_round.push(merges);
        report.peak_concurrency_per_round.push(peak);

        tracing::info!(
            round,
            merges,
            peak_concurrency = peak,
            remaining = next.len(),
            elapsed_ms = round_start.elapsed().as_millis() as u64,
            "Reduction round complete"
        );

        Ok(next)
    }

    /// Merge two graphs with a fresh registry.
    ///
    /// Entity ids must already be unique across both graphs.
    pub async fn merge_pair(&self, left: KnowledgeGraph, right: KnowledgeGraph) -> PairMerge {
        let mut registry = Registry::new();

        let mut entities = left.entities;
        entities.extend(right.entities);
        let mut relationships = left.relationships;
        relationships.extend(right.relationships);

        let mut usage = left.metadata.usage;
        usage.accumulate(&right.metadata.usage);
        let chunk_count = left.metadata.chunk_count + right.metadata.chunk_count;

        let resolution = self.resolver.resolve(entities, &mut registry).await;
        let mut diagnostics = resolution.diagnostics;
        let relationships = rewrite_relationships(relationships, &resolution.remap, &mut diagnostics);

        PairMerge {
            graph: KnowledgeGraph {
                entities: resolution.entities,
                relationships,
                metadata: GraphMetadata {
                    document_ids: Vec::new(),
                    chunk_count,
                    usage,
                },
            },
            diagnostics,
            adjudication_calls: resolution.adjudication_calls,
        }
    }
}

/// Prefix every id of a chunk graph with `c{index}_`.
fn prefix_chunk(index: usize, chunk: ChunkGraph) -> KnowledgeGraph {
    let prefix = |id: &str| format!("c{}_{}", index, id);

    let entities = chunk
        .entities
        .into_iter()
        .map(|mut entity| {
            entity.id = prefix(&entity.id);
            entity
        })
        .collect();
    let relationships = chunk
        .relationships
        .into_iter()
        .map(|mut rel| {
            rel.id = prefix(&rel.id);
            rel.source_id = prefix(&rel.source_id);
            rel.target_id = prefix(&rel.target_id);
            rel
        })
        .collect();

    KnowledgeGraph {
        entities,
        relationships,
        metadata: GraphMetadata {
            document_ids: Vec::new(),
            chunk_count: 1,
            usage: chunk.usage.unwrap_or_default(),
        },
    }
}

fn identity_remap(graph: &KnowledgeGraph) -> IdRemap {
    let mut remap = IdRemap::new();
    for entity in &graph.entities {
        remap.insert(entity.id.clone(), entity.id.clone());
    }
    remap
}

fn record(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    diagnostic.emit();
    diagnostics.push(diagnostic);
}

/// Rewrite relationship endpoints through `remap`.
///
/// Relationships with an unmapped endpoint or that collapse onto a single
/// entity are dropped. Relationships with the same endpoints and
/// normalized type are folded into the first, keeping the highest
/// confidence.
fn rewrite_relationships(
    relationships: Vec<Relationship>,
    remap: &IdRemap,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Relationship> {
    let mut out: Vec<Relationship> = Vec::with_capacity(relationships.len());
    let mut seen: HashMap<(String, String, String), usize> = HashMap::new();

    for mut rel in relationships {
        let (source, target) = match (remap.apply(&rel.source_id), remap.apply(&rel.target_id)) {
            (Some(source), Some(target)) => (source, target),
            (source, _) => {
                let endpoint = if source.is_none() {
                    rel.source_id
                } else {
                    rel.target_id
                };
                record(
                    diagnostics,
                    Diagnostic::DanglingRelationship {
                        relationship_id: rel.id,
                        endpoint,
                    },
                );
                continue;
            }
        };

        if source == target {
            record(
                diagnostics,
                Diagnostic::SelfLoopDropped {
                    relationship_id: rel.id,
                },
            );
            continue;
        }

        let key = (source.clone(), target.clone(), normalize(&rel.relation_type));
        if let Some(&index) = seen.get(&key) {
            let kept = &mut out[index];
            kept.confidence = kept.confidence.max(rel.confidence);
            continue;
        }

        rel.source_id = source;
        rel.target_id = target;
        seen.insert(key, out.len());
        out.push(rel);
    }

    out
}

/// Fill in document metadata once the last round is done.
fn finalize(graph: KnowledgeGraph) -> KnowledgeGraph {
    let usage: ExtractionUsage = graph.metadata.usage;
    let metadata = GraphMetadata::collect(&graph.entities, graph.metadata.chunk_count, usage);
    KnowledgeGraph { metadata, ..graph }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::{Entity, EntityType};

    #[test]
    fn test_prefix_chunk() {
        let chunk = ChunkGraph::new(
            vec![
                Entity::new("e1", "Mutex", EntityType::Concept),
                Entity::new("e2", "Lock", EntityType::Concept),
            ],
            vec![Relationship::new("r1", "e1", "e2", "IsA")],
        )
        .with_usage(ExtractionUsage::new(10, 2));

        let graph = prefix_chunk(3, chunk);
        assert_eq!(graph.entities[0].id, "c3_e1");
        assert_eq!(graph.relationships[0].id, "c3_r1");
        assert_eq!(graph.relationships[0].source_id, "c3_e1");
        assert_eq!(graph.relationships[0].target_id, "c3_e2");
        assert_eq!(graph.metadata.chunk_count, 1);
        assert_eq!(graph.metadata.usage.total(), 12);
    }

    #[test]
    fn test_rewrite_drops_dangling_and_self_loops() {
        let mut remap = IdRemap::new();
        remap.insert("a", "a");
        remap.insert("b", "a");
        remap.insert("c", "c");

        let mut diagnostics = Vec::new();
        let out = rewrite_relationships(
            vec![
                Relationship::new("r1", "a", "b", "Is"),
                Relationship::new("r2", "a", "ghost", "Uses"),
                Relationship::new("r3", "b", "c", "Guards"),
            ],
            &remap,
            &mut diagnostics,
        );

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_id, "a");
        assert_eq!(out[0].target_id, "c");
        assert_eq!(
            diagnostics,
            vec![
                Diagnostic::SelfLoopDropped {
                    relationship_id: "r1".to_string()
                },
                Diagnostic::DanglingRelationship {
                    relationship_id: "r2".to_string(),
                    endpoint: "ghost".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_rewrite_collapses_parallel_edges() {
        let mut remap = IdRemap::new();
        for (from, to) in [("a", "a"), ("a2", "a"), ("c", "c")] {
            remap.insert(from, to);
        }

        let mut diagnostics = Vec::new();
        let out = rewrite_relationships(
            vec![
                Relationship::new("r1", "a", "c", "Guards").with_confidence(0.5),
                Relationship::new("r2", "a2", "c", "guards ").with_confidence(0.9),
                Relationship::new("r3", "a2", "c", "Precedes"),
            ],
            &remap,
            &mut diagnostics,
        );

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "r1");
        assert_eq!(out[0].confidence, 0.9);
        assert!(diagnostics.is_empty());
    }
}
