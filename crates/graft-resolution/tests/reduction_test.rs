//! Integration tests for the parallel reduction merger.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use graft_core::{
    BatchDedup, ChunkGraph, DedupRequest, DedupResolution, Diagnostic, Entity, EntityType,
    ExtractionUsage, GraftConfig, GraftError, GraftResult, Relationship, SourceRef,
};
use graft_resolution::ReductionMerger;
use tokio_util::sync::CancellationToken;

/// Says "new" to everything, after a delay, and records how many calls
/// overlapped.
#[derive(Default)]
struct CountingDedup {
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingDedup {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl BatchDedup for CountingDedup {
    async fn deduplicate(&self, request: &DedupRequest) -> GraftResult<Vec<DedupResolution>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(request
            .pending
            .iter()
            .map(|c| DedupResolution::new_entity(c.id.clone()))
            .collect())
    }
}

fn entity(id: &str, label: &str, doc: &str, chunk: usize) -> Entity {
    Entity::new(id, label, EntityType::Concept).with_source(SourceRef::new(doc, chunk))
}

/// Chunk `i` of a document about synchronization: one shared concept, one
/// chunk-specific low-entropy concept and an edge between them.
fn sync_chunk(i: usize) -> ChunkGraph {
    ChunkGraph::new(
        vec![
            entity("e1", "Critical Section", "os-book", i),
            entity("e2", &format!("Op{}", i), "os-book", i),
        ],
        vec![Relationship::new("r1", "e2", "e1", "Enters")],
    )
    .with_usage(ExtractionUsage::new(100, 10))
}

#[tokio::test]
async fn test_empty_and_single_input() {
    let merger = ReductionMerger::new(GraftConfig::default(), None).unwrap();

    let outcome = merger.merge_all(Vec::new()).await.unwrap();
    assert!(outcome.graph.is_empty());
    assert_eq!(outcome.report.rounds, 0);

    let chunk = ChunkGraph::new(
        vec![entity("e1", "Mutex", "doc", 0), entity("e2", "Thread", "doc", 0)],
        vec![
            Relationship::new("r1", "e2", "e1", "Acquires"),
            Relationship::new("r2", "e2", "e2", "Waits"),
            Relationship::new("r3", "e2", "e9", "Signals"),
        ],
    );
    let outcome = merger.merge_all(vec![chunk]).await.unwrap();

    assert_eq!(outcome.report.rounds, 0);
    assert_eq!(outcome.graph.entity("c0_e1").unwrap().label, "Mutex");
    assert_eq!(outcome.graph.relationship_count(), 1);
    assert_eq!(outcome.graph.relationships[0].source_id, "c0_e2");
    assert_eq!(outcome.graph.metadata.chunk_count, 1);
    assert_eq!(outcome.report.diagnostics.len(), 2);
}

/// Scenario A across chunks.
#[tokio::test]
async fn test_case_variants_across_chunks() {
    let merger = ReductionMerger::new(GraftConfig::default(), None).unwrap();
    let chunks = vec![
        ChunkGraph::new(vec![entity("e1", "Condition Variable", "doc", 0)], Vec::new()),
        ChunkGraph::new(vec![entity("e1", "condition variable", "doc", 1)], Vec::new()),
    ];

    let outcome = merger.merge_all(chunks).await.unwrap();
    assert_eq!(outcome.graph.entity_count(), 1);
    let merged = &outcome.graph.entities[0];
    assert_eq!(merged.id, "c0_e1");
    assert_eq!(merged.sources.len(), 2);
}

/// Scenario B across chunks, at the default threshold.
#[tokio::test]
async fn test_near_duplicates_across_chunks() {
    let merger = ReductionMerger::new(GraftConfig::default(), None).unwrap();
    let chunks = vec![
        ChunkGraph::new(vec![entity("e1", "Bounded Buffer Problem", "doc", 0)], Vec::new()),
        ChunkGraph::new(vec![entity("e1", "Bounded Buffer Problems", "doc", 1)], Vec::new()),
    ];

    let outcome = merger.merge_all(chunks).await.unwrap();
    assert_eq!(outcome.graph.entity_count(), 1);
    assert!(outcome.graph.entities[0]
        .aliases
        .contains("Bounded Buffer Problem"));
}

/// Scenario C across chunks.
#[tokio::test]
async fn test_low_entropy_names_stay_distinct() {
    let dedup = Arc::new(CountingDedup::default());
    let merger = ReductionMerger::new(GraftConfig::default(), Some(dedup.clone())).unwrap();
    let chunks = vec![
        ChunkGraph::new(vec![entity("e1", "Lock", "doc", 0)], Vec::new()),
        ChunkGraph::new(vec![entity("e1", "Mutex", "doc", 1)], Vec::new()),
    ];

    let outcome = merger.merge_all(chunks).await.unwrap();
    assert_eq!(outcome.graph.entity_count(), 2);
    assert_eq!(outcome.report.adjudication_calls, 1);
    assert_eq!(dedup.calls.load(Ordering::SeqCst), 1);
}

/// Scenario D: eight chunks, three rounds, bounded concurrency.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_eight_chunks_reduce_in_three_rounds() {
    let dedup = Arc::new(CountingDedup::with_delay(Duration::from_millis(50)));
    let merger = ReductionMerger::new(GraftConfig::default(), Some(dedup.clone())).unwrap();
    let chunks: Vec<ChunkGraph> = (0..8).map(sync_chunk).collect();

    let outcome = merger.merge_all(chunks).await.unwrap();
    let report = &outcome.report;

    assert_eq!(report.rounds, 3);
    assert_eq!(report.merges_per_round, vec![4, 2, 1]);
    assert!(report.peak_concurrency_per_round[0] <= 4);
    assert!(report.peak_concurrency_per_round.iter().all(|&p| p >= 1));
    assert!(dedup.peak.load(Ordering::SeqCst) <= 4);
    assert_eq!(report.adjudication_calls, 7);

    let graph = &outcome.graph;
    assert_eq!(graph.entity_count(), 9);
    assert_eq!(graph.relationship_count(), 8);
    assert!(graph.dangling_relationships().is_empty());

    let section = graph.find_by_label("critical section").unwrap();
    assert_eq!(section.id, "c0_e1");
    assert_eq!(section.sources.len(), 8);
    assert_eq!(graph.incoming(&section.id).len(), 8);

    assert_eq!(graph.metadata.chunk_count, 8);
    assert_eq!(graph.metadata.document_ids, vec!["os-book"]);
    assert_eq!(graph.metadata.usage, ExtractionUsage::new(800, 80));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_bounds_concurrency() {
    let dedup = Arc::new(CountingDedup::with_delay(Duration::from_millis(30)));
    let config = GraftConfig::builder().max_workers(2).build();
    let merger = ReductionMerger::new(config, Some(dedup.clone())).unwrap();
    let chunks: Vec<ChunkGraph> = (0..8).map(sync_chunk).collect();

    let outcome = merger.merge_all(chunks).await.unwrap();
    assert!(outcome.report.peak_concurrency_per_round.iter().all(|&p| p <= 2));
    assert!(dedup.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_odd_leftover_is_carried_forward() {
    let merger = ReductionMerger::new(GraftConfig::default(), None).unwrap();
    let chunks: Vec<ChunkGraph> = (0..5).map(sync_chunk).collect();

    let outcome = merger.merge_all(chunks).await.unwrap();
    assert_eq!(outcome.report.rounds, 3);
    assert_eq!(outcome.report.merges_per_round, vec![2, 1, 1]);
    assert_eq!(outcome.graph.entity_count(), 6);
    assert!(outcome.graph.dangling_relationships().is_empty());
}

#[tokio::test]
async fn test_merging_a_graph_with_itself() {
    let merger = ReductionMerger::new(GraftConfig::default(), None).unwrap();
    let chunks: Vec<ChunkGraph> = (0..4).map(sync_chunk).collect();
    let graph = merger.merge_all(chunks).await.unwrap().graph;

    let doubled = merger
        .merge_all(vec![graph.clone().into(), graph.clone().into()])
        .await
        .unwrap()
        .graph;

    assert_eq!(doubled.entity_count(), graph.entity_count());
    assert_eq!(doubled.relationship_count(), graph.relationship_count());
}

#[tokio::test]
async fn test_output_is_deterministic() {
    let merger = ReductionMerger::new(
        GraftConfig::default(),
        Some(Arc::new(CountingDedup::default())),
    )
    .unwrap();
    let chunks = || -> Vec<ChunkGraph> {
        let mut chunks: Vec<ChunkGraph> = (0..6).map(sync_chunk).collect();
        chunks.push(ChunkGraph::new(
            vec![
                entity("e1", "Semaphore", "notes", 0)
                    .with_alias("counting semaphore")
                    .with_definition("A counter guarding a pool of resources"),
                entity("e2", "Critical section", "notes", 0),
            ],
            vec![Relationship::new("r1", "e1", "e2", "Guards")],
        ));
        chunks
    };

    let first = merger.merge_all(chunks()).await.unwrap().graph;
    let second = merger.merge_all(chunks()).await.unwrap().graph;

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.metadata.document_ids, vec!["notes", "os-book"]);
}

#[tokio::test]
async fn test_dangling_relationships_are_dropped_with_diagnostic() {
    let merger = ReductionMerger::new(GraftConfig::default(), None).unwrap();
    let chunks = vec![
        ChunkGraph::new(
            vec![entity("e1", "Producer", "doc", 0)],
            vec![Relationship::new("r1", "e1", "e7", "Feeds")],
        ),
        ChunkGraph::new(vec![entity("e1", "Consumer", "doc", 1)], Vec::new()),
    ];

    let outcome = merger.merge_all(chunks).await.unwrap();
    assert_eq!(outcome.graph.relationship_count(), 0);
    assert_eq!(
        outcome.report.diagnostics,
        vec![Diagnostic::DanglingRelationship {
            relationship_id: "c0_r1".to_string(),
            endpoint: "c0_e7".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_timeout_degrades_instead_of_blocking() {
    let dedup = Arc::new(CountingDedup::with_delay(Duration::from_secs(10)));
    let config = GraftConfig::builder()
        .dedup_timeout(Duration::from_millis(50))
        .build();
    let merger = ReductionMerger::new(config, Some(dedup)).unwrap();
    let chunks = vec![
        ChunkGraph::new(vec![entity("e1", "Lock", "doc", 0)], Vec::new()),
        ChunkGraph::new(vec![entity("e1", "Mutex", "doc", 1)], Vec::new()),
    ];

    let outcome = merger.merge_all(chunks).await.unwrap();
    assert_eq!(outcome.graph.entity_count(), 2);
    assert!(matches!(
        outcome.report.diagnostics[..],
        [Diagnostic::DedupTimeout { pending: 2, .. }]
    ));
}

#[tokio::test]
async fn test_cancellation_returns_no_graph() {
    let dedup = Arc::new(CountingDedup::with_delay(Duration::from_secs(10)));
    let merger = ReductionMerger::new(GraftConfig::default(), Some(dedup.clone())).unwrap();
    let chunks: Vec<ChunkGraph> = (0..4).map(sync_chunk).collect();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = merger.merge_all_with_cancel(chunks, cancel).await;
    assert!(matches!(result, Err(GraftError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(5));

    // Round 1 had two merges; aborted merges never finish and round 2
    // never starts.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(dedup.calls.load(Ordering::SeqCst), 2);

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let result = merger
        .merge_all_with_cancel(vec![sync_chunk(0)], cancelled)
        .await;
    assert!(matches!(result, Err(GraftError::Cancelled)));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = GraftConfig::builder().definition_cap(0).build();
    assert!(matches!(
        ReductionMerger::new(config, None),
        Err(GraftError::Configuration(_))
    ));

    let config = GraftConfig::builder().max_workers(0).build();
    assert!(ReductionMerger::new(config, None).is_err());
}
