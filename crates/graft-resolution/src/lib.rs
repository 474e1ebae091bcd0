//! # graft-resolution
//!
//! Entity resolution and graph merging for graft.
//!
//! - [`CascadingResolver`]: places entities via exact, fuzzy and batch
//!   adjudication layers against a scoped [`Registry`]
//! - [`MergeEngine`]: folds duplicate groups into canonical entities
//! - [`ReductionMerger`]: merges N chunk graphs in ⌈log2 N⌉ parallel rounds
//! - [`LlmBatchDedup`]: a [`BatchDedup`](graft_core::BatchDedup) backed by an LLM
//!
//! ```no_run
//! use graft_core::{ChunkGraph, GraftConfig};
//! use graft_resolution::ReductionMerger;
//!
//! # async fn run(chunks: Vec<ChunkGraph>) -> graft_core::GraftResult<()> {
//! let merger = ReductionMerger::new(GraftConfig::from_env(), None)?;
//! let outcome = merger.merge_all(chunks).await?;
//! println!("{}", outcome.graph.summary());
//! # Ok(())
//! # }
//! ```

pub mod canonical;
pub mod layers;
pub mod llm_dedup;
pub mod reduction;
pub mod registry;
pub mod resolver;
pub mod text;
pub mod types;

pub use canonical::{EntityGroup, MergeEngine};
pub use llm_dedup::LlmBatchDedup;
pub use reduction::{PairMerge, ReductionMerger, ReductionOutcome, ReductionReport};
pub use registry::Registry;
pub use resolver::CascadingResolver;
pub use text::{jaccard, normalize, shannon_entropy, EntropyGate, ShingleSet};
pub use types::{IdRemap, LayerTimings, Resolution, ResolutionDecision, ResolutionLayer};
