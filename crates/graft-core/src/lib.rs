//! # graft-core
//!
//! Core types, traits and configuration for graft, a knowledge-graph
//! entity resolution and merge engine.
//!
//! This crate provides:
//! - The graph data model (`Entity`, `Relationship`, `ChunkGraph`, `KnowledgeGraph`)
//! - Collaborator traits (`BatchDedup`, `Llm`)
//! - Error types and non-fatal diagnostics
//! - Configuration and logging setup

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::{
    AdjudicationConfig, CanonicalConfig, EntropyGateConfig, FuzzyConfig, GraftConfig,
    GraftConfigBuilder, ReductionConfig,
};
pub use diagnostics::{Diagnostic, Severity};
pub use error::{ErrorCode, GraftError, GraftResult};
pub use traits::*;
pub use types::*;
