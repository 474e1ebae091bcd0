//! Resolution layers, ordered by cost:
//!
//! 1. Exact (~µs) - normalized label lookup
//! 2. Fuzzy (~µs per entry) - entropy-gated 3-gram Jaccard
//! 3. Adjudication (one external call per pass) - batch dedup collaborator

pub mod adjudication;
pub mod exact;
pub mod fuzzy;

pub use adjudication::{AdjudicationLayer, AdjudicationResult};
pub use exact::ExactMatchLayer;
pub use fuzzy::{FuzzyMatchLayer, FuzzyResult};
