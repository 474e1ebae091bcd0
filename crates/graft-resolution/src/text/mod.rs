//! Text primitives used by the resolver: normalization, entropy and shingles.

mod entropy;
mod normalize;
mod shingle;

pub use entropy::{shannon_entropy, EntropyGate};
pub use normalize::{normalize, normalize_fuzzy, token_count};
pub use shingle::{jaccard, ShingleSet, SHINGLE_SIZE};
