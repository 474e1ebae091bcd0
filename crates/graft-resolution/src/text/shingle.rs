//! Character 3-gram shingling and Jaccard similarity.

use std::collections::HashSet;

use super::normalize::normalize_fuzzy;

/// Shingle width in characters.
pub const SHINGLE_SIZE: usize = 3;

/// Precomputed set of contiguous 3-character shingles of a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShingleSet {
    shingles: HashSet<String>,
}

impl ShingleSet {
    /// Shingle the fuzzy-normalized form of `name`.
    pub fn from_name(name: &str) -> Self {
        let chars: Vec<char> = normalize_fuzzy(name).chars().collect();
        let shingles = chars
            .windows(SHINGLE_SIZE)
            .map(|w| w.iter().collect::<String>())
            .collect();
        Self { shingles }
    }

    pub fn len(&self) -> usize {
        self.shingles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shingles.is_empty()
    }

    /// Jaccard similarity with another set; 0.0 if either is empty.
    pub fn jaccard(&self, other: &ShingleSet) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }
        let intersection = self.shingles.intersection(&other.shingles).count();
        let union = self.len() + other.len() - intersection;
        intersection as f64 / union as f64
    }
}

/// Jaccard similarity of the shingle sets of two names.
pub fn jaccard(a: &str, b: &str) -> f64 {
    ShingleSet::from_name(a).jaccard(&ShingleSet::from_name(b))
}
