//! Entropy gate for fuzzy matching.
//!
//! Short, repetitive names ("Lock", "AAAA") produce shingle sets too small
//! to separate unrelated concepts, so they never enter Layer 2.

use std::collections::HashMap;

use graft_core::EntropyGateConfig;

use super::normalize::{normalize_fuzzy, token_count};

/// Shannon entropy, in bits per character, of `text` with spaces removed.
///
/// Returns 0.0 for empty input.
pub fn shannon_entropy(text: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Decides whether a name carries enough information for fuzzy matching.
#[derive(Debug, Clone)]
pub struct EntropyGate {
    config: EntropyGateConfig,
}

impl EntropyGate {
    pub fn new(config: EntropyGateConfig) -> Self {
        Self { config }
    }

    /// True if `name` may take part in shingle matching.
    pub fn is_high_entropy(&self, name: &str) -> bool {
        let normalized = normalize_fuzzy(name);
        let length = normalized.chars().count();

        if length < self.config.min_name_length && token_count(&normalized) < self.config.min_token_count {
            return false;
        }

        shannon_entropy(&normalized) >= self.config.entropy_threshold
    }
}

impl Default for EntropyGate {
    fn default() -> Self {
        Self::new(EntropyGateConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy() {
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
        assert!((shannon_entropy("ab") - 1.0).abs() < 1e-9);
        assert!((shannon_entropy("abcd") - 2.0).abs() < 1e-9);
        // Spaces are ignored.
        assert!((shannon_entropy("a b") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_single_token_names_are_low_entropy() {
        let gate = EntropyGate::default();
        assert!(!gate.is_high_entropy("Lock"));
        assert!(!gate.is_high_entropy("Mutex"));
        assert!(!gate.is_high_entropy("CPU"));
    }

    #[test]
    fn test_repetitive_names_are_low_entropy() {
        let gate = EntropyGate::default();
        assert!(!gate.is_high_entropy("aaaaaaaaaa"));
        assert!(!gate.is_high_entropy("abababab"));
    }

    #[test]
    fn test_descriptive_names_are_high_entropy() {
        let gate = EntropyGate::default();
        assert!(gate.is_high_entropy("Bounded Buffer Problem"));
        assert!(gate.is_high_entropy("Semaphore"));
        // Two tokens pass the length check even when short.
        assert!(gate.is_high_entropy("IO Bus"));
    }
}
