//! Configuration system for graft.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GraftError, GraftResult};

/// Entropy gate thresholds.
///
/// Names that fail the gate never take part in fuzzy matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyGateConfig {
    /// Minimum Shannon entropy (bits per character) of a fuzzy-matchable name.
    pub entropy_threshold: f64,
    /// Names shorter than this...
    pub min_name_length: usize,
    /// ...with fewer tokens than this are rejected outright.
    pub min_token_count: usize,
}

impl Default for EntropyGateConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: 1.5,
            min_name_length: 6,
            min_token_count: 2,
        }
    }
}

/// Shingle-based fuzzy matching (Layer 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Minimum 3-gram Jaccard similarity to merge. Default: 0.9
    pub jaccard_threshold: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            jaccard_threshold: 0.9,
        }
    }
}

/// Batch adjudication (Layer 3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjudicationConfig {
    /// Whether to call the batch-dedup collaborator at all.
    pub enabled: bool,
    /// Upper bound on the collaborator call.
    pub timeout_ms: u64,
    /// Characters of each definition included in a request.
    pub definition_preview_chars: usize,
}

impl Default for AdjudicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 30_000,
            definition_preview_chars: 120,
        }
    }
}

impl AdjudicationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Canonical entity construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalConfig {
    /// Maximum characters of a merged definition.
    pub definition_cap: usize,
    /// Joins distinct member definitions.
    pub definition_separator: String,
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            definition_cap: 500,
            definition_separator: " | ".to_string(),
        }
    }
}

/// Parallel reduction scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Size of the worker pool that runs the merges of one round.
    pub max_workers: usize,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

/// Main graft configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraftConfig {
    pub gate: EntropyGateConfig,
    pub fuzzy: FuzzyConfig,
    pub adjudication: AdjudicationConfig,
    pub canonical: CanonicalConfig,
    pub reduction: ReductionConfig,
    /// Let aliases claim exact-match keys for their canonical entity.
    pub index_aliases: bool,
}

impl Default for GraftConfig {
    fn default() -> Self {
        Self {
            gate: EntropyGateConfig::default(),
            fuzzy: FuzzyConfig::default(),
            adjudication: AdjudicationConfig::default(),
            canonical: CanonicalConfig::default(),
            reduction: ReductionConfig::default(),
            index_aliases: true,
        }
    }
}

impl GraftConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> GraftResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| GraftError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| GraftError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| GraftError::Configuration(e.to_string()))?,
            _ => {
                return Err(GraftError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `GRAFT_ENTROPY_THRESHOLD` (default: 1.5)
    /// - `GRAFT_JACCARD_THRESHOLD` (default: 0.9)
    /// - `GRAFT_MAX_WORKERS` (default: 4)
    /// - `GRAFT_DEDUP_TIMEOUT_MS` (default: 30000)
    /// - `GRAFT_DEFINITION_CAP` (default: 500)
    /// - `GRAFT_DISABLE_LLM_LAYER` (set to disable Layer 3)
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("GRAFT_ENTROPY_THRESHOLD") {
            config.gate.entropy_threshold = v;
        }
        if let Some(v) = env_parse("GRAFT_JACCARD_THRESHOLD") {
            config.fuzzy.jaccard_threshold = v;
        }
        if let Some(v) = env_parse("GRAFT_MAX_WORKERS") {
            config.reduction.max_workers = v;
        }
        if let Some(v) = env_parse("GRAFT_DEDUP_TIMEOUT_MS") {
            config.adjudication.timeout_ms = v;
        }
        if let Some(v) = env_parse("GRAFT_DEFINITION_CAP") {
            config.canonical.definition_cap = v;
        }
        if std::env::var("GRAFT_DISABLE_LLM_LAYER").is_ok() {
            config.adjudication.enabled = false;
        }

        config
    }

    /// Check that every threshold is in range.
    pub fn validate(&self) -> GraftResult<()> {
        if !(0.0..=1.0).contains(&self.fuzzy.jaccard_threshold) {
            return Err(GraftError::Configuration(format!(
                "fuzzy.jaccard_threshold must be within [0, 1], got {}",
                self.fuzzy.jaccard_threshold
            )));
        }
        if !self.gate.entropy_threshold.is_finite() || self.gate.entropy_threshold < 0.0 {
            return Err(GraftError::Configuration(format!(
                "gate.entropy_threshold must be a non-negative number, got {}",
                self.gate.entropy_threshold
            )));
        }
        if self.reduction.max_workers == 0 {
            return Err(GraftError::Configuration(
                "reduction.max_workers must be at least 1".to_string(),
            ));
        }
        if self.canonical.definition_cap == 0 {
            return Err(GraftError::Configuration(
                "canonical.definition_cap must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> GraftConfigBuilder {
        GraftConfigBuilder::default()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Builder for GraftConfig.
#[derive(Default)]
pub struct GraftConfigBuilder {
    config: GraftConfig,
}

impl GraftConfigBuilder {
    /// Set the entropy gate threshold in bits.
    pub fn entropy_threshold(mut self, bits: f64) -> Self {
        self.config.gate.entropy_threshold = bits;
        self
    }

    /// Set the Layer 2 Jaccard threshold.
    pub fn jaccard_threshold(mut self, threshold: f64) -> Self {
        self.config.fuzzy.jaccard_threshold = threshold;
        self
    }

    /// Enable or disable Layer 3.
    pub fn adjudication(mut self, enabled: bool) -> Self {
        self.config.adjudication.enabled = enabled;
        self
    }

    /// Set the batch-dedup timeout.
    pub fn dedup_timeout(mut self, timeout: Duration) -> Self {
        self.config.adjudication.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the merged definition cap.
    pub fn definition_cap(mut self, cap: usize) -> Self {
        self.config.canonical.definition_cap = cap;
        self
    }

    /// Set the worker pool size.
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.reduction.max_workers = workers;
        self
    }

    /// Enable or disable alias indexing.
    pub fn index_aliases(mut self, enabled: bool) -> Self {
        self.config.index_aliases = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GraftConfig {
        self.config
    }
}
