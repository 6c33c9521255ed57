//! Tunable constants of the pipeline.
//!
//! Every threshold lives here instead of being hard-coded in the components, so a
//! run can be re-tuned from a TOML file without rebuilding:
//!
//! ```toml
//! [reconcile]
//! lexical_min_confidence = 0.25
//!
//! [topics]
//! min_topic_size = 3
//! seed = 7
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Ingestor heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Lines sampled for delimiter detection.
    pub sample_lines: usize,
    /// Data rows sampled for text-column detection.
    pub column_sample_rows: usize,
    /// Values shorter than this (in chars) are ignored when scoring a column.
    pub min_value_chars: usize,
    /// Values longer than this (in chars) are ignored when scoring a column.
    pub max_value_chars: usize,
    /// Minimum average length for a column to count as free text.
    pub min_avg_chars: f64,
    /// Minimum average word count for a column to count as free text.
    pub min_avg_words: f64,
    /// Share of corrupted chars tolerated when probing an encoding.
    pub corruption_tolerance: f64,
    /// Share of sampled rows that must agree on the column count.
    pub min_delimiter_consistency: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sample_lines: 20,
            column_sample_rows: 500,
            min_value_chars: 5,
            max_value_chars: 10_000,
            min_avg_chars: 10.0,
            min_avg_words: 2.0,
            corruption_tolerance: 0.005,
            min_delimiter_consistency: 0.6,
        }
    }
}

/// Weights of the rule-based polarity scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconConfig {
    pub positive_weight: f64,
    pub negated_positive_weight: f64,
    pub negative_weight: f64,
    pub negated_negative_weight: f64,
    /// Multiplier applied when an intensifier modifies a polar word.
    pub intensifier_factor: f64,
    /// How many preceding tokens a negation reaches.
    pub negation_window: usize,
    /// Gain applied after sqrt length normalisation.
    pub normalization_gain: f64,
    /// Longer texts are rejected as an item error.
    pub max_text_chars: usize,
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            positive_weight: 0.7,
            negated_positive_weight: -0.5,
            negative_weight: -0.8,
            negated_negative_weight: 0.4,
            intensifier_factor: 1.4,
            negation_window: 5,
            normalization_gain: 1.8,
            max_text_chars: 20_000,
        }
    }
}

/// Reconciliation policy between the lexical and the model signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Scores strictly above are positive.
    pub positive_threshold: f64,
    /// Scores strictly below are negative.
    pub negative_threshold: f64,
    /// Below this lexical confidence the model result is authoritative.
    pub lexical_min_confidence: f64,
    /// Confidences closer than this count as a tie (model wins).
    pub confidence_epsilon: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            positive_threshold: 0.2,
            negative_threshold: -0.2,
            lexical_min_confidence: 0.3,
            confidence_epsilon: 0.05,
        }
    }
}

/// Corpus-level topic discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Below this many analyzable texts clustering is skipped.
    pub min_corpus_size: usize,
    /// Upper bound for the DBSCAN `min_samples` / minimum cluster size.
    pub min_topic_size: usize,
    /// Representative terms kept per topic.
    pub top_k: usize,
    /// Embeddings wider than this are randomly projected down to it.
    pub reduce_to: usize,
    pub min_eps: f32,
    pub max_eps: f32,
    /// Multiplier on the median k-distance when choosing eps.
    pub eps_scale: f32,
    /// Seed of every randomized step.
    pub seed: u64,
    /// Largest number of texts clustered directly; above it a seeded sample is
    /// clustered and the remaining texts join their nearest clustered neighbour.
    pub max_topic_items: usize,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            min_corpus_size: 5,
            min_topic_size: 5,
            top_k: 5,
            reduce_to: 48,
            min_eps: 0.05,
            max_eps: 0.6,
            eps_scale: 1.5,
            seed: 42,
            max_topic_items: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub lexicon: LexiconConfig,
    pub reconcile: ReconcileConfig,
    pub topics: TopicConfig,
}

impl PipelineConfig {
    /// Load a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        let r = &self.reconcile;
        if !(r.negative_threshold < r.positive_threshold) {
            return Err(PipelineError::Config(
                "negative_threshold must be below positive_threshold".to_string(),
            ));
        }
        if r.positive_threshold.abs() > 1.0 || r.negative_threshold.abs() > 1.0 {
            return Err(PipelineError::Config(
                "sentiment thresholds must lie within -1..1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&r.lexical_min_confidence) || r.confidence_epsilon < 0.0 {
            return Err(PipelineError::Config(
                "confidence settings must lie within 0..1".to_string(),
            ));
        }
        let t = &self.topics;
        if t.min_corpus_size < 2 {
            return Err(PipelineError::Config(
                "min_corpus_size must be at least 2".to_string(),
            ));
        }
        if t.max_topic_items < t.min_corpus_size {
            return Err(PipelineError::Config(
                "max_topic_items must not be below min_corpus_size".to_string(),
            ));
        }
        if t.min_topic_size < 2 {
            return Err(PipelineError::Config(
                "min_topic_size must be at least 2".to_string(),
            ));
        }
        if t.top_k == 0 || t.reduce_to == 0 {
            return Err(PipelineError::Config(
                "top_k and reduce_to must be greater than 0".to_string(),
            ));
        }
        if !(t.min_eps > 0.0 && t.min_eps <= t.max_eps) {
            return Err(PipelineError::Config(
                "eps bounds must satisfy 0 < min_eps <= max_eps".to_string(),
            ));
        }
        if self.ingest.sample_lines == 0 || self.ingest.column_sample_rows == 0 {
            return Err(PipelineError::Config(
                "sample sizes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
