//! Error taxonomy of the analysis pipeline.
//!
//! Only [`IngestionError`] and the run-level variants of [`PipelineError`] abort a batch.
//! [`ModelUnavailableError`] triggers a component fallback and [`ItemAnalysisError`]
//! is recorded on the affected item while the run continues.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems while turning raw bytes into records.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// No candidate encoding decoded the input without corruption.
    #[error("could not detect encoding: {0}")]
    Encoding(String),

    /// The field delimiter is ambiguous or there is nothing to sample.
    #[error("could not detect delimiter: {0}")]
    Delimiter(String),

    /// No column looks like free text.
    #[error("no free-text column found ({0})")]
    NoTextColumn(String),

    /// A user-selected column does not exist in the header.
    #[error("column '{0}' not found in header")]
    UnknownColumn(String),

    /// The file has a header but no data rows (or no bytes at all).
    #[error("input contains no data rows")]
    Empty,

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A pretrained artifact is missing or unreadable.
#[derive(Error, Debug)]
pub enum ModelUnavailableError {
    #[error("{kind} artifact not found at {path}")]
    Missing { kind: &'static str, path: PathBuf },

    #[error("{kind} artifact at {path} is invalid: {reason}")]
    Invalid {
        kind: &'static str,
        path: PathBuf,
        reason: String,
    },
}

/// A single text could not be analyzed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemAnalysisError {
    #[error("malformed text: {0}")]
    Malformed(String),

    #[error("text too long: {0} chars (max: {1})")]
    TooLong(usize, usize),

    #[error("classifier failed: {0}")]
    Classifier(String),
}

/// Run-level failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error("analysis cancelled")]
    Cancelled,

    /// Every non-empty text failed analysis.
    #[error("no valid items: all {0} non-empty texts failed analysis")]
    NoValidItems(usize),

    /// The aggregator saw a missing or duplicated item id.
    #[error("aggregation error: {0}")]
    Aggregation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        PipelineError::Export(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Export(e.to_string())
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(e: toml::de::Error) -> Self {
        PipelineError::Config(e.to_string())
    }
}
