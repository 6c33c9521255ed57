#![forbid(unsafe_code)]
//! # opinion_analysis
//!
//! Hybrid sentiment and topic analysis for batches of short Hungarian free-text
//! entries, such as survey answers exported from a spreadsheet.
//!
//! The pipeline:
//! 1. [`ingest`] decodes the file (UTF-8 or a legacy Central European code page),
//!    detects the delimiter and the free-text column.
//! 2. [`linguistic`] tokenizes, tags and parses every text and derives a
//!    deterministic lexical polarity.
//! 3. [`reconcile`] combines the lexical signal with the sentiment classifier.
//! 4. [`topics`] clusters sentence embeddings of the whole corpus.
//! 5. [`report`] restores input order and aggregates corpus statistics;
//!    [`export`] renders them.
//!
//! Pretrained artifacts are optional; see [`models`] for the fallbacks.
//!
//! ```no_run
//! use opinion_analysis::{AnalysisOptions, CancelToken, ModelStore, analyze_texts};
//!
//! let models = ModelStore::new("models");
//! let report = analyze_texts(
//!     &["Nagyon elégedett vagyok a szolgáltatással."],
//!     &models,
//!     &AnalysisOptions::default(),
//!     &CancelToken::new(),
//! )
//! .unwrap();
//! println!("{}", report.items()[0].sentiment.label);
//! ```

pub mod classifier;
pub mod config;
pub mod embedding;
pub mod error;
pub mod export;
pub mod ingest;
pub mod lexicon;
pub mod linguistic;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod topics;

pub use config::PipelineConfig;
pub use error::{IngestionError, ItemAnalysisError, ModelUnavailableError, PipelineError};
pub use export::{ExportFormat, csv_safe_cell, export_report, render_summary};
pub use models::{Capabilities, ModelStore};
pub use pipeline::{
    AnalysisOptions, AnalysisRun, CancelToken, FileReport, analyze_bytes, analyze_path,
    analyze_texts, collect_files, load_stopwords, print_failed_files,
};
pub use reconcile::{SentimentLabel, SentimentResult, SentimentSource};
pub use report::{CorpusStats, ReportItem, ReportModel};
pub use topics::{TopicAssignment, TopicStatus};
