//! End-to-end analysis: ingest -> per-item analysis -> topics -> report.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use log::{debug, info, warn};
use rayon::prelude::*;
use walkdir::WalkDir;
use whatlang::Lang;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::export::{ExportFormat, export_report, render_summary};
use crate::ingest::{Ingested, RawRecord, SourceRow, delimiter_name, ingest};
use crate::lexicon::Lexicon;
use crate::linguistic::{LinguisticAnalyzer, LinguisticAnnotation, clean_text};
use crate::models::ModelStore;
use crate::reconcile::{Reconciler, SentimentResult};
use crate::report::{ItemOutcome, LinguisticSummary, ReportBuilder, ReportMetadata, ReportModel};
use crate::topics::{TopicDiscoverer, TopicDocument};

/// Cooperative cancellation flag, checked between items and before topic discovery.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Options shared by the library entry points and the CLI.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub export_format: ExportFormat,
    /// Text column name; detected when `None`.
    pub column: Option<String>,
    /// Additional stop words, one per line.
    pub stopwords: Option<PathBuf>,
    pub config: PipelineConfig,
    /// Worker threads for the per-item stage; rayon's default when `None`.
    pub threads: Option<usize>,
    /// Where exports are written; the current directory when `None`.
    pub output_dir: Option<PathBuf>,
}

/// Result of analyzing one input file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub report: ReportModel,
    pub exported: Vec<PathBuf>,
    pub summary: String,
}

/// Result of [`analyze_path`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisRun {
    pub reports: Vec<FileReport>,
    /// `(path, error)` of every file that could not be analyzed.
    pub failed_files: Vec<(String, String)>,
}

/// Read a stop word file (one word per line, `#` starts a comment).
pub fn load_stopwords(path: &Path) -> Result<Vec<String>, PipelineError> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_lowercase)
        .collect())
}

/// Supported input files under `path` (a file is returned as is), sorted.
pub fn collect_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .map(|x| matches!(x.to_ascii_lowercase().as_str(), "csv" | "tsv" | "txt"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Print failed files to stderr.
pub fn print_failed_files(failed: &[(String, String)]) {
    eprintln!("\nSome files could not be analyzed:");
    for (path, err) in failed {
        eprintln!("  {path}: {err}");
    }
}

/// Analyze a file or every supported file in a directory, exporting each report.
///
/// A missing path is an error; inside a directory, files that fail are collected in
/// [`AnalysisRun::failed_files`] and the remaining files are still analyzed.
pub fn analyze_path(
    path: &Path,
    models: &ModelStore,
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> Result<AnalysisRun, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }
    let out_dir = match &options.output_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    let mut run = AnalysisRun::default();
    for file in collect_files(path) {
        cancel.check()?;
        match analyze_file(&file, models, options, cancel, &out_dir) {
            Ok(report) => run.reports.push(report),
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) if path.is_file() => return Err(e),
            Err(e) => {
                warn!("Skipping {}: {e}", file.display());
                run.failed_files.push((file.display().to_string(), e.to_string()));
            }
        }
    }
    Ok(run)
}

fn analyze_file(
    file: &Path,
    models: &ModelStore,
    options: &AnalysisOptions,
    cancel: &CancelToken,
    out_dir: &Path,
) -> Result<FileReport, PipelineError> {
    info!("Analyzing {}", file.display());
    let bytes = fs::read(file)?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let report = analyze_bytes(&bytes, &name, models, options, cancel)?;

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let exported = export_report(&report, &stem, options.export_format, out_dir)?;
    for p in &exported {
        info!("Wrote {}", p.display());
    }
    let summary = render_summary(&report);
    Ok(FileReport {
        path: file.to_path_buf(),
        report,
        exported,
        summary,
    })
}

/// Analyze the raw bytes of one delimited file.
pub fn analyze_bytes(
    bytes: &[u8],
    source_name: &str,
    models: &ModelStore,
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> Result<ReportModel, PipelineError> {
    options.config.validate()?;
    let ingested = ingest(bytes, options.column.as_deref(), &options.config.ingest)?;
    run_pipeline(ingested, source_name, models, options, cancel)
}

/// Analyze in-memory texts as if they were the rows of a one-column file.
pub fn analyze_texts<S: AsRef<str>>(
    texts: &[S],
    models: &ModelStore,
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> Result<ReportModel, PipelineError> {
    options.config.validate()?;
    let records = texts
        .iter()
        .enumerate()
        .map(|(id, t)| RawRecord {
            id,
            source_row: SourceRow {
                line: id as u64 + 2,
                values: vec![t.as_ref().to_string()],
            },
            text: t.as_ref().to_string(),
        })
        .collect();
    let ingested = Ingested {
        encoding: "UTF-8",
        delimiter: b',',
        headers: vec!["text".to_string()],
        text_column: 0,
        records,
    };
    run_pipeline(ingested, "texts", models, options, cancel)
}

fn effective_lexicon(
    models: &ModelStore,
    options: &AnalysisOptions,
) -> Result<Arc<Lexicon>, PipelineError> {
    let base = models.lexicon();
    let Some(path) = &options.stopwords else {
        return Ok(base);
    };
    let words = load_stopwords(path)?;
    debug!("Loaded {} extra stop words", words.len());
    let mut lexicon = (*base).clone();
    lexicon.add_stop_words(words);
    Ok(Arc::new(lexicon))
}

/// Dominant language of the corpus, detected on up to 200 texts.
fn detect_language(records: &[RawRecord]) -> Option<Lang> {
    let sample: String = records
        .iter()
        .filter(|r| !r.text.trim().is_empty())
        .take(200)
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    whatlang::detect(&sample).map(|info| info.lang())
}

fn run_pipeline(
    ingested: Ingested,
    source_name: &str,
    models: &ModelStore,
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> Result<ReportModel, PipelineError> {
    let cfg = &options.config;
    let lexicon = effective_lexicon(models, options)?;
    let analyzer = LinguisticAnalyzer::new(
        models.linguistic_model(),
        lexicon.clone(),
        cfg.lexicon.clone(),
    );
    let reconciler = Reconciler::new(models.classifier(), cfg.reconcile.clone());
    let capabilities = models.capabilities();
    if !reconciler.has_classifier() {
        warn!("No sentiment classifier available, scoring with the lexicon only");
    }

    let language = detect_language(&ingested.records);
    match language {
        Some(Lang::Hun) | None => {}
        Some(other) => warn!(
            "Corpus language looks like {} rather than Hungarian; lexical scores may be unreliable",
            other.eng_name()
        ),
    }

    let per_item = || -> Result<Vec<(ItemOutcome, TopicDocument)>, PipelineError> {
        ingested
            .records
            .par_iter()
            .map(|record| -> Result<_, PipelineError> {
                cancel.check()?;
                Ok(analyze_item(record, &analyzer, &reconciler))
            })
            .collect()
    };
    let analyzed = match options.threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| PipelineError::Config(format!("thread pool: {e}")))?
            .install(per_item)?,
        None => per_item()?,
    };

    let non_empty = ingested
        .records
        .iter()
        .filter(|r| !r.text.trim().is_empty())
        .count();
    let failed = analyzed.iter().filter(|(o, _)| o.error.is_some()).count();
    if non_empty > 0 && failed == non_empty {
        return Err(PipelineError::NoValidItems(non_empty));
    }
    if failed > 0 {
        warn!("{failed} of {} items could not be analyzed", analyzed.len());
    }

    cancel.check()?;
    let embedder = models.embedder();
    let embedding_source = embedder.name().to_string();
    let discoverer = TopicDiscoverer::new(embedder, lexicon, cfg.topics.clone());

    let text_column = ingested.text_column_name().to_string();
    let mut builder = ReportBuilder::new(ingested.records);
    let mut documents = Vec::with_capacity(analyzed.len());
    for (outcome, doc) in analyzed {
        builder.add(outcome)?;
        documents.push(doc);
    }
    let topics = discoverer.discover(&documents);

    let metadata = ReportMetadata {
        source_name: source_name.to_string(),
        encoding: ingested.encoding.to_string(),
        delimiter: delimiter_name(ingested.delimiter).to_string(),
        text_column,
        headers: ingested.headers,
        generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        language: language.map(|l| l.code().to_string()),
        capabilities,
        embedding_source,
        topic_status: topics.status.clone(),
    };
    builder.build(metadata, topics)
}

fn analyze_item(
    record: &RawRecord,
    analyzer: &LinguisticAnalyzer,
    reconciler: &Reconciler,
) -> (ItemOutcome, TopicDocument) {
    let cleaned = clean_text(&record.text);
    let cfg = reconciler.config();
    match analyzer.analyze(&cleaned) {
        Ok(annotation) => {
            let sentiment = reconciler.reconcile(&cleaned, &annotation);
            let linguistics = LinguisticSummary::from_annotation(
                &annotation,
                cfg.positive_threshold,
                cfg.negative_threshold,
            );
            let doc = TopicDocument {
                text: cleaned,
                terms: annotation.terms.clone(),
            };
            (
                ItemOutcome {
                    id: record.id,
                    sentiment,
                    annotation,
                    linguistics,
                    error: None,
                },
                doc,
            )
        }
        Err(e) => {
            warn!("Item {} (line {}): {e}", record.id, record.source_row.line);
            (
                ItemOutcome {
                    id: record.id,
                    sentiment: SentimentResult::failed(&e),
                    annotation: LinguisticAnnotation::empty(),
                    linguistics: LinguisticSummary::default(),
                    error: Some(e),
                },
                TopicDocument::default(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{SentimentLabel, SentimentSource};

    fn store() -> (tempfile::TempDir, ModelStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn example_rows_are_labelled() {
        let (_dir, models) = store();
        let texts = [
            "Nagyon elégedett vagyok a szolgáltatással.",
            "Szörnyű volt az egész, soha többé.",
            "",
        ];
        let report =
            analyze_texts(&texts, &models, &AnalysisOptions::default(), &CancelToken::new())
                .unwrap();
        let labels: Vec<SentimentLabel> =
            report.items().iter().map(|i| i.sentiment.label).collect();
        assert_eq!(
            labels,
            vec![
                SentimentLabel::Positive,
                SentimentLabel::Negative,
                SentimentLabel::Neutral
            ]
        );
        assert_eq!(report.items()[2].sentiment.confidence, 0.0);
        assert!(
            report
                .items()
                .iter()
                .all(|i| i.sentiment.source == SentimentSource::LexicalOnly)
        );
        assert!(report.metadata().topic_status.is_skipped());
    }

    #[test]
    fn cancelled_run_stops() {
        let (_dir, models) = store();
        let cancel = CancelToken::new();
        cancel.cancel();
        let res = analyze_texts(&["jó"], &models, &AnalysisOptions::default(), &cancel);
        assert!(matches!(res, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn all_items_failing_is_fatal() {
        let (_dir, models) = store();
        let res = analyze_texts(
            &["rossz\0", "jó\0"],
            &models,
            &AnalysisOptions::default(),
            &CancelToken::new(),
        );
        assert!(matches!(res, Err(PipelineError::NoValidItems(2))));
    }

    #[test]
    fn failed_item_is_kept_in_report() {
        let (_dir, models) = store();
        let report = analyze_texts(
            &["Nagyon jó volt.", "hibás\0sor"],
            &models,
            &AnalysisOptions::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(report.items().len(), 2);
        assert_eq!(report.items()[1].sentiment.source, SentimentSource::Failed);
        assert!(report.items()[1].error.is_some());
        assert_eq!(report.corpus_stats().error_count, 1);
    }

    #[test]
    fn stopwords_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop.txt");
        fs::write(&path, "# comment\nVonat\n\n  busz \n").unwrap();
        assert_eq!(load_stopwords(&path).unwrap(), vec!["vonat", "busz"]);
    }
}
