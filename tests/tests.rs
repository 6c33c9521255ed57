//! Integration tests for `opinion_analysis`.
//
// This suite verifies:
// - Library behavior (ingestion fallbacks, sentiment labels, ordering, determinism,
//   degenerate topic corpus, model fallbacks, injected stub models)
// - CLI behavior including export formats, model check and failure exit codes
//
// Notes:
// - CLI tests run the binary with a per-process working directory (no global CWD change).
// - Tests that change global CWD (library-level outputs) are marked #[serial].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use csv::WriterBuilder;
use predicates::prelude::*;
use regex::Regex;
use serde_json::Value as Json;
use serial_test::serial;
use tempfile::tempdir;

use opinion_analysis::classifier::{ClassScore, NaiveBayesClassifier, SentimentClassifier};
use opinion_analysis::config::ReconcileConfig;
use opinion_analysis::embedding::SentenceEmbedder;
use opinion_analysis::lexicon::Lexicon;
use opinion_analysis::linguistic::RuleBasedModel;
use opinion_analysis::{
    AnalysisOptions, CancelToken, ExportFormat, IngestionError, ItemAnalysisError, ModelStore,
    PipelineConfig, PipelineError, ReportModel, SentimentLabel, SentimentSource, analyze_bytes,
    analyze_path, analyze_texts, collect_files, csv_safe_cell,
};

// --------------------- helpers ---------------------

/// Create a file with content in a temp dir.
fn write_file(dir: &assert_fs::TempDir, name: &str, content: &str) -> PathBuf {
    let f = dir.child(name);
    f.write_str(content).unwrap();
    f.path().to_path_buf()
}

/// Model store over an empty directory: every capability falls back.
fn empty_models() -> (tempfile::TempDir, ModelStore) {
    let dir = tempdir().unwrap();
    let models = ModelStore::new(dir.path());
    (dir, models)
}

fn opts(fmt: ExportFormat) -> AnalysisOptions {
    AnalysisOptions {
        export_format: fmt,
        ..AnalysisOptions::default()
    }
}

fn analyze_csv(content: &[u8], models: &ModelStore) -> Result<ReportModel, PipelineError> {
    analyze_bytes(
        content,
        "input.csv",
        models,
        &opts(ExportFormat::Txt),
        &CancelToken::new(),
    )
}

/// Run CLI successfully with a specific working directory.
fn run_cli_ok_in(dir: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = assert_cmd::Command::cargo_bin("opinion_analysis").unwrap();
    cmd.current_dir(dir);
    cmd.args(args).assert().success()
}

/// Run CLI expecting failure with a specific working directory.
fn run_cli_fail_in(dir: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = assert_cmd::Command::cargo_bin("opinion_analysis").unwrap();
    cmd.current_dir(dir);
    cmd.args(args).assert().failure()
}

/// Find an export file whose name ends with `suffix` (e.g. "_report.json").
fn find_with_suffix(dir: &Path, suffix: &str) -> Option<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(suffix))
                .unwrap_or(false)
        })
}

const EXAMPLE_CSV: &str = "Válasz\nNagyon elégedett vagyok a szolgáltatással.\n\"Szörnyű volt az egész, soha többé.\"\n\"\"\n";

/// Two themes, repeated, with a metadata column.
fn themed_corpus(rows: usize) -> String {
    let texts = [
        "A vonat megint késett reggel, nagyon bosszantó.",
        "Finom volt az ebéd a menzán, kedves kiszolgálás.",
        "A vonat késése miatt elkéstem az óráról.",
        "Az ebéd bőséges és finom volt, ajánlom.",
    ];
    let mut out = String::from("azonosító;Vélemény;csoport\n");
    for i in 0..rows {
        out.push_str(&format!("{i};{};{}\n", texts[i % texts.len()], i % 3));
    }
    out
}

// --------------------- library tests ---------------------

#[test]
fn lib_example_rows_positive_negative_neutral() {
    let (_d, models) = empty_models();
    let report = analyze_csv(EXAMPLE_CSV.as_bytes(), &models).unwrap();
    let labels: Vec<SentimentLabel> = report.items().iter().map(|i| i.sentiment.label).collect();
    assert_eq!(
        labels,
        vec![
            SentimentLabel::Positive,
            SentimentLabel::Negative,
            SentimentLabel::Neutral
        ]
    );
    let empty = &report.items()[2];
    assert_eq!(empty.text, "");
    assert_eq!(empty.sentiment.confidence, 0.0);
    assert!(empty.error.is_none());
    assert_eq!(report.metadata().text_column, "Válasz");
}

#[test]
fn lib_source_rows_round_trip() {
    let (_d, models) = empty_models();
    let input = "id;Válasz;kor\n1;Nagyon jó volt az előadás, köszönöm;34\n2;Unalmas és zavaros anyag volt;51\n";
    let report = analyze_csv(input.as_bytes(), &models).unwrap();
    assert_eq!(report.metadata().delimiter, "semicolon");
    assert_eq!(report.metadata().headers, vec!["id", "Válasz", "kor"]);
    assert_eq!(
        report.items()[0].source_row.values,
        vec!["1", "Nagyon jó volt az előadás, köszönöm", "34"]
    );
    assert_eq!(report.items()[1].source_row.values[2], "51");
    assert_eq!(report.items()[1].text, "Unalmas és zavaros anyag volt");
}

#[test]
fn lib_latin2_file_decodes_without_replacement_chars() {
    let (_d, models) = empty_models();
    let text = "Válasz;Megjegyzés\nKiváló, őszinte és türelmes előadó volt;ok\nSzörnyű hangosítás, rossz terem;nem\n";
    let (bytes, _, had_errors) = encoding_rs::ISO_8859_2.encode(text);
    assert!(!had_errors);
    assert!(std::str::from_utf8(&bytes).is_err(), "fixture must not be UTF-8");

    let report = analyze_csv(&bytes, &models).unwrap();
    assert_ne!(report.metadata().encoding, "UTF-8");
    assert_eq!(report.items()[0].text, "Kiváló, őszinte és türelmes előadó volt");
    assert!(
        report
            .items()
            .iter()
            .all(|i| !i.text.contains('\u{FFFD}'))
    );
    assert_eq!(report.items()[1].sentiment.label, SentimentLabel::Negative);
}

#[test]
fn lib_missing_classifier_is_lexical_only() {
    let (_d, models) = empty_models();
    let report = analyze_csv(themed_corpus(12).as_bytes(), &models).unwrap();
    assert!(!report.metadata().capabilities.classifier);
    assert_eq!(report.items().len(), 12);
    assert!(
        report
            .items()
            .iter()
            .all(|i| i.sentiment.source == SentimentSource::LexicalOnly)
    );
}

#[test]
fn lib_classifier_artifact_is_used() {
    let dir = tempdir().unwrap();
    NaiveBayesClassifier::train(
        &[
            ("nagyon elégedett vagyok kiváló", "positive"),
            ("finom ebéd kedves", "positive"),
            ("szörnyű rossz bosszantó", "negative"),
            ("késett a vonat elkéstem", "negative"),
            ("a vonat tízkor indul", "neutral"),
        ],
        1.0,
    )
    .save(&dir.path().join("classifier.json"))
    .unwrap();
    let models = ModelStore::new(dir.path());

    let report = analyze_csv(themed_corpus(8).as_bytes(), &models).unwrap();
    assert!(report.metadata().capabilities.classifier);
    assert!(
        report
            .items()
            .iter()
            .all(|i| i.sentiment.source != SentimentSource::LexicalOnly)
    );
    assert!(report.items().iter().all(|i| i.sentiment.model_label.is_some()));
}

#[test]
fn lib_order_matches_input_with_worker_pool() {
    let (_d, models) = empty_models();
    let corpus = themed_corpus(60);
    let mut o = opts(ExportFormat::Txt);
    o.threads = Some(4);
    let report = analyze_bytes(corpus.as_bytes(), "x.csv", &models, &o, &CancelToken::new())
        .unwrap();
    let ids: Vec<usize> = report.items().iter().map(|i| i.id).collect();
    assert_eq!(ids, (0..60).collect::<Vec<_>>());
    for item in report.items() {
        assert_eq!(item.source_row.values[0], item.id.to_string());
    }
}

#[test]
fn lib_sentiment_is_deterministic_and_threshold_consistent() {
    let (_d, models) = empty_models();
    let corpus = themed_corpus(20);
    let a = analyze_csv(corpus.as_bytes(), &models).unwrap();
    let b = analyze_csv(corpus.as_bytes(), &models).unwrap();
    let cfg = ReconcileConfig::default();
    for (x, y) in a.items().iter().zip(b.items()) {
        assert_eq!(x.sentiment.label, y.sentiment.label);
        assert_eq!(x.sentiment.score.to_bits(), y.sentiment.score.to_bits());
        assert_eq!(x.sentiment.explanation, y.sentiment.explanation);
        assert_eq!(x.sentiment.label, SentimentLabel::from_score(x.sentiment.score, &cfg));
    }
}

#[test]
fn lib_small_corpus_skips_topics() {
    let (_d, models) = empty_models();
    let report = analyze_csv(EXAMPLE_CSV.as_bytes(), &models).unwrap();
    assert!(report.metadata().topic_status.is_skipped());
    assert!(report.items().iter().all(|i| i.topic.is_unassigned()));
    assert!(report.topics().is_empty());
    assert!(report.corpus_stats().topics.is_empty());
    assert_eq!(report.corpus_stats().unassigned_count, 3);
}

#[test]
fn lib_topic_partition_is_consistent() {
    let (_d, models) = empty_models();
    let report = analyze_csv(themed_corpus(24).as_bytes(), &models).unwrap();
    assert!(!report.metadata().topic_status.is_skipped());
    assert_eq!(report.metadata().embedding_source, "hashing");
    // identical texts land in the same partition
    let items = report.items();
    for i in 4..items.len() {
        assert_eq!(items[i].topic.topic_id, items[i % 4].topic.topic_id);
    }
    let assigned = items.iter().filter(|i| !i.topic.is_unassigned()).count();
    assert_eq!(
        assigned + report.corpus_stats().unassigned_count,
        items.len()
    );
}

struct AlwaysPositive;

impl SentimentClassifier for AlwaysPositive {
    fn classify(&self, _text: &str) -> Result<Vec<ClassScore>, ItemAnalysisError> {
        Ok(vec![
            ClassScore {
                label: "LABEL_0".into(),
                score: 0.05,
            },
            ClassScore {
                label: "LABEL_1".into(),
                score: 0.05,
            },
            ClassScore {
                label: "LABEL_2".into(),
                score: 0.9,
            },
        ])
    }
}

struct ThemeEmbedder;

impl SentenceEmbedder for ThemeEmbedder {
    fn dim(&self) -> usize {
        2
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        if text.contains("vonat") {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        }
    }

    fn name(&self) -> &str {
        "theme"
    }
}

#[test]
fn lib_injected_stub_models() {
    let lexicon = Arc::new(Lexicon::hungarian());
    let models = ModelStore::with_components(
        lexicon.clone(),
        Arc::new(RuleBasedModel::new(lexicon)),
        Some(Arc::new(AlwaysPositive)),
        Arc::new(ThemeEmbedder),
    );
    assert!(models.capabilities().all_loaded());

    let report = analyze_csv(themed_corpus(20).as_bytes(), &models).unwrap();
    assert_eq!(report.topics().len(), 2);
    assert_eq!(report.metadata().embedding_source, "theme");
    let items = report.items();
    assert_eq!(items[0].topic.topic_id, Some(0));
    assert_eq!(items[1].topic.topic_id, Some(1));
    assert!(items[0].topic.topic_terms.iter().any(|t| t.starts_with("vonat")));
    // the finom/ebéd rows agree with the stub and stay positive
    assert_eq!(items[1].sentiment.label, SentimentLabel::Positive);
    assert_eq!(report.corpus_stats().topics[0].count, 10);
}

#[test]
fn lib_report_items_carry_full_annotation() {
    let (_d, models) = empty_models();
    let report = analyze_csv(EXAMPLE_CSV.as_bytes(), &models).unwrap();
    let first = &report.items()[0];
    let tokens = &first.annotation.tokens;
    assert_eq!(tokens[0].surface, "Nagyon");
    assert!(tokens.iter().all(|t| !t.lemma.is_empty()));
    assert!(tokens.iter().any(|t| t.is_punct()));
    assert_eq!(first.linguistics.token_count, first.annotation.content_token_count());

    let edges = &first.annotation.dependency_edges;
    assert!(!edges.is_empty());
    assert!(edges.iter().any(|e| e.relation == "root" && e.head_index == e.dependent_index));
    assert!(
        edges
            .iter()
            .all(|e| e.head_index < tokens.len() && e.dependent_index < tokens.len())
    );

    assert_eq!(first.annotation.lexical_polarity.score, first.sentiment.lexical_score);
    assert!(!first.annotation.lexical_polarity.polar_terms.is_empty());

    let empty = &report.items()[2];
    assert!(empty.annotation.tokens.is_empty());
    assert!(empty.annotation.dependency_edges.is_empty());
}

#[test]
fn lib_single_column_answers_with_commas() {
    let (_d, models) = empty_models();
    let input = "Válasz\nJó, de drága volt\nSzép hely, kedves személyzet\nRossz, nagyon lassú\nNem tetszett, unalmas\n";
    let report = analyze_csv(input.as_bytes(), &models).unwrap();
    assert_eq!(report.metadata().text_column, "Válasz");
    assert_eq!(report.items().len(), 4);
    assert_eq!(report.items()[0].text, "Jó, de drága volt");
}

#[test]
fn lib_inconsistent_layout_is_a_delimiter_error() {
    let (_d, models) = empty_models();
    let input = "a;b,c\td\n\
                 a;b;c,d,e\tf\tg\th\n\
                 a;b;c;d,e\tf\n\
                 a,b,c,d,e;f\tg\th\n\
                 a;b;c;d;e,f,g,h\tg\th\ti\tj\n";
    let err = analyze_csv(input.as_bytes(), &models).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Ingestion(IngestionError::Delimiter(_))
    ));
}

/// Classifier that trips a cancel token once it has seen `after` texts.
struct CancellingClassifier {
    cancel: CancelToken,
    after: usize,
    calls: AtomicUsize,
}

impl SentimentClassifier for CancellingClassifier {
    fn classify(&self, text: &str) -> Result<Vec<ClassScore>, ItemAnalysisError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.cancel.cancel();
        }
        AlwaysPositive.classify(text)
    }
}

fn cancelling_models(
    cancel: &CancelToken,
    after: usize,
) -> (ModelStore, Arc<CancellingClassifier>) {
    let lexicon = Arc::new(Lexicon::hungarian());
    let classifier = Arc::new(CancellingClassifier {
        cancel: cancel.clone(),
        after,
        calls: AtomicUsize::new(0),
    });
    let models = ModelStore::with_components(
        lexicon.clone(),
        Arc::new(RuleBasedModel::new(lexicon)),
        Some(classifier.clone() as Arc<dyn SentimentClassifier>),
        Arc::new(ThemeEmbedder),
    );
    (models, classifier)
}

#[test]
fn lib_cancel_during_item_stage_stops_remaining_items() {
    let cancel = CancelToken::new();
    let (models, classifier) = cancelling_models(&cancel, 1);
    let mut o = opts(ExportFormat::Txt);
    o.threads = Some(1);
    let err = analyze_bytes(themed_corpus(12).as_bytes(), "x.csv", &models, &o, &cancel)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn lib_cancel_after_last_item_skips_topic_pass() {
    let cancel = CancelToken::new();
    let (models, classifier) = cancelling_models(&cancel, 6);
    let mut o = opts(ExportFormat::Txt);
    o.threads = Some(1);
    let err = analyze_bytes(themed_corpus(6).as_bytes(), "x.csv", &models, &o, &cancel)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 6);
}

#[test]
fn lib_numeric_only_file_has_no_text_column() {
    let (_d, models) = empty_models();
    let err = analyze_csv(b"a;b\n1;2\n3;4\n", &models).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Ingestion(IngestionError::NoTextColumn(_))
    ));
}

#[test]
fn lib_column_override() {
    let (_d, models) = empty_models();
    let input = "rövid;hosszú\nok;Nagyon jó volt minden\nnem;Rossz volt\n";
    let mut o = opts(ExportFormat::Txt);
    o.column = Some("nincs".to_string());
    let err = analyze_bytes(input.as_bytes(), "x.csv", &models, &o, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Ingestion(IngestionError::UnknownColumn(_))
    ));

    o.column = Some("rövid".to_string());
    let report =
        analyze_bytes(input.as_bytes(), "x.csv", &models, &o, &CancelToken::new()).unwrap();
    assert_eq!(report.items()[0].text, "ok");
}

#[test]
fn lib_config_thresholds_apply() {
    let (_d, models) = empty_models();
    let mut o = opts(ExportFormat::Txt);
    o.config = PipelineConfig::from_toml("[reconcile]\npositive_threshold = 0.95\n").unwrap();
    let report = analyze_texts(
        &["Nagyon elégedett vagyok a szolgáltatással."],
        &models,
        &o,
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(report.items()[0].sentiment.label, SentimentLabel::Neutral);
}

#[test]
fn lib_collect_files_filters_extensions() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "a.csv", "x");
    write_file(&td, "b.tsv", "x");
    write_file(&td, "c.pdf", "x");
    let files = collect_files(td.path());
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.csv", "b.tsv"]);
}

#[test]
#[serial]
fn lib_analyze_path_writes_five_tables() {
    let td = assert_fs::TempDir::new().unwrap();
    let input = write_file(&td, "valaszok.csv", &themed_corpus(10));
    let (_d, models) = empty_models();

    // Change CWD so relative outputs are written into td
    std::env::set_current_dir(td.path()).unwrap();
    let run = analyze_path(&input, &models, &opts(ExportFormat::Csv), &CancelToken::new())
        .expect("analyze_path");
    assert_eq!(run.reports.len(), 1);
    assert_eq!(run.reports[0].exported.len(), 5);

    for table in ["results", "stats", "topics", "linguistics", "entities"] {
        let re = Regex::new(&format!(r"^valaszok_\d{{8}}_\d{{6}}_{table}\.csv$")).unwrap();
        let found = fs::read_dir(td.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| re.is_match(e.file_name().to_string_lossy().as_ref()));
        assert!(found, "Expected valaszok_*_{table}.csv in temp dir");
    }

    let results = find_with_suffix(td.path(), "_results.csv").unwrap();
    let mut rdr = csv::Reader::from_path(results).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(&headers[0], "id");
    assert!(headers.iter().any(|h| h == "Vélemény"));
    assert_eq!(rdr.records().count(), 10);
}

#[test]
fn lib_directory_collects_failed_files() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "good.csv", &themed_corpus(6));
    write_file(&td, "bad.csv", "a;b\n1;2\n");
    let out = tempdir().unwrap();
    let (_d, models) = empty_models();
    let mut o = opts(ExportFormat::Json);
    o.output_dir = Some(out.path().to_path_buf());

    let run = analyze_path(td.path(), &models, &o, &CancelToken::new()).unwrap();
    assert_eq!(run.reports.len(), 1);
    assert_eq!(run.failed_files.len(), 1);
    assert!(run.failed_files[0].0.ends_with("bad.csv"));
    assert!(find_with_suffix(out.path(), "_report.json").is_some());
}

// --------------------- CLI tests ---------------------

#[test]
fn cli_nonexistent_path_fails() {
    let td = tempdir().unwrap();
    let bad = td.path().join("does_not_exist_here.csv");
    run_cli_fail_in(
        td.path(),
        &[bad.to_string_lossy().as_ref(), "--export-format", "csv"],
    );
}

#[test]
fn cli_basic_run_prints_summary() {
    let td = assert_fs::TempDir::new().unwrap();
    let f = write_file(&td, "cli.csv", EXAMPLE_CSV);
    let models = td.path().join("no_models");

    run_cli_ok_in(
        td.path(),
        &[
            f.to_string_lossy().as_ref(),
            "--models-dir",
            models.to_string_lossy().as_ref(),
        ],
    )
    .stdout(predicate::str::contains("--- Sentiment ---"))
    .stdout(predicate::str::contains("lexical_only=3"))
    .stdout(predicate::str::contains("skipped"));
}

#[test]
fn cli_export_json() {
    let td = assert_fs::TempDir::new().unwrap();
    let f = write_file(&td, "fmt.csv", &themed_corpus(8));
    let stop = write_file(&td, "stop.lst", "vonat\n");

    run_cli_ok_in(
        td.path(),
        &[
            f.to_string_lossy().as_ref(),
            "--export-format",
            "json",
            "--stopwords",
            stop.to_str().unwrap(),
            "--seed",
            "7",
        ],
    );

    let path = find_with_suffix(td.path(), "_report.json").expect("json export");
    let json: Json = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    let items = json["items"].as_array().unwrap();
    assert_eq!(items.len(), 8);
    assert_eq!(items[0]["source_row"]["values"][0], "0");
    assert!(items[0]["sentiment"]["label"].is_string());
    let annotation = &items[0]["annotation"];
    assert_eq!(annotation["tokens"][0]["surface"], "A");
    assert!(!annotation["dependency_edges"].as_array().unwrap().is_empty());
    assert!(annotation["lexical_polarity"]["score"].is_number());
    assert_eq!(json["corpus_stats"]["total_items"], 8);
    // the extra stop word never shows up as a topic term
    for t in json["topics"].as_array().unwrap() {
        assert!(!t["terms"].as_array().unwrap().iter().any(|x| x == "vonat"));
    }
}

#[test]
fn cli_export_tsv() {
    let td = assert_fs::TempDir::new().unwrap();
    let f = write_file(&td, "fmt2.csv", &themed_corpus(6));

    run_cli_ok_in(
        td.path(),
        &[
            f.to_string_lossy().as_ref(),
            "--export-format",
            "tsv",
            "--threads",
            "2",
        ],
    );

    let tsv_count = fs::read_dir(td.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "tsv").unwrap_or(false))
        .count();
    assert_eq!(tsv_count, 5, "Expected five .tsv tables in temp dir");
}

#[test]
fn cli_check_models_reports_fallbacks() {
    let td = assert_fs::TempDir::new().unwrap();
    let mut cmd = assert_cmd::Command::cargo_bin("opinion_analysis").unwrap();
    cmd.current_dir(td.path())
        .args(["--check-models", "--models-dir", "nothing_here"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("classifier: missing"));
}

#[test]
fn cli_invalid_config_fails() {
    let td = assert_fs::TempDir::new().unwrap();
    let f = write_file(&td, "x.csv", EXAMPLE_CSV);
    let cfg = write_file(
        &td,
        "cfg.toml",
        "[reconcile]\npositive_threshold = -0.5\nnegative_threshold = 0.5\n",
    );
    run_cli_fail_in(
        td.path(),
        &[
            f.to_string_lossy().as_ref(),
            "--config",
            cfg.to_string_lossy().as_ref(),
        ],
    );
}

#[test]
fn cli_unknown_column_fails() {
    let td = assert_fs::TempDir::new().unwrap();
    let f = write_file(&td, "x.csv", EXAMPLE_CSV);
    run_cli_fail_in(td.path(), &[f.to_string_lossy().as_ref(), "--column", "nincs"]);
}

// --- Tests to verify sanitizing works ---

#[test]
fn csv_writer_sanitizes_and_quotes_correctly() {
    let mut buf = Vec::new();
    {
        let mut wtr = WriterBuilder::new().from_writer(&mut buf);
        wtr.write_record(["text", "label"]).unwrap();

        // dangerous: starts with '=' and contains quotes
        let dangerous = r#"=HYPERLINK("http://x")"#.to_string();
        wtr.write_record([csv_safe_cell(dangerous), "neutral".to_string()])
            .unwrap();

        let nl = "-rossz\nvolt".to_string();
        wtr.write_record([csv_safe_cell(nl), "negative".to_string()])
            .unwrap();
        wtr.flush().unwrap();
    }

    let out = String::from_utf8(buf).unwrap();
    assert!(
        out.contains(r#"'=HYPERLINK(""http://x"")"#),
        "leading '=' neutralized and inner quotes doubled"
    );
    assert!(out.contains("'-rossz\nvolt"), "newline preserved in quoted field");
}

#[test]
fn no_double_prefix_when_cell_already_safe() {
    let already_safe = "'@SAFE".to_string();
    assert_eq!(csv_safe_cell(already_safe.clone()), already_safe);
    assert_eq!(csv_safe_cell("Jó volt".to_string()), "Jó volt");
}
