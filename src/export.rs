//! Rendering a [`ReportModel`] to stdout or timestamped files.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::ValueEnum;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::reconcile::SentimentLabel;
use crate::report::ReportModel;
use crate::topics::TopicStatus;

/// Output format of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Summary on stdout only.
    #[default]
    Txt,
    Csv,
    Tsv,
    Json,
}

/// Tables written for csv/tsv export.
pub const TABLES: [&str; 5] = ["results", "stats", "topics", "linguistics", "entities"];

/// Neutralise spreadsheet formulas: a cell starting with `=`, `+`, `-`, `@`, TAB or
/// CR gets a leading `'`. Cells that already start with `'` are left alone.
pub fn csv_safe_cell(cell: String) -> String {
    match cell.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{cell}"),
        _ => cell,
    }
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn fmt_score(v: f64) -> String {
    format!("{v:.4}")
}

fn opt_score(v: Option<f64>) -> String {
    v.map(fmt_score).unwrap_or_default()
}

/// Write `report` in `format` into `out_dir`, named after `stem`.
/// Returns the written paths (none for `txt`).
pub fn export_report(
    report: &ReportModel,
    stem: &str,
    format: ExportFormat,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let ts = timestamp();
    match format {
        ExportFormat::Txt => Ok(Vec::new()),
        ExportFormat::Json => {
            let path = out_dir.join(format!("{stem}_{ts}_report.json"));
            let file = BufWriter::new(File::create(&path)?);
            serde_json::to_writer_pretty(file, report)?;
            Ok(vec![path])
        }
        ExportFormat::Csv | ExportFormat::Tsv => {
            let (delimiter, ext) = if format == ExportFormat::Csv {
                (b',', "csv")
            } else {
                (b'\t', "tsv")
            };
            let mut written = Vec::with_capacity(TABLES.len());
            for table in TABLES {
                let path = out_dir.join(format!("{stem}_{ts}_{table}.{ext}"));
                let rows = table_rows(report, table);
                let mut wtr = WriterBuilder::new()
                    .delimiter(delimiter)
                    .flexible(false)
                    .from_path(&path)?;
                for row in rows {
                    wtr.write_record(row)?;
                }
                wtr.flush()?;
                written.push(path);
            }
            Ok(written)
        }
    }
}

/// Header plus data rows of one export table.
pub fn table_rows(report: &ReportModel, table: &str) -> Vec<Vec<String>> {
    let text = |s: &str| csv_safe_cell(s.to_string());
    let mut rows: Vec<Vec<String>> = Vec::new();
    match table {
        "results" => {
            let mut header: Vec<String> = vec!["id".into(), "line".into()];
            header.extend(report.metadata().headers.iter().map(|h| text(h)));
            header.extend(
                [
                    "text",
                    "label",
                    "score",
                    "confidence",
                    "source",
                    "explanation",
                    "lexical_score",
                    "lexical_confidence",
                    "model_label",
                    "model_confidence",
                    "topic_id",
                    "topic_terms",
                    "error",
                ]
                .map(String::from),
            );
            let width = report.metadata().headers.len();
            rows.push(header);
            for item in report.items() {
                let s = &item.sentiment;
                let mut row = vec![item.id.to_string(), item.source_row.line.to_string()];
                let mut values: Vec<String> =
                    item.source_row.values.iter().map(|v| text(v)).collect();
                values.resize(width, String::new());
                row.extend(values);
                row.extend([
                    text(&item.text),
                    s.label.to_string(),
                    fmt_score(s.score),
                    fmt_score(s.confidence),
                    s.source.to_string(),
                    text(&s.explanation),
                    fmt_score(s.lexical_score),
                    fmt_score(s.lexical_confidence),
                    s.model_label.map(|l| l.to_string()).unwrap_or_default(),
                    opt_score(s.model_confidence),
                    item.topic.id_label(),
                    text(&item.topic.topic_terms.join(", ")),
                    item.error.as_deref().map(text).unwrap_or_default(),
                ]);
                rows.push(row);
            }
        }
        "stats" => {
            let stats = report.corpus_stats();
            rows.push(vec!["metric".into(), "value".into()]);
            let mut push = |k: String, v: String| rows.push(vec![k, v]);
            push("total_items".into(), stats.total_items.to_string());
            push("empty_items".into(), stats.empty_items.to_string());
            push("error_count".into(), stats.error_count.to_string());
            push("mean_score".into(), fmt_score(stats.mean_score));
            push("mean_lexical_score".into(), fmt_score(stats.mean_lexical_score));
            for l in &stats.labels {
                push(format!("{}_count", l.label), l.count.to_string());
                push(format!("{}_share", l.label), fmt_score(l.share));
                push(format!("{}_mean_score", l.label), fmt_score(l.mean_score));
            }
            for s in &stats.sources {
                push(format!("source_{}", s.source), s.count.to_string());
            }
            push("topic_count".into(), stats.topics.len().to_string());
            push("unassigned_count".into(), stats.unassigned_count.to_string());
            let meta = report.metadata();
            push("encoding".into(), meta.encoding.clone());
            push("delimiter".into(), meta.delimiter.clone());
            push("text_column".into(), text(&meta.text_column));
            push("language".into(), meta.language.clone().unwrap_or_default());
            push("embedding_source".into(), meta.embedding_source.clone());
            push("classifier_loaded".into(), meta.capabilities.classifier.to_string());
        }
        "topics" => {
            rows.push(
                ["topic_id", "size", "terms", "mean_score", "positive", "neutral", "negative"]
                    .map(String::from)
                    .to_vec(),
            );
            for t in &report.corpus_stats().topics {
                rows.push(vec![
                    t.id.to_string(),
                    t.count.to_string(),
                    text(&t.terms.join(", ")),
                    fmt_score(t.mean_score),
                    t.positive.to_string(),
                    t.neutral.to_string(),
                    t.negative.to_string(),
                ]);
            }
        }
        "linguistics" => {
            rows.push(
                [
                    "id",
                    "tokens",
                    "sentences",
                    "positive_elements",
                    "negative_elements",
                    "pos_tags",
                    "dependencies",
                    "relations",
                    "lemmatized",
                    "sentence_breakdown",
                ]
                .map(String::from)
                .to_vec(),
            );
            for item in report.items() {
                let l = &item.linguistics;
                rows.push(vec![
                    item.id.to_string(),
                    l.token_count.to_string(),
                    l.sentence_count.to_string(),
                    text(&l.positive_elements),
                    text(&l.negative_elements),
                    text(&l.pos_summary),
                    text(&l.dependency_summary),
                    text(&l.relation_summary),
                    text(&l.lemmatized),
                    text(&l.sentence_breakdown),
                ]);
            }
        }
        "entities" => {
            rows.push(["id", "entity", "type", "start", "end"].map(String::from).to_vec());
            for item in report.items() {
                for e in &item.linguistics.entities {
                    rows.push(vec![
                        item.id.to_string(),
                        text(&e.text_span),
                        e.entity_type.to_string(),
                        e.start.to_string(),
                        e.end.to_string(),
                    ]);
                }
            }
        }
        _ => {}
    }
    rows
}

/// Human-readable run summary.
pub fn render_summary(report: &ReportModel) -> String {
    let meta = report.metadata();
    let stats = report.corpus_stats();
    let mut out = String::new();
    out.push_str(&format!("=== {} ===\n", meta.source_name));
    out.push_str(&format!(
        "encoding: {}, delimiter: {}, text column: {}\n",
        meta.encoding, meta.delimiter, meta.text_column
    ));
    if let Some(lang) = &meta.language {
        out.push_str(&format!("language: {lang}\n"));
    }
    out.push_str(&format!(
        "items: {} (empty: {}, errors: {})\n\n",
        stats.total_items, stats.empty_items, stats.error_count
    ));

    out.push_str("--- Sentiment ---\n");
    for label in SentimentLabel::ALL {
        if let Some(l) = stats.label(label) {
            out.push_str(&format!(
                "{:<9} {:>5} ({:>5.1}%)  mean {:+.3}\n",
                l.label.as_str(),
                l.count,
                l.share * 100.0,
                l.mean_score
            ));
        }
    }
    out.push_str(&format!("overall mean score: {:+.3}\n", stats.mean_score));
    let sources: Vec<String> = stats
        .sources
        .iter()
        .map(|s| format!("{}={}", s.source, s.count))
        .collect();
    out.push_str(&format!("sources: {}\n\n", sources.join(", ")));

    out.push_str("--- Topics ---\n");
    match &meta.topic_status {
        TopicStatus::Skipped { reason } => {
            out.push_str(&format!("skipped: {reason}\n"));
        }
        TopicStatus::Discovered { .. } => {
            for t in &stats.topics {
                out.push_str(&format!(
                    "#{:<3} {:>4} items  mean {:+.3}  {}\n",
                    t.id,
                    t.count,
                    t.mean_score,
                    t.terms.join(", ")
                ));
            }
            out.push_str(&format!("unassigned: {}\n", stats.unassigned_count));
        }
    }
    out
}
