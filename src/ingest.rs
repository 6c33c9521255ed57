//! Tabular text ingestion: encoding, delimiter and text-column detection.

use csv::{ReaderBuilder, StringRecord};
use encoding_rs::{Encoding, ISO_8859_2, UTF_8, WINDOWS_1250, WINDOWS_1252};
use log::{debug, info};
use serde::Serialize;

use crate::config::IngestConfig;
use crate::error::IngestionError;

/// Legacy single-byte encodings tried after UTF-8, in order.
const LEGACY_ENCODINGS: [&Encoding; 3] = [WINDOWS_1250, ISO_8859_2, WINDOWS_1252];

/// Candidate delimiters in tie-break priority order.
pub const DELIMITERS: [u8; 3] = [b';', b',', b'\t'];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Original row of the input, preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRow {
    /// 1-based line of the row in the decoded file.
    pub line: u64,
    /// Every field of the row, in file order.
    pub values: Vec<String>,
}

/// One input text with a stable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRecord {
    /// 0-based index among data rows; defines the output order.
    pub id: usize,
    pub source_row: SourceRow,
    pub text: String,
}

/// The ingested table together with everything that was detected about it.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub encoding: &'static str,
    pub delimiter: u8,
    pub headers: Vec<String>,
    pub text_column: usize,
    pub records: Vec<RawRecord>,
}

impl Ingested {
    pub fn text_column_name(&self) -> &str {
        self.headers
            .get(self.text_column)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Human readable delimiter name for logs and reports.
pub fn delimiter_name(delimiter: u8) -> &'static str {
    match delimiter {
        b';' => "semicolon",
        b',' => "comma",
        b'\t' => "tab",
        _ => "other",
    }
}

/// Decode, detect layout and parse `bytes` into records.
///
/// `column` overrides text-column detection (matched against trimmed header names,
/// case-insensitively).
pub fn ingest(
    bytes: &[u8],
    column: Option<&str>,
    cfg: &IngestConfig,
) -> Result<Ingested, IngestionError> {
    let (text, encoding) = decode(bytes, cfg.corruption_tolerance)?;
    info!("Detected encoding: {encoding}");

    let delimiter = detect_delimiter(&text, cfg)?;
    info!("Detected delimiter: {}", delimiter_name(delimiter));

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = normalize_headers(reader.headers()?);
    let mut rows: Vec<(u64, StringRecord)> = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        rows.push((line, record));
    }
    if rows.is_empty() {
        return Err(IngestionError::Empty);
    }

    let text_column = match column {
        Some(name) => find_column(&headers, name)?,
        None => {
            let sample: Vec<&StringRecord> = rows
                .iter()
                .take(cfg.column_sample_rows)
                .map(|(_, r)| r)
                .collect();
            detect_text_column(&headers, &sample, cfg)?
        }
    };
    info!(
        "Text column: '{}' ({} data rows)",
        headers[text_column],
        rows.len()
    );

    let records = rows
        .into_iter()
        .enumerate()
        .map(|(id, (line, record))| {
            let values: Vec<String> = record.iter().map(String::from).collect();
            let text = values.get(text_column).cloned().unwrap_or_default();
            RawRecord {
                id,
                source_row: SourceRow { line, values },
                text,
            }
        })
        .collect();

    Ok(Ingested {
        encoding,
        delimiter,
        headers,
        text_column,
        records,
    })
}

/// Decode raw bytes: UTF-8 (with or without BOM) first, then the legacy encodings.
///
/// A candidate is accepted when its share of corrupted chars (replacement characters
/// and control characters other than TAB/CR/LF) does not exceed `tolerance`.
pub fn decode(bytes: &[u8], tolerance: f64) -> Result<(String, &'static str), IngestionError> {
    if bytes.is_empty() {
        return Err(IngestionError::Empty);
    }

    let (body, utf8_label) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest, "UTF-8 (BOM)"),
        None => (bytes, "UTF-8"),
    };
    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(body) {
        let ratio = corruption_ratio(&text);
        if ratio <= tolerance {
            return Ok((text.into_owned(), utf8_label));
        }
        debug!("UTF-8 decodes but {:.2}% of chars are suspicious", ratio * 100.0);
    }

    let mut best: Option<(&'static str, f64)> = None;
    for encoding in LEGACY_ENCODINGS {
        let (text, _had_errors) = encoding.decode_without_bom_handling(bytes);
        let ratio = corruption_ratio(&text);
        debug!("{} corruption ratio: {:.4}", encoding.name(), ratio);
        if ratio <= tolerance {
            return Ok((text.into_owned(), encoding.name()));
        }
        if best.is_none_or(|(_, r)| ratio < r) {
            best = Some((encoding.name(), ratio));
        }
    }

    let detail = best
        .map(|(name, ratio)| {
            format!("best candidate {name} had {:.2}% corrupted chars", ratio * 100.0)
        })
        .unwrap_or_default();
    Err(IngestionError::Encoding(detail))
}

fn corruption_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut bad = 0usize;
    for c in text.chars() {
        total += 1;
        if c == '\u{FFFD}' || (c.is_control() && !matches!(c, '\t' | '\r' | '\n')) {
            bad += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        bad as f64 / total as f64
    }
}

#[derive(Debug, Clone, Copy)]
struct DelimiterScore {
    delimiter: u8,
    /// Modal field count of the sampled records.
    columns: usize,
    /// Share of sampled records with the modal field count.
    consistency: f64,
    /// The header row splits into the modal field count.
    matches_header: bool,
}

impl DelimiterScore {
    /// Candidates agreeing with the header come first, then wider layouts, then
    /// more consistent ones. Equal scores keep the earlier candidate.
    fn beats(&self, other: &DelimiterScore) -> bool {
        (self.matches_header, self.columns)
            .cmp(&(other.matches_header, other.columns))
            .then(self.consistency.total_cmp(&other.consistency))
            .is_gt()
    }
}

/// Pick the delimiter whose sampled records agree best on a column count.
///
/// Records are sampled with a quote-aware reader, so quoted fields may span lines.
/// Every candidate is scored, including those that leave a record whole: a file
/// whose header has one field and whose answers contain commas is a single-column
/// table, not a ragged comma-separated one.
pub fn detect_delimiter(text: &str, cfg: &IngestConfig) -> Result<u8, IngestionError> {
    let mut best: Option<DelimiterScore> = None;
    let mut sampled_any = false;
    for delimiter in DELIMITERS {
        let Some(score) = score_delimiter(text, delimiter, cfg.sample_lines) else {
            continue;
        };
        sampled_any = true;
        debug!(
            "delimiter {}: {} columns, consistency {:.2}, header match {}",
            delimiter_name(delimiter),
            score.columns,
            score.consistency,
            score.matches_header
        );
        if score.consistency < cfg.min_delimiter_consistency {
            continue;
        }
        if best.is_none_or(|b| score.beats(&b)) {
            best = Some(score);
        }
    }
    if !sampled_any {
        return Err(IngestionError::Delimiter(
            "no data lines to sample".to_string(),
        ));
    }
    best.map(|s| s.delimiter).ok_or_else(|| {
        IngestionError::Delimiter(format!(
            "no candidate splits at least {:.0}% of sampled rows consistently",
            cfg.min_delimiter_consistency * 100.0
        ))
    })
}

fn score_delimiter(text: &str, delimiter: u8, limit: usize) -> Option<DelimiterScore> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut counts: Vec<usize> = Vec::new();
    for record in reader.records().take(limit) {
        counts.push(record.ok()?.len());
    }
    let header = *counts.first()?;

    let mut freq: Vec<(usize, usize)> = Vec::new();
    for &c in &counts {
        match freq.iter_mut().find(|(n, _)| *n == c) {
            Some((_, k)) => *k += 1,
            None => freq.push((c, 1)),
        }
    }
    // modal count; on equal frequency prefer the wider layout
    let (columns, hits) = freq
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))?;

    Some(DelimiterScore {
        delimiter,
        columns,
        consistency: hits as f64 / counts.len() as f64,
        matches_header: header == columns,
    })
}

fn normalize_headers(raw: &StringRecord) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(raw.len());
    for (i, h) in raw.iter().enumerate() {
        let trimmed = h.trim().trim_start_matches('\u{FEFF}').to_string();
        if trimmed.is_empty() || headers.contains(&trimmed) {
            headers.push(format!("column_{}", i + 1));
        } else {
            headers.push(trimmed);
        }
    }
    headers
}

fn find_column(headers: &[String], name: &str) -> Result<usize, IngestionError> {
    let wanted = name.trim();
    headers
        .iter()
        .position(|h| h == wanted)
        .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case(wanted)))
        .ok_or_else(|| IngestionError::UnknownColumn(wanted.to_string()))
}

/// Per-column statistics used by text-column detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub index: usize,
    pub values: usize,
    pub avg_chars: f64,
    pub avg_words: f64,
}

fn column_stats(index: usize, rows: &[&StringRecord], cfg: &IngestConfig) -> ColumnStats {
    let mut values = 0usize;
    let mut chars = 0usize;
    let mut words = 0usize;
    for row in rows {
        let Some(value) = row.get(index) else { continue };
        let value = value.trim();
        let len = value.chars().count();
        if len < cfg.min_value_chars || len > cfg.max_value_chars || looks_numeric(value) {
            continue;
        }
        values += 1;
        chars += len;
        words += value.split_whitespace().count();
    }
    let (avg_chars, avg_words) = if values == 0 {
        (0.0, 0.0)
    } else {
        (chars as f64 / values as f64, words as f64 / values as f64)
    };
    ColumnStats {
        index,
        values,
        avg_chars,
        avg_words,
    }
}

fn looks_numeric(value: &str) -> bool {
    value.replace(',', ".").replace(' ', "").parse::<f64>().is_ok()
}

/// Choose the "most textual" column: the greatest average length among columns whose
/// values are long and wordy enough.
pub fn detect_text_column(
    headers: &[String],
    rows: &[&StringRecord],
    cfg: &IngestConfig,
) -> Result<usize, IngestionError> {
    let width = rows
        .iter()
        .map(|r| r.len())
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or_default();

    let mut best: Option<ColumnStats> = None;
    for index in 0..width {
        let stats = column_stats(index, rows, cfg);
        debug!(
            "column {} '{}': avg {:.0} chars, ~{:.1} words over {} values",
            index,
            headers.get(index).map(String::as_str).unwrap_or("?"),
            stats.avg_chars,
            stats.avg_words,
            stats.values
        );
        if stats.values == 0
            || stats.avg_chars < cfg.min_avg_chars
            || stats.avg_words < cfg.min_avg_words
        {
            continue;
        }
        if best.as_ref().is_none_or(|b| stats.avg_chars > b.avg_chars) {
            best = Some(stats);
        }
    }

    match best {
        Some(stats) if stats.index < headers.len() => Ok(stats.index),
        Some(stats) => Err(IngestionError::NoTextColumn(format!(
            "best candidate is unnamed column {}",
            stats.index + 1
        ))),
        None => Err(IngestionError::NoTextColumn(format!(
            "no column averages at least {} chars and {} words",
            cfg.min_avg_chars, cfg.min_avg_words
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> IngestConfig {
        IngestConfig::default()
    }

    #[test]
    fn utf8_with_and_without_bom() {
        let (t, enc) = decode("a;b\nárvíztűrő;x\n".as_bytes(), 0.005).unwrap();
        assert_eq!(enc, "UTF-8");
        assert!(t.contains("árvíztűrő"));

        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("a;b\nő;ű\n".as_bytes());
        let (t, enc) = decode(&bytes, 0.005).unwrap();
        assert_eq!(enc, "UTF-8 (BOM)");
        assert!(t.starts_with("a;b"));
    }

    #[test]
    fn windows_1250_fallback() {
        let (bytes, _, _) = WINDOWS_1250.encode("szöveg;megjegyzés\nelső;Tűrhető, nem rossz\n");
        let (t, enc) = decode(&bytes, 0.005).unwrap();
        assert_eq!(enc, "windows-1250");
        assert!(t.contains("Tűrhető"));
        assert!(!t.contains('\u{FFFD}'));
    }

    #[test]
    fn binary_input_is_rejected() {
        let bytes: Vec<u8> = (0u8..32).cycle().take(400).collect();
        assert!(matches!(
            decode(&bytes, 0.005),
            Err(IngestionError::Encoding(_))
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(decode(b"", 0.005), Err(IngestionError::Empty)));
    }

    #[test]
    fn delimiter_prefers_consistent_candidate() {
        let text = "id;comment\n1;Jó volt, köszönöm\n2;Rossz, lassú, drága\n3;Rendben\n";
        assert_eq!(detect_delimiter(text, &cfg()).unwrap(), b';');

        let text = "id,comment\n1,\"Jó volt; köszönöm\"\n2,Rendben\n";
        assert_eq!(detect_delimiter(text, &cfg()).unwrap(), b',');

        let text = "id\tcomment\n1\tJó volt\n2\tRendben\n";
        assert_eq!(detect_delimiter(text, &cfg()).unwrap(), b'\t');
    }

    #[test]
    fn delimiter_tie_uses_priority() {
        // both ';' and ',' split every line into two columns
        let text = "a;b,c\n1;2,3\n";
        assert_eq!(detect_delimiter(text, &cfg()).unwrap(), b';');
    }

    #[test]
    fn single_column_answers_with_commas() {
        let text = "Válasz\nJó, de drága volt\nSzép hely, kedves személyzet\n\
                    Rossz, nagyon lassú\nNem tetszett, unalmas\n";
        assert_eq!(detect_delimiter(text, &cfg()).unwrap(), b';');
        let ing = ingest(text.as_bytes(), None, &cfg()).unwrap();
        assert_eq!(ing.headers, vec!["Válasz"]);
        assert_eq!(ing.records.len(), 4);
        assert_eq!(ing.records[1].text, "Szép hely, kedves személyzet");
    }

    #[test]
    fn quoted_multiline_answer_is_one_sampled_record() {
        let text = "id;valasz\n1;\"Első bekezdés, hosszú\n\nMásodik, rövid\"\n2;Rendben volt\n";
        assert_eq!(detect_delimiter(text, &cfg()).unwrap(), b';');
        let ing = ingest(text.as_bytes(), None, &cfg()).unwrap();
        assert_eq!(ing.records.len(), 2);
        assert!(ing.records[0].text.contains("\n\nMásodik"));
        assert_eq!(ing.records[1].source_row.values[0], "2");
    }

    #[test]
    fn inconsistent_layout_is_a_delimiter_error() {
        let text = "a;b,c\td\n\
                    a;b;c,d,e\tf\tg\th\n\
                    a;b;c;d,e\tf\n\
                    a,b,c,d,e;f\tg\th\n\
                    a;b;c;d;e,f,g,h\tg\th\ti\tj\n";
        assert!(matches!(
            detect_delimiter(text, &cfg()),
            Err(IngestionError::Delimiter(_))
        ));
        assert!(matches!(
            ingest(text.as_bytes(), None, &cfg()),
            Err(IngestionError::Delimiter(_))
        ));
    }

    #[test]
    fn single_column_file_uses_absent_delimiter() {
        let text = "megjegyzes\nNagyon jó volt az egész\nNem tetszett semmi\n";
        assert_eq!(detect_delimiter(text, &cfg()).unwrap(), b';');
    }

    #[test]
    fn text_column_is_the_longest_wordy_one() {
        let text = "id;datum;velemeny;pont\n\
                    1;2024-01-01;Nagyon elégedett vagyok a szolgáltatással.;5\n\
                    2;2024-01-02;Szörnyű volt az egész, soha többé.;1\n";
        let ing = ingest(text.as_bytes(), None, &cfg()).unwrap();
        assert_eq!(ing.text_column_name(), "velemeny");
        assert_eq!(ing.records.len(), 2);
        assert_eq!(ing.records[1].text, "Szörnyű volt az egész, soha többé.");
        assert_eq!(ing.records[1].source_row.values[3], "1");
        assert_eq!(ing.records[0].id, 0);
    }

    #[test]
    fn no_text_column_error() {
        let text = "a;b\n1;2\n3;4\n";
        assert!(matches!(
            ingest(text.as_bytes(), None, &cfg()),
            Err(IngestionError::NoTextColumn(_))
        ));
    }

    #[test]
    fn column_override_and_unknown_column() {
        let text = "rovid;hosszu\nJó nap ma;Ez egy sokkal hosszabb megjegyzés a termékről\n";
        let ing = ingest(text.as_bytes(), Some("ROVID"), &cfg()).unwrap();
        assert_eq!(ing.text_column, 0);
        assert!(matches!(
            ingest(text.as_bytes(), Some("nincs"), &cfg()),
            Err(IngestionError::UnknownColumn(_))
        ));
    }

    #[test]
    fn header_only_is_empty() {
        assert!(matches!(
            ingest(b"id;comment\n", None, &cfg()),
            Err(IngestionError::Empty)
        ));
    }

    #[test]
    fn duplicate_headers_are_renamed() {
        let rec = StringRecord::from(vec![" a ", "a", ""]);
        assert_eq!(normalize_headers(&rec), vec!["a", "column_2", "column_3"]);
    }
}
