//! The aggregated, read-only report model.

use serde::Serialize;

use crate::error::{ItemAnalysisError, PipelineError};
use crate::ingest::{RawRecord, SourceRow};
use crate::linguistic::{Entity, LinguisticAnnotation};
use crate::models::Capabilities;
use crate::reconcile::{SentimentLabel, SentimentResult, SentimentSource};
use crate::topics::{Topic, TopicAssignment, TopicOutcome, TopicStatus};

/// Flattened view of a [`LinguisticAnnotation`] kept in the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinguisticSummary {
    pub token_count: usize,
    pub sentence_count: usize,
    pub positive_elements: String,
    pub negative_elements: String,
    pub pos_summary: String,
    pub dependency_summary: String,
    pub relation_summary: String,
    pub lemmatized: String,
    pub sentence_breakdown: String,
    pub entities: Vec<Entity>,
}

impl LinguisticSummary {
    pub fn from_annotation(
        annotation: &LinguisticAnnotation,
        positive_threshold: f64,
        negative_threshold: f64,
    ) -> Self {
        use crate::lexicon::Polarity;
        Self {
            token_count: annotation.content_token_count(),
            sentence_count: annotation.sentence_count,
            positive_elements: annotation.elements(Polarity::Positive),
            negative_elements: annotation.elements(Polarity::Negative),
            pos_summary: annotation.pos_summary(),
            dependency_summary: annotation.dependency_summary(),
            relation_summary: annotation.relation_summary(),
            lemmatized: annotation.lemmatized(),
            sentence_breakdown: annotation
                .sentence_breakdown(positive_threshold, negative_threshold),
            entities: annotation.entities.clone(),
        }
    }
}

/// Per-item result of the analysis stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub id: usize,
    pub sentiment: SentimentResult,
    pub annotation: LinguisticAnnotation,
    pub linguistics: LinguisticSummary,
    pub error: Option<ItemAnalysisError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportItem {
    pub id: usize,
    pub source_row: SourceRow,
    pub text: String,
    pub sentiment: SentimentResult,
    /// Full annotation: tokens, entities, dependency edges, lexical polarity.
    pub annotation: LinguisticAnnotation,
    /// Flattened views of `annotation` for tabular export.
    pub linguistics: LinguisticSummary,
    pub topic: TopicAssignment,
    /// Set when the item could not be analyzed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub source_name: String,
    pub encoding: String,
    pub delimiter: String,
    pub text_column: String,
    pub headers: Vec<String>,
    pub generated_at: String,
    /// Detected corpus language (ISO 639-3), if any.
    pub language: Option<String>,
    pub capabilities: Capabilities,
    pub embedding_source: String,
    pub topic_status: TopicStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStats {
    pub label: SentimentLabel,
    pub count: usize,
    pub share: f64,
    pub mean_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCount {
    pub source: SentimentSource,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicStats {
    pub id: usize,
    pub terms: Vec<String>,
    pub count: usize,
    pub mean_score: f64,
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub total_items: usize,
    pub empty_items: usize,
    pub error_count: usize,
    pub mean_score: f64,
    pub mean_lexical_score: f64,
    pub labels: Vec<LabelStats>,
    pub sources: Vec<SourceCount>,
    pub topics: Vec<TopicStats>,
    pub unassigned_count: usize,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

impl CorpusStats {
    pub fn compute(items: &[ReportItem], topics: &[Topic]) -> Self {
        let total = items.len();
        let labels = SentimentLabel::ALL
            .iter()
            .map(|&label| {
                let matching: Vec<&ReportItem> =
                    items.iter().filter(|i| i.sentiment.label == label).collect();
                LabelStats {
                    label,
                    count: matching.len(),
                    share: if total == 0 {
                        0.0
                    } else {
                        matching.len() as f64 / total as f64
                    },
                    mean_score: mean(matching.iter().map(|i| i.sentiment.score)),
                }
            })
            .collect();
        let sources = SentimentSource::ALL
            .iter()
            .map(|&source| SourceCount {
                source,
                count: items.iter().filter(|i| i.sentiment.source == source).count(),
            })
            .filter(|s| s.count > 0)
            .collect();
        let topic_stats = topics
            .iter()
            .map(|topic| {
                let members: Vec<&ReportItem> = items
                    .iter()
                    .filter(|i| i.topic.topic_id == Some(topic.id))
                    .collect();
                let count_label =
                    |l: SentimentLabel| members.iter().filter(|i| i.sentiment.label == l).count();
                TopicStats {
                    id: topic.id,
                    terms: topic.terms.clone(),
                    count: members.len(),
                    mean_score: mean(members.iter().map(|i| i.sentiment.score)),
                    positive: count_label(SentimentLabel::Positive),
                    neutral: count_label(SentimentLabel::Neutral),
                    negative: count_label(SentimentLabel::Negative),
                }
            })
            .collect();

        CorpusStats {
            total_items: total,
            empty_items: items.iter().filter(|i| i.text.trim().is_empty()).count(),
            error_count: items.iter().filter(|i| i.error.is_some()).count(),
            mean_score: mean(items.iter().map(|i| i.sentiment.score)),
            mean_lexical_score: mean(items.iter().map(|i| i.sentiment.lexical_score)),
            labels,
            sources,
            topics: topic_stats,
            unassigned_count: items.iter().filter(|i| i.topic.is_unassigned()).count(),
        }
    }

    pub fn label(&self, label: SentimentLabel) -> Option<&LabelStats> {
        self.labels.iter().find(|l| l.label == label)
    }
}

/// Immutable once built; only getters are exposed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportModel {
    metadata: ReportMetadata,
    items: Vec<ReportItem>,
    topics: Vec<Topic>,
    corpus_stats: CorpusStats,
}

impl ReportModel {
    pub fn metadata(&self) -> &ReportMetadata {
        &self.metadata
    }

    /// Items in input row order.
    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn corpus_stats(&self) -> &CorpusStats {
        &self.corpus_stats
    }
}

/// Collects per-item outcomes in any order and restores record order by id.
pub struct ReportBuilder {
    records: Vec<RawRecord>,
    outcomes: Vec<Option<ItemOutcome>>,
}

impl ReportBuilder {
    pub fn new(records: Vec<RawRecord>) -> Self {
        let outcomes = vec![None; records.len()];
        Self { records, outcomes }
    }

    /// Record one outcome. Each id must be seen exactly once.
    pub fn add(&mut self, outcome: ItemOutcome) -> Result<(), PipelineError> {
        let id = outcome.id;
        let slot = self
            .outcomes
            .get_mut(id)
            .ok_or_else(|| PipelineError::Aggregation(format!("unknown item id {id}")))?;
        if slot.is_some() {
            return Err(PipelineError::Aggregation(format!("duplicate item id {id}")));
        }
        *slot = Some(outcome);
        Ok(())
    }

    pub fn build(
        self,
        metadata: ReportMetadata,
        topics: TopicOutcome,
    ) -> Result<ReportModel, PipelineError> {
        if topics.assignments.len() != self.records.len() {
            return Err(PipelineError::Aggregation(format!(
                "{} topic assignments for {} items",
                topics.assignments.len(),
                self.records.len()
            )));
        }
        let mut items = Vec::with_capacity(self.records.len());
        for ((record, outcome), topic) in self
            .records
            .into_iter()
            .zip(self.outcomes)
            .zip(topics.assignments)
        {
            let outcome = outcome.ok_or_else(|| {
                PipelineError::Aggregation(format!("missing result for item {}", record.id))
            })?;
            items.push(ReportItem {
                id: record.id,
                source_row: record.source_row,
                text: record.text,
                sentiment: outcome.sentiment,
                annotation: outcome.annotation,
                linguistics: outcome.linguistics,
                topic,
                error: outcome.error.map(|e| e.to_string()),
            });
        }
        let corpus_stats = CorpusStats::compute(&items, &topics.topics);
        Ok(ReportModel {
            metadata,
            items,
            topics: topics.topics,
            corpus_stats,
        })
    }
}
