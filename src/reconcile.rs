//! Combining the lexical and the model-based sentiment signal.

use std::fmt;
use std::sync::Arc;

use log::warn;
use serde::Serialize;

use crate::classifier::{SentimentClassifier, collapse_distribution};
use crate::config::ReconcileConfig;
use crate::error::ItemAnalysisError;
use crate::linguistic::LinguisticAnnotation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Neutral,
        SentimentLabel::Negative,
    ];

    /// The fixed thresholding rule: strictly above `positive_threshold` is
    /// positive, strictly below `negative_threshold` negative, neutral otherwise.
    pub fn from_score(score: f64, cfg: &ReconcileConfig) -> Self {
        if score > cfg.positive_threshold {
            SentimentLabel::Positive
        } else if score < cfg.negative_threshold {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which signal produced the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentSource {
    /// Both signals agreed and were averaged.
    Hybrid,
    Model,
    Lexical,
    /// No classifier was available for the run.
    LexicalOnly,
    /// The item could not be analyzed.
    Failed,
}

impl SentimentSource {
    pub const ALL: [SentimentSource; 5] = [
        SentimentSource::Hybrid,
        SentimentSource::Model,
        SentimentSource::Lexical,
        SentimentSource::LexicalOnly,
        SentimentSource::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentSource::Hybrid => "hybrid",
            SentimentSource::Model => "model",
            SentimentSource::Lexical => "lexical",
            SentimentSource::LexicalOnly => "lexical_only",
            SentimentSource::Failed => "failed",
        }
    }
}

impl fmt::Display for SentimentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
    pub source: SentimentSource,
    pub explanation: String,
    pub lexical_score: f64,
    pub lexical_confidence: f64,
    pub model_label: Option<SentimentLabel>,
    pub model_score: Option<f64>,
    pub model_confidence: Option<f64>,
}

impl SentimentResult {
    /// Neutral, zero-confidence result for an item whose analysis failed.
    pub fn failed(error: &ItemAnalysisError) -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.0,
            confidence: 0.0,
            source: SentimentSource::Failed,
            explanation: format!("analysis failed: {error}"),
            lexical_score: 0.0,
            lexical_confidence: 0.0,
            model_label: None,
            model_score: None,
            model_confidence: None,
        }
    }
}

struct ModelSignal {
    label: SentimentLabel,
    score: f64,
    confidence: f64,
}

/// Applies the reconciliation policy of [`ReconcileConfig`].
pub struct Reconciler {
    classifier: Option<Arc<dyn SentimentClassifier>>,
    cfg: ReconcileConfig,
}

impl Reconciler {
    pub fn new(classifier: Option<Arc<dyn SentimentClassifier>>, cfg: ReconcileConfig) -> Self {
        Self { classifier, cfg }
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.cfg
    }

    /// Final sentiment of `text` given its annotation. Never fails: classifier
    /// problems degrade to the lexical signal.
    pub fn reconcile(&self, text: &str, annotation: &LinguisticAnnotation) -> SentimentResult {
        let lex = &annotation.lexical_polarity;
        let lexical_label = SentimentLabel::from_score(lex.score, &self.cfg);

        let Some(classifier) = &self.classifier else {
            return self.lexical(
                annotation,
                SentimentSource::LexicalOnly,
                format!(
                    "classifier unavailable; lexical {lexical_label} ({:+.3}, confidence {:.2})",
                    lex.score, lex.confidence
                ),
            );
        };
        if text.trim().is_empty() {
            return self.lexical(annotation, SentimentSource::Lexical, "empty text".to_string());
        }

        let model = match self.model_signal(classifier.as_ref(), text) {
            Ok(m) => m,
            Err(e) => {
                warn!("classifier failed, using lexical signal: {e}");
                return self.lexical(
                    annotation,
                    SentimentSource::Lexical,
                    format!("{e}; lexical {lexical_label} ({:+.3})", lex.score),
                );
            }
        };

        let signals = format!(
            "lexical {lexical_label} {:+.3} @ {:.2}, model {} {:+.3} @ {:.2}",
            lex.score, lex.confidence, model.label, model.score, model.confidence
        );

        let (score, confidence, source, explanation) = if lex.confidence
            < self.cfg.lexical_min_confidence
        {
            (
                model.score,
                model.confidence,
                SentimentSource::Model,
                format!("low lexical coverage, model authoritative ({signals})"),
            )
        } else if lexical_label == model.label {
            let weight = lex.confidence + model.confidence;
            let score = if weight > 0.0 {
                (lex.score * lex.confidence + model.score * model.confidence) / weight
            } else {
                (lex.score + model.score) / 2.0
            };
            (
                score,
                lex.confidence.max(model.confidence),
                SentimentSource::Hybrid,
                format!("signals agree ({signals})"),
            )
        } else if (lex.confidence - model.confidence).abs() <= self.cfg.confidence_epsilon {
            (
                model.score,
                model.confidence,
                SentimentSource::Model,
                format!("disagreement at similar confidence, model preferred ({signals})"),
            )
        } else if lex.confidence > model.confidence {
            (
                lex.score,
                lex.confidence,
                SentimentSource::Lexical,
                format!("disagreement, lexical more confident ({signals})"),
            )
        } else {
            (
                model.score,
                model.confidence,
                SentimentSource::Model,
                format!("disagreement, model more confident ({signals})"),
            )
        };

        SentimentResult {
            label: SentimentLabel::from_score(score, &self.cfg),
            score,
            confidence,
            source,
            explanation,
            lexical_score: lex.score,
            lexical_confidence: lex.confidence,
            model_label: Some(model.label),
            model_score: Some(model.score),
            model_confidence: Some(model.confidence),
        }
    }

    fn model_signal(
        &self,
        classifier: &dyn SentimentClassifier,
        text: &str,
    ) -> Result<ModelSignal, ItemAnalysisError> {
        let distribution = classifier.classify(text)?;
        let prediction = collapse_distribution(&distribution)
            .map_err(|e| ItemAnalysisError::Classifier(format!("unrecognised label scheme: {e}")))?;
        let score = prediction.score();
        if !score.is_finite() {
            return Err(ItemAnalysisError::Classifier(
                "non-finite model score".to_string(),
            ));
        }
        Ok(ModelSignal {
            label: SentimentLabel::from_score(score, &self.cfg),
            score,
            confidence: prediction.confidence().clamp(0.0, 1.0),
        })
    }

    fn lexical(
        &self,
        annotation: &LinguisticAnnotation,
        source: SentimentSource,
        explanation: String,
    ) -> SentimentResult {
        let lex = &annotation.lexical_polarity;
        SentimentResult {
            label: SentimentLabel::from_score(lex.score, &self.cfg),
            score: lex.score,
            confidence: lex.confidence,
            source,
            explanation,
            lexical_score: lex.score,
            lexical_confidence: lex.confidence,
            model_label: None,
            model_score: None,
            model_confidence: None,
        }
    }
}
