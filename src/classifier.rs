//! Model-based sentiment: the classifier capability and label-scheme handling.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ItemAnalysisError, ModelUnavailableError};

/// One entry of a classifier's probability distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: String,
    pub score: f64,
}

/// Text -> probability distribution over the classifier's own labels.
///
/// Implementations must be deterministic: the same text always yields the same
/// distribution.
pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Vec<ClassScore>, ItemAnalysisError>;
}

/// Classifier output mapped onto negative / neutral / positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrediction {
    pub negative: f64,
    pub neutral: f64,
    pub positive: f64,
}

impl ModelPrediction {
    /// Signed score in `-1..=1`.
    pub fn score(&self) -> f64 {
        (self.positive - self.negative).clamp(-1.0, 1.0)
    }

    /// Probability of the most likely collapsed class.
    pub fn confidence(&self) -> f64 {
        self.negative.max(self.neutral).max(self.positive)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Negative,
    Neutral,
    Positive,
}

fn named_bucket(label: &str) -> Option<Bucket> {
    let upper = label.to_uppercase();
    if upper.contains("NEU") || upper.contains("SEMLEGES") {
        Some(Bucket::Neutral)
    } else if upper.contains("NEG") {
        Some(Bucket::Negative)
    } else if upper.contains("POS") || upper.contains("POZ") {
        Some(Bucket::Positive)
    } else {
        None
    }
}

fn numeric_index(label: &str) -> Option<usize> {
    let upper = label.to_uppercase();
    upper.strip_prefix("LABEL_").unwrap_or(&upper).parse().ok()
}

/// Map numeric class `index` of a `max_index + 1` class scheme to a bucket.
fn numeric_bucket(index: usize, class_count: usize, max_index: usize) -> Bucket {
    match class_count {
        2 => {
            if index == 0 {
                Bucket::Negative
            } else {
                Bucket::Positive
            }
        }
        3 => match index {
            0 => Bucket::Negative,
            1 => Bucket::Neutral,
            _ => Bucket::Positive,
        },
        5 => match index {
            0 | 1 => Bucket::Negative,
            2 => Bucket::Neutral,
            _ => Bucket::Positive,
        },
        _ => {
            let low = max_index as f64 / 3.0;
            let high = max_index as f64 * 2.0 / 3.0;
            let i = index as f64;
            if i <= low {
                Bucket::Negative
            } else if i >= high {
                Bucket::Positive
            } else {
                Bucket::Neutral
            }
        }
    }
}

/// How a classifier names its classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScheme {
    /// `negative`, `NEU`, `pozitív`, ...
    Named,
    /// `LABEL_0`, `LABEL_1`, ... or bare indices.
    Numeric,
}

/// Classify a label set. Every label must follow the same scheme; a mix of named
/// and numeric labels, or a label that fits neither, is rejected.
pub fn label_scheme<'a, I>(labels: I) -> Result<LabelScheme, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scheme: Option<LabelScheme> = None;
    for label in labels {
        let this = if named_bucket(label).is_some() {
            LabelScheme::Named
        } else if numeric_index(label).is_some() {
            LabelScheme::Numeric
        } else {
            return Err(format!("label '{label}' is neither a sentiment name nor an index"));
        };
        match scheme {
            None => scheme = Some(this),
            Some(s) if s != this => {
                return Err(format!("label '{label}' mixes named and numeric labels"));
            }
            Some(_) => {}
        }
    }
    scheme.ok_or_else(|| "no labels".to_string())
}

/// Collapse a label distribution into negative / neutral / positive.
///
/// Named labels are bucketed by name; `LABEL_n` indices are mapped by class count
/// (3: neg/neu/pos, 5: two negative, one neutral, two positive, anything else by
/// thirds of the index range). Fails when [`label_scheme`] rejects the labels.
pub fn collapse_distribution(scores: &[ClassScore]) -> Result<ModelPrediction, String> {
    let mut out = ModelPrediction {
        negative: 0.0,
        neutral: 0.0,
        positive: 0.0,
    };
    let add = |out: &mut ModelPrediction, bucket: Bucket, p: f64| match bucket {
        Bucket::Negative => out.negative += p,
        Bucket::Neutral => out.neutral += p,
        Bucket::Positive => out.positive += p,
    };

    match label_scheme(scores.iter().map(|s| s.label.as_str()))? {
        LabelScheme::Named => {
            for s in scores {
                if let Some(bucket) = named_bucket(&s.label) {
                    add(&mut out, bucket, s.score);
                }
            }
        }
        LabelScheme::Numeric => {
            let numeric: Vec<(usize, f64)> = scores
                .iter()
                .filter_map(|s| numeric_index(&s.label).map(|i| (i, s.score)))
                .collect();
            let max_index = numeric.iter().map(|(i, _)| *i).max().unwrap_or_default();
            for (index, p) in &numeric {
                add(&mut out, numeric_bucket(*index, numeric.len(), max_index), *p);
            }
        }
    }
    Ok(out)
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("valid regex"))
}

/// Lowercased word tokens as seen by [`NaiveBayesClassifier`].
pub fn classifier_tokens(text: &str) -> Vec<String> {
    word_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Multinomial naive Bayes stored as log-probabilities (`classifier.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayesClassifier {
    pub labels: Vec<String>,
    pub log_priors: Vec<f64>,
    /// token -> per-label log P(token | label)
    pub log_likelihoods: HashMap<String, Vec<f64>>,
    /// Per-label log-probability of an unseen token.
    pub unknown_log_likelihoods: Vec<f64>,
}

impl NaiveBayesClassifier {
    /// Train with Laplace smoothing `alpha` from `(text, label)` pairs.
    pub fn train(examples: &[(&str, &str)], alpha: f64) -> Self {
        let mut labels: Vec<String> = examples.iter().map(|(_, l)| l.to_string()).collect();
        labels.sort();
        labels.dedup();

        let mut doc_counts = vec![0usize; labels.len()];
        let mut word_totals = vec![0usize; labels.len()];
        let mut counts: HashMap<String, Vec<usize>> = HashMap::new();
        for (text, label) in examples {
            let Ok(class) = labels.binary_search_by(|l| l.as_str().cmp(label)) else {
                continue;
            };
            doc_counts[class] += 1;
            for token in classifier_tokens(text) {
                counts.entry(token).or_insert_with(|| vec![0; labels.len()])[class] += 1;
                word_totals[class] += 1;
            }
        }

        let vocab = counts.len() as f64;
        let total_docs = examples.len().max(1) as f64;
        let denominators: Vec<f64> = word_totals
            .iter()
            .map(|&t| t as f64 + alpha * vocab.max(1.0))
            .collect();
        let log_likelihoods = counts
            .into_iter()
            .map(|(token, per_class)| {
                let logs = per_class
                    .iter()
                    .zip(&denominators)
                    .map(|(&c, d)| ((c as f64 + alpha) / d).ln())
                    .collect();
                (token, logs)
            })
            .collect();

        Self {
            log_priors: doc_counts
                .iter()
                .map(|&c| (c.max(1) as f64 / total_docs).ln())
                .collect(),
            unknown_log_likelihoods: denominators.iter().map(|d| (alpha / d).ln()).collect(),
            labels,
            log_likelihoods,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ModelUnavailableError> {
        if !path.exists() {
            return Err(ModelUnavailableError::Missing {
                kind: "classifier",
                path: path.to_path_buf(),
            });
        }
        let invalid = |reason: String| ModelUnavailableError::Invalid {
            kind: "classifier",
            path: path.to_path_buf(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let model: Self = serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
        model.check_shape().map_err(invalid)?;
        label_scheme(model.labels.iter().map(String::as_str)).map_err(invalid)?;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)
    }

    fn check_shape(&self) -> Result<(), String> {
        let n = self.labels.len();
        if n < 2 {
            return Err("at least two labels required".to_string());
        }
        if self.log_priors.len() != n || self.unknown_log_likelihoods.len() != n {
            return Err("prior/unknown vectors do not match label count".to_string());
        }
        if let Some((token, _)) = self.log_likelihoods.iter().find(|(_, v)| v.len() != n) {
            return Err(format!("likelihood vector of '{token}' has wrong length"));
        }
        Ok(())
    }
}

impl SentimentClassifier for NaiveBayesClassifier {
    fn classify(&self, text: &str) -> Result<Vec<ClassScore>, ItemAnalysisError> {
        let mut log_scores = self.log_priors.clone();
        for token in classifier_tokens(text) {
            let per_class = self
                .log_likelihoods
                .get(&token)
                .unwrap_or(&self.unknown_log_likelihoods);
            for (acc, lp) in log_scores.iter_mut().zip(per_class) {
                *acc += lp;
            }
        }
        if log_scores.iter().any(|s| s.is_nan()) {
            return Err(ItemAnalysisError::Classifier(
                "non-finite class score".to_string(),
            ));
        }

        // softmax
        let max = log_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = log_scores.iter().map(|s| (s - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        Ok(self
            .labels
            .iter()
            .zip(exps)
            .map(|(label, e)| ClassScore {
                label: label.clone(),
                score: e / sum,
            })
            .collect())
    }
}
