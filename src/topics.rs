//! Corpus-wide topic discovery: embed, reduce, cluster, describe.
//!
//! Clustering is DBSCAN over cosine distance, so the number of topics is not fixed
//! up front and outliers stay unassigned. `eps` is chosen from the data (median
//! k-distance); every randomized step is seeded from [`TopicConfig::seed`].

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use ndarray::{Array2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::TopicConfig;
use crate::embedding::SentenceEmbedder;
use crate::lexicon::Lexicon;

/// One text handed to the discoverer.
#[derive(Debug, Clone, Default)]
pub struct TopicDocument {
    pub text: String,
    /// Content lemmas (stop words already removed).
    pub terms: Vec<String>,
}

/// Topic of one item. `topic_id == None` is the "unassigned" sentinel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicAssignment {
    pub topic_id: Option<usize>,
    pub topic_terms: Vec<String>,
}

impl TopicAssignment {
    pub fn unassigned() -> Self {
        Self::default()
    }

    pub fn is_unassigned(&self) -> bool {
        self.topic_id.is_none()
    }

    /// `-1` for unassigned, as spreadsheets expect a number.
    pub fn id_label(&self) -> String {
        self.topic_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-1".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topic {
    pub id: usize,
    pub terms: Vec<String>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TopicStatus {
    Discovered { topics: usize, min_samples: usize, eps: f32 },
    /// Documented degenerate outcome, not an error.
    Skipped { reason: String },
}

impl TopicStatus {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TopicStatus::Skipped { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicOutcome {
    /// One entry per input document, same order.
    pub assignments: Vec<TopicAssignment>,
    pub topics: Vec<Topic>,
    pub status: TopicStatus,
}

impl TopicOutcome {
    fn skipped(n: usize, reason: String) -> Self {
        warn!("topic modeling skipped: {reason}");
        Self {
            assignments: vec![TopicAssignment::unassigned(); n],
            topics: Vec::new(),
            status: TopicStatus::Skipped { reason },
        }
    }
}

pub struct TopicDiscoverer {
    embedder: Arc<dyn SentenceEmbedder>,
    lexicon: Arc<Lexicon>,
    cfg: TopicConfig,
}

impl TopicDiscoverer {
    pub fn new(
        embedder: Arc<dyn SentenceEmbedder>,
        lexicon: Arc<Lexicon>,
        cfg: TopicConfig,
    ) -> Self {
        Self {
            embedder,
            lexicon,
            cfg,
        }
    }

    /// Partition `docs` into topics. Runs to completion once started.
    pub fn discover(&self, docs: &[TopicDocument]) -> TopicOutcome {
        let valid: Vec<usize> = (0..docs.len()).filter(|&i| !docs[i].terms.is_empty()).collect();
        if valid.len() < self.cfg.min_corpus_size {
            return TopicOutcome::skipped(
                docs.len(),
                format!(
                    "{} analyzable texts, at least {} required",
                    valid.len(),
                    self.cfg.min_corpus_size
                ),
            );
        }

        let embedded: Vec<(usize, Vec<f32>)> = valid
            .par_iter()
            .map(|&i| (i, self.embedder.embed(&docs[i].text)))
            .collect();
        let embedded: Vec<(usize, Vec<f32>)> = embedded
            .into_iter()
            .filter(|(_, v)| v.iter().any(|x| *x != 0.0))
            .collect();
        if embedded.len() < self.cfg.min_corpus_size {
            return TopicOutcome::skipped(
                docs.len(),
                format!("only {} texts produced a usable embedding", embedded.len()),
            );
        }

        let dim = self.embedder.dim();
        let (members, rows): (Vec<usize>, Vec<Vec<f32>>) = embedded.into_iter().unzip();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let Ok(matrix) = Array2::from_shape_vec((members.len(), dim), flat) else {
            return TopicOutcome::skipped(docs.len(), "embedding dimension mismatch".to_string());
        };
        let reduced = normalize_rows(random_projection(matrix, self.cfg.reduce_to, self.cfg.seed));

        let total = members.len();
        let sampled = sample_rows(total, self.cfg.max_topic_items, self.cfg.seed);
        if sampled.len() < total {
            info!(
                "clustering a seeded sample of {} of {total} texts, attaching the rest",
                sampled.len()
            );
        }
        let distances = cosine_distances(&reduced.select(Axis(0), &sampled));

        let n = sampled.len();
        let min_samples = self.cfg.min_topic_size.min((n / 5).max(2));
        let eps = choose_eps(&distances, min_samples, &self.cfg);
        debug!("clustering {n} texts with min_samples={min_samples} eps={eps:.3}");
        let labels = dbscan(&distances, eps, min_samples);
        drop(distances);

        // clusters hold rows of `reduced`
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        let mut renumber: HashMap<usize, usize> = HashMap::new();
        for (pos, label) in labels.iter().enumerate() {
            if let Some(raw) = label {
                let next = renumber.len();
                let id = *renumber.entry(*raw).or_insert(next);
                if id == clusters.len() {
                    clusters.push(Vec::new());
                }
                clusters[id].push(sampled[pos]);
            }
        }
        // clusters below min_samples are noise
        clusters.retain(|c| c.len() >= min_samples);

        if sampled.len() < total {
            let mut row_cluster: Vec<Option<usize>> = vec![None; total];
            for (id, cluster) in clusters.iter().enumerate() {
                for &row in cluster {
                    row_cluster[row] = Some(id);
                }
            }
            let mut in_sample = vec![false; total];
            for &row in &sampled {
                in_sample[row] = true;
            }
            let labelled: Vec<usize> = (0..total).filter(|&r| row_cluster[r].is_some()).collect();
            let attached: Vec<(usize, usize)> = (0..total)
                .into_par_iter()
                .filter(|&r| !in_sample[r])
                .filter_map(|r| {
                    let nearest = nearest_within(&reduced, r, &labelled, eps)?;
                    Some((r, row_cluster[nearest]?))
                })
                .collect();
            for (row, id) in attached {
                clusters[id].push(row);
            }
        }
        let clusters: Vec<Vec<usize>> = clusters
            .into_iter()
            .map(|c| {
                let mut ids: Vec<usize> = c.into_iter().map(|row| members[row]).collect();
                ids.sort_unstable();
                ids
            })
            .collect();
        let mut assignments = vec![TopicAssignment::unassigned(); docs.len()];

        let term_lists = self.topic_terms(docs, &valid, &clusters);
        let mut topics = Vec::with_capacity(clusters.len());
        for (id, (cluster, terms)) in clusters.iter().zip(term_lists).enumerate() {
            for &doc in cluster {
                assignments[doc] = TopicAssignment {
                    topic_id: Some(id),
                    topic_terms: terms.clone(),
                };
            }
            topics.push(Topic {
                id,
                terms,
                size: cluster.len(),
            });
        }
        info!(
            "discovered {} topics, {} of {} texts unassigned",
            topics.len(),
            assignments.iter().filter(|a| a.is_unassigned()).count(),
            docs.len()
        );

        TopicOutcome {
            assignments,
            status: TopicStatus::Discovered {
                topics: topics.len(),
                min_samples,
                eps,
            },
            topics,
        }
    }

    /// c-TF-IDF: `tf(t, c) * ln(1 + A / f(t))` with `A` the average number of terms
    /// per cluster and `f(t)` the frequency of `t` over all analyzable texts.
    fn topic_terms(
        &self,
        docs: &[TopicDocument],
        valid: &[usize],
        clusters: &[Vec<usize>],
    ) -> Vec<Vec<String>> {
        if clusters.is_empty() {
            return Vec::new();
        }
        let keep = |t: &&String| !self.lexicon.is_stop_word(t);

        let mut corpus_freq: HashMap<&str, usize> = HashMap::new();
        for &i in valid {
            for t in docs[i].terms.iter().filter(keep) {
                *corpus_freq.entry(t.as_str()).or_insert(0) += 1;
            }
        }

        let cluster_tf: Vec<HashMap<&str, usize>> = clusters
            .iter()
            .map(|cluster| {
                let mut tf = HashMap::new();
                for &doc in cluster {
                    for t in docs[doc].terms.iter().filter(keep) {
                        *tf.entry(t.as_str()).or_insert(0) += 1;
                    }
                }
                tf
            })
            .collect();
        let total_terms: usize = cluster_tf.iter().map(|tf| tf.values().sum::<usize>()).sum();
        let avg_terms = total_terms as f64 / clusters.len() as f64;

        cluster_tf
            .iter()
            .map(|tf| {
                let mut scored: Vec<(&str, f64)> = tf
                    .iter()
                    .map(|(term, &count)| {
                        let f = corpus_freq.get(term).copied().unwrap_or(count).max(1) as f64;
                        (*term, count as f64 * (1.0 + avg_terms / f).ln())
                    })
                    .collect();
                scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                scored
                    .into_iter()
                    .take(self.cfg.top_k)
                    .map(|(t, _)| t.to_string())
                    .collect()
            })
            .collect()
    }
}

/// Seeded Gaussian random projection to `target` columns; identity when the input
/// is already narrow enough.
pub fn random_projection(matrix: Array2<f32>, target: usize, seed: u64) -> Array2<f32> {
    let dim = matrix.ncols();
    if dim <= target {
        return matrix;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let scale = 1.0 / (target as f32).sqrt();
    let projection = Array2::from_shape_fn((dim, target), |_| {
        let x: f32 = StandardNormal.sample(&mut rng);
        x * scale
    });
    matrix.dot(&projection)
}

fn normalize_rows(mut matrix: Array2<f32>) -> Array2<f32> {
    for mut row in matrix.axis_iter_mut(Axis(0)) {
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|x| x / norm);
        }
    }
    matrix
}

/// Sorted row indices to cluster: all rows, or a seeded sample of `cap` of them.
fn sample_rows(total: usize, cap: usize, seed: u64) -> Vec<usize> {
    if total <= cap {
        return (0..total).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = rand::seq::index::sample(&mut rng, total, cap).into_vec();
    rows.sort_unstable();
    rows
}

/// Closest of `candidates` to `row` by cosine distance, if within `eps`.
/// Computed one row at a time; no distance matrix is kept.
fn nearest_within(rows: &Array2<f32>, row: usize, candidates: &[usize], eps: f32) -> Option<usize> {
    let target = rows.row(row);
    candidates
        .iter()
        .map(|&c| (c, (1.0 - target.dot(&rows.row(c))).max(0.0)))
        .filter(|(_, d)| *d <= eps)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c)
}

/// Pairwise cosine distances of L2-normalised rows.
pub fn cosine_distances(rows: &Array2<f32>) -> Array2<f32> {
    let sims = rows.dot(&rows.t());
    sims.mapv(|s| (1.0 - s).max(0.0))
}

/// Median distance to the `(min_samples - 1)`-th nearest neighbour, scaled and
/// clamped to the configured bounds.
fn choose_eps(distances: &Array2<f32>, min_samples: usize, cfg: &TopicConfig) -> f32 {
    let n = distances.nrows();
    let k = min_samples.saturating_sub(1).max(1);
    let mut kdist: Vec<f32> = (0..n)
        .map(|i| {
            let mut row: Vec<f32> = (0..n).filter(|&j| j != i).map(|j| distances[[i, j]]).collect();
            row.sort_by(|a, b| a.total_cmp(b));
            row.get(k - 1).copied().unwrap_or(1.0)
        })
        .collect();
    kdist.sort_by(|a, b| a.total_cmp(b));
    let median = kdist.get(n / 2).copied().unwrap_or(0.0);
    (median * cfg.eps_scale).clamp(cfg.min_eps, cfg.max_eps)
}

/// Classic DBSCAN over a precomputed distance matrix. `None` marks noise.
pub fn dbscan(distances: &Array2<f32>, eps: f32, min_samples: usize) -> Vec<Option<usize>> {
    let n = distances.nrows();
    let neighbours =
        |i: usize| -> Vec<usize> { (0..n).filter(|&j| distances[[i, j]] <= eps).collect() };

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut cluster = 0;
    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seeds = neighbours(i);
        if seeds.len() < min_samples {
            continue;
        }
        labels[i] = Some(cluster);
        let mut queue = seeds;
        let mut q = 0;
        while q < queue.len() {
            let j = queue[q];
            q += 1;
            if labels[j].is_none() {
                labels[j] = Some(cluster);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;
            let more = neighbours(j);
            if more.len() >= min_samples {
                queue.extend(more.into_iter().filter(|m| !visited[*m]));
            }
        }
        cluster += 1;
    }
    labels
}
