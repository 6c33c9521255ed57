//! Sentence embeddings used by topic discovery.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use ndarray::{Array2, ArrayView1};
use rust_stemmers::{Algorithm, Stemmer};

use crate::classifier::classifier_tokens;
use crate::error::ModelUnavailableError;
use crate::lexicon::Lexicon;

/// Text -> fixed-dimension vector.
pub trait SentenceEmbedder: Send + Sync {
    fn dim(&self) -> usize;

    /// L2-normalised embedding; all zeros when nothing in the text is known.
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Short identifier recorded in the report.
    fn name(&self) -> &str;
}

pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Pretrained word vectors in word2vec text format (`embeddings.txt`).
///
/// The first line is `<vocab size> <dim>`, each following line a word and its
/// components separated by spaces. A sentence vector is the mean of its known
/// token vectors; unknown tokens are retried with their Hungarian stem.
pub struct WordVectorEmbedder {
    word2idx: HashMap<String, usize>,
    vectors: Array2<f32>,
    stemmer: Stemmer,
}

impl WordVectorEmbedder {
    pub fn load(path: &Path) -> Result<Self, ModelUnavailableError> {
        if !path.exists() {
            return Err(ModelUnavailableError::Missing {
                kind: "embedding",
                path: path.to_path_buf(),
            });
        }
        let invalid = |reason: String| ModelUnavailableError::Invalid {
            kind: "embedding",
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|e| invalid(e.to_string()))?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .ok_or_else(|| invalid("empty file".to_string()))?
            .map_err(|e| invalid(e.to_string()))?;
        let mut parts = header.split_whitespace();
        let (Some(vocab), Some(dim), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid(format!("bad header '{header}'")));
        };
        let vocab: usize = vocab.parse().map_err(|_| invalid("bad vocab size".to_string()))?;
        let dim: usize = dim.parse().map_err(|_| invalid("bad dimension".to_string()))?;
        if dim == 0 {
            return Err(invalid("dimension must be positive".to_string()));
        }

        let mut word2idx = HashMap::with_capacity(vocab);
        let mut data = Vec::with_capacity(vocab * dim);
        for (n, line) in lines.enumerate() {
            let line = line.map_err(|e| invalid(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split(' ').filter(|f| !f.is_empty());
            let Some(word) = fields.next() else { continue };
            let values: Vec<f32> = fields
                .map(|f| f.parse::<f32>())
                .collect::<Result<_, _>>()
                .map_err(|e| invalid(format!("line {}: {e}", n + 2)))?;
            if values.len() != dim {
                return Err(invalid(format!(
                    "line {}: expected {dim} values, got {}",
                    n + 2,
                    values.len()
                )));
            }
            let word = word.to_lowercase();
            // duplicate word: keep the first vector
            if word2idx.contains_key(&word) {
                continue;
            }
            word2idx.insert(word, word2idx.len());
            data.extend(values);
        }
        let rows = word2idx.len();
        let vectors =
            Array2::from_shape_vec((rows, dim), data).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            word2idx,
            vectors,
            stemmer: Stemmer::create(Algorithm::Hungarian),
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.word2idx.len()
    }

    fn lookup(&self, token: &str) -> Option<ArrayView1<'_, f32>> {
        let idx = self
            .word2idx
            .get(token)
            .or_else(|| self.word2idx.get(&*self.stemmer.stem(token)))?;
        Some(self.vectors.row(*idx))
    }
}

impl SentenceEmbedder for WordVectorEmbedder {
    fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut sum = vec![0.0f32; self.dim()];
        let mut known = 0usize;
        for token in classifier_tokens(text) {
            if let Some(row) = self.lookup(&token) {
                for (acc, x) in sum.iter_mut().zip(row.iter()) {
                    *acc += x;
                }
                known += 1;
            }
        }
        if known > 0 {
            l2_normalize(&mut sum);
        }
        sum
    }

    fn name(&self) -> &str {
        "word2vec"
    }
}

/// FNV-1a, 64 bit.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Feature-hashing fallback used when no embedding artifact is provisioned.
///
/// Word stems and character trigrams are hashed into `dim` signed buckets.
pub struct HashingEmbedder {
    dim: usize,
    stemmer: Stemmer,
    lexicon: Option<Arc<Lexicon>>,
}

impl HashingEmbedder {
    pub const DEFAULT_DIM: usize = 256;

    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.max(1),
            stemmer: Stemmer::create(Algorithm::Hungarian),
            lexicon: None,
        }
    }

    /// Skip the lexicon's stop words.
    pub fn with_stop_words(mut self, lexicon: Arc<Lexicon>) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    fn add(&self, v: &mut [f32], feature: &str, weight: f32) {
        let h = fnv1a(feature.as_bytes());
        let idx = (h % self.dim as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIM)
    }
}

impl SentenceEmbedder for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in classifier_tokens(text) {
            if token.chars().count() < 3 || token.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if self.lexicon.as_ref().is_some_and(|l| l.is_stop_word(&token)) {
                continue;
            }
            let stem = self.stemmer.stem(&token);
            self.add(&mut v, &format!("w:{stem}"), 1.0);
            let chars: Vec<char> = format!("<{stem}>").chars().collect();
            for tri in chars.windows(3) {
                let tri: String = tri.iter().collect();
                self.add(&mut v, &format!("c:{tri}"), 0.35);
            }
        }
        l2_normalize(&mut v);
        v
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Cosine similarity of two vectors; 0 when either is all zeros.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::default();
        let a = e.embed("A vasút késik minden reggel");
        let b = e.embed("A vasút késik minden reggel");
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_similar_texts_are_closer() {
        let e = HashingEmbedder::default();
        let a = e.embed("késik a vonat reggel");
        let b = e.embed("késett a vonat reggelente");
        let c = e.embed("finom volt a vacsora");
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[test]
    fn empty_text_embeds_to_zero() {
        let e = HashingEmbedder::default();
        assert!(e.embed("").iter().all(|x| *x == 0.0));
        assert_eq!(cosine(&e.embed(""), &e.embed("vonat")), 0.0);
    }

    #[test]
    fn word_vectors_load_and_average() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.txt");
        fs::write(&path, "3 2\nvonat 1 0\nbusz 0.8 0.2\nétel 0 1\n").unwrap();
        let e = WordVectorEmbedder::load(&path).unwrap();
        assert_eq!(e.vocab_size(), 3);
        assert_eq!(e.dim(), 2);
        let v = e.embed("Vonat és busz");
        assert!(v[0] > v[1]);
        assert!(e.embed("ismeretlen").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn word_vectors_reject_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.txt");
        assert!(matches!(
            WordVectorEmbedder::load(&path),
            Err(ModelUnavailableError::Missing { .. })
        ));
        fs::write(&path, "2 3\nvonat 1 0\n").unwrap();
        assert!(matches!(
            WordVectorEmbedder::load(&path),
            Err(ModelUnavailableError::Invalid { .. })
        ));
    }
}
