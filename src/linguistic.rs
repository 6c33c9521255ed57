//! Linguistic analysis: tokens, POS tags, dependency edges, entities and the
//! rule-based lexical polarity signal.
//!
//! The parsing capability sits behind [`LinguisticModel`]; the crate ships a
//! rule-based Hungarian model ([`RuleBasedModel`]) whose lemma dictionary and
//! gazetteer come from the optional linguistic artifact. Polarity scoring is a pure
//! function of the parse and the [`Lexicon`].

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

use crate::config::LexiconConfig;
use crate::error::{ItemAnalysisError, ModelUnavailableError};
use crate::lexicon::{
    AUXILIARIES, CONJUNCTIONS, DETERMINERS, Lexicon, LexiconExtension, PRONOUNS, Polarity,
    SUBORDINATORS, VERB_SUFFIXES,
};

/// Universal Dependencies part-of-speech tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PosTag {
    Noun,
    Propn,
    Verb,
    Aux,
    Adj,
    Adv,
    Part,
    Det,
    Pron,
    Cconj,
    Sconj,
    Num,
    Punct,
    X,
}

impl fmt::Display for PosTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PosTag::Noun => "NOUN",
            PosTag::Propn => "PROPN",
            PosTag::Verb => "VERB",
            PosTag::Aux => "AUX",
            PosTag::Adj => "ADJ",
            PosTag::Adv => "ADV",
            PosTag::Part => "PART",
            PosTag::Det => "DET",
            PosTag::Pron => "PRON",
            PosTag::Cconj => "CCONJ",
            PosTag::Sconj => "SCONJ",
            PosTag::Num => "NUM",
            PosTag::Punct => "PUNCT",
            PosTag::X => "X",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub surface: String,
    pub lemma: String,
    pub pos_tag: PosTag,
    /// 0-based sentence index within the text.
    pub sentence: usize,
}

impl Token {
    pub fn is_punct(&self) -> bool {
        self.pos_tag == PosTag::Punct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Per,
    Loc,
    Org,
    Misc,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityType::Per => "PER",
            EntityType::Loc => "LOC",
            EntityType::Org => "ORG",
            EntityType::Misc => "MISC",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub text_span: String,
    pub entity_type: EntityType,
    /// Token range `[start, end)`.
    pub start: usize,
    pub end: usize,
}

/// A head -> dependent edge. The sentence root points at itself with relation `root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub head_index: usize,
    pub dependent_index: usize,
    pub relation: String,
}

/// Raw output of a [`LinguisticModel`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedText {
    pub tokens: Vec<Token>,
    pub entities: Vec<Entity>,
    pub dependency_edges: Vec<DependencyEdge>,
}

/// Tokenization, tagging, parsing and NER for one text.
pub trait LinguisticModel: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedText, ItemAnalysisError>;
}

/// One lexicon hit inside a text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolarTerm {
    pub token_index: usize,
    pub surface: String,
    pub polarity: Polarity,
    pub negated: bool,
    pub intensified: bool,
    pub contribution: f64,
}

/// Lexicon/rule-based sentiment signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalPolarity {
    /// Signed score in `-1..=1`.
    pub score: f64,
    /// Derived from lexicon coverage, `0..=1`.
    pub confidence: f64,
    pub polar_terms: Vec<PolarTerm>,
    /// Normalised score of each sentence that has content tokens.
    pub sentence_scores: Vec<f64>,
}

impl LexicalPolarity {
    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            confidence: 0.0,
            polar_terms: Vec::new(),
            sentence_scores: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinguisticAnnotation {
    pub tokens: Vec<Token>,
    pub entities: Vec<Entity>,
    pub dependency_edges: Vec<DependencyEdge>,
    pub lexical_polarity: LexicalPolarity,
    /// Lemmas without stop words and punctuation, used for topic terms.
    pub terms: Vec<String>,
    pub sentence_count: usize,
}

impl LinguisticAnnotation {
    /// Annotation of an empty text: no tokens, neutral zero-confidence polarity.
    pub fn empty() -> Self {
        Self {
            tokens: Vec::new(),
            entities: Vec::new(),
            dependency_edges: Vec::new(),
            lexical_polarity: LexicalPolarity::neutral(),
            terms: Vec::new(),
            sentence_count: 0,
        }
    }

    pub fn content_token_count(&self) -> usize {
        self.tokens.iter().filter(|t| !t.is_punct()).count()
    }

    /// Surfaces of lexicon hits with the given polarity, comma separated.
    pub fn elements(&self, polarity: Polarity) -> String {
        self.lexical_polarity
            .polar_terms
            .iter()
            .filter(|p| p.polarity == polarity)
            .map(|p| p.surface.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Five most frequent POS tags, e.g. `NOUN:3, ADJ:2`.
    pub fn pos_summary(&self) -> String {
        top_counts(self.tokens.iter().map(|t| t.pos_tag.to_string()), 5)
    }

    /// Five most frequent dependency relations.
    pub fn dependency_summary(&self) -> String {
        top_counts(self.dependency_edges.iter().map(|e| e.relation.clone()), 5)
    }

    /// Up to eight `head->rel->dependent` triples for core relations.
    pub fn relation_summary(&self) -> String {
        self.dependency_edges
            .iter()
            .filter(|e| matches!(e.relation.as_str(), "nsubj" | "obj" | "nmod" | "amod"))
            .filter_map(|e| {
                let head = self.tokens.get(e.head_index)?;
                let dep = self.tokens.get(e.dependent_index)?;
                Some(format!("{}->{}->{}", head.surface, e.relation, dep.surface))
            })
            .take(8)
            .collect::<Vec<_>>()
            .join(" | ")
    }

    pub fn entity_summary(&self) -> String {
        self.entities
            .iter()
            .map(|e| format!("{} ({})", e.text_span, e.entity_type))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn lemmatized(&self) -> String {
        self.terms.join(" ")
    }

    /// Per-sentence polarity, e.g. `S1:pos(+0.45) | S2:neg(-0.30)`.
    pub fn sentence_breakdown(&self, positive_threshold: f64, negative_threshold: f64) -> String {
        self.lexical_polarity
            .sentence_scores
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let tag = if s > positive_threshold {
                    "pos"
                } else if s < negative_threshold {
                    "neg"
                } else {
                    "neu"
                };
                format!("S{}:{tag}({s:+.2})", i + 1)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

fn top_counts<I: Iterator<Item = String>>(items: I, n: usize) -> String {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
        .into_iter()
        .take(n)
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid regex"))
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+(?:[-'’]\w+)*|[^\w\s]").expect("valid regex"))
}

/// Strip HTML tags and URLs, collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let no_tags = html_tag_re().replace_all(text, " ");
    let no_urls = url_re().replace_all(&no_tags, " ");
    no_urls.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lemma dictionary entry of the linguistic artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct LemmaEntry {
    pub lemma: String,
    #[serde(default)]
    pub pos: Option<PosTag>,
}

/// On-disk linguistic artifact (`linguistic.json`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinguisticArtifact {
    pub lemmas: HashMap<String, LemmaEntry>,
    pub gazetteer: HashMap<String, EntityType>,
    pub lexicon: LexiconExtension,
}

impl LinguisticArtifact {
    pub fn load(path: &Path) -> Result<Self, ModelUnavailableError> {
        if !path.exists() {
            return Err(ModelUnavailableError::Missing {
                kind: "linguistic",
                path: path.to_path_buf(),
            });
        }
        let invalid = |reason: String| ModelUnavailableError::Invalid {
            kind: "linguistic",
            path: path.to_path_buf(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))
    }
}

/// Rule-based Hungarian tagger/parser.
pub struct RuleBasedModel {
    stemmer: Stemmer,
    lexicon: Arc<Lexicon>,
    lemmas: HashMap<String, LemmaEntry>,
    gazetteer: HashMap<String, EntityType>,
}

impl RuleBasedModel {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::Hungarian),
            lexicon,
            lemmas: HashMap::new(),
            gazetteer: HashMap::new(),
        }
    }

    pub fn with_artifact(lexicon: Arc<Lexicon>, artifact: LinguisticArtifact) -> Self {
        let mut model = Self::new(lexicon);
        model.lemmas = artifact
            .lemmas
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        model.gazetteer = artifact.gazetteer;
        model
    }

    fn lemma_for(&self, lower: &str, pos: PosTag) -> String {
        if let Some(entry) = self.lemmas.get(lower) {
            return entry.lemma.to_lowercase();
        }
        match pos {
            PosTag::Punct
            | PosTag::Num
            | PosTag::Det
            | PosTag::Pron
            | PosTag::Cconj
            | PosTag::Sconj
            | PosTag::Part
            | PosTag::Aux => lower.to_string(),
            _ => {
                let stem = self.stemmer.stem(lower);
                if stem.chars().count() < 2 {
                    lower.to_string()
                } else {
                    stem.into_owned()
                }
            }
        }
    }

    fn tag(&self, surface: &str, lower: &str, sentence_initial: bool) -> PosTag {
        let Some(first) = surface.chars().next() else {
            return PosTag::X;
        };
        if !first.is_alphanumeric() {
            return PosTag::Punct;
        }
        if surface
            .chars()
            .all(|c| c.is_ascii_digit() || c == ',' || c == '.')
        {
            return PosTag::Num;
        }
        if let Some(pos) = self.lemmas.get(lower).and_then(|e| e.pos) {
            return pos;
        }
        if self.lexicon.is_negation(lower) {
            return PosTag::Part;
        }
        if self.lexicon.is_intensifier(lower) {
            return PosTag::Adv;
        }
        if DETERMINERS.contains(&lower) {
            return PosTag::Det;
        }
        if CONJUNCTIONS.contains(&lower) {
            return PosTag::Cconj;
        }
        if SUBORDINATORS.contains(&lower) {
            return PosTag::Sconj;
        }
        if PRONOUNS.contains(&lower) {
            return PosTag::Pron;
        }
        if AUXILIARIES.contains(&lower) {
            return PosTag::Aux;
        }
        if self.gazetteer.contains_key(surface) || is_acronym(surface) {
            return PosTag::Propn;
        }
        let stem = self.stemmer.stem(lower);
        if self.lexicon.polarity(lower, lower, &stem).is_some() {
            let verbal = ["ik", "om", "em", "öm"].iter().any(|s| lower.ends_with(s));
            return if verbal && lower.chars().count() > 5 {
                PosTag::Verb
            } else {
                PosTag::Adj
            };
        }
        if first.is_uppercase() && !sentence_initial {
            return PosTag::Propn;
        }
        let len = lower.chars().count();
        if len > 4 && ["ul", "ül", "lag", "leg"].iter().any(|s| lower.ends_with(s)) {
            return PosTag::Adv;
        }
        if VERB_SUFFIXES
            .iter()
            .any(|s| lower.ends_with(s) && len > s.chars().count() + 2)
        {
            return PosTag::Verb;
        }
        if len > 4
            && ["tlan", "tlen", "ható", "hető", "os", "es", "ös", "ú", "ű"]
                .iter()
                .any(|s| lower.ends_with(s))
        {
            return PosTag::Adj;
        }
        PosTag::Noun
    }

    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut sentence = 0usize;
        let mut sentence_initial = true;
        for m in token_re().find_iter(text) {
            let surface = m.as_str();
            let lower = surface.to_lowercase();
            let pos_tag = self.tag(surface, &lower, sentence_initial);
            let lemma = self.lemma_for(&lower, pos_tag);
            let ends_sentence = matches!(surface, "." | "!" | "?" | "…");
            tokens.push(Token {
                surface: surface.to_string(),
                lemma,
                pos_tag,
                sentence,
            });
            if ends_sentence {
                sentence += 1;
                sentence_initial = true;
            } else if pos_tag != PosTag::Punct {
                sentence_initial = false;
            }
        }
        tokens
    }

    fn entities(&self, tokens: &[Token]) -> Vec<Entity> {
        let mut entities = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i].pos_tag != PosTag::Propn {
                i += 1;
                continue;
            }
            let start = i;
            while i < tokens.len()
                && tokens[i].pos_tag == PosTag::Propn
                && tokens[i].sentence == tokens[start].sentence
            {
                i += 1;
            }
            let span = tokens[start..i]
                .iter()
                .map(|t| t.surface.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let entity_type = self
                .gazetteer
                .get(&span)
                .or_else(|| self.gazetteer.get(&tokens[start].surface))
                .copied()
                .unwrap_or_else(|| {
                    if i - start == 1 && is_acronym(&span) {
                        EntityType::Org
                    } else {
                        EntityType::Misc
                    }
                });
            entities.push(Entity {
                text_span: span,
                entity_type,
                start,
                end: i,
            });
        }
        entities
    }
}

fn is_acronym(surface: &str) -> bool {
    let n = surface.chars().count();
    (2..=5).contains(&n) && surface.chars().all(|c| c.is_uppercase())
}

/// Heuristic dependency edges, sentence by sentence.
pub fn heuristic_dependencies(tokens: &[Token]) -> Vec<DependencyEdge> {
    let mut edges = Vec::with_capacity(tokens.len());
    let mut start = 0;
    while start < tokens.len() {
        let sentence = tokens[start].sentence;
        let end = tokens[start..]
            .iter()
            .position(|t| t.sentence != sentence)
            .map(|p| start + p)
            .unwrap_or(tokens.len());
        sentence_edges(tokens, start, end, &mut edges);
        start = end;
    }
    edges
}

fn sentence_edges(tokens: &[Token], start: usize, end: usize, edges: &mut Vec<DependencyEdge>) {
    let find_first = |tag: PosTag| (start..end).find(|&i| tokens[i].pos_tag == tag);
    let root = find_first(PosTag::Verb)
        .or_else(|| find_first(PosTag::Aux))
        .or_else(|| find_first(PosTag::Adj))
        .or_else(|| find_first(PosTag::Noun))
        .or_else(|| find_first(PosTag::Propn))
        .or_else(|| (start..end).find(|&i| !tokens[i].is_punct()))
        .unwrap_or(start);

    let next_matching = |from: usize, tags: &[PosTag], max_gap: usize| {
        ((from + 1)..end.min(from + 2 + max_gap)).find(|&j| tags.contains(&tokens[j].pos_tag))
    };
    let next_content = |from: usize| ((from + 1)..end).find(|&j| !tokens[j].is_punct());

    let mut seen_object = false;
    for i in start..end {
        let edge = |head: usize, relation: &str| DependencyEdge {
            head_index: head,
            dependent_index: i,
            relation: relation.to_string(),
        };
        if i == root {
            edges.push(edge(root, "root"));
            continue;
        }
        let nominal = [PosTag::Noun, PosTag::Propn];
        let e = match tokens[i].pos_tag {
            PosTag::Punct => edge(root, "punct"),
            PosTag::Det => match next_matching(i, &[PosTag::Noun, PosTag::Propn, PosTag::Adj], 2) {
                Some(h) => edge(h, "det"),
                None => edge(root, "dep"),
            },
            PosTag::Adj => match next_matching(i, &nominal, 1) {
                Some(h) => edge(h, "amod"),
                None => edge(root, "dep"),
            },
            PosTag::Num => match next_matching(i, &nominal, 1) {
                Some(h) => edge(h, "nummod"),
                None => edge(root, "dep"),
            },
            PosTag::Adv => match next_matching(i, &[PosTag::Adj, PosTag::Verb, PosTag::Adv], 1) {
                Some(h) => edge(h, "advmod"),
                None => edge(root, "advmod"),
            },
            PosTag::Part => match next_content(i) {
                Some(h) => edge(h, "neg"),
                None => edge(root, "neg"),
            },
            PosTag::Cconj => match next_content(i) {
                Some(h) => edge(h, "cc"),
                None => edge(root, "dep"),
            },
            PosTag::Sconj => match next_content(i) {
                Some(h) => edge(h, "mark"),
                None => edge(root, "dep"),
            },
            PosTag::Aux => {
                let rel = if matches!(tokens[root].pos_tag, PosTag::Verb) {
                    "aux"
                } else {
                    "cop"
                };
                edge(root, rel)
            }
            PosTag::Verb => edge(root, "conj"),
            PosTag::Noun | PosTag::Propn | PosTag::Pron => {
                if i > start && nominal.contains(&tokens[i - 1].pos_tag) && i - 1 != root {
                    edge(i - 1, "nmod")
                } else if i < root {
                    edge(root, "nsubj")
                } else if !seen_object {
                    seen_object = true;
                    edge(root, "obj")
                } else {
                    edge(root, "obl")
                }
            }
            PosTag::X => edge(root, "dep"),
        };
        edges.push(e);
    }
}

impl LinguisticModel for RuleBasedModel {
    fn parse(&self, text: &str) -> Result<ParsedText, ItemAnalysisError> {
        let tokens = self.tokenize(text);
        let entities = self.entities(&tokens);
        let dependency_edges = heuristic_dependencies(&tokens);
        Ok(ParsedText {
            tokens,
            entities,
            dependency_edges,
        })
    }
}

/// Runs a [`LinguisticModel`] and derives the lexical polarity signal.
pub struct LinguisticAnalyzer {
    model: Arc<dyn LinguisticModel>,
    lexicon: Arc<Lexicon>,
    stemmer: Stemmer,
    cfg: LexiconConfig,
}

impl LinguisticAnalyzer {
    pub fn new(model: Arc<dyn LinguisticModel>, lexicon: Arc<Lexicon>, cfg: LexiconConfig) -> Self {
        Self {
            model,
            lexicon,
            stemmer: Stemmer::create(Algorithm::Hungarian),
            cfg,
        }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Analyze one (already cleaned) text. Empty text yields [`LinguisticAnnotation::empty`].
    pub fn analyze(&self, text: &str) -> Result<LinguisticAnnotation, ItemAnalysisError> {
        if text.contains('\0') {
            return Err(ItemAnalysisError::Malformed(
                "text contains NUL characters".to_string(),
            ));
        }
        let chars = text.chars().count();
        if chars > self.cfg.max_text_chars {
            return Err(ItemAnalysisError::TooLong(chars, self.cfg.max_text_chars));
        }
        if text.trim().is_empty() {
            return Ok(LinguisticAnnotation::empty());
        }

        let parsed = self.model.parse(text)?;
        let lexical_polarity = lexical_polarity(
            &parsed.tokens,
            &parsed.dependency_edges,
            &self.lexicon,
            &self.stemmer,
            &self.cfg,
        );
        let terms = parsed
            .tokens
            .iter()
            .filter(|t| {
                !t.is_punct()
                    && t.pos_tag != PosTag::Num
                    && t.lemma.chars().count() > 2
                    && !self.lexicon.is_stop_word(&t.lemma)
                    && !self.lexicon.is_stop_word(&t.surface.to_lowercase())
            })
            .map(|t| t.lemma.clone())
            .collect();
        let sentence_count = parsed
            .tokens
            .iter()
            .filter(|t| !t.is_punct())
            .map(|t| t.sentence)
            .collect::<std::collections::BTreeSet<_>>()
            .len();

        Ok(LinguisticAnnotation {
            tokens: parsed.tokens,
            entities: parsed.entities,
            dependency_edges: parsed.dependency_edges,
            lexical_polarity,
            terms,
            sentence_count,
        })
    }
}

/// Deterministic lexicon score with negation and intensifier rules.
///
/// A polar word is negated when a negation depends on it or governs it, or occurs
/// within `negation_window` preceding tokens of the same sentence. The summed
/// contributions are normalised by `sqrt(content tokens)` so long texts are not
/// pulled towards neutral. Confidence is `sqrt(coverage)`.
pub fn lexical_polarity(
    tokens: &[Token],
    edges: &[DependencyEdge],
    lexicon: &Lexicon,
    stemmer: &Stemmer,
    cfg: &LexiconConfig,
) -> LexicalPolarity {
    let content = tokens.iter().filter(|t| !t.is_punct()).count();
    if content == 0 {
        return LexicalPolarity::neutral();
    }

    let lower: Vec<String> = tokens.iter().map(|t| t.surface.to_lowercase()).collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); tokens.len()];
    let mut heads: Vec<Option<usize>> = vec![None; tokens.len()];
    for e in edges {
        if e.head_index != e.dependent_index
            && e.head_index < tokens.len()
            && e.dependent_index < tokens.len()
        {
            children[e.head_index].push(e.dependent_index);
            heads[e.dependent_index] = Some(e.head_index);
        }
    }
    let is_negation =
        |j: usize| lexicon.is_negation(&lower[j]) || lexicon.is_negation(&tokens[j].lemma);
    let is_intensifier =
        |j: usize| lexicon.is_intensifier(&lower[j]) || lexicon.is_intensifier(&tokens[j].lemma);

    let mut polar_terms = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_punct() {
            continue;
        }
        let stem = stemmer.stem(&lower[i]);
        let Some(polarity) = lexicon.polarity(&lower[i], &token.lemma, &stem) else {
            continue;
        };

        let window_start = i.saturating_sub(cfg.negation_window);
        let negated = children[i].iter().any(|&c| is_negation(c))
            || heads[i].is_some_and(is_negation)
            || (window_start..i).any(|j| tokens[j].sentence == token.sentence && is_negation(j));
        let intensified = children[i].iter().any(|&c| is_intensifier(c))
            || heads[i].is_some_and(is_intensifier)
            || (i > 0 && tokens[i - 1].sentence == token.sentence && is_intensifier(i - 1));

        let base = match (polarity, negated) {
            (Polarity::Positive, false) => cfg.positive_weight,
            (Polarity::Positive, true) => cfg.negated_positive_weight,
            (Polarity::Negative, false) => cfg.negative_weight,
            (Polarity::Negative, true) => cfg.negated_negative_weight,
        };
        let factor = if intensified { cfg.intensifier_factor } else { 1.0 };
        polar_terms.push(PolarTerm {
            token_index: i,
            surface: token.surface.clone(),
            polarity,
            negated,
            intensified,
            contribution: base * factor,
        });
    }

    let normalize = |sum: f64, n: usize| {
        let norm = (n.max(1) as f64).sqrt().max(1.0);
        (sum / norm * cfg.normalization_gain).clamp(-1.0, 1.0)
    };
    let total: f64 = polar_terms.iter().map(|p| p.contribution).sum();
    let score = normalize(total, content);
    let coverage = polar_terms.len() as f64 / content as f64;
    let confidence = coverage.sqrt().clamp(0.0, 1.0);

    let sentence_total = tokens.last().map(|t| t.sentence + 1).unwrap_or(0);
    let sentence_scores = (0..sentence_total)
        .filter_map(|s| {
            let n = tokens
                .iter()
                .filter(|t| t.sentence == s && !t.is_punct())
                .count();
            if n == 0 {
                return None;
            }
            let sum: f64 = polar_terms
                .iter()
                .filter(|p| tokens[p.token_index].sentence == s)
                .map(|p| p.contribution)
                .sum();
            Some(normalize(sum, n))
        })
        .collect();

    LexicalPolarity {
        score,
        confidence,
        polar_terms,
        sentence_scores,
    }
}
