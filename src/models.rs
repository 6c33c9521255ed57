//! Provisioned model artifacts, loaded lazily and at most once.
//!
//! A models directory may contain:
//!
//! | file              | capability                          | fallback                 |
//! |-------------------|-------------------------------------|--------------------------|
//! | `linguistic.json` | lemma dictionary, gazetteer, lexicon | built-in Hungarian rules |
//! | `classifier.json` | naive Bayes sentiment classifier    | lexical-only scoring     |
//! | `embeddings.txt`  | word2vec text-format vectors        | feature hashing          |
//!
//! A missing or broken artifact is logged and replaced by its fallback; it never
//! fails the run.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use log::{info, warn};
use serde::Serialize;

use crate::classifier::{NaiveBayesClassifier, SentimentClassifier};
use crate::embedding::{HashingEmbedder, SentenceEmbedder, WordVectorEmbedder};
use crate::error::ModelUnavailableError;
use crate::lexicon::Lexicon;
use crate::linguistic::{LinguisticArtifact, LinguisticModel, RuleBasedModel};

pub const LINGUISTIC_FILE: &str = "linguistic.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const EMBEDDINGS_FILE: &str = "embeddings.txt";

/// Which provisioned artifacts are in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub linguistic: bool,
    pub classifier: bool,
    pub embedder: bool,
}

impl Capabilities {
    pub fn all_loaded(&self) -> bool {
        self.linguistic && self.classifier && self.embedder
    }
}

struct Linguistic {
    lexicon: Arc<Lexicon>,
    model: Arc<dyn LinguisticModel>,
    from_artifact: bool,
}

struct Embedder {
    embedder: Arc<dyn SentenceEmbedder>,
    from_artifact: bool,
}

/// Shared, read-only model resources.
pub struct ModelStore {
    dir: PathBuf,
    linguistic: OnceLock<Linguistic>,
    classifier: OnceLock<Option<Arc<dyn SentimentClassifier>>>,
    embedder: OnceLock<Embedder>,
}

fn log_unavailable(e: &ModelUnavailableError) {
    match e {
        ModelUnavailableError::Missing { .. } => info!("{e}, using fallback"),
        ModelUnavailableError::Invalid { .. } => warn!("{e}, using fallback"),
    }
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            linguistic: OnceLock::new(),
            classifier: OnceLock::new(),
            embedder: OnceLock::new(),
        }
    }

    /// Process-wide store. The directory of the first call wins.
    pub fn global(dir: &Path) -> &'static ModelStore {
        static GLOBAL: OnceLock<ModelStore> = OnceLock::new();
        let store = GLOBAL.get_or_init(|| ModelStore::new(dir));
        if store.dir != dir {
            warn!(
                "model store already initialised from {}, ignoring {}",
                store.dir.display(),
                dir.display()
            );
        }
        store
    }

    /// Store with injected capabilities; nothing is read from disk.
    pub fn with_components(
        lexicon: Arc<Lexicon>,
        linguistic: Arc<dyn LinguisticModel>,
        classifier: Option<Arc<dyn SentimentClassifier>>,
        embedder: Arc<dyn SentenceEmbedder>,
    ) -> Self {
        Self {
            dir: PathBuf::new(),
            linguistic: OnceLock::from(Linguistic {
                lexicon,
                model: linguistic,
                from_artifact: true,
            }),
            classifier: OnceLock::from(classifier),
            embedder: OnceLock::from(Embedder {
                embedder,
                from_artifact: true,
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn linguistic_parts(&self) -> &Linguistic {
        self.linguistic.get_or_init(|| {
            let mut lexicon = Lexicon::hungarian();
            match LinguisticArtifact::load(&self.dir.join(LINGUISTIC_FILE)) {
                Ok(artifact) => {
                    info!(
                        "loaded linguistic artifact ({} lemmas, {} gazetteer entries)",
                        artifact.lemmas.len(),
                        artifact.gazetteer.len()
                    );
                    lexicon.extend(&artifact.lexicon);
                    let lexicon = Arc::new(lexicon);
                    Linguistic {
                        model: Arc::new(RuleBasedModel::with_artifact(lexicon.clone(), artifact)),
                        lexicon,
                        from_artifact: true,
                    }
                }
                Err(e) => {
                    log_unavailable(&e);
                    let lexicon = Arc::new(lexicon);
                    Linguistic {
                        model: Arc::new(RuleBasedModel::new(lexicon.clone())),
                        lexicon,
                        from_artifact: false,
                    }
                }
            }
        })
    }

    pub fn lexicon(&self) -> Arc<Lexicon> {
        self.linguistic_parts().lexicon.clone()
    }

    pub fn linguistic_model(&self) -> Arc<dyn LinguisticModel> {
        self.linguistic_parts().model.clone()
    }

    /// `None` when no classifier is provisioned.
    pub fn classifier(&self) -> Option<Arc<dyn SentimentClassifier>> {
        self.classifier
            .get_or_init(|| match NaiveBayesClassifier::load(&self.dir.join(CLASSIFIER_FILE)) {
                Ok(model) => {
                    info!("loaded sentiment classifier with labels {:?}", model.labels);
                    Some(Arc::new(model) as Arc<dyn SentimentClassifier>)
                }
                Err(e) => {
                    log_unavailable(&e);
                    None
                }
            })
            .clone()
    }

    pub fn embedder(&self) -> Arc<dyn SentenceEmbedder> {
        self.embedder
            .get_or_init(|| match WordVectorEmbedder::load(&self.dir.join(EMBEDDINGS_FILE)) {
                Ok(model) => {
                    info!(
                        "loaded {} word vectors of dimension {}",
                        model.vocab_size(),
                        model.dim()
                    );
                    Embedder {
                        embedder: Arc::new(model),
                        from_artifact: true,
                    }
                }
                Err(e) => {
                    log_unavailable(&e);
                    Embedder {
                        embedder: Arc::new(
                            HashingEmbedder::default().with_stop_words(self.lexicon()),
                        ),
                        from_artifact: false,
                    }
                }
            })
            .embedder
            .clone()
    }

    /// Load every artifact (if not yet loaded) and report which are present.
    pub fn capabilities(&self) -> Capabilities {
        let linguistic = self.linguistic_parts().from_artifact;
        let classifier = self.classifier().is_some();
        self.embedder();
        let embedder = self.embedder.get().is_some_and(|e| e.from_artifact);
        Capabilities {
            linguistic,
            classifier,
            embedder,
        }
    }
}
