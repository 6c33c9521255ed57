//! Built-in Hungarian word lists: polarity lexicon, modifiers and closed word classes.

use std::collections::HashSet;

use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

const POSITIVE: &[&str] = &[
    "jó", "kiváló", "remek", "fantasztikus", "nagyszerű", "kitűnő", "csodálatos",
    "tökéletes", "szuper", "briliáns", "örömteli", "hasznos", "segítőkész", "szakszerű",
    "igényes", "precíz", "innovatív", "lelkes", "ügyes", "tehetséges", "inspiráló",
    "motiváló", "érdekes", "érthető", "logikus", "átlátható", "konstruktív", "fejlesztő",
    "hatékony", "sikeres", "professzionális", "ajánlom", "ajánlanám", "elégedett",
    "elégedettség", "tetszik", "tetszett", "szeretem", "imádom", "szép", "kellemes",
    "barátságos", "örülök", "boldog", "izgalmas", "lenyűgöző", "pozitív", "optimista",
    "szemléletes", "közérthető", "gyakorlatias", "naprakész", "alapos", "felkészült",
    "lelkiismeretes", "türelmes", "empatikus", "dinamikus", "strukturált", "interaktív",
    "élvezetes", "tanulságos", "kimagasló", "kiemelkedő", "elsőrangú", "pontos",
    "részletes", "átfogó", "informatív", "megbízható", "stabil", "tiszta", "egyértelmű",
    "gördülékeny", "kényelmes", "szervezett", "következetes", "rugalmas", "támogató",
    "ösztönző", "figyelmes", "gondos", "kreatív", "eredeti", "friss", "modern",
    "releváns", "megfelelő", "gyors", "hatásos", "eredményes", "különleges", "köszönöm",
];

const NEGATIVE: &[&str] = &[
    "rossz", "gyenge", "silány", "szörnyű", "borzasztó", "rettenetes", "katasztrofális",
    "értelmetlen", "összefüggéstelen", "érthetetlen", "zavaros", "kaotikus", "rendezetlen",
    "elavult", "irreleváns", "felesleges", "hasznavehetetlen", "bosszantó", "frusztráló",
    "idegesítő", "lassú", "hiányos", "hibás", "problémás", "csalódottság", "csalódott",
    "utálom", "szegényes", "kifogásolható", "pontatlan", "felületes", "sablonos", "unalmas",
    "demotiváló", "száraz", "monoton", "élettelen", "elmaradott", "korszerűtlen",
    "nehézkes", "áttekinthetetlen", "következetlen", "kapkodó", "felkészületlen",
    "türelmetlen", "lekezelő", "elfogadhatatlan", "tarthatatlan", "siralmas", "nehéz",
    "bonyolult", "zavaró", "kellemetlen", "homályos", "kusza", "megbízhatatlan",
    "töredékes", "sekélyes", "sivár", "érdektelen", "ósdi", "akadozó", "bugos", "törött",
    "értéktelen", "haszontalan", "veszteség", "körülményes", "macerás", "fárasztó",
    "kimerítő", "tolakodó", "elviselhetetlen", "terhes", "csalódás", "cserbenhagyott",
    "becsapott", "félrevezető", "drága", "udvariatlan", "mocskos", "koszos",
];

const INTENSIFIERS: &[&str] = &[
    "nagyon", "igen", "rendkívül", "kifejezetten", "különösen", "eléggé", "igazán",
    "teljesen", "abszolút", "végtelenül", "meglehetősen", "igencsak", "alaposan",
    "kivételesen", "határozottan", "erősen", "mélyen", "roppant", "borzasztóan",
    "iszonyúan", "szuperül",
];

const NEGATIONS: &[&str] = &[
    "nem", "se", "sem", "soha", "semmit", "sehol", "senki", "semmi", "semmilyen",
    "egyáltalán", "korántsem", "sehogy", "semmiképpen", "semmiféle", "nincs", "nincsenek",
];

const STOP_WORDS: &[&str] = &[
    "a", "az", "egy", "és", "hogy", "is", "de", "meg", "el", "van", "nem", "ezt", "azt",
    "ez", "én", "te", "ő", "mi", "ti", "ők", "ami", "aki", "amely", "volt", "lett",
    "csak", "már", "még", "sem", "se", "ha", "ki", "be", "fel", "le", "ön", "őt", "itt",
    "ott", "vagy", "mint", "mert", "pedig", "akkor", "aztán", "így", "úgy", "minden",
    "nagyon", "lesz", "vagyok", "vagyunk", "vannak", "voltak", "voltam", "nekem", "neki",
    "velem", "ahol", "amikor", "mind", "sok", "kell", "lehet", "azért", "ezért", "nagy",
    "kicsit", "után", "alatt", "előtt", "között", "szerint", "nélkül", "számára",
];

/// Articles; every other closed class below is checked after these.
pub const DETERMINERS: &[&str] = &["a", "az", "egy", "ez", "ezt", "azt", "minden", "néhány"];

pub const CONJUNCTIONS: &[&str] = &["és", "de", "vagy", "pedig", "meg", "sőt", "illetve", "hanem"];

pub const SUBORDINATORS: &[&str] = &[
    "hogy", "mert", "ha", "amikor", "mint", "bár", "mivel", "ahogy",
];

pub const PRONOUNS: &[&str] = &[
    "én", "te", "ő", "mi", "ti", "ők", "ön", "önök", "engem", "téged", "minket", "nekem",
    "neked", "neki", "velem", "veled", "vele", "ami", "aki", "amely", "valami", "valaki",
    "mindenki", "minden",
];

/// Copula and auxiliary forms.
pub const AUXILIARIES: &[&str] = &[
    "van", "vagyok", "vagy", "vagyunk", "vagytok", "vannak", "volt", "voltam", "voltál",
    "voltunk", "voltatok", "voltak", "lesz", "leszek", "lesznek", "lett", "lettem",
    "lenne", "lennék", "kell", "kellett", "lehet", "fog", "fogok", "fognak", "tud",
    "tudok", "tudtam",
];

/// Verbal inflection endings, longest first.
pub const VERB_SUFFIXES: &[&str] = &[
    "tattam", "tettem", "ottam", "ettem", "öttem", "ottunk", "ettünk", "tunk", "tünk",
    "tatok", "tetek", "tam", "tem", "tál", "tél", "tak", "tek", "nánk", "nénk", "nék",
    "nák", "ná", "né", "ni", "ik", "unk", "ünk", "tok",
];

/// Polarity class of a lexicon entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

/// Extra entries shipped with the linguistic artifact.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LexiconExtension {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub intensifiers: Vec<String>,
    pub negations: Vec<String>,
    pub stop_words: Vec<String>,
}

/// Polarity lexicon plus modifier lists.
///
/// Entries are matched on lowercase surface form, lemma, or Snowball stem so that
/// inflected forms ("elégedettek", "rosszabb") still hit their base entry.
#[derive(Debug, Clone)]
pub struct Lexicon {
    positive: HashSet<String>,
    negative: HashSet<String>,
    positive_stems: HashSet<String>,
    negative_stems: HashSet<String>,
    intensifiers: HashSet<String>,
    negations: HashSet<String>,
    stop_words: HashSet<String>,
}

fn owned_set(words: &[&str]) -> HashSet<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Lexicon {
    pub fn hungarian() -> Self {
        let mut lexicon = Lexicon {
            positive: owned_set(POSITIVE),
            negative: owned_set(NEGATIVE),
            positive_stems: HashSet::new(),
            negative_stems: HashSet::new(),
            intensifiers: owned_set(INTENSIFIERS),
            negations: owned_set(NEGATIONS),
            stop_words: owned_set(STOP_WORDS),
        };
        lexicon.rebuild_stems();
        lexicon
    }

    /// Merge entries from the linguistic artifact.
    pub fn extend(&mut self, ext: &LexiconExtension) {
        let lower = |v: &Vec<String>| v.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>();
        self.positive.extend(lower(&ext.positive));
        self.negative.extend(lower(&ext.negative));
        self.intensifiers.extend(lower(&ext.intensifiers));
        self.negations.extend(lower(&ext.negations));
        self.stop_words.extend(lower(&ext.stop_words));
        self.rebuild_stems();
    }

    /// Add user stop words (e.g. from a `--stopwords` file).
    pub fn add_stop_words<I: IntoIterator<Item = String>>(&mut self, words: I) {
        self.stop_words
            .extend(words.into_iter().map(|w| w.trim().to_lowercase()).filter(|w| !w.is_empty()));
    }

    fn rebuild_stems(&mut self) {
        let stemmer = Stemmer::create(Algorithm::Hungarian);
        let stem_all = |set: &HashSet<String>| {
            set.iter()
                .map(|w| stemmer.stem(w).to_string())
                .filter(|s| s.chars().count() > 2)
                .collect::<HashSet<String>>()
        };
        self.positive_stems = stem_all(&self.positive);
        self.negative_stems = stem_all(&self.negative);
        // a stem shared by both lists is ambiguous
        let shared: Vec<String> = self
            .positive_stems
            .intersection(&self.negative_stems)
            .cloned()
            .collect();
        for s in shared {
            self.positive_stems.remove(&s);
            self.negative_stems.remove(&s);
        }
    }

    /// Polarity of a token, checking surface, lemma, then stem.
    pub fn polarity(&self, surface_lower: &str, lemma: &str, stem: &str) -> Option<Polarity> {
        for key in [surface_lower, lemma] {
            if self.positive.contains(key) {
                return Some(Polarity::Positive);
            }
            if self.negative.contains(key) {
                return Some(Polarity::Negative);
            }
        }
        if self.positive_stems.contains(stem) {
            Some(Polarity::Positive)
        } else if self.negative_stems.contains(stem) {
            Some(Polarity::Negative)
        } else {
            None
        }
    }

    pub fn is_intensifier(&self, word: &str) -> bool {
        self.intensifiers.contains(word)
    }

    pub fn is_negation(&self, word: &str) -> bool {
        self.negations.contains(word)
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::hungarian()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_and_lemma_lookup() {
        let lex = Lexicon::hungarian();
        assert_eq!(lex.polarity("szörnyű", "szörnyű", "szörny"), Some(Polarity::Negative));
        assert_eq!(lex.polarity("xyz", "elégedett", "xyz"), Some(Polarity::Positive));
        assert_eq!(lex.polarity("asztal", "asztal", "asztal"), None);
    }

    #[test]
    fn extension_adds_entries() {
        let mut lex = Lexicon::hungarian();
        let before = lex.len();
        lex.extend(&LexiconExtension {
            positive: vec!["Pazar".to_string()],
            stop_words: vec!["Izé".to_string()],
            ..Default::default()
        });
        assert_eq!(lex.len(), before + 1);
        assert_eq!(lex.polarity("pazar", "pazar", "paz"), Some(Polarity::Positive));
        assert!(lex.is_stop_word("izé"));
    }

    #[test]
    fn modifiers() {
        let lex = Lexicon::hungarian();
        assert!(lex.is_intensifier("nagyon"));
        assert!(lex.is_negation("soha"));
        assert!(!lex.is_negation("nagyon"));
    }
}
