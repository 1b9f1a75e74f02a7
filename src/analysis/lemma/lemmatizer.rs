use std::collections::HashMap;

use serde::Serialize;

/// Languages with a lemma shadow field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LemmaLanguage {
    German,
    English,
}

impl LemmaLanguage {
    pub const ALL: [LemmaLanguage; 2] = [LemmaLanguage::German, LemmaLanguage::English];

    pub fn iso_code(self) -> &'static str {
        match self {
            LemmaLanguage::German => "de",
            LemmaLanguage::English => "en",
        }
    }

    pub fn from_iso_code(code: &str) -> Option<Self> {
        match code {
            "de" => Some(LemmaLanguage::German),
            "en" => Some(LemmaLanguage::English),
            _ => None,
        }
    }
}

/// Coarse part-of-speech buckets. The tag participates in the cache key
/// and drives case normalization: proper nouns keep their case, every
/// other tag lowercases the token before lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosTag {
    ProperNoun,
    Noun,
    Verb,
    Other,
}

impl PosTag {
    pub fn preserves_case(self) -> bool {
        matches!(self, PosTag::ProperNoun)
    }
}

/// Assigns coarse tags to a tokenized sentence. Sentence-aware tagging
/// (index time) treats the first token's capitalization as positional and
/// demotes it; the sentence-unaware pass (query time) takes capitalization
/// at face value. The two modes can disagree on the same token, which is
/// why index and query pipelines never share a cache.
pub fn tag_sentence(language: LemmaLanguage, tokens: &[String], sentence_aware: bool) -> Vec<PosTag> {
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| tag_token(language, token, sentence_aware && i == 0))
        .collect()
}

fn tag_token(language: LemmaLanguage, token: &str, sentence_initial: bool) -> PosTag {
    let capitalized = token.chars().next().is_some_and(|c| c.is_uppercase());
    match language {
        LemmaLanguage::German => {
            if capitalized && !sentence_initial {
                // every German noun is capitalized; only all-caps tokens
                // and mid-sentence latinisms get the proper-noun tag
                if token.chars().all(|c| c.is_uppercase()) {
                    PosTag::ProperNoun
                } else {
                    PosTag::Noun
                }
            } else if token.len() > 3 && (token.ends_with("en") || token.ends_with("st")) {
                PosTag::Verb
            } else {
                PosTag::Other
            }
        }
        LemmaLanguage::English => {
            if capitalized && !sentence_initial {
                PosTag::ProperNoun
            } else if token.len() > 4 && (token.ends_with("ing") || token.ends_with("ed")) {
                PosTag::Verb
            } else if token.len() > 2 && token.ends_with('s') {
                PosTag::Noun
            } else {
                PosTag::Other
            }
        }
    }
}

/// The underlying lemma model: an exception dictionary in front of a
/// Snowball stemmer. Lemmas containing `+` are compounds (German
/// contractions) that the caller splits into sequential tokens.
///
/// Not thread-safe by contract; the owning [`super::Lemmatizer`] serializes
/// calls behind a mutex. Cache hits never reach this type.
pub struct LemmaModel {
    language: LemmaLanguage,
    stemmer: rust_stemmers::Stemmer,
    exceptions: HashMap<&'static str, &'static str>,
}

impl LemmaModel {
    pub fn new(language: LemmaLanguage) -> Self {
        let (algorithm, table): (_, &[(&str, &str)]) = match language {
            LemmaLanguage::German => (rust_stemmers::Algorithm::German, DE_EXCEPTIONS),
            LemmaLanguage::English => (rust_stemmers::Algorithm::English, EN_EXCEPTIONS),
        };
        Self {
            language,
            stemmer: rust_stemmers::Stemmer::create(algorithm),
            exceptions: table.iter().copied().collect(),
        }
    }

    pub fn language(&self) -> LemmaLanguage {
        self.language
    }

    /// Lemmatizes a whole sentence. `tokens` are already case-normalized
    /// per their tag.
    pub fn lemmatize(&self, tokens: &[String], tags: &[PosTag]) -> Vec<String> {
        debug_assert_eq!(tokens.len(), tags.len());
        tokens
            .iter()
            .zip(tags.iter())
            .map(|(token, tag)| self.lemma_of(token, *tag))
            .collect()
    }

    fn lemma_of(&self, token: &str, tag: PosTag) -> String {
        if tag == PosTag::ProperNoun {
            return token.to_owned();
        }
        if let Some(lemma) = self.exceptions.get(token) {
            return (*lemma).to_owned();
        }
        self.stemmer.stem(token).into_owned()
    }
}

/// German contractions expand to `preposition+article` compounds; umlaut
/// plurals that Snowball leaves inflected get explicit entries.
const DE_EXCEPTIONS: &[(&str, &str)] = &[
    ("im", "in+dem"),
    ("ins", "in+das"),
    ("am", "an+dem"),
    ("ans", "an+das"),
    ("zum", "zu+dem"),
    ("zur", "zu+der"),
    ("vom", "von+dem"),
    ("beim", "bei+dem"),
    ("aufs", "auf+das"),
    ("durchs", "durch+das"),
    ("fürs", "für+das"),
    ("übers", "über+das"),
    ("ums", "um+das"),
    ("unters", "unter+das"),
    ("vors", "vor+das"),
    ("häuser", "haus"),
    ("häusern", "haus"),
    ("männer", "mann"),
    ("männern", "mann"),
    ("frauen", "frau"),
    ("kinder", "kind"),
    ("kindern", "kind"),
    ("bücher", "buch"),
    ("büchern", "buch"),
    ("verträge", "vertrag"),
    ("verträgen", "vertrag"),
    ("arbeitsverträge", "arbeitsvertrag"),
    ("arbeitsverträgen", "arbeitsvertrag"),
    ("wurde", "werden"),
    ("wurden", "werden"),
    ("war", "sein"),
    ("waren", "sein"),
    ("ist", "sein"),
    ("sind", "sein"),
    ("hat", "haben"),
    ("hatte", "haben"),
    ("hatten", "haben"),
];

/// Irregular English forms the suffix stemmer cannot reach.
const EN_EXCEPTIONS: &[(&str, &str)] = &[
    ("ran", "run"),
    ("went", "go"),
    ("gone", "go"),
    ("did", "do"),
    ("done", "do"),
    ("was", "be"),
    ("were", "be"),
    ("is", "be"),
    ("are", "be"),
    ("been", "be"),
    ("had", "have"),
    ("has", "have"),
    ("said", "say"),
    ("made", "make"),
    ("took", "take"),
    ("taken", "take"),
    ("came", "come"),
    ("saw", "see"),
    ("seen", "see"),
    ("gave", "give"),
    ("given", "give"),
    ("wrote", "write"),
    ("written", "write"),
    ("bought", "buy"),
    ("brought", "bring"),
    ("thought", "think"),
    ("held", "hold"),
    ("kept", "keep"),
    ("left", "leave"),
    ("lost", "lose"),
    ("met", "meet"),
    ("paid", "pay"),
    ("sent", "send"),
    ("signed", "sign"),
    ("sold", "sell"),
    ("spent", "spend"),
    ("stood", "stand"),
    ("told", "tell"),
    ("understood", "understand"),
    ("children", "child"),
    ("mice", "mouse"),
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("geese", "goose"),
    ("men", "man"),
    ("women", "woman"),
    ("people", "person"),
    ("better", "good"),
    ("best", "good"),
    ("worse", "bad"),
    ("worst", "bad"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_irregulars_resolve() {
        let model = LemmaModel::new(LemmaLanguage::English);
        assert_eq!(model.lemma_of("ran", PosTag::Verb), "run");
        assert_eq!(model.lemma_of("children", PosTag::Noun), "child");
    }

    #[test]
    fn english_regulars_fall_through_to_the_stemmer() {
        let model = LemmaModel::new(LemmaLanguage::English);
        assert_eq!(model.lemma_of("running", PosTag::Verb), "run");
        assert_eq!(model.lemma_of("shoes", PosTag::Noun), "shoe");
    }

    #[test]
    fn proper_nouns_pass_through_unstemmed() {
        let model = LemmaModel::new(LemmaLanguage::English);
        assert_eq!(model.lemma_of("Hastings", PosTag::ProperNoun), "Hastings");
    }

    #[test]
    fn german_contractions_expand_to_compounds() {
        let model = LemmaModel::new(LemmaLanguage::German);
        assert_eq!(model.lemma_of("im", PosTag::Other), "in+dem");
        assert_eq!(model.lemma_of("zur", PosTag::Other), "zu+der");
    }

    #[test]
    fn sentence_aware_tagging_demotes_the_first_token() {
        let tokens: Vec<String> = ["Der", "Vertrag", "gilt"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let aware = tag_sentence(LemmaLanguage::German, &tokens, true);
        let unaware = tag_sentence(LemmaLanguage::German, &tokens, false);
        assert_ne!(aware[0], PosTag::Noun);
        assert_eq!(unaware[0], PosTag::Noun);
        assert_eq!(aware[1], PosTag::Noun);
    }
}
