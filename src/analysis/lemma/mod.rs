pub mod cache;
pub mod lemmatizer;

use std::sync::Mutex;

pub use cache::{LemmaCache, LemmaCacheMetrics};
pub use lemmatizer::{tag_sentence, LemmaLanguage, LemmaModel, PosTag};

/// Whether the pipeline sees whole documents (sentence detection runs) or
/// single query strings (one-sentence pass-through).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LemmaMode {
    Index,
    Query,
}

/// A per-language lemmatizing pipeline: heuristic tagging, a bounded LRU
/// in front of the model, and compound splitting on `+`.
///
/// Index-time and query-time instances never share a cache — the
/// sentence-aware and sentence-unaware taggers can assign different tags
/// to the same token, and the cache key includes the tag.
pub struct Lemmatizer {
    language: LemmaLanguage,
    mode: LemmaMode,
    // the model is not thread-safe; cache hits never touch this lock
    model: Mutex<LemmaModel>,
    cache: LemmaCache,
}

impl Lemmatizer {
    pub fn new(language: LemmaLanguage, mode: LemmaMode, cache_capacity: usize) -> Self {
        Self {
            language,
            mode,
            model: Mutex::new(LemmaModel::new(language)),
            cache: LemmaCache::new(cache_capacity),
        }
    }

    pub fn language(&self) -> LemmaLanguage {
        self.language
    }

    pub fn cache_metrics(&self) -> LemmaCacheMetrics {
        self.cache.metrics()
    }

    /// Lemmatizes free text into a whitespace-joined lemma string, the
    /// derived content of the language's shadow field. Compound lemmas
    /// split into sequential tokens.
    pub fn lemma_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for sentence in self.sentences(text) {
            let words = word_tokens(sentence);
            if words.is_empty() {
                continue;
            }
            for lemma in self.lemmatize_sentence(&words) {
                for part in lemma.split('+') {
                    if part.is_empty() {
                        continue;
                    }
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(part);
                }
            }
        }
        out
    }

    /// Query-side lemmatization of a single term. Returns the sequential
    /// lemma tokens (more than one for compound expansions).
    pub fn lemma_terms(&self, term: &str) -> Vec<String> {
        self.lemma_text(term)
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }

    fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self.mode {
            LemmaMode::Query => vec![text],
            LemmaMode::Index => split_sentences(text),
        }
    }

    /// A sentence is lemmatized wholesale whenever any token misses the
    /// cache: the tagger needs the surrounding context, so partial reuse
    /// would pair tokens with stale tags. All bindings of the fresh
    /// sentence are then populated at once.
    fn lemmatize_sentence(&self, words: &[String]) -> Vec<String> {
        let sentence_aware = self.mode == LemmaMode::Index;
        let tags = tag_sentence(self.language, words, sentence_aware);
        let normalized: Vec<String> = words
            .iter()
            .zip(tags.iter())
            .map(|(word, tag)| {
                if tag.preserves_case() {
                    word.clone()
                } else {
                    word.to_lowercase()
                }
            })
            .collect();

        let mut cached = Vec::with_capacity(normalized.len());
        let mut complete = true;
        for (token, tag) in normalized.iter().zip(tags.iter()) {
            match self.cache.get(token, *tag) {
                Some(lemma) => cached.push(lemma),
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            return cached;
        }

        let lemmas = {
            let model = self.model.lock().unwrap();
            model.lemmatize(&normalized, &tags)
        };
        self.cache.put_sentence(
            normalized
                .iter()
                .zip(tags.iter())
                .zip(lemmas.iter())
                .map(|((token, tag), lemma)| (token.as_str(), *tag, lemma.as_str())),
        );
        lemmas
    }
}

/// The four lemmatizing pipelines the engine runs: `{de, en} ×
/// {index, query}`. Index- and query-time instances are fully separate,
/// caches included.
pub struct LemmaEngines {
    index_de: Lemmatizer,
    index_en: Lemmatizer,
    query_de: Lemmatizer,
    query_en: Lemmatizer,
}

impl LemmaEngines {
    pub fn new(cache_capacity_per_language: usize) -> Self {
        Self {
            index_de: Lemmatizer::new(LemmaLanguage::German, LemmaMode::Index, cache_capacity_per_language),
            index_en: Lemmatizer::new(LemmaLanguage::English, LemmaMode::Index, cache_capacity_per_language),
            query_de: Lemmatizer::new(LemmaLanguage::German, LemmaMode::Query, cache_capacity_per_language),
            query_en: Lemmatizer::new(LemmaLanguage::English, LemmaMode::Query, cache_capacity_per_language),
        }
    }

    pub fn index(&self, language: LemmaLanguage) -> &Lemmatizer {
        match language {
            LemmaLanguage::German => &self.index_de,
            LemmaLanguage::English => &self.index_en,
        }
    }

    pub fn query(&self, language: LemmaLanguage) -> &Lemmatizer {
        match language {
            LemmaLanguage::German => &self.query_de,
            LemmaLanguage::English => &self.query_en,
        }
    }

    /// Metrics for every pipeline, keyed `<iso>.<mode>`.
    pub fn metrics(&self) -> std::collections::BTreeMap<String, LemmaCacheMetrics> {
        let mut out = std::collections::BTreeMap::new();
        for language in LemmaLanguage::ALL {
            out.insert(
                format!("{}.index", language.iso_code()),
                self.index(language).cache_metrics(),
            );
            out.insert(
                format!("{}.query", language.iso_code()),
                self.query(language).cache_metrics(),
            );
        }
        out
    }
}

/// Splits on `.`/`!`/`?` followed by whitespace or end of text. Good
/// enough for tagging context; mis-splits only cost tagging accuracy.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();
    while let Some((idx, ch)) = iter.next() {
        if matches!(ch, '.' | '!' | '?') {
            let boundary = iter.peek().map_or(true, |&(_, next)| next.is_whitespace());
            if boundary {
                let end = idx + ch.len_utf8();
                if !text[start..end].trim().is_empty() {
                    sentences.push(&text[start..end]);
                }
                start = end;
            }
        }
    }
    if !text[start..].trim().is_empty() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn word_tokens(sentence: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in sentence.chars() {
        if ch.is_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentence_splitting_respects_abbrev_free_text() {
        let sentences = split_sentences("One here. Two there! Three?");
        assert_eq!(sentences, vec!["One here.", " Two there!", " Three?"]);
    }

    #[test]
    fn lemma_text_stems_and_lowercases() {
        let lemmatizer = Lemmatizer::new(LemmaLanguage::English, LemmaMode::Index, 64);
        assert_eq!(lemmatizer.lemma_text("running shoes review"), "run shoe review");
    }

    #[test]
    fn compounds_split_into_sequential_tokens() {
        let lemmatizer = Lemmatizer::new(LemmaLanguage::German, LemmaMode::Index, 64);
        let text = lemmatizer.lemma_text("im Vertrag");
        assert!(text.starts_with("in dem "), "got {text:?}");
    }

    #[test]
    fn second_pass_is_served_from_cache() {
        let lemmatizer = Lemmatizer::new(LemmaLanguage::English, LemmaMode::Index, 64);
        lemmatizer.lemma_text("signed contracts");
        let first = lemmatizer.cache_metrics();
        lemmatizer.lemma_text("signed contracts");
        let second = lemmatizer.cache_metrics();
        assert_eq!(first.misses, second.misses);
        assert!(second.hits > first.hits);
    }

    #[test]
    fn query_mode_treats_input_as_one_sentence() {
        let lemmatizer = Lemmatizer::new(LemmaLanguage::English, LemmaMode::Query, 64);
        assert_eq!(lemmatizer.lemma_terms("ran"), vec!["run"]);
    }
}
