//! Token stream construction per field. Analyzers are built once and
//! registered into the index under stable names; the schema maps each
//! field to one of these names, which is the per-field dispatch.

pub mod fold;
pub mod lemma;
pub mod reverse;
pub mod translit;

use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer, Token,
};
use tantivy::Index;

use fold::NfkcNormalizeFilter;
use reverse::ReverseTokenFilter;
use translit::GermanTransliteratingTokenizer;

/// Word-break, lowercase, NFKC, diacritic/ligature fold. The default for
/// every analyzed field.
pub const UNICODE: &str = "unicode_fold";
/// [`UNICODE`] plus character-wise reversal of each final token.
pub const UNICODE_REVERSED: &str = "unicode_fold_reversed";
/// German digraph mapping before word-breaking, then the unicode chain.
pub const GERMAN_TRANSLIT: &str = "german_translit";

const MAX_TOKEN_LEN: usize = 255;

pub fn unicode_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .filter(NfkcNormalizeFilter)
        .filter(AsciiFoldingFilter)
        .build()
}

pub fn reversed_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .filter(NfkcNormalizeFilter)
        .filter(AsciiFoldingFilter)
        .filter(ReverseTokenFilter)
        .build()
}

pub fn german_translit_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(GermanTransliteratingTokenizer)
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .filter(NfkcNormalizeFilter)
        .filter(AsciiFoldingFilter)
        .build()
}

/// Registers every named analyzer. Must run on freshly opened indexes
/// before any write or read.
pub fn register_analyzers(index: &Index) {
    index.tokenizers().register(UNICODE, unicode_analyzer());
    index
        .tokenizers()
        .register(UNICODE_REVERSED, reversed_analyzer());
    index
        .tokenizers()
        .register(GERMAN_TRANSLIT, german_translit_analyzer());
}

/// Runs `text` through an analyzer and collects the tokens eagerly.
/// Highlighting and tests want the whole stream at once.
pub fn collect_tokens(analyzer: &mut TextAnalyzer, text: &str) -> Vec<Token> {
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().clone());
    }
    tokens
}

/// Folds raw query text the way the unicode analyzer folds index terms.
/// Query parsers do not run analyzers over wildcard terms, so wildcard
/// cores go through here before hitting the term dictionary.
pub fn fold_query_text(text: &str) -> String {
    let mut analyzer = unicode_analyzer();
    collect_tokens(&mut analyzer, text)
        .into_iter()
        .map(|token| token.text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Same as [`fold_query_text`] but through the German transliterating
/// chain, for terms aimed at the translit shadow field.
pub fn fold_translit_query_text(text: &str) -> String {
    let mut analyzer = german_translit_analyzer();
    collect_tokens(&mut analyzer, text)
        .into_iter()
        .map(|token| token.text)
        .collect::<Vec<_>>()
        .join(" ")
}
