use tantivy::tokenizer::{Token, TokenFilter, TokenStream, Tokenizer};
use unicode_normalization::UnicodeNormalization;

/// NFKC-normalizes each token in place. Compatibility forms collapse
/// (ligatures expand, full-width forms narrow). Diacritic stripping is
/// left to the ascii folder that runs after this filter.
#[derive(Clone)]
pub struct NfkcNormalizeFilter;

impl TokenFilter for NfkcNormalizeFilter {
    type Tokenizer<T: Tokenizer> = NfkcNormalizeTokenizer<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> NfkcNormalizeTokenizer<T> {
        NfkcNormalizeTokenizer { inner: tokenizer }
    }
}

#[derive(Clone)]
pub struct NfkcNormalizeTokenizer<T> {
    inner: T,
}

impl<T: Tokenizer> Tokenizer for NfkcNormalizeTokenizer<T> {
    type TokenStream<'a> = NfkcNormalizeTokenStream<T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        NfkcNormalizeTokenStream {
            tail: self.inner.token_stream(text),
        }
    }
}

pub struct NfkcNormalizeTokenStream<T> {
    tail: T,
}

impl<T: TokenStream> TokenStream for NfkcNormalizeTokenStream<T> {
    fn advance(&mut self) -> bool {
        if !self.tail.advance() {
            return false;
        }
        let token = self.tail.token_mut();
        // NFKC is the identity on ASCII, skip the allocation
        if !token.text.is_ascii() {
            token.text = token.text.nfkc().collect();
        }
        true
    }

    fn token(&self) -> &Token {
        self.tail.token()
    }

    fn token_mut(&mut self) -> &mut Token {
        self.tail.token_mut()
    }
}
