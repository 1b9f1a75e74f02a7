use tantivy::tokenizer::{Token, TokenFilter, TokenStream, Tokenizer};

/// Reverses each final token character-wise. Terms indexed through this
/// filter let a leading wildcard run as a cheap trailing wildcard on the
/// shadow field: a term ending in `vertrag` starts with `gartrev` here.
#[derive(Clone)]
pub struct ReverseTokenFilter;

impl TokenFilter for ReverseTokenFilter {
    type Tokenizer<T: Tokenizer> = ReverseTokenizer<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> ReverseTokenizer<T> {
        ReverseTokenizer { inner: tokenizer }
    }
}

#[derive(Clone)]
pub struct ReverseTokenizer<T> {
    inner: T,
}

impl<T: Tokenizer> Tokenizer for ReverseTokenizer<T> {
    type TokenStream<'a> = ReverseTokenStream<T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        ReverseTokenStream {
            tail: self.inner.token_stream(text),
        }
    }
}

pub struct ReverseTokenStream<T> {
    tail: T,
}

impl<T: TokenStream> TokenStream for ReverseTokenStream<T> {
    fn advance(&mut self) -> bool {
        if !self.tail.advance() {
            return false;
        }
        let token = self.tail.token_mut();
        token.text = token.text.chars().rev().collect();
        true
    }

    fn token(&self) -> &Token {
        self.tail.token()
    }

    fn token_mut(&mut self) -> &mut Token {
        self.tail.token_mut()
    }
}

/// Character-wise reversal of a query term, the same transform the filter
/// applies at index time.
pub fn reverse_term(term: &str) -> String {
    term.chars().rev().collect()
}
