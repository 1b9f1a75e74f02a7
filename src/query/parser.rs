//! Small recursive-descent parser for the user query string: bare terms,
//! `"quoted phrases"`, `*` wildcards, `AND`/`OR`/`NOT` and parentheses.
//! The default connective is OR, AND binds tighter, NOT is a prefix.
//! Everything parses against the content field; there is no field-prefix
//! syntax.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    /// Everything matches; produced for blank and `*` inputs.
    MatchAll,
    /// A single surface term, analyzer untouched.
    Term(String),
    /// A quoted phrase, split into surface words.
    Phrase(Vec<String>),
    /// A term containing at least one `*`.
    Wildcard(String),
    Or(Vec<QueryNode>),
    And(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::MatchAll => write!(f, "*"),
            QueryNode::Term(t) => write!(f, "{t}"),
            QueryNode::Phrase(words) => write!(f, "\"{}\"", words.join(" ")),
            QueryNode::Wildcard(t) => write!(f, "{t}"),
            QueryNode::Or(children) => {
                let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                write!(f, "({})", parts.join(" OR "))
            }
            QueryNode::And(children) => {
                let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                write!(f, "({})", parts.join(" AND "))
            }
            QueryNode::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Phrase(String),
    Open,
    Close,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);

/// Parses the user query. Blank input and a bare `*` produce
/// [`QueryNode::MatchAll`].
pub fn parse_query(input: &str) -> Result<QueryNode, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return Ok(QueryNode::MatchAll);
    }
    let tokens = tokenize(trimmed)?;
    let mut parser = Parser {
        tokens: &tokens,
        at: 0,
    };
    let node = parser.parse_or()?;
    if parser.at != tokens.len() {
        return Err(ParseError(format!(
            "unexpected token after position {}",
            parser.at
        )));
    }
    Ok(node)
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut phrase = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(c);
                }
                if !closed {
                    return Err(ParseError("unterminated phrase quote".into()));
                }
                if !phrase.trim().is_empty() {
                    tokens.push(Token::Phrase(phrase));
                }
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    at: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.at)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.at);
        if token.is_some() {
            self.at += 1;
        }
        token
    }

    /// OR level, which also absorbs plain adjacency: `a b` is `a OR b`.
    fn parse_or(&mut self) -> Result<QueryNode, ParseError> {
        let mut children = vec![self.parse_and()?];
        loop {
            match self.peek() {
                Some(Token::Or) => {
                    self.bump();
                    children.push(self.parse_and()?);
                }
                Some(Token::Close) | None => break,
                Some(_) => children.push(self.parse_and()?),
            }
        }
        Ok(flatten(children, QueryNode::Or))
    }

    fn parse_and(&mut self) -> Result<QueryNode, ParseError> {
        let mut children = vec![self.parse_unary()?];
        while matches!(self.peek(), Some(Token::And)) {
            self.bump();
            children.push(self.parse_unary()?);
        }
        Ok(flatten(children, QueryNode::And))
    }

    fn parse_unary(&mut self) -> Result<QueryNode, ParseError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.bump();
            let inner = self.parse_unary()?;
            return Ok(QueryNode::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryNode, ParseError> {
        match self.bump() {
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                match self.bump() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(ParseError("missing closing parenthesis".into())),
                }
            }
            Some(Token::Phrase(phrase)) => {
                let words: Vec<String> =
                    phrase.split_whitespace().map(str::to_owned).collect();
                match words.len() {
                    0 => Err(ParseError("empty phrase".into())),
                    1 => Ok(QueryNode::Term(words.into_iter().next().unwrap())),
                    _ => Ok(QueryNode::Phrase(words)),
                }
            }
            Some(Token::Word(word)) => {
                if word == "*" {
                    Ok(QueryNode::MatchAll)
                } else if word.contains('*') {
                    Ok(QueryNode::Wildcard(word.clone()))
                } else {
                    Ok(QueryNode::Term(word.clone()))
                }
            }
            Some(other) => Err(ParseError(format!("unexpected operator {other:?}"))),
            None => Err(ParseError("query ended unexpectedly".into())),
        }
    }
}

fn flatten(mut children: Vec<QueryNode>, combine: fn(Vec<QueryNode>) -> QueryNode) -> QueryNode {
    if children.len() == 1 {
        children.pop().unwrap()
    } else {
        combine(children)
    }
}

/// Surface leaf terms of the parsed query: term text, phrase words, and
/// wildcard cores with the `*`s stripped. Used for coverage math and the
/// highlight fallback scan.
pub fn leaf_terms(node: &QueryNode) -> Vec<String> {
    let mut terms = Vec::new();
    collect_leaves(node, &mut terms);
    terms
}

fn collect_leaves(node: &QueryNode, out: &mut Vec<String>) {
    match node {
        QueryNode::MatchAll => {}
        QueryNode::Term(t) => out.push(t.clone()),
        QueryNode::Phrase(words) => out.extend(words.iter().cloned()),
        QueryNode::Wildcard(t) => {
            let core: String = t.chars().filter(|&c| c != '*').collect();
            if !core.is_empty() {
                out.push(core);
            }
        }
        QueryNode::Or(children) | QueryNode::And(children) => {
            for child in children {
                collect_leaves(child, out);
            }
        }
        // negated terms never appear in results, keep them out of coverage
        QueryNode::Not(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_star_are_match_all() {
        assert_eq!(parse_query("").unwrap(), QueryNode::MatchAll);
        assert_eq!(parse_query("   ").unwrap(), QueryNode::MatchAll);
        assert_eq!(parse_query("*").unwrap(), QueryNode::MatchAll);
    }

    #[test]
    fn adjacency_is_or() {
        assert_eq!(
            parse_query("contract invoice").unwrap(),
            QueryNode::Or(vec![
                QueryNode::Term("contract".into()),
                QueryNode::Term("invoice".into())
            ])
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(
            parse_query("a AND b OR c").unwrap(),
            QueryNode::Or(vec![
                QueryNode::And(vec![
                    QueryNode::Term("a".into()),
                    QueryNode::Term("b".into())
                ]),
                QueryNode::Term("c".into())
            ])
        );
    }

    #[test]
    fn not_is_prefix() {
        assert_eq!(
            parse_query("contract NOT draft").unwrap(),
            QueryNode::Or(vec![
                QueryNode::Term("contract".into()),
                QueryNode::Not(Box::new(QueryNode::Term("draft".into())))
            ])
        );
    }

    #[test]
    fn phrases_split_into_words() {
        assert_eq!(
            parse_query("\"signed contract\"").unwrap(),
            QueryNode::Phrase(vec!["signed".into(), "contract".into()])
        );
    }

    #[test]
    fn wildcard_positions_are_kept_verbatim() {
        assert_eq!(
            parse_query("*vertrag").unwrap(),
            QueryNode::Wildcard("*vertrag".into())
        );
        assert_eq!(
            parse_query("vertrag*").unwrap(),
            QueryNode::Wildcard("vertrag*".into())
        );
        assert_eq!(
            parse_query("*vertrag*").unwrap(),
            QueryNode::Wildcard("*vertrag*".into())
        );
    }

    #[test]
    fn parens_group() {
        assert_eq!(
            parse_query("(a OR b) AND c").unwrap(),
            QueryNode::And(vec![
                QueryNode::Or(vec![
                    QueryNode::Term("a".into()),
                    QueryNode::Term("b".into())
                ]),
                QueryNode::Term("c".into())
            ])
        );
    }

    #[test]
    fn unbalanced_input_is_a_parse_error() {
        assert!(parse_query("(a OR b").is_err());
        assert!(parse_query("\"open phrase").is_err());
        assert!(parse_query("AND").is_err());
    }

    #[test]
    fn leaf_terms_skip_negations_and_strip_wildcards() {
        let node = parse_query("contract NOT draft *vertrag*").unwrap();
        assert_eq!(leaf_terms(&node), vec!["contract", "vertrag"]);
    }
}
