//! Passage extraction over the stored `content` field. The content
//! analyzer is re-run at highlight time, so folded index terms still point
//! at the original surface spans; `<em>` tags always wrap what the user
//! actually typed, never a stemmed form.

use std::collections::HashSet;

use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::analysis::{self, fold_query_text};

use super::parser::QueryNode;

/// Which folded tokens the highlighter wraps. Derived from the unstemmed
/// content query only; lemma expansions never contribute tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighlightSpec {
    exact: HashSet<String>,
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    contains: Vec<String>,
    /// `head*tail` interior wildcards.
    split: Vec<(String, String)>,
}

impl HighlightSpec {
    pub fn from_query(node: &QueryNode) -> Self {
        let mut spec = HighlightSpec::default();
        spec.collect(node);
        spec
    }

    fn collect(&mut self, node: &QueryNode) {
        match node {
            QueryNode::MatchAll => {}
            QueryNode::Term(term) => {
                let folded = fold_query_text(term);
                if !folded.is_empty() {
                    for word in folded.split(' ') {
                        self.exact.insert(word.to_owned());
                    }
                }
            }
            QueryNode::Phrase(words) => {
                for word in words {
                    let folded = fold_query_text(word);
                    if !folded.is_empty() {
                        self.exact.insert(folded);
                    }
                }
            }
            QueryNode::Wildcard(pattern) => self.collect_wildcard(pattern),
            QueryNode::Or(children) | QueryNode::And(children) => {
                for child in children {
                    self.collect(child);
                }
            }
            // negated terms are absent from results, never highlight them
            QueryNode::Not(_) => {}
        }
    }

    fn collect_wildcard(&mut self, pattern: &str) {
        let leading = pattern.starts_with('*');
        let trailing = pattern.ends_with('*');
        let segments: Vec<String> = pattern
            .split('*')
            .filter(|s| !s.is_empty())
            .map(|s| fold_query_text(s))
            .filter(|s| !s.is_empty())
            .collect();
        match segments.as_slice() {
            [] => {}
            [core] => match (leading, trailing) {
                (true, true) => self.contains.push(core.clone()),
                (true, false) => self.suffixes.push(core.clone()),
                (false, true) => self.prefixes.push(core.clone()),
                (false, false) => {
                    self.exact.insert(core.clone());
                }
            },
            [head, .., tail] => self.split.push((head.clone(), tail.clone())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
            && self.prefixes.is_empty()
            && self.suffixes.is_empty()
            && self.contains.is_empty()
            && self.split.is_empty()
    }

    /// Does a folded index token match the highlight query?
    pub fn matches(&self, folded_token: &str) -> bool {
        self.exact.contains(folded_token)
            || self.prefixes.iter().any(|p| folded_token.starts_with(p.as_str()))
            || self.suffixes.iter().any(|s| folded_token.ends_with(s.as_str()))
            || self.contains.iter().any(|c| folded_token.contains(c.as_str()))
            || self
                .split
                .iter()
                .any(|(head, tail)| folded_token.starts_with(head.as_str()) && folded_token.ends_with(tail.as_str()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PassageConfig {
    pub max_passages: usize,
    pub max_passage_chars: usize,
    pub max_analyzed_chars: usize,
}

impl Default for PassageConfig {
    fn default() -> Self {
        Self {
            max_passages: 3,
            max_passage_chars: 200,
            max_analyzed_chars: 10_000,
        }
    }
}

/// One display passage.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    /// Cleaned, windowed text with `<em>` tags around surface matches.
    pub text: String,
    /// Raw passage score divided by the document's best passage score,
    /// two decimals. Not comparable across documents.
    pub score: f64,
    pub matched_terms: Vec<String>,
    pub term_coverage: f64,
    /// Passage start offset over content length, two decimals.
    pub position: f64,
}

struct Candidate {
    start: usize,
    end: usize,
    /// (offset_from, offset_to) of each match inside the sentence.
    matches: Vec<(usize, usize)>,
    raw_score: f64,
}

/// Extracts up to `max_passages` scored passages. When the highlight
/// query matched nothing (a lemma-only hit), a single fallback passage is
/// taken from the document start.
pub fn extract_passages(
    content: &str,
    spec: &HighlightSpec,
    query_terms: &[String],
    config: &PassageConfig,
) -> Vec<Passage> {
    let analyzed_end = floor_char_boundary(content, config.max_analyzed_chars);
    let analyzed = &content[..analyzed_end];
    let content_len = content.chars().count().max(1);

    let mut candidates = collect_candidates(analyzed, spec);
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(config.max_passages);
    // back into reading order once the best ones are chosen
    candidates.sort_by_key(|c| c.start);

    if candidates.is_empty() && !analyzed.trim().is_empty() {
        // fallback from document start, for hits found via stemmed fields
        candidates.push(Candidate {
            start: 0,
            end: analyzed_end,
            matches: Vec::new(),
            raw_score: 0.0,
        });
    }

    let max_raw = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(0.0f64, f64::max);

    let folded_query_terms: HashSet<String> = query_terms
        .iter()
        .map(|t| fold_for_comparison(t))
        .filter(|t| !t.is_empty())
        .collect();

    candidates
        .into_iter()
        .map(|candidate| {
            let tagged = tag_matches(content, &candidate);
            let cleaned = clean_whitespace(&tagged);
            let windowed = highlight_window(&cleaned, config.max_passage_chars);
            let matched_terms = matched_terms(&windowed, &folded_query_terms);
            let coverage = term_coverage(&matched_terms, &folded_query_terms);
            let score = if max_raw > 0.0 {
                round2(candidate.raw_score / max_raw)
            } else {
                0.0
            };
            let position = round2(
                content[..candidate.start].chars().count() as f64 / content_len as f64,
            );
            Passage {
                text: windowed,
                score,
                matched_terms,
                term_coverage: coverage,
                position,
            }
        })
        .collect()
}

fn collect_candidates(analyzed: &str, spec: &HighlightSpec) -> Vec<Candidate> {
    if spec.is_empty() {
        return Vec::new();
    }
    let mut analyzer = analysis::unicode_analyzer();
    let tokens = analysis::collect_tokens(&mut analyzer, analyzed);
    let matches: Vec<(usize, usize, String)> = tokens
        .into_iter()
        .filter(|token| spec.matches(&token.text))
        .map(|token| (token.offset_from, token.offset_to, token.text))
        .collect();
    if matches.is_empty() {
        return Vec::new();
    }

    sentence_ranges(analyzed)
        .into_iter()
        .filter_map(|(start, end)| {
            let inside: Vec<&(usize, usize, String)> = matches
                .iter()
                .filter(|(from, to, _)| *from >= start && *to <= end)
                .collect();
            if inside.is_empty() {
                return None;
            }
            let mut unique = HashSet::new();
            let mut term_freq: std::collections::HashMap<&str, usize> =
                std::collections::HashMap::new();
            for (_, _, text) in &inside {
                unique.insert(text.as_str());
                *term_freq.entry(text.as_str()).or_insert(0) += 1;
            }
            // per-term saturation plus a uniqueness bonus; the absolute
            // scale cancels in the per-document normalization
            let raw_score: f64 = term_freq
                .values()
                .map(|&tf| 1.0 + (1.0 + tf as f64).ln())
                .sum::<f64>()
                + unique.len() as f64;
            Some(Candidate {
                start,
                end,
                matches: inside.iter().map(|(f, t, _)| (*f, *t)).collect(),
                raw_score,
            })
        })
        .collect()
}

/// Sentence-ish byte ranges over the analyzed prefix.
fn sentence_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();
    while let Some((idx, ch)) = iter.next() {
        let boundary = match ch {
            '.' | '!' | '?' => iter.peek().map_or(true, |&(_, next)| next.is_whitespace()),
            '\n' => true,
            _ => false,
        };
        if boundary {
            let end = idx + ch.len_utf8();
            if text[start..end].trim().len() > 1 {
                ranges.push((start, end));
            }
            start = end;
        }
    }
    if text[start..].trim().len() > 1 {
        ranges.push((start, text.len()));
    }
    ranges
}

fn tag_matches(content: &str, candidate: &Candidate) -> String {
    let sentence = &content[candidate.start..candidate.end];
    let mut out = String::with_capacity(sentence.len() + candidate.matches.len() * 9);
    let mut cursor = candidate.start;
    for &(from, to) in &candidate.matches {
        if from < cursor {
            continue;
        }
        out.push_str(&content[cursor..from]);
        out.push_str("<em>");
        out.push_str(&content[from..to]);
        out.push_str("</em>");
        cursor = to;
    }
    out.push_str(&content[cursor..candidate.end]);
    out
}

/// Newlines to spaces, whitespace runs collapsed, edges trimmed.
fn clean_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Centres a window of `max_chars` characters on the `<em>…</em>` span,
/// redistributing leftover budget when one side hits the text boundary,
/// trimming the cut edges back to word boundaries and marking cut ends
/// with an ellipsis.
fn highlight_window(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_owned();
    }

    let first_em = text.find("<em>");
    let last_end = text.rfind("</em>").map(|i| i + "</em>".len());
    let (span_start, span_end) = match (first_em, last_end) {
        (Some(start), Some(end)) if start < end => (
            text[..start].chars().count(),
            text[..end].chars().count(),
        ),
        _ => (0, 0),
    };

    let span_len = span_end - span_start;
    let budget = max_chars.saturating_sub(span_len);
    let half = budget / 2;

    let mut start = span_start.saturating_sub(half);
    let mut end = (span_end + (budget - half)).min(chars.len());
    // give unused room on one side to the other
    if start == 0 {
        end = (span_end + budget - (span_start - start)).min(chars.len());
    }
    if end == chars.len() {
        start = span_start.saturating_sub(budget - (end - span_end));
    }

    // never cut through a tag
    start = retreat_out_of_tag(text, start);
    end = advance_out_of_tag(text, end);

    // word-boundary trim on cut edges
    if start > 0 {
        while start < span_start && !chars[start - 1].is_whitespace() {
            start += 1;
        }
    }
    if end < chars.len() {
        while end > span_end.max(start) && !chars[end].is_whitespace() {
            end -= 1;
        }
    }

    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    out.push_str(chars[start..end].iter().collect::<String>().trim());
    if end < chars.len() {
        out.push('…');
    }
    out
}

fn char_index_of_byte(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

fn retreat_out_of_tag(text: &str, char_at: usize) -> usize {
    adjust_out_of_tags(text, char_at, false)
}

fn advance_out_of_tag(text: &str, char_at: usize) -> usize {
    adjust_out_of_tags(text, char_at, true)
}

/// If `char_at` lands inside an `<em>` or `</em>` tag, move it to the
/// tag edge (forward or backward).
fn adjust_out_of_tags(text: &str, char_at: usize, forward: bool) -> usize {
    for tag in ["<em>", "</em>"] {
        let mut search_from = 0;
        while let Some(found) = text[search_from..].find(tag) {
            let byte_start = search_from + found;
            let start = char_index_of_byte(text, byte_start);
            let end = start + tag.chars().count();
            if char_at > start && char_at < end {
                return if forward { end } else { start };
            }
            search_from = byte_start + tag.len();
        }
    }
    char_at
}

/// Terms between `<em>…</em>`, deduplicated case-insensitively. Falls
/// back to scanning the cleaned text for query leaf terms when no tags
/// survived the window.
fn matched_terms(windowed: &str, folded_query_terms: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    let mut search_from = 0;
    while let Some(open) = windowed[search_from..].find("<em>") {
        let start = search_from + open + "<em>".len();
        let Some(close) = windowed[start..].find("</em>") else {
            break;
        };
        let term = &windowed[start..start + close];
        if seen.insert(fold_for_comparison(term)) {
            terms.push(term.to_owned());
        }
        search_from = start + close + "</em>".len();
    }
    if !terms.is_empty() {
        return terms;
    }

    // fallback: any query leaf term present in the cleaned passage
    let folded_passage = fold_for_comparison(windowed);
    for term in folded_query_terms {
        if term.chars().count() >= 2 && folded_passage.contains(term.as_str()) {
            terms.push(term.clone());
        }
    }
    terms.sort();
    terms
}

fn term_coverage(matched: &[String], folded_query_terms: &HashSet<String>) -> f64 {
    if folded_query_terms.is_empty() {
        return 1.0;
    }
    let matched_folded: HashSet<String> =
        matched.iter().map(|t| fold_for_comparison(t)).collect();
    let overlap = matched_folded
        .intersection(folded_query_terms)
        .count();
    round2(overlap as f64 / folded_query_terms.len() as f64)
}

/// NFKC + lowercase, the comparison normalization for matched terms.
fn fold_for_comparison(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn floor_char_boundary(text: &str, at: usize) -> usize {
    if at >= text.len() {
        return text.len();
    }
    let mut end = at;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use crate::query::parser::parse_query;

    use super::*;

    fn spec_for(query: &str) -> HighlightSpec {
        HighlightSpec::from_query(&parse_query(query).unwrap())
    }

    #[test]
    fn exact_terms_match_after_folding() {
        let spec = spec_for("Contract");
        assert!(spec.matches("contract"));
        assert!(!spec.matches("contracts"));
    }

    #[test]
    fn wildcard_shapes_map_to_matchers() {
        assert!(spec_for("vertrag*").matches("vertragsentwurf"));
        assert!(spec_for("*vertrag").matches("arbeitsvertrag"));
        assert!(spec_for("*vertrag*").matches("arbeitsvertragsentwurf"));
        assert!(spec_for("ver*rag").matches("vertrag"));
        assert!(!spec_for("vertrag*").matches("arbeitsvertrag"));
    }

    #[test]
    fn negated_terms_are_not_highlighted() {
        let spec = spec_for("contract NOT draft");
        assert!(spec.matches("contract"));
        assert!(!spec.matches("draft"));
    }

    #[test]
    fn passage_wraps_the_surface_form() {
        let content = "The signed contract is attached.";
        let passages = extract_passages(
            content,
            &spec_for("contract"),
            &["contract".into()],
            &PassageConfig::default(),
        );
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, "The signed <em>contract</em> is attached.");
        assert_eq!(passages[0].matched_terms, vec!["contract"]);
        assert_eq!(passages[0].term_coverage, 1.0);
        assert_eq!(passages[0].score, 1.0);
        assert_eq!(passages[0].position, 0.0);
    }

    #[test]
    fn leading_wildcard_highlights_the_original_compound() {
        let content = "Der Arbeitsvertrag wurde unterschrieben.";
        let passages = extract_passages(
            content,
            &spec_for("*vertrag"),
            &["vertrag".into()],
            &PassageConfig::default(),
        );
        assert_eq!(passages.len(), 1);
        assert!(passages[0].text.contains("<em>Arbeitsvertrag</em>"));
    }

    #[test]
    fn no_match_yields_one_fallback_passage() {
        let content = "running shoes review";
        let passages = extract_passages(
            content,
            &spec_for("run"),
            &["run".into()],
            &PassageConfig::default(),
        );
        assert_eq!(passages.len(), 1);
        assert!(!passages[0].text.contains("<em>"));
        // fallback scan still finds the query term inside "running"
        assert_eq!(passages[0].matched_terms, vec!["run"]);
        assert_eq!(passages[0].score, 0.0);
    }

    #[test]
    fn passages_cap_at_max_and_keep_reading_order() {
        let content = "alpha match one. nothing here. match match match two. \
                       still nothing. match three. match four.";
        let config = PassageConfig {
            max_passages: 2,
            ..Default::default()
        };
        let passages =
            extract_passages(content, &spec_for("match"), &["match".into()], &config);
        assert_eq!(passages.len(), 2);
        // densest sentence wins a slot, output stays in offset order
        assert!(passages[0].position <= passages[1].position);
        assert!(passages.iter().any(|p| p.text.contains("<em>match</em> <em>match</em>")));
    }

    #[test]
    fn window_centres_on_the_highlight() {
        let prefix = "x".repeat(300);
        let suffix = "y".repeat(300);
        let content = format!("{prefix} before contract after {suffix}");
        let passages = extract_passages(
            &content,
            &spec_for("contract"),
            &["contract".into()],
            &PassageConfig::default(),
        );
        let text = &passages[0].text;
        assert!(text.contains("<em>contract</em>"), "window lost the match: {text}");
        assert!(text.starts_with('…') && text.ends_with('…'));
        assert!(text.chars().count() <= 200 + 2, "too long: {}", text.chars().count());
    }

    #[test]
    fn score_is_normalized_per_document() {
        let content = "match once here. match match dense here.";
        let passages = extract_passages(
            content,
            &spec_for("match"),
            &["match".into()],
            &PassageConfig::default(),
        );
        assert_eq!(passages.len(), 2);
        let best = passages.iter().map(|p| p.score).fold(0.0, f64::max);
        assert_eq!(best, 1.0);
        assert!(passages.iter().any(|p| p.score < 1.0));
    }

    #[test]
    fn coverage_counts_unique_query_terms() {
        let content = "alpha beta here.";
        let passages = extract_passages(
            content,
            &spec_for("alpha beta gamma delta"),
            &["alpha".into(), "beta".into(), "gamma".into(), "delta".into()],
            &PassageConfig::default(),
        );
        assert_eq!(passages[0].term_coverage, 0.5);
    }

    #[test]
    fn analyzed_content_is_capped() {
        let mut content = "padding ".repeat(2000);
        content.push_str("needle at the end");
        let passages = extract_passages(
            &content,
            &spec_for("needle"),
            &["needle".into()],
            &PassageConfig::default(),
        );
        // the needle sits past the 10k analyzed cap
        assert!(passages.iter().all(|p| !p.text.contains("<em>")));
    }
}
