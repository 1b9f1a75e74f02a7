use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tantivy::collector::{Count, FacetCollector, FacetCounts, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, ConstScoreQuery, Occur, PhraseQuery, Query, RangeQuery,
    RegexQuery, TermQuery, TermSetQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::{DocAddress, DocId, Score, Searcher, SegmentReader, Term};
use tracing::debug;

use crate::analysis::fold_query_text;
use crate::analysis::lemma::{LemmaLanguage, Lemmatizer};
use crate::analysis::reverse::reverse_term;
use crate::error::ToolError;
use crate::indexes::schema::{facet_path, DocFields, FieldClass, FACET_DIMENSIONS};
use crate::indexes::service::IndexService;

use super::filter::{classify_filters, single_language_filter, ClassifiedFilter, Filter};
use super::highlight::HighlightSpec;
use super::parser::{leaf_terms, parse_query, QueryNode};

pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 10;
const FACET_VALUES_PER_DIMENSION: usize = 20;
const CONTENT_BOOST: f32 = 2.0;
const TRANSLIT_BOOST: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Score,
    ModifiedDate,
    CreatedDate,
    FileSize,
}

impl SortBy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "" | "_score" => Some(SortBy::Score),
            "modified_date" => Some(SortBy::ModifiedDate),
            "created_date" => Some(SortBy::CreatedDate),
            "file_size" => Some(SortBy::FileSize),
            _ => None,
        }
    }

    fn fast_field(self) -> Option<(&'static str, bool)> {
        match self {
            SortBy::Score => None,
            SortBy::ModifiedDate => Some(("modified_date", true)),
            SortBy::CreatedDate => Some(("created_date", true)),
            SortBy::FileSize => Some(("file_size", false)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(SortOrder::Asc),
            "" | "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: Option<String>,
    pub filters: Vec<Filter>,
    pub page: usize,
    pub page_size: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FacetCount {
    pub value: String,
    pub count: u64,
}

#[derive(Debug)]
pub struct SearchHit {
    pub score: f32,
    pub address: DocAddress,
}

#[derive(Debug)]
pub struct SearchOutcome {
    /// The page's hits, in requested order.
    pub hits: Vec<SearchHit>,
    pub total_hits: usize,
    pub page: usize,
    pub page_size: usize,
    pub facets: BTreeMap<String, Vec<FacetCount>>,
    pub highlight: HighlightSpec,
    pub query_terms: Vec<String>,
    pub elapsed_ms: u64,
    /// The searcher the hits came from; document fetches must use the
    /// same view.
    pub searcher: Searcher,
}

/// Builds and executes the full query: wildcard normalization, the
/// leading-wildcard rewrite through `content_reversed`, stemmed
/// OR-expansion over the lemma shadows, filter clauses and faceting.
pub struct QueryPlanner {
    service: Arc<IndexService>,
}

struct FieldTarget<'a> {
    field: Field,
    /// Present only for `content`: the reversed shadow for leading
    /// wildcards.
    reversed: Option<Field>,
    /// Present only for lemma fields: the query-time lemmatizer.
    lemmatizer: Option<&'a Lemmatizer>,
    /// The translit shadow folds query terms through the digraph map so
    /// `Vertraege` meets indexed `Verträge`.
    transliterate: bool,
}

impl FieldTarget<'_> {
    fn fold(&self, text: &str) -> String {
        if self.transliterate {
            crate::analysis::fold_translit_query_text(text)
        } else {
            fold_query_text(text)
        }
    }
}

impl QueryPlanner {
    pub fn new(service: Arc<IndexService>) -> Self {
        Self { service }
    }

    pub fn search(&self, params: &SearchParams) -> Result<SearchOutcome, ToolError> {
        let started = Instant::now();
        let classified = classify_filters(&params.filters)?;
        let ast = parse_query(params.query.as_deref().unwrap_or(""))
            .map_err(|err| ToolError::Parse(err.to_string()))?;

        let page_size = normalize_page_size(params.page_size);
        let page = params.page;
        let collect_upto = ((page + 1).saturating_mul(page_size)).clamp(1, 10_000);

        let searcher = self.service.searcher();
        let scoring = self.scoring_query(&ast, &classified)?;
        let (filter_clauses, negative_clauses, drills) = self.filter_clauses(&classified)?;

        let assemble = |exclude_dimension: Option<&str>| -> Box<dyn Query> {
            let mut clauses: Vec<(Occur, Box<dyn Query>)> =
                vec![(Occur::Must, scoring.box_clone())];
            for clause in &filter_clauses {
                clauses.push((
                    Occur::Must,
                    Box::new(ConstScoreQuery::new(clause.box_clone(), 0.0)),
                ));
            }
            for (dimension, drill) in &drills {
                if Some(dimension.as_str()) == exclude_dimension {
                    continue;
                }
                clauses.push((
                    Occur::Must,
                    Box::new(ConstScoreQuery::new(drill.box_clone(), 0.0)),
                ));
            }
            for clause in &negative_clauses {
                clauses.push((Occur::MustNot, clause.box_clone()));
            }
            Box::new(BooleanQuery::new(clauses))
        };

        let full_query = assemble(None);
        debug!(query = ?full_query, "executing search");

        let (ranked, total_hits, facet_counts) = collect_hits(
            &searcher,
            full_query.as_ref(),
            collect_upto,
            params.sort_by,
            params.sort_order,
        )?;

        let mut facets = facet_map(&facet_counts);

        // drill-sideways: each drilled dimension re-counts with its own
        // drill removed, so sibling values stay visible
        for (dimension, _) in &drills {
            let sideways_query = assemble(Some(dimension.as_str()));
            let mut collector = FacetCollector::for_field("facet");
            let root = format!("/{dimension}");
            collector.add_facet(&root);
            let sideways = searcher.search(sideways_query.as_ref(), &collector)?;
            facets.insert(
                dimension.clone(),
                top_counts(&sideways, dimension),
            );
        }

        let start = page * page_size;
        let hits = ranked
            .into_iter()
            .skip(start)
            .take(page_size)
            .map(|(score, address)| SearchHit { score, address })
            .collect();

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.service.query_stats.record(elapsed_ms);

        Ok(SearchOutcome {
            hits,
            total_hits,
            page,
            page_size,
            facets,
            highlight: HighlightSpec::from_query(&ast),
            query_terms: leaf_terms(&ast),
            elapsed_ms,
            searcher,
        })
    }

    pub(super) fn service(&self) -> &Arc<IndexService> {
        &self.service
    }

    /// The boolean `SHOULD` union: content query at ×2, the German
    /// transliteration shadow at a fixed low boost, and one clause per
    /// lemma language scaled by the corpus language distribution. A
    /// single `language eq X` filter narrows the expansion to that
    /// language at boost 1.0.
    pub(super) fn scoring_query(
        &self,
        ast: &QueryNode,
        classified: &[ClassifiedFilter],
    ) -> Result<Box<dyn Query>, ToolError> {
        if matches!(ast, QueryNode::MatchAll) {
            return Ok(Box::new(AllQuery));
        }
        let fields = self.service.fields();

        let content_target = FieldTarget {
            field: fields.content,
            reversed: Some(fields.content_reversed),
            lemmatizer: None,
            transliterate: false,
        };
        let content_query = build_node(ast, &content_target)?
            .ok_or_else(|| ToolError::Parse("query has no searchable terms".into()))?;

        let mut should: Vec<(Occur, Box<dyn Query>)> = vec![(
            Occur::Should,
            Box::new(BoostQuery::new(content_query, CONTENT_BOOST)),
        )];

        let translit_target = FieldTarget {
            field: fields.content_translit_de,
            reversed: None,
            lemmatizer: None,
            transliterate: true,
        };
        if let Some(translit_query) = build_node(ast, &translit_target)? {
            should.push((
                Occur::Should,
                Box::new(BoostQuery::new(translit_query, TRANSLIT_BOOST)),
            ));
        }

        let single_language = single_language_filter(classified).map(str::to_owned);
        match single_language {
            Some(code) => {
                if let Some(language) = LemmaLanguage::from_iso_code(&code) {
                    if let Some(query) = self.lemma_query(ast, language)? {
                        should.push((Occur::Should, Box::new(BoostQuery::new(query, 1.0))));
                    }
                }
            }
            None => {
                let distribution = self.service.language_distribution.get();
                for language in LemmaLanguage::ALL {
                    let boost = distribution.lemma_boost(language.iso_code());
                    if let Some(query) = self.lemma_query(ast, language)? {
                        should.push((Occur::Should, Box::new(BoostQuery::new(query, boost))));
                    }
                }
            }
        }

        // a pure-SHOULD boolean matches iff at least one clause matches
        Ok(Box::new(BooleanQuery::new(should)))
    }

    fn lemma_query(
        &self,
        ast: &QueryNode,
        language: LemmaLanguage,
    ) -> Result<Option<Box<dyn Query>>, ToolError> {
        let fields = self.service.fields();
        let field = match language {
            LemmaLanguage::German => fields.content_lemma_de,
            LemmaLanguage::English => fields.content_lemma_en,
        };
        let target = FieldTarget {
            field,
            reversed: None,
            lemmatizer: Some(self.service.lemmas().query(language)),
            transliterate: false,
        };
        build_node(ast, &target)
    }

    /// Filter clauses, must-not clauses and per-dimension drill-downs.
    #[allow(clippy::type_complexity)]
    pub(super) fn filter_clauses(
        &self,
        classified: &[ClassifiedFilter],
    ) -> Result<
        (
            Vec<Box<dyn Query>>,
            Vec<Box<dyn Query>>,
            Vec<(String, Box<dyn Query>)>,
        ),
        ToolError,
    > {
        let fields = self.service.fields();
        let mut filters: Vec<Box<dyn Query>> = Vec::new();
        let mut negatives: Vec<Box<dyn Query>> = Vec::new();
        // same dimension ORs together, so group drill values first
        let mut drill_values: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for filter in classified {
            match filter {
                ClassifiedFilter::PositiveFacet { dimension, values } => {
                    drill_values
                        .entry(dimension)
                        .or_default()
                        .extend(values.iter().cloned());
                }
                ClassifiedFilter::NegativeFacet { dimension, values } => {
                    for value in values {
                        negatives.push(Box::new(TermQuery::new(
                            Term::from_facet(fields.facet, &facet_path(dimension, value)),
                            IndexRecordOption::Basic,
                        )));
                    }
                }
                ClassifiedFilter::StringTerm { field, values } => {
                    filters.push(string_term_query(fields, field, values)?);
                }
                ClassifiedFilter::NegativeString { field, values } => {
                    negatives.push(string_term_query(fields, field, values)?);
                }
                ClassifiedFilter::LongPointEq { field, values } => {
                    filters.push(long_point_query(fields, field, values)?);
                }
                ClassifiedFilter::NegativeLong { field, values } => {
                    negatives.push(long_point_query(fields, field, values)?);
                }
                ClassifiedFilter::Range { field, from, to } => {
                    filters.push(range_query(field, *from, *to));
                }
            }
        }

        let drills = drill_values
            .into_iter()
            .map(|(dimension, values)| {
                let union: Vec<(Occur, Box<dyn Query>)> = values
                    .iter()
                    .map(|value| {
                        (
                            Occur::Should,
                            Box::new(TermQuery::new(
                                Term::from_facet(fields.facet, &facet_path(dimension, value)),
                                IndexRecordOption::Basic,
                            )) as Box<dyn Query>,
                        )
                    })
                    .collect();
                (
                    dimension.to_owned(),
                    Box::new(BooleanQuery::new(union)) as Box<dyn Query>,
                )
            })
            .collect();

        Ok((filters, negatives, drills))
    }
}

fn normalize_page_size(requested: usize) -> usize {
    if requested == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        requested.min(MAX_PAGE_SIZE)
    }
}

fn string_term_query(
    fields: &DocFields,
    field_name: &str,
    values: &[String],
) -> Result<Box<dyn Query>, ToolError> {
    let field = named_field(fields, field_name)?;
    let terms: Vec<Term> = values
        .iter()
        .map(|value| Term::from_field_text(field, value))
        .collect();
    Ok(term_or_set(terms))
}

fn long_point_query(
    fields: &DocFields,
    field_name: &str,
    values: &[i64],
) -> Result<Box<dyn Query>, ToolError> {
    let field = named_field(fields, field_name)?;
    let unsigned = DocFields::field_class(field_name) == Some(FieldClass::NumericPoint);
    let terms: Vec<Term> = values
        .iter()
        .map(|&value| {
            if unsigned {
                Term::from_field_u64(field, value.max(0) as u64)
            } else {
                Term::from_field_i64(field, value)
            }
        })
        .collect();
    Ok(term_or_set(terms))
}

fn term_or_set(mut terms: Vec<Term>) -> Box<dyn Query> {
    if terms.len() == 1 {
        Box::new(TermQuery::new(terms.pop().unwrap(), IndexRecordOption::Basic))
    } else {
        Box::new(TermSetQuery::new(terms))
    }
}

fn range_query(field_name: &str, from: Option<i64>, to: Option<i64>) -> Box<dyn Query> {
    let lower = from.map_or(Bound::Unbounded, Bound::Included);
    let upper = to.map_or(Bound::Unbounded, Bound::Included);
    if DocFields::field_class(field_name) == Some(FieldClass::NumericPoint) {
        let lower = bound_as_u64(lower);
        let upper = bound_as_u64(upper);
        Box::new(RangeQuery::new_u64_bounds(field_name.to_owned(), lower, upper))
    } else {
        Box::new(RangeQuery::new_i64_bounds(field_name.to_owned(), lower, upper))
    }
}

fn bound_as_u64(bound: Bound<i64>) -> Bound<u64> {
    match bound {
        Bound::Included(v) => Bound::Included(v.max(0) as u64),
        Bound::Excluded(v) => Bound::Excluded(v.max(0) as u64),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn named_field(fields: &DocFields, name: &str) -> Result<Field, ToolError> {
    fields
        .field_by_name(name)
        .ok_or_else(|| ToolError::Parse(format!("unknown field {name}")))
}

/// Recursively builds a tantivy query for one field target, applying
/// wildcard normalization on the way down.
fn build_node(
    node: &QueryNode,
    target: &FieldTarget<'_>,
) -> Result<Option<Box<dyn Query>>, ToolError> {
    match node {
        QueryNode::MatchAll => Ok(Some(Box::new(AllQuery))),
        QueryNode::Term(term) => Ok(term_tokens(term, target).map(tokens_to_query)),
        QueryNode::Phrase(words) => {
            let mut tokens = Vec::new();
            for word in words {
                if let Some(mut word_tokens) = term_tokens(word, target) {
                    tokens.append(&mut word_tokens.1);
                }
            }
            Ok(if tokens.is_empty() {
                None
            } else {
                Some(tokens_to_query((target.field, tokens)))
            })
        }
        QueryNode::Wildcard(pattern) => wildcard_query(pattern, target).map(Some),
        QueryNode::Or(children) => {
            let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
            for child in children {
                match child {
                    QueryNode::Not(inner) => {
                        if let Some(query) = build_node(inner, target)? {
                            clauses.push((Occur::MustNot, query));
                        }
                    }
                    _ => {
                        if let Some(query) = build_node(child, target)? {
                            clauses.push((Occur::Should, query));
                        }
                    }
                }
            }
            Ok(boolean_or_none(clauses))
        }
        QueryNode::And(children) => {
            let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
            for child in children {
                match child {
                    QueryNode::Not(inner) => {
                        if let Some(query) = build_node(inner, target)? {
                            clauses.push((Occur::MustNot, query));
                        }
                    }
                    _ => {
                        if let Some(query) = build_node(child, target)? {
                            clauses.push((Occur::Must, query));
                        }
                    }
                }
            }
            Ok(boolean_or_none(clauses))
        }
        QueryNode::Not(inner) => {
            // a bare negation matches nothing on its own
            let Some(query) = build_node(inner, target)? else {
                return Ok(None);
            };
            Ok(Some(Box::new(BooleanQuery::new(vec![(
                Occur::MustNot,
                query,
            )]))))
        }
    }
}

fn boolean_or_none(clauses: Vec<(Occur, Box<dyn Query>)>) -> Option<Box<dyn Query>> {
    if clauses.is_empty() {
        None
    } else {
        Some(Box::new(BooleanQuery::new(clauses)))
    }
}

/// Analyzes (or lemmatizes) one surface term into the target field's
/// index-side tokens. `None` when nothing survives folding.
fn term_tokens(term: &str, target: &FieldTarget<'_>) -> Option<(Field, Vec<String>)> {
    let tokens: Vec<String> = match target.lemmatizer {
        Some(lemmatizer) => lemmatizer
            .lemma_terms(term)
            .iter()
            .flat_map(|lemma| {
                fold_query_text(lemma)
                    .split_whitespace()
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .collect(),
        None => target
            .fold(term)
            .split_whitespace()
            .map(str::to_owned)
            .collect(),
    };
    if tokens.is_empty() {
        None
    } else {
        Some((target.field, tokens))
    }
}

fn tokens_to_query((field, tokens): (Field, Vec<String>)) -> Box<dyn Query> {
    if tokens.len() == 1 {
        Box::new(TermQuery::new(
            Term::from_field_text(field, &tokens[0]),
            IndexRecordOption::WithFreqsAndPositions,
        ))
    } else {
        let terms: Vec<Term> = tokens
            .iter()
            .map(|t| Term::from_field_text(field, t))
            .collect();
        Box::new(PhraseQuery::new(terms))
    }
}

/// Wildcard normalization per field. Query parsers never run the
/// analyzer over wildcard terms, so cores are folded here; on `content`,
/// leading wildcards rewrite onto the reversed shadow.
fn wildcard_query(
    pattern: &str,
    target: &FieldTarget<'_>,
) -> Result<Box<dyn Query>, ToolError> {
    let leading = pattern.starts_with('*');
    let trailing = pattern.ends_with('*');
    let segments: Vec<String> = pattern
        .split('*')
        .filter(|s| !s.is_empty())
        .map(|s| target.fold(s))
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Ok(Box::new(AllQuery));
    }

    if let (Some(reversed_field), [core]) = (target.reversed, segments.as_slice()) {
        match (leading, trailing) {
            (true, false) => {
                // *vertrag → gartrev* on the reversed shadow
                let reversed_core = reverse_term(core);
                return regex_on(reversed_field, &format!("{}.*", regex::escape(&reversed_core)));
            }
            (true, true) => {
                // *vertrag* → contains on content OR suffix via the shadow
                let contains =
                    regex_on(target.field, &format!(".*{}.*", regex::escape(core)))?;
                let reversed_core = reverse_term(core);
                let suffix =
                    regex_on(reversed_field, &format!("{}.*", regex::escape(&reversed_core)))?;
                return Ok(Box::new(BooleanQuery::new(vec![
                    (Occur::Should, contains),
                    (Occur::Should, suffix),
                ])));
            }
            _ => {}
        }
    }

    // general shape: escaped segments joined by `.*`
    let mut regex_pattern = String::new();
    if leading {
        regex_pattern.push_str(".*");
    }
    regex_pattern.push_str(
        &segments
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join(".*"),
    );
    if trailing {
        regex_pattern.push_str(".*");
    }
    regex_on(target.field, &regex_pattern)
}

fn regex_on(field: Field, pattern: &str) -> Result<Box<dyn Query>, ToolError> {
    RegexQuery::from_pattern(pattern, field)
        .map(|q| Box::new(q) as Box<dyn Query>)
        .map_err(|err| ToolError::Parse(format!("bad wildcard pattern: {err}")))
}

/// Per-segment sort-key reader over a numeric fast field. Documents
/// without a value sort last.
fn sort_value_reader(
    segment: &SegmentReader,
    name: &str,
    signed: bool,
) -> Box<dyn Fn(DocId) -> i64 + Send + Sync> {
    if signed {
        match segment.fast_fields().i64(name) {
            Ok(column) => Box::new(move |doc| column.first(doc).unwrap_or(i64::MIN)),
            Err(_) => Box::new(|_| i64::MIN),
        }
    } else {
        match segment.fast_fields().u64(name) {
            Ok(column) => Box::new(move |doc| {
                column.first(doc).map(|v| v as i64).unwrap_or(i64::MIN)
            }),
            Err(_) => Box::new(|_| i64::MIN),
        }
    }
}

type Ranked = (Vec<(Score, DocAddress)>, usize, FacetCounts);

/// Runs the query with the right top-docs collector for the sort mode,
/// plus total count and facet counts in the same pass. Metadata sorts
/// tie-break by score.
fn collect_hits(
    searcher: &Searcher,
    query: &dyn Query,
    limit: usize,
    sort_by: SortBy,
    sort_order: SortOrder,
) -> tantivy::Result<Ranked> {
    let mut facet_collector = FacetCollector::for_field("facet");
    for dimension in FACET_DIMENSIONS {
        let root = format!("/{}", dimension.name);
        facet_collector.add_facet(&root);
    }

    match sort_by.fast_field() {
        None => {
            let (tops, total, facets) = searcher.search(
                query,
                &(TopDocs::with_limit(limit), Count, facet_collector),
            )?;
            Ok((tops, total, facets))
        }
        Some((name, signed)) => {
            let sign = match sort_order {
                SortOrder::Desc => 1i64,
                SortOrder::Asc => -1i64,
            };
            let collector =
                TopDocs::with_limit(limit).tweak_score(move |segment: &SegmentReader| {
                    let reader = sort_value_reader(segment, name, signed);
                    move |doc: DocId, score: Score| {
                        (sign.saturating_mul(reader(doc)), score)
                    }
                });
            let (tops, total, facets) =
                searcher.search(query, &(collector, Count, facet_collector))?;
            let ranked = tops
                .into_iter()
                .map(|((_, score), address)| (score, address))
                .collect();
            Ok((ranked, total, facets))
        }
    }
}

fn facet_map(counts: &FacetCounts) -> BTreeMap<String, Vec<FacetCount>> {
    FACET_DIMENSIONS
        .iter()
        .map(|dimension| (dimension.name.to_owned(), top_counts(counts, dimension.name)))
        .collect()
}

fn top_counts(counts: &FacetCounts, dimension: &str) -> Vec<FacetCount> {
    let root = format!("/{dimension}");
    let mut values: Vec<FacetCount> = counts
        .top_k(&root, FACET_VALUES_PER_DIMENSION)
        .into_iter()
        .map(|(facet, count)| {
            let path = facet.to_string();
            let value = path
                .strip_prefix(&format!("{root}/"))
                .unwrap_or(&path)
                .to_owned();
            FacetCount { value, count }
        })
        .collect();
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    values
}
