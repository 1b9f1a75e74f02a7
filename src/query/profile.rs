//! Query profiling: the planner's view of a request without running the
//! full result pipeline. Reports how the query was parsed and rewritten,
//! how each filter classifies and what it costs, facet cardinalities,
//! and per-document scoring explanations.

use std::collections::BTreeMap;

use serde::Serialize;
use tantivy::collector::{Count, FacetCollector, TopDocs};
use tantivy::query::Query;

use crate::analysis::lemma::LemmaLanguage;
use crate::error::ToolError;
use crate::indexes::schema::FACET_DIMENSIONS;

use super::filter::{classify_filters, single_language_filter, ClassifiedFilter};
use super::parser::parse_query;
use super::planner::{QueryPlanner, SearchParams};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileOptions {
    pub analyze_filter_impact: bool,
    pub analyze_document_scoring: bool,
    pub analyze_facet_cost: bool,
    pub max_doc_explanations: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub parsed_query: String,
    pub planned_main_query: String,
    pub filters: Vec<FilterAnalysis>,
    pub lemma_boosts: BTreeMap<String, f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_language_shortcut: Option<String>,
    pub total_hits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet_cost: Option<Vec<FacetCostEstimate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_scoring: Option<Vec<DocExplanation>>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterAnalysis {
    pub field: String,
    pub operator: String,
    pub classification: String,
    pub applied_as: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_docs: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetCostEstimate {
    pub dimension: String,
    pub multi_valued: bool,
    pub observed_values: usize,
    pub drilled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocExplanation {
    pub file_path: String,
    pub score: f32,
    pub explanation: serde_json::Value,
}

impl QueryPlanner {
    pub fn profile(
        &self,
        params: &SearchParams,
        options: &ProfileOptions,
    ) -> Result<ProfileReport, ToolError> {
        let started = std::time::Instant::now();
        let classified = classify_filters(&params.filters)?;
        let ast = parse_query(params.query.as_deref().unwrap_or(""))
            .map_err(|err| ToolError::Parse(err.to_string()))?;

        let searcher = self.service().searcher();
        let scoring = self.scoring_query(&ast, &classified)?;
        let (filter_clauses, negative_clauses, drills) = self.filter_clauses(&classified)?;

        let mut clauses: Vec<(tantivy::query::Occur, Box<dyn Query>)> =
            vec![(tantivy::query::Occur::Must, scoring.box_clone())];
        for clause in filter_clauses.iter().chain(drills.iter().map(|(_, q)| q)) {
            clauses.push((tantivy::query::Occur::Must, clause.box_clone()));
        }
        for clause in &negative_clauses {
            clauses.push((tantivy::query::Occur::MustNot, clause.box_clone()));
        }
        let full_query = tantivy::query::BooleanQuery::new(clauses);
        let total_hits = searcher.search(&full_query, &Count)?;

        let filters = self.analyze_filters(&params.filters, &classified, options, &searcher)?;

        let distribution = self.service().language_distribution.get();
        let mut lemma_boosts = BTreeMap::new();
        let single_language = single_language_filter(&classified).map(str::to_owned);
        match &single_language {
            Some(code) if LemmaLanguage::from_iso_code(code).is_some() => {
                lemma_boosts.insert(code.clone(), 1.0);
            }
            Some(_) => {}
            None => {
                for language in LemmaLanguage::ALL {
                    lemma_boosts.insert(
                        language.iso_code().to_owned(),
                        distribution.lemma_boost(language.iso_code()),
                    );
                }
            }
        }

        let facet_cost = if options.analyze_facet_cost {
            Some(self.facet_cost(&searcher, &full_query, &drills)?)
        } else {
            None
        };

        let document_scoring = if options.analyze_document_scoring {
            Some(self.explain_documents(
                &searcher,
                &full_query,
                options.max_doc_explanations.clamp(1, 20),
            )?)
        } else {
            None
        };

        Ok(ProfileReport {
            parsed_query: ast.to_string(),
            planned_main_query: format!("{full_query:?}"),
            filters,
            lemma_boosts,
            single_language_shortcut: single_language,
            total_hits,
            facet_cost,
            document_scoring,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn analyze_filters(
        &self,
        raw: &[super::filter::Filter],
        classified: &[ClassifiedFilter],
        options: &ProfileOptions,
        searcher: &tantivy::Searcher,
    ) -> Result<Vec<FilterAnalysis>, ToolError> {
        raw.iter()
            .zip(classified.iter())
            .map(|(filter, class)| {
                let (classification, applied_as) = describe_classification(class);
                let matching_docs = if options.analyze_filter_impact {
                    let (clauses, negatives, drills) =
                        self.filter_clauses(std::slice::from_ref(class))?;
                    let query: Box<dyn Query> = clauses
                        .into_iter()
                        .chain(drills.into_iter().map(|(_, q)| q))
                        .chain(negatives)
                        .next()
                        .unwrap_or_else(|| Box::new(tantivy::query::AllQuery));
                    Some(searcher.search(query.as_ref(), &Count)?)
                } else {
                    None
                };
                Ok(FilterAnalysis {
                    field: filter.field.clone(),
                    operator: filter.operator.as_str().to_owned(),
                    classification: classification.to_owned(),
                    applied_as: applied_as.to_owned(),
                    matching_docs,
                })
            })
            .collect()
    }

    fn facet_cost(
        &self,
        searcher: &tantivy::Searcher,
        query: &dyn Query,
        drills: &[(String, Box<dyn Query>)],
    ) -> Result<Vec<FacetCostEstimate>, ToolError> {
        let mut collector = FacetCollector::for_field("facet");
        for dimension in FACET_DIMENSIONS {
            let root = format!("/{}", dimension.name);
            collector.add_facet(&root);
        }
        let counts = searcher.search(query, &collector)?;
        Ok(FACET_DIMENSIONS
            .iter()
            .map(|dimension| {
                let root = format!("/{}", dimension.name);
                FacetCostEstimate {
                    dimension: dimension.name.to_owned(),
                    multi_valued: dimension.multi_valued,
                    observed_values: counts.get(&root).count(),
                    drilled: drills.iter().any(|(d, _)| d == dimension.name),
                }
            })
            .collect())
    }

    fn explain_documents(
        &self,
        searcher: &tantivy::Searcher,
        query: &dyn Query,
        limit: usize,
    ) -> Result<Vec<DocExplanation>, ToolError> {
        let top = searcher.search(query, &TopDocs::with_limit(limit))?;
        let fields = self.service().fields();
        top.into_iter()
            .map(|(score, address)| {
                let doc = searcher.doc(address)?;
                let file_path = doc
                    .get_first(fields.file_path)
                    .and_then(tantivy::schema::Value::as_text)
                    .unwrap_or_default()
                    .to_owned();
                let explanation = query
                    .explain(searcher, address)
                    .map(|e| {
                        serde_json::from_str(&e.to_pretty_json())
                            .unwrap_or(serde_json::Value::Null)
                    })
                    .unwrap_or(serde_json::Value::Null);
                Ok(DocExplanation {
                    file_path,
                    score,
                    explanation,
                })
            })
            .collect()
    }
}

fn describe_classification(filter: &ClassifiedFilter) -> (&'static str, &'static str) {
    match filter {
        ClassifiedFilter::PositiveFacet { .. } => (
            "positive-facet",
            "drill-down dimension (drill-sideways counts)",
        ),
        ClassifiedFilter::NegativeFacet { .. } => ("negative", "must-not facet term"),
        ClassifiedFilter::StringTerm { .. } => ("string-term", "filter clause (term/set)"),
        ClassifiedFilter::NegativeString { .. } => ("negative", "must-not term"),
        ClassifiedFilter::LongPointEq { .. } => ("long-point-eq", "filter clause (point)"),
        ClassifiedFilter::NegativeLong { .. } => ("negative", "must-not point"),
        ClassifiedFilter::Range { .. } => ("range", "filter clause (point range)"),
    }
}
