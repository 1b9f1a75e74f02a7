//! Request and response DTOs for the tool boundary. The enclosing
//! JSON-RPC collaborator passes structured requests in and gets a
//! `{success, error?, …payload}` envelope back.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::analysis::lemma::LemmaCacheMetrics;
use crate::error::ToolError;
use crate::indexes::service::DateFieldHint;
use crate::query::filter::Filter;
use crate::query::highlight::Passage;
use crate::query::planner::FacetCount;
use crate::stats::QueryRuntimeMetrics;

// ── Requests ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub filters: Vec<Filter>,
    pub page: usize,
    pub page_size: usize,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileQueryRequest {
    pub query: Option<String>,
    pub filters: Vec<Filter>,
    pub analyze_filter_impact: bool,
    pub analyze_document_scoring: bool,
    pub analyze_facet_cost: bool,
    pub max_doc_explanations: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartCrawlRequest {
    pub full_reindex: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRequest {
    pub path: PathBuf,
    #[serde(default)]
    pub crawl_now: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetailsRequest {
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizeRequest {
    pub max_segments: usize,
}

impl Default for OptimizeRequest {
    fn default() -> Self {
        Self { max_segments: 1 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurgeRequest {
    pub confirm: bool,
    pub full_purge: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfirmRequest {
    pub confirm: bool,
}

// ── Responses ───────────────────────────────────────────────────────────

/// One search hit, metadata plus scored passages. Full content is never
/// part of search results.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub file_path: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_extension: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_type: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub creator: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subject: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub created_date: i64,
    pub modified_date: i64,
    pub indexed_date: i64,
    pub score: f32,
    pub passages: Vec<Passage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub documents: Vec<SearchDocument>,
    pub total_hits: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub facets: BTreeMap<String, Vec<FacetCount>>,
    pub active_filters: Vec<Filter>,
    pub search_time_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatsResponse {
    pub document_count: u64,
    pub index_path: PathBuf,
    pub schema_version: u32,
    pub software_version: String,
    pub build_timestamp: String,
    pub schema_upgrade_required: bool,
    pub date_field_hints: BTreeMap<String, DateFieldHint>,
    pub lemmatizer_cache_metrics: BTreeMap<String, LemmaCacheMetrics>,
    pub query_runtime_metrics: QueryRuntimeMetrics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    pub storage_class: String,
    pub analyzer: String,
    pub faceted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFieldsResponse {
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetailsResponse {
    #[serde(flatten)]
    pub document: SearchDocument,
    pub content: String,
    pub content_truncated: bool,
    pub content_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoriesResponse {
    pub directories: Vec<PathBuf>,
    pub locked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStartedResponse {
    pub operation_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

// ── Envelope ────────────────────────────────────────────────────────────

impl ToolError {
    /// Stable machine-readable error kind for the envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Parse(_) => "parse_error",
            ToolError::Filter(_) => "filter_error",
            ToolError::Index(_) | ToolError::Io(_) => "io_error",
            ToolError::NotConfirmed => "not_confirmed",
            ToolError::AlreadyRunning(_) => "already_running",
            ToolError::CrawlerActive => "crawler_active",
            ToolError::NotFound(_) => "not_found",
            ToolError::DirectoriesLocked => "directories_locked",
            ToolError::Other(_) => "error",
        }
    }
}

/// The `{success, error?, …payload}` wrapper every tool call returns.
pub fn envelope<T: Serialize>(result: Result<T, ToolError>) -> serde_json::Value {
    match result {
        Ok(payload) => {
            let mut value = serde_json::to_value(payload).unwrap_or_else(
                |err| serde_json::json!({ "serializationError": err.to_string() }),
            );
            if let serde_json::Value::Object(map) = &mut value {
                map.insert("success".into(), serde_json::Value::Bool(true));
                return value;
            }
            serde_json::json!({ "success": true, "result": value })
        }
        Err(err) => serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "errorKind": err.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_flattens_payloads() {
        let value = envelope(Ok(MessageResponse {
            message: "done".into(),
        }));
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "done");
    }

    #[test]
    fn envelope_reports_error_kind() {
        let value: serde_json::Value =
            envelope::<MessageResponse>(Err(ToolError::Parse("bad query".into())));
        assert_eq!(value["success"], false);
        assert_eq!(value["errorKind"], "parse_error");
        assert!(value["error"].as_str().unwrap().contains("bad query"));
    }

    #[test]
    fn search_request_defaults_are_permissive() {
        let request: SearchRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(request.query.is_none());
        assert!(request.filters.is_empty());
        assert_eq!(request.page, 0);
    }
}
