//! The tool-invocation boundary. Each tool takes a structured request
//! and returns a typed payload; [`Tools::dispatch`] wraps both in the
//! `{success, error?, …}` envelope the transport ships to the client.

pub mod types;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tantivy::schema::{Document, Field, Value};
use tracing::info;

use crate::application::application::Application;
use crate::application::config::state::StateError;
use crate::crawl::CrawlerError;
use crate::error::ToolError;
use crate::indexes::admin::{AdminOp, AdminStatus};
use crate::indexes::schema::{facet_dimension, DocFields, SCHEMA_VERSION};
use crate::indexes::service::SOFTWARE_VERSION;
use crate::query::highlight::{extract_passages, PassageConfig};
use crate::query::planner::{QueryPlanner, SearchParams, SortBy, SortOrder};
use crate::query::profile::ProfileOptions;

use types::*;

const MAX_DETAILS_CONTENT_CHARS: usize = 500_000;

pub const BUILD_TIMESTAMP: &str = match option_env!("BUILD_TIMESTAMP") {
    Some(stamp) => stamp,
    None => "dev",
};

pub struct Tools {
    app: Arc<Application>,
    planner: QueryPlanner,
    passages: PassageConfig,
}

impl Tools {
    pub fn new(app: Arc<Application>) -> Self {
        let planner = QueryPlanner::new(app.service.clone());
        let passages = PassageConfig {
            max_passages: app.config.max_passages,
            max_passage_chars: app.config.max_passage_chars,
            ..Default::default()
        };
        Self {
            app,
            planner,
            passages,
        }
    }

    // ── Search ──────────────────────────────────────────────────────

    pub fn search(&self, request: SearchRequest) -> Result<SearchResponse, ToolError> {
        let params = self.search_params(&request)?;
        let outcome = self.planner.search(&params)?;
        let fields = self.app.service.fields();

        let mut documents = Vec::with_capacity(outcome.hits.len());
        for hit in &outcome.hits {
            let doc = outcome.searcher.doc(hit.address)?;
            let content = first_text(&doc, fields.content).unwrap_or_default();
            let passages = extract_passages(
                &content,
                &outcome.highlight,
                &outcome.query_terms,
                &self.passages,
            );
            documents.push(document_dto(fields, &doc, hit.score, passages));
        }

        let total_pages = outcome.total_hits.div_ceil(outcome.page_size).max(1);
        Ok(SearchResponse {
            total_hits: outcome.total_hits,
            page: outcome.page,
            page_size: outcome.page_size,
            total_pages,
            has_next_page: outcome.page + 1 < total_pages,
            has_previous_page: outcome.page > 0,
            documents,
            facets: outcome.facets,
            active_filters: request.filters,
            search_time_ms: outcome.elapsed_ms,
        })
    }

    pub fn profile_query(
        &self,
        request: ProfileQueryRequest,
    ) -> Result<crate::query::profile::ProfileReport, ToolError> {
        let params = SearchParams {
            query: request.query.clone(),
            filters: request.filters.clone(),
            ..Default::default()
        };
        let options = ProfileOptions {
            analyze_filter_impact: request.analyze_filter_impact,
            analyze_document_scoring: request.analyze_document_scoring,
            analyze_facet_cost: request.analyze_facet_cost,
            max_doc_explanations: if request.max_doc_explanations == 0 {
                5
            } else {
                request.max_doc_explanations
            },
        };
        self.planner.profile(&params, &options)
    }

    fn search_params(&self, request: &SearchRequest) -> Result<SearchParams, ToolError> {
        let sort_by = match &request.sort_by {
            None => SortBy::Score,
            Some(raw) => SortBy::parse(raw)
                .ok_or_else(|| ToolError::Parse(format!("unknown sortBy `{raw}`")))?,
        };
        let sort_order = match &request.sort_order {
            None => SortOrder::Desc,
            Some(raw) => SortOrder::parse(raw)
                .ok_or_else(|| ToolError::Parse(format!("unknown sortOrder `{raw}`")))?,
        };
        Ok(SearchParams {
            query: request.query.clone(),
            filters: request.filters.clone(),
            page: request.page,
            page_size: request.page_size,
            sort_by,
            sort_order,
        })
    }

    // ── Stats and introspection ─────────────────────────────────────

    pub fn get_index_stats(&self) -> Result<IndexStatsResponse, ToolError> {
        let service = &self.app.service;
        Ok(IndexStatsResponse {
            document_count: service.doc_count(),
            index_path: service.index_dir().to_path_buf(),
            schema_version: SCHEMA_VERSION,
            software_version: SOFTWARE_VERSION.to_owned(),
            build_timestamp: BUILD_TIMESTAMP.to_owned(),
            schema_upgrade_required: service.schema_upgrade_required(),
            date_field_hints: service.date_field_hints(),
            lemmatizer_cache_metrics: service.lemmas().metrics(),
            query_runtime_metrics: service.query_stats.snapshot(),
        })
    }

    pub fn list_indexed_fields(&self) -> Result<ListFieldsResponse, ToolError> {
        let fields = self.app.service.fields();
        let mut infos: Vec<FieldInfo> = fields
            .schema
            .fields()
            .map(|(_, entry)| {
                let name = entry.name().to_owned();
                let storage_class = DocFields::field_class(&name)
                    .map(|c| c.describe().to_owned())
                    .unwrap_or_else(|| "internal".to_owned());
                FieldInfo {
                    analyzer: DocFields::analyzer_for(&name).to_owned(),
                    faceted: facet_dimension(&name).is_some(),
                    name,
                    storage_class,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ListFieldsResponse { fields: infos })
    }

    pub fn get_document_details(
        &self,
        request: DocumentDetailsRequest,
    ) -> Result<DocumentDetailsResponse, ToolError> {
        let service = &self.app.service;
        let fields = service.fields();
        let doc = service
            .get_by_path(&request.file_path)?
            .ok_or_else(|| ToolError::NotFound(request.file_path.clone().into()))?;

        let content = first_text(&doc, fields.content).unwrap_or_default();
        let content_truncated = content.chars().count() > MAX_DETAILS_CONTENT_CHARS;
        let content = if content_truncated {
            content.chars().take(MAX_DETAILS_CONTENT_CHARS).collect()
        } else {
            content
        };
        let content_hash = first_text(&doc, fields.content_hash).unwrap_or_default();

        Ok(DocumentDetailsResponse {
            document: document_dto(fields, &doc, 0.0, Vec::new()),
            content,
            content_truncated,
            content_hash,
        })
    }

    // ── Crawler ─────────────────────────────────────────────────────

    pub fn start_crawl(&self, request: StartCrawlRequest) -> Result<MessageResponse, ToolError> {
        match self.app.crawler.start(request.full_reindex) {
            Ok(()) => Ok(MessageResponse {
                message: if request.full_reindex {
                    "full reindex started".into()
                } else {
                    "incremental crawl started".into()
                },
            }),
            Err(CrawlerError::AlreadyRunning) => Err(ToolError::CrawlerActive),
            Err(CrawlerError::Other(err)) => Err(ToolError::Other(err)),
        }
    }

    pub fn pause_crawler(&self) -> Result<MessageResponse, ToolError> {
        if self.app.crawler.pause() {
            Ok(MessageResponse {
                message: "crawler paused".into(),
            })
        } else {
            Err(ToolError::Other(anyhow::anyhow!("crawler is not crawling")))
        }
    }

    pub fn resume_crawler(&self) -> Result<MessageResponse, ToolError> {
        if self.app.crawler.resume() {
            Ok(MessageResponse {
                message: "crawler resumed".into(),
            })
        } else {
            Err(ToolError::Other(anyhow::anyhow!("crawler is not paused")))
        }
    }

    pub fn get_crawler_status(&self) -> Result<crate::crawl::CrawlerStatus, ToolError> {
        Ok(self.app.crawler.status())
    }

    pub fn get_crawler_stats(
        &self,
    ) -> Result<crate::crawl::progress::CrawlStatsSnapshot, ToolError> {
        Ok(self.app.crawler.stats_snapshot())
    }

    pub fn list_crawlable_directories(&self) -> Result<DirectoriesResponse, ToolError> {
        Ok(DirectoriesResponse {
            directories: self.app.state_source.directories(),
            locked: self.app.state_source.directories_locked(),
        })
    }

    pub fn add_crawlable_directory(
        &self,
        request: DirectoryRequest,
    ) -> Result<DirectoriesResponse, ToolError> {
        self.app
            .state_source
            .add_directory(&request.path)
            .map_err(map_state_error)?;
        info!(path = %request.path.display(), "crawl root added");
        if request.crawl_now {
            self.start_crawl(StartCrawlRequest { full_reindex: false })?;
        }
        self.list_crawlable_directories()
    }

    pub fn remove_crawlable_directory(
        &self,
        request: DirectoryRequest,
    ) -> Result<DirectoriesResponse, ToolError> {
        let removed = self
            .app
            .state_source
            .remove_directory(&request.path)
            .map_err(map_state_error)?;
        if !removed {
            return Err(ToolError::NotFound(request.path));
        }
        info!(path = %request.path.display(), "crawl root removed");
        self.list_crawlable_directories()
    }

    // ── Admin ───────────────────────────────────────────────────────

    pub fn optimize_index(
        &self,
        request: OptimizeRequest,
    ) -> Result<OperationStartedResponse, ToolError> {
        if self.app.crawler.is_crawling() {
            return Err(ToolError::CrawlerActive);
        }
        let operation_id = self
            .app
            .admin
            .begin(AdminOp::Optimize {
                max_segments: request.max_segments.max(1),
            })
            .map_err(|err| ToolError::AlreadyRunning(err.0))?;
        Ok(OperationStartedResponse { operation_id })
    }

    pub fn purge_index(&self, request: PurgeRequest) -> Result<OperationStartedResponse, ToolError> {
        if !request.confirm {
            return Err(ToolError::NotConfirmed);
        }
        let operation_id = self
            .app
            .admin
            .begin(AdminOp::Purge {
                full: request.full_purge,
            })
            .map_err(|err| ToolError::AlreadyRunning(err.0))?;
        Ok(OperationStartedResponse { operation_id })
    }

    pub fn unlock_index(
        &self,
        request: ConfirmRequest,
    ) -> Result<OperationStartedResponse, ToolError> {
        if !request.confirm {
            return Err(ToolError::NotConfirmed);
        }
        let operation_id = self
            .app
            .admin
            .begin(AdminOp::Unlock)
            .map_err(|err| ToolError::AlreadyRunning(err.0))?;
        Ok(OperationStartedResponse { operation_id })
    }

    pub fn get_index_admin_status(&self) -> Result<AdminStatus, ToolError> {
        Ok(self.app.admin.status())
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Entry point for the transport: tool name plus raw JSON args in,
    /// envelope out. Never panics across this boundary.
    pub fn dispatch(&self, tool: &str, args: serde_json::Value) -> serde_json::Value {
        match tool {
            "search" => call(args, |r| self.search(r)),
            "profileQuery" => call(args, |r| self.profile_query(r)),
            "getIndexStats" => envelope(self.get_index_stats()),
            "listIndexedFields" => envelope(self.list_indexed_fields()),
            "getDocumentDetails" => call(args, |r| self.get_document_details(r)),
            "startCrawl" => call(args, |r| self.start_crawl(r)),
            "pauseCrawler" => envelope(self.pause_crawler()),
            "resumeCrawler" => envelope(self.resume_crawler()),
            "getCrawlerStatus" => envelope(self.get_crawler_status()),
            "getCrawlerStats" => envelope(self.get_crawler_stats()),
            "listCrawlableDirectories" => envelope(self.list_crawlable_directories()),
            "addCrawlableDirectory" => call(args, |r| self.add_crawlable_directory(r)),
            "removeCrawlableDirectory" => call(args, |r| self.remove_crawlable_directory(r)),
            "optimizeIndex" => call(args, |r| self.optimize_index(r)),
            "purgeIndex" => call(args, |r| self.purge_index(r)),
            "unlockIndex" => call(args, |r| self.unlock_index(r)),
            "getIndexAdminStatus" => envelope(self.get_index_admin_status()),
            other => envelope::<MessageResponse>(Err(ToolError::Other(anyhow::anyhow!(
                "unknown tool `{other}`"
            )))),
        }
    }
}

fn call<Req, Res>(
    args: serde_json::Value,
    handler: impl FnOnce(Req) -> Result<Res, ToolError>,
) -> serde_json::Value
where
    Req: DeserializeOwned,
    Res: Serialize,
{
    match serde_json::from_value::<Req>(args) {
        Ok(request) => envelope(handler(request)),
        Err(err) => envelope::<Res>(Err(ToolError::Parse(format!("bad request: {err}")))),
    }
}

fn map_state_error(err: StateError) -> ToolError {
    match err {
        StateError::Locked => ToolError::DirectoriesLocked,
        other => ToolError::Other(other.into()),
    }
}

fn first_text(doc: &Document, field: Field) -> Option<String> {
    doc.get_first(field).and_then(Value::as_text).map(str::to_owned)
}

fn all_text(doc: &Document, field: Field) -> Vec<String> {
    doc.get_all(field)
        .filter_map(Value::as_text)
        .map(str::to_owned)
        .collect()
}

fn first_i64(doc: &Document, field: Field) -> i64 {
    doc.get_first(field).and_then(Value::as_i64).unwrap_or(0)
}

fn document_dto(
    fields: &DocFields,
    doc: &Document,
    score: f32,
    passages: Vec<crate::query::highlight::Passage>,
) -> SearchDocument {
    SearchDocument {
        file_path: first_text(doc, fields.file_path).unwrap_or_default(),
        file_name: first_text(doc, fields.file_name).unwrap_or_default(),
        file_extension: first_text(doc, fields.file_extension).unwrap_or_default(),
        file_type: first_text(doc, fields.file_type).unwrap_or_default(),
        file_size: doc
            .get_first(fields.file_size)
            .and_then(Value::as_u64)
            .unwrap_or(0),
        title: first_text(doc, fields.title),
        author: all_text(doc, fields.author),
        creator: all_text(doc, fields.creator),
        subject: all_text(doc, fields.subject),
        keywords: first_text(doc, fields.keywords),
        language: first_text(doc, fields.language),
        created_date: first_i64(doc, fields.created_date),
        modified_date: first_i64(doc, fields.modified_date),
        indexed_date: first_i64(doc, fields.indexed_date),
        score,
        passages,
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::application::config::configuration::Configuration;
    use crate::indexes::builder::content_hash as compute_content_hash;

    use super::*;

    fn tools(dir: &std::path::Path) -> (Tools, std::path::PathBuf) {
        let docs_dir = dir.join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        let mut config = Configuration::parse_from(["mcplucene"]);
        config.index_dir = dir.join("index");
        config.config_file = dir.join("config.yaml");
        config.batch_timeout_ms = 100;
        let app = Application::initialize(config).unwrap();
        app.state_source.add_directory(&docs_dir).unwrap();
        (Tools::new(app), docs_dir)
    }

    fn crawl_and_wait(tools: &Tools) {
        tools
            .start_crawl(StartCrawlRequest { full_reindex: false })
            .unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(30);
        while tools.app.crawler.is_crawling() {
            assert!(std::time::Instant::now() < deadline, "crawl did not finish");
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        tools.app.service.refresh();
    }

    #[test]
    fn search_tool_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (tools, docs) = tools(dir.path());
        std::fs::write(docs.join("contract.txt"), "The signed contract is attached.").unwrap();
        std::fs::write(docs.join("other.txt"), "nothing to see here").unwrap();
        crawl_and_wait(&tools);

        let response = tools
            .search(SearchRequest {
                query: Some("contract".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.total_hits, 1);
        assert_eq!(response.documents.len(), 1);
        let doc = &response.documents[0];
        assert!(doc.file_path.ends_with("contract.txt"));
        assert_eq!(doc.language.as_deref(), Some("en"));
        assert!(doc.passages[0].text.contains("<em>contract</em>"));
        assert_eq!(response.total_pages, 1);
        assert!(!response.has_next_page);
    }

    #[test]
    fn dispatch_wraps_payload_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (tools, _docs) = tools(dir.path());

        let ok = tools.dispatch("getIndexStats", serde_json::json!({}));
        assert_eq!(ok["success"], true);
        assert_eq!(ok["schemaVersion"], SCHEMA_VERSION);

        let err = tools.dispatch("search", serde_json::json!({ "query": "(broken" }));
        assert_eq!(err["success"], false);
        assert_eq!(err["errorKind"], "parse_error");

        let unknown = tools.dispatch("noSuchTool", serde_json::json!({}));
        assert_eq!(unknown["success"], false);
    }

    #[test]
    fn document_details_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (tools, docs) = tools(dir.path());
        let file = docs.join("note.txt");
        std::fs::write(&file, "short note body").unwrap();
        crawl_and_wait(&tools);

        let details = tools
            .get_document_details(DocumentDetailsRequest {
                file_path: file.to_string_lossy().into_owned(),
            })
            .unwrap();
        assert_eq!(details.content, "short note body");
        assert!(!details.content_truncated);
        assert_eq!(details.content_hash, compute_content_hash("short note body"));

        let missing = tools.get_document_details(DocumentDetailsRequest {
            file_path: "/absent.txt".into(),
        });
        assert!(matches!(missing.unwrap_err(), ToolError::NotFound(_)));
    }

    #[test]
    fn purge_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let (tools, _docs) = tools(dir.path());
        let denied = tools.purge_index(PurgeRequest {
            confirm: false,
            full_purge: false,
        });
        assert!(matches!(denied.unwrap_err(), ToolError::NotConfirmed));
    }

    #[test]
    fn logical_purge_empties_but_keeps_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (tools, docs) = tools(dir.path());
        std::fs::write(docs.join("a.txt"), "some document").unwrap();
        crawl_and_wait(&tools);
        assert_eq!(tools.get_index_stats().unwrap().document_count, 1);

        tools
            .purge_index(PurgeRequest {
                confirm: true,
                full_purge: false,
            })
            .unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while tools.get_index_stats().unwrap().document_count > 0 {
            assert!(std::time::Instant::now() < deadline, "purge never finished");
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(dir.path().join("index").join("meta.json").exists());
    }

    #[test]
    fn directory_tools_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (tools, _docs) = tools(dir.path());
        let before = tools.list_crawlable_directories().unwrap().directories;

        let extra = dir.path().join("extra");
        std::fs::create_dir_all(&extra).unwrap();
        let added = tools
            .add_crawlable_directory(DirectoryRequest {
                path: extra.clone(),
                crawl_now: false,
            })
            .unwrap();
        assert!(added.directories.contains(&extra));

        let removed = tools
            .remove_crawlable_directory(DirectoryRequest {
                path: extra,
                crawl_now: false,
            })
            .unwrap();
        assert_eq!(removed.directories, before);
    }

    #[test]
    fn list_indexed_fields_reports_storage_classes() {
        let dir = tempfile::tempdir().unwrap();
        let (tools, _docs) = tools(dir.path());
        let fields = tools.list_indexed_fields().unwrap().fields;
        let content = fields.iter().find(|f| f.name == "content").unwrap();
        assert_eq!(content.storage_class, "analyzed text");
        let language = fields.iter().find(|f| f.name == "language").unwrap();
        assert!(language.faceted);
        assert!(fields.iter().any(|f| f.name == "content_reversed"));
    }
}
