//! End-to-end scenarios through the tool surface: crawl real files from
//! a temp directory, then search, filter, sort and purge.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use mcplucene::application::application::Application;
use mcplucene::application::config::configuration::Configuration;
use mcplucene::query::filter::Filter;
use mcplucene::tools::types::*;
use mcplucene::tools::Tools;

struct Fixture {
    app: Arc<Application>,
    tools: Tools,
    docs: PathBuf,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();

    let mut config = Configuration::parse_from(["mcplucene"]);
    config.index_dir = dir.path().join("index");
    config.config_file = dir.path().join("config.yaml");
    config.batch_timeout_ms = 100;
    config.include_globs = vec!["*.txt".into(), "*.md".into()];

    let app = Application::initialize(config).unwrap();
    app.state_source.add_directory(&docs).unwrap();
    let tools = Tools::new(app.clone());
    Fixture {
        app,
        tools,
        docs,
        _dir: dir,
    }
}

fn write(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
}

fn crawl(fixture: &Fixture, full: bool) {
    fixture
        .tools
        .start_crawl(StartCrawlRequest { full_reindex: full })
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(30);
    while fixture.app.crawler.is_crawling() {
        assert!(Instant::now() < deadline, "crawl did not finish in time");
        std::thread::sleep(Duration::from_millis(20));
    }
    fixture.app.service.refresh();
}

fn seeded() -> Fixture {
    let fixture = fixture();
    write(
        &fixture.docs.join("a.txt"),
        "The signed contract is attached.",
    );
    std::thread::sleep(Duration::from_millis(30));
    write(
        &fixture.docs.join("b.txt"),
        "Der Arbeitsvertrag wurde unterschrieben.",
    );
    write(&fixture.docs.join("c.md"), "running shoes review");
    crawl(&fixture, false);
    fixture
}

fn search(fixture: &Fixture, request: SearchRequest) -> SearchResponse {
    fixture.tools.search(request).unwrap()
}

fn file_names(response: &SearchResponse) -> Vec<String> {
    response
        .documents
        .iter()
        .map(|d| d.file_name.clone())
        .collect()
}

#[test]
fn plain_term_search_highlights_the_surface_form() {
    let fixture = seeded();
    let response = search(
        &fixture,
        SearchRequest {
            query: Some("contract".into()),
            ..Default::default()
        },
    );
    assert_eq!(file_names(&response), vec!["a.txt"]);
    assert_eq!(response.total_hits, 1);
    let passage = &response.documents[0].passages[0];
    assert!(passage.text.contains("<em>contract</em>"), "{}", passage.text);
    assert_eq!(passage.matched_terms, vec!["contract"]);
}

#[test]
fn leading_wildcard_finds_the_german_compound() {
    let fixture = seeded();
    let response = search(
        &fixture,
        SearchRequest {
            query: Some("*vertrag".into()),
            ..Default::default()
        },
    );
    assert_eq!(file_names(&response), vec!["b.txt"]);
    let passage = &response.documents[0].passages[0];
    assert!(
        passage.text.contains("<em>Arbeitsvertrag</em>"),
        "passage must wrap the original surface: {}",
        passage.text
    );
}

#[test]
fn stemmed_expansion_reaches_inflected_content() {
    let fixture = seeded();
    let response = search(
        &fixture,
        SearchRequest {
            query: Some("run".into()),
            ..Default::default()
        },
    );
    assert_eq!(file_names(&response), vec!["c.md"]);
    // lemma-only hit: the fallback passage carries the document text
    let passage = &response.documents[0].passages[0];
    assert!(passage.text.contains("running shoes review"));
}

#[test]
fn language_filter_yields_no_cross_language_hits() {
    let fixture = seeded();
    let response = search(
        &fixture,
        SearchRequest {
            query: Some("contract".into()),
            filters: vec![Filter::eq("language", "de")],
            ..Default::default()
        },
    );
    assert_eq!(response.total_hits, 0);
    assert!(response.documents.is_empty());
}

#[test]
fn match_all_with_extension_filter_sorts_by_modified_date() {
    let fixture = seeded();
    let response = search(
        &fixture,
        SearchRequest {
            query: Some("*".into()),
            filters: vec![Filter::is_in("file_extension", vec!["txt".into()])],
            sort_by: Some("modified_date".into()),
            sort_order: Some("desc".into()),
            ..Default::default()
        },
    );
    assert_eq!(file_names(&response), vec!["b.txt", "a.txt"]);
    let docs = &response.documents;
    assert!(docs[0].modified_date >= docs[1].modified_date);
}

#[test]
fn facet_counts_accompany_every_search() {
    let fixture = seeded();
    let response = search(
        &fixture,
        SearchRequest {
            query: Some("*".into()),
            ..Default::default()
        },
    );
    let extensions = response.facets.get("file_extension").unwrap();
    let txt = extensions.iter().find(|f| f.value == "txt").unwrap();
    assert_eq!(txt.count, 2);
    let total: u64 = extensions.iter().map(|f| f.count).sum();
    assert!(total <= response.total_hits as u64);
}

#[test]
fn reindex_without_changes_indexes_nothing() {
    let fixture = seeded();
    assert_eq!(fixture.app.crawler.stats_snapshot().files_indexed, 3);
    crawl(&fixture, false);
    let stats = fixture.tools.get_crawler_stats().unwrap();
    assert_eq!(stats.files_indexed, 0);
    assert_eq!(fixture.tools.get_index_stats().unwrap().document_count, 3);
}

#[test]
fn upsert_keeps_file_paths_unique() {
    let fixture = seeded();
    std::thread::sleep(Duration::from_millis(30));
    write(
        &fixture.docs.join("a.txt"),
        "The signed contract is attached. Now amended.",
    );
    crawl(&fixture, false);

    let response = search(
        &fixture,
        SearchRequest {
            query: Some("contract".into()),
            ..Default::default()
        },
    );
    assert_eq!(response.total_hits, 1);
    let details = fixture
        .tools
        .get_document_details(DocumentDetailsRequest {
            file_path: fixture.docs.join("a.txt").to_string_lossy().into_owned(),
        })
        .unwrap();
    assert!(details.content.contains("Now amended"));
}

#[test]
fn logical_purge_then_recrawl_restores_the_document_set() {
    let fixture = seeded();
    assert_eq!(fixture.tools.get_index_stats().unwrap().document_count, 3);

    fixture
        .tools
        .purge_index(PurgeRequest {
            confirm: true,
            full_purge: false,
        })
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while fixture.tools.get_index_stats().unwrap().document_count > 0 {
        assert!(Instant::now() < deadline, "purge never completed");
        std::thread::sleep(Duration::from_millis(20));
    }

    crawl(&fixture, false);
    assert_eq!(fixture.tools.get_index_stats().unwrap().document_count, 3);
}

#[test]
fn full_purge_recreates_the_index_directory() {
    let fixture = seeded();
    fixture
        .tools
        .purge_index(PurgeRequest {
            confirm: true,
            full_purge: true,
        })
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while fixture.tools.get_index_stats().unwrap().document_count > 0 {
        assert!(Instant::now() < deadline, "full purge never completed");
        std::thread::sleep(Duration::from_millis(20));
    }
    // the directory survives with fresh metadata
    assert!(fixture.app.config.index_dir.join("meta.json").exists());

    crawl(&fixture, false);
    assert_eq!(fixture.tools.get_index_stats().unwrap().document_count, 3);
}

#[test]
fn index_stats_report_versions_and_metrics() {
    let fixture = seeded();
    search(
        &fixture,
        SearchRequest {
            query: Some("contract".into()),
            ..Default::default()
        },
    );
    let stats = fixture.tools.get_index_stats().unwrap();
    assert_eq!(stats.document_count, 3);
    assert!(stats.query_runtime_metrics.total_queries >= 1);
    assert!(stats.date_field_hints.contains_key("modified_date"));
    assert!(stats.lemmatizer_cache_metrics.contains_key("en.index"));
    assert!(!stats.schema_upgrade_required);
}

#[test]
fn profile_query_explains_the_plan() {
    let fixture = seeded();
    let report = fixture
        .tools
        .profile_query(ProfileQueryRequest {
            query: Some("*vertrag".into()),
            filters: vec![Filter::eq("language", "de")],
            analyze_filter_impact: true,
            analyze_document_scoring: true,
            analyze_facet_cost: true,
            max_doc_explanations: 3,
        })
        .unwrap();
    assert_eq!(report.parsed_query, "*vertrag");
    assert_eq!(report.total_hits, 1);
    assert!(!report.planned_main_query.is_empty());
    assert_eq!(report.filters[0].classification, "positive-facet");
    assert_eq!(report.filters[0].matching_docs, Some(1));
    assert_eq!(report.single_language_shortcut.as_deref(), Some("de"));
}
