use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tantivy::collector::{Count, FacetCollector};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, TermQuery};
use tantivy::schema::{Document, IndexRecordOption, Value};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Term};
use tracing::{debug, error, info, warn};

use crate::analysis;
use crate::analysis::lemma::LemmaEngines;
use crate::stats::{LanguageDistribution, LanguageDistributionCache, QueryRuntimeStats};

use super::builder::{DocumentBuilder, ExtractedDocument};
use super::schema::{DocFields, SCHEMA_VERSION};

pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-data stamped into every commit. A missing or differing schema
/// version on open marks the index as requiring a full reindex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitMetadata {
    pub schema_version: u32,
    pub software_version: String,
}

impl CommitMetadata {
    fn current() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            software_version: SOFTWARE_VERSION.to_string(),
        }
    }
}

/// The open index: directory handle, writer, reader. Replaced wholesale
/// by a full purge, hence the enclosing `RwLock` in the service.
struct Core {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
}

/// Min/max observed value of a date field, for client-side range hints.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateFieldHint {
    pub min_date: i64,
    pub max_date: i64,
}

/// Owns the on-disk index, the single writer, and the NRT reader. All
/// document mutations funnel through here; reads clone the reader's
/// current searcher and release it by dropping it.
pub struct IndexService {
    index_dir: PathBuf,
    fields: DocFields,
    builder: DocumentBuilder,
    // `None` only transiently while a full purge swaps the core out
    core: RwLock<Option<Core>>,
    schema_upgrade_required: AtomicBool,
    refresh_interval_ms: AtomicU64,
    base_refresh_interval_ms: u64,
    slow_refresh_interval_ms: u64,
    pub language_distribution: LanguageDistributionCache,
    pub query_stats: QueryRuntimeStats,
    lemmas: Arc<LemmaEngines>,
    writer_threads: usize,
    writer_buffer_bytes: usize,
}

impl IndexService {
    pub fn open(
        index_dir: &Path,
        lemmas: Arc<LemmaEngines>,
        writer_threads: usize,
        writer_buffer_bytes: usize,
        base_refresh_interval_ms: u64,
        slow_refresh_interval_ms: u64,
    ) -> Result<Arc<Self>> {
        std::fs::create_dir_all(index_dir).context("failed to create index dir")?;
        let fields = DocFields::new();

        let (index, mut upgrade_required) = open_or_recreate(index_dir, &fields)?;

        // capture the committed user-data before stamping our own
        match read_committed_metadata(&index) {
            Some(meta) if meta.schema_version == SCHEMA_VERSION => {}
            Some(meta) => {
                info!(
                    stored = meta.schema_version,
                    current = SCHEMA_VERSION,
                    "schema version mismatch, full reindex required"
                );
                upgrade_required = true;
            }
            None => {
                debug!("no committed user-data, treating index as new");
                upgrade_required = true;
            }
        }

        let core = open_core(index, writer_threads, writer_buffer_bytes)?;
        let lemmas_for_builder = lemmas.clone();
        let service = Arc::new(Self {
            index_dir: index_dir.to_owned(),
            builder: DocumentBuilder::new(fields.clone(), lemmas_for_builder),
            fields,
            core: RwLock::new(Some(core)),
            schema_upgrade_required: AtomicBool::new(upgrade_required),
            refresh_interval_ms: AtomicU64::new(base_refresh_interval_ms),
            base_refresh_interval_ms,
            slow_refresh_interval_ms,
            language_distribution: LanguageDistributionCache::default(),
            query_stats: QueryRuntimeStats::default(),
            lemmas,
            writer_threads,
            writer_buffer_bytes,
        });

        // initial commit writes the current user-data
        service.commit()?;
        service.refresh();
        Ok(service)
    }

    pub fn fields(&self) -> &DocFields {
        &self.fields
    }

    pub fn lemmas(&self) -> &LemmaEngines {
        &self.lemmas
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn schema_upgrade_required(&self) -> bool {
        self.schema_upgrade_required.load(Ordering::SeqCst)
    }

    pub fn clear_schema_upgrade_flag(&self) {
        self.schema_upgrade_required.store(false, Ordering::SeqCst);
    }

    fn with_core<R>(&self, f: impl FnOnce(&Core) -> R) -> R {
        let guard = self.core.read().unwrap();
        let core = guard.as_ref().expect("index core is open");
        f(core)
    }

    /// A searcher over the latest refreshed view. Dropping it releases it
    /// on every exit path.
    pub fn searcher(&self) -> tantivy::Searcher {
        self.with_core(|core| core.reader.searcher())
    }

    pub fn doc_count(&self) -> u64 {
        self.searcher().num_docs()
    }

    /// Runs `f` with the writer locked. The single lock is what
    /// serializes all document mutations.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut IndexWriter) -> Result<R>) -> Result<R> {
        self.with_core(|core| {
            let mut writer = core.writer.lock().unwrap();
            f(&mut writer)
        })
    }

    /// Delete-by-path then add: the atomic upsert unit. No commit here,
    /// batching decides when to commit.
    pub fn add_or_update(&self, record: &ExtractedDocument) -> Result<()> {
        let doc = self.builder.build(record);
        let path_term = Term::from_field_text(
            self.fields.file_path,
            &record.file_path.to_string_lossy(),
        );
        self.with_writer(|writer| {
            writer.delete_term(path_term.clone());
            writer.add_document(doc)?;
            Ok(())
        })
    }

    /// Applies the reconciliation DELETE set in one commit.
    pub fn delete_paths(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.with_writer(|writer| {
            for path in paths {
                writer.delete_term(Term::from_field_text(self.fields.file_path, path));
            }
            Ok(())
        })?;
        self.commit()
    }

    pub fn delete_all(&self) -> Result<()> {
        self.with_writer(|writer| {
            writer.delete_all_documents()?;
            Ok(())
        })?;
        self.commit()
    }

    /// Commits with the current user-data payload. Every commit carries
    /// `{schema_version, software_version}`.
    pub fn commit(&self) -> Result<()> {
        let payload = serde_json::to_string(&CommitMetadata::current())?;
        self.with_writer(|writer| {
            let mut prepared = writer.prepare_commit()?;
            prepared.set_payload(&payload);
            prepared.commit()?;
            Ok(())
        })
    }

    /// Non-blocking NRT refresh. I/O failures keep the prior searcher and
    /// are only logged; the hot search path is unaffected.
    pub fn refresh(&self) {
        let searcher = self.with_core(|core| {
            if let Err(err) = core.reader.reload() {
                warn!(error = %err, "NRT refresh failed, keeping previous searcher");
                return None;
            }
            Some(core.reader.searcher())
        });
        let Some(searcher) = searcher else {
            return;
        };
        match language_distribution(&searcher, &self.fields) {
            Ok(dist) => self.language_distribution.replace(dist),
            Err(err) => warn!(error = %err, "language distribution refresh failed"),
        }
    }

    /// Merge down to at most `max_segments` segments, then commit.
    pub fn force_merge(&self, max_segments: usize) -> Result<()> {
        let merged = self.with_core(|core| -> Result<bool> {
            let segment_ids = core.index.searchable_segment_ids()?;
            if segment_ids.len() <= max_segments.max(1) {
                debug!(segments = segment_ids.len(), "no merge needed");
                return Ok(false);
            }
            let mut writer = core.writer.lock().unwrap();
            writer.merge(&segment_ids).wait()?;
            Ok(true)
        })?;
        if merged {
            self.commit()?;
            self.refresh();
        }
        Ok(())
    }

    /// Full purge: tear down the open index, delete every file in the
    /// directory, reopen empty and commit fresh metadata.
    pub fn recreate(&self) -> Result<()> {
        {
            let mut slot = self.core.write().unwrap();
            if let Some(old) = slot.take() {
                let mut writer = old.writer.into_inner().unwrap();
                writer.commit().ok();
                // writer lock and mmaps must be gone before the unlink
                drop(writer);
                drop(old.reader);
                drop(old.index);
            }
            *slot = Some(open_empty_core(
                &self.index_dir,
                &self.fields,
                self.writer_threads,
                self.writer_buffer_bytes,
            )?);
        }
        self.commit()?;
        self.refresh();
        Ok(())
    }

    /// `{file_path → modified_date}` over every live document. The
    /// crawler's reconciliation snapshot.
    pub fn index_snapshot(&self) -> Result<HashMap<String, i64>> {
        let searcher = self.searcher();
        let mut snapshot = HashMap::with_capacity(searcher.num_docs() as usize);
        for segment in searcher.segment_readers() {
            let store = segment.get_store_reader(1)?;
            for doc_id in segment.doc_ids_alive() {
                let doc = store.get(doc_id)?;
                let Some(path) = doc
                    .get_first(self.fields.file_path)
                    .and_then(Value::as_text)
                else {
                    continue;
                };
                let modified = doc
                    .get_first(self.fields.modified_date)
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                snapshot.insert(path.to_owned(), modified);
            }
        }
        Ok(snapshot)
    }

    /// Stored content hash for one path, if the document exists.
    pub fn stored_content_hash(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .get_by_path(path)?
            .and_then(|doc| {
                doc.get_first(self.fields.content_hash)
                    .and_then(Value::as_text)
                    .map(str::to_owned)
            }))
    }

    pub fn get_by_path(&self, path: &str) -> Result<Option<Document>> {
        let searcher = self.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.file_path, path),
            IndexRecordOption::Basic,
        );
        let top = searcher.search(&query, &tantivy::collector::TopDocs::with_limit(1))?;
        match top.first() {
            Some((_, address)) => Ok(Some(searcher.doc(*address)?)),
            None => Ok(None),
        }
    }

    pub fn date_field_hints(&self) -> BTreeMap<String, DateFieldHint> {
        let searcher = self.searcher();
        let mut hints = BTreeMap::new();
        for name in DocFields::date_field_names() {
            let mut min: Option<i64> = None;
            let mut max: Option<i64> = None;
            for segment in searcher.segment_readers() {
                if segment.num_docs() == 0 {
                    continue;
                }
                let Ok(column) = segment.fast_fields().i64(name) else {
                    continue;
                };
                min = Some(min.map_or(column.min_value(), |m| m.min(column.min_value())));
                max = Some(max.map_or(column.max_value(), |m| m.max(column.max_value())));
            }
            if let (Some(min_date), Some(max_date)) = (min, max) {
                hints.insert((*name).to_owned(), DateFieldHint { min_date, max_date });
            }
        }
        hints
    }

    /// Crawler bulk-mode toggle for the adaptive refresh interval.
    pub fn set_bulk_indexing(&self, bulk: bool) {
        let interval = if bulk {
            self.slow_refresh_interval_ms
        } else {
            self.base_refresh_interval_ms
        };
        self.refresh_interval_ms.store(interval, Ordering::Relaxed);
    }

    pub fn refresh_interval_ms(&self) -> u64 {
        self.refresh_interval_ms.load(Ordering::Relaxed)
    }

    pub fn writer_lock_path(&self) -> PathBuf {
        self.index_dir
            .join(&*tantivy::directory::INDEX_WRITER_LOCK.filepath)
    }

    /// Commits outstanding work and tears down writer, reader and
    /// directory handle, in that order. Called once on shutdown, after
    /// the refresh scheduler has stopped.
    pub fn close(&self) -> Result<()> {
        self.commit()?;
        let mut slot = self.core.write().unwrap();
        if let Some(old) = slot.take() {
            let writer = old.writer.into_inner().unwrap();
            drop(writer);
            drop(old.reader);
            drop(old.index);
        }
        Ok(())
    }
}

fn open_or_recreate(index_dir: &Path, fields: &DocFields) -> Result<(Index, bool)> {
    match try_open(index_dir, fields) {
        Ok(index) => Ok((index, false)),
        Err(err) => {
            // tantivy refuses to open an index whose schema shape moved;
            // that is exactly the full-reindex case
            warn!(error = %err, "index unreadable with current schema, recreating");
            wipe_index_dir(index_dir)?;
            let index = try_open(index_dir, fields)?;
            Ok((index, true))
        }
    }
}

fn try_open(index_dir: &Path, fields: &DocFields) -> Result<Index> {
    let directory = MmapDirectory::open(index_dir)?;
    let index = Index::open_or_create(directory, fields.schema.clone())?;
    analysis::register_analyzers(&index);
    Ok(index)
}

pub fn wipe_index_dir(index_dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(index_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn open_core(index: Index, threads: usize, buffer_bytes: usize) -> Result<Core> {
    let writer = index.writer_with_num_threads(threads, buffer_bytes)?;
    let reader = index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()?;
    Ok(Core {
        index,
        writer: Mutex::new(writer),
        reader,
    })
}

fn open_empty_core(
    index_dir: &Path,
    fields: &DocFields,
    threads: usize,
    buffer_bytes: usize,
) -> Result<Core> {
    wipe_index_dir(index_dir)?;
    let index = try_open(index_dir, fields)?;
    open_core(index, threads, buffer_bytes)
}

fn read_committed_metadata(index: &Index) -> Option<CommitMetadata> {
    let metas = index.load_metas().ok()?;
    let payload = metas.payload?;
    serde_json::from_str(&payload).ok()
}

fn language_distribution(
    searcher: &tantivy::Searcher,
    fields: &DocFields,
) -> Result<LanguageDistribution> {
    let mut collector = FacetCollector::for_field("facet");
    collector.add_facet("/language");
    let (counts, total) = searcher.search(&AllQuery, &(collector, Count))?;
    let mut per_language = BTreeMap::new();
    for (facet, count) in counts.get("/language") {
        let path = facet.to_string();
        if let Some(code) = path.rsplit('/').next() {
            per_language.insert(code.to_owned(), count);
        }
    }
    Ok(LanguageDistribution::new(per_language, total as u64))
}

/// Daemon thread invoking [`IndexService::refresh`] on the service's
/// current interval. The interval is re-read every tick so the crawler's
/// bulk-mode switch takes effect without a restart.
pub struct NrtRefresher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl NrtRefresher {
    const POLL_SLICE: Duration = Duration::from_millis(200);

    pub fn start(service: Arc<IndexService>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name("nrt-refresh".into())
            .spawn(move || {
                let mut elapsed = Duration::ZERO;
                loop {
                    std::thread::sleep(Self::POLL_SLICE);
                    if flag.load(Ordering::Relaxed) {
                        break;
                    }
                    elapsed += Self::POLL_SLICE;
                    let interval = Duration::from_millis(service.refresh_interval_ms());
                    if elapsed >= interval {
                        elapsed = Duration::ZERO;
                        service.refresh();
                    }
                }
                debug!("nrt refresher stopped");
            })
            .expect("failed to spawn nrt refresher");
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("nrt refresher panicked");
            }
        }
    }
}

impl Drop for NrtRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::indexes::builder::DocumentMetadata;

    use super::*;

    fn record(path: &str, text: &str, language: &str, modified: i64) -> ExtractedDocument {
        ExtractedDocument {
            file_path: PathBuf::from(path),
            file_size: text.len() as u64,
            created_date: modified - 1000,
            modified_date: modified,
            mime_type: "text/plain".into(),
            metadata: DocumentMetadata::default(),
            raw_text: text.into(),
            language: Some(language.into()),
        }
    }

    fn open_service(dir: &Path) -> Arc<IndexService> {
        IndexService::open(dir, Arc::new(LemmaEngines::new(1024)), 1, 15_000_000, 1000, 5000)
            .unwrap()
    }

    #[test]
    fn open_commits_current_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(dir.path());
        let meta = service
            .with_core(|core| read_committed_metadata(&core.index))
            .unwrap();
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert_eq!(meta.software_version, SOFTWARE_VERSION);
    }

    #[test]
    fn fresh_index_requires_reindex_reopen_does_not() {
        let dir = tempfile::tempdir().unwrap();
        {
            let service = open_service(dir.path());
            assert!(service.schema_upgrade_required());
            service.close().unwrap();
        }
        let service = open_service(dir.path());
        assert!(!service.schema_upgrade_required());
    }

    #[test]
    fn upsert_replaces_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(dir.path());
        service
            .add_or_update(&record("/a.txt", "first version", "en", 1000))
            .unwrap();
        service.commit().unwrap();
        service
            .add_or_update(&record("/a.txt", "second version", "en", 2000))
            .unwrap();
        service.commit().unwrap();
        service.refresh();
        assert_eq!(service.doc_count(), 1);
        let snapshot = service.index_snapshot().unwrap();
        assert_eq!(snapshot.get("/a.txt"), Some(&2000));
    }

    #[test]
    fn delete_paths_removes_documents() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(dir.path());
        service
            .add_or_update(&record("/a.txt", "one", "en", 1000))
            .unwrap();
        service
            .add_or_update(&record("/b.txt", "two", "en", 1000))
            .unwrap();
        service.commit().unwrap();
        service.delete_paths(&["/a.txt".to_owned()]).unwrap();
        service.refresh();
        assert_eq!(service.doc_count(), 1);
        assert!(service.get_by_path("/a.txt").unwrap().is_none());
        assert!(service.get_by_path("/b.txt").unwrap().is_some());
    }

    #[test]
    fn refresh_rebuilds_language_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(dir.path());
        service
            .add_or_update(&record("/a.txt", "hello", "en", 1000))
            .unwrap();
        service
            .add_or_update(&record("/b.txt", "hallo", "de", 1000))
            .unwrap();
        service
            .add_or_update(&record("/c.txt", "hey", "en", 1000))
            .unwrap();
        service.commit().unwrap();
        service.refresh();
        let dist = service.language_distribution.get();
        assert_eq!(dist.total_docs, 3);
        assert_eq!(dist.per_language.get("en"), Some(&2));
        assert_eq!(dist.per_language.get("de"), Some(&1));
    }

    #[test]
    fn recreate_empties_the_index_and_recommits_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(dir.path());
        service
            .add_or_update(&record("/a.txt", "hello", "en", 1000))
            .unwrap();
        service.commit().unwrap();
        service.recreate().unwrap();
        assert_eq!(service.doc_count(), 0);
        let meta = service
            .with_core(|core| read_committed_metadata(&core.index))
            .unwrap();
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn bulk_mode_switches_the_refresh_interval() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(dir.path());
        assert_eq!(service.refresh_interval_ms(), 1000);
        service.set_bulk_indexing(true);
        assert_eq!(service.refresh_interval_ms(), 5000);
        service.set_bulk_indexing(false);
        assert_eq!(service.refresh_interval_ms(), 1000);
    }

    #[test]
    fn date_hints_track_min_and_max() {
        let dir = tempfile::tempdir().unwrap();
        let service = open_service(dir.path());
        service
            .add_or_update(&record("/a.txt", "one", "en", 5000))
            .unwrap();
        service
            .add_or_update(&record("/b.txt", "two", "en", 9000))
            .unwrap();
        service.commit().unwrap();
        service.refresh();
        let hints = service.date_field_hints();
        let modified = hints.get("modified_date").unwrap();
        assert_eq!(modified.min_date, 5000);
        assert_eq!(modified.max_date, 9000);
    }
}
