//! The crawler: directory discovery, reconciliation against the index,
//! batched parallel ingestion, and near-real-time watch mode.

pub mod extract;
pub mod progress;
pub mod reconcile;
pub mod walker;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::application::config::state::{CrawlMode, LastCrawl, StateSource};
use crate::indexes::builder::{content_hash, ExtractedDocument};
use crate::indexes::service::IndexService;

use extract::ContentExtractor;
use progress::{CrawlStats, CrawlStatsSnapshot, ProgressNotifier};
use reconcile::{reconcile, ReconcilePlan};
use walker::DirectoryWalker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlerState {
    Idle,
    Crawling,
    Paused,
    Watching,
}

#[derive(thiserror::Error, Debug)]
pub enum CrawlerError {
    #[error("a crawl is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Crawl tuning knobs; defaults follow the shipped configuration.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
    pub thread_pool_size: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub bulk_index_threshold: usize,
    pub progress_notification_files: u64,
    pub progress_notification_interval_ms: u64,
    pub watch: bool,
    pub watch_debounce_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            include_globs: vec![
                "*.txt".into(),
                "*.md".into(),
                "*.markdown".into(),
                "*.html".into(),
                "*.htm".into(),
                "*.xml".into(),
                "*.json".into(),
                "*.yaml".into(),
                "*.yml".into(),
                "*.csv".into(),
                "*.log".into(),
            ],
            exclude_globs: vec!["**/.git/**".into(), "**/node_modules/**".into()],
            follow_symlinks: false,
            thread_pool_size: 4,
            queue_capacity: 256,
            batch_size: 100,
            batch_timeout_ms: 5000,
            bulk_index_threshold: 1000,
            progress_notification_files: 100,
            progress_notification_interval_ms: 2000,
            watch: false,
            watch_debounce_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerStatus {
    pub state: CrawlerState,
    pub directories: Vec<PathBuf>,
    pub directories_locked: bool,
    pub watch_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_crawl: Option<LastCrawl>,
}

/// The crawler. One orchestration thread per crawl: discovery and
/// extraction fan out over a fixed worker pool, all writes funnel
/// through a single consumer that owns batching and commits.
pub struct Crawler {
    service: Arc<IndexService>,
    state_source: Arc<StateSource>,
    config: CrawlerConfig,
    state: Mutex<CrawlerState>,
    pause: AtomicBool,
    stop: AtomicBool,
    stats: Mutex<Arc<CrawlStats>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Crawler {
    pub fn new(
        service: Arc<IndexService>,
        state_source: Arc<StateSource>,
        config: CrawlerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            service,
            state_source,
            config,
            state: Mutex::new(CrawlerState::Idle),
            pause: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            stats: Mutex::new(Arc::new(CrawlStats::default())),
            worker: Mutex::new(None),
        })
    }

    pub fn state(&self) -> CrawlerState {
        *self.state.lock().unwrap()
    }

    /// True while a crawl pass owns the writer (admin optimize is
    /// rejected in this window).
    pub fn is_crawling(&self) -> bool {
        matches!(self.state(), CrawlerState::Crawling | CrawlerState::Paused)
    }

    pub fn status(&self) -> CrawlerStatus {
        CrawlerStatus {
            state: self.state(),
            directories: self.state_source.directories(),
            directories_locked: self.state_source.directories_locked(),
            watch_enabled: self.config.watch,
            last_crawl: self.state_source.last_crawl(),
        }
    }

    pub fn stats_snapshot(&self) -> CrawlStatsSnapshot {
        self.stats.lock().unwrap().snapshot()
    }

    /// Starts a crawl pass on a fresh orchestration thread. Fails while
    /// a pass is active; a watch-mode worker is stopped and replaced.
    pub fn start(self: &Arc<Self>, full_reindex: bool) -> Result<(), CrawlerError> {
        {
            let state = self.state.lock().unwrap();
            if matches!(*state, CrawlerState::Crawling | CrawlerState::Paused) {
                return Err(CrawlerError::AlreadyRunning);
            }
        }
        // a watching worker has to die before a new pass takes over
        self.halt_worker();

        self.stop.store(false, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);
        *self.stats.lock().unwrap() = Arc::new(CrawlStats::default());
        *self.state.lock().unwrap() = CrawlerState::Crawling;

        let crawler = self.clone();
        let handle = std::thread::Builder::new()
            .name("crawler".into())
            .spawn(move || {
                if let Err(err) = crawler.run(full_reindex) {
                    error!(error = %err, "crawl pass failed");
                }
                crawler.service.set_bulk_indexing(false);
                let mut state = crawler.state.lock().unwrap();
                if *state != CrawlerState::Watching {
                    *state = CrawlerState::Idle;
                }
            })
            .map_err(|e| CrawlerError::Other(e.into()))?;
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Advisory pause; producers and the consumer check the flag between
    /// files and between batches.
    pub fn pause(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != CrawlerState::Crawling {
            return false;
        }
        self.pause.store(true, Ordering::SeqCst);
        *state = CrawlerState::Paused;
        true
    }

    pub fn resume(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != CrawlerState::Paused {
            return false;
        }
        self.pause.store(false, Ordering::SeqCst);
        *state = CrawlerState::Crawling;
        true
    }

    /// Stops whatever is running (crawl or watch) and joins the worker.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);
        self.halt_worker();
        *self.state.lock().unwrap() = CrawlerState::Idle;
    }

    fn halt_worker(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("crawler worker panicked");
            }
        }
    }

    fn wait_while_paused(&self) {
        while self.pause.load(Ordering::SeqCst) && !self.stop.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(self: &Arc<Self>, full_reindex: bool) -> anyhow::Result<()> {
        let started = Instant::now();
        let roots = self.state_source.directories();
        if roots.is_empty() {
            info!("no crawl directories configured, nothing to do");
            return Ok(());
        }
        let stats = self.stats.lock().unwrap().clone();
        let walker = Arc::new(DirectoryWalker::new(
            &self.config.include_globs,
            &self.config.exclude_globs,
            self.config.follow_symlinks,
        )?);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.thread_pool_size.max(1))
            .thread_name(|i| format!("crawl-worker-{i}"))
            .build()?;

        // discovery over all roots before anything touches content
        let fs_snapshot: Vec<walker::WalkedFile> = pool.install(|| {
            roots
                .par_iter()
                .flat_map_iter(|root| {
                    let files = walker.walk(root);
                    stats.record_found(&root.to_string_lossy(), files.len() as u64);
                    files
                })
                .collect()
        });
        info!(
            files = fs_snapshot.len(),
            roots = roots.len(),
            "discovery finished"
        );

        let plan = if full_reindex {
            info!("full reindex requested, dropping all documents first");
            self.service.delete_all()?;
            ReconcilePlan {
                add: fs_snapshot.iter().map(|f| f.path.clone()).collect(),
                update: Vec::new(),
                delete: Vec::new(),
                skip: 0,
            }
        } else {
            let index_snapshot = self.service.index_snapshot()?;
            reconcile(&index_snapshot, &fs_snapshot)
        };
        info!(
            add = plan.add.len(),
            update = plan.update.len(),
            delete = plan.delete.len(),
            skip = plan.skip,
            "reconciliation plan"
        );

        if !plan.delete.is_empty() {
            stats.record_deleted(plan.delete.len() as u64);
            self.service.delete_paths(&plan.delete)?;
        }

        if plan.pending() > self.config.bulk_index_threshold {
            debug!(pending = plan.pending(), "switching NRT refresh to bulk mode");
            self.service.set_bulk_indexing(true);
        }

        self.process_files(&pool, &roots, plan.add.iter().chain(plan.update.iter()), &stats, full_reindex)?;

        self.service.commit()?;
        self.service.refresh();
        if full_reindex {
            self.service.clear_schema_upgrade_flag();
        }
        stats.clear_processing();

        self.state_source.record_last_crawl(LastCrawl {
            last_completion_time_ms: chrono::Utc::now().timestamp_millis(),
            last_document_count: self.service.doc_count(),
            last_crawl_mode: if full_reindex {
                CrawlMode::Full
            } else {
                CrawlMode::Incremental
            },
        });
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            indexed = stats.files_indexed(),
            "crawl pass finished"
        );

        if self.config.watch && !self.stopped() {
            *self.state.lock().unwrap() = CrawlerState::Watching;
            self.watch_loop(&roots, &walker, &stats)?;
            *self.state.lock().unwrap() = CrawlerState::Idle;
        }
        Ok(())
    }

    /// Producer/consumer ingestion: one producer task per root on the
    /// worker pool extracting content, one consumer owning the writer.
    fn process_files<'a>(
        self: &Arc<Self>,
        pool: &rayon::ThreadPool,
        roots: &[PathBuf],
        pending: impl Iterator<Item = &'a PathBuf>,
        stats: &Arc<CrawlStats>,
        full_reindex: bool,
    ) -> anyhow::Result<()> {
        let mut per_root: Vec<(PathBuf, Vec<PathBuf>)> =
            roots.iter().map(|r| (r.clone(), Vec::new())).collect();
        for path in pending {
            let slot = per_root
                .iter_mut()
                .find(|(root, _)| path.starts_with(root))
                .map(|(_, files)| files);
            match slot {
                Some(files) => files.push(path.clone()),
                // root was removed mid-flight; still index the file
                None => per_root
                    .first_mut()
                    .map(|(_, files)| files.push(path.clone()))
                    .unwrap_or_default(),
            }
        }

        let (tx, rx) = flume::bounded::<ExtractedDocument>(self.config.queue_capacity);
        let consumer = self.spawn_consumer(rx, stats.clone());

        let crawler = self.clone();
        let stats_for_producers = stats.clone();
        pool.install(|| {
            per_root.par_iter().for_each(|(root, files)| {
                let root_key = root.to_string_lossy().into_owned();
                for path in files {
                    if crawler.stopped() {
                        return;
                    }
                    crawler.wait_while_paused();
                    crawler.produce_one(path, &root_key, &stats_for_producers, full_reindex, &tx);
                }
            });
        });
        drop(tx);

        consumer
            .join()
            .map_err(|_| anyhow::anyhow!("consumer thread panicked"))?;
        Ok(())
    }

    fn produce_one(
        &self,
        path: &Path,
        root_key: &str,
        stats: &CrawlStats,
        full_reindex: bool,
        tx: &flume::Sender<ExtractedDocument>,
    ) {
        stats.record_processing(&path.to_string_lossy());
        match ContentExtractor.extract(path) {
            Ok(record) => {
                // hash check happens here, during processing, never in
                // the reconciliation diff
                if !full_reindex {
                    let hash = content_hash(&record.raw_text);
                    let stored = self
                        .service
                        .stored_content_hash(&path.to_string_lossy())
                        .ok()
                        .flatten();
                    if stored.as_deref() == Some(hash.as_str()) {
                        debug!(path = %path.display(), "content unchanged, skipping");
                        stats.record_skipped();
                        return;
                    }
                }
                // a full queue blocks here: the producer absorbs the
                // backpressure inline
                if tx.send(record).is_err() {
                    warn!(path = %path.display(), "consumer is gone, dropping file");
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "extraction failed");
                stats.record_failed(root_key);
            }
        }
    }

    fn spawn_consumer(
        self: &Arc<Self>,
        rx: flume::Receiver<ExtractedDocument>,
        stats: Arc<CrawlStats>,
    ) -> JoinHandle<()> {
        let crawler = self.clone();
        let notifier = ProgressNotifier::new(
            self.config.progress_notification_files,
            self.config.progress_notification_interval_ms,
        );
        let batch_size = self.config.batch_size.max(1);
        let batch_timeout = Duration::from_millis(self.config.batch_timeout_ms.max(1));

        std::thread::Builder::new()
            .name("crawl-consumer".into())
            .spawn(move || {
                let mut batch: Vec<ExtractedDocument> = Vec::with_capacity(batch_size);
                let mut batch_started: Option<Instant> = None;
                loop {
                    crawler.wait_while_paused();
                    let deadline = batch_started
                        .map(|t| t + batch_timeout)
                        .unwrap_or_else(|| Instant::now() + Duration::from_millis(500));
                    match rx.recv_deadline(deadline) {
                        Ok(record) => {
                            batch_started.get_or_insert_with(Instant::now);
                            batch.push(record);
                            if batch.len() >= batch_size {
                                crawler.flush_batch(&mut batch, &mut batch_started, &stats);
                                notifier.tick(&stats);
                            }
                        }
                        Err(flume::RecvTimeoutError::Timeout) => {
                            if !batch.is_empty() {
                                crawler.flush_batch(&mut batch, &mut batch_started, &stats);
                                notifier.tick(&stats);
                            }
                        }
                        Err(flume::RecvTimeoutError::Disconnected) => {
                            crawler.flush_batch(&mut batch, &mut batch_started, &stats);
                            notifier.tick(&stats);
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn crawl consumer")
    }

    /// One flush = add-or-update per document, one commit at the end.
    /// Commits dominate crawl cost; the batch size is the tuning knob.
    fn flush_batch(
        &self,
        batch: &mut Vec<ExtractedDocument>,
        batch_started: &mut Option<Instant>,
        stats: &CrawlStats,
    ) {
        if batch.is_empty() {
            *batch_started = None;
            return;
        }
        let count = batch.len();
        for record in batch.drain(..) {
            let root_key = record
                .file_path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.service.add_or_update(&record) {
                Ok(()) => stats.record_indexed(&root_key, record.file_size),
                Err(err) => {
                    warn!(path = %record.file_path.display(), error = %err, "index write failed");
                    stats.record_failed(&root_key);
                }
            }
        }
        if let Err(err) = self.service.commit() {
            error!(error = %err, "batch commit failed");
        } else {
            debug!(count, "batch committed");
        }
        *batch_started = None;
    }

    /// Watch mode: debounced filesystem events feed small upsert/delete
    /// batches until stop.
    fn watch_loop(
        self: &Arc<Self>,
        roots: &[PathBuf],
        walker: &DirectoryWalker,
        stats: &Arc<CrawlStats>,
    ) -> anyhow::Result<()> {
        let watcher = watch::watch_roots(roots, Duration::from_millis(self.config.watch_debounce_ms))?;
        info!(roots = roots.len(), "watch mode active");
        while !self.stopped() {
            match watcher.events.recv_timeout(Duration::from_millis(500)) {
                Ok(paths) => {
                    self.wait_while_paused();
                    self.apply_watch_events(paths, walker, stats);
                }
                Err(flume::RecvTimeoutError::Timeout) => continue,
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    fn apply_watch_events(
        &self,
        paths: Vec<PathBuf>,
        walker: &DirectoryWalker,
        stats: &Arc<CrawlStats>,
    ) {
        let mut deletes: Vec<String> = Vec::new();
        let mut touched = 0usize;
        for path in paths {
            if !walker.matches(&path) {
                continue;
            }
            if path.is_file() {
                self.produce_watch_upsert(&path, stats);
                touched += 1;
            } else if !path.exists() {
                deletes.push(path.to_string_lossy().into_owned());
            }
        }
        if !deletes.is_empty() {
            stats.record_deleted(deletes.len() as u64);
            if let Err(err) = self.service.delete_paths(&deletes) {
                warn!(error = %err, "watch delete failed");
            }
        }
        if touched > 0 {
            if let Err(err) = self.service.commit() {
                warn!(error = %err, "watch commit failed");
            }
        }
        if touched > 0 || !deletes.is_empty() {
            self.service.refresh();
        }
    }

    fn produce_watch_upsert(&self, path: &Path, stats: &Arc<CrawlStats>) {
        stats.record_processing(&path.to_string_lossy());
        match ContentExtractor.extract(path) {
            Ok(record) => {
                let hash = content_hash(&record.raw_text);
                let stored = self
                    .service
                    .stored_content_hash(&path.to_string_lossy())
                    .ok()
                    .flatten();
                if stored.as_deref() == Some(hash.as_str()) {
                    stats.record_skipped();
                    return;
                }
                let root_key = path
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match self.service.add_or_update(&record) {
                    Ok(()) => stats.record_indexed(&root_key, record.file_size),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "watch upsert failed");
                        stats.record_failed(&root_key);
                    }
                }
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "watch extraction failed");
                stats.record_failed(
                    &path
                        .parent()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::lemma::LemmaEngines;
    use crate::application::config::state::StateSource;

    use super::*;

    fn setup(dir: &Path, config: CrawlerConfig) -> (Arc<IndexService>, Arc<Crawler>, PathBuf) {
        let index_dir = dir.join("index");
        let docs_dir = dir.join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        let service = IndexService::open(
            &index_dir,
            Arc::new(LemmaEngines::new(1024)),
            1,
            15_000_000,
            1000,
            5000,
        )
        .unwrap();
        let state = Arc::new(StateSource::load(dir.join("config.yaml")).unwrap());
        state.add_directory(&docs_dir).unwrap();
        let crawler = Crawler::new(service.clone(), state, config);
        (service, crawler, docs_dir)
    }

    fn wait_idle(crawler: &Crawler) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while crawler.is_crawling() {
            assert!(Instant::now() < deadline, "crawl did not finish");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn quick_config() -> CrawlerConfig {
        CrawlerConfig {
            batch_timeout_ms: 100,
            progress_notification_interval_ms: 100_000,
            ..Default::default()
        }
    }

    #[test]
    fn crawl_indexes_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let (service, crawler, docs) = setup(dir.path(), quick_config());
        std::fs::write(docs.join("a.txt"), "the contract was signed").unwrap();
        std::fs::write(docs.join("b.md"), "# Notes\nrunning shoes").unwrap();
        std::fs::write(docs.join("skip.bin"), [0u8, 1, 2]).unwrap();

        crawler.start(false).unwrap();
        wait_idle(&crawler);
        service.refresh();

        assert_eq!(service.doc_count(), 2);
        let snap = crawler.stats_snapshot();
        assert_eq!(snap.files_found, 2);
        assert_eq!(snap.files_indexed, 2);
        assert_eq!(snap.files_failed, 0);
    }

    #[test]
    fn second_pass_skips_unchanged_files_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let (service, crawler, docs) = setup(dir.path(), quick_config());
        let file = docs.join("a.txt");
        std::fs::write(&file, "stable content").unwrap();

        crawler.start(false).unwrap();
        wait_idle(&crawler);
        assert_eq!(crawler.stats_snapshot().files_indexed, 1);

        // rewrite the same bytes: the mtime moves forward, reconciliation
        // classifies the file as UPDATE, and only the hash check can skip it
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(&file, "stable content").unwrap();

        crawler.start(false).unwrap();
        wait_idle(&crawler);
        service.refresh();

        let snap = crawler.stats_snapshot();
        assert_eq!(snap.files_indexed, 0, "unchanged file was rewritten");
        assert_eq!(service.doc_count(), 1);
    }

    #[test]
    fn deleted_files_are_removed_from_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let (service, crawler, docs) = setup(dir.path(), quick_config());
        std::fs::write(docs.join("keep.txt"), "keep me").unwrap();
        std::fs::write(docs.join("drop.txt"), "drop me").unwrap();

        crawler.start(false).unwrap();
        wait_idle(&crawler);
        assert_eq!(service.doc_count(), 2);

        std::fs::remove_file(docs.join("drop.txt")).unwrap();
        crawler.start(false).unwrap();
        wait_idle(&crawler);
        service.refresh();

        assert_eq!(service.doc_count(), 1);
        assert_eq!(crawler.stats_snapshot().files_deleted, 1);
    }

    #[test]
    fn start_while_crawling_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_service, crawler, docs) = setup(dir.path(), quick_config());
        for i in 0..50 {
            std::fs::write(docs.join(format!("f{i}.txt")), format!("document {i}")).unwrap();
        }
        crawler.start(false).unwrap();
        let second = crawler.start(false);
        // either we were fast enough to observe the running pass, or the
        // pass already finished and the restart is legal
        if crawler.is_crawling() {
            assert!(matches!(second, Err(CrawlerError::AlreadyRunning)));
        }
        wait_idle(&crawler);
    }

    #[test]
    fn full_reindex_rebuilds_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (service, crawler, docs) = setup(dir.path(), quick_config());
        std::fs::write(docs.join("a.txt"), "same content").unwrap();

        crawler.start(false).unwrap();
        wait_idle(&crawler);
        crawler.start(true).unwrap();
        wait_idle(&crawler);
        service.refresh();

        assert_eq!(service.doc_count(), 1);
        // full reindex ignores the hash skip
        assert_eq!(crawler.stats_snapshot().files_indexed, 1);
        assert!(!service.schema_upgrade_required());
    }

    #[test]
    fn pause_and_resume_only_apply_in_their_states() {
        let dir = tempfile::tempdir().unwrap();
        let (_service, crawler, _docs) = setup(dir.path(), quick_config());
        assert_eq!(crawler.state(), CrawlerState::Idle);
        assert!(!crawler.pause(), "pause must be a no-op while idle");
        assert!(!crawler.resume(), "resume must be a no-op while not paused");
        crawler.stop();
        assert_eq!(crawler.state(), CrawlerState::Idle);
    }

    #[test]
    fn last_crawl_state_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (_service, crawler, docs) = setup(dir.path(), quick_config());
        std::fs::write(docs.join("a.txt"), "content").unwrap();
        crawler.start(false).unwrap();
        wait_idle(&crawler);

        let status = crawler.status();
        let last = status.last_crawl.expect("last crawl recorded");
        assert_eq!(last.last_document_count, 1);
        assert_eq!(last.last_crawl_mode, CrawlMode::Incremental);
        assert!(last.last_completion_time_ms > 0);
    }
}
