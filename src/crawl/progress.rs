use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

/// Thread-safe crawl counters. Producers and the consumer bump atomics;
/// the per-directory map and the currently-processing marker sit behind
/// small mutexes off the hot path.
#[derive(Default)]
pub struct CrawlStats {
    files_found: AtomicU64,
    files_processed: AtomicU64,
    files_indexed: AtomicU64,
    files_skipped: AtomicU64,
    files_failed: AtomicU64,
    files_deleted: AtomicU64,
    bytes_processed: AtomicU64,
    per_directory: Mutex<BTreeMap<String, DirectoryStats>>,
    currently_processing: Mutex<Option<String>>,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStats {
    pub files_found: u64,
    pub files_indexed: u64,
    pub files_failed: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStatsSnapshot {
    pub files_found: u64,
    pub files_processed: u64,
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub files_deleted: u64,
    pub bytes_processed: u64,
    pub per_directory_stats: BTreeMap<String, DirectoryStats>,
    pub currently_processing: Option<String>,
}

impl CrawlStats {
    pub fn record_found(&self, directory: &str, count: u64) {
        self.files_found.fetch_add(count, Ordering::Relaxed);
        let mut map = self.per_directory.lock().unwrap();
        map.entry(directory.to_owned()).or_default().files_found += count;
    }

    pub fn record_processing(&self, path: &str) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        *self.currently_processing.lock().unwrap() = Some(path.to_owned());
    }

    pub fn record_indexed(&self, directory: &str, bytes: u64) {
        self.files_indexed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
        let mut map = self.per_directory.lock().unwrap();
        map.entry(directory.to_owned()).or_default().files_indexed += 1;
    }

    pub fn record_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self, directory: &str) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
        let mut map = self.per_directory.lock().unwrap();
        map.entry(directory.to_owned()).or_default().files_failed += 1;
    }

    pub fn record_deleted(&self, count: u64) {
        self.files_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn clear_processing(&self) {
        *self.currently_processing.lock().unwrap() = None;
    }

    pub fn files_indexed(&self) -> u64 {
        self.files_indexed.load(Ordering::Relaxed)
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CrawlStatsSnapshot {
        CrawlStatsSnapshot {
            files_found: self.files_found.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_indexed: self.files_indexed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            files_deleted: self.files_deleted.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            per_directory_stats: self.per_directory.lock().unwrap().clone(),
            currently_processing: self.currently_processing.lock().unwrap().clone(),
        }
    }
}

/// Emits a progress line every `every_files` processed files or every
/// `every_ms` milliseconds, whichever comes first.
pub struct ProgressNotifier {
    every_files: u64,
    every_ms: u64,
    state: Mutex<NotifierState>,
}

struct NotifierState {
    last_emit: Instant,
    last_count: u64,
}

impl ProgressNotifier {
    pub fn new(every_files: u64, every_ms: u64) -> Self {
        Self {
            every_files: every_files.max(1),
            every_ms: every_ms.max(1),
            state: Mutex::new(NotifierState {
                last_emit: Instant::now(),
                last_count: 0,
            }),
        }
    }

    /// Returns true when a notification was due and emitted.
    pub fn tick(&self, stats: &CrawlStats) -> bool {
        let processed = stats.files_processed();
        let mut state = self.state.lock().unwrap();
        let due_by_count = processed.saturating_sub(state.last_count) >= self.every_files;
        let due_by_time = state.last_emit.elapsed().as_millis() as u64 >= self.every_ms;
        if !due_by_count && !due_by_time {
            return false;
        }
        state.last_emit = Instant::now();
        state.last_count = processed;
        drop(state);

        let snapshot = stats.snapshot();
        info!(
            found = snapshot.files_found,
            processed = snapshot.files_processed,
            indexed = snapshot.files_indexed,
            skipped = snapshot.files_skipped,
            failed = snapshot.files_failed,
            bytes = snapshot.bytes_processed,
            "crawl progress"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_aggregate_per_directory() {
        let stats = CrawlStats::default();
        stats.record_found("/docs", 3);
        stats.record_processing("/docs/a.txt");
        stats.record_indexed("/docs", 100);
        stats.record_processing("/docs/b.txt");
        stats.record_failed("/docs");
        stats.record_processing("/docs/c.txt");
        stats.record_skipped();

        let snap = stats.snapshot();
        assert_eq!(snap.files_found, 3);
        assert_eq!(snap.files_processed, 3);
        assert_eq!(snap.files_indexed, 1);
        assert_eq!(snap.files_failed, 1);
        assert_eq!(snap.files_skipped, 1);
        assert_eq!(snap.bytes_processed, 100);
        let dir = snap.per_directory_stats.get("/docs").unwrap();
        assert_eq!(dir.files_found, 3);
        assert_eq!(dir.files_indexed, 1);
        assert_eq!(dir.files_failed, 1);
        assert_eq!(snap.currently_processing.as_deref(), Some("/docs/c.txt"));
    }

    #[test]
    fn notifier_fires_on_file_count() {
        let stats = CrawlStats::default();
        let notifier = ProgressNotifier::new(2, 60_000);
        stats.record_processing("/a");
        assert!(!notifier.tick(&stats));
        stats.record_processing("/b");
        assert!(notifier.tick(&stats));
        // counter resets after an emit
        assert!(!notifier.tick(&stats));
    }

    #[test]
    fn notifier_fires_on_elapsed_time() {
        let stats = CrawlStats::default();
        let notifier = ProgressNotifier::new(1000, 1);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(notifier.tick(&stats));
    }
}
