use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::crawl::CrawlerConfig;

use super::state::StateSource;

#[derive(Serialize, Deserialize, Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Configuration {
    #[clap(short, long, default_value_os_t = default_index_dir())]
    #[serde(default = "default_index_dir")]
    /// Directory holding the inverted index and logs
    pub index_dir: PathBuf,

    #[clap(long, default_value_os_t = default_runtime_config_path())]
    #[serde(default = "default_runtime_config_path")]
    /// Runtime configuration file (crawl roots, last-crawl state)
    pub config_file: PathBuf,

    #[clap(long, default_value_t = default_thread_pool_size())]
    #[serde(default = "default_thread_pool_size")]
    /// Crawl producer pool size
    pub thread_pool_size: usize,

    #[clap(long, default_value_t = default_queue_capacity())]
    #[serde(default = "default_queue_capacity")]
    /// Bounded queue between producers and the index consumer
    pub queue_capacity: usize,

    #[clap(long, default_value_t = default_batch_size())]
    #[serde(default = "default_batch_size")]
    /// Documents per commit during crawling
    pub batch_size: usize,

    #[clap(long, default_value_t = default_batch_timeout_ms())]
    #[serde(default = "default_batch_timeout_ms")]
    /// Flush a partial batch after this many milliseconds
    pub batch_timeout_ms: u64,

    #[clap(long, default_value_t = default_bulk_index_threshold())]
    #[serde(default = "default_bulk_index_threshold")]
    /// Pending-file count that switches NRT refresh to the slow interval
    pub bulk_index_threshold: usize,

    #[clap(long, default_value_t = default_nrt_refresh_interval_ms())]
    #[serde(default = "default_nrt_refresh_interval_ms")]
    /// Base searcher refresh interval
    pub nrt_refresh_interval_ms: u64,

    #[clap(long, default_value_t = default_slow_nrt_refresh_interval_ms())]
    #[serde(default = "default_slow_nrt_refresh_interval_ms")]
    /// Refresh interval while bulk indexing
    pub slow_nrt_refresh_interval_ms: u64,

    #[clap(long, default_value_t = default_progress_notification_files())]
    #[serde(default = "default_progress_notification_files")]
    pub progress_notification_files: u64,

    #[clap(long, default_value_t = default_progress_notification_interval_ms())]
    #[serde(default = "default_progress_notification_interval_ms")]
    pub progress_notification_interval_ms: u64,

    #[clap(long)]
    #[serde(default)]
    /// Stay in watch mode after the initial crawl pass
    pub watch: bool,

    #[clap(long, default_value_t = default_watch_debounce_ms())]
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    #[clap(long, value_delimiter = ',')]
    #[serde(default)]
    /// Include globs; the built-in text-format set when empty
    pub include_globs: Vec<String>,

    #[clap(long, value_delimiter = ',')]
    #[serde(default)]
    /// Exclude globs; the built-in VCS/vendor set when empty
    pub exclude_globs: Vec<String>,

    #[clap(long)]
    #[serde(default)]
    pub follow_symlinks: bool,

    #[clap(long, default_value_t = default_writer_threads())]
    #[serde(default = "default_writer_threads")]
    pub writer_threads: usize,

    #[clap(long, default_value_t = default_writer_buffer_bytes())]
    #[serde(default = "default_writer_buffer_bytes")]
    pub writer_buffer_bytes: usize,

    #[clap(long, default_value_t = default_lemma_cache_size())]
    #[serde(default = "default_lemma_cache_size")]
    /// Per-language lemma cache capacity
    pub lemma_cache_size: usize,

    #[clap(long, default_value_t = default_max_passages())]
    #[serde(default = "default_max_passages")]
    pub max_passages: usize,

    #[clap(long, default_value_t = default_max_passage_chars())]
    #[serde(default = "default_max_passage_chars")]
    pub max_passage_chars: usize,

    #[clap(long)]
    #[serde(default)]
    /// Run an initial crawl right after startup
    pub crawl_on_start: bool,
}

impl Configuration {
    /// Directory where logs are written to
    pub fn log_dir(&self) -> PathBuf {
        self.index_dir.join("logs")
    }

    pub fn crawler_config(&self) -> CrawlerConfig {
        let defaults = CrawlerConfig::default();
        CrawlerConfig {
            include_globs: if self.include_globs.is_empty() {
                defaults.include_globs
            } else {
                self.include_globs.clone()
            },
            exclude_globs: if self.exclude_globs.is_empty() {
                defaults.exclude_globs
            } else {
                self.exclude_globs.clone()
            },
            follow_symlinks: self.follow_symlinks,
            thread_pool_size: self.thread_pool_size,
            queue_capacity: self.queue_capacity,
            batch_size: self.batch_size,
            batch_timeout_ms: self.batch_timeout_ms,
            bulk_index_threshold: self.bulk_index_threshold,
            progress_notification_files: self.progress_notification_files,
            progress_notification_interval_ms: self.progress_notification_interval_ms,
            watch: self.watch,
            watch_debounce_ms: self.watch_debounce_ms,
        }
    }
}

fn default_index_dir() -> PathBuf {
    match directories::ProjectDirs::from("net", "mcplucene", "mcplucene") {
        Some(dirs) => dirs.data_dir().to_owned(),
        None => "mcplucene_index".into(),
    }
}

fn default_runtime_config_path() -> PathBuf {
    StateSource::default_config_path()
}

fn default_thread_pool_size() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_timeout_ms() -> u64 {
    5000
}

fn default_bulk_index_threshold() -> usize {
    1000
}

fn default_nrt_refresh_interval_ms() -> u64 {
    1000
}

fn default_slow_nrt_refresh_interval_ms() -> u64 {
    5000
}

fn default_progress_notification_files() -> u64 {
    100
}

fn default_progress_notification_interval_ms() -> u64 {
    2000
}

fn default_watch_debounce_ms() -> u64 {
    1000
}

fn default_writer_threads() -> usize {
    2
}

fn default_writer_buffer_bytes() -> usize {
    50_000_000
}

fn default_lemma_cache_size() -> usize {
    10_000
}

fn default_max_passages() -> usize {
    3
}

fn default_max_passage_chars() -> usize {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_knobs() {
        let config = Configuration::parse_from(["mcplucene"]);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.batch_timeout_ms, 5000);
        assert_eq!(config.bulk_index_threshold, 1000);
        assert_eq!(config.slow_nrt_refresh_interval_ms, 5000);
        assert_eq!(config.max_passages, 3);
        assert_eq!(config.max_passage_chars, 200);
        assert!(!config.watch);
    }

    #[test]
    fn empty_globs_fall_back_to_the_builtin_sets() {
        let config = Configuration::parse_from(["mcplucene"]);
        let crawler = config.crawler_config();
        assert!(crawler.include_globs.contains(&"*.txt".to_string()));
        assert!(!crawler.exclude_globs.is_empty());
    }

    #[test]
    fn cli_globs_override() {
        let config =
            Configuration::parse_from(["mcplucene", "--include-globs", "*.rst,*.adoc"]);
        let crawler = config.crawler_config();
        assert_eq!(crawler.include_globs, vec!["*.rst", "*.adoc"]);
    }
}
