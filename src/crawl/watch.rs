use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tracing::warn;

/// A debounced recursive watch over the crawl roots. Event batches are
/// surfaced as plain path lists; the debouncer dies with this handle.
pub struct FsWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    pub events: flume::Receiver<Vec<PathBuf>>,
}

pub fn watch_roots(roots: &[PathBuf], debounce: Duration) -> anyhow::Result<FsWatcher> {
    let (tx, rx) = flume::unbounded();
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let paths: Vec<PathBuf> = events.into_iter().map(|event| event.path).collect();
            if !paths.is_empty() {
                let _ = tx.send(paths);
            }
        }
        Err(error) => warn!(?error, "filesystem watch error"),
    })
    .context("failed to create filesystem watcher")?;

    for root in roots {
        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;
    }

    Ok(FsWatcher {
        _debouncer: debouncer,
        events: rx,
    })
}
