//! Runtime statistics: the language-distribution cache that scales lemma
//! boosts, and query-latency percentiles.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

/// Per-language document counts over the whole index. Replaced wholesale
/// on every NRT refresh; readers only ever see a complete snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LanguageDistribution {
    pub per_language: BTreeMap<String, u64>,
    pub total_docs: u64,
}

impl LanguageDistribution {
    pub fn new(per_language: BTreeMap<String, u64>, total_docs: u64) -> Self {
        Self {
            per_language,
            total_docs,
        }
    }

    pub fn share(&self, language: &str) -> f32 {
        if self.total_docs == 0 {
            return 0.0;
        }
        let docs = self.per_language.get(language).copied().unwrap_or(0);
        docs as f32 / self.total_docs as f32
    }

    /// Boost for a lemma field: a floor of 0.3 plus up to 0.7 scaled by
    /// how much of the corpus is in that language.
    pub fn lemma_boost(&self, language: &str) -> f32 {
        0.3 + 0.7 * self.share(language)
    }
}

/// Atomically replaced distribution handle. Readers clone the inner
/// `Arc`; a refresh swaps the whole reference so nobody observes a torn
/// value.
#[derive(Default)]
pub struct LanguageDistributionCache {
    current: RwLock<Arc<LanguageDistribution>>,
}

impl LanguageDistributionCache {
    pub fn get(&self) -> Arc<LanguageDistribution> {
        self.current.read().unwrap().clone()
    }

    pub fn replace(&self, next: LanguageDistribution) {
        *self.current.write().unwrap() = Arc::new(next);
    }
}

const SAMPLE_CAPACITY: usize = 512;

/// Query latency tracker: total/error counts are atomics, the last
/// [`SAMPLE_CAPACITY`] samples sit in a circular buffer behind a
/// dedicated mutex. Percentile reads snapshot under that lock.
pub struct QueryRuntimeStats {
    total_queries: AtomicU64,
    samples: Mutex<SampleRing>,
}

struct SampleRing {
    samples: Vec<u64>,
    next: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRuntimeMetrics {
    pub total_queries: u64,
    pub sample_size: usize,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
}

impl Default for QueryRuntimeStats {
    fn default() -> Self {
        Self {
            total_queries: AtomicU64::new(0),
            samples: Mutex::new(SampleRing {
                samples: Vec::with_capacity(SAMPLE_CAPACITY),
                next: 0,
            }),
        }
    }
}

impl QueryRuntimeStats {
    pub fn record(&self, elapsed_ms: u64) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        let mut ring = self.samples.lock().unwrap();
        if ring.samples.len() < SAMPLE_CAPACITY {
            ring.samples.push(elapsed_ms);
        } else {
            let at = ring.next;
            ring.samples[at] = elapsed_ms;
        }
        ring.next = (ring.next + 1) % SAMPLE_CAPACITY;
    }

    pub fn snapshot(&self) -> QueryRuntimeMetrics {
        let ring = self.samples.lock().unwrap();
        let mut sorted = ring.samples.clone();
        drop(ring);
        sorted.sort_unstable();
        QueryRuntimeMetrics {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            sample_size: sorted.len(),
            p50_ms: percentile(&sorted, 50),
            p90_ms: percentile(&sorted, 90),
            p99_ms: percentile(&sorted, 99),
        }
    }
}

fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_scales_between_floor_and_one() {
        let dist = LanguageDistribution::new(
            [("en".to_string(), 75u64), ("de".to_string(), 25u64)].into(),
            100,
        );
        assert!((dist.lemma_boost("en") - 0.825).abs() < 1e-6);
        assert!((dist.lemma_boost("de") - 0.475).abs() < 1e-6);
        // unknown language bottoms out at the floor
        assert!((dist.lemma_boost("fr") - 0.3).abs() < 1e-6);
    }

    #[test]
    fn empty_index_boost_is_the_floor() {
        let dist = LanguageDistribution::default();
        assert!((dist.lemma_boost("en") - 0.3).abs() < 1e-6);
    }

    #[test]
    fn cache_swaps_whole_snapshots() {
        let cache = LanguageDistributionCache::default();
        assert_eq!(cache.get().total_docs, 0);
        cache.replace(LanguageDistribution::new([("de".to_string(), 3)].into(), 3));
        let seen = cache.get();
        assert_eq!(seen.total_docs, 3);
        assert_eq!(seen.per_language.get("de"), Some(&3));
    }

    #[test]
    fn percentiles_over_a_known_series() {
        let stats = QueryRuntimeStats::default();
        for ms in 1..=100 {
            stats.record(ms);
        }
        let snap = stats.snapshot();
        assert_eq!(snap.total_queries, 100);
        assert_eq!(snap.p50_ms, 50);
        assert_eq!(snap.p90_ms, 90);
        assert_eq!(snap.p99_ms, 99);
    }

    #[test]
    fn ring_keeps_only_recent_samples() {
        let stats = QueryRuntimeStats::default();
        for _ in 0..600 {
            stats.record(5);
        }
        let snap = stats.snapshot();
        assert_eq!(snap.sample_size, 512);
        assert_eq!(snap.total_queries, 600);
    }
}
