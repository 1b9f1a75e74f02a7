use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use serde::Serialize;

use super::lemmatizer::PosTag;

/// Bounded per-language lemma cache keyed by `(token, pos_tag)`. The key
/// token is already case-normalized by the caller (proper nouns keep case,
/// everything else is lowercased). Hit/miss/eviction counters are atomics
/// so the sampling path never takes the map lock twice.
pub struct LemmaCache {
    entries: Mutex<LruCache<(String, PosTag), String>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LemmaCacheMetrics {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl LemmaCache {
    pub fn new(capacity: usize) -> Self {
        let bounded = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(bounded)),
            capacity: bounded.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, token: &str, tag: PosTag) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&(token.to_owned(), tag)) {
            Some(lemma) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(lemma.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Populates every `(token, tag) → lemma` binding of a freshly
    /// lemmatized sentence in one pass under the lock.
    pub fn put_sentence<'a>(
        &self,
        bindings: impl Iterator<Item = (&'a str, PosTag, &'a str)>,
    ) {
        let mut entries = self.entries.lock().unwrap();
        for (token, tag, lemma) in bindings {
            let evicted = entries.push((token.to_owned(), tag), lemma.to_owned());
            if let Some((old_key, _)) = evicted {
                if old_key.0 != token || old_key.1 != tag {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn metrics(&self) -> LemmaCacheMetrics {
        let entries = self.entries.lock().unwrap();
        LemmaCacheMetrics {
            size: entries.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = LemmaCache::new(8);
        assert_eq!(cache.get("running", PosTag::Verb), None);
        cache.put_sentence([("running", PosTag::Verb, "run")].into_iter());
        assert_eq!(cache.get("running", PosTag::Verb), Some("run".to_owned()));

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.size, 1);
    }

    #[test]
    fn tag_is_part_of_the_key() {
        let cache = LemmaCache::new(8);
        cache.put_sentence([("Bonn", PosTag::ProperNoun, "Bonn")].into_iter());
        assert_eq!(cache.get("Bonn", PosTag::Noun), None);
        assert_eq!(cache.get("Bonn", PosTag::ProperNoun), Some("Bonn".to_owned()));
    }

    #[test]
    fn lru_eviction_is_counted() {
        let cache = LemmaCache::new(2);
        cache.put_sentence(
            [
                ("one", PosTag::Other, "one"),
                ("two", PosTag::Other, "two"),
                ("three", PosTag::Other, "three"),
            ]
            .into_iter(),
        );
        let metrics = cache.metrics();
        assert_eq!(metrics.size, 2);
        assert_eq!(metrics.evictions, 1);
        assert_eq!(cache.get("one", PosTag::Other), None);
    }
}
