use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use nomad_common::is_faq_question;
use ring::digest;
use serde::Serialize;
use tracing::debug;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    created_at: Instant,
}

/// Counter snapshot exposed through the metrics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub capacity: usize,
}

/// Bounded LRU cache of answers to FAQ questions, with a wall-clock TTL
/// checked lazily on read.
///
/// Questions outside the FAQ pattern set are never stored and never counted.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ResponseCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(DEFAULT_CAPACITY);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn is_eligible(question: &str) -> bool {
        is_faq_question(question)
    }

    /// Look up a cached answer. Returns `None` for ineligible questions,
    /// unknown keys, and entries older than the TTL.
    pub fn get(&self, scope: &str, question: &str) -> Option<String> {
        self.get_at(scope, question, Instant::now())
    }

    fn get_at(&self, scope: &str, question: &str, now: Instant) -> Option<String> {
        if !Self::is_eligible(question) {
            return None;
        }
        let key = cache_key(scope, question);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match entries.peek(&key) {
            Some(entry) => now.saturating_duration_since(entry.created_at) > self.ttl,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(scope, "response cache miss");
                return None;
            }
        };

        if expired {
            entries.pop(&key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(scope, "response cache entry expired");
            return None;
        }

        let response = entries.get(&key).map(|entry| entry.response.clone());
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(scope, "response cache hit");
        response
    }

    /// Store an answer. Ineligible questions are ignored; returns whether the
    /// answer was stored.
    pub fn set(&self, scope: &str, question: &str, response: &str) -> bool {
        self.set_at(scope, question, response, Instant::now())
    }

    fn set_at(&self, scope: &str, question: &str, response: &str, now: Instant) -> bool {
        if !Self::is_eligible(question) || response.trim().is_empty() {
            return false;
        }
        let key = cache_key(scope, question);
        let entry = CacheEntry {
            response: response.to_string(),
            created_at: now,
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.push(key.clone(), entry) {
            Some((evicted_key, _)) if evicted_key != key => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(scope, "response cache evicted least recently used entry");
            }
            _ => {}
        }
        true
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let cleared = entries.len();
        entries.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY.get(), Duration::from_secs(3600))
    }
}

fn normalize(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Hex SHA-256 of `scope`, a NUL separator, and the normalized question.
fn cache_key(scope: &str, question: &str) -> String {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(scope.as_bytes());
    ctx.update(b"\0");
    ctx.update(normalize(question).as_bytes());
    ctx.finish()
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIFI: &str = "What is the wifi password?";

    #[test]
    fn hit_within_ttl() {
        let cache = ResponseCache::new(10, Duration::from_secs(3600));
        assert!(cache.set("default:en", WIFI, "It's guest123"));

        assert_eq!(cache.get("default:en", WIFI).as_deref(), Some("It's guest123"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn key_ignores_case_and_surrounding_whitespace() {
        let cache = ResponseCache::default();
        cache.set("default:en", WIFI, "guest123");
        assert_eq!(
            cache.get("default:en", "   WHAT IS THE WIFI PASSWORD?  ").as_deref(),
            Some("guest123")
        );
    }

    #[test]
    fn scopes_do_not_share_entries() {
        let cache = ResponseCache::default();
        cache.set("default:en", WIFI, "english answer");
        assert_eq!(cache.get("default:es", WIFI), None);
        assert_eq!(cache.get("harbor:en", WIFI), None);
    }

    #[test]
    fn miss_after_ttl_counts_expiration() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        let start = Instant::now();
        cache.set_at("s", WIFI, "answer", start);

        assert!(cache.get_at("s", WIFI, start + Duration::from_secs(59)).is_some());
        assert!(cache.get_at("s", WIFI, start + Duration::from_secs(61)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0);
        // the expired entry is gone, not just hidden
        assert!(cache.get_at("s", WIFI, start).is_none());
    }

    #[test]
    fn eviction_is_least_recently_used_not_fifo() {
        let cache = ResponseCache::new(2, Duration::from_secs(3600));
        cache.set("s", "breakfast hours?", "7-10");
        cache.set("s", "pool hours?", "6-22");

        // touch the oldest so it becomes most recently used
        assert!(cache.get("s", "breakfast hours?").is_some());
        cache.set("s", "gym hours?", "24h");

        assert!(cache.get("s", "breakfast hours?").is_some());
        assert!(cache.get("s", "pool hours?").is_none());
        assert!(cache.get("s", "gym hours?").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn overwriting_a_key_is_not_an_eviction() {
        let cache = ResponseCache::new(2, Duration::from_secs(3600));
        cache.set("s", WIFI, "old");
        cache.set("s", WIFI, "new");
        assert_eq!(cache.get("s", WIFI).as_deref(), Some("new"));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn ineligible_questions_never_stored_or_counted() {
        let cache = ResponseCache::default();
        assert!(!cache.set("s", "Plan me a day in the city", "Sure..."));
        assert!(cache.get("s", "Plan me a day in the city").is_none());
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 0);
    }

    #[test]
    fn clear_empties_cache_but_keeps_counters() {
        let cache = ResponseCache::default();
        cache.set("s", WIFI, "answer");
        cache.get("s", WIFI);
        assert_eq!(cache.clear(), 1);
        assert!(cache.get("s", WIFI).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn zero_capacity_falls_back_to_default() {
        let cache = ResponseCache::new(0, Duration::from_secs(1));
        assert_eq!(cache.stats().capacity, 500);
    }
}
