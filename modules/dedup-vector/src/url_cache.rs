//! Global, bounded, FIFO-evicting cache for HEAD-based URL resolution
//! (§5, §9). Shared process-wide across jobs and guarded by a mutex; both
//! successful resolutions and failures are cached so a flaky or slow host is
//! never retried more than once per process lifetime.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

const DEFAULT_CAPACITY: usize = 2_000;
const RESOLUTION_TIMEOUT: Duration = Duration::from_secs(3);

struct CacheState {
    /// `None` records a prior resolution failure; `Some(url)` the resolved
    /// canonical URL.
    entries: HashMap<String, Option<String>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl CacheState {
    fn insert(&mut self, url: String, resolved: Option<String>) {
        if !self.entries.contains_key(&url) {
            self.order.push_back(url.clone());
            if self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(url, resolved);
    }
}

/// Snapshot counters surfaced by `GET /api/stats/url-resolution`.
#[derive(Debug, Default)]
pub struct UrlResolutionStats {
    pub hits: u64,
    pub misses: u64,
    pub resolved: u64,
    pub failed: u64,
    pub cache_size: usize,
}

/// Resolves a URL to its canonical (post-redirect) form via HTTP `HEAD`,
/// with a bounded cache in front of the network call (company mode only,
/// §6 `ENABLE_URL_RESOLUTION`).
pub struct UrlResolver {
    client: reqwest::Client,
    cache: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    resolved: AtomicU64,
    failed: AtomicU64,
}

impl UrlResolver {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(RESOLUTION_TIMEOUT)
                .build()
                .expect("failed to build URL-resolution HTTP client"),
            cache: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Resolve `url`, consulting the cache first. One retry on transport
    /// failure (§5); both outcomes are cached, so a URL is attempted at
    /// most twice across the process's lifetime.
    pub async fn resolve(&self, url: &str) -> Option<String> {
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.entries.get(url) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return cached.clone();
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let resolved = self.head_with_retry(url).await;
        if resolved.is_some() {
            self.resolved.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let mut cache = self.cache.lock().await;
        cache.insert(url.to_string(), resolved.clone());
        resolved
    }

    async fn head_with_retry(&self, url: &str) -> Option<String> {
        for attempt in 0..2 {
            match self.client.head(url).send().await {
                Ok(resp) => return Some(resp.url().to_string()),
                Err(err) => {
                    tracing::debug!(url, attempt, error = %err, "HEAD resolution attempt failed");
                }
            }
        }
        None
    }

    pub async fn stats(&self) -> UrlResolutionStats {
        let cache = self.cache.lock().await;
        UrlResolutionStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cache_size: cache.order.len(),
        }
    }
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_eviction_drops_oldest_entry_past_capacity() {
        let mut state = CacheState {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: 2,
        };
        state.insert("a".into(), Some("a-resolved".into()));
        state.insert("b".into(), Some("b-resolved".into()));
        state.insert("c".into(), Some("c-resolved".into()));

        assert_eq!(state.entries.len(), 2);
        assert!(!state.entries.contains_key("a"));
        assert!(state.entries.contains_key("b"));
        assert!(state.entries.contains_key("c"));
    }

    #[test]
    fn re_inserting_an_existing_key_does_not_evict() {
        let mut state = CacheState {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: 2,
        };
        state.insert("a".into(), None);
        state.insert("b".into(), Some("b-resolved".into()));
        state.insert("a".into(), Some("a-resolved".into()));

        assert_eq!(state.entries.len(), 2);
        assert_eq!(
            state.entries.get("a").cloned().flatten(),
            Some("a-resolved".to_string())
        );
    }
}
