use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::revalidate::Invalidator;

struct CachedPage {
    body: String,
    stored_at: Instant,
}

/// In-process cache of rendered public pages, keyed by request path.
/// Entries expire after `ttl`; the revalidation dispatcher evicts them early.
pub struct PageCache {
    pages: Mutex<HashMap<String, CachedPage>>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        PageCache {
            pages: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedPage>> {
        self.pages.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, path: &str) -> Option<String> {
        let mut pages = self.lock();
        match pages.get(path) {
            Some(page) if page.stored_at.elapsed() < self.ttl => Some(page.body.clone()),
            Some(_) => {
                pages.remove(path);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, path: &str, body: String) {
        if self.ttl.is_zero() {
            return;
        }
        self.lock().insert(
            path.to_string(),
            CachedPage {
                body,
                stored_at: Instant::now(),
            },
        );
    }

    /// Evict one path. Returns whether anything was cached.
    pub fn evict(&self, path: &str) -> bool {
        self.lock().remove(path).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let mut pages = self.lock();
        let before = pages.len();
        let ttl = self.ttl;
        pages.retain(|_, page| page.stored_at.elapsed() < ttl);
        before - pages.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[rocket::async_trait]
impl Invalidator for PageCache {
    fn name(&self) -> &'static str {
        "page_cache"
    }

    /// Local eviction is free, so it runs on every dispatch.
    fn debounced(&self) -> bool {
        false
    }

    async fn invalidate(&self, path: &str) -> Result<(), String> {
        self.evict(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_evicts() {
        let cache = PageCache::new(Duration::from_secs(60));
        cache.put("/", "<h1>home</h1>".into());
        assert_eq!(cache.get("/").as_deref(), Some("<h1>home</h1>"));
        assert!(cache.evict("/"));
        assert!(cache.get("/").is_none());
        assert!(!cache.evict("/"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = PageCache::new(Duration::from_millis(20));
        cache.put("/feed", "<rss/>".into());
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("/feed").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = PageCache::new(Duration::ZERO);
        cache.put("/", "x".into());
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_counts_removed() {
        let cache = PageCache::new(Duration::from_millis(10));
        cache.put("/a", "a".into());
        cache.put("/b", "b".into());
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.purge_expired(), 2);
    }
}
