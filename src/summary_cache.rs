//! LRU cache of commit first lines, used to label commits in menus.

use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;

use crate::error::GitError;

pub struct SummaryCache {
    cache: RwLock<LruCache<String, String>>,
}

impl SummaryCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, sha: &str) -> Option<String> {
        self.cache.write().get(sha).cloned()
    }

    pub fn insert(&self, sha: impl Into<String>, summary: impl Into<String>) {
        self.cache.write().put(sha.into(), summary.into());
    }

    /// Cached summary, or `load` it and remember the answer.
    pub fn get_or_load<F>(&self, sha: &str, load: F) -> Result<String, GitError>
    where
        F: FnOnce() -> Result<String, GitError>,
    {
        if let Some(hit) = self.get(sha) {
            return Ok(hit);
        }
        let summary = load()?;
        self.insert(sha, summary.clone());
        Ok(summary)
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }
}
