//! Tiered content cache
//!
//! Two bounded LRU maps (`hot`, `cold`) in front of a pluggable archive
//! tier. A key lives in exactly one tier at a time:
//!
//! ```text
//! store ──► hot ──evict──► cold ──evict──► archive
//!            ▲               │               │
//!            └──── load ─────┴───── load ────┘
//! ```
//!
//! Eviction always demotes to the next tier; the cache itself never drops
//! content. Whatever the archive does with what it receives is up to it.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use memvault_core::path::join;
use memvault_core::Result;
use parking_lot::Mutex;
use tracing::debug;

use crate::store::BlobStore;

/// Slow backing tier below `cold`
#[async_trait]
pub trait ArchiveTier: Send + Sync {
    /// Value for `key`, if archived
    async fn load(&self, key: &str) -> Result<Option<String>>;

    /// Archive a value
    async fn store(&self, key: &str, value: String) -> Result<()>;

    /// Forget `key`; a no-op when absent
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Tier a cached key currently occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Most recently used entries
    Hot,
    /// Entries demoted from hot
    Cold,
}

/// Hot/cold LRU pair backed by an archive tier
pub struct TieredCache {
    hot: LruCache<String, String>,
    cold: LruCache<String, String>,
    archive: Box<dyn ArchiveTier>,
}

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

impl TieredCache {
    /// Create a cache; capacities below 1 are raised to 1
    pub fn new(hot: usize, cold: usize, archive: Box<dyn ArchiveTier>) -> Self {
        TieredCache {
            hot: LruCache::new(capacity(hot)),
            cold: LruCache::new(capacity(cold)),
            archive,
        }
    }

    /// Look up `key`, promoting it to hot when found in a lower tier
    pub async fn load(&mut self, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.hot.get(key) {
            return Ok(Some(value.clone()));
        }

        if let Some(value) = self.cold.pop(key) {
            self.promote(key.to_string(), value.clone()).await?;
            return Ok(Some(value));
        }

        match self.archive.load(key).await? {
            Some(value) => {
                self.archive.remove(key).await?;
                debug!(key, "Promoted from archive tier");
                self.promote(key.to_string(), value.clone()).await?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Insert or refresh `key` in hot
    pub async fn store(&mut self, key: &str, value: String) -> Result<()> {
        self.cold.pop(key);
        self.archive.remove(key).await?;
        self.promote(key.to_string(), value).await
    }

    /// Drop `key` from every tier
    pub async fn invalidate(&mut self, key: &str) -> Result<()> {
        self.hot.pop(key);
        self.cold.pop(key);
        self.archive.remove(key).await
    }

    /// Tier holding `key` in memory, without touching recency
    pub fn tier_of(&self, key: &str) -> Option<Tier> {
        if self.hot.contains(key) {
            Some(Tier::Hot)
        } else if self.cold.contains(key) {
            Some(Tier::Cold)
        } else {
            None
        }
    }

    /// Hot keys, most recent first
    pub fn hot_keys(&self) -> Vec<String> {
        self.hot.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Cold keys, most recent first
    pub fn cold_keys(&self) -> Vec<String> {
        self.cold.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Drop both in-memory tiers without demoting
    pub fn clear_memory(&mut self) {
        self.hot.clear();
        self.cold.clear();
    }

    async fn promote(&mut self, key: String, value: String) -> Result<()> {
        // `push` hands back the old pair when the key was already present.
        if let Some((evicted, old)) = self.hot.push(key.clone(), value) {
            if evicted != key {
                self.demote(evicted, old).await?;
            }
        }
        Ok(())
    }

    async fn demote(&mut self, key: String, value: String) -> Result<()> {
        if let Some((evicted, old)) = self.cold.push(key.clone(), value) {
            if evicted != key {
                debug!(key = %evicted, "Demoted to archive tier");
                self.archive.store(&evicted, old).await?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Archive tiers
// ============================================================================

/// Archive tier kept in memory, shareable with tests through `Arc`
#[derive(Debug, Default, Clone)]
pub struct MemoryArchive {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryArchive {
    /// Empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Archived keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl ArchiveTier for MemoryArchive {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn store(&self, key: &str, value: String) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Archive tier persisted in a blob store under a prefix
pub struct BlobArchive {
    store: Arc<dyn BlobStore>,
    prefix: String,
}

impl BlobArchive {
    /// Archive under `prefix` (e.g. `cache`)
    pub fn new(store: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        BlobArchive {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        join(&self.prefix, key)
    }
}

#[async_trait]
impl ArchiveTier for BlobArchive {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        match self.store.read_string(&self.key(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn store(&self, key: &str, value: String) -> Result<()> {
        self.store.write(&self.key(key), value.as_bytes()).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.store.delete(&self.key(key)).await?;
        Ok(())
    }
}
