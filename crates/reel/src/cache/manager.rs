use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::disk::{DiskStore, Sidecar};
use super::key::{CacheKey, CacheMetadata, CachedResponse};
use crate::ReelError;
use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct IndexEntry {
    digest: String,
    size: u64,
    metadata: CacheMetadata,
    last_access: u64,
}

/// Two-tier byte-range response cache shared by the preloader and players.
///
/// The memory tier is a size-weighted `moka` cache; the disk tier keeps one
/// body file plus a JSON sidecar per key and is re-indexed on open.
pub struct CacheManager {
    memory: Cache<CacheKey, CachedResponse>,
    disk: DiskStore,
    index: Mutex<HashMap<CacheKey, IndexEntry>>,
    clock: AtomicU64,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("dir", &self.disk.dir())
            .field("entries", &self.index.lock().len())
            .finish()
    }
}

impl CacheManager {
    pub async fn open(config: CacheConfig) -> Result<Self, ReelError> {
        let memory = Cache::builder()
            .max_capacity(config.memory_capacity)
            .weigher(|_key: &CacheKey, value: &CachedResponse| -> u32 {
                u32::try_from(value.body.len()).unwrap_or(u32::MAX)
            })
            .build();

        let disk = DiskStore::open(&config.cache_dir).await?;
        let mut scanned = disk.scan().await?;
        scanned.sort_by_key(|entry| entry.sidecar.metadata.stored_at);

        let mut index = HashMap::with_capacity(scanned.len());
        for (seq, entry) in scanned.into_iter().enumerate() {
            index.insert(
                entry.sidecar.key,
                IndexEntry {
                    digest: entry.digest,
                    size: entry.body_len,
                    metadata: entry.sidecar.metadata,
                    last_access: seq as u64,
                },
            );
        }

        let clock = AtomicU64::new(index.len() as u64);
        let manager = Self {
            memory,
            disk,
            index: Mutex::new(index),
            clock,
        };

        let entries = manager.len();
        let disk_bytes = manager.disk_usage();
        info!(
            dir = %config.cache_dir.display(),
            entries,
            disk_bytes,
            "Opened response cache"
        );
        Ok(manager)
    }

    pub fn dir(&self) -> &Path {
        self.disk.dir()
    }

    fn touch(&self, key: &CacheKey) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        if let Some(entry) = self.index.lock().get_mut(key) {
            entry.last_access = tick;
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Result<Option<CachedResponse>, ReelError> {
        if let Some(hit) = self.memory.get(key).await {
            self.touch(key);
            return Ok(Some(hit));
        }

        let Some(entry) = self.index.lock().get(key).cloned() else {
            return Ok(None);
        };

        match self.disk.read_body(&entry.digest).await? {
            Some(body) => {
                let response = CachedResponse::new(body, entry.metadata);
                self.memory.insert(key.clone(), response.clone()).await;
                self.touch(key);
                debug!(key = %key, size = entry.size, "Loaded cached response from disk");
                Ok(Some(response))
            }
            None => {
                warn!(key = %key, "Cached body vanished from disk, dropping entry");
                self.index.lock().remove(key);
                self.disk.remove(&entry.digest).await?;
                Ok(None)
            }
        }
    }

    /// The longest cached response covering the head of `url`.
    pub async fn get_prefix(&self, url: &str) -> Result<Option<CachedResponse>, ReelError> {
        let best = {
            let index = self.index.lock();
            index
                .iter()
                .filter(|(key, _)| key.url == url && key.starts_at_zero())
                .max_by_key(|(_, entry)| entry.size)
                .map(|(key, _)| key.clone())
        };

        match best {
            Some(key) => self.get(&key).await,
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.lock().contains_key(key)
    }

    pub async fn put(&self, key: CacheKey, response: CachedResponse) -> Result<(), ReelError> {
        let digest = key.digest();
        let sidecar = Sidecar {
            key: key.clone(),
            metadata: response.metadata.clone(),
        };
        self.disk.write(&digest, &sidecar, &response.body).await?;

        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        self.index.lock().insert(
            key.clone(),
            IndexEntry {
                digest,
                size: response.body.len() as u64,
                metadata: response.metadata.clone(),
                last_access: tick,
            },
        );
        debug!(key = %key, size = response.body.len(), "Stored response in cache");
        self.memory.insert(key, response).await;
        Ok(())
    }

    pub async fn remove(&self, key: &CacheKey) -> Result<bool, ReelError> {
        self.memory.invalidate(key).await;
        let removed = self.index.lock().remove(key);
        match removed {
            Some(entry) => {
                self.disk.remove(&entry.digest).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn remove_all(&self) -> Result<(), ReelError> {
        self.memory.invalidate_all();
        self.index.lock().clear();
        self.disk.remove_all().await?;
        info!(dir = %self.disk.dir().display(), "Removed all cached responses");
        Ok(())
    }

    /// Bytes held by body files on disk.
    pub fn disk_usage(&self) -> u64 {
        self.index.lock().values().map(|entry| entry.size).sum()
    }

    /// Weighted size of the memory tier after pending maintenance.
    pub async fn memory_usage(&self) -> u64 {
        self.memory.run_pending_tasks().await;
        self.memory.weighted_size()
    }

    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    /// Evict least recently used entries until disk usage is at most `budget`.
    ///
    /// Returns the evicted keys, oldest first.
    pub async fn evict_lru_to(&self, budget: u64) -> Result<Vec<CacheKey>, ReelError> {
        let victims = {
            let index = self.index.lock();
            let mut usage: u64 = index.values().map(|entry| entry.size).sum();
            if usage <= budget {
                return Ok(Vec::new());
            }

            let mut by_age: Vec<_> = index
                .iter()
                .map(|(key, entry)| (entry.last_access, entry.size, key.clone()))
                .collect();
            by_age.sort_by_key(|(last_access, _, _)| *last_access);

            let mut victims = Vec::new();
            for (_, size, key) in by_age {
                if usage <= budget {
                    break;
                }
                usage = usage.saturating_sub(size);
                victims.push(key);
            }
            victims
        };

        for key in &victims {
            self.remove(key).await?;
        }

        info!(evicted = victims.len(), budget, "Evicted least recently used cache entries");
        Ok(victims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::ByteRange;
    use bytes::Bytes;

    fn config(dir: &Path) -> CacheConfig {
        CacheConfig {
            cache_dir: dir.to_path_buf(),
            memory_capacity: 1024 * 1024,
        }
    }

    fn response(len: usize) -> CachedResponse {
        CachedResponse::new(
            Bytes::from(vec![7u8; len]),
            CacheMetadata::new(len as u64).with_status(206),
        )
    }

    #[tokio::test]
    async fn put_then_get_round_trips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::open(config(dir.path())).await.unwrap();
        let key = CacheKey::new("https://cdn/a.mp4", Some(ByteRange::prefix(100)));

        cache.put(key.clone(), response(100)).await.unwrap();

        let hit = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(hit.body.len(), 100);
        assert!(hit.is_partial());
        assert_eq!(cache.disk_usage(), 100);
        assert!(cache.get(&CacheKey::new("https://cdn/a.mp4", None)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reopen_reindexes_disk_entries() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new("https://cdn/b.mp4", Some(ByteRange::prefix(64)));
        {
            let cache = CacheManager::open(config(dir.path())).await.unwrap();
            cache.put(key.clone(), response(64)).await.unwrap();
        }

        let reopened = CacheManager::open(config(dir.path())).await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.disk_usage(), 64);
        let hit = reopened.get(&key).await.unwrap().unwrap();
        assert_eq!(hit.metadata.status, 206);
    }

    #[tokio::test]
    async fn prefix_lookup_prefers_longest_head() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::open(config(dir.path())).await.unwrap();
        let url = "https://cdn/c.mp4";
        cache
            .put(CacheKey::new(url, Some(ByteRange::prefix(16))), response(16))
            .await
            .unwrap();
        cache
            .put(CacheKey::new(url, Some(ByteRange::prefix(48))), response(48))
            .await
            .unwrap();
        let tail = ByteRange {
            start: 1000,
            end: None,
        };
        cache
            .put(CacheKey::new(url, Some(tail)), response(500))
            .await
            .unwrap();

        let head = cache.get_prefix(url).await.unwrap().unwrap();
        assert_eq!(head.body.len(), 48);
        assert!(cache.get_prefix("https://cdn/other.mp4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lru_eviction_keeps_recently_used() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::open(config(dir.path())).await.unwrap();
        let a = CacheKey::new("https://cdn/a.mp4", None);
        let b = CacheKey::new("https://cdn/b.mp4", None);
        let c = CacheKey::new("https://cdn/c.mp4", None);
        cache.put(a.clone(), response(100)).await.unwrap();
        cache.put(b.clone(), response(100)).await.unwrap();
        cache.put(c.clone(), response(100)).await.unwrap();

        // a becomes the most recently used
        cache.get(&a).await.unwrap();

        let evicted = cache.evict_lru_to(150).await.unwrap();
        assert_eq!(evicted, vec![b.clone(), c.clone()]);
        assert!(cache.contains(&a));
        assert_eq!(cache.disk_usage(), 100);
        assert!(cache.evict_lru_to(150).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_all_clears_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::open(config(dir.path())).await.unwrap();
        let key = CacheKey::new("https://cdn/d.mp4", None);
        cache.put(key.clone(), response(32)).await.unwrap();

        cache.remove_all().await.unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.disk_usage(), 0);
        assert!(cache.get(&key).await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
