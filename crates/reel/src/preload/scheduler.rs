//! Look-ahead preloading of feed items into the shared cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::fetcher::RangeFetcher;
use super::status::{PreloadPriority, PreloadStatus};
use super::window::preload_window;
use crate::cache::{ByteRange, CacheKey, CacheManager, CacheMetadata, CachedResponse};
use crate::config::{CachePurgePolicy, MIB, PreloadConfig};
use crate::metrics::ReelMetrics;
use crate::{MediaId, ReelError};

struct PreloadEntry {
    url: String,
    status: PreloadStatus,
    priority: PreloadPriority,
    generation: u64,
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl PreloadEntry {
    fn cancel(self) {
        if let Some(token) = self.token {
            token.cancel();
        }
    }
}

#[derive(Default)]
struct PreloadState {
    entries: HashMap<MediaId, PreloadEntry>,
    next_generation: u64,
}

impl PreloadState {
    /// Cancel and forget every loading entry; completed entries stay.
    fn cancel_all(&mut self, metrics: &ReelMetrics) -> usize {
        let loading: Vec<MediaId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.status == PreloadStatus::Loading)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &loading {
            if let Some(entry) = self.entries.remove(id) {
                entry.cancel();
                metrics.record_preload_cancelled();
            }
        }
        loading.len()
    }
}

/// Warms the head of upcoming feed items.
///
/// Each item gets at most one in-flight range request; completed items are
/// not fetched again until the cache is cleared or purged.
pub struct PreloadScheduler {
    config: PreloadConfig,
    fetcher: Arc<dyn RangeFetcher>,
    cache: Arc<CacheManager>,
    metrics: Arc<ReelMetrics>,
    state: Arc<Mutex<PreloadState>>,
}

impl std::fmt::Debug for PreloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadScheduler")
            .field("config", &self.config)
            .field("entries", &self.state.lock().entries.len())
            .finish()
    }
}

impl PreloadScheduler {
    pub fn new(
        config: PreloadConfig,
        fetcher: Arc<dyn RangeFetcher>,
        cache: Arc<CacheManager>,
        metrics: Arc<ReelMetrics>,
    ) -> Self {
        Self {
            config,
            fetcher,
            cache,
            metrics,
            state: Arc::new(Mutex::new(PreloadState::default())),
        }
    }

    pub fn config(&self) -> &PreloadConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Re-target preloading at the items following `current_index`.
    ///
    /// Every scheduled preload is cancelled first. Returns the ids of the
    /// look-ahead window, nearest first, whether or not they needed a fetch.
    pub fn preload_videos<T: AsRef<str>>(&self, feed: &[T], current_index: usize) -> Vec<MediaId> {
        let cancelled = self.cancel_all_preloads();
        let window = preload_window(feed.len(), current_index, self.config.preload_count);
        debug!(current_index, cancelled, window = window.len(), "Re-targeting preloads");

        window
            .into_iter()
            .map(|(index, priority)| {
                let id = MediaId::new(&feed[index]);
                self.preload_video_with_priority(id.clone(), priority);
                id
            })
            .collect()
    }

    /// Start warming `id` unless it is already loading or completed.
    ///
    /// Returns whether a new fetch was started.
    pub fn preload_video(&self, id: impl Into<MediaId>) -> bool {
        self.preload_video_with_priority(id, PreloadPriority::High)
    }

    pub fn preload_video_with_priority(&self, id: impl Into<MediaId>, priority: PreloadPriority) -> bool {
        let id = id.into();
        let url = match id.to_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(id = %id, error = %e, "Skipping preload of invalid identifier");
                return false;
            }
        };

        let mut state = self.state.lock();
        if state.entries.get(&id).is_some_and(|entry| entry.status.is_settled()) {
            trace!(id = %id, "Preload already loading or completed");
            return false;
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let token = CancellationToken::new();
        let job = PreloadJob {
            id: id.clone(),
            url: url.clone(),
            range: ByteRange::prefix(self.config.max_preload_bytes),
            generation,
            token: token.clone(),
            fetcher: self.fetcher.clone(),
            cache: self.cache.clone(),
            metrics: self.metrics.clone(),
            state: self.state.clone(),
        };
        let task = tokio::spawn(job.run());

        debug!(id = %id, %priority, "Preload started");
        self.metrics.record_preload_started();
        state.entries.insert(
            id,
            PreloadEntry {
                url: url.as_str().to_string(),
                status: PreloadStatus::Loading,
                priority,
                generation,
                token: Some(token),
                task: Some(task),
            },
        );
        true
    }

    /// Cancel every in-flight preload and stop tracking it. Completed
    /// entries are kept.
    pub fn cancel_all_preloads(&self) -> usize {
        self.state.lock().cancel_all(&self.metrics)
    }

    pub fn cancel_preload(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        let loading = state
            .entries
            .get(id)
            .is_some_and(|entry| entry.status == PreloadStatus::Loading);
        if !loading {
            return false;
        }
        if let Some(entry) = state.entries.remove(id) {
            entry.cancel();
        }
        self.metrics.record_preload_cancelled();
        debug!(id, "Preload cancelled");
        true
    }

    pub fn is_preloaded(&self, id: &str) -> bool {
        self.status(id) == PreloadStatus::Completed
    }

    pub fn status(&self, id: &str) -> PreloadStatus {
        self.state
            .lock()
            .entries
            .get(id)
            .map_or(PreloadStatus::NotStarted, |entry| entry.status)
    }

    pub fn priority(&self, id: &str) -> Option<PreloadPriority> {
        self.state.lock().entries.get(id).map(|entry| entry.priority)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|entry| entry.status == PreloadStatus::Loading)
            .count()
    }

    /// Disk usage of the shared cache in MiB.
    pub fn cache_size_mb(&self) -> f64 {
        self.cache.disk_usage() as f64 / MIB as f64
    }

    /// Cancel everything, drop every cached response and forget all entries.
    pub async fn clear_cache(&self) -> Result<(), ReelError> {
        {
            let mut state = self.state.lock();
            state.cancel_all(&self.metrics);
            state.entries.clear();
        }
        self.cache.remove_all().await?;
        info!("Preload cache cleared");
        Ok(())
    }

    /// Purge the cache once disk usage exceeds `max_cache_bytes`.
    ///
    /// Returns whether anything was purged.
    pub async fn cleanup_expired_cache(&self) -> Result<bool, ReelError> {
        let usage = self.cache.disk_usage();
        let budget = self.config.max_cache_bytes;
        if usage <= budget {
            trace!(usage, budget, "Cache within budget");
            return Ok(false);
        }

        match self.config.purge_policy {
            CachePurgePolicy::Full => {
                self.cache.remove_all().await?;
                self.state
                    .lock()
                    .entries
                    .retain(|_, entry| entry.status != PreloadStatus::Completed);
                info!(usage, budget, "Cache over budget, purged everything");
            }
            CachePurgePolicy::Lru => {
                let evicted = self.cache.evict_lru_to(budget).await?;
                let mut state = self.state.lock();
                for key in &evicted {
                    state.entries.retain(|_, entry| {
                        entry.status != PreloadStatus::Completed || entry.url != key.url
                    });
                }
                info!(usage, budget, evicted = evicted.len(), "Cache over budget, evicted oldest entries");
            }
        }
        Ok(true)
    }

    /// Wait for every in-flight preload task to finish.
    pub async fn wait_idle(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut state = self.state.lock();
            state
                .entries
                .values_mut()
                .filter_map(|entry| entry.task.take())
                .collect()
        };
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Preload task panicked");
            }
        }
    }
}

impl Drop for PreloadScheduler {
    fn drop(&mut self) {
        self.state.lock().cancel_all(&self.metrics);
    }
}

struct PreloadJob {
    id: MediaId,
    url: Url,
    range: ByteRange,
    generation: u64,
    token: CancellationToken,
    fetcher: Arc<dyn RangeFetcher>,
    cache: Arc<CacheManager>,
    metrics: Arc<ReelMetrics>,
    state: Arc<Mutex<PreloadState>>,
}

impl PreloadJob {
    async fn run(self) {
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ReelError::Cancelled),
            result = self.load() => result,
        };

        let mut state = self.state.lock();
        let current = state.entries.get(&self.id).is_some_and(|entry| {
            entry.generation == self.generation && entry.status == PreloadStatus::Loading
        });
        if !current {
            return;
        }

        let outcome = match result {
            Ok(fetched) => {
                self.metrics.record_preload_completed(fetched);
                info!(id = %self.id, fetched, "Preload completed");
                PreloadStatus::Completed
            }
            Err(e) if e.is_cancelled() => {
                self.metrics.record_preload_cancelled();
                PreloadStatus::Cancelled
            }
            Err(e) => {
                self.metrics.record_preload_failed();
                warn!(id = %self.id, error = %e, "Preload failed");
                PreloadStatus::Failed
            }
        };

        if outcome == PreloadStatus::Completed {
            if let Some(entry) = state.entries.get_mut(&self.id) {
                entry.status = outcome;
                entry.token = None;
                entry.task = None;
            }
        } else {
            // a failed or cancelled item may be requested again from scratch
            state.entries.remove(&self.id);
            debug!(id = %self.id, status = %outcome, "Preload retired");
        }
    }

    /// Bytes fetched from the network; zero when the cache already held the range.
    async fn load(&self) -> Result<u64, ReelError> {
        let key = CacheKey::new(self.url.as_str(), Some(self.range));
        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                self.metrics.record_cache_hit();
                debug!(id = %self.id, size = hit.body.len(), "Preload served from cache");
                return Ok(0);
            }
            Ok(None) => self.metrics.record_cache_miss(),
            Err(e) => {
                warn!(id = %self.id, error = %e, "Cache lookup failed, fetching");
                self.metrics.record_cache_miss();
            }
        }

        let response = self
            .fetcher
            .fetch_range(&self.url, self.range, &self.token)
            .await?;
        if self.token.is_cancelled() {
            return Err(ReelError::Cancelled);
        }

        let fetched = response.body.len() as u64;
        let metadata = CacheMetadata::new(fetched)
            .with_status(response.status)
            .with_content_type(response.content_type)
            .with_content_range(response.content_range);
        self.cache
            .put(key, CachedResponse::new(response.body, metadata))
            .await?;
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::test_support::{FetchScript, ScriptedFetcher};

    const A: &str = "https://cdn.example.com/a.mp4";
    const B: &str = "https://cdn.example.com/b.mp4";
    const C: &str = "https://cdn.example.com/c.mp4";
    const D: &str = "https://cdn.example.com/d.mp4";

    async fn scheduler(
        dir: &tempfile::TempDir,
        config: PreloadConfig,
    ) -> (PreloadScheduler, Arc<ScriptedFetcher>, Arc<ReelMetrics>) {
        let cache = CacheManager::open(CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            memory_capacity: MIB,
        })
        .await
        .unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let metrics = Arc::new(ReelMetrics::new());
        let scheduler =
            PreloadScheduler::new(config, fetcher.clone(), Arc::new(cache), metrics.clone());
        (scheduler, fetcher, metrics)
    }

    fn small_config(purge_policy: CachePurgePolicy) -> PreloadConfig {
        PreloadConfig {
            preload_count: 2,
            max_preload_bytes: 1024,
            max_cache_bytes: 1500,
            purge_policy,
        }
    }

    #[tokio::test]
    async fn duplicate_requests_share_one_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fetcher, metrics) = scheduler(&dir, PreloadConfig::default()).await;

        assert!(scheduler.preload_video(A));
        assert!(!scheduler.preload_video(A));
        assert_eq!(scheduler.in_flight_count(), 1);

        scheduler.wait_idle().await;
        assert!(scheduler.is_preloaded(A));
        assert!(!scheduler.preload_video(A));
        assert_eq!(fetcher.request_count(A), 1);
        assert_eq!(fetcher.requests()[0].1.header_value(), "bytes=0-10485759");
        assert_eq!(metrics.snapshot().preloads_completed, 1);
    }

    #[tokio::test]
    async fn window_moves_with_the_current_index() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fetcher, _metrics) = scheduler(&dir, PreloadConfig::default()).await;
        let feed = [A, B, C, D];
        fetcher.hold();

        let first = scheduler.preload_videos(&feed, 0);
        assert_eq!(first, vec![MediaId::from(B), MediaId::from(C)]);
        assert_eq!(scheduler.priority(B), Some(PreloadPriority::High));
        assert_eq!(scheduler.priority(C), Some(PreloadPriority::Medium));
        assert_eq!(scheduler.in_flight_count(), 2);

        let second = scheduler.preload_videos(&feed, 1);
        assert_eq!(second, vec![MediaId::from(C), MediaId::from(D)]);
        assert_eq!(scheduler.status(B), PreloadStatus::NotStarted);
        assert_eq!(scheduler.priority(B), None);
        assert_eq!(scheduler.status(C), PreloadStatus::Loading);
        assert_eq!(scheduler.status(D), PreloadStatus::Loading);
        assert_eq!(scheduler.in_flight_count(), 2);

        fetcher.release();
        scheduler.wait_idle().await;
        assert!(!scheduler.is_preloaded(A));
        assert!(!scheduler.is_preloaded(B));
        assert!(scheduler.is_preloaded(C));
        assert!(scheduler.is_preloaded(D));
    }

    #[tokio::test]
    async fn failed_preload_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fetcher, metrics) = scheduler(&dir, PreloadConfig::default()).await;
        fetcher.script(A, FetchScript::Status(503));

        scheduler.preload_video(A);
        scheduler.wait_idle().await;
        assert_eq!(scheduler.status(A), PreloadStatus::NotStarted);
        assert_eq!(scheduler.state.lock().entries.len(), 0);
        assert_eq!(metrics.snapshot().preloads_failed, 1);

        fetcher.script(A, FetchScript::Body(512));
        assert!(scheduler.preload_video(A));
        scheduler.wait_idle().await;
        assert!(scheduler.is_preloaded(A));
    }

    #[tokio::test]
    async fn cancel_stops_a_hanging_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fetcher, metrics) = scheduler(&dir, PreloadConfig::default()).await;
        fetcher.script(A, FetchScript::Hang);

        scheduler.preload_video(A);
        tokio::task::yield_now().await;
        assert!(scheduler.cancel_preload(A));
        assert!(!scheduler.cancel_preload(A));
        assert_eq!(scheduler.status(A), PreloadStatus::NotStarted);
        assert_eq!(scheduler.in_flight_count(), 0);

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while fetcher.in_flight() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(metrics.snapshot().preloads_cancelled, 1);
    }

    #[tokio::test]
    async fn scrolling_only_tracks_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fetcher, _metrics) = scheduler(&dir, PreloadConfig::default()).await;
        let feed: Vec<String> = (0..50)
            .map(|i| format!("https://cdn.example.com/{i}.mp4"))
            .collect();
        fetcher.hold();

        for index in 0..48 {
            scheduler.preload_videos(&feed, index);
        }

        assert_eq!(scheduler.state.lock().entries.len(), 2);
        assert_eq!(scheduler.in_flight_count(), 2);
        assert_eq!(scheduler.status(&feed[1]), PreloadStatus::NotStarted);
        assert_eq!(scheduler.status(&feed[48]), PreloadStatus::Loading);
        assert_eq!(scheduler.status(&feed[49]), PreloadStatus::Loading);
        fetcher.release();
    }

    #[tokio::test]
    async fn invalid_identifier_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fetcher, metrics) = scheduler(&dir, PreloadConfig::default()).await;

        assert!(!scheduler.preload_video("ftp://cdn.example.com/a.mp4"));
        assert_eq!(scheduler.status("ftp://cdn.example.com/a.mp4"), PreloadStatus::NotStarted);
        assert!(fetcher.requests().is_empty());
        assert_eq!(metrics.snapshot().preloads_started, 0);
    }

    #[tokio::test]
    async fn cached_range_is_not_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fetcher, metrics) = scheduler(&dir, small_config(CachePurgePolicy::Full)).await;

        scheduler.preload_video(A);
        scheduler.wait_idle().await;
        scheduler.cancel_all_preloads();
        {
            scheduler.state.lock().entries.clear();
        }

        scheduler.preload_video(A);
        scheduler.wait_idle().await;
        assert!(scheduler.is_preloaded(A));
        assert_eq!(fetcher.request_count(A), 1);
        assert_eq!(metrics.snapshot().cache_hits, 1);
    }

    #[tokio::test]
    async fn full_purge_forgets_every_completed_item() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _fetcher, _metrics) = scheduler(&dir, small_config(CachePurgePolicy::Full)).await;

        scheduler.preload_video(A);
        scheduler.wait_idle().await;
        assert!(!scheduler.cleanup_expired_cache().await.unwrap());

        scheduler.preload_video(B);
        scheduler.wait_idle().await;
        assert_eq!(scheduler.cache_size_mb(), 2048.0 / MIB as f64);

        assert!(scheduler.cleanup_expired_cache().await.unwrap());
        assert_eq!(scheduler.cache_size_mb(), 0.0);
        assert!(!scheduler.is_preloaded(A));
        assert!(!scheduler.is_preloaded(B));
    }

    #[tokio::test]
    async fn lru_purge_forgets_only_evicted_items() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _fetcher, _metrics) = scheduler(&dir, small_config(CachePurgePolicy::Lru)).await;

        scheduler.preload_video(A);
        scheduler.wait_idle().await;
        scheduler.preload_video(B);
        scheduler.wait_idle().await;

        assert!(scheduler.cleanup_expired_cache().await.unwrap());
        assert!(!scheduler.is_preloaded(A));
        assert!(scheduler.is_preloaded(B));
        assert_eq!(scheduler.cache().disk_usage(), 1024);
    }

    #[tokio::test]
    async fn clear_cache_resets_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fetcher, _metrics) = scheduler(&dir, small_config(CachePurgePolicy::Full)).await;
        fetcher.script(B, FetchScript::Hang);

        scheduler.preload_video(A);
        scheduler.wait_idle().await;
        scheduler.preload_video(B);

        scheduler.clear_cache().await.unwrap();
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(scheduler.status(A), PreloadStatus::NotStarted);
        assert!(scheduler.cache().is_empty());
    }
}
