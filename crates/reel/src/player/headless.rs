//! A media backend without a platform player.
//!
//! Items resolve by probing the head of the file (from the shared cache when a
//! preload already fetched it, otherwise with a range request) and then play
//! on a simulated clock.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::backend::{ItemStatus, MediaBackend, MediaItem, SeekTolerance, VideoSize, VideoTrack};
use super::observe::{EventSink, ItemEvent, ObservedProperty, ObserverSet, Subscription};
use crate::cache::{ByteRange, CacheKey, CacheManager, CacheMetadata, CachedResponse};
use crate::config::HeadlessConfig;
use crate::metrics::ReelMetrics;
use crate::preload::RangeFetcher;
use crate::{MediaId, ReelError};

type Resolution = Option<Result<Option<VideoTrack>, String>>;

pub struct HeadlessBackend {
    config: HeadlessConfig,
    fetcher: Arc<dyn RangeFetcher>,
    cache: Arc<CacheManager>,
    metrics: Arc<ReelMetrics>,
}

impl HeadlessBackend {
    pub fn new(
        config: HeadlessConfig,
        fetcher: Arc<dyn RangeFetcher>,
        cache: Arc<CacheManager>,
        metrics: Arc<ReelMetrics>,
    ) -> Self {
        Self {
            config,
            fetcher,
            cache,
            metrics,
        }
    }
}

impl MediaBackend for HeadlessBackend {
    fn create_item(&self, id: &MediaId) -> Result<Arc<dyn MediaItem>, ReelError> {
        let url = id.to_url()?;
        let item = HeadlessItem::new(id.clone(), self.config.tick);

        let loader = Loader {
            url,
            probe_bytes: self.config.probe_bytes.max(1),
            fetcher: self.fetcher.clone(),
            cache: self.cache.clone(),
            metrics: self.metrics.clone(),
            token: item.token.clone(),
        };
        let weak = Arc::downgrade(&item);
        tokio::spawn(async move {
            let result = loader.load().await;
            if let Some(item) = weak.upgrade() {
                item.finish_loading(result);
            }
        });

        Ok(item)
    }
}

struct Loader {
    url: Url,
    probe_bytes: u64,
    fetcher: Arc<dyn RangeFetcher>,
    cache: Arc<CacheManager>,
    metrics: Arc<ReelMetrics>,
    token: CancellationToken,
}

impl Loader {
    async fn head(&self) -> Result<Bytes, ReelError> {
        match self.cache.get_prefix(self.url.as_str()).await {
            Ok(Some(hit)) => {
                self.metrics.record_cache_hit();
                debug!(url = %self.url, size = hit.body.len(), "Probing cached head");
                return Ok(hit.body);
            }
            Ok(None) => self.metrics.record_cache_miss(),
            Err(e) => {
                warn!(url = %self.url, error = %e, "Cache lookup failed, fetching head");
                self.metrics.record_cache_miss();
            }
        }

        let range = ByteRange::prefix(self.probe_bytes);
        let response = self.fetcher.fetch_range(&self.url, range, &self.token).await?;
        let metadata = CacheMetadata::new(response.body.len() as u64)
            .with_status(response.status)
            .with_content_type(response.content_type.clone())
            .with_content_range(response.content_range.clone());
        let key = CacheKey::new(self.url.as_str(), Some(range));
        if let Err(e) = self
            .cache
            .put(key, CachedResponse::new(response.body.clone(), metadata))
            .await
        {
            warn!(url = %self.url, error = %e, "Failed to cache fetched head");
        }
        Ok(response.body)
    }

    async fn load(&self) -> Result<mp4::MovieInfo, ReelError> {
        let head = self.head().await?;
        Ok(mp4::probe_movie(&head)?)
    }
}

#[derive(Debug, Default)]
struct ItemState {
    status: ItemStatus,
    position: f64,
    duration: Option<f64>,
    playing: bool,
    muted: bool,
    presentation_size: VideoSize,
}

/// A media item playing on a simulated clock.
pub struct HeadlessItem {
    this: Weak<HeadlessItem>,
    id: MediaId,
    tick: Duration,
    observers: ObserverSet,
    state: Mutex<ItemState>,
    resolution: watch::Sender<Resolution>,
    clock: Mutex<Option<AbortHandle>>,
    token: CancellationToken,
}

impl HeadlessItem {
    fn new(id: MediaId, tick: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let (resolution, _) = watch::channel(None);
            Self {
                this: this.clone(),
                id,
                tick: tick.max(Duration::from_millis(1)),
                observers: ObserverSet::new(),
                state: Mutex::new(ItemState::default()),
                resolution,
                clock: Mutex::new(None),
                token: CancellationToken::new(),
            }
        })
    }

    fn finish_loading(&self, result: Result<mp4::MovieInfo, ReelError>) {
        match result {
            Ok(movie) => {
                let track = movie.video_track().map(|track| VideoTrack {
                    natural_size: VideoSize::new(track.width, track.height),
                    transform: track.matrix,
                });
                let presentation = track.map(|t| t.natural_size).unwrap_or(VideoSize::ZERO);
                {
                    let mut state = self.state.lock();
                    state.status = ItemStatus::Ready;
                    state.duration = movie.duration;
                    state.presentation_size = presentation;
                }
                info!(
                    id = %self.id,
                    duration = movie.duration.unwrap_or_default(),
                    tracks = movie.tracks.len(),
                    "Item ready"
                );
                self.resolution.send_replace(Some(Ok(track)));
                self.observers.emit(ItemEvent::Status(ItemStatus::Ready));
                self.observers.emit(ItemEvent::LikelyToKeepUp(true));
                if !presentation.is_zero() {
                    self.observers.emit(ItemEvent::PresentationSize(presentation));
                }
            }
            Err(e) => {
                warn!(id = %self.id, error = %e, "Item failed to load");
                self.state.lock().status = ItemStatus::Failed;
                self.resolution.send_replace(Some(Err(e.to_string())));
                self.observers.emit(ItemEvent::Status(ItemStatus::Failed));
            }
        }
    }

    fn ensure_clock(&self) {
        let mut clock = self.clock.lock();
        if clock.is_some() {
            return;
        }

        let weak = self.this.clone();
        let tick = self.tick;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(item) = weak.upgrade() else {
                    break;
                };
                if !item.advance() && item.retire_clock() {
                    break;
                }
            }
        });
        *clock = Some(task.abort_handle());
    }

    /// Clears the clock slot unless playback was restarted meanwhile.
    /// Holding the slot lock orders this against `ensure_clock`.
    fn retire_clock(&self) -> bool {
        let mut clock = self.clock.lock();
        if self.state.lock().playing {
            return false;
        }
        *clock = None;
        true
    }

    /// One clock step. Returns false once the clock should stop.
    fn advance(&self) -> bool {
        let (position, duration, ended) = {
            let mut state = self.state.lock();
            if !state.playing {
                return false;
            }
            if state.status != ItemStatus::Ready {
                return true;
            }
            state.position += self.tick.as_secs_f64();
            let ended = match state.duration {
                Some(duration) if state.position >= duration => {
                    state.position = duration;
                    state.playing = false;
                    true
                }
                _ => false,
            };
            (state.position, state.duration, ended)
        };

        self.observers.advance_periodic(self.tick, position, duration);
        if ended {
            debug!(id = %self.id, "Played to end");
            self.observers.emit(ItemEvent::PlayedToEnd);
        }
        !ended
    }
}

impl Drop for HeadlessItem {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.clock.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl MediaItem for HeadlessItem {
    fn id(&self) -> &MediaId {
        &self.id
    }

    fn status(&self) -> ItemStatus {
        self.state.lock().status
    }

    fn current_time(&self) -> f64 {
        self.state.lock().position
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }

    fn play(&self) {
        self.state.lock().playing = true;
        if tokio::runtime::Handle::try_current().is_ok() {
            self.ensure_clock();
        } else {
            warn!(id = %self.id, "No runtime to drive playback clock");
        }
    }

    fn pause(&self) {
        self.state.lock().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn seek(&self, seconds: f64, _tolerance: SeekTolerance) {
        let mut state = self.state.lock();
        let upper = state.duration.unwrap_or(f64::INFINITY);
        state.position = if seconds.is_finite() {
            seconds.clamp(0.0, upper)
        } else {
            0.0
        };
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    fn presentation_size(&self) -> VideoSize {
        self.state.lock().presentation_size
    }

    fn observe(&self, property: ObservedProperty, sink: EventSink) -> Subscription {
        self.observers.observe(property, sink)
    }

    fn observe_periodic_time(&self, interval: Duration, sink: EventSink) -> Subscription {
        self.observers.observe_periodic_time(interval, sink)
    }

    fn observe_played_to_end(&self, sink: EventSink) -> Subscription {
        self.observers.observe_played_to_end(sink)
    }

    async fn load_video_track(&self) -> Result<Option<VideoTrack>, ReelError> {
        let mut rx = self.resolution.subscribe();
        let resolved = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ReelError::not_ready("item dropped before loading"))?
            .clone();
        match resolved {
            Some(Ok(track)) => Ok(track),
            Some(Err(reason)) => Err(ReelError::load_failed(self.id.as_str(), reason)),
            None => Err(ReelError::not_ready("item not loaded")),
        }
    }
}
