//! Scripted doubles for the media backend and the range fetcher.
//!
//! Available to local tests and, with the `test-utils` feature, to
//! downstream crates.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::ByteRange;
use crate::player::{
    EventSink, ItemEvent, ItemStatus, MediaBackend, MediaItem, ObservedProperty, ObserverSet,
    SeekTolerance, Subscription, VideoSize, VideoTrack,
};
use crate::preload::{RangeFetcher, RangeResponse};
use crate::{MediaId, ReelError};

#[derive(Debug, Default)]
struct ScriptedState {
    status: ItemStatus,
    current_time: f64,
    playing: bool,
    muted: bool,
    presentation_size: VideoSize,
    seeks: Vec<(f64, SeekTolerance)>,
}

/// A media item driven entirely by the test.
pub struct ScriptedItem {
    id: MediaId,
    duration: Option<f64>,
    observers: ObserverSet,
    state: Mutex<ScriptedState>,
    track: watch::Sender<Option<Result<Option<VideoTrack>, String>>>,
}

impl ScriptedItem {
    pub fn new(id: MediaId, duration: Option<f64>) -> Self {
        let (track, _) = watch::channel(None);
        Self {
            id,
            duration,
            observers: ObserverSet::new(),
            state: Mutex::new(ScriptedState::default()),
            track,
        }
    }

    pub fn set_status(&self, status: ItemStatus) {
        self.state.lock().status = status;
        self.observers.emit(ItemEvent::Status(status));
    }

    pub fn set_likely_to_keep_up(&self, likely: bool) {
        self.observers.emit(ItemEvent::LikelyToKeepUp(likely));
    }

    pub fn set_presentation_size(&self, size: VideoSize) {
        self.state.lock().presentation_size = size;
        self.observers.emit(ItemEvent::PresentationSize(size));
    }

    /// Set the position without notifying observers.
    pub fn set_current_time(&self, seconds: f64) {
        self.state.lock().current_time = seconds;
    }

    pub fn emit_time(&self, seconds: f64) {
        self.state.lock().current_time = seconds;
        self.observers.emit(ItemEvent::PeriodicTime {
            current: seconds,
            duration: self.duration,
        });
    }

    pub fn finish(&self) {
        if let Some(duration) = self.duration {
            self.state.lock().current_time = duration;
        }
        self.observers.emit(ItemEvent::PlayedToEnd);
    }

    pub fn resolve_track(&self, track: Option<VideoTrack>) {
        self.track.send_replace(Some(Ok(track)));
    }

    pub fn fail_track(&self, reason: impl Into<String>) {
        self.track.send_replace(Some(Err(reason.into())));
    }

    pub fn seeks(&self) -> Vec<(f64, SeekTolerance)> {
        self.state.lock().seeks.clone()
    }

    pub fn observer_count(&self, property: ObservedProperty) -> usize {
        self.observers.count(property)
    }

    pub fn periodic_observer_count(&self) -> usize {
        self.observers.periodic_count()
    }

    pub fn played_to_end_observer_count(&self) -> usize {
        self.observers.played_to_end_count()
    }

    pub fn total_observer_count(&self) -> usize {
        self.observers.len()
    }
}

#[async_trait]
impl MediaItem for ScriptedItem {
    fn id(&self) -> &MediaId {
        &self.id
    }

    fn status(&self) -> ItemStatus {
        self.state.lock().status
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn play(&self) {
        self.state.lock().playing = true;
    }

    fn pause(&self) {
        self.state.lock().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn seek(&self, seconds: f64, tolerance: SeekTolerance) {
        let mut state = self.state.lock();
        state.current_time = seconds;
        state.seeks.push((seconds, tolerance));
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
        let mut rx = self.track.subscribe();
        let resolved = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ReelError::not_ready("track source dropped"))?
            .clone();
        match resolved {
            Some(Ok(track)) => Ok(track),
            Some(Err(reason)) => Err(ReelError::load_failed(self.id.as_str(), reason)),
            None => Err(ReelError::not_ready("track not resolved")),
        }
    }
}

/// Backend handing out [`ScriptedItem`]s. Ids that are not http(s) URLs
/// are refused.
#[derive(Default)]
pub struct ScriptedBackend {
    duration: Option<f64>,
    items: Mutex<HashMap<MediaId, Vec<Arc<ScriptedItem>>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// The most recently created item for `id`.
    pub fn item(&self, id: &str) -> Option<Arc<ScriptedItem>> {
        self.items.lock().get(id).and_then(|items| items.last().cloned())
    }

    pub fn created_count(&self, id: &str) -> usize {
        self.items.lock().get(id).map_or(0, Vec::len)
    }
}

impl MediaBackend for ScriptedBackend {
    fn create_item(&self, id: &MediaId) -> Result<Arc<dyn MediaItem>, ReelError> {
        id.to_url()?;
        let item = Arc::new(ScriptedItem::new(id.clone(), self.duration));
        self.items
            .lock()
            .entry(id.clone())
            .or_default()
            .push(item.clone());
        Ok(item)
    }
}

/// Behavior of [`ScriptedFetcher`] for one URL.
#[derive(Debug, Clone)]
pub enum FetchScript {
    /// Respond with `len` bytes (capped at the range length)
    Body(usize),
    /// Fail with the given HTTP status
    Status(u16),
    /// Never respond until cancelled
    Hang,
}

/// Range fetcher answering from a per-URL script.
///
/// Unknown URLs answer with [`FetchScript::Body`] of the full range. A fetch
/// may be held at its start with [`ScriptedFetcher::hold`] until
/// [`ScriptedFetcher::release`].
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, FetchScript>>,
    requests: Mutex<Vec<(String, ByteRange)>>,
    in_flight: AtomicUsize,
    held: Mutex<bool>,
    gate: Notify,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, script: FetchScript) {
        self.scripts.lock().insert(url.to_string(), script);
    }

    pub fn hold(&self) {
        *self.held.lock() = true;
    }

    pub fn release(&self) {
        *self.held.lock() = false;
        self.gate.notify_waiters();
    }

    pub fn requests(&self) -> Vec<(String, ByteRange)> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|(u, _)| u == url).count()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn wait_released(&self, token: &CancellationToken) -> Result<(), ReelError> {
        loop {
            let notified = self.gate.notified();
            if !*self.held.lock() {
                return Ok(());
            }
            tokio::select! {
                _ = token.cancelled() => return Err(ReelError::Cancelled),
                _ = notified => {}
            }
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RangeFetcher for ScriptedFetcher {
    async fn fetch_range(
        &self,
        url: &Url,
        range: ByteRange,
        token: &CancellationToken,
    ) -> Result<RangeResponse, ReelError> {
        self.requests.lock().push((url.as_str().to_string(), range));
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        self.wait_released(token).await?;

        let script = self.scripts.lock().get(url.as_str()).cloned();
        let limit = range.len().unwrap_or(u64::MAX) as usize;
        match script {
            Some(FetchScript::Status(status)) => Err(ReelError::http_status(
                reqwest::StatusCode::from_u16(status)
                    .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
                url.as_str(),
                "preload",
            )),
            Some(FetchScript::Hang) => {
                token.cancelled().await;
                Err(ReelError::Cancelled)
            }
            Some(FetchScript::Body(len)) => Ok(RangeResponse::partial(
                Bytes::from(vec![0u8; len.min(limit)]),
                range,
            )),
            None => Ok(RangeResponse::partial(
                Bytes::from(vec![0u8; limit.min(64 * 1024)]),
                range,
            )),
        }
    }
}
