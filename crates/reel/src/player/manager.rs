use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::backend::{ItemStatus, MediaBackend, MediaItem, SeekTolerance};
use super::event::{EventKind, EventScope, PlayerEvent};
use super::observe::{EventSink, ItemEvent, ObservedProperty, Subscription};
use super::slot::{PlayerSlot, SlotId, SlotPool};
use super::state::{PlayOptions, PlaybackState};
use crate::config::PoolConfig;
use crate::metrics::ReelMetrics;
use crate::MediaId;

/// The current playback binding.
struct PlaybackSession {
    number: u64,
    media: MediaId,
    slot: SlotId,
    /// Periodic time and end-of-stream observers
    _subscriptions: Vec<Subscription>,
}

/// Bounded pool of players multiplexing one active playback session.
///
/// The manager is driven through `&mut self` from one task. Backend
/// callbacks are queued as events and applied by [`drain_events`],
/// [`next_event`] or [`pump_for`], which keeps [`PlaybackState`] single
/// writer. Methods that arm observers spawn Tokio tasks and must run inside
/// a runtime.
///
/// [`drain_events`]: PlaybackPoolManager::drain_events
/// [`next_event`]: PlaybackPoolManager::next_event
/// [`pump_for`]: PlaybackPoolManager::pump_for
pub struct PlaybackPoolManager {
    config: PoolConfig,
    backend: Arc<dyn MediaBackend>,
    metrics: Arc<ReelMetrics>,
    pool: SlotPool,
    item_cache: HashMap<MediaId, Arc<dyn MediaItem>>,
    preload_queue: Vec<MediaId>,
    preload_subscriptions: Vec<Subscription>,
    session: Option<PlaybackSession>,
    next_session: u64,
    next_slot: SlotId,
    state: watch::Sender<PlaybackState>,
    events_tx: mpsc::UnboundedSender<PlayerEvent>,
    events_rx: mpsc::UnboundedReceiver<PlayerEvent>,
}

impl PlaybackPoolManager {
    pub fn new(config: PoolConfig, backend: Arc<dyn MediaBackend>) -> Self {
        Self::with_metrics(config, backend, Arc::new(ReelMetrics::new()))
    }

    pub fn with_metrics(
        mut config: PoolConfig,
        backend: Arc<dyn MediaBackend>,
        metrics: Arc<ReelMetrics>,
    ) -> Self {
        config.max_pool_size = config.max_pool_size.max(1);
        let (state, _) = watch::channel(PlaybackState::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            backend,
            metrics,
            pool: SlotPool::default(),
            item_cache: HashMap::new(),
            preload_queue: Vec::new(),
            preload_subscriptions: Vec::new(),
            session: None,
            next_session: 0,
            next_slot: 0,
            state,
            events_tx,
            events_rx,
        }
    }

    // --- transport ---

    /// Make `id` the active item.
    ///
    /// Playing the active item again resumes it in place. Otherwise the
    /// previous item is paused (it stays pooled) and a slot for `id` is
    /// reused, healed or created.
    pub fn play(&mut self, id: impl Into<MediaId>, options: PlayOptions) {
        let id = id.into();

        if let Some(item) = self.resumable_item(&id) {
            info!(id = %id, "Resuming current item");
            item.play();
            self.state.send_modify(|state| state.is_playing = true);
            return;
        }

        info!(id = %id, auto_play = options.auto_play, looping = options.looping, "Switching playback");

        if let Some(previous) = self.session.take() {
            if let Some(slot) = self.pool.get(&previous.media) {
                debug!(id = %previous.media, "Pausing previous item");
                slot.item.pause();
            }
        }

        self.state.send_modify(|state| {
            state.current_id = Some(id.clone());
            state.is_muted = options.muted;
        });

        let Some(slot_id) = self.resolve_slot(&id) else {
            warn!(id = %id, "No player available for item");
            self.state.send_modify(|state| state.is_playing = false);
            return;
        };

        self.next_session += 1;
        let number = self.next_session;
        self.observe_slot(&id);

        let Some(slot) = self.pool.get(&id) else {
            return;
        };
        let item = slot.item.clone();
        let known_size = slot.known_size();

        if item.current_time() != 0.0 {
            debug!(id = %id, "Rewinding reused item");
            item.seek(0.0, SeekTolerance::Exact);
        }
        item.set_muted(options.muted);

        let mut subscriptions = Vec::with_capacity(2);
        if options.looping {
            subscriptions.push(item.observe_played_to_end(self.sink(
                &id,
                Some(slot_id),
                EventScope::Session(number),
            )));
        }
        subscriptions.push(item.observe_periodic_time(
            self.config.time_observer_interval,
            self.sink(&id, Some(slot_id), EventScope::Session(number)),
        ));

        let status = item.status();
        let duration = item.duration();
        self.state.send_modify(|state| {
            state.is_buffering = status == ItemStatus::Unknown;
            state.current_time = 0.0;
            state.progress = 0.0;
            state.duration = duration.filter(|d| d.is_finite()).unwrap_or(0.0);
            if let Some(size) = known_size {
                state.apply_size(size);
            }
        });

        self.session = Some(PlaybackSession {
            number,
            media: id.clone(),
            slot: slot_id,
            _subscriptions: subscriptions,
        });

        if options.auto_play {
            item.play();
        }
        self.state
            .send_modify(|state| state.is_playing = options.auto_play);
    }

    pub fn pause(&mut self) {
        if let Some(item) = self.active_item() {
            item.pause();
        }
        self.state.send_modify(|state| state.is_playing = false);
        debug!("Paused");
    }

    pub fn resume(&mut self) {
        if let Some(item) = self.active_item() {
            item.play();
        }
        self.state.send_modify(|state| state.is_playing = true);
        debug!("Resumed");
    }

    pub fn toggle_play_pause(&mut self) {
        if self.state.borrow().is_playing {
            self.pause();
        } else {
            self.resume();
        }
    }

    /// Exact seek on the active item.
    ///
    /// Non-finite or negative targets seek to zero, targets past a known
    /// duration seek to the end.
    pub fn seek(&mut self, seconds: f64) {
        let Some(item) = self.active_item() else {
            debug!(seconds, "Seek ignored without an active item");
            return;
        };

        let target = if !seconds.is_finite() || seconds < 0.0 {
            0.0
        } else {
            match item.duration() {
                Some(duration) if duration.is_finite() && duration > 0.0 && seconds > duration => {
                    duration
                }
                _ => seconds,
            }
        };

        debug!(requested = seconds, target, "Seeking");
        item.seek(target, SeekTolerance::Exact);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.state.send_modify(|state| state.is_muted = muted);
        if let Some(item) = self.active_item() {
            item.set_muted(muted);
        }
        debug!(muted, "Mute changed");
    }

    /// Warm items for upcoming ids without touching the active session.
    pub fn preload<I, T>(&mut self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<MediaId>,
    {
        let ids: Vec<MediaId> = ids
            .into_iter()
            .take(self.config.max_preload_count)
            .map(Into::into)
            .collect();
        info!(count = ids.len(), "Preloading items");

        for id in &ids {
            if self.item_cache.contains_key(id) {
                continue;
            }
            match self.backend.create_item(id) {
                Ok(item) => {
                    let subscription =
                        item.observe(ObservedProperty::Status, self.sink(id, None, EventScope::Preload));
                    self.preload_subscriptions.push(subscription);
                    self.item_cache.insert(id.clone(), item);
                }
                Err(e) => warn!(id = %id, error = %e, "Skipping preload"),
            }
        }

        self.preload_queue = ids;
    }

    /// Drop every observer and pause every pooled player. Slots stay pooled.
    pub fn cleanup(&mut self) {
        info!(pooled = self.pool.len(), "Cleaning up playback");
        self.session = None;
        self.preload_subscriptions.clear();
        for slot in self.pool.slots_mut() {
            slot.disarm();
            slot.item.pause();
        }
        self.state.send_modify(|state| {
            state.current_id = None;
            state.is_playing = false;
        });
    }

    /// [`cleanup`](Self::cleanup), then release every pooled player and item.
    pub fn clear_pool(&mut self) {
        self.cleanup();
        info!("Clearing player pool");
        self.pool.clear();
        self.item_cache.clear();
        self.preload_queue.clear();
    }

    // --- events ---

    /// Apply every queued backend event; returns how many were applied.
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next backend event and apply it.
    pub async fn next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.apply_event(event);
                true
            }
            None => false,
        }
    }

    /// Apply events as they arrive for `duration`.
    pub async fn pump_for(&mut self, duration: Duration) {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            let event = tokio::select! {
                _ = &mut deadline => None,
                event = self.events_rx.recv() => event,
            };
            match event {
                Some(event) => self.apply_event(event),
                None => break,
            }
        }
        self.drain_events();
    }

    fn apply_event(&mut self, event: PlayerEvent) {
        if event.scope == EventScope::Preload {
            if let EventKind::Item(ItemEvent::Status(status)) = event.kind {
                match status {
                    ItemStatus::Ready => info!(id = %event.media, "Preloaded item ready"),
                    ItemStatus::Failed => warn!(id = %event.media, "Preloaded item failed"),
                    ItemStatus::Unknown => {}
                }
            }
            return;
        }

        let Some(slot_id) = event.slot else {
            return;
        };
        let Some(slot) = self
            .pool
            .get_mut(&event.media)
            .filter(|slot| slot.id == slot_id)
        else {
            debug!(id = %event.media, "Dropping event for a released player");
            return;
        };

        let active_session = self
            .session
            .as_ref()
            .filter(|session| session.slot == slot_id);
        if let EventScope::Session(number) = event.scope {
            if active_session.map(|session| session.number) != Some(number) {
                debug!(id = %event.media, "Dropping event from a finished session");
                return;
            }
        }
        let is_active = active_session.is_some();

        match event.kind {
            EventKind::Item(ItemEvent::Status(status)) => {
                match status {
                    ItemStatus::Ready => info!(id = %event.media, "Player ready"),
                    ItemStatus::Failed => warn!(id = %event.media, "Player failed"),
                    ItemStatus::Unknown => debug!(id = %event.media, "Player status unknown"),
                }
                if is_active {
                    self.state
                        .send_modify(|state| state.is_buffering = status == ItemStatus::Unknown);
                }
            }
            EventKind::Item(ItemEvent::LikelyToKeepUp(likely)) => {
                if is_active {
                    self.state.send_modify(|state| state.is_buffering = !likely);
                }
            }
            EventKind::Item(ItemEvent::PresentationSize(size)) => {
                if let Some(size) = slot.record_presentation_size(size) {
                    debug!(id = %event.media, %size, "Presentation size");
                    if is_active {
                        self.state.send_modify(|state| {
                            state.apply_size(size);
                        });
                    }
                }
            }
            EventKind::Item(ItemEvent::PeriodicTime { current, duration }) => {
                self.state
                    .send_modify(|state| state.apply_time(current, duration));
            }
            EventKind::Item(ItemEvent::PlayedToEnd) => {
                debug!(id = %event.media, "Looping");
                slot.item.seek(0.0, SeekTolerance::Default);
                slot.item.play();
                let duration = slot.item.duration();
                self.state.send_modify(|state| {
                    state.apply_time(0.0, duration);
                    state.is_playing = true;
                });
            }
            EventKind::TrackLoaded(Ok(track)) => match slot.record_track(track) {
                Some(size) => {
                    info!(
                        id = %event.media,
                        %size,
                        aspect_ratio = size.aspect_ratio().unwrap_or_default(),
                        "Resolved display size"
                    );
                    if is_active {
                        self.state.send_modify(|state| {
                            state.apply_size(size);
                        });
                    }
                }
                None => debug!(id = %event.media, "No usable video track"),
            },
            EventKind::TrackLoaded(Err(e)) => {
                warn!(id = %event.media, error = %e, "Failed to load video track");
                slot.geometry_failed();
            }
        }
    }

    // --- internals ---

    fn resumable_item(&self, id: &MediaId) -> Option<Arc<dyn MediaItem>> {
        let session = self.session.as_ref().filter(|session| &session.media == id)?;
        let slot = self
            .pool
            .get(id)
            .filter(|slot| slot.id == session.slot && slot.item.status() != ItemStatus::Failed)?;
        Some(slot.item.clone())
    }

    fn sink(&self, media: &MediaId, slot: Option<SlotId>, scope: EventScope) -> EventSink {
        let tx = self.events_tx.clone();
        let media = media.clone();
        Arc::new(move |event| {
            let _ = tx.send(PlayerEvent {
                media: media.clone(),
                slot,
                scope,
                kind: EventKind::Item(event),
            });
        })
    }

    /// Find, heal or create the slot for `id`.
    fn resolve_slot(&mut self, id: &MediaId) -> Option<SlotId> {
        if let Some(slot) = self.pool.get(id) {
            if slot.item.status() != ItemStatus::Failed {
                debug!(id = %id, "Reusing pooled player");
                self.metrics.record_slot_reused();
                return Some(slot.id);
            }
            warn!(id = %id, "Pooled player failed, recreating");
            self.pool.remove(id);
            self.item_cache.remove(id);
            self.metrics.record_slot_healed();
        }

        if self.pool.len() >= self.config.max_pool_size {
            if let Some(evicted) = self.pool.pop_oldest() {
                info!(id = %evicted.media, "Evicting oldest player");
                evicted.item.pause();
                self.item_cache.remove(&evicted.media);
                self.metrics.record_slot_evicted();
            }
        }

        let item = match self.item_cache.get(id).cloned() {
            Some(item) if item.status() == ItemStatus::Failed => {
                warn!(id = %id, "Preloaded item failed, recreating");
                self.item_cache.remove(id);
                self.create_item(id)?
            }
            Some(item) => {
                debug!(id = %id, "Using preloaded item");
                item
            }
            None => self.create_item(id)?,
        };

        self.next_slot += 1;
        let slot_id = self.next_slot;
        self.pool
            .insert(PlayerSlot::new(slot_id, id.clone(), item));
        self.metrics.record_slot_created();
        debug!(id = %id, slot = slot_id, pooled = self.pool.len(), "Created player");
        Some(slot_id)
    }

    fn create_item(&mut self, id: &MediaId) -> Option<Arc<dyn MediaItem>> {
        match self.backend.create_item(id) {
            Ok(item) => {
                self.item_cache.insert(id.clone(), item.clone());
                Some(item)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Invalid media id");
                None
            }
        }
    }

    /// Arm the slot observers and the geometry task if they are not running.
    fn observe_slot(&mut self, id: &MediaId) {
        let Some(slot) = self.pool.get(id) else {
            return;
        };
        let slot_id = slot.id;
        let item = slot.item.clone();
        let needs_observers = !slot.is_observed();
        let needs_geometry = slot.needs_geometry();

        let subscriptions = needs_observers.then(|| {
            [
                ObservedProperty::Status,
                ObservedProperty::LikelyToKeepUp,
                ObservedProperty::PresentationSize,
            ]
            .into_iter()
            .map(|property| item.observe(property, self.sink(id, Some(slot_id), EventScope::Slot)))
            .collect::<Vec<_>>()
        });

        let geometry = needs_geometry.then(|| {
            let tx = self.events_tx.clone();
            let media = id.clone();
            let item = item.clone();
            tokio::spawn(async move {
                let result = item.load_video_track().await;
                let _ = tx.send(PlayerEvent {
                    media,
                    slot: Some(slot_id),
                    scope: EventScope::Slot,
                    kind: EventKind::TrackLoaded(result),
                });
            })
            .abort_handle()
        });

        let Some(slot) = self.pool.get_mut(id) else {
            return;
        };
        if let Some(subscriptions) = subscriptions {
            slot.set_subscriptions(subscriptions);
        }
        if let Some(task) = geometry {
            slot.set_geometry_task(task);
        }
    }

    // --- accessors ---

    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    pub fn active_id(&self) -> Option<&MediaId> {
        self.session.as_ref().map(|session| &session.media)
    }

    pub fn active_item(&self) -> Option<Arc<dyn MediaItem>> {
        let session = self.session.as_ref()?;
        self.pool
            .get(&session.media)
            .filter(|slot| slot.id == session.slot)
            .map(|slot| slot.item.clone())
    }

    /// Pooled ids, oldest first.
    pub fn pool_ids(&self) -> Vec<MediaId> {
        self.pool.ids()
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn item_cache_len(&self) -> usize {
        self.item_cache.len()
    }

    pub fn preload_queue(&self) -> &[MediaId] {
        &self.preload_queue
    }

    pub fn metrics(&self) -> &Arc<ReelMetrics> {
        &self.metrics
    }
}

impl Drop for PlaybackPoolManager {
    fn drop(&mut self) {
        self.session = None;
        self.preload_subscriptions.clear();
        for slot in self.pool.slots_mut() {
            slot.disarm();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::backend::{VideoSize, VideoTrack};
    use crate::test_support::ScriptedBackend;

    fn manager(backend: &Arc<ScriptedBackend>) -> PlaybackPoolManager {
        PlaybackPoolManager::new(PoolConfig::default(), backend.clone())
    }

    #[tokio::test]
    async fn play_creates_slot_and_publishes() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);

        manager.play("https://v/a.mp4", PlayOptions::default());

        let state = manager.state();
        assert_eq!(state.current_id, Some(MediaId::from("https://v/a.mp4")));
        assert!(state.is_playing);
        assert!(state.is_buffering);
        assert_eq!(manager.pool_len(), 1);
        assert_eq!(manager.item_cache_len(), 1);

        let item = backend.item("https://v/a.mp4").unwrap();
        assert!(item.is_playing());
        assert_eq!(item.observer_count(ObservedProperty::Status), 1);
        assert_eq!(item.periodic_observer_count(), 1);
        assert_eq!(item.played_to_end_observer_count(), 1);
    }

    #[tokio::test]
    async fn switching_drops_session_observers_only() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);

        manager.play("https://v/a.mp4", PlayOptions::default());
        manager.play("https://v/b.mp4", PlayOptions::default());

        let a = backend.item("https://v/a.mp4").unwrap();
        assert!(!a.is_playing());
        assert_eq!(a.periodic_observer_count(), 0);
        assert_eq!(a.played_to_end_observer_count(), 0);
        assert_eq!(a.observer_count(ObservedProperty::Status), 1);
        assert_eq!(a.observer_count(ObservedProperty::LikelyToKeepUp), 1);
        assert_eq!(manager.active_id(), Some(&MediaId::from("https://v/b.mp4")));
    }

    #[tokio::test]
    async fn status_updates_buffering_for_active_slot() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);
        manager.play("https://v/a.mp4", PlayOptions::default());
        manager.play("https://v/b.mp4", PlayOptions::default());

        // a is no longer active: its readiness must not touch published state
        backend.item("https://v/a.mp4").unwrap().set_likely_to_keep_up(false);
        manager.drain_events();
        assert!(manager.state().is_buffering);

        backend.item("https://v/b.mp4").unwrap().set_status(ItemStatus::Ready);
        manager.drain_events();
        assert!(!manager.state().is_buffering);

        backend.item("https://v/b.mp4").unwrap().set_likely_to_keep_up(false);
        manager.drain_events();
        assert!(manager.state().is_buffering);
    }

    #[tokio::test]
    async fn periodic_time_updates_progress() {
        let backend = Arc::new(ScriptedBackend::new().with_duration(20.0));
        let mut manager = manager(&backend);
        manager.play("https://v/a.mp4", PlayOptions::default());

        backend.item("https://v/a.mp4").unwrap().emit_time(5.0);
        manager.drain_events();

        let state = manager.state();
        assert_eq!(state.current_time, 5.0);
        assert_eq!(state.duration, 20.0);
        assert!((state.progress - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stale_session_events_are_ignored() {
        let backend = Arc::new(ScriptedBackend::new().with_duration(20.0));
        let mut manager = manager(&backend);
        manager.play("https://v/a.mp4", PlayOptions::default());
        let a = backend.item("https://v/a.mp4").unwrap();

        a.emit_time(3.0);
        // the switch happens before the queued tick is applied
        manager.play("https://v/b.mp4", PlayOptions::default());
        manager.drain_events();

        assert_eq!(manager.state().current_time, 0.0);
    }

    #[tokio::test]
    async fn looping_restarts_at_end() {
        let backend = Arc::new(ScriptedBackend::new().with_duration(8.0));
        let mut manager = manager(&backend);
        manager.play("https://v/a.mp4", PlayOptions::default());
        manager.pause();
        let a = backend.item("https://v/a.mp4").unwrap();
        a.emit_time(8.0);
        manager.drain_events();
        assert_eq!(manager.state().current_time, 8.0);

        a.finish();
        manager.drain_events();

        let state = manager.state();
        assert_eq!(a.current_time(), 0.0);
        assert!(a.is_playing());
        assert!(state.is_playing);
        assert_eq!(state.current_time, 0.0);
        assert_eq!(state.progress, 0.0);
        assert_eq!(state.duration, 8.0);
    }

    #[tokio::test]
    async fn non_looping_play_installs_no_end_observer() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);
        manager.play("https://v/a.mp4", PlayOptions::default().looping(false));

        let a = backend.item("https://v/a.mp4").unwrap();
        assert_eq!(a.played_to_end_observer_count(), 0);
        a.finish();
        assert_eq!(manager.drain_events(), 0);
    }

    #[tokio::test]
    async fn reused_slot_is_rewound() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);
        manager.play("https://v/a.mp4", PlayOptions::default());
        backend.item("https://v/a.mp4").unwrap().set_current_time(4.0);
        manager.play("https://v/b.mp4", PlayOptions::default());

        manager.play("https://v/a.mp4", PlayOptions::default());

        let a = backend.item("https://v/a.mp4").unwrap();
        assert_eq!(a.current_time(), 0.0);
        assert_eq!(backend.created_count("https://v/a.mp4"), 1);
    }

    #[tokio::test]
    async fn auto_play_off_leaves_item_paused() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);
        manager.play("https://v/a.mp4", PlayOptions::default().auto_play(false).muted(true));

        let a = backend.item("https://v/a.mp4").unwrap();
        assert!(!a.is_playing());
        assert!(a.is_muted());
        let state = manager.state();
        assert!(!state.is_playing);
        assert!(state.is_muted);
    }

    #[tokio::test]
    async fn transport_without_session_only_publishes() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);

        manager.resume();
        assert!(manager.state().is_playing);
        manager.toggle_play_pause();
        assert!(!manager.state().is_playing);
        manager.set_muted(true);
        assert!(manager.state().is_muted);
        manager.seek(3.0);
        assert!(manager.active_item().is_none());
    }

    #[tokio::test]
    async fn preload_warms_item_cache() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);

        manager.preload(["https://v/b.mp4", "not a url", "https://v/d.mp4"]);

        assert_eq!(manager.item_cache_len(), 1);
        assert_eq!(manager.pool_len(), 0);
        assert_eq!(manager.preload_queue().len(), 2);
        assert!(manager.active_item().is_none());

        manager.play("https://v/b.mp4", PlayOptions::default());
        assert_eq!(backend.created_count("https://v/b.mp4"), 1);

        // already cached ids are not recreated
        manager.preload(["https://v/b.mp4"]);
        assert_eq!(backend.created_count("https://v/b.mp4"), 1);
    }

    #[tokio::test]
    async fn failed_preload_is_replaced_on_play() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);
        manager.preload(["https://v/b.mp4"]);
        backend.item("https://v/b.mp4").unwrap().set_status(ItemStatus::Failed);
        manager.drain_events();

        manager.play("https://v/b.mp4", PlayOptions::default());

        assert_eq!(backend.created_count("https://v/b.mp4"), 2);
        let active = manager.active_item().unwrap();
        assert_eq!(active.status(), ItemStatus::Unknown);
    }

    #[tokio::test]
    async fn geometry_from_track_is_published() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);
        manager.play("https://v/a.mp4", PlayOptions::default());
        let a = backend.item("https://v/a.mp4").unwrap();

        a.set_presentation_size(VideoSize::new(1280.0, 720.0));
        a.resolve_track(Some(VideoTrack {
            natural_size: VideoSize::new(1280.0, 720.0),
            transform: mp4::Matrix::from_raw(mp4::test_support::ROTATE_90_MATRIX),
        }));
        while manager.state().video_size != VideoSize::new(720.0, 1280.0) {
            assert!(manager.next_event().await);
        }

        a.set_presentation_size(VideoSize::new(1280.0, 720.0));
        manager.drain_events();
        let state = manager.state();
        assert_eq!(state.video_size, VideoSize::new(720.0, 1280.0));
        assert!((state.video_aspect_ratio - 720.0 / 1280.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn geometry_of_inactive_slot_is_kept_for_later() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);
        manager.play("https://v/a.mp4", PlayOptions::default());
        manager.play("https://v/b.mp4", PlayOptions::default());

        backend
            .item("https://v/a.mp4")
            .unwrap()
            .set_presentation_size(VideoSize::new(1080.0, 1920.0));
        manager.drain_events();
        assert_eq!(manager.state().video_size, VideoSize::ZERO);

        manager.play("https://v/a.mp4", PlayOptions::default());
        assert_eq!(manager.state().video_size, VideoSize::new(1080.0, 1920.0));
    }

    #[tokio::test]
    async fn cleanup_keeps_pool_but_drops_observers() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut manager = manager(&backend);
        manager.preload(["https://v/c.mp4"]);
        manager.play("https://v/a.mp4", PlayOptions::default());
        manager.play("https://v/b.mp4", PlayOptions::default());

        manager.cleanup();

        assert_eq!(manager.pool_len(), 2);
        assert!(manager.active_item().is_none());
        let state = manager.state();
        assert!(!state.is_playing);
        assert_eq!(state.current_id, None);
        for url in ["https://v/a.mp4", "https://v/b.mp4", "https://v/c.mp4"] {
            let item = backend.item(url).unwrap();
            assert_eq!(item.total_observer_count(), 0, "{url}");
            assert!(!item.is_playing());
        }

        manager.clear_pool();
        assert_eq!(manager.pool_len(), 0);
        assert_eq!(manager.item_cache_len(), 0);
        assert!(manager.preload_queue().is_empty());
    }
}
