use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::task::AbortHandle;

use super::backend::{MediaItem, VideoSize, VideoTrack};
use super::observe::Subscription;
use crate::MediaId;

pub(crate) type SlotId = u64;

/// A pooled player bound to one media id.
pub(crate) struct PlayerSlot {
    pub id: SlotId,
    pub media: MediaId,
    pub item: Arc<dyn MediaItem>,
    /// Status, likely-to-keep-up and presentation-size observers
    subscriptions: Vec<Subscription>,
    geometry_task: Option<AbortHandle>,
    geometry_settled: bool,
    presentation_size: VideoSize,
    track_size: Option<VideoSize>,
}

impl PlayerSlot {
    pub fn new(id: SlotId, media: MediaId, item: Arc<dyn MediaItem>) -> Self {
        Self {
            id,
            media,
            item,
            subscriptions: Vec::new(),
            geometry_task: None,
            geometry_settled: false,
            presentation_size: VideoSize::ZERO,
            track_size: None,
        }
    }

    pub fn is_observed(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn set_subscriptions(&mut self, subscriptions: Vec<Subscription>) {
        self.subscriptions = subscriptions;
    }

    /// A geometry task should be (re)started.
    pub fn needs_geometry(&self) -> bool {
        !self.geometry_settled && self.geometry_task.as_ref().is_none_or(|task| task.is_finished())
    }

    pub fn set_geometry_task(&mut self, task: AbortHandle) {
        self.geometry_task = Some(task);
    }

    /// Drop observers and stop the geometry task; resolved sizes are kept.
    pub fn disarm(&mut self) {
        self.subscriptions.clear();
        if let Some(task) = self.geometry_task.take() {
            task.abort();
        }
    }

    /// Best size known so far, the track-based one first.
    pub fn known_size(&self) -> Option<VideoSize> {
        self.track_size
            .or_else(|| (!self.presentation_size.is_zero()).then_some(self.presentation_size))
    }

    /// Record a presentation size; returns the size to publish, if any.
    pub fn record_presentation_size(&mut self, size: VideoSize) -> Option<VideoSize> {
        if size.is_zero() || self.track_size.is_some() {
            return None;
        }
        self.presentation_size = size;
        Some(size)
    }

    /// Record the loaded video track; returns the display size to publish.
    pub fn record_track(&mut self, track: Option<VideoTrack>) -> Option<VideoSize> {
        self.geometry_settled = true;
        self.geometry_task = None;
        let size = track?.display_size();
        if size.is_zero() {
            return None;
        }
        self.track_size = Some(size);
        Some(size)
    }

    /// The track load failed; presentation size remains the only source.
    pub fn geometry_failed(&mut self) {
        self.geometry_settled = true;
        self.geometry_task = None;
    }
}

impl Drop for PlayerSlot {
    fn drop(&mut self) {
        if let Some(task) = self.geometry_task.take() {
            task.abort();
        }
    }
}

/// Bounded set of slots with FIFO eviction by insertion order.
#[derive(Default)]
pub(crate) struct SlotPool {
    order: VecDeque<MediaId>,
    slots: HashMap<MediaId, PlayerSlot>,
}

impl SlotPool {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, id: &MediaId) -> Option<&PlayerSlot> {
        self.slots.get(id)
    }

    pub fn get_mut(&mut self, id: &MediaId) -> Option<&mut PlayerSlot> {
        self.slots.get_mut(id)
    }

    pub fn insert(&mut self, slot: PlayerSlot) {
        let media = slot.media.clone();
        if self.slots.insert(media.clone(), slot).is_some() {
            self.order.retain(|existing| existing != &media);
        }
        self.order.push_back(media);
    }

    pub fn remove(&mut self, id: &MediaId) -> Option<PlayerSlot> {
        let slot = self.slots.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(slot)
    }

    /// Remove the oldest inserted slot.
    pub fn pop_oldest(&mut self) -> Option<PlayerSlot> {
        while let Some(oldest) = self.order.pop_front() {
            if let Some(slot) = self.slots.remove(&oldest) {
                return Some(slot);
            }
        }
        None
    }

    pub fn ids(&self) -> Vec<MediaId> {
        self.order.iter().cloned().collect()
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut PlayerSlot> {
        self.slots.values_mut()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.slots.clear();
    }
}
