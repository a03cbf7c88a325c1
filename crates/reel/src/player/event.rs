use super::backend::VideoTrack;
use super::observe::ItemEvent;
use super::slot::SlotId;
use crate::{MediaId, ReelError};

/// Lifetime an event was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventScope {
    /// Time and end-of-stream observers of one playback session
    Session(u64),
    /// Status, buffering and size observers owned by a slot
    Slot,
    /// Readiness of an item warmed by `preload`
    Preload,
}

#[derive(Debug)]
pub(crate) enum EventKind {
    Item(ItemEvent),
    TrackLoaded(Result<Option<VideoTrack>, ReelError>),
}

/// A backend callback routed back to the owning manager.
#[derive(Debug)]
pub(crate) struct PlayerEvent {
    pub media: MediaId,
    pub slot: Option<SlotId>,
    pub scope: EventScope,
    pub kind: EventKind,
}
