//! Pooled playback of feed items.

mod backend;
mod event;
mod headless;
mod manager;
mod observe;
mod slot;
mod state;

pub use backend::{ItemStatus, MediaBackend, MediaItem, SeekTolerance, VideoSize, VideoTrack};
pub use headless::{HeadlessBackend, HeadlessItem};
pub use manager::PlaybackPoolManager;
pub use observe::{EventSink, ItemEvent, ObservedProperty, ObserverSet, Subscription};
pub use state::{DEFAULT_ASPECT_RATIO, PlayOptions, PlaybackState};
