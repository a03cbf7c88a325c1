use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::observe::{EventSink, ObservedProperty, Subscription};
use crate::{MediaId, ReelError};

/// Readiness of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemStatus {
    #[default]
    Unknown,
    Ready,
    Failed,
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoSize {
    pub width: f64,
    pub height: f64,
}

impl VideoSize {
    pub const ZERO: VideoSize = VideoSize {
        width: 0.0,
        height: 0.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True unless both dimensions are positive.
    pub fn is_zero(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        (!self.is_zero()).then(|| self.width / self.height)
    }
}

impl fmt::Display for VideoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How far a seek may land from the requested time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekTolerance {
    /// Land exactly on the requested time
    Exact,
    /// Let the backend snap to a nearby sync sample
    #[default]
    Default,
}

/// Geometry of the first video track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoTrack {
    pub natural_size: VideoSize,
    pub transform: mp4::Matrix,
}

impl VideoTrack {
    /// Natural size with the preferred transform applied, as absolute values.
    pub fn display_size(&self) -> VideoSize {
        let (width, height) = self
            .transform
            .apply_to_size(self.natural_size.width, self.natural_size.height);
        VideoSize::new(width, height)
    }
}

/// Factory of playable media items.
pub trait MediaBackend: Send + Sync {
    /// Create an item for `id`. Fails only when `id` cannot name media at
    /// all; loading problems surface later through [`ItemStatus::Failed`].
    fn create_item(&self, id: &MediaId) -> Result<Arc<dyn MediaItem>, ReelError>;
}

/// A single playable item together with its transport.
#[async_trait]
pub trait MediaItem: Send + Sync {
    fn id(&self) -> &MediaId;

    fn status(&self) -> ItemStatus;

    /// Playback position in seconds.
    fn current_time(&self) -> f64;

    /// Duration in seconds, `None` until known.
    fn duration(&self) -> Option<f64>;

    fn play(&self);

    fn pause(&self);

    fn is_playing(&self) -> bool;

    fn seek(&self, seconds: f64, tolerance: SeekTolerance);

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;

    fn presentation_size(&self) -> VideoSize;

    fn observe(&self, property: ObservedProperty, sink: EventSink) -> Subscription;

    fn observe_periodic_time(&self, interval: Duration, sink: EventSink) -> Subscription;

    fn observe_played_to_end(&self, sink: EventSink) -> Subscription;

    /// Load the first video track, `Ok(None)` for audio-only media.
    async fn load_video_track(&self) -> Result<Option<VideoTrack>, ReelError>;
}

impl fmt::Debug for dyn MediaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaItem")
            .field("id", self.id())
            .field("status", &self.status())
            .finish()
    }
}
