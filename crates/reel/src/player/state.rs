use super::backend::VideoSize;
use crate::MediaId;

pub const DEFAULT_ASPECT_RATIO: f64 = 16.0 / 9.0;

/// Playback state published by the pool manager.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub current_id: Option<MediaId>,
    pub is_playing: bool,
    pub is_buffering: bool,
    /// `current_time / duration`, only updated while the duration is known
    pub progress: f64,
    pub current_time: f64,
    /// Zero until known
    pub duration: f64,
    pub is_muted: bool,
    pub video_size: VideoSize,
    pub video_aspect_ratio: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_id: None,
            is_playing: false,
            is_buffering: false,
            progress: 0.0,
            current_time: 0.0,
            duration: 0.0,
            is_muted: false,
            video_size: VideoSize::ZERO,
            video_aspect_ratio: DEFAULT_ASPECT_RATIO,
        }
    }
}

impl PlaybackState {
    pub(crate) fn apply_time(&mut self, current: f64, duration: Option<f64>) {
        let duration = duration.filter(|d| d.is_finite()).unwrap_or(0.0);
        self.current_time = current;
        self.duration = duration;
        if duration > 0.0 {
            self.progress = (current / duration).clamp(0.0, 1.0);
        }
    }

    /// Publish a resolved size; zero sizes leave the state untouched.
    pub(crate) fn apply_size(&mut self, size: VideoSize) -> bool {
        match size.aspect_ratio() {
            Some(ratio) => {
                self.video_size = size;
                self.video_aspect_ratio = ratio;
                true
            }
            None => false,
        }
    }
}

/// Options of a single `play` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayOptions {
    pub auto_play: bool,
    pub looping: bool,
    pub muted: bool,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            auto_play: true,
            looping: true,
            muted: false,
        }
    }
}

impl PlayOptions {
    pub fn auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = auto_play;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }
}
