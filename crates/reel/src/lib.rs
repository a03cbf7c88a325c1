//! Playback core for vertically scrolling short-video feeds.
//!
//! [`PlaybackPoolManager`] keeps a small FIFO pool of media players so that
//! swiping back and forth reuses already-decoded items, and
//! [`PreloadScheduler`] warms the head of the next few feed items into a
//! shared byte-range [`CacheManager`]. [`HeadlessBackend`] drives both
//! without a platform player by probing MP4 headers and running a simulated
//! clock.

pub mod builder;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod media_id;
pub mod metrics;
pub mod player;
pub mod preload;
pub mod proxy;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use builder::ReelConfigBuilder;
pub use cache::{ByteRange, CacheKey, CacheManager, CacheMetadata, CachedResponse};
pub use client::{create_client, install_rustls_provider};
pub use config::{
    CacheConfig, CachePurgePolicy, ClientConfig, HeadlessConfig, PoolConfig, PreloadConfig,
    ReelConfig,
};
pub use error::ReelError;
pub use media_id::MediaId;
pub use metrics::{MetricsSnapshot, ReelMetrics};
pub use player::{
    HeadlessBackend, ItemStatus, MediaBackend, MediaItem, PlayOptions, PlaybackPoolManager,
    PlaybackState, VideoSize, VideoTrack,
};
pub use preload::{HttpRangeFetcher, PreloadPriority, PreloadScheduler, PreloadStatus, RangeFetcher};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
