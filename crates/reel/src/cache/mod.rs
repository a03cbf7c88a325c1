//! Shared byte-range response cache.

mod disk;
mod key;
mod manager;

pub use key::{ByteRange, CacheKey, CacheMetadata, CachedResponse};
pub use manager::CacheManager;
