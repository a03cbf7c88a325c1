use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::proxy::ProxyConfig;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";

pub const MIB: u64 = 1024 * 1024;

/// HTTP client options shared by the preloader and the headless backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Overall timeout for a request (zero disables it)
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Idle connection timeout
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,

    /// Maximum idle connections to keep per host
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(0),
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: ClientConfig::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
            pool_max_idle_per_host: 6,
        }
    }
}

impl ClientConfig {
    /// Merge `config` over the default headers; custom values win.
    pub fn with_config(config: ClientConfig) -> Self {
        let mut headers = ClientConfig::get_default_headers();
        for (name, value) in config.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        Self { headers, ..config }
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        default_headers
    }
}

/// Bounds of the player pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live player slots
    pub max_pool_size: usize,

    /// How many ids `PlaybackPoolManager::preload` warms at most
    pub max_preload_count: usize,

    /// Interval of the periodic time observer installed per session
    pub time_observer_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 3,
            max_preload_count: 2,
            time_observer_interval: Duration::from_millis(100),
        }
    }
}

/// What `cleanup_expired_cache` does once the disk tier is over budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum CachePurgePolicy {
    /// Drop every cached response and forget all completed preloads
    #[default]
    Full,
    /// Evict least recently used entries until the budget is met
    Lru,
}

/// Look-ahead preloading.
#[derive(Debug, Clone)]
pub struct PreloadConfig {
    /// Number of upcoming feed items to warm
    pub preload_count: usize,

    /// Bytes requested per item (`Range: bytes=0-{max_preload_bytes-1}`)
    pub max_preload_bytes: u64,

    /// Disk usage above which `cleanup_expired_cache` purges
    pub max_cache_bytes: u64,

    pub purge_policy: CachePurgePolicy,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            preload_count: 2,
            max_preload_bytes: 10 * MIB,
            max_cache_bytes: 200 * MIB,
            purge_policy: CachePurgePolicy::Full,
        }
    }
}

/// Shared byte-range cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding cached bodies and their sidecars
    pub cache_dir: PathBuf,

    /// Capacity of the in-memory tier in bytes
    pub memory_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            cache_dir: base.join("reel").join("ShortVideoCache"),
            memory_capacity: 50 * MIB,
        }
    }
}

/// Headless backend timing and probing.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Step of the simulated playback clock
    pub tick: Duration,

    /// Bytes fetched to locate `moov` when nothing is cached
    pub probe_bytes: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            probe_bytes: 2 * MIB,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default)]
pub struct ReelConfig {
    pub client: ClientConfig,
    pub pool: PoolConfig,
    pub preload: PreloadConfig,
    pub cache: CacheConfig,
    pub headless: HeadlessConfig,
}

impl ReelConfig {
    pub fn builder() -> crate::builder::ReelConfigBuilder {
        crate::builder::ReelConfigBuilder::new()
    }
}
