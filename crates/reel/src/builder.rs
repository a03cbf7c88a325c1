use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};

use crate::config::{CachePurgePolicy, ClientConfig, ReelConfig};
use crate::proxy::ProxyConfig;

pub struct ReelConfigBuilder {
    config: ReelConfig,
}

impl ReelConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReelConfig::default(),
        }
    }

    pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.config.cache.cache_dir = cache_dir.into();
        self
    }

    pub fn memory_capacity(mut self, bytes: u64) -> Self {
        self.config.cache.memory_capacity = bytes;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.client.user_agent = user_agent.into();
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.client.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.client.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.client.connect_timeout = timeout;
        self
    }

    pub fn proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.config.client.proxy = proxy;
        self
    }

    pub fn use_system_proxy(mut self, use_system_proxy: bool) -> Self {
        self.config.client.use_system_proxy = use_system_proxy;
        self
    }

    pub fn max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.config.pool.max_pool_size = max_pool_size;
        self
    }

    pub fn max_preload_count(mut self, count: usize) -> Self {
        self.config.pool.max_preload_count = count;
        self
    }

    pub fn time_observer_interval(mut self, interval: Duration) -> Self {
        self.config.pool.time_observer_interval = interval;
        self
    }

    pub fn preload_count(mut self, preload_count: usize) -> Self {
        self.config.preload.preload_count = preload_count;
        self
    }

    pub fn max_preload_bytes(mut self, bytes: u64) -> Self {
        self.config.preload.max_preload_bytes = bytes;
        self
    }

    pub fn max_cache_bytes(mut self, bytes: u64) -> Self {
        self.config.preload.max_cache_bytes = bytes;
        self
    }

    pub fn purge_policy(mut self, policy: CachePurgePolicy) -> Self {
        self.config.preload.purge_policy = policy;
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.config.headless.tick = tick;
        self
    }

    pub fn probe_bytes(mut self, bytes: u64) -> Self {
        self.config.headless.probe_bytes = bytes;
        self
    }

    /// Finish the configuration, merging custom headers over the defaults.
    pub fn build(mut self) -> ReelConfig {
        self.config.client = ClientConfig::with_config(self.config.client);
        self.config
    }
}

impl Default for ReelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIB;

    #[test]
    fn builder_overrides_sections() {
        let config = ReelConfig::builder()
            .cache_dir("/tmp/reel-test")
            .max_pool_size(5)
            .preload_count(3)
            .max_preload_bytes(4 * MIB)
            .purge_policy(CachePurgePolicy::Lru)
            .tick(Duration::from_millis(10))
            .build();

        assert_eq!(config.cache.cache_dir, PathBuf::from("/tmp/reel-test"));
        assert_eq!(config.pool.max_pool_size, 5);
        assert_eq!(config.preload.preload_count, 3);
        assert_eq!(config.preload.max_preload_bytes, 4 * MIB);
        assert_eq!(config.preload.purge_policy, CachePurgePolicy::Lru);
        assert_eq!(config.headless.tick, Duration::from_millis(10));
        // untouched sections keep their defaults
        assert_eq!(config.pool.max_preload_count, 2);
    }
}
