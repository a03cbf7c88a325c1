use std::sync::Arc;
use std::time::Duration;

use reel_engine::config::MIB;
use reel_engine::{
    CacheManager, HeadlessBackend, HttpRangeFetcher, PlayOptions, PlaybackPoolManager,
    PlaybackState, PreloadScheduler, ProxyConfig, ReelConfig, ReelMetrics,
};
use tracing::{debug, info};

use crate::cli::{Args, CacheAction};
use crate::error::{AppError, Result};
use crate::feed::read_feed;

pub fn build_config(args: &Args) -> ReelConfig {
    let mut builder = ReelConfig::builder()
        .preload_count(args.preload_count)
        .max_preload_count(args.preload_count)
        .max_preload_bytes(args.max_preload_mb.saturating_mul(MIB))
        .max_cache_bytes(args.max_cache_mb.saturating_mul(MIB))
        .purge_policy(args.purge_policy)
        .proxy(args.proxy.clone().map(ProxyConfig::from_url));

    if let Some(dir) = &args.cache_dir {
        builder = builder.cache_dir(dir.clone());
    }
    if let Some(user_agent) = &args.user_agent {
        builder = builder.user_agent(user_agent.clone());
    }
    builder.build()
}

/// Engine components wired around one cache and one HTTP client.
pub struct Engine {
    pub config: ReelConfig,
    pub cache: Arc<CacheManager>,
    pub fetcher: Arc<HttpRangeFetcher>,
    pub metrics: Arc<ReelMetrics>,
    pub scheduler: PreloadScheduler,
}

impl Engine {
    pub async fn open(config: ReelConfig) -> Result<Self> {
        let cache = Arc::new(CacheManager::open(config.cache.clone()).await?);
        let fetcher = Arc::new(HttpRangeFetcher::from_config(&config.client)?);
        let metrics = Arc::new(ReelMetrics::new());
        let scheduler = PreloadScheduler::new(
            config.preload.clone(),
            fetcher.clone(),
            cache.clone(),
            metrics.clone(),
        );
        Ok(Self {
            config,
            cache,
            fetcher,
            metrics,
            scheduler,
        })
    }

    fn pool_manager(&self) -> PlaybackPoolManager {
        let backend = Arc::new(HeadlessBackend::new(
            self.config.headless.clone(),
            self.fetcher.clone(),
            self.cache.clone(),
            self.metrics.clone(),
        ));
        PlaybackPoolManager::with_metrics(self.config.pool.clone(), backend, self.metrics.clone())
    }

    fn print_cache_size(&self) {
        println!(
            "cache: {:.2} MiB in {} entries ({})",
            self.scheduler.cache_size_mb(),
            self.cache.len(),
            self.cache.dir().display()
        );
    }
}

fn check_index(feed: &[String], index: usize) -> Result<()> {
    if index >= feed.len() {
        return Err(AppError::InvalidInput(format!(
            "index {} is past the end of a feed of {} items",
            index,
            feed.len()
        )));
    }
    Ok(())
}

pub async fn warm(engine: &Engine, feed_path: &std::path::Path, index: usize, walk: bool) -> Result<()> {
    let feed = read_feed(feed_path).await?;
    check_index(&feed, index)?;

    let last = if walk { feed.len() - 1 } else { index };
    for current in index..=last {
        let window = engine.scheduler.preload_videos(&feed, current);
        engine.scheduler.wait_idle().await;
        for id in &window {
            println!("[{current}] {:<10} {id}", engine.scheduler.status(id.as_str()).to_string());
        }
        if engine.scheduler.cleanup_expired_cache().await? {
            info!("Cache purged after exceeding its budget");
        }
    }

    engine.print_cache_size();
    engine.metrics.log_summary();
    Ok(())
}

fn describe(state: &PlaybackState) -> String {
    format!(
        "{:>6.2}s / {:>6.2}s  {:>5.1}%  {}{}  {} ({:.3})",
        state.current_time,
        state.duration,
        state.progress * 100.0,
        if state.is_playing { "playing" } else { "paused" },
        if state.is_buffering { ", buffering" } else { "" },
        state.video_size,
        state.video_aspect_ratio,
    )
}

pub async fn play(
    engine: &Engine,
    feed_path: &std::path::Path,
    index: usize,
    dwell: Duration,
    options: PlayOptions,
) -> Result<()> {
    let feed = read_feed(feed_path).await?;
    check_index(&feed, index)?;
    let mut manager = engine.pool_manager();

    for current in index..feed.len() {
        let upcoming = engine.scheduler.preload_videos(&feed, current);
        manager.preload(upcoming);
        manager.play(feed[current].as_str(), options);
        debug!(index = current, pooled = manager.pool_len(), "Swiped");

        manager.pump_for(dwell).await;
        println!("[{current}] {}  {}", describe(&manager.state()), feed[current]);
    }

    manager.clear_pool();
    engine.scheduler.cancel_all_preloads();
    engine.scheduler.cleanup_expired_cache().await?;
    engine.print_cache_size();
    engine.metrics.log_summary();
    Ok(())
}

pub async fn cache(engine: &Engine, action: CacheAction) -> Result<()> {
    match action {
        CacheAction::Size => {}
        CacheAction::Clear => engine.scheduler.clear_cache().await?,
        CacheAction::Trim => {
            if !engine.scheduler.cleanup_expired_cache().await? {
                println!("cache within budget");
            }
        }
    }
    engine.print_cache_size();
    Ok(())
}
