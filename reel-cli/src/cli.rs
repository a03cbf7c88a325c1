use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reel_engine::CachePurgePolicy;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Walk a short-video feed through the preloading player pool",
    long_about = None
)]
pub struct Args {
    /// Cache directory (defaults to the system cache dir)
    #[arg(long, global = true, env = "REEL_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `reel_engine=trace`
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// User agent sent with range requests
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Proxy URL (http://, https:// or socks5://)
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Number of upcoming feed items to warm
    #[arg(long, global = true, default_value_t = 2)]
    pub preload_count: usize,

    /// Bytes requested per preloaded item, in MiB
    #[arg(long, global = true, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_preload_mb: u64,

    /// Disk budget of the cache, in MiB
    #[arg(long, global = true, default_value_t = 200)]
    pub max_cache_mb: u64,

    /// What to do once the cache is over budget
    #[arg(long, global = true, value_enum, default_value = "full")]
    pub purge_policy: CachePurgePolicy,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Warm the items following a feed position
    Warm {
        /// Feed file, one URL per line
        feed: PathBuf,

        /// Current position in the feed
        #[arg(long, default_value_t = 0)]
        index: usize,

        /// Move through the rest of the feed after the first window
        #[arg(long)]
        walk: bool,
    },

    /// Play every feed item in turn with the headless backend
    Play {
        /// Feed file, one URL per line
        feed: PathBuf,

        /// Position to start from
        #[arg(long, default_value_t = 0)]
        index: usize,

        /// How long each item plays before swiping on, in milliseconds
        #[arg(long, default_value_t = 2000)]
        dwell_ms: u64,

        #[arg(long)]
        muted: bool,

        /// Do not restart items that reach their end
        #[arg(long)]
        no_loop: bool,
    },

    /// Inspect or purge the shared cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Print disk usage
    Size,
    /// Remove every cached response
    Clear,
    /// Purge if over the configured budget
    Trim,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let args = Args::try_parse_from([
            "reel",
            "warm",
            "feed.txt",
            "--index",
            "3",
            "--preload-count",
            "4",
            "--purge-policy",
            "lru",
        ])
        .unwrap();

        assert_eq!(args.preload_count, 4);
        assert_eq!(args.purge_policy, CachePurgePolicy::Lru);
        match args.command {
            Commands::Warm { feed, index, walk } => {
                assert_eq!(feed, PathBuf::from("feed.txt"));
                assert_eq!(index, 3);
                assert!(!walk);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn defaults_match_the_engine() {
        let args = Args::try_parse_from(["reel", "cache", "size"]).unwrap();
        assert_eq!(args.max_preload_mb, 10);
        assert_eq!(args.max_cache_mb, 200);
        assert_eq!(args.purge_policy, CachePurgePolicy::Full);
        assert!(matches!(
            args.command,
            Commands::Cache {
                action: CacheAction::Size
            }
        ));
    }

    #[test]
    fn zero_preload_size_is_rejected() {
        let err = Args::try_parse_from(["reel", "--max-preload-mb", "0", "cache", "size"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let args = Args::try_parse_from(["reel", "--max-preload-mb", "1", "cache", "size"]).unwrap();
        assert_eq!(args.max_preload_mb, 1);
    }
}
