mod cli;
mod commands;
mod error;
mod feed;

use std::process;
use std::time::Duration;

use clap::Parser;
use mimalloc::MiMalloc;
use reel_engine::PlayOptions;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Args, Commands};
use crate::commands::{Engine, build_config};
use crate::error::{AppError, Result};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const DEFAULT_DIRECTIVES: &str = "reel=info,reel_engine=info,mp4=info";

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = build_config(&args);
    info!(cache_dir = %config.cache.cache_dir.display(), "Starting reel");
    let engine = Engine::open(config).await?;

    match args.command {
        Commands::Warm { feed, index, walk } => {
            commands::warm(&engine, &feed, index, walk).await?;
        }
        Commands::Play {
            feed,
            index,
            dwell_ms,
            muted,
            no_loop,
        } => {
            let options = PlayOptions::default().muted(muted).looping(!no_loop);
            commands::play(&engine, &feed, index, Duration::from_millis(dwell_ms), options).await?;
        }
        Commands::Cache { action } => {
            commands::cache(&engine, action).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over `--log-level`; the default keeps this workspace at info.
fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if level == "info" => EnvFilter::new(DEFAULT_DIRECTIVES),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| AppError::Logging(format!("invalid log level `{level}`: {e}")))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;
    Ok(())
}
