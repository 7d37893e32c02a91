//! themewright - incremental build orchestrator for CMS themes.

mod action;
mod cache;
mod cli;
mod component;
mod config;
mod deps;
mod logger;
mod orchestrator;
mod serve;
mod watch;

use anyhow::{Context, Result};
use cache::BuildCache;
use clap::Parser;
use cli::Cli;
use config::ThemeConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    if cli.clear_cache {
        return clear_cache(&cli);
    }

    // Builds are subprocess waits and file I/O: one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(orchestrator::run(&cli))
}

/// Delete the manifest and exit.
fn clear_cache(cli: &Cli) -> Result<()> {
    let config = ThemeConfig::load(cli)?;
    let mut cache = BuildCache::from_config(&config, true);
    let path = cache.stats().path;
    cache
        .clear()
        .with_context(|| format!("Failed to remove {}", path.display()))?;
    log!("cache"; "cleared {}", config.rel(&path));
    Ok(())
}
