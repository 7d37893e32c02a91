//! Command-line interface definitions.
//!
//! Defines all CLI arguments using clap.

use crate::component::ComponentKind;
use clap::Parser;
use std::path::PathBuf;

/// themewright - incremental theme build orchestrator
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Theme root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (relative to root)
    #[arg(short = 'C', long, default_value = "themewright.toml")]
    pub config: PathBuf,

    /// Keep running: start the dev server and rebuild on change
    #[arg(short, long)]
    pub watch: bool,

    /// Restrict the active components, e.g. `--builds=styles,scripts`
    #[arg(short, long, value_delimiter = ',', value_parser = parse_kind)]
    pub builds: Option<Vec<ComponentKind>>,

    /// Ignore the build cache and rebuild everything
    #[arg(long)]
    pub no_cache: bool,

    /// Delete the build cache manifest and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Print debug output
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_kind(s: &str) -> Result<ComponentKind, String> {
    s.parse()
}
