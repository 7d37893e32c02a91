//! Build components, one per asset family.
//!
//! Every component implements [`Component`]: `init` runs the initial build,
//! `watch` starts its watch loop for a session. Unit-based families
//! (styles, scripts, images, fonts, blocks, php, html) share
//! [`AssetComponent`] and differ only in their [`UnitSource`].
//!
//! | Kind       | Units                               | Action               |
//! |------------|-------------------------------------|----------------------|
//! | `cache`    | -                                   | load / prune manifest|
//! | `styles`   | top-level non-partial style files   | style compiler       |
//! | `scripts`  | top-level script files              | bundler              |
//! | `images`   | every file below `[paths] images`   | command or copy      |
//! | `fonts`    | every file below `[paths] fonts`    | command or copy      |
//! | `blocks`   | every directory with a `block.json` | block compiler       |
//! | `php`      | every `.php` file                   | linter (in place)    |
//! | `html`     | every template `.html` file         | formatter (in place) |
//! | `errorlog` | -                                   | tail the CMS log     |
//! | `server`   | -                                   | static + live reload |

mod asset;
mod assets;
mod blocks;
mod cache;
mod errorlog;
mod lint;
mod scripts;
mod server;
mod styles;

pub use asset::{AssetComponent, UnitSource};

use crate::{
    action::{BuildAction, CommandAction, CopyAction, CopyFrom},
    cache::SharedCache,
    config::{PathsConfig, ThemeConfig},
    deps::DependencyResolver,
    logger::format_duration,
    watch::{Session, WatchHandle},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use walkdir::WalkDir;

/// Boxed `Send` future, for trait methods returning futures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Cache,
    Styles,
    Scripts,
    Images,
    Fonts,
    Blocks,
    Php,
    Html,
    ErrorLog,
    Server,
}

impl ComponentKind {
    /// Canonical order.
    pub const ALL: &'static [Self] = &[
        Self::Cache,
        Self::Styles,
        Self::Scripts,
        Self::Images,
        Self::Fonts,
        Self::Blocks,
        Self::Php,
        Self::Html,
        Self::ErrorLog,
        Self::Server,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Styles => "styles",
            Self::Scripts => "scripts",
            Self::Images => "images",
            Self::Fonts => "fonts",
            Self::Blocks => "blocks",
            Self::Php => "php",
            Self::Html => "html",
            Self::ErrorLog => "errorlog",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|k| k.name()).collect();
                format!("unknown component `{s}`, expected one of: {}", names.join(", "))
            })
    }
}

// ============================================================================
// Units and results
// ============================================================================

/// One independently buildable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUnit {
    /// Stable label, unique within its component.
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl BuildUnit {
    pub fn new(name: impl Into<String>, input: &Path, output: &Path) -> Self {
        Self {
            name: name.into(),
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
    Built(Duration),
    /// Up to date, or nothing to run.
    Fresh,
    Failed(String),
}

/// Counts of one `process` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub built: usize,
    pub fresh: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl ProcessSummary {
    pub fn record(&mut self, result: &BuildResult) {
        match result {
            BuildResult::Built(_) => self.built += 1,
            BuildResult::Fresh => self.fresh += 1,
            BuildResult::Failed(_) => self.failed += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.built + self.fresh + self.failed
    }
}

impl fmt::Display for ProcessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} built, {} fresh", self.built, self.fresh)?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        write!(f, " in {}", format_duration(self.duration))
    }
}

// ============================================================================
// Component capability
// ============================================================================

pub trait Component: Send + Sync + 'static {
    fn kind(&self) -> ComponentKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Initial build. An error removes the component for the rest of the run.
    fn init(&self) -> BoxFuture<'_, Result<()>>;

    /// Build every unit that needs it.
    fn process(&self) -> BoxFuture<'_, Result<ProcessSummary>> {
        Box::pin(async { Ok(ProcessSummary::default()) })
    }

    /// Build a single unit.
    fn build<'a>(&'a self, _unit: &'a BuildUnit) -> BoxFuture<'a, BuildResult> {
        Box::pin(async { BuildResult::Fresh })
    }

    /// Start watching. Called from inside the runtime.
    fn watch(self: Arc<Self>, session: Session) -> Result<WatchHandle>;
}

/// Per-run collaborators handed to every component.
#[derive(Clone)]
pub struct ComponentEnv {
    pub config: Arc<ThemeConfig>,
    pub cache: SharedCache,
    pub resolver: Arc<DependencyResolver>,
}

impl ComponentEnv {
    pub fn new(config: Arc<ThemeConfig>, cache: SharedCache) -> Self {
        let resolver = Arc::new(DependencyResolver::from_config(&config));
        Self {
            config,
            cache,
            resolver,
        }
    }

    /// Configured command of `kind`, `None` when empty.
    fn command(&self, kind: ComponentKind) -> Option<Arc<dyn BuildAction>> {
        let argv = self.config.build.commands.for_kind(kind)?;
        (!argv.is_empty())
            .then(|| Arc::new(CommandAction::new(argv, self.config.get_root())) as Arc<dyn BuildAction>)
    }

    /// Configured command, or a native copy.
    fn command_or_copy(&self, kind: ComponentKind, from: CopyFrom) -> Arc<dyn BuildAction> {
        self.command(kind)
            .unwrap_or_else(|| Arc::new(CopyAction::new(from)))
    }
}

/// Instantiate the component of `kind`.
pub fn create(kind: ComponentKind, env: &ComponentEnv) -> Arc<dyn Component> {
    match kind {
        ComponentKind::Cache => Arc::new(cache::CacheComponent::new(env)),
        ComponentKind::Styles => Arc::new(AssetComponent::new(styles::StyleSource::new(env), env)),
        ComponentKind::Scripts => {
            Arc::new(AssetComponent::new(scripts::ScriptSource::new(env), env))
        }
        ComponentKind::Images | ComponentKind::Fonts => {
            Arc::new(AssetComponent::new(assets::FileSource::new(kind, env), env))
        }
        ComponentKind::Blocks => Arc::new(AssetComponent::new(blocks::BlockSource::new(env), env)),
        ComponentKind::Php | ComponentKind::Html => {
            Arc::new(AssetComponent::new(lint::InPlaceSource::new(kind, env), env))
        }
        ComponentKind::ErrorLog => Arc::new(errorlog::ErrorLog::new(env)),
        ComponentKind::Server => Arc::new(server::ServerComponent::new(env)),
    }
}

// ============================================================================
// Discovery helpers
// ============================================================================

/// Files below `root` accepted by `keep`, skipping ignored paths, sorted.
fn walk_files(
    root: &Path,
    max_depth: usize,
    paths: &PathsConfig,
    keep: impl Fn(&Path) -> bool,
) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !paths.is_ignored(entry.path()))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| !crate::watch::is_temp_file(path) && keep(path))
        .collect();
    files.sort();
    files
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

/// `root`-relative, `/`-separated label.
fn unit_label(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
