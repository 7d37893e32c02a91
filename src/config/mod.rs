//! Theme configuration management for `themewright.toml`.
//!
//! # Sections
//!
//! | Section    | Purpose                                          |
//! |------------|--------------------------------------------------|
//! | `[paths]`  | Source directories, output, error log            |
//! | `[build]`  | Active components and external commands          |
//! | `[cache]`  | Persistent build cache                           |
//! | `[watch]`  | Debounce window and busy-unit policy             |
//! | `[serve]`  | Live-reload server (interface, ports)            |
//!
//! # Example
//!
//! ```toml
//! [paths]
//! styles = "src/styles"
//! output = "dist"
//!
//! [build]
//! components = ["cache", "styles", "scripts", "blocks", "server"]
//!
//! [watch]
//! debounce_ms = 500
//!
//! [serve]
//! port = 3000
//! ```
//!
//! A missing config file is not an error: every field has a default.

mod build;
mod cache;
pub mod defaults;
mod error;
mod paths;
mod serve;
mod watch;

pub use error::ConfigError;

pub use build::BuildConfig;
pub use cache::CacheConfig;
pub use paths::PathsConfig;
pub use serve::ServeConfig;
pub use watch::WatchConfig;

use crate::{cli::Cli, component::ComponentKind, log};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing themewright.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ThemeConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub serve: ServeConfig,
}

impl ThemeConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: ThemeConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load, apply CLI overrides and validate.
    ///
    /// Falls back to defaults when the config file does not exist.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.update_with_cli(cli);
        config.validate()?;

        Ok(config)
    }

    /// Get the theme root directory path
    pub fn get_root(&self) -> &Path {
        self.paths.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Absolute manifest location.
    pub fn cache_path(&self) -> PathBuf {
        self.get_root().join(&self.cache.path)
    }

    /// Path relative to the theme root for log display.
    pub fn rel<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        path.strip_prefix(self.get_root())
            .unwrap_or(path)
            .to_string_lossy()
    }

    /// Configured components in canonical order.
    pub fn active_components(&self) -> Vec<ComponentKind> {
        ComponentKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.build.components.contains(kind))
            .collect()
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| self.get_root().to_owned());
        let root = normalize_path(&root);

        self.config_path = normalize_path(&root.join(&cli.config));
        self.update_path_with_root(&root);

        if let Some(builds) = &cli.builds {
            self.build.components.retain(|kind| builds.contains(kind));
            // Explicitly requested components are honored even if not configured
            for kind in builds {
                if !self.build.components.contains(kind) {
                    self.build.components.push(*kind);
                }
            }
        }

        if cli.no_cache {
            self.cache.bypass = true;
        }
    }

    /// Normalize all paths to absolute, relative to the root
    fn update_path_with_root(&mut self, root: &Path) {
        self.paths.root = Some(root.to_path_buf());

        let join = |p: &Path| normalize_path(&root.join(p));

        self.paths.styles = join(&self.paths.styles);
        self.paths.scripts = join(&self.paths.scripts);
        self.paths.images = join(&self.paths.images);
        self.paths.fonts = join(&self.paths.fonts);
        self.paths.blocks = join(&self.paths.blocks);
        self.paths.output = join(&self.paths.output);
        self.paths.theme_json = join(&self.paths.theme_json);
        self.serve.root = join(&self.serve.root);
        self.paths.templates = self.paths.templates.iter().map(|p| join(p)).collect();
        self.paths.php = self.paths.php.iter().map(|p| join(p)).collect();
        self.build.style_load_paths = self
            .build
            .style_load_paths
            .iter()
            .map(|p| join(p))
            .collect();

        // Error log usually lives outside the theme, allow `~/...`
        let expanded = shellexpand::tilde(&self.paths.error_log.to_string_lossy()).into_owned();
        self.paths.error_log = join(Path::new(&expanded));
    }

    /// Validate configuration.
    ///
    /// Missing external tools are reported as warnings: the affected
    /// component fails its own builds, the rest keep working.
    pub fn validate(&self) -> Result<()> {
        if self.serve.port == self.serve.reload_port {
            bail!(ConfigError::Validation(
                "[serve.port] and [serve.reload_port] must differ".into()
            ));
        }

        if self.watch.debounce_ms > 60_000 {
            bail!(ConfigError::Validation(
                "[watch.debounce_ms] must not exceed 60000".into()
            ));
        }

        for kind in self.active_components() {
            if let Some(command) = self.build.commands.for_kind(kind)
                && let Some(program) = command.first()
                && which::which(program).is_err()
            {
                log!("warn"; "`{program}` not found, {} builds will fail", kind.name());
            }
        }

        Ok(())
    }
}

/// Normalize a path to absolute, using canonicalize if the path exists
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
