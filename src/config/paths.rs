//! `[paths]` section configuration.
//!
//! Source and output locations, all relative to the theme root until
//! [`ThemeConfig::update_with_cli`](super::ThemeConfig::update_with_cli)
//! normalizes them to absolute paths.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `[paths]` section in themewright.toml.
///
/// # Example
/// ```toml
/// [paths]
/// styles = "assets/scss"
/// output = "build"
/// templates = ["templates", "parts", "patterns"]
/// error_log = "~/sites/dev/wp-content/debug.log"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Theme root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::paths::root")]
    #[educe(Default = defaults::paths::root())]
    pub root: Option<PathBuf>,

    /// Style entry points (`.scss`, `.sass`, `.css`); `_partials` are not entries.
    #[serde(default = "defaults::paths::styles")]
    #[educe(Default = defaults::paths::styles())]
    pub styles: PathBuf,

    /// Script entry points (`.js`, `.ts`, ...).
    #[serde(default = "defaults::paths::scripts")]
    #[educe(Default = defaults::paths::scripts())]
    pub scripts: PathBuf,

    #[serde(default = "defaults::paths::images")]
    #[educe(Default = defaults::paths::images())]
    pub images: PathBuf,

    #[serde(default = "defaults::paths::fonts")]
    #[educe(Default = defaults::paths::fonts())]
    pub fonts: PathBuf,

    /// One sub-directory per block, each with a `block.json`.
    #[serde(default = "defaults::paths::blocks")]
    #[educe(Default = defaults::paths::blocks())]
    pub blocks: PathBuf,

    /// Build output directory.
    #[serde(default = "defaults::paths::output")]
    #[educe(Default = defaults::paths::output())]
    pub output: PathBuf,

    /// HTML template directories formatted by the `html` component.
    #[serde(default = "defaults::paths::templates")]
    #[educe(Default = defaults::paths::templates())]
    pub templates: Vec<PathBuf>,

    /// Directories scanned for `.php` files.
    #[serde(default = "defaults::paths::php")]
    #[educe(Default = defaults::paths::php())]
    pub php: Vec<PathBuf>,

    /// Global styles/settings file used to generate style variables.
    #[serde(default = "defaults::paths::theme_json")]
    #[educe(Default = defaults::paths::theme_json())]
    pub theme_json: PathBuf,

    /// CMS debug log tailed by the `errorlog` component (`~` is expanded).
    #[serde(default = "defaults::paths::error_log")]
    #[educe(Default = defaults::paths::error_log())]
    pub error_log: PathBuf,

    /// Directory names skipped while scanning and watching.
    #[serde(default = "defaults::paths::ignore")]
    #[educe(Default = defaults::paths::ignore())]
    pub ignore: Vec<String>,
}

impl PathsConfig {
    /// Check whether a path passes through an ignored directory or the output dir.
    pub fn is_ignored(&self, path: &Path) -> bool {
        if path.starts_with(&self.output) {
            return true;
        }
        path.components().any(|c| {
            let name = c.as_os_str().to_string_lossy();
            self.ignore.iter().any(|ignored| *ignored == name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::ThemeConfig;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_paths_defaults() {
        let config: ThemeConfig = toml::from_str("").unwrap();
        assert_eq!(config.paths.styles, PathBuf::from("src/styles"));
        assert_eq!(config.paths.output, PathBuf::from("dist"));
        assert_eq!(config.paths.templates.len(), 2);
        assert!(config.paths.ignore.iter().any(|i| i == "node_modules"));
    }

    #[test]
    fn test_paths_override() {
        let config: ThemeConfig = toml::from_str(
            r#"
            [paths]
            styles = "assets/scss"
            templates = ["patterns"]
        "#,
        )
        .unwrap();
        assert_eq!(config.paths.styles, PathBuf::from("assets/scss"));
        assert_eq!(config.paths.templates, vec![PathBuf::from("patterns")]);
        // untouched fields keep defaults
        assert_eq!(config.paths.scripts, PathBuf::from("src/scripts"));
    }

    #[test]
    fn test_is_ignored() {
        let mut config = ThemeConfig::default();
        config.paths.output = PathBuf::from("/theme/dist");

        assert!(config.paths.is_ignored(Path::new("/theme/dist/css/main.css")));
        assert!(config.paths.is_ignored(Path::new("/theme/node_modules/x/index.js")));
        assert!(!config.paths.is_ignored(Path::new("/theme/src/styles/main.scss")));
    }
}
