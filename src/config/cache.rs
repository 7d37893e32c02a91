//! `[cache]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[cache]` section in themewright.toml - persistent build cache.
///
/// # Example
/// ```toml
/// [cache]
/// enable = true
/// path = ".themewright/build-cache.json"
/// retention_days = 7
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Skip up-to-date builds. `--no-cache` turns this off for one run.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub enable: bool,

    /// Manifest location, relative to the theme root.
    #[serde(default = "defaults::cache::path")]
    #[educe(Default = defaults::cache::path())]
    pub path: PathBuf,

    /// Entries untouched for longer than this are pruned on startup.
    #[serde(default = "defaults::cache::retention_days")]
    #[educe(Default = defaults::cache::retention_days())]
    pub retention_days: u64,

    /// Set by `--no-cache`: every staleness check answers "rebuild",
    /// successful builds are still recorded.
    #[serde(skip)]
    pub bypass: bool,
}

#[cfg(test)]
mod tests {
    use super::super::ThemeConfig;

    #[test]
    fn test_cache_config_defaults() {
        let config: ThemeConfig = toml::from_str("").unwrap();
        assert!(config.cache.enable);
        assert_eq!(config.cache.retention_days, 7);
        assert!(config.cache.path.ends_with("build-cache.json"));
    }

    #[test]
    fn test_cache_disabled() {
        let config: ThemeConfig = toml::from_str("[cache]\nenable = false").unwrap();
        assert!(!config.cache.enable);
    }
}
