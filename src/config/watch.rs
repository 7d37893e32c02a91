//! `[watch]` section configuration.

use super::defaults;
use crate::watch::BusyPolicy;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[watch]` section in themewright.toml - change coalescing.
///
/// # Example
/// ```toml
/// [watch]
/// debounce_ms = 800
/// on_busy = "drop"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Quiet period before a block (directory) unit rebuilds.
    /// Single-file units rebuild immediately.
    #[serde(default = "defaults::watch::debounce_ms")]
    #[educe(Default = defaults::watch::debounce_ms())]
    pub debounce_ms: u64,

    /// What happens when a unit's timer fires while it is still building.
    #[serde(default)]
    pub on_busy: BusyPolicy,
}

impl WatchConfig {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
