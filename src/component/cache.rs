//! The `cache` component: loads and prunes the build manifest.
//!
//! Selecting it is what turns caching on; the other components only consult
//! the shared [`BuildCache`](crate::cache::BuildCache).

use super::{BoxFuture, Component, ComponentEnv, ComponentKind};
use crate::{
    cache::SharedCache,
    debug, log,
    watch::{Session, WatchHandle},
};
use anyhow::Result;
use std::sync::Arc;

pub struct CacheComponent {
    cache: SharedCache,
}

impl CacheComponent {
    pub fn new(env: &ComponentEnv) -> Self {
        Self {
            cache: Arc::clone(&env.cache),
        }
    }
}

impl Component for CacheComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Cache
    }

    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let (pruned, stats, enabled) = {
                let mut cache = self.cache.lock();
                let pruned = cache.init();
                (pruned, cache.stats(), cache.is_enabled())
            };

            if !enabled {
                debug!("cache"; "disabled");
                return Ok(());
            }
            if pruned > 0 {
                log!("cache"; "pruned {pruned} stale entries");
            }
            debug!("cache"; "{} entries in {}", stats.entries, stats.path.display());
            Ok(())
        })
    }

    /// Nothing to watch: the drivers invalidate entries themselves.
    fn watch(self: Arc<Self>, _session: Session) -> Result<WatchHandle> {
        Ok(WatchHandle::idle(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::BuildCache, config::ThemeConfig};
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_loads_persisted_entries() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join(".themewright/build-cache.json");
        let input = dir.path().join("a.scss");
        let output = dir.path().join("a.css");
        fs::write(&input, "$x:1").unwrap();
        fs::write(&output, "").unwrap();

        let mut first = BuildCache::new(dir.path(), &manifest);
        first.update_cache(&input, &output, &[]);

        let cache = BuildCache::new(dir.path(), &manifest).shared();
        let env = ComponentEnv::new(Arc::new(ThemeConfig::default()), Arc::clone(&cache));
        CacheComponent::new(&env).init().await.unwrap();

        assert_eq!(cache.lock().stats().entries, 1);
        assert!(!cache.lock().needs_rebuild(&input, &output, &[]));
    }
}
