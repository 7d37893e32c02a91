//! The `server` component: static dev server plus live reload.

use super::{BoxFuture, Component, ComponentEnv, ComponentKind};
use crate::{
    config::ThemeConfig,
    log,
    serve::DevServer,
    watch::{Session, WatchHandle},
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::oneshot;

pub struct ServerComponent {
    config: Arc<ThemeConfig>,
}

impl ServerComponent {
    pub fn new(env: &ComponentEnv) -> Self {
        Self {
            config: Arc::clone(&env.config),
        }
    }
}

impl Component for ServerComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Server
    }

    /// Nothing to build; the server only runs in watch mode.
    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn watch(self: Arc<Self>, session: Session) -> Result<WatchHandle> {
        let server = DevServer::start(&self.config, session.reload.clone())?;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            if tokio::task::spawn_blocking(move || server.stop()).await.is_err() {
                log!("error"; "dev server shutdown failed");
            }
        });

        Ok(WatchHandle::new(self.name(), stop_tx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::BuildCache, serve::LiveReload};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_watch_starts_and_stops_server() {
        let dir = TempDir::new().unwrap();
        let mut config = ThemeConfig::default();
        config.serve.port = 0;
        config.serve.reload_port = 0;
        config.serve.root = dir.path().to_path_buf();

        let cache = BuildCache::new(dir.path(), &dir.path().join("m.json")).shared();
        let env = ComponentEnv::new(Arc::new(config), Arc::clone(&cache));
        let (session, _control) = Session::new(cache, LiveReload::new());

        let component = Arc::new(ServerComponent::new(&env));
        component.init().await.unwrap();
        let handle = component.watch(session).unwrap();
        assert_eq!(handle.name(), "server");
        handle.stop().await;
    }
}
