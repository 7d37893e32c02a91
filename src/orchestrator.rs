//! Component lifecycle: initial build, watch phase, restart, pause, shutdown.
//!
//! # Watch session
//!
//! ```text
//! start server ──► init all (concurrent) ──► watch each ──► supervise
//!                     │ failures dropped                      │
//!                     ▼                                       ├─ p / c  pause / resume
//!                 none left ⇒ fatal                           ├─ r      stop all, reload config, again
//!                                                             └─ q, ^C  stop all, exit
//! ```

use crate::{
    cache::BuildCache,
    cli::Cli,
    component::{self, Component, ComponentEnv, ComponentKind},
    config::ThemeConfig,
    debug, log,
    logger::clear_screen,
    serve::LiveReload,
    watch::{Session, SessionControl, WatchHandle},
};
use anyhow::{Context, Result, bail};
use std::{
    io::BufRead,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinSet,
};

/// Requests from the keyboard reader and the Ctrl-C handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Restart,
    Pause,
    Resume,
    Quit,
}

impl Control {
    fn from_key(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "restart" => Some(Self::Restart),
            "p" | "pause" => Some(Self::Pause),
            "c" | "continue" | "resume" => Some(Self::Resume),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Run once, or keep watching until quit.
pub async fn run(cli: &Cli) -> Result<()> {
    let mut config = Arc::new(ThemeConfig::load(cli)?);

    if !cli.watch {
        run_session(config, None).await?;
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    install_interrupt(tx.clone())?;
    spawn_key_reader(tx);

    loop {
        log!("watch"; "keys: [r]estart, [p]ause, [c]ontinue, [q]uit");
        match run_session(Arc::clone(&config), Some(&mut rx)).await? {
            Control::Restart => {
                clear_screen();
                match ThemeConfig::load(cli) {
                    Ok(fresh) => config = Arc::new(fresh),
                    Err(e) => log!("error"; "{e:#}, keeping previous config"),
                }
            }
            _ => return Ok(()),
        }
    }
}

/// One orchestrator lifetime. Returns what ended it.
async fn run_session(
    config: Arc<ThemeConfig>,
    controls: Option<&mut UnboundedReceiver<Control>>,
) -> Result<Control> {
    let mut orchestrator = Orchestrator::new(config);

    let Some(controls) = controls else {
        orchestrator.initial_build().await?;
        return Ok(Control::Quit);
    };

    orchestrator.start_server();
    if let Err(e) = orchestrator.initial_build().await {
        orchestrator.stop().await;
        return Err(e);
    }
    orchestrator.start_watchers();

    let reason = orchestrator.supervise(controls).await;
    orchestrator.stop().await;
    Ok(reason)
}

/// First Ctrl-C quits gracefully, the second exits at once.
fn install_interrupt(tx: UnboundedSender<Control>) -> Result<()> {
    let interrupted = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        log!("watch"; "shutting down, Ctrl+C again to force");
        let _ = tx.send(Control::Quit);
    })
    .context("Failed to set Ctrl+C handler")
}

/// Line-based keyboard commands. The thread ends with stdin or the receiver.
fn spawn_key_reader(tx: UnboundedSender<Control>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match Control::from_key(&line) {
                Some(control) => {
                    if tx.send(control).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => log!("watch"; "unknown command `{}`", line.trim()),
            }
        }
    });
}

pub struct Orchestrator {
    /// Active components, canonical order.
    components: Vec<Arc<dyn Component>>,
    session: Session,
    control: SessionControl,
    handles: Vec<WatchHandle>,
    server: Option<WatchHandle>,
}

impl Orchestrator {
    pub fn new(config: Arc<ThemeConfig>) -> Self {
        let kinds = config.active_components();
        let cache_active = kinds.contains(&ComponentKind::Cache);
        let cache = BuildCache::from_config(&config, cache_active).shared();

        let env = ComponentEnv::new(config, Arc::clone(&cache));
        let components = kinds
            .into_iter()
            .map(|kind| component::create(kind, &env))
            .collect();
        let (session, control) = Session::new(cache, LiveReload::new());

        Self {
            components,
            session,
            control,
            handles: Vec::new(),
            server: None,
        }
    }

    pub fn kinds(&self) -> Vec<ComponentKind> {
        self.components.iter().map(|c| c.kind()).collect()
    }

    fn take(&mut self, kind: ComponentKind) -> Option<Arc<dyn Component>> {
        let index = self.components.iter().position(|c| c.kind() == kind)?;
        Some(self.components.remove(index))
    }

    /// Start the dev server ahead of the initial builds.
    fn start_server(&mut self) {
        let Some(server) = self.take(ComponentKind::Server) else {
            return;
        };
        self.components.insert(0, Arc::clone(&server));

        match server.watch(self.session.clone()) {
            Ok(handle) => self.server = Some(handle),
            Err(e) => log!("warn"; "server failed to start: {e:#}"),
        }
    }

    /// `init` every component, concurrently. Failed components are dropped.
    ///
    /// The cache goes first: every other component reads its manifest.
    pub async fn initial_build(&mut self) -> Result<()> {
        if let Some(cache) = self.take(ComponentKind::Cache) {
            match cache.init().await {
                Ok(()) => self.components.insert(0, cache),
                Err(e) => log!("warn"; "cache failed to initialize: {e:#}"),
            }
        }

        let mut tasks = JoinSet::new();
        for (index, component) in self.components.iter().enumerate() {
            if component.kind() == ComponentKind::Cache {
                continue;
            }
            let component = Arc::clone(component);
            tasks.spawn(async move { (index, component.init().await) });
        }

        let mut failed = Vec::new();
        while let Some(done) = tasks.join_next().await {
            match done {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(e))) => {
                    log!("warn"; "{} failed to initialize: {e:#}", self.components[index].name());
                    failed.push(index);
                }
                Err(e) => log!("error"; "init task failed: {e}"),
            }
        }

        failed.sort_unstable();
        for index in failed.into_iter().rev() {
            self.components.remove(index);
        }

        if self.components.is_empty() {
            bail!("no active components left");
        }
        let names: Vec<_> = self.kinds().iter().map(|k| k.name()).collect();
        debug!("build"; "active: {}", names.join(", "));
        Ok(())
    }

    /// Start every watcher in order; the already running server moves last.
    fn start_watchers(&mut self) {
        if let Some(server) = self.take(ComponentKind::Server) {
            self.components.push(server);
        }

        for component in &self.components {
            if component.kind() == ComponentKind::Server {
                continue;
            }
            match Arc::clone(component).watch(self.session.clone()) {
                Ok(handle) => {
                    debug!("watch"; "{} watching", handle.name());
                    self.handles.push(handle);
                }
                Err(e) => log!("warn"; "{} cannot watch: {e:#}", component.name()),
            }
        }
    }

    /// Handle pause and resume until a restart or quit request.
    pub async fn supervise(&mut self, controls: &mut UnboundedReceiver<Control>) -> Control {
        while let Some(control) = controls.recv().await {
            match control {
                Control::Pause if !self.control.is_paused() => {
                    self.control.pause();
                    log!("watch"; "paused, press c to continue");
                }
                Control::Resume if self.control.is_paused() => {
                    self.control.resume();
                    log!("watch"; "resumed");
                }
                Control::Pause | Control::Resume => {}
                Control::Restart | Control::Quit => return control,
            }
        }
        Control::Quit
    }

    /// Stop every watcher, waiting for in-flight builds; the server goes last.
    pub async fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.stop().await;
        }
        if let Some(server) = self.server.take() {
            server.stop().await;
        }
    }

    #[cfg(test)]
    fn is_paused(&self) -> bool {
        self.control.is_paused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, path::Path};
    use tempfile::TempDir;

    fn config(root: &Path, kinds: &[ComponentKind]) -> Arc<ThemeConfig> {
        let mut config = ThemeConfig::default();
        config.paths.root = Some(root.to_path_buf());
        config.paths.images = root.join("src/images");
        config.paths.fonts = root.join("src/fonts");
        config.paths.output = root.join("dist");
        config.paths.error_log = root.join("debug.log");
        config.build.components = kinds.to_vec();
        Arc::new(config)
    }

    fn theme() -> TempDir {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("src/images");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("logo.svg"), "<svg/>").unwrap();
        dir
    }

    #[test]
    fn test_control_keys() {
        assert_eq!(Control::from_key("r\n"), Some(Control::Restart));
        assert_eq!(Control::from_key(" P "), Some(Control::Pause));
        assert_eq!(Control::from_key("c"), Some(Control::Resume));
        assert_eq!(Control::from_key("q"), Some(Control::Quit));
        assert_eq!(Control::from_key("x"), None);
    }

    #[tokio::test]
    async fn test_failed_components_are_removed() {
        let dir = theme();
        let kinds = [ComponentKind::Cache, ComponentKind::Images, ComponentKind::Fonts, ComponentKind::ErrorLog];
        let mut orchestrator = Orchestrator::new(config(dir.path(), &kinds));

        orchestrator.initial_build().await.unwrap();
        assert_eq!(orchestrator.kinds(), vec![ComponentKind::Cache, ComponentKind::Images]);
        assert!(dir.path().join("dist/images/logo.svg").is_file());
    }

    #[tokio::test]
    async fn test_no_components_left_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut orchestrator = Orchestrator::new(config(dir.path(), &[ComponentKind::Fonts]));

        let err = orchestrator.initial_build().await.unwrap_err();
        assert!(err.to_string().contains("no active components"));
    }

    #[tokio::test]
    async fn test_second_run_hits_cache() {
        let dir = theme();
        let kinds = [ComponentKind::Cache, ComponentKind::Images];

        Orchestrator::new(config(dir.path(), &kinds)).initial_build().await.unwrap();
        let manifest = dir.path().join(".themewright/build-cache.json");
        assert!(manifest.is_file());

        fs::remove_file(dir.path().join("dist/images/logo.svg")).unwrap();
        Orchestrator::new(config(dir.path(), &kinds)).initial_build().await.unwrap();
        // missing output forces the rebuild
        assert!(dir.path().join("dist/images/logo.svg").is_file());
    }

    #[tokio::test]
    async fn test_supervise_pause_resume_quit() {
        let dir = theme();
        let mut orchestrator = Orchestrator::new(config(dir.path(), &[ComponentKind::Cache]));
        orchestrator.initial_build().await.unwrap();
        orchestrator.start_watchers();

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Control::Pause).unwrap();
        tx.send(Control::Restart).unwrap();
        assert_eq!(orchestrator.supervise(&mut rx).await, Control::Restart);
        assert!(orchestrator.is_paused());

        tx.send(Control::Resume).unwrap();
        drop(tx);
        assert_eq!(orchestrator.supervise(&mut rx).await, Control::Quit);
        assert!(!orchestrator.is_paused());

        orchestrator.stop().await;
        assert!(orchestrator.handles.is_empty());
    }

    #[tokio::test]
    async fn test_watch_session_with_server() {
        let dir = theme();
        let mut config = (*config(dir.path(), &[ComponentKind::Images, ComponentKind::Server])).clone();
        config.serve.port = 0;
        config.serve.reload_port = 0;
        config.serve.root = dir.path().to_path_buf();

        let mut orchestrator = Orchestrator::new(Arc::new(config));
        orchestrator.start_server();
        assert!(orchestrator.server.is_some());

        orchestrator.initial_build().await.unwrap();
        orchestrator.start_watchers();
        assert_eq!(orchestrator.kinds(), vec![ComponentKind::Images, ComponentKind::Server]);
        assert_eq!(orchestrator.handles.len(), 1);

        orchestrator.stop().await;
        assert!(orchestrator.server.is_none());
    }
}
