//! Filesystem watching for incremental rebuilds.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  FsEvent   ┌────────────────────── per component task ───────────────────┐
//! │ notify   │──────────▶ │ unlink ──▶ BuildCache::invalidate_* ──▶ refresh graph         │
//! │ (thread) │  unbounded │ add/change ──▶ graph lookup ──▶ ChangeCoalescer ──▶ JoinSet  │
//! └──────────┘  channel   │                                   ▲            build │        │
//!                         │                                   └──── finish ◀─────┘        │
//!                         └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each component owns its watcher, coalescer and dependency graph for the
//! lifetime of one [`WatchHandle`]. Shared state (cache, pause flag, live
//! reload) arrives through [`Session`].

mod coalescer;
mod driver;

pub use coalescer::{BusyPolicy, ChangeCoalescer};
pub use driver::{Watched, drive};

use crate::{cache::SharedCache, debug, serve::LiveReload};
use anyhow::{Context, Result, bail};
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
};
use std::path::{Path, PathBuf};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Add,
    Change,
    Unlink,
    AddDir,
    UnlinkDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Check if path is a temp/backup file (editor artifacts).
pub fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
        || name == ".DS_Store"
}

/// Translate a raw notify event into zero or more [`FsEvent`]s.
///
/// Ambiguous kinds are decided by looking at the disk.
pub fn translate(event: Event) -> Vec<FsEvent> {
    use FsEventKind::*;

    let added = |path: &Path| if path.is_dir() { AddDir } else { Add };

    let pairs: Vec<(FsEventKind, PathBuf)> = match event.kind {
        EventKind::Create(CreateKind::Folder) => event.paths.into_iter().map(|p| (AddDir, p)).collect(),
        EventKind::Create(_) => event.paths.into_iter().map(|p| (added(&p), p)).collect(),

        EventKind::Remove(RemoveKind::Folder) => event.paths.into_iter().map(|p| (UnlinkDir, p)).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(|p| (Unlink, p)).collect(),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![(Unlink, from), (added(&to), to)],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(|p| (Unlink, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .into_iter()
            .map(|p| if p.exists() { (added(&p), p) } else { (Unlink, p) })
            .collect(),

        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event
            .paths
            .into_iter()
            .filter(|p| !p.is_dir())
            .map(|p| (Change, p))
            .collect(),

        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    };

    pairs
        .into_iter()
        .filter(|(_, path)| !is_temp_file(path))
        .map(|(kind, path)| FsEvent::new(kind, path))
        .collect()
}

// =============================================================================
// Watcher
// =============================================================================

/// OS watcher feeding an async channel. Dropping it stops the events.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Watch every existing root: directories recursively, files alone.
    ///
    /// Fails when no root exists.
    pub fn new(roots: &[PathBuf]) -> Result<(Self, mpsc::UnboundedReceiver<FsEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for fs_event in translate(event) {
                    // Receiver gone means the session stopped
                    let _ = tx.send(fs_event);
                }
            }
            Err(e) => crate::log!("watch"; "notify error: {e}"),
        })
        .context("Failed to create file watcher")?;

        let mut watched = 0;
        for root in roots {
            let mode = if root.is_dir() {
                RecursiveMode::Recursive
            } else if root.is_file() {
                RecursiveMode::NonRecursive
            } else {
                debug!("watch"; "skipping missing {}", root.display());
                continue;
            };
            watcher
                .watch(root, mode)
                .with_context(|| format!("Failed to watch {}", root.display()))?;
            watched += 1;
        }

        if watched == 0 {
            bail!("nothing to watch");
        }
        Ok((Self { _watcher: watcher }, rx))
    }
}

// =============================================================================
// Session
// =============================================================================

/// State shared by every watcher of one orchestrator run.
#[derive(Clone)]
pub struct Session {
    pub cache: SharedCache,
    pub reload: LiveReload,
    paused: watch::Receiver<bool>,
}

impl Session {
    pub fn new(cache: SharedCache, reload: LiveReload) -> (Self, SessionControl) {
        let (tx, rx) = watch::channel(false);
        let session = Self {
            cache,
            reload,
            paused: rx,
        };
        (session, SessionControl { paused: tx })
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }
}

/// Orchestrator side of the pause flag.
pub struct SessionControl {
    paused: watch::Sender<bool>,
}

impl SessionControl {
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }
}

// =============================================================================
// Handle
// =============================================================================

/// A running watch task.
pub struct WatchHandle {
    name: &'static str,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn new(name: &'static str, stop: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self { name, stop, task }
    }

    /// Handle for components with nothing to watch.
    pub fn idle(name: &'static str) -> Self {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = stopped.await;
        });
        Self::new(name, stop, task)
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task and wait until it has wound down.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            crate::log!("error"; "{} watcher panicked", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind};
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&Path]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(p.to_path_buf()))
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("/t/main.scss~")));
        assert!(is_temp_file(Path::new("/t/.main.scss.swp")));
        assert!(is_temp_file(Path::new("/t/.#index.php")));
        assert!(!is_temp_file(Path::new("/t/main.scss")));
        assert!(!is_temp_file(Path::new("/t/.eslintrc.js")));
    }

    #[test]
    fn test_translate_create_and_remove() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.scss");
        std::fs::write(&file, "").unwrap();

        let out = translate(event(EventKind::Create(CreateKind::Any), &[&file]));
        assert_eq!(out, vec![FsEvent::new(FsEventKind::Add, &file)]);

        let out = translate(event(EventKind::Create(CreateKind::Any), &[dir.path()]));
        assert_eq!(out[0].kind, FsEventKind::AddDir);

        let out = translate(event(EventKind::Remove(RemoveKind::Folder), &[dir.path()]));
        assert_eq!(out[0].kind, FsEventKind::UnlinkDir);
    }

    #[test]
    fn test_translate_rename_both() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("old.js");
        let to = dir.path().join("new.js");
        std::fs::write(&to, "").unwrap();

        let out = translate(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[&from, &to],
        ));
        assert_eq!(
            out,
            vec![
                FsEvent::new(FsEventKind::Unlink, &from),
                FsEvent::new(FsEventKind::Add, &to)
            ]
        );
    }

    #[test]
    fn test_translate_modify() {
        let path = Path::new("/t/a.scss");
        let out = translate(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &[path],
        ));
        assert_eq!(out, vec![FsEvent::new(FsEventKind::Change, path)]);

        let out = translate(event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &[path],
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_translate_filters_temp_files() {
        let out = translate(event(
            EventKind::Modify(ModifyKind::Any),
            &[Path::new("/t/a.scss.swp"), Path::new("/t/a.scss")],
        ));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_session_pause_flag() {
        let cache = crate::cache::BuildCache::new(Path::new("/t"), Path::new("/t/c.json")).shared();
        let (session, control) = Session::new(cache, LiveReload::new());
        assert!(!session.is_paused());
        control.pause();
        assert!(session.is_paused());
        control.resume();
        assert!(!session.is_paused() && !control.is_paused());
    }

    #[tokio::test]
    async fn test_idle_handle_stops() {
        let handle = WatchHandle::idle("cache");
        assert_eq!(handle.name(), "cache");
        handle.stop().await;
    }

    #[test]
    fn test_watcher_requires_existing_root() {
        let dir = TempDir::new().unwrap();
        assert!(FsWatcher::new(&[dir.path().join("missing")]).is_err());
        assert!(FsWatcher::new(&[dir.path().to_path_buf()]).is_ok());
    }
}
