//! Per-component watch loop.

use super::{BusyPolicy, ChangeCoalescer, FsEvent, FsEventKind, FsWatcher, Session, WatchHandle};
use crate::{
    component::{BoxFuture, BuildResult},
    debug,
    deps::DependencyGraph,
    log,
    logger::WatchStatus,
};
use anyhow::Result;
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinError, JoinSet},
    time::{Instant, sleep_until},
};

/// What the watch loop needs from a component.
pub trait Watched: Send + Sync + 'static {
    fn label(&self) -> &'static str;

    /// Directories (recursive) and files to watch.
    fn watch_roots(&self) -> Vec<PathBuf>;

    /// Debounce window, zero for single-file units.
    fn window(&self) -> Duration {
        Duration::ZERO
    }

    fn policy(&self) -> BusyPolicy {
        BusyPolicy::default()
    }

    /// Paths whose events never reach the coalescer.
    fn is_ignored(&self, _path: &Path) -> bool {
        false
    }

    /// Every unit with the files it depends on, discovered from disk.
    fn graph(&self) -> DependencyGraph;

    /// Current files of one unit, `None` once the unit no longer exists.
    fn unit_files(&self, unit: &str) -> Option<Vec<PathBuf>>;

    /// Whether a build queued while `unit` was building skips the cache
    /// check. Units that rewrite their own input answer `false`: their
    /// follow-up is triggered by the tool's write and must compare digests.
    fn forces_follow_up(&self, _unit: &str) -> bool {
        true
    }

    /// Output of `unit`, sent along with the reload.
    fn unit_output(&self, _unit: &str) -> Option<PathBuf> {
        None
    }

    /// Build `unit`. `force` skips the staleness check.
    fn rebuild(&self, unit: &str, force: bool) -> BoxFuture<'static, BuildResult>;
}

/// Spawn the watch loop of `target`.
///
/// The OS watcher is registered before this returns, so setup failures
/// surface here rather than inside the task.
pub fn drive<W: Watched>(target: Arc<W>, session: Session) -> Result<WatchHandle> {
    let (watcher, events) = FsWatcher::new(&target.watch_roots())?;
    let (stop_tx, stop_rx) = oneshot::channel();
    let label = target.label();

    let task = tokio::spawn(async move {
        let mut driver = Driver::new(target, session);
        driver.run(events, stop_rx).await;
        // OS watcher closes only after in-flight builds are done
        drop(watcher);
    });

    Ok(WatchHandle::new(label, stop_tx, task))
}

struct Driver<W> {
    target: Arc<W>,
    session: Session,
    graph: DependencyGraph,
    coalescer: ChangeCoalescer<String>,
    /// Units touched while building: their next build skips the cache check.
    dirty: FxHashSet<String>,
    builds: JoinSet<(String, BuildResult)>,
}

impl<W: Watched> Driver<W> {
    fn new(target: Arc<W>, session: Session) -> Self {
        let graph = target.graph();
        let coalescer = ChangeCoalescer::new(target.window(), target.policy());
        Self {
            target,
            session,
            graph,
            coalescer,
            dirty: FxHashSet::default(),
            builds: JoinSet::new(),
        }
    }

    async fn run(
        &mut self,
        mut events: mpsc::UnboundedReceiver<FsEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            let deadline = self.coalescer.next_deadline();

            tokio::select! {
                biased;
                _ = &mut stop => break,
                Some(done) = self.builds.join_next(), if !self.builds.is_empty() => {
                    self.on_finished(done);
                }
                Some(event) = events.recv() => self.on_event(event),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.start_due();
                }
                else => break,
            }
        }

        while let Some(done) = self.builds.join_next().await {
            self.on_finished(done);
        }
    }

    fn on_event(&mut self, event: FsEvent) {
        if self.target.is_ignored(&event.path) {
            return;
        }

        // Removals reach the cache even while paused: pausing holds builds only
        let FsEvent { kind, path } = event;
        match kind {
            FsEventKind::Unlink => {
                let removed = self.session.cache.lock().invalidate_file(&path);
                self.after_removal(&path, removed);
            }
            FsEventKind::UnlinkDir => {
                let removed = self.session.cache.lock().invalidate_dir(&path);
                self.after_removal(&path, removed);
            }
            FsEventKind::Add | FsEventKind::Change | FsEventKind::AddDir => {
                self.session.cache.lock().forget_hash(&path);
                if self.session.is_paused() {
                    debug!("watch"; "paused, ignoring {}", path.display());
                    return;
                }
                self.schedule(&path, kind == FsEventKind::AddDir);
            }
        }
    }

    fn after_removal(&mut self, path: &Path, removed: usize) {
        if removed > 0 {
            debug!("cache"; "invalidated {removed} entries for {}", path.display());
        }
        self.graph = self.target.graph();
    }

    fn affected(&self, path: &Path, is_dir: bool) -> Vec<String> {
        if is_dir {
            self.graph.units_under(path)
        } else {
            self.graph.units_for(path)
        }
    }

    fn schedule(&mut self, path: &Path, is_dir: bool) {
        let mut units = self.affected(path, is_dir);
        if units.is_empty() {
            // New file or unit: rediscover and try once more
            self.graph = self.target.graph();
            units = self.affected(path, is_dir);
        }
        if units.is_empty() {
            debug!("watch"; "no unit for {}", path.display());
            return;
        }

        let now = Instant::now();
        for unit in units {
            if self.coalescer.is_building(&unit) {
                self.dirty.insert(unit.clone());
            }
            self.coalescer.touch(unit, now);
        }
    }

    fn start_due(&mut self) {
        for unit in self.coalescer.take_due(Instant::now()) {
            let force = self.dirty.remove(&unit) && self.target.forces_follow_up(&unit);
            let build = tokio::spawn(self.target.rebuild(&unit, force));
            // A panicking build still hands its unit back to `on_finished`
            self.builds.spawn(async move {
                let result = build.await.unwrap_or_else(|e| {
                    BuildResult::Failed(format!("build task panicked: {e}"))
                });
                (unit, result)
            });
        }
    }

    fn on_finished(&mut self, done: Result<(String, BuildResult), JoinError>) {
        let (unit, result) = match done {
            Ok(done) => done,
            Err(e) => {
                log!("error"; "{} build task cancelled: {e}", self.target.label());
                return;
            }
        };

        self.coalescer.finish(&unit, Instant::now());
        match self.target.unit_files(&unit) {
            Some(files) => self.graph.set(&unit, files),
            None => self.graph.remove(&unit),
        }

        let label = self.target.label();
        match result {
            BuildResult::Built(duration) => {
                WatchStatus::success(label, &unit, duration);
                self.session
                    .reload
                    .notify(&format!("{label}: {unit}"), duration);
                let output = self.target.unit_output(&unit);
                self.session.reload.reload(output.as_deref());
            }
            BuildResult::Fresh => WatchStatus::unchanged(label, &unit),
            BuildResult::Failed(detail) => WatchStatus::error(label, &unit, &detail),
        }
    }
}
