//! Tail the CMS debug log: lines appended during the session are printed
//! with an `[errorlog]` prefix.

use super::{BoxFuture, Component, ComponentEnv, ComponentKind};
use crate::{
    debug, log,
    watch::{FsEventKind, FsWatcher, Session, WatchHandle},
};
use anyhow::{Result, bail};
use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncSeekExt},
    sync::oneshot,
};

pub struct ErrorLog {
    path: PathBuf,
    /// Bytes already shown.
    offset: AtomicU64,
}

impl ErrorLog {
    pub fn new(env: &ComponentEnv) -> Self {
        Self {
            path: env.config.paths.error_log.clone(),
            offset: AtomicU64::new(0),
        }
    }

    /// Print what was appended since the last call.
    async fn show_appended(&self, quiet: bool) {
        let offset = self.offset.load(Ordering::Relaxed);
        match read_appended(&self.path, offset).await {
            Ok((next, text)) => {
                self.offset.store(next, Ordering::Relaxed);
                if quiet {
                    return;
                }
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    log!("errorlog"; "{line}");
                }
            }
            Err(e) => debug!("errorlog"; "cannot read {}: {e}", self.path.display()),
        }
    }
}

/// Read from `offset` to the end of the file. A file shorter than `offset`
/// was truncated and is read from the start.
async fn read_appended(path: &Path, offset: u64) -> io::Result<(u64, String)> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let start = if len < offset { 0 } else { offset };

    file.seek(SeekFrom::Start(start)).await?;
    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf).await?;

    Ok((start + buf.len() as u64, String::from_utf8_lossy(&buf).into_owned()))
}

impl Component for ErrorLog {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ErrorLog
    }

    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let Ok(meta) = tokio::fs::metadata(&self.path).await else {
                bail!("error log not found at {}", self.path.display());
            };
            self.offset.store(meta.len(), Ordering::Relaxed);
            log!("errorlog"; "tailing {}", self.path.display());
            Ok(())
        })
    }

    fn watch(self: Arc<Self>, session: Session) -> Result<WatchHandle> {
        let (watcher, mut events) = FsWatcher::new(std::slice::from_ref(&self.path))?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let name = self.name();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        if event.path != self.path
                            || !matches!(event.kind, FsEventKind::Add | FsEventKind::Change)
                        {
                            continue;
                        }
                        // Paused: skip ahead so resuming does not dump the backlog
                        self.show_appended(session.is_paused()).await;
                    }
                }
            }
            drop(watcher);
        });

        Ok(WatchHandle::new(name, stop_tx, task))
    }
}
