//! Unit-based component shared by every compiled or copied asset family.
//!
//! A [`UnitSource`] says *what* the units of a family are and which action
//! builds them; [`AssetComponent`] does the rest: staleness checks through
//! the [`BuildCache`](crate::cache::BuildCache), concurrent initial builds
//! and the watch loop.

use super::{BoxFuture, BuildResult, BuildUnit, Component, ComponentEnv, ComponentKind, ProcessSummary};
use crate::{
    action::BuildAction,
    cache::SharedCache,
    config::ThemeConfig,
    debug,
    deps::DependencyGraph,
    log,
    watch::{BusyPolicy, Session, WatchHandle, Watched, drive},
};
use anyhow::{Result, bail};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinSet;

/// Unit discovery and actions of one asset family.
pub trait UnitSource: Send + Sync + 'static {
    fn kind(&self) -> ComponentKind;

    /// Source directories (recursive) and single files to watch.
    fn roots(&self) -> Vec<PathBuf>;

    /// Every unit currently on disk, sorted by name.
    fn units(&self) -> Vec<BuildUnit>;

    /// Action building `unit`, `None` when there is nothing to run.
    fn action(&self, unit: &BuildUnit) -> Option<Arc<dyn BuildAction>>;

    /// Files besides the input whose content affects the output.
    fn dependencies(&self, _unit: &BuildUnit) -> Vec<PathBuf> {
        Vec::new()
    }

    fn window(&self) -> Duration {
        Duration::ZERO
    }

    /// Units that must finish before the rest of `process` starts.
    fn is_prerequisite(&self, _unit: &BuildUnit) -> bool {
        false
    }
}

pub struct AssetComponent<S> {
    source: Arc<S>,
    cache: SharedCache,
    config: Arc<ThemeConfig>,
    policy: BusyPolicy,
}

impl<S: UnitSource> AssetComponent<S> {
    pub fn new(source: S, env: &ComponentEnv) -> Self {
        Self {
            source: Arc::new(source),
            cache: Arc::clone(&env.cache),
            config: Arc::clone(&env.config),
            policy: env.config.watch.on_busy,
        }
    }

    fn find(&self, name: &str) -> Option<BuildUnit> {
        self.source.units().into_iter().find(|unit| unit.name == name)
    }

    /// Owned build future for `unit`.
    fn build_owned(&self, unit: BuildUnit, force: bool) -> BoxFuture<'static, BuildResult> {
        let label = self.source.kind().name();
        let action = self.source.action(&unit);
        let deps = self.source.dependencies(&unit);
        Box::pin(run_unit(label, Arc::clone(&self.cache), action, unit, deps, force))
    }

    async fn process_units(&self) -> ProcessSummary {
        let started = Instant::now();
        let mut summary = ProcessSummary::default();
        let label = self.source.kind().name();

        let (first, rest): (Vec<_>, Vec<_>) = self
            .source
            .units()
            .into_iter()
            .partition(|unit| self.source.is_prerequisite(unit));

        for unit in first {
            let name = unit.name.clone();
            let result = self.build_owned(unit, false).await;
            report(label, &name, &result);
            summary.record(&result);
        }

        let mut builds = JoinSet::new();
        for unit in rest {
            let name = unit.name.clone();
            let build = self.build_owned(unit, false);
            builds.spawn(async move { (name, build.await) });
        }
        while let Some(done) = builds.join_next().await {
            match done {
                Ok((name, result)) => {
                    report(label, &name, &result);
                    summary.record(&result);
                }
                Err(e) => {
                    log!("error"; "{label} build task failed: {e}");
                    summary.failed += 1;
                }
            }
        }

        summary.duration = started.elapsed();
        summary
    }
}

fn report(label: &str, name: &str, result: &BuildResult) {
    match result {
        BuildResult::Built(duration) => {
            debug!(label; "built {name} in {}", crate::logger::format_duration(*duration));
        }
        BuildResult::Fresh => debug!(label; "fresh {name}"),
        BuildResult::Failed(detail) => log!(label; "failed {name}\n{detail}"),
    }
}

impl<S: UnitSource> Component for AssetComponent<S> {
    fn kind(&self) -> ComponentKind {
        self.source.kind()
    }

    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let roots = self.source.roots();
            if !roots.iter().any(|root| root.exists()) {
                let listed: Vec<_> = roots.iter().map(|r| self.config.rel(r)).collect();
                bail!("no sources found at {}", listed.join(", "));
            }

            let summary = self.process_units().await;
            if summary.total() > 0 {
                log!(self.name(); "{summary}");
            } else {
                debug!(self.name(); "nothing to build");
            }
            Ok(())
        })
    }

    fn process(&self) -> BoxFuture<'_, Result<ProcessSummary>> {
        Box::pin(async move { Ok(self.process_units().await) })
    }

    fn build<'a>(&'a self, unit: &'a BuildUnit) -> BoxFuture<'a, BuildResult> {
        self.build_owned(unit.clone(), false)
    }

    fn watch(self: Arc<Self>, session: Session) -> Result<WatchHandle> {
        drive(self, session)
    }
}

impl<S: UnitSource> Watched for AssetComponent<S> {
    fn label(&self) -> &'static str {
        self.source.kind().name()
    }

    fn watch_roots(&self) -> Vec<PathBuf> {
        self.source.roots()
    }

    fn window(&self) -> Duration {
        self.source.window()
    }

    fn policy(&self) -> BusyPolicy {
        self.policy
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.config.paths.is_ignored(path) || crate::watch::is_temp_file(path)
    }

    fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for unit in self.source.units() {
            let deps = self.source.dependencies(&unit);
            graph.set(&unit.name, std::iter::once(unit.input.clone()).chain(deps));
        }
        graph
    }

    fn unit_files(&self, unit: &str) -> Option<Vec<PathBuf>> {
        let unit = self.find(unit)?;
        let mut files = vec![unit.input.clone()];
        files.extend(self.source.dependencies(&unit));
        Some(files)
    }

    fn forces_follow_up(&self, unit: &str) -> bool {
        self.find(unit).is_none_or(|unit| unit.input != unit.output)
    }

    fn unit_output(&self, unit: &str) -> Option<PathBuf> {
        self.find(unit).map(|unit| unit.output)
    }

    fn rebuild(&self, unit: &str, force: bool) -> BoxFuture<'static, BuildResult> {
        match self.find(unit) {
            Some(unit) => self.build_owned(unit, force),
            None => Box::pin(async { BuildResult::Fresh }),
        }
    }
}

/// Build one unit: staleness check, action, cache update.
///
/// The cache lock is only held for the synchronous check and update.
async fn run_unit(
    label: &'static str,
    cache: SharedCache,
    action: Option<Arc<dyn BuildAction>>,
    unit: BuildUnit,
    deps: Vec<PathBuf>,
    force: bool,
) -> BuildResult {
    let Some(action) = action else {
        return BuildResult::Fresh;
    };
    if !force && !cache.lock().needs_rebuild(&unit.input, &unit.output, &deps) {
        return BuildResult::Fresh;
    }

    let outcome = action.run(&unit).await;
    if !outcome.success {
        return BuildResult::Failed(outcome.error.unwrap_or_default());
    }

    if let Some(warnings) = &outcome.output {
        log!(label; "{}:\n{warnings}", unit.name);
    }
    cache.lock().update_cache(&unit.input, &unit.output, &deps);
    BuildResult::Built(outcome.duration)
}
